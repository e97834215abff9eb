use std::sync::Arc;
use parking_lot::Mutex as ParkMutex;
use serde::{Deserialize, Serialize};


pub struct PadDB {
    pub lite: Arc<ParkMutex<rusqlite::Connection>>,
}

// request_status: pending -> matched -> completed, pending|matched -> cancelled.
// Rows are never deleted, finished requests stay around for history.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Request {
    pub request_id: String,
    pub request_owner_id: String,
    pub request_latitude: f64,
    pub request_longitude: f64,
    pub request_address: Option<String>,
    pub request_status: String,
    pub request_urgency: String,            // urgent/normal/low
    pub request_empathy: Option<String>,    // shown to the requester, never posted to chat
    pub request_acceptor_id: Option<String>,
    pub request_created_ts: Option<f64>,    // None while the server stamp is not visible yet
}

// match_id == "<request_id>_<helper_id>", the idempotence key for accept.
// Each helper-requester pair gets its own match, and its own thread.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Match {
    pub match_id: String,
    pub match_request_id: String,
    pub match_requester_id: String,
    pub match_helper_id: String,
    pub match_thread_id: String,
    pub match_status: String,               // active/completed/cancelled
    pub match_created_ts: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Thread {
    pub thread_id: String,                  // equals match_id for human threads
    pub thread_participants: Vec<String>,
    pub thread_kind: String,                // human threads never get automated replies
    pub thread_request_id: String,
    pub thread_created_ts: f64,
    pub thread_last_message_ts: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Message {
    pub message_id: String,
    pub message_belongs_to_thread_id: String,
    pub message_sender_id: String,
    pub message_text: String,               // already redacted when it gets here
    pub message_created_ts: f64,
}

// Device-local resume point. The corresponding Match is the source of truth,
// this record is re-validated on every recover and cleared when stale.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ActiveThreadPointer {
    pub pointer_device_id: String,
    pub pointer_thread_id: String,
    pub pointer_request_id: String,
    pub pointer_other_id: String,
    pub pointer_role: String,               // requester/helper
    pub pointer_urgency: Option<String>,
    pub pointer_is_topk: bool,
}
