pub mod handlers_matches;
pub mod handlers_messages;
pub mod handlers_requests;
pub mod handlers_session;
