use std::sync::Arc;
use parking_lot::Mutex as ParkMutex;
use tracing::info;

use crate::custom_error::LifecycleError;
use crate::pad_db::db_match::{match_get, match_set, match_set_status};
use crate::pad_db::db_request::{request_get, request_set_matched, request_set_status};
use crate::pad_db::db_structs::{Match, PadDB, Thread};
use crate::pad_db::db_thread::{thread_get, thread_set};
use crate::pad_db::now_ts;


// Deterministic: retried or duplicated accepts for the same pair collapse
// into one match, two different helpers get two independent matches.
pub fn match_id_for(request_id: &str, helper_id: &str) -> String {
    format!("{}_{}", request_id, helper_id)
}

// Turns an accept action into a Match plus Thread and flips the request to
// matched, all in one transaction. Returns the thread id. Calling this twice
// with the same (request, helper) returns the same thread id without writing
// anything the second time.
pub fn accept_request(
    pdb: Arc<ParkMutex<PadDB>>,
    request_id: &str,
    helper_id: &str,
    requester_id: &str,
) -> Result<String, LifecycleError> {
    if request_id.trim().is_empty() || helper_id.trim().is_empty() || requester_id.trim().is_empty() {
        return Err(LifecycleError::Validation("request_id, helper_id and requester_id must be non-empty".to_string()));
    }
    let lite_arc = pdb.lock().lite.clone();
    let mut conn = lite_arc.lock();
    let tx = conn.transaction().map_err(|e| LifecycleError::Transient(e.to_string()))?;

    let request = request_get(&tx, request_id)
        .map_err(LifecycleError::Transient)?
        .ok_or_else(|| LifecycleError::NotFound(format!("No request found with id: {}", request_id)))?;
    match request.request_status.as_str() {
        "pending" | "matched" => {}
        other => {
            return Err(LifecycleError::Validation(format!("Cannot accept a {} request", other)));
        }
    }

    let match_id = match_id_for(request_id, helper_id);
    if let Some(existing) = match_get(&tx, &match_id).map_err(LifecycleError::Transient)? {
        if !existing.match_thread_id.is_empty() {
            // duplicate tap or retried call, reuse the existing thread
            return Ok(existing.match_thread_id);
        }
    }

    let thread_id = match_id.clone();
    if thread_get(&tx, &thread_id).map_err(LifecycleError::Transient)?.is_none() {
        let now = now_ts();
        thread_set(&tx, &Thread {
            thread_id: thread_id.clone(),
            thread_participants: vec![requester_id.to_string(), helper_id.to_string()],
            thread_kind: "human".to_string(),
            thread_request_id: request_id.to_string(),
            thread_created_ts: now,
            thread_last_message_ts: now,
        }).map_err(LifecycleError::Transient)?;
    }
    match_set(&tx, &Match {
        match_id: match_id.clone(),
        match_request_id: request_id.to_string(),
        match_requester_id: requester_id.to_string(),
        match_helper_id: helper_id.to_string(),
        match_thread_id: thread_id.clone(),
        match_status: "active".to_string(),
        match_created_ts: now_ts(),
    }).map_err(LifecycleError::Transient)?;
    request_set_matched(&tx, request_id, helper_id).map_err(LifecycleError::Transient)?;

    tx.commit().map_err(|e| LifecycleError::Transient(e.to_string()))?;
    info!("request {} accepted by {}, thread {}", request_id, helper_id, thread_id);
    Ok(thread_id)
}

// Either side backs out. The requester must own the request, the helper must
// be its acceptor, anyone else changes nothing.
pub fn cancel_request(
    pdb: Arc<ParkMutex<PadDB>>,
    request_id: &str,
    actor_id: &str,
    is_requester: bool,
) -> Result<(), LifecycleError> {
    if request_id.trim().is_empty() || actor_id.trim().is_empty() {
        return Err(LifecycleError::Validation("request_id and actor_id must be non-empty".to_string()));
    }
    let lite_arc = pdb.lock().lite.clone();
    let mut conn = lite_arc.lock();
    let tx = conn.transaction().map_err(|e| LifecycleError::Transient(e.to_string()))?;

    let request = request_get(&tx, request_id)
        .map_err(LifecycleError::Transient)?
        .ok_or_else(|| LifecycleError::NotFound(format!("No request found with id: {}", request_id)))?;
    if is_requester && request.request_owner_id != actor_id {
        return Err(LifecycleError::Authorization("Unauthorized".to_string()));
    }
    if !is_requester && request.request_acceptor_id.as_deref() != Some(actor_id) {
        return Err(LifecycleError::Authorization("Unauthorized".to_string()));
    }
    match request.request_status.as_str() {
        "pending" | "matched" => {}
        other => {
            return Err(LifecycleError::Validation(format!("Cannot cancel a {} request", other)));
        }
    }

    request_set_status(&tx, request_id, "cancelled").map_err(LifecycleError::Transient)?;
    let helper_id = if is_requester {
        request.request_acceptor_id.clone()
    } else {
        Some(actor_id.to_string())
    };
    if let Some(helper_id) = helper_id {
        let match_id = match_id_for(request_id, &helper_id);
        if match_get(&tx, &match_id).map_err(LifecycleError::Transient)?.is_some() {
            match_set_status(&tx, &match_id, "cancelled").map_err(LifecycleError::Transient)?;
        }
    }

    tx.commit().map_err(|e| LifecycleError::Transient(e.to_string()))?;
    info!("request {} cancelled by {}", request_id, actor_id);
    Ok(())
}

// Helper marks the drop-off. Only the acceptor can do this.
pub fn complete_request(
    pdb: Arc<ParkMutex<PadDB>>,
    request_id: &str,
    helper_id: &str,
) -> Result<(), LifecycleError> {
    if request_id.trim().is_empty() || helper_id.trim().is_empty() {
        return Err(LifecycleError::Validation("request_id and helper_id must be non-empty".to_string()));
    }
    let lite_arc = pdb.lock().lite.clone();
    let mut conn = lite_arc.lock();
    let tx = conn.transaction().map_err(|e| LifecycleError::Transient(e.to_string()))?;

    let request = request_get(&tx, request_id)
        .map_err(LifecycleError::Transient)?
        .ok_or_else(|| LifecycleError::NotFound(format!("No request found with id: {}", request_id)))?;
    if request.request_acceptor_id.as_deref() != Some(helper_id) {
        return Err(LifecycleError::Authorization("Unauthorized - only the helper can mark as dropped off".to_string()));
    }
    if request.request_status != "matched" {
        return Err(LifecycleError::Validation(format!("Cannot complete a {} request", request.request_status)));
    }

    request_set_status(&tx, request_id, "completed").map_err(LifecycleError::Transient)?;
    let match_id = match_id_for(request_id, helper_id);
    if match_get(&tx, &match_id).map_err(LifecycleError::Transient)?.is_some() {
        match_set_status(&tx, &match_id, "completed").map_err(LifecycleError::Transient)?;
    }

    tx.commit().map_err(|e| LifecycleError::Transient(e.to_string()))?;
    info!("request {} completed by {}", request_id, helper_id);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad_db::db_init::pad_db_init;
    use crate::pad_db::db_match::match_first_active_for_requester;
    use crate::pad_db::db_message::MessageStoreChain;
    use crate::pad_db::db_request::request_create;
    use crate::pad_db::db_schema_20260801::create_tables_20260801;
    use crate::proximity::{nearby, GeoPoint};

    fn test_pad_db() -> Arc<ParkMutex<PadDB>> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        create_tables_20260801(&conn, false).unwrap();
        Arc::new(ParkMutex::new(PadDB { lite: Arc::new(ParkMutex::new(conn)) }))
    }

    fn seed_request(pdb: &Arc<ParkMutex<PadDB>>, owner: &str) -> String {
        let lite_arc = pdb.lock().lite.clone();
        let conn = lite_arc.lock();
        request_create(&conn, owner, 40.0, -73.0, None, "normal", None).unwrap()
    }

    fn request_status(pdb: &Arc<ParkMutex<PadDB>>, request_id: &str) -> (String, Option<String>) {
        let lite_arc = pdb.lock().lite.clone();
        let conn = lite_arc.lock();
        let r = request_get(&conn, request_id).unwrap().unwrap();
        (r.request_status, r.request_acceptor_id)
    }

    #[test]
    fn test_accept_is_idempotent() {
        let pdb = test_pad_db();
        let req = seed_request(&pdb, "R");
        let t1 = accept_request(pdb.clone(), &req, "H", "R").unwrap();
        let t2 = accept_request(pdb.clone(), &req, "H", "R").unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t1, match_id_for(&req, "H"));
        let (status, acceptor) = request_status(&pdb, &req);
        assert_eq!(status, "matched");
        assert_eq!(acceptor.as_deref(), Some("H"));
    }

    #[test]
    fn test_two_helpers_get_independent_threads() {
        let pdb = test_pad_db();
        let req = seed_request(&pdb, "R");
        let t1 = accept_request(pdb.clone(), &req, "H1", "R").unwrap();
        let t2 = accept_request(pdb.clone(), &req, "H2", "R").unwrap();
        assert_ne!(t1, t2);
        let lite_arc = pdb.lock().lite.clone();
        let conn = lite_arc.lock();
        let m1 = match_get(&conn, &match_id_for(&req, "H1")).unwrap().unwrap();
        let m2 = match_get(&conn, &match_id_for(&req, "H2")).unwrap().unwrap();
        assert_eq!(m1.match_status, "active");
        assert_eq!(m2.match_status, "active");
        assert_ne!(m1.match_thread_id, m2.match_thread_id);
    }

    #[test]
    fn test_accept_missing_request_is_not_found() {
        let pdb = test_pad_db();
        let err = accept_request(pdb, "nope", "H", "R").unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[test]
    fn test_accept_cancelled_request_is_rejected() {
        let pdb = test_pad_db();
        let req = seed_request(&pdb, "R");
        cancel_request(pdb.clone(), &req, "R", true).unwrap();
        let err = accept_request(pdb.clone(), &req, "H", "R").unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
        let (status, _) = request_status(&pdb, &req);
        assert_eq!(status, "cancelled");
    }

    #[test]
    fn test_cancel_by_stranger_changes_nothing() {
        let pdb = test_pad_db();
        let req = seed_request(&pdb, "R");
        accept_request(pdb.clone(), &req, "H", "R").unwrap();
        let err = cancel_request(pdb.clone(), &req, "stranger", true).unwrap_err();
        assert!(matches!(err, LifecycleError::Authorization(_)));
        let err = cancel_request(pdb.clone(), &req, "stranger", false).unwrap_err();
        assert!(matches!(err, LifecycleError::Authorization(_)));
        let (status, _) = request_status(&pdb, &req);
        assert_eq!(status, "matched");
    }

    #[test]
    fn test_cancel_by_requester_cascades_to_match() {
        let pdb = test_pad_db();
        let req = seed_request(&pdb, "R");
        accept_request(pdb.clone(), &req, "H", "R").unwrap();
        cancel_request(pdb.clone(), &req, "R", true).unwrap();
        let (status, _) = request_status(&pdb, &req);
        assert_eq!(status, "cancelled");
        let lite_arc = pdb.lock().lite.clone();
        let conn = lite_arc.lock();
        let m = match_get(&conn, &match_id_for(&req, "H")).unwrap().unwrap();
        assert_eq!(m.match_status, "cancelled");
    }

    #[test]
    fn test_complete_requires_acceptor() {
        let pdb = test_pad_db();
        let req = seed_request(&pdb, "R");
        accept_request(pdb.clone(), &req, "H", "R").unwrap();
        let err = complete_request(pdb.clone(), &req, "not_the_helper").unwrap_err();
        assert!(matches!(err, LifecycleError::Authorization(_)));
        complete_request(pdb.clone(), &req, "H").unwrap();
        let (status, _) = request_status(&pdb, &req);
        assert_eq!(status, "completed");
        let lite_arc = pdb.lock().lite.clone();
        let conn = lite_arc.lock();
        let m = match_get(&conn, &match_id_for(&req, "H")).unwrap().unwrap();
        assert_eq!(m.match_status, "completed");
    }

    #[test]
    fn test_completed_request_cannot_be_cancelled() {
        let pdb = test_pad_db();
        let req = seed_request(&pdb, "R");
        accept_request(pdb.clone(), &req, "H", "R").unwrap();
        complete_request(pdb.clone(), &req, "H").unwrap();
        let err = cancel_request(pdb.clone(), &req, "R", true).unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    // The whole lifecycle on a file-backed db: post, discover nearby, accept,
    // auto-route the requester, chat in both directions.
    #[tokio::test]
    async fn test_request_match_thread_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("padlink.sqlite");
        let pdb = pad_db_init(db_path.to_string_lossy().to_string(), false).await;

        let lite_arc = pdb.lock().lite.clone();
        let req = {
            let conn = lite_arc.lock();
            request_create(&conn, "R", 40.000, -73.000, Some("5th floor".to_string()), "urgent", None).unwrap()
        };

        // helper H is ~0.14 km away and sees the request in the closest band
        let found = {
            let conn = lite_arc.lock();
            let all = crate::pad_db::db_request::requests_all_newest_first(&conn).unwrap();
            nearby(&all, GeoPoint { latitude: 40.001, longitude: -73.001 }, "H", 15.0, 50.0, now_ts())
        };
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].request.request_id, req);
        assert_eq!(found[0].band, "100-250");

        let thread_id = accept_request(pdb.clone(), &req, "H", "R").unwrap();
        assert_eq!(thread_id, format!("{}_H", req));

        // requester side is routed into the first active match
        {
            let conn = lite_arc.lock();
            let m = match_first_active_for_requester(&conn, "R").unwrap().unwrap();
            assert_eq!(m.match_thread_id, thread_id);
            assert_eq!(m.match_helper_id, "H");
            assert_eq!(m.match_request_id, req);
        }

        let chain = MessageStoreChain::new();
        {
            let conn = lite_arc.lock();
            chain.send(&conn, &thread_id, "H", "on my way").unwrap();
            chain.send(&conn, &thread_id, "R", "thank you!").unwrap();
            let messages = chain.list_ascending(&conn, &thread_id).unwrap();
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0].message_sender_id, "H");
            assert_eq!(messages[1].message_sender_id, "R");
            assert!(messages[0].message_created_ts <= messages[1].message_created_ts);
        }
    }
}
