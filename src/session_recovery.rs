use std::sync::Arc;
use parking_lot::Mutex as ParkMutex;
use rusqlite::params;
use tracing::info;

use crate::custom_error::LifecycleError;
use crate::pad_db::db_match::match_get;
use crate::pad_db::db_structs::{ActiveThreadPointer, PadDB};


pub fn pointers_from_rows(
    mut rows: rusqlite::Rows,
) -> Vec<ActiveThreadPointer> {
    let mut pointers = Vec::new();
    while let Some(row) = rows.next().unwrap_or(None) {
        pointers.push(ActiveThreadPointer {
            pointer_device_id: row.get("pointer_device_id").unwrap(),
            pointer_thread_id: row.get("pointer_thread_id").unwrap(),
            pointer_request_id: row.get("pointer_request_id").unwrap(),
            pointer_other_id: row.get("pointer_other_id").unwrap(),
            pointer_role: row.get("pointer_role").unwrap(),
            pointer_urgency: row.get::<_, Option<String>>("pointer_urgency").unwrap(),
            pointer_is_topk: row.get("pointer_is_topk").unwrap(),
        });
    }
    pointers
}

pub fn persist_pointer(
    pdb: Arc<ParkMutex<PadDB>>,
    pointer: &ActiveThreadPointer,
) -> Result<(), LifecycleError> {
    if pointer.pointer_device_id.trim().is_empty() || pointer.pointer_thread_id.trim().is_empty() {
        return Err(LifecycleError::Validation("device_id and thread_id must be non-empty".to_string()));
    }
    let lite_arc = pdb.lock().lite.clone();
    let conn = lite_arc.lock();
    conn.execute(
        "INSERT OR REPLACE INTO active_thread_pointers (
            pointer_device_id,
            pointer_thread_id,
            pointer_request_id,
            pointer_other_id,
            pointer_role,
            pointer_urgency,
            pointer_is_topk
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            pointer.pointer_device_id,
            pointer.pointer_thread_id,
            pointer.pointer_request_id,
            pointer.pointer_other_id,
            pointer.pointer_role,
            pointer.pointer_urgency,
            pointer.pointer_is_topk,
        ],
    ).map_err(|e| LifecycleError::Transient(format!("Failed to persist pointer: {}", e)))?;
    Ok(())
}

// The cached pointer is only as good as its Match. On app start the pointer
// is re-validated: a missing or no-longer-active match clears it and the
// caller falls back to the default landing view.
pub fn recover_on_start(
    pdb: Arc<ParkMutex<PadDB>>,
    device_id: &str,
) -> Result<Option<ActiveThreadPointer>, String> {
    let lite_arc = pdb.lock().lite.clone();
    let conn = lite_arc.lock();
    let mut stmt = conn.prepare("SELECT * FROM active_thread_pointers WHERE pointer_device_id = ?1")
        .map_err(|e| e.to_string())?;
    let rows = stmt.query(params![device_id]).map_err(|e| e.to_string())?;
    let pointer = match pointers_from_rows(rows).pop() {
        Some(p) => p,
        None => return Ok(None),
    };
    // thread id doubles as match id for human threads
    let still_active = match match_get(&conn, &pointer.pointer_thread_id)? {
        Some(m) => m.match_status == "active",
        None => false,
    };
    if !still_active {
        conn.execute(
            "DELETE FROM active_thread_pointers WHERE pointer_device_id = ?1",
            params![device_id],
        ).map_err(|e| e.to_string())?;
        info!("stale active-thread pointer cleared for device {}", device_id);
        return Ok(None);
    }
    Ok(Some(pointer))
}

pub fn clear_pointer(
    pdb: Arc<ParkMutex<PadDB>>,
    device_id: &str,
) -> Result<(), String> {
    let lite_arc = pdb.lock().lite.clone();
    let conn = lite_arc.lock();
    conn.execute(
        "DELETE FROM active_thread_pointers WHERE pointer_device_id = ?1",
        params![device_id],
    ).map_err(|e| format!("Failed to clear pointer: {}", e))?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_coordinator::{accept_request, cancel_request};
    use crate::pad_db::db_request::request_create;
    use crate::pad_db::db_schema_20260801::create_tables_20260801;

    fn test_pad_db() -> Arc<ParkMutex<PadDB>> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        create_tables_20260801(&conn, false).unwrap();
        Arc::new(ParkMutex::new(PadDB { lite: Arc::new(ParkMutex::new(conn)) }))
    }

    fn helper_pointer(thread_id: &str, request_id: &str) -> ActiveThreadPointer {
        ActiveThreadPointer {
            pointer_device_id: "H".to_string(),
            pointer_thread_id: thread_id.to_string(),
            pointer_request_id: request_id.to_string(),
            pointer_other_id: "R".to_string(),
            pointer_role: "helper".to_string(),
            pointer_urgency: Some("urgent".to_string()),
            pointer_is_topk: false,
        }
    }

    #[test]
    fn test_recover_returns_pointer_while_match_active() {
        let pdb = test_pad_db();
        let req = {
            let lite_arc = pdb.lock().lite.clone();
            let conn = lite_arc.lock();
            request_create(&conn, "R", 40.0, -73.0, None, "urgent", None).unwrap()
        };
        let thread_id = accept_request(pdb.clone(), &req, "H", "R").unwrap();
        persist_pointer(pdb.clone(), &helper_pointer(&thread_id, &req)).unwrap();
        let recovered = recover_on_start(pdb.clone(), "H").unwrap().unwrap();
        assert_eq!(recovered.pointer_thread_id, thread_id);
        assert_eq!(recovered.pointer_role, "helper");
    }

    #[test]
    fn test_recover_clears_pointer_after_match_cancelled() {
        let pdb = test_pad_db();
        let req = {
            let lite_arc = pdb.lock().lite.clone();
            let conn = lite_arc.lock();
            request_create(&conn, "R", 40.0, -73.0, None, "normal", None).unwrap()
        };
        let thread_id = accept_request(pdb.clone(), &req, "H", "R").unwrap();
        persist_pointer(pdb.clone(), &helper_pointer(&thread_id, &req)).unwrap();
        cancel_request(pdb.clone(), &req, "R", true).unwrap();
        assert!(recover_on_start(pdb.clone(), "H").unwrap().is_none());
        // the stale pointer is gone, a second recover is a clean miss
        assert!(recover_on_start(pdb.clone(), "H").unwrap().is_none());
    }

    #[test]
    fn test_recover_clears_pointer_when_match_never_existed() {
        let pdb = test_pad_db();
        persist_pointer(pdb.clone(), &helper_pointer("ghost_thread", "ghost_req")).unwrap();
        assert!(recover_on_start(pdb.clone(), "H").unwrap().is_none());
    }

    #[test]
    fn test_clear_pointer_is_idempotent() {
        let pdb = test_pad_db();
        clear_pointer(pdb.clone(), "H").unwrap();
        persist_pointer(pdb.clone(), &helper_pointer("t", "r")).unwrap();
        clear_pointer(pdb.clone(), "H").unwrap();
        clear_pointer(pdb.clone(), "H").unwrap();
        assert!(recover_on_start(pdb, "H").unwrap().is_none());
    }

    #[test]
    fn test_persist_rejects_empty_ids() {
        let pdb = test_pad_db();
        let mut p = helper_pointer("t", "r");
        p.pointer_device_id = "".to_string();
        assert!(persist_pointer(pdb, &p).is_err());
    }
}
