use rusqlite::params;
use serde_json::json;
use uuid::Uuid;

use crate::custom_error::LifecycleError;
use crate::pad_db::db_structs::Request;
use crate::pad_db::{now_ts, pubsub_emit};


pub fn requests_from_rows(
    mut rows: rusqlite::Rows,
) -> Vec<Request> {
    let mut requests = Vec::new();
    while let Some(row) = rows.next().unwrap_or(None) {
        requests.push(Request {
            request_id: row.get("request_id").unwrap(),
            request_owner_id: row.get("request_owner_id").unwrap(),
            request_latitude: row.get("request_latitude").unwrap(),
            request_longitude: row.get("request_longitude").unwrap(),
            request_address: row.get::<_, Option<String>>("request_address").unwrap(),
            request_status: row.get("request_status").unwrap(),
            request_urgency: row.get("request_urgency").unwrap(),
            request_empathy: row.get::<_, Option<String>>("request_empathy").unwrap(),
            request_acceptor_id: row.get::<_, Option<String>>("request_acceptor_id").unwrap(),
            request_created_ts: row.get::<_, Option<f64>>("request_created_ts").unwrap(),
        });
    }
    requests
}

pub fn request_get(
    conn: &rusqlite::Connection,
    request_id: &str,
) -> Result<Option<Request>, String> {
    let mut stmt = conn.prepare("SELECT * FROM requests WHERE request_id = ?1")
        .map_err(|e| e.to_string())?;
    let rows = stmt.query(params![request_id])
        .map_err(|e| e.to_string())?;
    Ok(requests_from_rows(rows).pop())
}

// Creation-time descending. Rows with the server stamp not visible yet sort
// as newest. Rows with an empty id/owner/status never reach subscribers.
pub fn requests_all_newest_first(
    conn: &rusqlite::Connection,
) -> Result<Vec<Request>, String> {
    let mut stmt = conn.prepare(
        "SELECT * FROM requests ORDER BY COALESCE(request_created_ts, 1e18) DESC"
    ).map_err(|e| e.to_string())?;
    let rows = stmt.query([]).map_err(|e| e.to_string())?;
    let requests = requests_from_rows(rows)
        .into_iter()
        .filter(|r| !r.request_id.is_empty() && !r.request_owner_id.is_empty() && !r.request_status.is_empty())
        .collect();
    Ok(requests)
}

pub fn request_create(
    conn: &rusqlite::Connection,
    owner_id: &str,
    latitude: f64,
    longitude: f64,
    address: Option<String>,
    urgency: &str,
    empathy: Option<String>,
) -> Result<String, LifecycleError> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(LifecycleError::Validation("Invalid location coordinates".to_string()));
    }
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(LifecycleError::Validation("Coordinates out of range".to_string()));
    }
    if owner_id.trim().is_empty() {
        return Err(LifecycleError::Validation("Invalid user ID".to_string()));
    }
    let request_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO requests (
            request_id,
            request_owner_id,
            request_latitude,
            request_longitude,
            request_address,
            request_status,
            request_urgency,
            request_empathy,
            request_acceptor_id,
            request_created_ts
        ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, NULL, ?8)",
        params![request_id, owner_id, latitude, longitude, address, urgency, empathy, now_ts()],
    ).map_err(|e| LifecycleError::Transient(format!("Failed to insert request: {}", e)))?;
    pubsub_emit(conn, "request", "update", &json!({"request_id": request_id}))
        .map_err(LifecycleError::Transient)?;
    Ok(request_id)
}

pub fn request_set_status(
    conn: &rusqlite::Connection,
    request_id: &str,
    status: &str,
) -> Result<(), String> {
    conn.execute(
        "UPDATE requests SET request_status = ?2 WHERE request_id = ?1",
        params![request_id, status],
    ).map_err(|e| format!("Failed to update request status: {}", e))?;
    pubsub_emit(conn, "request", "update", &json!({"request_id": request_id}))?;
    Ok(())
}

pub fn request_set_matched(
    conn: &rusqlite::Connection,
    request_id: &str,
    acceptor_id: &str,
) -> Result<(), String> {
    conn.execute(
        "UPDATE requests SET request_status = 'matched', request_acceptor_id = ?2 WHERE request_id = ?1",
        params![request_id, acceptor_id],
    ).map_err(|e| format!("Failed to update request: {}", e))?;
    pubsub_emit(conn, "request", "update", &json!({"request_id": request_id}))?;
    Ok(())
}
