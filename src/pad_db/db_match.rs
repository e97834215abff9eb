use rusqlite::params;
use serde_json::json;

use crate::pad_db::db_structs::Match;
use crate::pad_db::pubsub_emit;


pub fn matches_from_rows(
    mut rows: rusqlite::Rows,
) -> Vec<Match> {
    let mut matches = Vec::new();
    while let Some(row) = rows.next().unwrap_or(None) {
        matches.push(Match {
            match_id: row.get("match_id").unwrap(),
            match_request_id: row.get("match_request_id").unwrap(),
            match_requester_id: row.get("match_requester_id").unwrap(),
            match_helper_id: row.get("match_helper_id").unwrap(),
            match_thread_id: row.get("match_thread_id").unwrap(),
            match_status: row.get("match_status").unwrap(),
            match_created_ts: row.get("match_created_ts").unwrap(),
        });
    }
    matches
}

pub fn match_get(
    conn: &rusqlite::Connection,
    match_id: &str,
) -> Result<Option<Match>, String> {
    let mut stmt = conn.prepare("SELECT * FROM matches WHERE match_id = ?1")
        .map_err(|e| e.to_string())?;
    let rows = stmt.query(params![match_id])
        .map_err(|e| e.to_string())?;
    Ok(matches_from_rows(rows).pop())
}

pub fn match_set(
    conn: &rusqlite::Connection,
    mrec: &Match,
) -> Result<(), String> {
    conn.execute(
        "INSERT OR REPLACE INTO matches (
            match_id,
            match_request_id,
            match_requester_id,
            match_helper_id,
            match_thread_id,
            match_status,
            match_created_ts
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            mrec.match_id,
            mrec.match_request_id,
            mrec.match_requester_id,
            mrec.match_helper_id,
            mrec.match_thread_id,
            mrec.match_status,
            mrec.match_created_ts,
        ],
    ).map_err(|e| format!("Failed to insert or replace match: {}", e))?;
    pubsub_emit(conn, "match", "update", &json!({"match_id": mrec.match_id}))?;
    Ok(())
}

pub fn match_set_status(
    conn: &rusqlite::Connection,
    match_id: &str,
    status: &str,
) -> Result<(), String> {
    conn.execute(
        "UPDATE matches SET match_status = ?2 WHERE match_id = ?1",
        params![match_id, status],
    ).map_err(|e| format!("Failed to update match status: {}", e))?;
    pubsub_emit(conn, "match", "update", &json!({"match_id": match_id}))?;
    Ok(())
}

// Most recent active match wins: if several helpers accepted, the requester
// is routed into the newest thread.
pub fn match_first_active_for_requester(
    conn: &rusqlite::Connection,
    requester_id: &str,
) -> Result<Option<Match>, String> {
    let mut stmt = conn.prepare(
        "SELECT * FROM matches
         WHERE match_requester_id = ?1 AND match_status = 'active' AND match_thread_id != ''
         ORDER BY match_created_ts DESC"
    ).map_err(|e| e.to_string())?;
    let rows = stmt.query(params![requester_id])
        .map_err(|e| e.to_string())?;
    let mut matches = matches_from_rows(rows);
    if matches.is_empty() {
        return Ok(None);
    }
    Ok(Some(matches.remove(0)))
}
