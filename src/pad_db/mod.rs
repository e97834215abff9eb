use rusqlite::params;

pub mod db_init;
pub mod db_match;
pub mod db_message;
pub mod db_request;
pub mod db_schema_20260801;
pub mod db_structs;
pub mod db_thread;


pub fn now_ts() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

// Every mutation appends one row here; SSE subscriptions poll forward from
// the last pubevent_id they have seen.
pub fn pubsub_emit(
    conn: &rusqlite::Connection,
    channel: &str,
    action: &str,
    json: &serde_json::Value,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO pubsub_events (pubevent_channel, pubevent_action, pubevent_json, pubevent_ts)
         VALUES (?1, ?2, ?3, ?4)",
        params![channel, action, json.to_string(), now_ts()],
    ).map_err(|e| format!("Failed to emit pubsub event: {}", e))?;
    Ok(())
}

pub fn pubsub_max_event_id(conn: &rusqlite::Connection) -> Result<i64, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(pubevent_id), 0) FROM pubsub_events",
        [],
        |row| row.get(0),
    ).map_err(|e| format!("Failed to get max event ID: {}", e))
}

// Returns the pubevent_json payloads on one channel after seen_id, advancing seen_id.
pub fn pubsub_poll(
    conn: &rusqlite::Connection,
    channel: &str,
    seen_id: &mut i64,
) -> Result<Vec<serde_json::Value>, String> {
    let mut stmt = conn.prepare(
        "SELECT pubevent_id, pubevent_json FROM pubsub_events
         WHERE pubevent_id > ?1 AND pubevent_channel = ?2
         ORDER BY pubevent_id ASC",
    ).map_err(|e| e.to_string())?;
    let mut rows = stmt.query(params![*seen_id, channel]).map_err(|e| format!("Failed to execute query: {}", e))?;
    let mut events = Vec::new();
    while let Some(row) = rows.next().map_err(|e| format!("Failed to fetch row: {}", e))? {
        let id: i64 = row.get(0).map_err(|e| format!("Failed to get pubevent_id: {}", e))?;
        let json: String = row.get(1).map_err(|e| format!("Failed to get pubevent_json: {}", e))?;
        let parsed: serde_json::Value = serde_json::from_str(&json)
            .map_err(|e| format!("Failed to parse event JSON: {}", e))?;
        events.push(parsed);
        *seen_id = id;
    }
    Ok(events)
}
