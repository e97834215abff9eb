use rusqlite::params;

use crate::pad_db::db_structs::Thread;


pub fn threads_from_rows(
    mut rows: rusqlite::Rows,
) -> Vec<Thread> {
    let mut threads = Vec::new();
    while let Some(row) = rows.next().unwrap_or(None) {
        let participants_json: String = row.get("thread_participants").unwrap();
        threads.push(Thread {
            thread_id: row.get("thread_id").unwrap(),
            thread_participants: serde_json::from_str(&participants_json).unwrap_or_default(),
            thread_kind: row.get("thread_kind").unwrap(),
            thread_request_id: row.get("thread_request_id").unwrap(),
            thread_created_ts: row.get("thread_created_ts").unwrap(),
            thread_last_message_ts: row.get("thread_last_message_ts").unwrap(),
        });
    }
    threads
}

pub fn thread_get(
    conn: &rusqlite::Connection,
    thread_id: &str,
) -> Result<Option<Thread>, String> {
    let mut stmt = conn.prepare("SELECT * FROM threads WHERE thread_id = ?1")
        .map_err(|e| e.to_string())?;
    let rows = stmt.query(params![thread_id])
        .map_err(|e| e.to_string())?;
    Ok(threads_from_rows(rows).pop())
}

pub fn thread_set(
    conn: &rusqlite::Connection,
    trec: &Thread,
) -> Result<(), String> {
    let participants_json = serde_json::to_string(&trec.thread_participants)
        .map_err(|e| format!("Failed to serialize participants: {}", e))?;
    conn.execute(
        "INSERT OR REPLACE INTO threads (
            thread_id,
            thread_participants,
            thread_kind,
            thread_request_id,
            thread_created_ts,
            thread_last_message_ts
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            trec.thread_id,
            participants_json,
            trec.thread_kind,
            trec.thread_request_id,
            trec.thread_created_ts,
            trec.thread_last_message_ts,
        ],
    ).map_err(|e| format!("Failed to insert or replace thread: {}", e))?;
    Ok(())
}
