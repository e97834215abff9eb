use rusqlite::Connection;


pub fn create_tables_20260801(conn: &Connection, reset_memory: bool) -> Result<(), String> {
    if reset_memory {
        conn.execute("DROP TABLE IF EXISTS pubsub_events", []).map_err(|e| e.to_string())?;
        conn.execute("DROP TABLE IF EXISTS requests", []).map_err(|e| e.to_string())?;
        conn.execute("DROP TABLE IF EXISTS matches", []).map_err(|e| e.to_string())?;
        conn.execute("DROP TABLE IF EXISTS threads", []).map_err(|e| e.to_string())?;
        conn.execute("DROP TABLE IF EXISTS thread_messages", []).map_err(|e| e.to_string())?;
        conn.execute("DROP TABLE IF EXISTS conversations", []).map_err(|e| e.to_string())?;
        conn.execute("DROP TABLE IF EXISTS conversation_messages", []).map_err(|e| e.to_string())?;
        conn.execute("DROP TABLE IF EXISTS active_thread_pointers", []).map_err(|e| e.to_string())?;
    }
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pubsub_events (
            pubevent_id INTEGER PRIMARY KEY AUTOINCREMENT,
            pubevent_channel TEXT NOT NULL,
            pubevent_action TEXT NOT NULL,
            pubevent_json TEXT NOT NULL,
            pubevent_ts REAL NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS requests (
            request_id TEXT PRIMARY KEY,
            request_owner_id TEXT NOT NULL,
            request_latitude REAL NOT NULL,
            request_longitude REAL NOT NULL,
            request_address TEXT DEFAULT NULL,
            request_status TEXT NOT NULL,
            request_urgency TEXT NOT NULL,
            request_empathy TEXT DEFAULT NULL,
            request_acceptor_id TEXT DEFAULT NULL,
            request_created_ts REAL DEFAULT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS matches (
            match_id TEXT PRIMARY KEY,
            match_request_id TEXT NOT NULL,
            match_requester_id TEXT NOT NULL,
            match_helper_id TEXT NOT NULL,
            match_thread_id TEXT NOT NULL,
            match_status TEXT NOT NULL,
            match_created_ts REAL NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS threads (
            thread_id TEXT PRIMARY KEY,
            thread_participants TEXT NOT NULL,
            thread_kind TEXT NOT NULL,
            thread_request_id TEXT NOT NULL,
            thread_created_ts REAL NOT NULL,
            thread_last_message_ts REAL NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS thread_messages (
            message_id TEXT PRIMARY KEY,
            message_belongs_to_thread_id TEXT NOT NULL,
            message_sender_id TEXT NOT NULL,
            message_text TEXT NOT NULL,
            message_created_ts REAL NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;
    // Prior naming scheme, consulted only when the primary lookup yields nothing.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversations (
            conversation_id TEXT PRIMARY KEY,
            conversation_last_message_ts REAL NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversation_messages (
            message_id TEXT PRIMARY KEY,
            message_belongs_to_thread_id TEXT NOT NULL,
            message_sender_id TEXT NOT NULL,
            message_text TEXT NOT NULL,
            message_created_ts REAL NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS active_thread_pointers (
            pointer_device_id TEXT PRIMARY KEY,
            pointer_thread_id TEXT NOT NULL,
            pointer_request_id TEXT NOT NULL,
            pointer_other_id TEXT NOT NULL,
            pointer_role TEXT NOT NULL,
            pointer_urgency TEXT DEFAULT NULL,
            pointer_is_topk BOOLEAN NOT NULL
        )",
        [],
    ).map_err(|e| e.to_string())?;
    Ok(())
}
