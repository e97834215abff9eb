use rusqlite::params;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::pad_db::db_structs::Message;
use crate::pad_db::{now_ts, pubsub_emit};


pub fn messages_from_rows(
    mut rows: rusqlite::Rows,
) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Some(row) = rows.next().unwrap_or(None) {
        messages.push(Message {
            message_id: row.get("message_id").unwrap(),
            message_belongs_to_thread_id: row.get("message_belongs_to_thread_id").unwrap(),
            message_sender_id: row.get("message_sender_id").unwrap(),
            message_text: row.get("message_text").unwrap(),
            message_created_ts: row.get("message_created_ts").unwrap(),
        });
    }
    messages
}

// One storage location per naming scheme. Callers go through MessageStoreChain
// and never learn which scheme answered.
pub trait MessageStore: Send + Sync {
    fn scheme(&self) -> &'static str;
    fn thread_known(&self, conn: &rusqlite::Connection, thread_id: &str) -> Result<bool, String>;
    fn append(&self, conn: &rusqlite::Connection, msg: &Message) -> Result<(), String>;
    fn list_ascending(&self, conn: &rusqlite::Connection, thread_id: &str) -> Result<Vec<Message>, String>;
}

pub struct ThreadMessageStore;

impl MessageStore for ThreadMessageStore {
    fn scheme(&self) -> &'static str {
        "threads"
    }

    fn thread_known(&self, conn: &rusqlite::Connection, thread_id: &str) -> Result<bool, String> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM threads WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        ).map_err(|e| e.to_string())?;
        Ok(count > 0)
    }

    fn append(&self, conn: &rusqlite::Connection, msg: &Message) -> Result<(), String> {
        conn.execute(
            "INSERT INTO thread_messages (
                message_id,
                message_belongs_to_thread_id,
                message_sender_id,
                message_text,
                message_created_ts
            ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                msg.message_id,
                msg.message_belongs_to_thread_id,
                msg.message_sender_id,
                msg.message_text,
                msg.message_created_ts,
            ],
        ).map_err(|e| format!("Failed to insert message: {}", e))?;
        conn.execute(
            "UPDATE threads SET thread_last_message_ts = ?2 WHERE thread_id = ?1",
            params![msg.message_belongs_to_thread_id, msg.message_created_ts],
        ).map_err(|e| format!("Failed to touch thread: {}", e))?;
        Ok(())
    }

    fn list_ascending(&self, conn: &rusqlite::Connection, thread_id: &str) -> Result<Vec<Message>, String> {
        let mut stmt = conn.prepare(
            "SELECT * FROM thread_messages
             WHERE message_belongs_to_thread_id = ?1
             ORDER BY message_created_ts ASC, rowid ASC"
        ).map_err(|e| e.to_string())?;
        let rows = stmt.query(params![thread_id]).map_err(|e| e.to_string())?;
        Ok(messages_from_rows(rows))
    }
}

pub struct ConversationMessageStore;

impl MessageStore for ConversationMessageStore {
    fn scheme(&self) -> &'static str {
        "conversations"
    }

    fn thread_known(&self, conn: &rusqlite::Connection, thread_id: &str) -> Result<bool, String> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE conversation_id = ?1",
            params![thread_id],
            |row| row.get(0),
        ).map_err(|e| e.to_string())?;
        Ok(count > 0)
    }

    fn append(&self, conn: &rusqlite::Connection, msg: &Message) -> Result<(), String> {
        conn.execute(
            "INSERT INTO conversation_messages (
                message_id,
                message_belongs_to_thread_id,
                message_sender_id,
                message_text,
                message_created_ts
            ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                msg.message_id,
                msg.message_belongs_to_thread_id,
                msg.message_sender_id,
                msg.message_text,
                msg.message_created_ts,
            ],
        ).map_err(|e| format!("Failed to insert message: {}", e))?;
        conn.execute(
            "INSERT OR REPLACE INTO conversations (conversation_id, conversation_last_message_ts) VALUES (?1, ?2)",
            params![msg.message_belongs_to_thread_id, msg.message_created_ts],
        ).map_err(|e| format!("Failed to touch conversation: {}", e))?;
        Ok(())
    }

    fn list_ascending(&self, conn: &rusqlite::Connection, thread_id: &str) -> Result<Vec<Message>, String> {
        let mut stmt = conn.prepare(
            "SELECT * FROM conversation_messages
             WHERE message_belongs_to_thread_id = ?1
             ORDER BY message_created_ts ASC, rowid ASC"
        ).map_err(|e| e.to_string())?;
        let rows = stmt.query(params![thread_id]).map_err(|e| e.to_string())?;
        Ok(messages_from_rows(rows))
    }
}

pub struct MessageStoreChain {
    primary: ThreadMessageStore,
    legacy: ConversationMessageStore,
}

impl Default for MessageStoreChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStoreChain {
    pub fn new() -> Self {
        MessageStoreChain {
            primary: ThreadMessageStore,
            legacy: ConversationMessageStore,
        }
    }

    // Appends under the scheme that knows the thread, primary preferred.
    // Returns the definitive message id, callers correlate safety flags
    // against it rather than against text content.
    pub fn send(
        &self,
        conn: &rusqlite::Connection,
        thread_id: &str,
        sender_id: &str,
        redacted_text: &str,
    ) -> Result<Message, String> {
        let msg = Message {
            message_id: Uuid::new_v4().to_string(),
            message_belongs_to_thread_id: thread_id.to_string(),
            message_sender_id: sender_id.to_string(),
            message_text: redacted_text.to_string(),
            message_created_ts: now_ts(),
        };
        let store: &dyn MessageStore = if self.primary.thread_known(conn, thread_id)? {
            &self.primary
        } else {
            &self.legacy
        };
        store.append(conn, &msg)?;
        info!("message {} appended under {}", msg.message_id, store.scheme());
        pubsub_emit(conn, "message", "update", &json!({
            "thread_id": thread_id,
            "message": msg,
        }))?;
        Ok(msg)
    }

    pub fn list_ascending(
        &self,
        conn: &rusqlite::Connection,
        thread_id: &str,
    ) -> Result<Vec<Message>, String> {
        let messages = self.primary.list_ascending(conn, thread_id)?;
        if !messages.is_empty() || self.primary.thread_known(conn, thread_id)? {
            return Ok(messages);
        }
        self.legacy.list_ascending(conn, thread_id)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad_db::db_schema_20260801::create_tables_20260801;
    use crate::pad_db::db_structs::Thread;
    use crate::pad_db::db_thread::thread_set;

    fn test_conn() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        create_tables_20260801(&conn, false).unwrap();
        conn
    }

    fn seed_thread(conn: &rusqlite::Connection, thread_id: &str) {
        thread_set(conn, &Thread {
            thread_id: thread_id.to_string(),
            thread_participants: vec!["R".to_string(), "H".to_string()],
            thread_kind: "human".to_string(),
            thread_request_id: "req1".to_string(),
            thread_created_ts: 1000.0,
            thread_last_message_ts: 1000.0,
        }).unwrap();
    }

    #[test]
    fn test_send_goes_to_primary_when_thread_exists() {
        let conn = test_conn();
        seed_thread(&conn, "req1_H");
        let chain = MessageStoreChain::new();
        let msg = chain.send(&conn, "req1_H", "H", "on my way").unwrap();
        assert!(!msg.message_id.is_empty());
        let primary_rows = ThreadMessageStore.list_ascending(&conn, "req1_H").unwrap();
        assert_eq!(primary_rows.len(), 1);
        let legacy_rows = ConversationMessageStore.list_ascending(&conn, "req1_H").unwrap();
        assert!(legacy_rows.is_empty());
    }

    #[test]
    fn test_send_falls_back_to_legacy_for_unknown_thread() {
        let conn = test_conn();
        let chain = MessageStoreChain::new();
        chain.send(&conn, "old_convo", "H", "hello").unwrap();
        let legacy_rows = ConversationMessageStore.list_ascending(&conn, "old_convo").unwrap();
        assert_eq!(legacy_rows.len(), 1);
        // the chain reads it back without the caller knowing which scheme answered
        let listed = chain.list_ascending(&conn, "old_convo").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message_text, "hello");
    }

    #[test]
    fn test_legacy_not_consulted_when_primary_has_thread() {
        let conn = test_conn();
        seed_thread(&conn, "req1_H");
        ConversationMessageStore.append(&conn, &Message {
            message_id: "stale".to_string(),
            message_belongs_to_thread_id: "req1_H".to_string(),
            message_sender_id: "X".to_string(),
            message_text: "stale legacy row".to_string(),
            message_created_ts: 1.0,
        }).unwrap();
        let chain = MessageStoreChain::new();
        // primary knows the thread, so an empty primary list is authoritative
        assert!(chain.list_ascending(&conn, "req1_H").unwrap().is_empty());
    }

    #[test]
    fn test_feed_is_non_decreasing_in_created_ts() {
        let conn = test_conn();
        seed_thread(&conn, "req1_H");
        let chain = MessageStoreChain::new();
        for i in 0..5 {
            chain.send(&conn, "req1_H", if i % 2 == 0 { "R" } else { "H" }, &format!("msg {}", i)).unwrap();
        }
        let listed = chain.list_ascending(&conn, "req1_H").unwrap();
        assert_eq!(listed.len(), 5);
        for pair in listed.windows(2) {
            assert!(pair[0].message_created_ts <= pair[1].message_created_ts);
        }
    }

    #[test]
    fn test_send_returns_id_that_appears_in_feed() {
        let conn = test_conn();
        seed_thread(&conn, "req1_H");
        let chain = MessageStoreChain::new();
        let sent = chain.send(&conn, "req1_H", "R", "thank you [hidden-phone]").unwrap();
        let listed = chain.list_ascending(&conn, "req1_H").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message_id, sent.message_id);
    }

    #[test]
    fn test_thread_last_message_ts_bumped() {
        let conn = test_conn();
        seed_thread(&conn, "req1_H");
        let chain = MessageStoreChain::new();
        let msg = chain.send(&conn, "req1_H", "R", "hi").unwrap();
        let trec = crate::pad_db::db_thread::thread_get(&conn, "req1_H").unwrap().unwrap();
        assert_eq!(trec.thread_last_message_ts, msg.message_created_ts);
    }
}
