use std::sync::Arc;
use parking_lot::Mutex as ParkMutex;
use rusqlite::Connection;

use crate::pad_db::db_structs::PadDB;


fn _make_connection(
    pad_db_fn: String,
) -> Result<Arc<ParkMutex<PadDB>>, String> {
    let db = Connection::open_with_flags(
        pad_db_fn,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
        | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
        | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX
        | rusqlite::OpenFlags::SQLITE_OPEN_URI
    ).map_err(|err| format!("Failed to open database: {}", err))?;
    db.busy_timeout(std::time::Duration::from_secs(30)).map_err(|err| format!("Failed to set busy timeout: {}", err))?;
    db.execute_batch("PRAGMA cache_size = 0; PRAGMA shared_cache = OFF;").map_err(|err| format!("Failed to set cache pragmas: {}", err))?;
    let journal_mode: String = db.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0)).map_err(|err| format!("Failed to set journal mode: {}", err))?;
    if journal_mode != "wal" {
        return Err(format!("Failed to set WAL journal mode. Current mode: {}", journal_mode));
    }
    let db = PadDB {
        lite: Arc::new(ParkMutex::new(db)),
    };
    Ok(Arc::new(ParkMutex::new(db)))
}

pub async fn pad_db_init(
    pad_db_fn: String,
    reset_memory: bool,
) -> Arc<ParkMutex<PadDB>> {
    let db = match _make_connection(pad_db_fn) {
        Ok(db) => db,
        Err(err) => panic!("Failed to initialize pad database: {}", err),
    };
    let lite_arc = {
        db.lock().lite.clone()
    };
    crate::pad_db::db_schema_20260801::create_tables_20260801(&lite_arc.lock(), reset_memory).expect("Failed to create tables");
    db
}
