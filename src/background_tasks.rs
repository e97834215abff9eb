use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info};

use crate::global_context::SharedGlobalContext;

const PUBSUB_VACUUM_EACH_N_SECONDS: u64 = 3600;
const PUBSUB_KEEP_EVENTS_FOR_SECONDS: f64 = 86400.0;


pub struct BackgroundTasksHolder {
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundTasksHolder {
    pub fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        BackgroundTasksHolder { tasks }
    }

    pub fn push_back(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub async fn abort(self) {
        for task in &self.tasks {
            task.abort();
        }
        let _ = futures::future::join_all(self.tasks).await;
    }
}

pub fn start_background_tasks(gcx: SharedGlobalContext) -> BackgroundTasksHolder {
    BackgroundTasksHolder::new(vec![
        tokio::spawn(pubsub_events_vacuum_task(gcx)),
    ])
}

// The change feed table only ever grows, subscribers poll forward by id and
// never look back further than their connect-time snapshot. Old rows are
// dead weight after a day.
async fn pubsub_events_vacuum_task(gcx: SharedGlobalContext) {
    loop {
        tokio::time::sleep(Duration::from_secs(PUBSUB_VACUUM_EACH_N_SECONDS)).await;
        let lite_arc = {
            let gcx_locked = gcx.read().await;
            let db = gcx_locked.pad_db.lock();
            Arc::clone(&db.lite)
        };
        let cutoff = crate::pad_db::now_ts() - PUBSUB_KEEP_EVENTS_FOR_SECONDS;
        let deleted = {
            let conn = lite_arc.lock();
            conn.execute("DELETE FROM pubsub_events WHERE pubevent_ts < ?1", rusqlite::params![cutoff])
        };
        match deleted {
            Ok(n) if n > 0 => info!("vacuumed {} old pubsub events", n),
            Ok(_) => {}
            Err(e) => error!("pubsub vacuum failed: {}", e),
        }
    }
}
