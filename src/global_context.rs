use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex as ParkMutex;
use structopt::StructOpt;
use tokio::sync::RwLock as ARwLock;
use tracing::info;

use crate::pad_db::db_init::pad_db_init;
use crate::pad_db::db_structs::PadDB;
use crate::rate_limit::SendRateLimiter;


#[derive(Debug, StructOpt, Clone)]
#[structopt(name = "padlink", about = "Request-match-thread lifecycle coordinator")]
pub struct CommandLine {
    #[structopt(long, default_value = "127.0.0.1", help = "Bind address for the HTTP server")]
    pub http_host: String,
    #[structopt(long, default_value = "8101", help = "Bind port for the HTTP server, 0 to disable")]
    pub http_port: u16,
    #[structopt(long, default_value = "", help = "Override the cache directory, default ~/.cache/padlink")]
    pub cache_dir: String,
    #[structopt(long, default_value = "http://127.0.0.1:8008", help = "Base URL of the safety filter / classification service")]
    pub safety_endpoint: String,
    #[structopt(long, default_value = "", help = "Bearer token for the safety service, empty for none")]
    pub safety_api_key: String,
    #[structopt(long, default_value = "", help = "Override the device identity, mostly for tests")]
    pub device_id: String,
    #[structopt(long, default_value = "2000", help = "Maximum outbound message length")]
    pub chat_max_len: usize,
    #[structopt(long, default_value = "5", help = "Send rate limit burst size")]
    pub rate_burst: f64,
    #[structopt(long, default_value = "1.0", help = "Send rate limit refill per second")]
    pub rate_refill_per_sec: f64,
    #[structopt(long, help = "Log to stderr instead of rotated files")]
    pub logs_stderr: bool,
    #[structopt(long, help = "Drop and recreate all tables on start")]
    pub reset_memory: bool,
}

pub struct GlobalContext {
    pub cmdline: CommandLine,
    pub cache_dir: PathBuf,
    pub http_client: reqwest::Client,
    pub pad_db: Arc<ParkMutex<PadDB>>,
    pub device_id: Option<String>,          // memoized by device_id::get_device_id
    pub send_rate_limiter: Arc<ParkMutex<SendRateLimiter>>,
    pub ask_shutdown_sender: Arc<ParkMutex<std::sync::mpsc::Sender<String>>>,
}

pub type SharedGlobalContext = Arc<ARwLock<GlobalContext>>;

pub async fn create_global_context(
    default_cache_dir: PathBuf,
) -> (SharedGlobalContext, std::sync::mpsc::Receiver<String>, CommandLine) {
    let cmdline = CommandLine::from_args();
    let cache_dir = if cmdline.cache_dir.is_empty() {
        default_cache_dir
    } else {
        PathBuf::from(cmdline.cache_dir.clone())
    };
    if let Err(e) = std::fs::create_dir_all(&cache_dir) {
        panic!("failed to create cache dir {}: {}", cache_dir.display(), e);
    }

    let (ask_shutdown_sender, ask_shutdown_receiver) = std::sync::mpsc::channel::<String>();
    let db_path = cache_dir.join("padlink.sqlite");
    let pad_db = pad_db_init(db_path.to_string_lossy().to_string(), cmdline.reset_memory).await;

    let gcx = GlobalContext {
        cmdline: cmdline.clone(),
        cache_dir,
        http_client: reqwest::Client::new(),
        pad_db,
        device_id: None,
        send_rate_limiter: Arc::new(ParkMutex::new(SendRateLimiter::new(
            cmdline.rate_burst,
            cmdline.rate_refill_per_sec,
        ))),
        ask_shutdown_sender: Arc::new(ParkMutex::new(ask_shutdown_sender)),
    };
    (Arc::new(ARwLock::new(gcx)), ask_shutdown_receiver, cmdline)
}

pub async fn block_until_signal(
    ask_shutdown_receiver: std::sync::mpsc::Receiver<String>,
) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("caught ctrl-c, shutting down");
        }
        _ = tokio::task::spawn_blocking(move || {
            let _ = ask_shutdown_receiver.recv();
        }) => {
            info!("shutdown requested");
        }
    }
}
