use std::io::Write;

use tracing::{error, info};

use crate::background_tasks::start_background_tasks;

mod background_tasks;
mod custom_error;
mod device_id;
mod forward_to_safety_endpoint;
mod global_context;
mod http;
mod match_coordinator;
mod pad_db;
mod proximity;
mod rate_limit;
mod session_recovery;

#[tokio::main]
async fn main() {
    let home_dir = home::home_dir().ok_or(()).expect("failed to find home dir");
    let cache_dir = home_dir.join(".cache/padlink");
    let (gcx, ask_shutdown_receiver, cmdline) = global_context::create_global_context(cache_dir.clone()).await;
    let (logs_writer, _guard) = if cmdline.logs_stderr {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        write!(std::io::stderr(), "This binary keeps logs as files, rotated daily. Try\ntail -f {}/logs/\nor use --logs-stderr for debugging.\n\n", cache_dir.display()).unwrap();
        tracing_appender::non_blocking(tracing_appender::rolling::RollingFileAppender::new(
            tracing_appender::rolling::Rotation::DAILY,
            cache_dir.join("logs"),
            "padlink",
        ))
    };
    let _tracing = tracing_subscriber::fmt()
        .with_writer(logs_writer)
        .with_target(true)
        .with_line_number(true)
        .compact()
        .with_ansi(false)
        .init();
    {
        let gcx_locked = gcx.read().await;
        info!("started padlink, cache dir: {}", gcx_locked.cache_dir.display());
        info!("safety endpoint: {}", gcx_locked.cmdline.safety_endpoint);
    }
    match device_id::get_device_id(gcx.clone()).await {
        Ok(device_id) => info!("device id: {}", device_id),
        Err(e) => error!("device id unavailable: {}", e),
    }

    let background_tasks = start_background_tasks(gcx.clone());

    let gcx_clone = gcx.clone();
    let server = http::start_server(gcx_clone, ask_shutdown_receiver);
    if let Some(server_task) = server.await {
        let server_result = server_task.await;
        if let Err(e) = server_result {
            error!("server error: {}", e);
        }
    }

    background_tasks.abort().await;
    info!("clean exit");
}
