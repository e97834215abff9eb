use tracing::info;
use uuid::Uuid;

use crate::global_context::SharedGlobalContext;

// Stable actor identity for this installation: memoized for the process
// lifetime, persisted in the cache dir so it survives restarts. Tests and
// odd deployments inject one with --device-id.
pub async fn get_device_id(gcx: SharedGlobalContext) -> Result<String, String> {
    {
        let gcx_locked = gcx.read().await;
        if let Some(device_id) = &gcx_locked.device_id {
            return Ok(device_id.clone());
        }
    }
    let (cmdline_device_id, id_path) = {
        let gcx_locked = gcx.read().await;
        (gcx_locked.cmdline.device_id.clone(), gcx_locked.cache_dir.join("device_id"))
    };

    let device_id = if !cmdline_device_id.trim().is_empty() {
        cmdline_device_id.trim().to_string()
    } else {
        match tokio::fs::read_to_string(&id_path).await {
            Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
            _ => {
                let fresh = format!("install:{}", Uuid::new_v4());
                tokio::fs::write(&id_path, &fresh).await
                    .map_err(|e| format!("failed to persist device id to {}: {}", id_path.display(), e))?;
                info!("generated new device id");
                fresh
            }
        }
    };
    if device_id.is_empty() {
        return Err("device id must be non-empty".to_string());
    }

    let mut gcx_locked = gcx.write().await;
    gcx_locked.device_id = Some(device_id.clone());
    Ok(device_id)
}
