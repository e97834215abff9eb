use std::sync::Arc;

use axum::Extension;
use axum::response::Result;
use hyper::{Body, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock as ARwLock;

use crate::custom_error::ScratchError;
use crate::global_context::GlobalContext;
use crate::http::routers::v1::handlers_requests::actor_or_device_id;
use crate::pad_db::db_structs::ActiveThreadPointer;
use crate::session_recovery::{clear_pointer, persist_pointer, recover_on_start};


fn json_response(payload: serde_json::Value) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[derive(Deserialize)]
struct SessionPersistPost {
    #[serde(default)]
    device_id: String,
    thread_id: String,
    request_id: String,
    other_id: String,
    role: String,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    is_topk: bool,
}

pub async fn handle_v1_session_persist(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: SessionPersistPost = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    if post.role != "requester" && post.role != "helper" {
        return Err(ScratchError::new(StatusCode::BAD_REQUEST, format!("unknown role {:?}", post.role)));
    }
    let device_id = actor_or_device_id(gcx.clone(), &post.device_id).await?;
    let pdb = gcx.read().await.pad_db.clone();
    persist_pointer(pdb, &ActiveThreadPointer {
        pointer_device_id: device_id,
        pointer_thread_id: post.thread_id,
        pointer_request_id: post.request_id,
        pointer_other_id: post.other_id,
        pointer_role: post.role,
        pointer_urgency: post.urgency,
        pointer_is_topk: post.is_topk,
    }).map_err(ScratchError::from)?;
    Ok(json_response(json!({"status": "success"})))
}

#[derive(Deserialize)]
struct SessionPost {
    #[serde(default)]
    device_id: String,
}

// App relaunch: either resume straight into the conversation, or land on the
// default view because the cached pointer went stale.
pub async fn handle_v1_session_recover(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: SessionPost = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    let device_id = actor_or_device_id(gcx.clone(), &post.device_id).await?;
    let pdb = gcx.read().await.pad_db.clone();
    let pointer = recover_on_start(pdb, &device_id)
        .map_err(|e| ScratchError::new(StatusCode::SERVICE_UNAVAILABLE, e))?;
    match pointer {
        Some(pointer) => Ok(json_response(json!({"active": true, "pointer": pointer}))),
        None => Ok(json_response(json!({"active": false}))),
    }
}

pub async fn handle_v1_session_clear(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: SessionPost = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    let device_id = actor_or_device_id(gcx.clone(), &post.device_id).await?;
    let pdb = gcx.read().await.pad_db.clone();
    clear_pointer(pdb, &device_id)
        .map_err(|e| ScratchError::new(StatusCode::SERVICE_UNAVAILABLE, e))?;
    Ok(json_response(json!({"status": "success"})))
}
