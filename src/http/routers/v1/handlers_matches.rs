use std::sync::Arc;

use async_stream::stream;
use axum::Extension;
use axum::response::Result;
use hyper::{Body, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock as ARwLock;
use tokio::time::{interval, Duration};
use tracing::error;

use crate::custom_error::ScratchError;
use crate::global_context::GlobalContext;
use crate::http::routers::v1::handlers_requests::actor_or_device_id;
use crate::match_coordinator::{accept_request, match_id_for};
use crate::pad_db::db_match::match_first_active_for_requester;
use crate::pad_db::db_request::request_get;
use crate::pad_db::db_structs::ActiveThreadPointer;
use crate::pad_db::{pubsub_max_event_id, pubsub_poll};
use crate::session_recovery::persist_pointer;


#[derive(Deserialize)]
struct RequestAcceptPost {
    request_id: String,
    #[serde(default)]
    helper_id: String,
}

pub async fn handle_v1_request_accept(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: RequestAcceptPost = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    let helper_id = actor_or_device_id(gcx.clone(), &post.helper_id).await?;
    let pdb = gcx.read().await.pad_db.clone();

    let request = {
        let lite_arc = pdb.lock().lite.clone();
        let conn = lite_arc.lock();
        request_get(&conn, &post.request_id)
            .map_err(|e| ScratchError::new(StatusCode::SERVICE_UNAVAILABLE, e))?
            .ok_or_else(|| ScratchError::new(StatusCode::NOT_FOUND, format!("No request found with id: {}", post.request_id)))?
    };
    let requester_id = request.request_owner_id.clone();
    let thread_id = accept_request(pdb.clone(), &post.request_id, &helper_id, &requester_id)
        .map_err(ScratchError::from)?;

    // the accepting device lands straight in the conversation on relaunch
    let pointer = ActiveThreadPointer {
        pointer_device_id: helper_id.clone(),
        pointer_thread_id: thread_id.clone(),
        pointer_request_id: post.request_id.clone(),
        pointer_other_id: requester_id.clone(),
        pointer_role: "helper".to_string(),
        pointer_urgency: Some(request.request_urgency.clone()),
        pointer_is_topk: false,
    };
    if let Err(e) = persist_pointer(pdb, &pointer) {
        error!("failed to persist pointer after accept: {}", e);
    }

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Body::from(json!({
            "match_id": match_id_for(&post.request_id, &helper_id),
            "thread_id": thread_id,
            "requester_id": requester_id,
        }).to_string()))
        .unwrap();
    Ok(response)
}

#[derive(Deserialize)]
struct MatchesSubscription {
    #[serde(default)]
    requester_id: String,
}

// Routes a requester into the first thread that becomes available. One event
// per change on the match channel, an explicit null when nothing is active.
pub async fn handle_v1_matches_sub(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: MatchesSubscription = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    let requester_id = actor_or_device_id(gcx.clone(), &post.requester_id).await?;
    let lite_arc = {
        let gcx_locked = gcx.read().await;
        let db = gcx_locked.pad_db.lock();
        db.lite.clone()
    };
    // degrade to "nothing active" rather than refusing the subscription
    let (first_active, mut last_event_id) = {
        let conn = lite_arc.lock();
        let mrec = match_first_active_for_requester(&conn, &requester_id).unwrap_or_else(|e| {
            error!("matches subscription snapshot failed: {}", e);
            None
        });
        let max_event_id = pubsub_max_event_id(&conn).unwrap_or(0);
        (mrec, max_event_id)
    };

    let sse = stream! {
        yield Ok::<_, ScratchError>(format!("data: {}\n\n", json!({
            "sub_event": "active_match",
            "match": first_active,
        })));
        let mut interval = interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            let refreshed = {
                let conn = lite_arc.lock();
                pubsub_poll(&conn, "match", &mut last_event_id).and_then(|events| {
                    if events.is_empty() {
                        Ok(None)
                    } else {
                        match_first_active_for_requester(&conn, &requester_id).map(Some)
                    }
                })
            };
            match refreshed {
                Ok(None) => {}
                Ok(Some(mrec)) => {
                    yield Ok::<_, ScratchError>(format!("data: {}\n\n", json!({
                        "sub_event": "active_match",
                        "match": mrec,
                    })));
                }
                Err(e) => {
                    error!("matches subscription poll failed: {}", e);
                    yield Ok::<_, ScratchError>(format!("data: {}\n\n", json!({
                        "sub_event": "active_match",
                        "match": null,
                    })));
                }
            }
        }
    };

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-cache")
        .body(Body::wrap_stream(sse))
        .unwrap();
    Ok(response)
}
