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
use crate::device_id::get_device_id;
use crate::forward_to_safety_endpoint::classify_message_or_fail_open;
use crate::global_context::GlobalContext;
use crate::match_coordinator::{cancel_request, complete_request};
use crate::pad_db::db_request::{request_create, requests_all_newest_first};
use crate::pad_db::{now_ts, pubsub_max_event_id, pubsub_poll};
use crate::proximity::{nearby, GeoPoint, DEFAULT_MAX_AGE_MINUTES, DEFAULT_MAX_DISTANCE_KM};
use crate::session_recovery::clear_pointer;


// Resolves the acting identity: an explicit id in the request body wins,
// otherwise this device's own identity.
pub async fn actor_or_device_id(
    gcx: Arc<ARwLock<GlobalContext>>,
    given: &str,
) -> Result<String, ScratchError> {
    if !given.trim().is_empty() {
        return Ok(given.trim().to_string());
    }
    get_device_id(gcx).await
        .map_err(|e| ScratchError::new(StatusCode::INTERNAL_SERVER_ERROR, e))
}

fn json_response(payload: serde_json::Value) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[derive(Deserialize)]
struct RequestCreatePost {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    owner_id: String,
    #[serde(default)]
    urgency: String,
    #[serde(default)]
    empathy: Option<String>,
    #[serde(default)]
    note: String,
}

pub async fn handle_v1_request_create(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: RequestCreatePost = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    let owner_id = actor_or_device_id(gcx.clone(), &post.owner_id).await?;

    // urgency and the empathy preview come from the classifier unless the
    // caller already has them; classification failures degrade to defaults
    let (urgency, empathy) = if post.urgency.is_empty() || post.empathy.is_none() {
        let (client, endpoint, api_key) = {
            let gcx_locked = gcx.read().await;
            (
                gcx_locked.http_client.clone(),
                gcx_locked.cmdline.safety_endpoint.clone(),
                gcx_locked.cmdline.safety_api_key.clone(),
            )
        };
        let message = if post.note.trim().is_empty() { "I need a pad" } else { post.note.trim() };
        let classified = classify_message_or_fail_open(&client, &endpoint, &api_key, message).await;
        (
            if post.urgency.is_empty() { classified.urgency } else { post.urgency.clone() },
            post.empathy.clone().or(Some(classified.empathy)),
        )
    } else {
        (post.urgency.clone(), post.empathy.clone())
    };

    let lite_arc = {
        let gcx_locked = gcx.read().await;
        let db = gcx_locked.pad_db.lock();
        db.lite.clone()
    };
    let request_id = {
        let conn = lite_arc.lock();
        request_create(&conn, &owner_id, post.latitude, post.longitude, post.address.clone(), &urgency, empathy.clone())
            .map_err(ScratchError::from)?
    };
    Ok(json_response(json!({
        "request_id": request_id,
        "urgency": urgency,
        "empathy": empathy,
    })))
}

fn default_max_age_minutes() -> f64 {
    DEFAULT_MAX_AGE_MINUTES
}

fn default_max_distance_km() -> f64 {
    DEFAULT_MAX_DISTANCE_KM
}

#[derive(Deserialize)]
struct RequestsNearbyPost {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    owner_id: String,
    #[serde(default = "default_max_age_minutes")]
    max_age_minutes: f64,
    #[serde(default = "default_max_distance_km")]
    max_distance_km: f64,
}

pub async fn handle_v1_requests_nearby(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: RequestsNearbyPost = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    let self_owner_id = actor_or_device_id(gcx.clone(), &post.owner_id).await?;
    let lite_arc = {
        let gcx_locked = gcx.read().await;
        let db = gcx_locked.pad_db.lock();
        db.lite.clone()
    };
    let all = {
        let conn = lite_arc.lock();
        requests_all_newest_first(&conn)
            .map_err(|e| ScratchError::new(StatusCode::SERVICE_UNAVAILABLE, e))?
    };
    let origin = GeoPoint { latitude: post.latitude, longitude: post.longitude };
    let found = nearby(&all, origin, &self_owner_id, post.max_age_minutes, post.max_distance_km, now_ts());
    Ok(json_response(json!({"requests": found})))
}

#[derive(Deserialize)]
struct RequestCancelPost {
    request_id: String,
    #[serde(default)]
    actor_id: String,
    is_requester: bool,
}

pub async fn handle_v1_request_cancel(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: RequestCancelPost = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    let actor_id = actor_or_device_id(gcx.clone(), &post.actor_id).await?;
    let pdb = gcx.read().await.pad_db.clone();
    cancel_request(pdb.clone(), &post.request_id, &actor_id, post.is_requester)
        .map_err(ScratchError::from)?;
    if let Err(e) = clear_pointer(pdb, &actor_id) {
        error!("failed to clear pointer after cancel: {}", e);
    }
    Ok(json_response(json!({"status": "success"})))
}

#[derive(Deserialize)]
struct RequestCompletePost {
    request_id: String,
    #[serde(default)]
    helper_id: String,
}

pub async fn handle_v1_request_complete(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: RequestCompletePost = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    let helper_id = actor_or_device_id(gcx.clone(), &post.helper_id).await?;
    let pdb = gcx.read().await.pad_db.clone();
    complete_request(pdb.clone(), &post.request_id, &helper_id)
        .map_err(ScratchError::from)?;
    if let Err(e) = clear_pointer(pdb, &helper_id) {
        error!("failed to clear pointer after complete: {}", e);
    }
    Ok(json_response(json!({"status": "success"})))
}

pub async fn handle_v1_requests_sub(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    _body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let lite_arc = {
        let gcx_locked = gcx.read().await;
        let db = gcx_locked.pad_db.lock();
        db.lite.clone()
    };
    // a broken snapshot still produces a subscription, just an empty one,
    // so the other side always has something renderable
    let (pre_existing_requests, mut last_event_id) = {
        let conn = lite_arc.lock();
        let requests = requests_all_newest_first(&conn).unwrap_or_else(|e| {
            error!("requests subscription snapshot failed: {}", e);
            Vec::new()
        });
        let max_event_id = pubsub_max_event_id(&conn).unwrap_or(0);
        (requests, max_event_id)
    };

    let sse = stream! {
        yield Ok::<_, ScratchError>(format!("data: {}\n\n", json!({
            "sub_event": "requests_snapshot",
            "requests": pre_existing_requests,
        })));
        let mut interval = interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            let refreshed = {
                let conn = lite_arc.lock();
                pubsub_poll(&conn, "request", &mut last_event_id).and_then(|events| {
                    if events.is_empty() {
                        Ok(None)
                    } else {
                        requests_all_newest_first(&conn).map(Some)
                    }
                })
            };
            match refreshed {
                Ok(None) => {}
                Ok(Some(requests)) => {
                    yield Ok::<_, ScratchError>(format!("data: {}\n\n", json!({
                        "sub_event": "requests_snapshot",
                        "requests": requests,
                    })));
                }
                Err(e) => {
                    // degrade to an empty, still-renderable feed and keep going
                    error!("requests subscription poll failed: {}", e);
                    yield Ok::<_, ScratchError>(format!("data: {}\n\n", json!({
                        "sub_event": "requests_snapshot",
                        "requests": [],
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
