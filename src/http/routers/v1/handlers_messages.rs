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
use crate::forward_to_safety_endpoint::filter_message_or_fail_open;
use crate::global_context::GlobalContext;
use crate::http::routers::v1::handlers_requests::actor_or_device_id;
use crate::pad_db::db_message::MessageStoreChain;
use crate::pad_db::{now_ts, pubsub_max_event_id, pubsub_poll};


#[derive(Deserialize)]
struct MessageSendPost {
    thread_id: String,
    #[serde(default)]
    sender_id: String,
    text: String,
}

// The send path: length check, rate limit, safety filter, append. The
// response carries the definitive message id together with the redaction
// flags, so the client never has to guess which message a flag belongs to.
pub async fn handle_v1_message_send(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: MessageSendPost = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    if post.thread_id.trim().is_empty() {
        return Err(ScratchError::new(StatusCode::BAD_REQUEST, "thread_id must be non-empty".to_string()));
    }
    if post.text.trim().is_empty() {
        return Err(ScratchError::new(StatusCode::BAD_REQUEST, "text must be non-empty".to_string()));
    }
    let chat_max_len = gcx.read().await.cmdline.chat_max_len;
    if post.text.chars().count() > chat_max_len {
        return Err(ScratchError::new(StatusCode::BAD_REQUEST, format!("message longer than {} characters", chat_max_len)));
    }
    let sender_id = actor_or_device_id(gcx.clone(), &post.sender_id).await?;

    {
        let gcx_locked = gcx.read().await;
        let mut limiter = gcx_locked.send_rate_limiter.lock();
        if !limiter.allow_send(&sender_id, &post.thread_id, now_ts()) {
            let remaining = limiter.remaining_tokens(&sender_id, &post.thread_id, now_ts());
            return Err(ScratchError::new(
                StatusCode::TOO_MANY_REQUESTS,
                format!("sending too fast, {:.1} tokens left, try again in a moment", remaining),
            ));
        }
    }

    let (client, endpoint, api_key) = {
        let gcx_locked = gcx.read().await;
        (
            gcx_locked.http_client.clone(),
            gcx_locked.cmdline.safety_endpoint.clone(),
            gcx_locked.cmdline.safety_api_key.clone(),
        )
    };
    let filtered = filter_message_or_fail_open(&client, &endpoint, &api_key, &post.text).await;

    let lite_arc = {
        let gcx_locked = gcx.read().await;
        let db = gcx_locked.pad_db.lock();
        db.lite.clone()
    };
    let msg = {
        let conn = lite_arc.lock();
        MessageStoreChain::new().send(&conn, &post.thread_id, &sender_id, &filtered.text_redacted)
            .map_err(|e| ScratchError::new(StatusCode::SERVICE_UNAVAILABLE, e))?
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Body::from(json!({
            "message_id": msg.message_id,
            "text_redacted": msg.message_text,
            "flags": filtered.flags,
            "created_ts": msg.message_created_ts,
        }).to_string()))
        .unwrap())
}

#[derive(Deserialize)]
struct MessagesSubscription {
    thread_id: String,
}

pub async fn handle_v1_messages_sub(
    Extension(gcx): Extension<Arc<ARwLock<GlobalContext>>>,
    body_bytes: hyper::body::Bytes,
) -> Result<Response<Body>, ScratchError> {
    let post: MessagesSubscription = serde_json::from_slice(&body_bytes).map_err(|e| {
        ScratchError::new(StatusCode::BAD_REQUEST, format!("JSON problem: {}", e))
    })?;
    let lite_arc = {
        let gcx_locked = gcx.read().await;
        let db = gcx_locked.pad_db.lock();
        db.lite.clone()
    };
    let chain = MessageStoreChain::new();
    let (pre_existing_messages, mut last_event_id) = {
        let conn = lite_arc.lock();
        let messages = chain.list_ascending(&conn, &post.thread_id).unwrap_or_else(|e| {
            error!("messages subscription snapshot failed: {}", e);
            Vec::new()
        });
        let max_event_id = pubsub_max_event_id(&conn).unwrap_or(0);
        (messages, max_event_id)
    };

    let thread_id = post.thread_id.clone();
    let sse = stream! {
        yield Ok::<_, ScratchError>(format!("data: {}\n\n", json!({
            "sub_event": "messages_snapshot",
            "messages": pre_existing_messages,
        })));
        let mut interval = interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            let events = {
                let conn = lite_arc.lock();
                pubsub_poll(&conn, "message", &mut last_event_id)
            };
            match events {
                Ok(events) => {
                    for event in events {
                        if event["thread_id"].as_str() != Some(thread_id.as_str()) {
                            continue;
                        }
                        yield Ok::<_, ScratchError>(format!("data: {}\n\n", json!({
                            "sub_event": "message_update",
                            "message": event["message"],
                        })));
                    }
                }
                Err(e) => {
                    // keep the feed alive, the client still has its snapshot
                    error!("messages subscription poll failed: {}", e);
                    yield Ok::<_, ScratchError>(format!("data: {}\n\n", json!({
                        "sub_event": "messages_snapshot",
                        "messages": [],
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
