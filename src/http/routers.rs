use axum::Router;
use axum::routing::post;
use tower_http::cors::CorsLayer;

pub mod v1;

use crate::http::routers::v1::handlers_matches::{handle_v1_matches_sub, handle_v1_request_accept};
use crate::http::routers::v1::handlers_messages::{handle_v1_message_send, handle_v1_messages_sub};
use crate::http::routers::v1::handlers_requests::{
    handle_v1_request_cancel, handle_v1_request_complete, handle_v1_request_create,
    handle_v1_requests_nearby, handle_v1_requests_sub,
};
use crate::http::routers::v1::handlers_session::{
    handle_v1_session_clear, handle_v1_session_persist, handle_v1_session_recover,
};


pub fn make_padlink_http_server() -> Router {
    Router::new()
        .route("/v1/request-create", post(handle_v1_request_create))
        .route("/v1/requests-nearby", post(handle_v1_requests_nearby))
        .route("/v1/request-cancel", post(handle_v1_request_cancel))
        .route("/v1/request-complete", post(handle_v1_request_complete))
        .route("/v1/requests-sub", post(handle_v1_requests_sub))
        .route("/v1/request-accept", post(handle_v1_request_accept))
        .route("/v1/matches-sub", post(handle_v1_matches_sub))
        .route("/v1/message-send", post(handle_v1_message_send))
        .route("/v1/messages-sub", post(handle_v1_messages_sub))
        .route("/v1/session-persist", post(handle_v1_session_persist))
        .route("/v1/session-recover", post(handle_v1_session_recover))
        .route("/v1/session-clear", post(handle_v1_session_clear))
        .layer(CorsLayer::permissive())
}
