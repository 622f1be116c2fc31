//! HTTP control plane: inventory, history, and dispatch endpoints.

mod agents;
pub mod validators;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Frozen error body used by every non-2xx response from this module.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorEnvelope {
            code: "BAD_REQUEST".to_owned(),
            message: message.to_owned(),
        }),
    )
        .into_response()
}

fn internal_error(err: &impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorEnvelope {
            code: "INTERNAL_ERROR".to_owned(),
            message: err.to_string(),
        }),
    )
        .into_response()
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/agents/count", get(agents::count))
        .route("/agents/:entity/list", get(agents::list))
        .route("/agents/:entity/history", get(agents::history))
        .route("/agents/:entity/cmd", post(agents::cmd))
        .route("/agents/:entity/script", post(agents::script))
        .route("/agents/:entity/delete", delete(agents::delete))
        .route(
            "/timeout",
            get(agents::get_timeout).put(agents::put_timeout),
        )
        .fallback(not_found)
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorEnvelope {
            code: "NOT_FOUND".to_owned(),
            message: "no such route".to_owned(),
        }),
    )
}
