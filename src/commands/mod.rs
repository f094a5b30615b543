//! HTTP-привязка демонстрации экрана (`/screen-share/...`)

pub mod candidate_api;
pub mod offer_api;
pub mod util_api;

use crate::error::SignalError;
use crate::screen_share::ScreenShare;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Заголовок с id сессии в ответе на offer
pub const PEER_CONNECTION_HEADER: &str = "X-Peer-Connection-ID";

pub type AppState = Arc<ScreenShare>;

pub fn router(share: AppState) -> Router {
    let screen_share = Router::new()
        .route("/offer", post(offer_api::handle_offer))
        .route(
            "/ice/{id}",
            post(candidate_api::submit_candidate).get(candidate_api::poll_candidates),
        )
        .route("/hangup/{id}", post(util_api::hangup))
        .route("/sessions", get(util_api::list_sessions))
        .route("/health", get(util_api::health));

    Router::new()
        .nest("/screen-share", screen_share)
        .layer(TraceLayer::new_for_http())
        .with_state(share)
}

/// Ошибка в виде `{"error": "..."}` с подходящим статусом
#[derive(Debug)]
pub enum ApiError {
    Signal(SignalError),
    /// Тело запроса не разобралось как JSON нужной формы
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Signal(e) => match e {
                SignalError::InvalidDescriptionKind(_) | SignalError::CandidateRejected(_) => {
                    StatusCode::BAD_REQUEST
                }
                SignalError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                SignalError::CaptureUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Signal(e) => e.to_string(),
            ApiError::BadRequest(reason) => reason.clone(),
        }
    }
}

impl From<SignalError> for ApiError {
    fn from(e: SignalError) -> Self {
        Self::Signal(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}
