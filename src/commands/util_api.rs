use super::{ApiError, AppState};
use crate::session::{SessionId, SessionInfo};
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

/// POST /screen-share/hangup/{id}
pub async fn hangup(
    State(share): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    share.hangup(&SessionId::from(id)).await?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Serialize, Debug)]
pub struct SessionList {
    pub sessions: Vec<SessionInfo>,
}

pub async fn list_sessions(State(share): State<AppState>) -> Json<SessionList> {
    Json(SessionList {
        sessions: share.sessions(),
    })
}

pub async fn health(State(share): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "sessions": share.registry().len() }))
}
