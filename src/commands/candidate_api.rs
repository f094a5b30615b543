use super::{ApiError, AppState};
use crate::peer::types::IceCandidate;
use crate::session::SessionId;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Serialize, Deserialize, Debug)]
pub struct CandidateList {
    pub candidates: Vec<IceCandidate>,
}

/// POST /screen-share/ice/{id}: кандидат клиента в формате `RTCIceCandidate.toJSON()`
pub async fn submit_candidate(
    State(share): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<IceCandidate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(candidate) = payload?;
    share
        .submit_client_candidate(&SessionId::from(id), candidate)
        .await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// GET /screen-share/ice/{id}: все серверные кандидаты на текущий момент
pub async fn poll_candidates(
    State(share): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CandidateList>, ApiError> {
    let candidates = share.poll_server_candidates(&SessionId::from(id))?;
    Ok(Json(CandidateList { candidates }))
}
