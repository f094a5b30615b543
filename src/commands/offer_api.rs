use super::{ApiError, AppState, PEER_CONNECTION_HEADER};
use crate::peer::types::SdpKind;
use crate::session::SessionId;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug)]
pub struct OfferRequest {
    pub sdp: String,
    /// Строкой: неизвестный тип должен дойти до проверки, а не упасть в разборе JSON
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AnswerResponse {
    pub id: SessionId,
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: SdpKind,
}

/// POST /screen-share/offer
pub async fn handle_offer(
    State(share): State<AppState>,
    payload: Result<Json<OfferRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let negotiated = share.offer(req.sdp, req.kind).await?;

    let header = [(PEER_CONNECTION_HEADER, negotiated.session_id.to_string())];
    let body = AnswerResponse {
        id: negotiated.session_id,
        sdp: negotiated.answer.sdp,
        kind: negotiated.answer.kind,
    };
    Ok((header, Json(body)))
}
