use crate::session::SessionId;
use thiserror::Error;

/// Ошибка движка транспорта (webrtc-rs или тестовый двойник)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Engine(#[from] webrtc::Error),

    #[error("{0}")]
    Rejected(String),

    #[error("transport session is closed")]
    Closed,
}

/// Ошибка источника захвата
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capture device configured for {0}")]
    NoDevice(String),

    #[error("device {device} failed to open: {reason}")]
    Open { device: String, reason: String },

    #[error("capture stream has no video tracks")]
    NoVideo,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid ICE server {id}: {reason}")]
    IceServer { id: String, reason: String },

    #[error("invalid listen address {0}")]
    ListenAddr(String),
}

/// Классы отказов, которые видит вызывающая сторона
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Request,
    Capture,
    TransportCreation,
    DescriptionExchange,
    Session,
    Internal,
}

/// Ошибки сигнального слоя.
///
/// Причина печатается в самом сообщении (его же получает HTTP-клиент),
/// поэтому через `source()` она не отдаётся.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("invalid session description kind: {0:?}")]
    InvalidDescriptionKind(String),

    #[error("failed to start screen capture: {0}")]
    CaptureUnavailable(CaptureError),

    #[error("failed to create peer connection: {0}")]
    TransportCreateFailed(TransportError),

    #[error("failed to add tracks: {0}")]
    TrackAttachFailed(TransportError),

    #[error("failed to set remote description: {0}")]
    RemoteDescriptionFailed(TransportError),

    #[error("failed to create answer: {0}")]
    AnswerGenerationFailed(TransportError),

    #[error("failed to set local description: {0}")]
    LocalDescriptionFailed(TransportError),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("candidate rejected: {0}")]
    CandidateRejected(TransportError),

    #[error("duplicate session id {0}")]
    DuplicateSessionId(SessionId),

    #[error("negotiation task aborted: {0}")]
    Aborted(String),
}

impl SignalError {
    pub fn class(&self) -> FailureClass {
        match self {
            SignalError::InvalidDescriptionKind(_) => FailureClass::Request,
            SignalError::CaptureUnavailable(_) => FailureClass::Capture,
            SignalError::TransportCreateFailed(_) => FailureClass::TransportCreation,
            SignalError::TrackAttachFailed(_)
            | SignalError::RemoteDescriptionFailed(_)
            | SignalError::AnswerGenerationFailed(_)
            | SignalError::LocalDescriptionFailed(_) => FailureClass::DescriptionExchange,
            SignalError::SessionNotFound(_) | SignalError::CandidateRejected(_) => {
                FailureClass::Session
            }
            SignalError::DuplicateSessionId(_) | SignalError::Aborted(_) => FailureClass::Internal,
        }
    }

    /// Имеет ли смысл повторить переговоры целиком с нуля
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            FailureClass::Capture | FailureClass::TransportCreation | FailureClass::Internal
        )
    }
}
