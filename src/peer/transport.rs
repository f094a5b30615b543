use crate::capture::{CaptureTrack, MediaStream};
use crate::error::TransportError;
use crate::peer::state::ConnectionState;
use crate::peer::types::{IceCandidate, SessionDescription};
use async_trait::async_trait;
use std::sync::Arc;

/// Обработчик локальных кандидатов; `None` означает конец сбора
pub type CandidateHandler = Arc<dyn Fn(Option<IceCandidate>) + Send + Sync>;

/// Обработчик смены состояния соединения
pub type StateHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Одна P2P сессия транспорта (peer connection)
#[async_trait]
pub trait TransportSession: Send + Sync {
    fn on_candidate(&self, handler: CandidateHandler);

    fn on_connection_state_change(&self, handler: StateHandler);

    async fn add_track(&self, track: &CaptureTrack) -> Result<(), TransportError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), TransportError>;

    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Фабрика транспортных сессий
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create_session(
        &self,
        streams: &[&MediaStream],
    ) -> Result<Arc<dyn TransportSession>, TransportError>;
}
