//! Протокольная поверхность демонстрации экрана, не привязанная к транспорту
//! сигнализации: offer, кандидаты в обе стороны, hangup.

use crate::capture::{CaptureSource, DeviceCapture, IvfVideoDevice, MediaDevice, OggAudioDevice};
use crate::config::Settings;
use crate::error::SignalError;
use crate::peer::connection::RtcTransportFactory;
use crate::peer::ice::CandidateRelay;
use crate::peer::transport::TransportFactory;
use crate::peer::types::IceCandidate;
use crate::reaper::Reaper;
use crate::registry::SessionRegistry;
use crate::session::{SessionId, SessionInfo};
use crate::signaling::{Negotiated, Orchestrator, SessionIds};
use std::sync::Arc;
use tracing::{error, info};

pub struct ScreenShare {
    registry: Arc<SessionRegistry>,
    orchestrator: Orchestrator,
    relay: CandidateRelay,
    reaper: Reaper,
}

impl ScreenShare {
    pub fn new(
        transport: Arc<dyn TransportFactory>,
        screen: Arc<dyn CaptureSource>,
        audio: Arc<dyn CaptureSource>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let orchestrator = Orchestrator::new(registry.clone(), screen, audio, transport);
        let reaper = orchestrator.reaper().clone();
        Self {
            relay: CandidateRelay::new(registry.clone()),
            registry,
            orchestrator,
            reaper,
        }
    }

    pub fn with_session_ids(mut self, ids: SessionIds) -> Self {
        self.orchestrator = self.orchestrator.with_session_ids(ids);
        self
    }

    /// Сборка из настроек: webrtc-rs транспорт и файловые устройства захвата
    pub fn from_settings(settings: &Settings) -> Self {
        let video: Option<Arc<dyn MediaDevice>> = settings
            .video_ivf_path
            .as_ref()
            .map(|path| Arc::new(IvfVideoDevice::new(path)) as Arc<dyn MediaDevice>);
        let audio: Option<Arc<dyn MediaDevice>> = settings
            .audio_ogg_path
            .as_ref()
            .map(|path| Arc::new(OggAudioDevice::new(path)) as Arc<dyn MediaDevice>);

        let (screen, audio) = match (video, audio) {
            (None, _) => (
                DeviceCapture::unavailable("screen"),
                DeviceCapture::unavailable("audio"),
            ),
            (Some(video), None) => (
                DeviceCapture::new("screen", vec![video]),
                DeviceCapture::unavailable("audio"),
            ),
            (Some(video), Some(audio)) if settings.bundle_audio => (
                // экран со звуком, при отказе только экран
                DeviceCapture::new("screen", vec![video.clone(), audio.clone()])
                    .with_fallback(vec![video]),
                DeviceCapture::new("audio", vec![audio]),
            ),
            (Some(video), Some(audio)) => (
                DeviceCapture::new("screen", vec![video]),
                DeviceCapture::new("audio", vec![audio]),
            ),
        };

        info!(
            video = ?settings.video_ivf_path,
            audio = ?settings.audio_ogg_path,
            bundle_audio = settings.bundle_audio,
            "Capture devices configured"
        );

        Self::new(
            Arc::new(RtcTransportFactory::new(&settings.ice_servers)),
            Arc::new(screen),
            Arc::new(audio),
        )
    }

    /// Переговоры идут в отдельной задаче: обрыв запроса не прерывает их
    /// посередине, сессия либо регистрируется целиком, либо разбирается.
    pub async fn offer(&self, sdp: String, kind: String) -> Result<Negotiated, SignalError> {
        let orchestrator = self.orchestrator.clone();
        let task = tokio::spawn(async move { orchestrator.negotiate(sdp, &kind).await });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Negotiation task aborted: {e}");
                Err(SignalError::Aborted(e.to_string()))
            }
        }
    }

    pub async fn submit_client_candidate(
        &self,
        id: &SessionId,
        candidate: IceCandidate,
    ) -> Result<(), SignalError> {
        self.relay.submit_client_candidate(id, candidate).await
    }

    pub fn poll_server_candidates(&self, id: &SessionId) -> Result<Vec<IceCandidate>, SignalError> {
        self.relay.server_candidates(id)
    }

    /// Завершение по запросу клиента; неизвестный id тоже успех
    pub async fn hangup(&self, id: &SessionId) -> Result<(), SignalError> {
        if !self.reaper.teardown(id).await {
            info!(session_id = %id, "Hangup for unknown or already closed session");
        }
        Ok(())
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.registry.sessions().iter().map(|s| s.info()).collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Разбирает все живые сессии (остановка сервиса)
    pub async fn shutdown(&self) {
        let sessions = self.registry.sessions();
        info!(count = sessions.len(), "Closing all screen share sessions");
        for session in sessions {
            self.reaper.teardown(session.id()).await;
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}
