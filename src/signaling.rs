//! Оркестратор сигнализации: один offer → одна зарегистрированная сессия с
//! answer, либо ошибка без утёкших ресурсов.
//!
//! Порядок шагов жёсткий: захват → транспорт → регистрация → треки →
//! remote description → answer → local description. Треки обязаны быть
//! добавлены до remote description, иначе answer соберётся без нужных m-линий.

use crate::capture::{CaptureSource, CaptureTrack};
use crate::error::{CaptureError, SignalError, TransportError};
use crate::peer::ice::CandidateRelay;
use crate::peer::sdp::SdpSummary;
use crate::peer::state::SessionState;
use crate::peer::transport::TransportFactory;
use crate::peer::types::{SdpKind, SessionDescription};
use crate::reaper::Reaper;
use crate::registry::SessionRegistry;
use crate::session::{AcquiredCapture, AudioAttachment, CaptureLease, Session, SessionId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Результат успешных переговоров
#[derive(Serialize, Debug, Clone)]
pub struct Negotiated {
    pub session_id: SessionId,
    pub answer: SessionDescription,
}

/// Источник id для новых сессий
pub type SessionIds = Arc<dyn Fn() -> SessionId + Send + Sync>;

#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    screen: Arc<dyn CaptureSource>,
    audio: Arc<dyn CaptureSource>,
    transport: Arc<dyn TransportFactory>,
    reaper: Reaper,
    ids: SessionIds,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        screen: Arc<dyn CaptureSource>,
        audio: Arc<dyn CaptureSource>,
        transport: Arc<dyn TransportFactory>,
    ) -> Self {
        let reaper = Reaper::new(registry.clone());
        Self {
            registry,
            screen,
            audio,
            transport,
            reaper,
            ids: Arc::new(SessionId::generate),
        }
    }

    /// Свой генератор id (по умолчанию случайные 16 байт в hex)
    pub fn with_session_ids(mut self, ids: SessionIds) -> Self {
        self.ids = ids;
        self
    }

    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// Принимает offer клиента и возвращает id сессии и зафиксированный answer
    pub async fn negotiate(&self, sdp: String, kind: &str) -> Result<Negotiated, SignalError> {
        // до любых захватов: неизвестный тип описания
        let kind: SdpKind = kind.parse().map_err(|e| {
            error!("Invalid SDP type: {kind:?}");
            e
        })?;
        let offer = SessionDescription { kind, sdp };
        let offer_summary = SdpSummary::parse(&offer.sdp);
        info!(
            %kind,
            sdp_length = offer.sdp.len(),
            offer = %offer_summary,
            "Received offer"
        );

        // 1. захват экрана (+ звук по возможности)
        let capture = self.acquire_capture().await?;
        let tracks = attach_order(&capture);

        // 2. транспорт
        let transport = match self.transport.create_session(&capture.streams()).await {
            Ok(transport) => transport,
            Err(e) => {
                error!("Failed to create peer connection: {e}");
                capture.release();
                return Err(SignalError::TransportCreateFailed(e));
            }
        };

        // 3. регистрация до того, как движок начнёт выдавать кандидатов
        let session_id = (self.ids)();
        let session = Arc::new(Session::new(session_id.clone(), transport, capture));
        if let Err(e) = self.registry.insert(session.clone()) {
            error!(session_id = %session_id, "Failed to register session: {e}");
            // чужую запись в реестре не трогаем, освобождаем только своё
            self.reaper.release(&session).await;
            return Err(e);
        }
        session
            .transport()
            .on_candidate(CandidateRelay::server_candidate_handler(&session));
        session
            .transport()
            .on_connection_state_change(self.reaper.connection_state_handler(&session));

        // 4-7. треки и обмен описаниями
        match self.exchange(&session, &tracks, offer).await {
            Ok(answer) => {
                if !session.set_state(SessionState::Negotiated) {
                    warn!(session_id = %session_id, "Session closed during negotiation");
                    self.reaper.teardown(&session_id).await;
                    return Err(SignalError::LocalDescriptionFailed(TransportError::Closed));
                }
                info!(
                    session_id = %session_id,
                    sdp_length = answer.sdp.len(),
                    "Sending answer to client"
                );
                Ok(Negotiated { session_id, answer })
            }
            Err(e) => {
                error!(session_id = %session_id, "Negotiation failed: {e}");
                self.reaper.teardown(&session_id).await;
                Err(e)
            }
        }
    }

    async fn acquire_capture(&self) -> Result<AcquiredCapture, SignalError> {
        info!(source = self.screen.name(), "Starting screen capture");
        let stream = self.screen.start_capture().await.map_err(|e| {
            error!("Failed to start screen capture: {e}");
            SignalError::CaptureUnavailable(e)
        })?;
        let screen = CaptureLease {
            source: self.screen.clone(),
            stream,
        };

        if screen.stream.video_tracks().is_empty() {
            error!("No video tracks in screen stream!");
            screen.release();
            return Err(SignalError::CaptureUnavailable(CaptureError::NoVideo));
        }

        let bundled = screen.stream.audio_tracks().len();
        let audio = if bundled > 0 {
            info!(audio_tracks = bundled, "Audio already included in screen stream");
            AudioAttachment::Bundled
        } else {
            // звук best-effort: без него продолжаем только с видео
            debug!(source = self.audio.name(), "No audio in screen stream, starting separate audio capture");
            match self.audio.start_capture().await {
                Ok(stream) => {
                    let lease = CaptureLease {
                        source: self.audio.clone(),
                        stream,
                    };
                    if lease.stream.audio_tracks().is_empty() {
                        warn!("Audio capture returned no audio tracks, continuing without audio");
                        lease.release();
                        AudioAttachment::Absent
                    } else {
                        info!("Separate audio capture started successfully");
                        AudioAttachment::Separate(lease)
                    }
                }
                Err(e) => {
                    warn!("Failed to start audio capture, continuing without audio: {e}");
                    AudioAttachment::Absent
                }
            }
        };

        info!(
            video_tracks = screen.stream.video_tracks().len(),
            "Screen capture started successfully"
        );
        Ok(AcquiredCapture { screen, audio })
    }

    async fn exchange(
        &self,
        session: &Session,
        tracks: &[Arc<CaptureTrack>],
        offer: SessionDescription,
    ) -> Result<SessionDescription, SignalError> {
        let transport = session.transport();

        // ВАЖНО: треки ДО установки remote description
        for track in tracks {
            debug!(session_id = %session.id(), track_id = track.id(), kind = ?track.kind(), "Adding track");
            transport
                .add_track(track)
                .await
                .map_err(SignalError::TrackAttachFailed)?;
        }
        info!(session_id = %session.id(), count = tracks.len(), "Tracks added to peer connection");

        transport
            .set_remote_description(offer)
            .await
            .map_err(SignalError::RemoteDescriptionFailed)?;

        let draft = transport
            .create_answer()
            .await
            .map_err(SignalError::AnswerGenerationFailed)?;
        let draft_summary = SdpSummary::parse(&draft.sdp);
        debug!(session_id = %session.id(), answer = %draft_summary, "Answer created");
        if draft_summary.video_codecs().is_empty() {
            warn!(session_id = %session.id(), "No video codecs found in SDP answer!");
        }

        transport
            .set_local_description(draft.clone())
            .await
            .map_err(SignalError::LocalDescriptionFailed)?;

        // после commit движок мог переписать параметры, берём зафиксированное
        let answer = match transport.local_description().await {
            Some(committed) => committed,
            None => {
                warn!(session_id = %session.id(), "Local description is empty, using answer draft");
                draft
            }
        };

        let summary = SdpSummary::parse(&answer.sdp);
        if !summary.has_ice_credentials() {
            warn!(session_id = %session.id(), "Answer SDP does not contain ICE credentials");
        }
        info!(session_id = %session.id(), answer = %summary, "Local description set");
        Ok(answer)
    }
}

/// Видео экрана, затем звук (из того же потока или отдельного)
fn attach_order(capture: &AcquiredCapture) -> Vec<Arc<CaptureTrack>> {
    let mut tracks = capture.screen.stream.video_tracks();
    match &capture.audio {
        AudioAttachment::Bundled => tracks.extend(capture.screen.stream.audio_tracks()),
        AudioAttachment::Separate(lease) => tracks.extend(lease.stream.audio_tracks()),
        AudioAttachment::Absent => {}
    }
    tracks
}
