use crate::capture::{CaptureSource, MediaStream};
use crate::logger::dump_candidate;
use crate::peer::ice::analyze_candidates;
use crate::peer::state::SessionState;
use crate::peer::transport::TransportSession;
use crate::peer::types::IceCandidate;
use crate::utils::random_id;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Идентификатор сессии; выдаётся один раз и не переиспользуется
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(random_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Поток захвата вместе с источником, который его выдал
pub struct CaptureLease {
    pub source: Arc<dyn CaptureSource>,
    pub stream: MediaStream,
}

impl CaptureLease {
    /// Закрывает треки и останавливает источник
    pub fn release(self) {
        for track in self.stream.all_tracks() {
            track.close();
        }
        self.source.stop_capture(&self.stream);
    }
}

/// Откуда у сессии звук
pub enum AudioAttachment {
    /// Звук пришёл в том же потоке, что и экран
    Bundled,
    /// Звук захвачен отдельным источником, останавливается отдельно
    Separate(CaptureLease),
    Absent,
}

/// Ровно те ресурсы захвата, которые сессия реально получила
pub struct AcquiredCapture {
    pub screen: CaptureLease,
    pub audio: AudioAttachment,
}

impl AcquiredCapture {
    pub fn streams(&self) -> Vec<&MediaStream> {
        let mut streams = vec![&self.screen.stream];
        if let AudioAttachment::Separate(lease) = &self.audio {
            streams.push(&lease.stream);
        }
        streams
    }

    pub fn has_audio(&self) -> bool {
        match &self.audio {
            AudioAttachment::Bundled => true,
            AudioAttachment::Separate(_) => true,
            AudioAttachment::Absent => false,
        }
    }

    pub fn release(self) {
        self.screen.release();
        if let AudioAttachment::Separate(lease) = self.audio {
            lease.release();
        }
    }
}

/// Снимок сессии для внешнего мира
#[derive(Serialize, Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub server_candidates: usize,
    pub gathering_complete: bool,
    pub has_audio: bool,
}

struct Candidates {
    list: Vec<IceCandidate>,
    gathering_complete: bool,
}

/// Одна оркестрируемая сессия: транспорт, захват и серверные кандидаты
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    transport: Arc<dyn TransportSession>,
    has_audio: bool,
    // порядок замков: state, затем candidates; после Closed кандидаты не принимаются
    state: Mutex<SessionState>,
    candidates: Mutex<Candidates>,
    capture: Mutex<Option<AcquiredCapture>>,
    transport_closed: AtomicBool,
}

impl Session {
    pub fn new(
        id: SessionId,
        transport: Arc<dyn TransportSession>,
        capture: AcquiredCapture,
    ) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            transport,
            has_audio: capture.has_audio(),
            state: Mutex::new(SessionState::Negotiating),
            candidates: Mutex::new(Candidates {
                list: Vec::new(),
                gathering_complete: false,
            }),
            capture: Mutex::new(Some(capture)),
            transport_closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn transport(&self) -> &Arc<dyn TransportSession> {
        &self.transport
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Переход состояния; из Closed выхода нет
    pub fn set_state(&self, next: SessionState) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        if *state != next {
            debug!(session_id = %self.id, from = %*state, to = %next, "Session state changed");
            *state = next;
        }
        true
    }

    /// Помечает сессию закрытой. Возвращает false, если она уже была закрыта.
    pub fn mark_closed(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = SessionState::Closed;
        true
    }

    /// Уведомление движка о локальном кандидате; `None` означает конец сбора
    pub fn push_server_candidate(&self, candidate: Option<IceCandidate>) {
        let state = self.state.lock();
        if state.is_terminal() {
            debug!(session_id = %self.id, "Late candidate discarded for closed session");
            return;
        }
        let mut candidates = self.candidates.lock();
        drop(state);

        match candidate {
            Some(c) => {
                dump_candidate("LOCAL", self.id.as_str(), &c);
                candidates.list.push(c);
            }
            None => {
                candidates.gathering_complete = true;
                info!(
                    session_id = %self.id,
                    count = candidates.list.len(),
                    "Server ICE candidate gathering complete"
                );
                analyze_candidates(&candidates.list);
            }
        }
    }

    /// Текущий список кандидатов; чтение ничего не меняет
    pub fn server_candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().list.clone()
    }

    pub fn gathering_complete(&self) -> bool {
        self.candidates.lock().gathering_complete
    }

    /// Забирает ресурсы захвата; второй вызов вернёт None
    pub fn take_capture(&self) -> Option<AcquiredCapture> {
        self.capture.lock().take()
    }

    /// true только для первого вызывающего
    pub fn claim_transport_close(&self) -> bool {
        !self.transport_closed.swap(true, Ordering::AcqRel)
    }

    pub fn info(&self) -> SessionInfo {
        let state = self.state();
        let candidates = self.candidates.lock();
        SessionInfo {
            id: self.id.clone(),
            state,
            created_at: self.created_at,
            server_candidates: candidates.list.len(),
            gathering_complete: candidates.gathering_complete,
            has_audio: self.has_audio,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}
