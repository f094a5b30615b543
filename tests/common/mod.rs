//! Записывающие двойники захвата и транспорта для интеграционных тестов

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use ssc_share::capture::{CaptureSource, CaptureTrack, MediaStream, TrackKind};
use ssc_share::error::{CaptureError, TransportError};
use ssc_share::peer::{
    CandidateHandler, ConnectionState, IceCandidate, SessionDescription, StateHandler,
    TransportFactory, TransportSession,
};
use ssc_share::screen_share::ScreenShare;
use ssc_share::session::SessionId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const OFFER_SDP: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=mid:0\r\n\
a=recvonly\r\n\
a=rtpmap:96 VP8/90000\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=mid:1\r\n\
a=recvonly\r\n\
a=rtpmap:111 opus/48000/2\r\n";

/// Что отдаёт двойник источника захвата
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Video,
    VideoWithAudio,
    Audio,
    /// Поток без треков
    Empty,
    Fail,
}

pub struct MockCapture {
    name: String,
    mode: Mutex<CaptureMode>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    issued: Mutex<Vec<Arc<CaptureTrack>>>,
}

impl MockCapture {
    pub fn new(name: &str, mode: CaptureMode) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            mode: Mutex::new(mode),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            issued: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: CaptureMode) {
        *self.mode.lock() = mode;
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn issued_tracks(&self) -> Vec<Arc<CaptureTrack>> {
        self.issued.lock().clone()
    }

    pub fn all_tracks_closed(&self) -> bool {
        self.issued.lock().iter().all(|t| t.is_closed())
    }
}

#[async_trait]
impl CaptureSource for MockCapture {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_capture(&self) -> Result<MediaStream, CaptureError> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        let stream_id = format!("{}-{}", self.name, n);
        let kinds: &[TrackKind] = match *self.mode.lock() {
            CaptureMode::Video => &[TrackKind::Video],
            CaptureMode::VideoWithAudio => &[TrackKind::Video, TrackKind::Audio],
            CaptureMode::Audio => &[TrackKind::Audio],
            CaptureMode::Empty => &[],
            CaptureMode::Fail => {
                return Err(CaptureError::NoDevice(self.name.clone()));
            }
        };

        let tracks: Vec<Arc<CaptureTrack>> = kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| {
                Arc::new(CaptureTrack::new(
                    *kind,
                    format!("{stream_id}-track{i}"),
                    stream_id.clone(),
                ))
            })
            .collect();
        self.issued.lock().extend(tracks.iter().cloned());
        Ok(MediaStream::new(stream_id, tracks))
    }

    fn stop_capture(&self, stream: &MediaStream) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        stream.close_tracks();
    }
}

/// Какой шаг транспорта должен отказать
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
    pub create: bool,
    pub add_track: Option<TrackKind>,
    pub set_remote: bool,
    pub create_answer: bool,
    pub set_local: bool,
    pub no_local_description: bool,
    /// Движок сообщает Failed посреди фиксации answer
    pub fail_connection_on_set_local: bool,
    pub add_candidate: bool,
    pub close: bool,
}

pub struct MockTransport {
    failures: Failures,
    calls: Mutex<Vec<String>>,
    attached: Mutex<Vec<TrackKind>>,
    local: Mutex<Option<SessionDescription>>,
    remote_candidates: Mutex<Vec<IceCandidate>>,
    candidate_handler: Mutex<Option<CandidateHandler>>,
    state_handler: Mutex<Option<StateHandler>>,
    closes: AtomicUsize,
}

impl MockTransport {
    fn new(failures: Failures) -> Self {
        Self {
            failures,
            calls: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            remote_candidates: Mutex::new(Vec::new()),
            candidate_handler: Mutex::new(None),
            state_handler: Mutex::new(None),
            closes: AtomicUsize::new(0),
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn attached(&self) -> Vec<TrackKind> {
        self.attached.lock().clone()
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.remote_candidates.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Имитирует локальный кандидат от движка (`None` означает конец сбора)
    pub fn emit_candidate(&self, candidate: Option<IceCandidate>) {
        let handler = self.candidate_handler.lock().clone();
        if let Some(handler) = handler {
            handler(candidate);
        }
    }

    pub fn emit_state(&self, state: ConnectionState) {
        let handler = self.state_handler.lock().clone();
        if let Some(handler) = handler {
            handler(state);
        }
    }

    fn answer_sdp(&self) -> String {
        let mut sdp = String::from(
            "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n\
             a=ice-ufrag:mockufrag\r\na=ice-pwd:mockpasswordmockpassword\r\n",
        );
        for (mid, kind) in self.attached.lock().iter().enumerate() {
            match kind {
                TrackKind::Video => sdp.push_str(&format!(
                    "m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:{mid}\r\na=sendonly\r\na=rtpmap:96 VP8/90000\r\n"
                )),
                TrackKind::Audio => sdp.push_str(&format!(
                    "m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:{mid}\r\na=sendonly\r\na=rtpmap:111 opus/48000/2\r\n"
                )),
            }
        }
        sdp
    }
}

#[async_trait]
impl TransportSession for MockTransport {
    fn on_candidate(&self, handler: CandidateHandler) {
        *self.candidate_handler.lock() = Some(handler);
    }

    fn on_connection_state_change(&self, handler: StateHandler) {
        *self.state_handler.lock() = Some(handler);
    }

    async fn add_track(&self, track: &CaptureTrack) -> Result<(), TransportError> {
        let kind = track.kind();
        self.record(format!("add_track:{kind:?}"));
        if self.failures.add_track == Some(kind) {
            return Err(TransportError::Rejected(format!("cannot attach {kind:?}")));
        }
        self.attached.lock().push(kind);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        self.record(format!("set_remote:{}", desc.kind));
        if self.failures.set_remote {
            return Err(TransportError::Rejected("malformed offer".into()));
        }
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.record("create_answer");
        if self.failures.create_answer {
            return Err(TransportError::Rejected("no answer".into()));
        }
        Ok(SessionDescription::answer(self.answer_sdp()))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        self.record("set_local");
        if self.failures.set_local {
            return Err(TransportError::Rejected("cannot commit answer".into()));
        }
        if self.failures.fail_connection_on_set_local {
            self.emit_state(ConnectionState::Failed);
            // даём фоновому разбору отработать до возврата answer
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        if !self.failures.no_local_description {
            // движок дописывает параметры при фиксации
            let committed = format!("{}a=end-of-candidates\r\n", desc.sdp);
            *self.local.lock() = Some(SessionDescription::answer(committed));
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.record("add_remote_candidate");
        if self.failures.add_candidate {
            return Err(TransportError::Rejected("malformed candidate".into()));
        }
        self.remote_candidates.lock().push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record("close");
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.failures.close {
            return Err(TransportError::Rejected("close failed".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockFactory {
    failures: Mutex<Failures>,
    creates: AtomicUsize,
    sessions: Mutex<Vec<Arc<MockTransport>>>,
    delay: Mutex<Option<Duration>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(failures: Failures) -> Arc<Self> {
        let factory = Self::default();
        *factory.failures.lock() = failures;
        Arc::new(factory)
    }

    /// Задержка перед созданием сессии (для проверки конкурентных offer)
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = Some(delay);
        self
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> Vec<Arc<MockTransport>> {
        self.sessions.lock().clone()
    }

    pub fn last(&self) -> Arc<MockTransport> {
        self.sessions
            .lock()
            .last()
            .cloned()
            .expect("no transport session was created")
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn create_session(
        &self,
        _streams: &[&MediaStream],
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failures = *self.failures.lock();
        if failures.create {
            return Err(TransportError::Rejected("engine unavailable".into()));
        }
        let transport = Arc::new(MockTransport::new(failures));
        self.sessions.lock().push(transport.clone());
        Ok(transport)
    }
}

pub struct Harness {
    pub share: Arc<ScreenShare>,
    pub factory: Arc<MockFactory>,
    pub screen: Arc<MockCapture>,
    pub audio: Arc<MockCapture>,
}

impl Harness {
    pub fn new(screen: CaptureMode, audio: CaptureMode) -> Self {
        Self::with_factory(MockFactory::new(), screen, audio)
    }

    pub fn with_factory(factory: Arc<MockFactory>, screen: CaptureMode, audio: CaptureMode) -> Self {
        let screen = MockCapture::new("screen", screen);
        let audio = MockCapture::new("audio", audio);
        let share = Arc::new(ScreenShare::new(
            factory.clone(),
            screen.clone(),
            audio.clone(),
        ));
        Self {
            share,
            factory,
            screen,
            audio,
        }
    }

    /// Каждой новой сессии выдаётся один и тот же id
    pub fn with_fixed_session_id(screen: CaptureMode, audio: CaptureMode, id: &str) -> Self {
        let factory = MockFactory::new();
        let screen = MockCapture::new("screen", screen);
        let audio = MockCapture::new("audio", audio);
        let id = SessionId::from(id);
        let share = ScreenShare::new(factory.clone(), screen.clone(), audio.clone())
            .with_session_ids(Arc::new(move || id.clone()));
        Self {
            share: Arc::new(share),
            factory,
            screen,
            audio,
        }
    }

    /// Все треки, выданные обоими источниками, закрыты
    pub fn all_tracks_closed(&self) -> bool {
        self.screen.all_tracks_closed() && self.audio.all_tracks_closed()
    }
}

pub fn host_candidate(port: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:1 1 udp 2130706431 192.168.1.10 {port} typ host"),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

/// Ждёт, пока фоновый разбор (после смены состояния) удалит сессию
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
