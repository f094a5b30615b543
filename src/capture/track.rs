use super::FrameSource;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// VP8 для видео, Opus 48k stereo для звука
pub fn default_codec(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
    }
}

/// Один закодированный кадр от устройства
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: bytes::Bytes,
    pub duration: Duration,
}

/// Трек захвата: локальный трек webrtc плюс признак закрытия
pub struct CaptureTrack {
    id: String,
    kind: TrackKind,
    local: Arc<TrackLocalStaticSample>,
    cancel: CancellationToken,
}

impl CaptureTrack {
    pub fn new(kind: TrackKind, id: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self::with_codec(kind, default_codec(kind), id, stream_id)
    }

    pub fn with_codec(
        kind: TrackKind,
        codec: RTCRtpCodecCapability,
        id: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let local = Arc::new(TrackLocalStaticSample::new(codec, id.clone(), stream_id.into()));
        Self {
            id,
            kind,
            local,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn local(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.local.clone()
    }

    /// Закрывает трек и останавливает подачу кадров; повторный вызов ничего не делает
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(track_id = %self.id, kind = ?self.kind, "Closing capture track");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Запускает задачу, которая читает кадры из устройства и пишет их в трек.
    ///
    /// Темп задаёт сам источник; при закрытии трека ожидание кадра
    /// бросается и источник отпускается сразу, даже если устройство молчит.
    pub(crate) fn spawn_pump(self: &Arc<Self>, mut source: Box<dyn FrameSource>) {
        let track = Arc::clone(self);
        tokio::spawn(async move {
            let mut frames: u64 = 0;
            loop {
                let frame = tokio::select! {
                    _ = track.cancel.cancelled() => break,
                    frame = source.next_frame() => frame,
                };
                let Some(frame) = frame else {
                    debug!(track_id = %track.id, frames, "Capture device reached end of stream");
                    break;
                };

                let sample = Sample {
                    data: frame.data,
                    duration: frame.duration,
                    ..Default::default()
                };
                if let Err(e) = track.local.write_sample(&sample).await {
                    warn!(track_id = %track.id, "Failed to write sample: {e}");
                    break;
                }
                frames += 1;
                if frames <= 5 || frames % 300 == 0 {
                    debug!(track_id = %track.id, frames, "Captured frame");
                }
            }
            drop(source);
            debug!(track_id = %track.id, frames, "Capture pump stopped");
        });
    }
}

impl std::fmt::Debug for CaptureTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Живой медиапоток, выданный источником захвата
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<CaptureTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<CaptureTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn video_tracks(&self) -> Vec<Arc<CaptureTrack>> {
        self.tracks_of(TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> Vec<Arc<CaptureTrack>> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn all_tracks(&self) -> &[Arc<CaptureTrack>] {
        &self.tracks
    }

    /// Закрывает все треки потока
    pub fn close_tracks(&self) {
        for track in &self.tracks {
            track.close();
        }
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<Arc<CaptureTrack>> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }
}
