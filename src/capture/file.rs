//! Устройства поверх файлов/FIFO: IVF (VP8/VP9) для экрана и Ogg/Opus для звука.
//! Внешний грабер (например, ffmpeg x11grab) пишет закодированный поток в FIFO,
//! а мы только раскладываем его на сэмплы. Одно устройство читается один раз,
//! сеансы подписываются на общий поток кадров.

use super::feed::{ChunkReader, Demuxer, FrameFeed};
use super::{EncodedFrame, FrameSource, MediaDevice, TrackKind};
use crate::error::CaptureError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MIME_TYPE_VP9};
use webrtc::media::io::ivf_reader::IVFReader;
use webrtc::media::io::ogg_reader::OggReader;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(33);
const DEFAULT_PAGE_DURATION: Duration = Duration::from_millis(20);
/// Короче этого тик timebase за длительность кадра не принимаем (1/90000 и т.п.)
const MIN_FRAME_DURATION: Duration = Duration::from_millis(1);
const OPUS_SAMPLE_RATE: u32 = 48000;

fn open_error(label: &str, reason: impl std::fmt::Display) -> CaptureError {
    CaptureError::Open {
        device: label.to_string(),
        reason: reason.to_string(),
    }
}

/// Длительность одного тика timebase без округления до миллисекунд
fn timebase_tick(numerator: u32, denominator: u32) -> Option<Duration> {
    if numerator == 0 || denominator == 0 {
        return None;
    }
    Some(Duration::from_secs_f64(
        f64::from(numerator) / f64::from(denominator),
    ))
}

/// Видео с экрана из IVF
pub struct IvfVideoDevice {
    feed: FrameFeed,
}

impl IvfVideoDevice {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            feed: FrameFeed::new(format!("ivf:{}", path.display()), path, open_ivf),
        }
    }
}

#[async_trait]
impl MediaDevice for IvfVideoDevice {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        self.feed.label()
    }

    async fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        Ok(Box::new(self.feed.subscribe().await?))
    }
}

fn open_ivf(label: &str, input: ChunkReader) -> Result<Box<dyn Demuxer>, CaptureError> {
    let (reader, header) = IVFReader::new(input).map_err(|e| open_error(label, e))?;

    let mime = match &header.four_cc {
        b"VP80" => MIME_TYPE_VP8,
        b"VP90" => MIME_TYPE_VP9,
        other => {
            return Err(open_error(
                label,
                format!("unsupported IVF codec {:?}", String::from_utf8_lossy(other)),
            ))
        }
    };
    let tick = timebase_tick(header.timebase_numerator, header.timebase_denominator);
    // пока нет разницы меток, кадр длится один тик, если тик похож на кадр
    let first_duration = tick
        .filter(|tick| *tick >= MIN_FRAME_DURATION)
        .unwrap_or(DEFAULT_FRAME_DURATION);
    debug!(
        device = %label,
        width = header.width,
        height = header.height,
        ?tick,
        "IVF header parsed"
    );

    Ok(Box::new(IvfFrames {
        reader,
        mime,
        tick,
        last_timestamp: None,
        last_duration: first_duration,
    }))
}

struct IvfFrames {
    reader: IVFReader<ChunkReader>,
    mime: &'static str,
    tick: Option<Duration>,
    last_timestamp: Option<u64>,
    last_duration: Duration,
}

impl IvfFrames {
    /// Длительность по разнице меток времени; без неё берётся прошлая
    fn duration_at(&mut self, timestamp: u64) -> Duration {
        let measured = match (self.tick, self.last_timestamp) {
            (Some(tick), Some(prev)) if timestamp > prev => {
                Duration::try_from_secs_f64(tick.as_secs_f64() * (timestamp - prev) as f64).ok()
            }
            _ => None,
        };
        self.last_timestamp = Some(timestamp);
        if let Some(measured) = measured.filter(|d| !d.is_zero()) {
            self.last_duration = measured;
        }
        self.last_duration
    }
}

impl Demuxer for IvfFrames {
    fn codec(&self) -> RTCRtpCodecCapability {
        RTCRtpCodecCapability {
            mime_type: self.mime.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        }
    }

    fn next_frame(&mut self) -> Option<EncodedFrame> {
        match self.reader.parse_next_frame() {
            Ok((frame, header)) => Some(EncodedFrame {
                data: frame.freeze(),
                duration: self.duration_at(header.timestamp),
            }),
            Err(e) => {
                debug!("IVF stream finished: {e}");
                None
            }
        }
    }
}

/// Системный звук из Ogg/Opus
pub struct OggAudioDevice {
    feed: FrameFeed,
}

impl OggAudioDevice {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            feed: FrameFeed::new(format!("ogg:{}", path.display()), path, open_ogg),
        }
    }
}

#[async_trait]
impl MediaDevice for OggAudioDevice {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        self.feed.label()
    }

    async fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        Ok(Box::new(self.feed.subscribe().await?))
    }
}

fn open_ogg(label: &str, input: ChunkReader) -> Result<Box<dyn Demuxer>, CaptureError> {
    let (reader, header) = OggReader::new(input, true).map_err(|e| open_error(label, e))?;
    debug!(
        device = %label,
        channels = header.channels,
        sample_rate = header.sample_rate,
        "Ogg header parsed"
    );
    Ok(Box::new(OggPages {
        reader,
        channels: header.channels.max(1) as u16,
        last_granule: 0,
    }))
}

struct OggPages {
    reader: OggReader<ChunkReader>,
    channels: u16,
    last_granule: u64,
}

impl Demuxer for OggPages {
    fn codec(&self) -> RTCRtpCodecCapability {
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: OPUS_SAMPLE_RATE,
            channels: self.channels,
            ..Default::default()
        }
    }

    fn next_frame(&mut self) -> Option<EncodedFrame> {
        match self.reader.parse_next_page() {
            Ok((page, header)) => {
                // длительность страницы по разнице granule position
                let samples = header.granule_position.saturating_sub(self.last_granule);
                self.last_granule = header.granule_position;
                let duration = if samples == 0 {
                    DEFAULT_PAGE_DURATION
                } else {
                    Duration::from_secs_f64(samples as f64 / f64::from(OPUS_SAMPLE_RATE))
                };
                Some(EncodedFrame {
                    data: page.freeze(),
                    duration,
                })
            }
            Err(e) => {
                debug!("Ogg stream finished: {e}");
                None
            }
        }
    }
}

/// Сборка IVF потока для тестов
#[cfg(test)]
pub(crate) mod fixtures {
    pub(crate) fn ivf_header(four_cc: &[u8; 4], numerator: u32, denominator: u32) -> Vec<u8> {
        let mut header = Vec::with_capacity(32);
        header.extend_from_slice(b"DKIF");
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&32u16.to_le_bytes());
        header.extend_from_slice(four_cc);
        header.extend_from_slice(&640u16.to_le_bytes());
        header.extend_from_slice(&480u16.to_le_bytes());
        header.extend_from_slice(&denominator.to_le_bytes());
        header.extend_from_slice(&numerator.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header
    }

    pub(crate) fn ivf_frame(timestamp: u64, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(12 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&timestamp.to_le_bytes());
        frame.extend_from_slice(payload);
        frame
    }
}
