//! Источники захвата экрана и звука.
//!
//! Сами устройства (грабер фреймбуфера, системный звук) внешние: сюда они
//! приходят как [`MediaDevice`], который отдаёт уже закодированные кадры.

pub mod device;
mod feed;
pub mod file;
pub mod track;

use crate::error::CaptureError;
use async_trait::async_trait;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

pub use device::DeviceCapture;
pub use file::{IvfVideoDevice, OggAudioDevice};
pub use track::{CaptureTrack, EncodedFrame, MediaStream, TrackKind};

/// Источник захвата: выдаёт живой поток и умеет его остановить
#[async_trait]
pub trait CaptureSource: Send + Sync {
    fn name(&self) -> &str;

    async fn start_capture(&self) -> Result<MediaStream, CaptureError>;

    /// Останавливает ранее выданный поток и закрывает его треки
    fn stop_capture(&self, stream: &MediaStream);
}

/// Внешнее устройство захвата
#[async_trait]
pub trait MediaDevice: Send + Sync {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> &str;

    async fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// Поток закодированных кадров; `None` означает конец.
///
/// `next_frame` должен переживать отмену: при остановке трека будущее
/// бросается посреди ожидания, а сам источник сразу освобождается.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Кодек потока, если он известен только после открытия (например, из заголовка IVF)
    fn codec(&self) -> Option<RTCRtpCodecCapability> {
        None
    }

    async fn next_frame(&mut self) -> Option<EncodedFrame>;
}
