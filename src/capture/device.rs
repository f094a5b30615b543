use super::track::default_codec;
use super::{CaptureSource, CaptureTrack, FrameSource, MediaDevice, MediaStream};
use crate::error::CaptureError;
use crate::utils::random_id;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Источник захвата поверх набора устройств.
///
/// Сначала открывается основной набор (например, экран + системный звук);
/// если хоть одно устройство не открылось, всё уже открытое отпускается и
/// пробуется запасной набор (только экран).
pub struct DeviceCapture {
    name: String,
    primary: Vec<Arc<dyn MediaDevice>>,
    fallback: Vec<Arc<dyn MediaDevice>>,
}

impl DeviceCapture {
    pub fn new(name: impl Into<String>, devices: Vec<Arc<dyn MediaDevice>>) -> Self {
        Self {
            name: name.into(),
            primary: devices,
            fallback: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, devices: Vec<Arc<dyn MediaDevice>>) -> Self {
        self.fallback = devices;
        self
    }

    /// Источник без устройств: каждый запуск завершается CaptureUnavailable
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    async fn open_set(&self, devices: &[Arc<dyn MediaDevice>]) -> Result<MediaStream, CaptureError> {
        if devices.is_empty() {
            return Err(CaptureError::NoDevice(self.name.clone()));
        }

        let stream_id = format!("{}-{}", self.name, &random_id()[..8]);
        let mut opened: Vec<(Arc<CaptureTrack>, Box<dyn FrameSource>)> = Vec::new();

        for (index, device) in devices.iter().enumerate() {
            // при ошибке уже открытые источники просто отпускаются (drop)
            let frames = device.open().await?;
            let codec = frames.codec().unwrap_or_else(|| default_codec(device.kind()));
            info!(
                capture = %self.name,
                device = device.label(),
                mime = %codec.mime_type,
                "Capture device opened"
            );
            let track = CaptureTrack::with_codec(
                device.kind(),
                codec,
                format!("{}-{}", device.label(), index),
                stream_id.clone(),
            );
            opened.push((Arc::new(track), frames));
        }

        let mut tracks = Vec::with_capacity(opened.len());
        for (track, frames) in opened {
            track.spawn_pump(frames);
            tracks.push(track);
        }
        Ok(MediaStream::new(stream_id, tracks))
    }
}

#[async_trait]
impl CaptureSource for DeviceCapture {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_capture(&self) -> Result<MediaStream, CaptureError> {
        info!(capture = %self.name, devices = self.primary.len(), "Starting capture");
        match self.open_set(&self.primary).await {
            Ok(stream) => Ok(stream),
            Err(e) if !self.fallback.is_empty() => {
                warn!(capture = %self.name, "Primary capture failed, falling back: {e}");
                self.open_set(&self.fallback).await
            }
            Err(e) => Err(e),
        }
    }

    fn stop_capture(&self, stream: &MediaStream) {
        info!(capture = %self.name, stream_id = stream.id(), "Stopping capture");
        stream.close_tracks();
    }
}
