//! Общий поток кадров одного устройства.
//!
//! FIFO нельзя читать двумя читателями: второй сеанс получил бы середину
//! потока без заголовка. Поэтому устройство открывается один раз, кадры
//! раздаются подписчикам через broadcast, а с уходом последнего подписчика
//! дескриптор закрывается.

use super::{EncodedFrame, FrameSource};
use crate::error::CaptureError;
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

const FRAME_BACKLOG: usize = 64;
const CHUNK_BACKLOG: usize = 64;
const CHUNK_SIZE: usize = 64 * 1024;
/// Сколько ждать заголовок потока от грабера
const HEADER_TIMEOUT: Duration = Duration::from_secs(5);
/// Верхняя граница паузы между кадрами обычного файла
const MAX_PACE: Duration = Duration::from_secs(1);

type Input = Box<dyn AsyncRead + Send + Unpin>;

/// Разобранный контейнер: кодек из заголовка и кадры по одному
pub(crate) trait Demuxer: Send {
    fn codec(&self) -> RTCRtpCodecCapability;

    fn next_frame(&mut self) -> Option<EncodedFrame>;
}

/// Читает заголовок контейнера и возвращает разборщик кадров
pub(crate) type OpenDemuxer = fn(&str, ChunkReader) -> Result<Box<dyn Demuxer>, CaptureError>;

pub(crate) struct FrameFeed {
    shared: Arc<Shared>,
    opening: tokio::sync::Mutex<()>,
}

struct Shared {
    label: String,
    path: PathBuf,
    demux: OpenDemuxer,
    running: Mutex<Option<Running>>,
    generation: AtomicU64,
}

struct Running {
    generation: u64,
    codec: RTCRtpCodecCapability,
    frames: broadcast::Sender<EncodedFrame>,
    finished: CancellationToken,
}

impl FrameFeed {
    pub(crate) fn new(label: String, path: &Path, demux: OpenDemuxer) -> Self {
        Self {
            shared: Arc::new(Shared {
                label,
                path: path.to_path_buf(),
                demux,
                running: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
            opening: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.shared.label
    }

    /// Подписка на кадры; устройство открывается только первым подписчиком
    pub(crate) async fn subscribe(&self) -> Result<Subscription, CaptureError> {
        let _opening = self.opening.lock().await;
        if let Some(subscription) = self.attach() {
            return Ok(subscription);
        }

        let (running, first) = self.start().await?;
        let subscription = Subscription::new(&self.shared, &running, first);
        *self.shared.running.lock() = Some(running);
        Ok(subscription)
    }

    fn attach(&self) -> Option<Subscription> {
        let running = self.shared.running.lock();
        let running = running.as_ref().filter(|r| !r.finished.is_cancelled())?;
        debug!(
            device = %self.shared.label,
            subscribers = running.frames.receiver_count() + 1,
            "Joining running capture feed"
        );
        Some(Subscription::new(
            &self.shared,
            running,
            running.frames.subscribe(),
        ))
    }

    async fn start(&self) -> Result<(Running, broadcast::Receiver<EncodedFrame>), CaptureError> {
        let label = self.shared.label.clone();
        let (input, pace) = open_input(&self.shared.path).await?;
        let finished = CancellationToken::new();
        // любой ранний выход (ошибка, таймаут, отмена запроса) закрывает вход
        let guard = finished.clone().drop_guard();

        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_BACKLOG);
        tokio::spawn(read_chunks(label.clone(), input, chunk_tx, finished.clone()));

        let (frames, first) = broadcast::channel(FRAME_BACKLOG);
        let (ready_tx, ready_rx) = oneshot::channel();
        let demux = DemuxTask {
            label: label.clone(),
            open: self.shared.demux,
            input: ChunkReader::new(chunk_rx),
            frames: frames.clone(),
            pace,
            finished,
        };
        std::thread::Builder::new()
            .name("capture-demux".into())
            .spawn(move || demux.run(ready_tx))
            .map_err(|e| open_error(&label, e))?;

        let codec = match tokio::time::timeout(HEADER_TIMEOUT, ready_rx).await {
            Ok(Ok(header)) => header?,
            Ok(Err(_)) => return Err(open_error(&label, "demuxer exited before the header")),
            Err(_) => {
                return Err(open_error(
                    &label,
                    format!("no stream header within {HEADER_TIMEOUT:?}"),
                ))
            }
        };

        let generation = self.shared.generation.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            device = %label,
            mime = %codec.mime_type,
            generation,
            pace,
            "Capture feed started"
        );
        Ok((
            Running {
                generation,
                codec,
                frames,
                finished: guard.disarm(),
            },
            first,
        ))
    }
}

fn open_error(label: &str, reason: impl std::fmt::Display) -> CaptureError {
    CaptureError::Open {
        device: label.to_string(),
        reason: reason.to_string(),
    }
}

/// Открывает файл или FIFO; второй элемент: выдерживать ли темп кадров.
/// FIFO темп задаёт грабер, обычный файл иначе вычитался бы мгновенно.
async fn open_input(path: &Path) -> Result<(Input, bool), CaptureError> {
    let metadata = tokio::fs::metadata(path).await?;
    if is_fifo(&metadata) {
        return Ok((open_fifo(path)?, false));
    }
    let file = tokio::fs::File::open(path).await?;
    Ok((Box::new(file), true))
}

#[cfg(unix)]
fn is_fifo(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    metadata.file_type().is_fifo()
}

#[cfg(not(unix))]
fn is_fifo(_metadata: &std::fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn open_fifo(path: &Path) -> std::io::Result<Input> {
    let mut options = tokio::net::unix::pipe::OpenOptions::new();
    // перезапуск грабера не должен выглядеть как EOF
    #[cfg(any(target_os = "linux", target_os = "android"))]
    options.read_write(true);
    Ok(Box::new(options.open_receiver(path)?))
}

#[cfg(not(unix))]
fn open_fifo(_path: &Path) -> std::io::Result<Input> {
    Err(std::io::ErrorKind::Unsupported.into())
}

/// Читает вход кусками, пока фид жив. Выход из задачи закрывает дескриптор.
async fn read_chunks(
    label: String,
    mut input: Input,
    chunks: mpsc::Sender<Bytes>,
    finished: CancellationToken,
) {
    let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
    loop {
        buf.reserve(CHUNK_SIZE);
        let read = tokio::select! {
            _ = finished.cancelled() => break,
            read = input.read_buf(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                debug!(device = %label, "Capture input reached end of file");
                break;
            }
            Ok(_) => {
                let chunk = buf.split().freeze();
                tokio::select! {
                    _ = finished.cancelled() => break,
                    sent = chunks.send(chunk) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(device = %label, "Capture input read failed: {e}");
                break;
            }
        }
    }
    drop(input);
    debug!(device = %label, "Capture input closed");
}

/// Разбор контейнера на отдельном потоке: читатели webrtc синхронные
struct DemuxTask {
    label: String,
    open: OpenDemuxer,
    input: ChunkReader,
    frames: broadcast::Sender<EncodedFrame>,
    pace: bool,
    finished: CancellationToken,
}

impl DemuxTask {
    fn run(self, ready: oneshot::Sender<Result<RTCRtpCodecCapability, CaptureError>>) {
        let Self {
            label,
            open,
            input,
            frames,
            pace,
            finished,
        } = self;

        let mut demuxer = match open(&label, input) {
            Ok(demuxer) => demuxer,
            Err(e) => {
                let _ = ready.send(Err(e));
                finished.cancel();
                return;
            }
        };
        if ready.send(Ok(demuxer.codec())).is_err() {
            finished.cancel();
            return;
        }

        let mut sent: u64 = 0;
        while !finished.is_cancelled() {
            let Some(frame) = demuxer.next_frame() else {
                break;
            };
            let duration = frame.duration;
            // без подписчиков кадр просто теряется
            let _ = frames.send(frame);
            sent += 1;
            if pace {
                std::thread::sleep(duration.min(MAX_PACE));
            }
        }
        debug!(device = %label, frames = sent, "Capture feed finished");
        finished.cancel();
    }
}

/// Синхронный `Read` поверх кусков, присланных асинхронным читателем.
/// Закрытый канал читается как конец файла.
pub(crate) struct ChunkReader {
    chunks: mpsc::Receiver<Bytes>,
    current: Bytes,
}

impl ChunkReader {
    fn new(chunks: mpsc::Receiver<Bytes>) -> Self {
        Self {
            chunks,
            current: Bytes::new(),
        }
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while !self.current.has_remaining() {
            match self.chunks.blocking_recv() {
                Some(chunk) => self.current = chunk,
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}

/// Подписка одного трека на общий фид
pub(crate) struct Subscription {
    shared: Arc<Shared>,
    generation: u64,
    codec: RTCRtpCodecCapability,
    frames: Option<broadcast::Receiver<EncodedFrame>>,
    finished: CancellationToken,
}

impl Subscription {
    fn new(
        shared: &Arc<Shared>,
        running: &Running,
        frames: broadcast::Receiver<EncodedFrame>,
    ) -> Self {
        Self {
            shared: Arc::clone(shared),
            generation: running.generation,
            codec: running.codec.clone(),
            frames: Some(frames),
            finished: running.finished.clone(),
        }
    }
}

#[async_trait]
impl FrameSource for Subscription {
    fn codec(&self) -> Option<RTCRtpCodecCapability> {
        Some(self.codec.clone())
    }

    async fn next_frame(&mut self) -> Option<EncodedFrame> {
        let frames = self.frames.as_mut()?;
        loop {
            tokio::select! {
                biased;
                received = frames.recv() => match received {
                    Ok(frame) => return Some(frame),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(device = %self.shared.label, skipped, "Subscriber lagged, frames dropped");
                    }
                    Err(RecvError::Closed) => return None,
                },
                _ = self.finished.cancelled() => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.frames.take());
        let mut running = self.shared.running.lock();
        let last = running
            .as_ref()
            .is_some_and(|r| r.generation == self.generation && r.frames.receiver_count() == 0);
        if last {
            if let Some(running) = running.take() {
                debug!(device = %self.shared.label, "Last subscriber left, closing capture device");
                running.finished.cancel();
            }
        }
    }
}
