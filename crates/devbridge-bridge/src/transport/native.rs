//! Native-messaging transport.
//!
//! Each frame is a 4-byte little-endian length followed by that many bytes
//! of UTF-8 JSON, the framing browsers use for native messaging hosts.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use devbridge_protocols::{Transport, TransportError, TransportEvent, TransportSink};

use super::sink::SinkSlot;

/// Largest frame accepted in either direction (1 MiB).
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type FrameWriter = FramedWrite<BoxedWriter, LengthDelimitedCodec>;

fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .little_endian()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

enum Source {
    /// This process is the native host.
    Stdio,
    /// Spawn the native host as a child process.
    Spawn { command: String, args: Vec<String> },
    /// Pre-opened streams, usable for a single connection.
    Streams(parking_lot::Mutex<Option<(BoxedReader, BoxedWriter)>>),
}

/// Length-prefixed transport over a byte stream pair.
pub struct NativeTransport {
    id: String,
    source: Source,
    sink: Arc<SinkSlot>,
    connected: Arc<AtomicBool>,
    writer: Arc<Mutex<Option<FrameWriter>>>,
    reader_token: parking_lot::Mutex<Option<CancellationToken>>,
    child: Mutex<Option<Child>>,
}

impl NativeTransport {
    fn with_source(id: impl Into<String>, source: Source) -> Self {
        Self {
            id: id.into(),
            source,
            sink: Arc::new(SinkSlot::default()),
            connected: Arc::new(AtomicBool::new(false)),
            writer: Arc::new(Mutex::new(None)),
            reader_token: parking_lot::Mutex::new(None),
            child: Mutex::new(None),
        }
    }

    /// Speak on this process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::with_source("native-stdio", Source::Stdio)
    }

    /// Spawn `command` and speak on its stdin/stdout.
    pub fn spawn(command: impl Into<String>, args: Vec<String>) -> Self {
        let command = command.into();
        Self::with_source(
            format!("native-{}", command),
            Source::Spawn { command, args },
        )
    }

    /// Use an existing reader/writer pair.
    pub fn from_streams<R, W>(id: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_source(
            id,
            Source::Streams(parking_lot::Mutex::new(Some((
                Box::new(reader),
                Box::new(writer),
            )))),
        )
    }

    async fn open(&self) -> Result<(BoxedReader, BoxedWriter), TransportError> {
        match &self.source {
            Source::Stdio => Ok((Box::new(tokio::io::stdin()), Box::new(tokio::io::stdout()))),
            Source::Spawn { command, args } => {
                let mut child = Command::new(command)
                    .args(args)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| {
                        TransportError::ConnectionFailed(format!(
                            "failed to spawn {}: {}",
                            command, e
                        ))
                    })?;

                let stdin = child.stdin.take().ok_or_else(|| {
                    TransportError::ConnectionFailed("Failed to capture stdin".to_string())
                })?;
                let stdout = child.stdout.take().ok_or_else(|| {
                    TransportError::ConnectionFailed("Failed to capture stdout".to_string())
                })?;

                *self.child.lock().await = Some(child);
                Ok((Box::new(stdout), Box::new(stdin)))
            }
            Source::Streams(slot) => slot.lock().take().ok_or_else(|| {
                TransportError::ConnectionFailed("streams already consumed".to_string())
            }),
        }
    }
}

#[async_trait]
impl Transport for NativeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let (reader, writer) = self.open().await?;
        *self.writer.lock().await = Some(FramedWrite::new(writer, frame_codec()));

        let token = CancellationToken::new();
        if let Some(previous) = self.reader_token.lock().replace(token.clone()) {
            previous.cancel();
        }

        self.connected.store(true, Ordering::SeqCst);
        self.sink.emit(TransportEvent::Connected);
        info!("{} connected", self.id);

        tokio::spawn(read_frames(
            self.id.clone(),
            FramedRead::new(reader, frame_codec()),
            self.sink.clone(),
            self.connected.clone(),
            self.writer.clone(),
            token,
        ));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(token) = self.reader_token.lock().take() {
            token.cancel();
        }
        self.writer.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop native host for {}: {}", self.id, e);
            }
        }

        if self.connected.swap(false, Ordering::SeqCst) {
            info!("{} disconnected", self.id);
            self.sink.emit(TransportEvent::Disconnected {
                reason: "disconnected locally".to_string(),
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn on_message(&self, sink: TransportSink) {
        self.sink.set(sink);
    }

    async fn write(&self, frame: Bytes) -> Result<(), TransportError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: MAX_FRAME_LEN,
            });
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        writer.send(frame).await?;
        Ok(())
    }
}

async fn read_frames(
    id: String,
    mut frames: FramedRead<BoxedReader, LengthDelimitedCodec>,
    sink: Arc<SinkSlot>,
    connected: Arc<AtomicBool>,
    writer: Arc<Mutex<Option<FrameWriter>>>,
    shutdown: CancellationToken,
) {
    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("{} reader stopped", id);
                return;
            }
            next = frames.next() => match next {
                Some(Ok(frame)) => {
                    sink.emit(TransportEvent::Frame(frame.freeze()));
                }
                Some(Err(e)) => break format!("read failed: {}", e),
                None => break "peer closed the channel".to_string(),
            }
        }
    };

    writer.lock().await.take();
    if connected.swap(false, Ordering::SeqCst) {
        info!("{} disconnected: {}", id, reason);
        sink.emit(TransportEvent::Disconnected { reason });
    }
}
