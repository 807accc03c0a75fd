//! Links: bidirectional byte streams to neighbours.
//!
//! Each link runs as one task that reads framed wires into the graph task
//! and writes encoded wires handed to it by the broadcaster. Frames are
//! delimited by walking [`Wire::FRAME_LAYOUT`], so every length prefix is
//! checked against `max_field_len` before its body is buffered.

use crate::block::Wire;
use crate::encoding::{Decode, LEN_PREFIX_SIZE, Segment};
use crate::engine::config::{DecodePolicy, EngineConfig};
use crate::engine::graph::{Ingress, Origin};
use crate::engine::stats::EngineStats;
use crate::error::{CodecError, Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Notify, mpsc, watch};

/// Identifier of a link, unique within one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Encoded wire shared between every link writer
pub(crate) type Frame = Arc<[u8]>;

/// Broadcaster's handle on a link's write queue
#[derive(Debug, Clone)]
pub(crate) struct LinkHandle {
    pub(crate) id: LinkId,
    pub(crate) tx: mpsc::Sender<Frame>,
    /// Raised when the link stopped draining its queue
    pub(crate) evict: Arc<Notify>,
}

/// Read one framed value following `layout`.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first byte of
/// a frame. An end of stream anywhere inside a frame is an error.
///
/// # Errors
///
/// - [`Error::Malformed`] with [`CodecError::FieldTooLarge`] if a length
///   prefix exceeds `max_field_len`
/// - [`Error::LinkIo`] on I/O failure or a stream that ends mid-frame
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    layout: &[Segment],
    max_field_len: usize,
) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut frame = Vec::new();

    for (index, segment) in layout.iter().enumerate() {
        let head_len = match *segment {
            Segment::Prefixed => LEN_PREFIX_SIZE,
            Segment::Fixed(n) => n,
        };

        let start = frame.len();
        frame.resize(start + head_len, 0);
        if index == 0 {
            if !read_first(reader, &mut frame[start..]).await? {
                return Ok(None);
            }
        } else {
            reader.read_exact(&mut frame[start..]).await?;
        }

        if *segment == Segment::Prefixed {
            let mut raw = [0u8; LEN_PREFIX_SIZE];
            raw.copy_from_slice(&frame[start..]);
            let len = u32::from_be_bytes(raw) as usize;
            if len > max_field_len {
                return Err(CodecError::FieldTooLarge {
                    len,
                    max: max_field_len,
                }
                .into());
            }

            let body = frame.len();
            frame.resize(body + len, 0);
            reader.read_exact(&mut frame[body..]).await?;
        }
    }

    Ok(Some(frame))
}

/// Fill `buf`, or report a clean end of stream if nothing was read.
async fn read_first<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 if filled == 0 => return Ok(false),
            0 => return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()),
            n => filled += n,
        }
    }
    Ok(true)
}

/// Why a link stopped
#[derive(Debug)]
enum LinkExit {
    /// Peer closed the stream at a frame boundary
    Eof,
    /// Stream failed or desynchronised
    Failed(Error),
    /// Engine is shutting down
    Shutdown,
    /// Write queue stayed full past the write timeout
    Stalled,
    /// Writer hit an error or its queue was closed
    WriterStopped,
}

/// Per-link task state
pub(crate) struct Link<R, W> {
    pub(crate) id: LinkId,
    pub(crate) reader: R,
    pub(crate) writer: W,
    pub(crate) frames: mpsc::Receiver<Frame>,
    pub(crate) evict: Arc<Notify>,
    pub(crate) inbound: mpsc::Sender<Ingress>,
    pub(crate) config: EngineConfig,
    pub(crate) stats: Arc<EngineStats>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

impl<R, W> Link<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Drive the link until either side stops.
    ///
    /// Reader failure, end of stream or eviction by the broadcaster closes
    /// the whole link. On shutdown the reader stops at once and the writer
    /// drains what the broadcaster already queued.
    pub(crate) async fn run(self) {
        let Self {
            id,
            reader,
            writer,
            frames,
            evict,
            inbound,
            config,
            stats,
            shutdown,
        } = self;

        let read = read_loop(id, reader, inbound, config, Arc::clone(&stats), shutdown);
        let write = write_loop(id, writer, frames);
        tokio::pin!(read);
        tokio::pin!(write);

        let exit = tokio::select! {
            () = &mut write => LinkExit::WriterStopped,
            exit = &mut read => exit,
            () = evict.notified() => LinkExit::Stalled,
        };

        match exit {
            LinkExit::WriterStopped => tracing::debug!("{id}: writer stopped"),
            LinkExit::Eof => tracing::info!("{id}: closed by peer"),
            LinkExit::Failed(e) => tracing::warn!("{id}: closing: {e}"),
            LinkExit::Stalled => tracing::warn!("{id}: peer stopped reading, closing"),
            LinkExit::Shutdown => write.await,
        }

        EngineStats::incr(&stats.links_closed);
    }
}

async fn read_loop<R>(
    id: LinkId,
    mut reader: R,
    inbound: mpsc::Sender<Ingress>,
    config: EngineConfig,
    stats: Arc<EngineStats>,
    mut shutdown: watch::Receiver<bool>,
) -> LinkExit
where
    R: AsyncRead + Unpin,
{
    loop {
        // Dropping a partial read on shutdown is fine: nothing was enqueued
        let frame = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => return LinkExit::Shutdown,
            frame = read_frame(&mut reader, Wire::FRAME_LAYOUT, config.max_field_len) => frame,
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => return LinkExit::Eof,
            Err(e) => {
                if matches!(&e, Error::Malformed(codec) if codec.is_structural()) {
                    EngineStats::incr(&stats.malformed);
                }
                return LinkExit::Failed(e);
            }
        };

        let wire = match Wire::from_canonical_bytes(&frame) {
            Ok(wire) => wire,
            Err(e) => {
                EngineStats::incr(&stats.malformed);
                if config.decode_policy == DecodePolicy::Strict {
                    return LinkExit::Failed(e.into());
                }
                tracing::warn!("{id}: dropping undecodable frame: {e}");
                continue;
            }
        };

        let ingress = Ingress {
            wire,
            frame: Frame::from(frame),
            origin: Origin::Link(id),
        };
        if inbound.send(ingress).await.is_err() {
            return LinkExit::Shutdown;
        }
    }
}

async fn write_loop<W>(id: LinkId, mut writer: W, mut frames: mpsc::Receiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            tracing::warn!("{id}: write failed: {e}");
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!("{id}: shutdown of write half failed: {e}");
    }
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}
