//! Connection Handler Module
//!
//! Each client connection gets one handler that owns the socket and a
//! private [`FrameDecoder`]. The handler loops until the client goes away.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! OPEN
//!   │
//!   ▼
//! ┌──────────────────────────────────────────┐
//! │  decode every complete frame in buffer   │
//! │  dispatch each, encode each reply        │
//! │  write all replies, in frame order       │
//! │  read more bytes from the socket         │◀─┐
//! └──────────────────┬───────────────────────┘  │
//!                    └──────────────────────────┘
//!   │
//!   ▼
//! CLOSED  (zero-length read, I/O error, protocol error)
//! ```
//!
//! A protocol error gets one best-effort `-ERR Protocol error: ...` reply
//! after the replies for any frames decoded before it, then the connection
//! closes. Command errors are ordinary replies and the loop carries on.

use crate::commands::CommandHandler;
use crate::protocol::{FrameDecoder, ProtocolError, Reply};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Default cap on buffered, not-yet-decoded input (64 MB)
pub const DEFAULT_MAX_BUFFER: usize = 64 * 1024 * 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total frames processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue, peer reset)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent bytes that are not a valid frame
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The client closed mid-frame
    #[error("unexpected end of stream with {0} bytes buffered")]
    UnexpectedEof(usize),

    /// An incomplete frame outgrew the buffer limit
    #[error("buffer size limit exceeded: {size} bytes (max: {max})")]
    BufferFull { size: usize, max: usize },
}

/// Drives one client connection.
///
/// Generic over the stream so it runs on a `TcpStream` in the server and on
/// in-memory mocks in tests.
pub struct ConnectionHandler<S> {
    /// The client stream
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Per-connection frame decoder, never shared
    decoder: FrameDecoder,

    /// Encoded replies waiting to be written
    out: Vec<u8>,

    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    max_buffer: usize,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            decoder: FrameDecoder::new(),
            out: Vec::new(),
            command_handler,
            stats,
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }

    /// Overrides the cap on buffered, not-yet-decoded input.
    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// Runs the connection until the client disconnects or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Connection handler started");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed with error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The read-decode-dispatch-write loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let decoded = self.process_buffered();
            if let Err(e) = &decoded {
                debug!(client = %self.addr, error = %e, "Sending protocol error reply");
                Reply::error(format!("ERR Protocol error: {}", e)).serialize_into(&mut self.out);
            }

            self.flush_replies().await?;
            decoded?;

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Decodes and executes every complete frame currently buffered.
    fn process_buffered(&mut self) -> Result<(), ProtocolError> {
        while let Some(frame) = self.decoder.try_decode()? {
            trace!(
                client = %self.addr,
                args = frame.len(),
                remaining = self.decoder.buffered(),
                "Decoded frame"
            );

            let reply = self.command_handler.execute(&frame);
            self.stats.command_processed();
            reply.serialize_into(&mut self.out);
        }
        Ok(())
    }

    /// Reads more bytes into the decoder.
    ///
    /// Returns `false` when the client closed cleanly between frames.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        let buffered = self.decoder.buffered();
        if buffered >= self.max_buffer {
            return Err(ConnectionError::BufferFull {
                size: buffered,
                max: self.max_buffer,
            });
        }

        let buffer = self.decoder.buffer_mut();
        if buffer.capacity() - buffer.len() < 1024 {
            buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(buffer).await?;
        if n == 0 {
            return match self.decoder.buffered() {
                0 => Ok(false),
                partial => Err(ConnectionError::UnexpectedEof(partial)),
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(true)
    }

    /// Writes every pending reply, in order, with a single flush.
    async fn flush_replies(&mut self) -> Result<(), ConnectionError> {
        if self.out.is_empty() {
            return Ok(());
        }

        self.stream.write_all(&self.out).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(self.out.len());
        trace!(client = %self.addr, bytes = self.out.len(), "Sent replies");

        self.out.clear();
        Ok(())
    }
}

/// Runs a connection to completion, logging rather than returning its error.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    max_buffer: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler =
        ConnectionHandler::new(stream, addr, command_handler, stats).with_max_buffer(max_buffer);
    if let Err(e) = handler.run().await {
        trace!(client = %addr, error = %e, "Connection ended with error");
    }
}
