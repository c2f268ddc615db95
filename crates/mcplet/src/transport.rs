//! Line-oriented transport over a child process's stdio.
//!
//! The child's stdin carries client→server lines, its stdout carries
//! server→client lines, and stderr is inherited as a separate, unparsed
//! diagnostic channel. Reads and writes each require `&mut self`, so access
//! is serialized by construction — no partial lines can interleave.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodecError};

use crate::codec::{Frame, JsonLineCodec};
use crate::protocol::{Incoming, Outgoing};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn server process: {0}")]
    Spawn(String),

    /// The stream closed or broke during send. Fatal to the in-progress
    /// call, not to the process; the caller may reconnect.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("line exceeds the configured maximum length")]
    LineTooLong,

    #[error("failed to reap server process: {0}")]
    Wait(#[source] io::Error),
}

fn write_error(err: LinesCodecError) -> TransportError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => TransportError::LineTooLong,
        LinesCodecError::Io(e) => TransportError::Write(e),
    }
}

fn read_error(err: LinesCodecError) -> TransportError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => TransportError::LineTooLong,
        LinesCodecError::Io(e) => TransportError::Read(e),
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How long to wait for the child to exit after its stdin closes before
    /// killing it.
    pub shutdown_grace: Duration,
    /// Upper bound on a single received line; a peer exceeding it is a
    /// transport fault, not a discardable line.
    pub max_line_length: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(5),
            max_line_length: 8 * 1024 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes;
        self
    }
}

/// Reliable line-oriented send/receive.
///
/// `recv` returning `None` means end of stream (the peer closed or exited) —
/// that is a signal to stop waiting, not an error.
#[async_trait]
pub trait Transport: Send {
    /// Serialize `msg` to a single line, write it, and flush so the peer
    /// observes it without buffering delay.
    async fn send(&mut self, msg: Outgoing) -> Result<(), TransportError>;

    /// Read one newline-terminated line, waiting until a full line is
    /// available. `None` once the underlying stream is exhausted.
    async fn recv(&mut self) -> Result<Option<Frame<Incoming>>, TransportError>;

    /// Release the connection.
    async fn shutdown(self) -> Result<(), TransportError>;
}

/// A [`Transport`] over any AsyncRead/AsyncWrite pair.
///
/// This is the piece tests drive with in-memory duplex pipes; production
/// code reaches it through [`StdioTransport`].
pub struct Connection<R, W> {
    reader: FramedRead<R, JsonLineCodec<Incoming>>,
    writer: FramedWrite<W, JsonLineCodec<Outgoing>>,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, JsonLineCodec::new()),
            writer: FramedWrite::new(writer, JsonLineCodec::new()),
        }
    }

    /// Connection whose read path fails once a line exceeds `max_line_length`.
    pub fn bounded(reader: R, writer: W, max_line_length: usize) -> Self {
        Self {
            reader: FramedRead::new(reader, JsonLineCodec::with_max_length(max_line_length)),
            writer: FramedWrite::new(writer, JsonLineCodec::new()),
        }
    }
}

#[async_trait]
impl<R, W> Transport for Connection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, msg: Outgoing) -> Result<(), TransportError> {
        self.writer.send(msg).await.map_err(write_error)
    }

    async fn recv(&mut self) -> Result<Option<Frame<Incoming>>, TransportError> {
        match self.reader.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(read_error(e)),
            None => Ok(None),
        }
    }

    async fn shutdown(mut self) -> Result<(), TransportError> {
        self.writer.close().await.map_err(write_error)
    }
}

/// Transport that owns a server subprocess and speaks over its stdio.
///
/// The child is a scoped resource: `shutdown` tears it down with a
/// graceful-then-forceful escalation, and `kill_on_drop` covers every other
/// exit path so the subprocess never outlives its parent.
pub struct StdioTransport {
    child: Child,
    conn: Connection<ChildStdout, ChildStdin>,
    shutdown_grace: Duration,
}

impl StdioTransport {
    /// Spawn `command` with piped stdin/stdout and inherited stderr.
    pub fn spawn(command: Command) -> Result<Self, TransportError> {
        Self::spawn_with_config(command, TransportConfig::default())
    }

    pub fn spawn_with_config(
        mut command: Command,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Spawn("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Spawn("stdout not captured".to_string()))?;

        tracing::debug!(pid = child.id(), "spawned server process");

        Ok(Self {
            child,
            conn: Connection::bounded(stdout, stdin, config.max_line_length),
            shutdown_grace: config.shutdown_grace,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, msg: Outgoing) -> Result<(), TransportError> {
        self.conn.send(msg).await
    }

    async fn recv(&mut self) -> Result<Option<Frame<Incoming>>, TransportError> {
        self.conn.recv().await
    }

    async fn shutdown(self) -> Result<(), TransportError> {
        let Self {
            mut child,
            conn,
            shutdown_grace,
        } = self;

        // Closing stdin is the stop signal for a stdio server.
        drop(conn);

        match tokio::time::timeout(shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(%status, "server process exited");
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Wait(e)),
            Err(_) => {
                tracing::warn!(
                    grace_secs = shutdown_grace.as_secs_f64(),
                    "server did not exit within grace period, killing"
                );
                child.kill().await.map_err(TransportError::Wait)?;
                Ok(())
            }
        }
    }
}
