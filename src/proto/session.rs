//! Per-connection session handling.
//!
//! A session reads exactly one command frame, possibly across several
//! partial reads, answers it, and closes. EOF, a socket error, or a read
//! timeout before the frame completes closes the session silently; framing
//! problems are the client's, not the daemon's.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::proto::{FuzzyCommand, Op, Reply, COMMAND_SIZE};
use crate::store::HashIndex;
use crate::Error;

/// One client connection, single-shot: read a frame, reply, close.
pub struct Session<S> {
    stream: S,
    timeout: Duration,
    buf: [u8; COMMAND_SIZE],
    pos: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream,
            timeout,
            buf: [0u8; COMMAND_SIZE],
            pos: 0,
        }
    }

    /// Drive the session to completion. Errors are confined: framing
    /// problems close the connection quietly, reply write failures are
    /// logged.
    pub async fn run(mut self, index: &HashIndex) {
        let cmd = match tokio::time::timeout(self.timeout, self.read_frame()).await {
            Err(_) => {
                tracing::debug!("session timed out before a full frame");
                return;
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "session closed before a full frame");
                return;
            }
            Ok(Ok(cmd)) => cmd,
        };

        let reply = dispatch(&cmd, index);
        if let Err(e) = self.stream.write_all(reply.as_bytes()).await {
            tracing::error!(error = %e, "error while writing reply");
        }
    }

    /// Accumulate reads until the frame is complete. EOF mid-frame is a
    /// protocol error.
    async fn read_frame(&mut self) -> Result<FuzzyCommand> {
        while self.pos < COMMAND_SIZE {
            let n = self.stream.read(&mut self.buf[self.pos..]).await?;
            if n == 0 {
                return Err(Error::Protocol(format!(
                    "connection closed after {} of {} bytes",
                    self.pos, COMMAND_SIZE
                )));
            }
            self.pos += n;
        }
        FuzzyCommand::try_from(&self.buf[..])
    }
}

/// Answer a decoded command against the index. An unrecognized command
/// byte yields `ERR`.
pub fn dispatch(cmd: &FuzzyCommand, index: &HashIndex) -> Reply {
    match cmd.op() {
        Some(Op::Check) => Reply::from_outcome(index.check(&cmd.hash)),
        Some(Op::Write) => Reply::from_outcome(index.write(cmd.hash)),
        Some(Op::Delete) => Reply::from_outcome(index.delete(&cmd.hash)),
        None => {
            tracing::debug!(cmd = cmd.cmd, "unknown fuzzy command");
            Reply::Err
        }
    }
}
