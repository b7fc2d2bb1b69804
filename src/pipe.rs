//! Bidirectional pipe engine
//!
//! Copies bytes client→server ("upstream") and server→client ("downstream")
//! in two spawned tasks. The first direction to finish decides the outcome:
//! it half-closes its sink, then both streams are torn down and the other
//! direction is drained before returning.
//!
//! The session is accounted for (counters, "connection closed" event) before
//! the close hooks run, since a hook may end the process.

use std::io;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, trace};

use crate::metrics::METRICS;
use crate::stream::DuplexStream;

/// Copy buffer size per direction
pub const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// Result of one tunnel session
#[derive(Debug, Default)]
pub struct PipeOutcome {
    /// Bytes copied client → server
    pub up: u64,
    /// Bytes copied server → client
    pub down: u64,
    /// Time from the start of the pipe until both directions stopped
    pub duration: Duration,
    /// Error of the direction that finished first, if it failed
    pub error: Option<io::Error>,
}

impl PipeOutcome {
    fn log_closed(&self) {
        let duration_ms = self.duration.as_millis() as u64;
        match &self.error {
            Some(e) => info!(
                up_bytes = self.up,
                down_bytes = self.down,
                duration_ms,
                error = %e,
                "connection closed"
            ),
            None => info!(
                up_bytes = self.up,
                down_bytes = self.down,
                duration_ms,
                "connection closed"
            ),
        }
    }
}

#[derive(Debug)]
struct CopyResult {
    bytes: u64,
    error: Option<io::Error>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Pipe two duplex streams together until either side finishes.
///
/// Returns only after both copy tasks have terminated. End of stream and
/// "already closed" style errors count as an orderly shutdown.
pub async fn pipe(client: DuplexStream, server: DuplexStream) -> PipeOutcome {
    let started = Instant::now();
    METRICS.tunnel_opened();

    let (client_reader, client_writer, client_closer) = client.into_parts();
    let (server_reader, server_writer, server_closer) = server.into_parts();

    let (close_tx, close_rx) = watch::channel(false);

    let mut up = tokio::spawn(copy_until_closed(
        client_reader,
        server_writer,
        close_rx.clone(),
        Direction::Up,
    ));
    let mut down = tokio::spawn(copy_until_closed(
        server_reader,
        client_writer,
        close_rx,
        Direction::Down,
    ));

    let (first, first_dir) = tokio::select! {
        r = &mut up => (r, Direction::Up),
        r = &mut down => (r, Direction::Down),
    };
    let first = joined(first);
    trace!(direction = ?first_dir, bytes = first.bytes, "first direction finished");

    // Stop the other direction; its halves are released when it returns
    let _ = close_tx.send(true);

    let other: JoinHandle<CopyResult> = match first_dir {
        Direction::Up => down,
        Direction::Down => up,
    };
    let second = joined(other.await);

    let (up_bytes, down_bytes) = match first_dir {
        Direction::Up => (first.bytes, second.bytes),
        Direction::Down => (second.bytes, first.bytes),
    };
    let outcome = PipeOutcome {
        up: up_bytes,
        down: down_bytes,
        duration: started.elapsed(),
        error: first.error,
    };

    outcome.log_closed();
    METRICS.tunnel_closed();

    client_closer.close();
    server_closer.close();

    outcome
}

fn joined(result: Result<CopyResult, JoinError>) -> CopyResult {
    match result {
        Ok(r) => r,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => CopyResult {
            bytes: 0,
            error: Some(io::Error::other(e)),
        },
    }
}

/// Copy until EOF, error, or the close signal fires
async fn copy_until_closed<R, W>(
    mut reader: R,
    mut writer: W,
    mut closed: watch::Receiver<bool>,
    direction: Direction,
) -> CopyResult
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total: u64 = 0;

    let outcome: io::Result<bool> = 'copy: loop {
        let n = tokio::select! {
            biased;
            _ = closed.changed() => break 'copy Ok(false),
            r = reader.read(&mut buf) => match r {
                Ok(0) => break 'copy Ok(true),
                Ok(n) => n,
                Err(e) => break 'copy Err(e),
            },
        };

        let mut written = 0;
        while written < n {
            tokio::select! {
                biased;
                _ = closed.changed() => break 'copy Ok(false),
                r = writer.write(&buf[written..n]) => match r {
                    Ok(0) => break 'copy Err(io::ErrorKind::WriteZero.into()),
                    Ok(w) => {
                        written += w;
                        total += w as u64;
                        record(direction, w as u64);
                    }
                    Err(e) => break 'copy Err(e),
                },
            }
        }

        tokio::select! {
            biased;
            _ = closed.changed() => break 'copy Ok(false),
            r = writer.flush() => if let Err(e) = r {
                break 'copy Err(e);
            },
        }
    };

    let error = match outcome {
        // Source reached EOF first: pass the half-close on to the sink
        Ok(true) => {
            let result = tokio::select! {
                biased;
                _ = closed.changed() => Ok(()),
                r = writer.shutdown() => r,
            };
            result.err()
        }
        Ok(false) => None,
        Err(e) => Some(e),
    };

    CopyResult {
        bytes: total,
        error: error.filter(|e| !is_orderly_close(e)),
    }
}

fn record(direction: Direction, bytes: u64) {
    match direction {
        Direction::Up => METRICS.bytes_up(bytes),
        Direction::Down => METRICS.bytes_down(bytes),
    }
}

/// Errors that mean the peer already went away rather than a failure
pub(crate) fn is_orderly_close(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}
