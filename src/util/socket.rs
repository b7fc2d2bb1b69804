//! Socket utilities and tuning

use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::time::Duration;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::{Result, TunnelError};

/// Idle time before the first keepalive probe
pub const KEEPALIVE_TIME: Duration = Duration::from_secs(60);
/// Interval between keepalive probes
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Apply tunnel socket options to a connected TCP stream.
///
/// Failures are logged and ignored; an untuned socket still works.
pub fn tune_tcp_stream(stream: &TcpStream) {
    if let Err(e) = try_tune(stream) {
        debug!(error = %e, "Failed to tune TCP socket");
    }
}

fn try_tune(stream: &TcpStream) -> io::Result<()> {
    // Tunnel payload is often interactive (ssh), don't batch small writes
    stream.set_nodelay(true)?;

    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_TIME)
        .with_interval(KEEPALIVE_INTERVAL);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)?;

    Ok(())
}

/// Connect to a TCP address within `timeout`.
///
/// An expired deadline is [`TunnelError::Timeout`]; any other failure is
/// [`TunnelError::Connect`].
pub async fn connect_tcp<A>(addr: A, timeout: Duration) -> Result<TcpStream>
where
    A: ToSocketAddrs + std::fmt::Display,
{
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Err(_) => return Err(TunnelError::Timeout),
        Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => return Err(TunnelError::Timeout),
        Ok(Err(e)) => return Err(TunnelError::Connect(format!("{}: {}", addr, e))),
        Ok(Ok(stream)) => stream,
    };

    tune_tcp_stream(&stream);
    Ok(stream)
}
