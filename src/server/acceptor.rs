//! Tunnel accept path
//!
//! Handles one inbound HTTP connection: answers health checks, validates
//! the `Upgrade` token, dials the TCP target and, once the upgrade is
//! agreed, pipes the raw connection to the target.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, field, info, instrument, Span};

use crate::config::TunnelConfig;
use crate::error::{Result, TunnelError};
use crate::metrics::METRICS;
use crate::pipe::pipe;
use crate::protocol::{Headers, RequestHead, ResponseHead};
use crate::stream::{DuplexStream, WsDuplex};
use crate::util::connect_tcp;

/// Body served to plain (non-upgrade) requests
pub const HEALTH_BODY: &str = "hpipe is working\n";

const TUNNEL_FAILED_BODY: &str = "failed to establish tunnel\n";

/// Server side of a tunnel, forwarding to a fixed TCP target
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    target: String,
    config: Arc<TunnelConfig>,
}

impl ConnectionHandler {
    /// Create a handler forwarding accepted tunnels to `target` (`host:port`)
    pub fn new(target: impl Into<String>, config: Arc<TunnelConfig>) -> Self {
        Self {
            target: target.into(),
            config,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Handle an accepted TCP connection
    pub async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        crate::util::tune_tcp_stream(&stream);
        self.serve(stream, peer).await
    }

    /// Serve one HTTP request on `io`, upgrading it into a tunnel if asked to
    #[instrument(
        name = "request",
        skip_all,
        fields(remote = %peer, proto = field::Empty, url = field::Empty, client = field::Empty)
    )]
    pub async fn serve<S>(&self, io: S, peer: SocketAddr) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        // The buffered reader doubles as the hijacked connection: anything the
        // client sent right after the request head is replayed from it.
        let mut conn = BufReader::new(io);

        let request = match RequestHead::read(&mut conn).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                debug!(error = %e, "malformed request");
                METRICS.request_rejected();
                respond(&mut conn, 400, Headers::new(), "bad request\n").await?;
                return Err(TunnelError::ProtocolMismatch(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let span = Span::current();
        span.record("url", request.target.as_str());
        if let Some(agent) = request.headers.get("user-agent") {
            span.record("client", agent);
        }

        if request.path() != "/" {
            info!("not found");
            METRICS.request_rejected();
            respond(&mut conn, 404, Headers::new(), "404 page not found\n").await?;
            return Ok(());
        }

        match request.headers.get("upgrade").filter(|u| !u.is_empty()) {
            None => {
                info!("serve working page");
                METRICS.health_check();
                respond(&mut conn, 200, Headers::new(), HEALTH_BODY).await?;
                Ok(())
            }
            // Any upgrade we don't speak is treated as a WebSocket attempt
            Some(upgrade) if !self.config.protocol.accepts(upgrade) => {
                span.record("proto", "websocket");
                self.serve_websocket(conn, &request).await
            }
            Some(_) => {
                span.record("proto", self.config.protocol.name.as_str());
                self.serve_upgrade(conn).await
            }
        }
    }

    /// Custom protocol: dial, answer 101, then pipe the raw connection
    async fn serve_upgrade<S>(&self, mut conn: BufReader<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let target = match self.dial_target().await {
            Ok(target) => target,
            Err(e) => {
                respond(&mut conn, e.status_code(), Headers::new(), TUNNEL_FAILED_BODY).await?;
                return Err(e);
            }
        };

        let response = ResponseHead::new(
            101,
            Headers::new()
                .with("Connection", "upgrade")
                .with("Upgrade", self.config.protocol.to_string()),
        );
        conn.write_all(&response.encode()).await?;
        conn.flush().await?;

        self.run_tunnel(DuplexStream::from_io(conn), target).await;
        Ok(())
    }

    /// WebSocket fallback. The target is dialed before the handshake is
    /// finalized so dial failures can still be reported as HTTP errors.
    async fn serve_websocket<S>(&self, mut conn: BufReader<S>, request: &RequestHead) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let Some(key) = request.headers.get("sec-websocket-key") else {
            let upgrade = request.headers.get("upgrade").unwrap_or_default().to_string();
            info!(upgrade = %upgrade, "unsupported upgrade request");
            METRICS.request_rejected();
            let headers = Headers::new()
                .with("Upgrade", self.config.protocol.to_string())
                .with("Connection", "upgrade");
            respond(&mut conn, 426, headers, "upgrade required\n").await?;
            return Err(TunnelError::ProtocolMismatch(upgrade));
        };
        let accept = derive_accept_key(key.as_bytes());

        let target = match self.dial_target().await {
            Ok(target) => target,
            Err(e) => {
                respond(&mut conn, e.status_code(), Headers::new(), TUNNEL_FAILED_BODY).await?;
                return Err(e);
            }
        };

        let response = ResponseHead::new(
            101,
            Headers::new()
                .with("Upgrade", "websocket")
                .with("Connection", "Upgrade")
                .with("Sec-WebSocket-Accept", accept),
        );
        conn.write_all(&response.encode()).await?;
        conn.flush().await?;

        let ws = WebSocketStream::from_raw_socket(conn, Role::Server, None).await;
        self.run_tunnel(DuplexStream::from_io(WsDuplex::new(ws)), target)
            .await;
        Ok(())
    }

    async fn dial_target(&self) -> Result<TcpStream> {
        match connect_tcp(&self.target, self.config.dial_timeout()).await {
            Ok(target) => Ok(target),
            Err(e) => {
                METRICS.tunnel_failed();
                if e.is_timeout() {
                    METRICS.timeout();
                    error!(error = %e, target = %self.target, "timeout to connect target");
                } else {
                    error!(error = %e, target = %self.target, "failed to connect target");
                }
                Err(e)
            }
        }
    }

    async fn run_tunnel(&self, client: DuplexStream, target: TcpStream) {
        info!("connection established");

        let (reader, writer) = target.into_split();
        pipe(client, DuplexStream::new(reader, writer)).await;
    }
}

/// Write a complete plain-text response and close the write side
async fn respond<W>(conn: &mut W, status: u16, mut headers: Headers, body: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    headers.append("Content-Type", "text/plain; charset=utf-8");
    headers.append("Content-Length", body.len().to_string());
    headers.append("Connection", "close");

    let mut out = ResponseHead::new(status, headers).encode();
    out.extend_from_slice(body.as_bytes());
    conn.write_all(&out).await?;
    conn.flush().await?;
    conn.shutdown().await
}
