//! Tunnel dial path
//!
//! Opens a transport to a tunnel endpoint (directly or through an HTTP
//! proxy), performs the upgrade handshake and hands back a [`DuplexStream`]
//! carrying raw tunnel payload.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, error, info, instrument, warn};
use url::{Position, Url};

use super::proxy_env::{ProxyInfo, ProxySettings};
use super::tls;
use crate::config::TunnelConfig;
use crate::error::{Result, TunnelError};
use crate::metrics::METRICS;
use crate::pipe::pipe;
use crate::protocol::{Headers, RequestHead, ResponseHead};
use crate::stream::{DuplexStream, WsDuplex};
use crate::util::{connect_tcp, tune_tcp_stream};

/// Any transport the handshake can run over (plain TCP, TLS, CONNECT tunnel)
pub trait AsyncIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncIo for T {}

pub type BoxedIo = Box<dyn AsyncIo>;

/// Whether `scheme` names a tunnel endpoint rather than a TCP target
pub fn is_tunnel_scheme(scheme: &str) -> bool {
    matches!(scheme, "http" | "https" | "ws" | "wss")
}

/// Client side of a tunnel
#[derive(Debug, Clone)]
pub struct TunnelClient {
    config: Arc<TunnelConfig>,
    proxy: ProxySettings,
}

impl TunnelClient {
    /// Create a client that honors the proxy environment
    pub fn new(config: Arc<TunnelConfig>) -> Self {
        Self {
            config,
            proxy: ProxySettings::from_env(),
        }
    }

    /// Replace the proxy settings read from the environment
    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = proxy;
        self
    }

    /// Dial a tunnel endpoint, choosing the handshake from the URL scheme.
    ///
    /// The whole dial runs under the configured timeout.
    pub async fn dial(&self, url: &Url) -> Result<DuplexStream> {
        let dial = async {
            match url.scheme() {
                "ws" | "wss" => self.dial_websocket(url).await,
                "http" | "https" => self.dial_http(url).await,
                other => Err(TunnelError::Connect(format!(
                    "unsupported URL scheme {:?}",
                    other
                ))),
            }
        };

        tokio::time::timeout(self.config.dial_timeout(), dial).await?
    }

    /// Dial using the custom `Upgrade` handshake
    pub async fn dial_http(&self, url: &Url) -> Result<DuplexStream> {
        let proxy = self.proxy.proxy_for(url)?;
        let secure = url.scheme() == "https";

        // Plain http goes to the proxy as an absolute-form request;
        // https needs a CONNECT tunnel so TLS reaches the endpoint.
        let (io, forward_proxy) = match proxy {
            Some(proxy) if !secure => {
                let io: BoxedIo = Box::new(connect_tcp(&proxy.addr, self.config.dial_timeout()).await?);
                (io, Some(proxy))
            }
            proxy => (self.open_transport(url, proxy.as_ref()).await?, None),
        };

        let request = self.upgrade_request(url, forward_proxy.as_ref())?;
        debug!(target = %request.target, proxied = forward_proxy.is_some(), "Sending upgrade request");

        let mut io = io;
        io.write_all(&request.encode())
            .await
            .map_err(TunnelError::connect)?;
        io.flush().await.map_err(TunnelError::connect)?;

        // Bytes past the response head stay buffered and are read first
        let mut reader = BufReader::new(io);
        let response = ResponseHead::read(&mut reader)
            .await
            .map_err(TunnelError::connect)?;

        if response.status != 101 {
            return Err(TunnelError::Connect(response.status_text()));
        }

        Ok(DuplexStream::from_io(reader))
    }

    /// Dial using a standard WebSocket handshake
    pub async fn dial_websocket(&self, url: &Url) -> Result<DuplexStream> {
        let proxy = self.proxy.proxy_for(url)?;
        let io = self.open_transport(url, proxy.as_ref()).await?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(TunnelError::connect)?;
        let headers = request.headers_mut();
        headers.insert(
            "User-Agent",
            HeaderValue::from_str(&self.config.user_agent).map_err(TunnelError::connect)?,
        );
        headers.insert(
            "Origin",
            HeaderValue::from_str(&http_origin(url)).map_err(TunnelError::connect)?,
        );

        let (ws, _response) = tokio_tungstenite::client_async(request, io)
            .await
            .map_err(TunnelError::connect)?;

        Ok(DuplexStream::from_io(WsDuplex::new(ws)))
    }

    /// Serve one accepted local connection by tunneling it to `target`
    #[instrument(name = "tunnel", skip_all, fields(remote = %peer, url = %target))]
    pub async fn serve_tcp(&self, conn: TcpStream, peer: SocketAddr, target: &Url) {
        tune_tcp_stream(&conn);

        let server = match self.dial(target).await {
            Ok(server) => server,
            Err(e) => {
                METRICS.tunnel_failed();
                if e.is_timeout() {
                    METRICS.timeout();
                }
                error!(error = %e, "failed to establish connection");
                return;
            }
        };

        info!("connection established");

        let (reader, writer) = conn.into_split();
        pipe(DuplexStream::new(reader, writer), server).await;
    }

    /// Connect to the endpoint, through a CONNECT tunnel when proxied, and
    /// wrap in TLS for secure schemes
    async fn open_transport(&self, url: &Url, proxy: Option<&ProxyInfo>) -> Result<BoxedIo> {
        let host = url
            .host_str()
            .ok_or_else(|| TunnelError::Connect(format!("no host in {}", url)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| TunnelError::Connect(format!("no port in {}", url)))?;
        let authority = format!("{}:{}", host, port);
        let timeout = self.config.dial_timeout();

        let io: BoxedIo = match proxy {
            Some(proxy) => {
                let stream = connect_tcp(&proxy.addr, timeout).await?;
                Box::new(self.connect_via_proxy(stream, &authority, proxy).await?)
            }
            None => Box::new(connect_tcp(&authority, timeout).await?),
        };

        if matches!(url.scheme(), "https" | "wss") {
            Ok(Box::new(tls::connect(host, io).await?))
        } else {
            Ok(io)
        }
    }

    /// Ask an HTTP proxy for a raw tunnel to `authority`
    async fn connect_via_proxy(
        &self,
        mut stream: TcpStream,
        authority: &str,
        proxy: &ProxyInfo,
    ) -> Result<BufReader<TcpStream>> {
        let mut headers = Headers::new()
            .with("Host", authority)
            .with("User-Agent", self.config.user_agent.as_str());
        if let Some(auth) = proxy.authorization() {
            headers.append("Proxy-Authorization", auth);
        }
        let request = RequestHead::new("CONNECT", authority, headers);

        stream
            .write_all(&request.encode())
            .await
            .map_err(TunnelError::connect)?;

        let mut reader = BufReader::new(stream);
        let response = ResponseHead::read(&mut reader)
            .await
            .map_err(TunnelError::connect)?;
        if !(200..300).contains(&response.status) {
            warn!(proxy = %proxy.addr, status = response.status, "Proxy refused CONNECT");
            return Err(TunnelError::Connect(format!(
                "proxy {}: {}",
                proxy.addr,
                response.status_text()
            )));
        }

        debug!(proxy = %proxy.addr, target = %authority, "Proxy tunnel established");
        Ok(reader)
    }

    fn upgrade_request(&self, url: &Url, forward_proxy: Option<&ProxyInfo>) -> Result<RequestHead> {
        let host = &url[Position::BeforeHost..Position::AfterPort];
        if host.is_empty() {
            return Err(TunnelError::Connect(format!("no host in {}", url)));
        }

        let mut headers = Headers::new()
            .with("Host", host)
            .with("User-Agent", self.config.user_agent.as_str())
            .with("Upgrade", self.config.protocol.to_string())
            .with("Connection", "upgrade");

        let target = match forward_proxy {
            Some(proxy) => {
                if let Some(auth) = proxy.authorization() {
                    headers.append("Proxy-Authorization", auth);
                }
                let mut absolute = url.clone();
                absolute.set_fragment(None);
                let _ = absolute.set_username("");
                let _ = absolute.set_password(None);
                absolute.to_string()
            }
            None => url[Position::BeforePath..Position::AfterQuery].to_string(),
        };
        let target = if target.is_empty() { "/".to_string() } else { target };

        Ok(RequestHead::new("GET", target, headers))
    }
}

/// The http/https origin matching a ws/wss URL
fn http_origin(url: &Url) -> String {
    let mut origin = url.clone();
    let scheme = if matches!(url.scheme(), "wss" | "https") {
        "https"
    } else {
        "http"
    };
    let _ = origin.set_scheme(scheme);
    origin.origin().ascii_serialization()
}
