//! Deployment roles
//!
//! The binary runs exactly one of three roles, picked from the command line:
//!
//! - `hpipe -l [addr]:port URL`: local TCP listener, each connection tunneled to `URL`
//! - `hpipe -l [addr]:port host:port`: HTTP tunnel server forwarding to a TCP target
//! - `hpipe URL`: process stdio bridged to a single tunnel

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use url::Url;

use crate::client::{is_tunnel_scheme, TcpForwarder, TunnelClient};
use crate::config::TunnelConfig;
use crate::metrics::METRICS;
use crate::pipe::pipe;
use crate::server::Server;
use crate::stream::DuplexStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// TCP listener forwarding to a tunnel endpoint
    TcpToHttp { listen: String, target: Url },
    /// HTTP tunnel server forwarding to a TCP address
    HttpToTcp { listen: String, target: String },
    /// stdin/stdout bridged to a tunnel endpoint
    StdioToHttp { target: String },
}

impl Role {
    /// Pick the role for an optional listen address and the positional target
    pub fn from_args(listen: Option<&str>, target: &str) -> Role {
        match listen.filter(|l| !l.is_empty()) {
            Some(listen) => match Url::parse(target) {
                Ok(url) if is_tunnel_scheme(url.scheme()) => Role::TcpToHttp {
                    listen: listen.to_string(),
                    target: url,
                },
                // "host:port" may parse as a URL with scheme "host"
                _ => Role::HttpToTcp {
                    listen: listen.to_string(),
                    target: target.to_string(),
                },
            },
            None => Role::StdioToHttp {
                target: target.to_string(),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::TcpToHttp { .. } => "tcp->http",
            Role::HttpToTcp { .. } => "http->tcp",
            Role::StdioToHttp { .. } => "stdio->http",
        }
    }

    /// Run the role. Listener roles only return on a startup failure.
    pub async fn run(self, config: Arc<TunnelConfig>) -> Result<()> {
        match self {
            Role::TcpToHttp { listen, target } => {
                let client = TunnelClient::new(config);
                let forwarder = TcpForwarder::bind(&listen, target, client).await?;
                forwarder.run().await
            }
            Role::HttpToTcp { listen, target } => {
                let server = Server::bind(&listen, &target, config).await?;
                server.run().await
            }
            Role::StdioToHttp { target } => run_stdio(&target, config).await,
        }
    }
}

/// Bridge stdio to one tunnel. The session is logged when the pipe ends,
/// then the stdio closer exits the process.
async fn run_stdio(target: &str, config: Arc<TunnelConfig>) -> Result<()> {
    let url = Url::parse(target).with_context(|| format!("invalid URL: {}", target))?;
    let client = TunnelClient::new(config);

    let span = info_span!("tunnel", url = %url, proto = "stdio");
    async move {
        let server = match client.dial(&url).await {
            Ok(server) => server,
            Err(e) => {
                METRICS.tunnel_failed();
                if e.is_timeout() {
                    METRICS.timeout();
                }
                return Err(e.into());
            }
        };
        info!("connection established");

        pipe(DuplexStream::stdio(), server).await;
        Ok::<_, anyhow::Error>(())
    }
    .instrument(span)
    .await
}
