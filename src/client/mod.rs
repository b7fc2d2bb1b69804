//! Tunnel client
//!
//! Dials tunnel endpoints over HTTP upgrade or WebSocket, optionally
//! through an HTTP proxy taken from the environment.

mod dialer;
mod forwarder;
pub mod proxy_env;
mod tls;

pub use dialer::{is_tunnel_scheme, AsyncIo, BoxedIo, TunnelClient};
pub use forwarder::TcpForwarder;
pub use proxy_env::{ProxyInfo, ProxySettings};
