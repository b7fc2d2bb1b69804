//! hpipe - TCP over HTTP tunnel
//!
//! This library provides the pieces of a tunnel that carries a raw TCP byte
//! stream across an HTTP(S) connection: the upgrade handshake (with a
//! WebSocket fallback), proxy-aware dialing, and the bidirectional pipe
//! that joins two streams once a tunnel is up.

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipe;
pub mod protocol;
pub mod role;
pub mod server;
pub mod stream;
pub mod util;

pub use client::TunnelClient;
pub use config::{Config, TunnelConfig};
pub use error::{Result, TunnelError};
pub use pipe::{pipe, PipeOutcome};
pub use protocol::ProtocolIdentity;
pub use role::Role;
pub use server::Server;
pub use stream::DuplexStream;

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
