//! Tunnel error kinds
//!
//! Every failure on the dial and accept paths is classified into one of
//! these kinds so the server role can pick the right HTTP status and the
//! client role can report a meaningful message.

use std::io;
use thiserror::Error;

/// Errors produced while establishing or running a tunnel
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The dial did not complete within the configured timeout
    #[error("timeout")]
    Timeout,

    /// Transport-level dial, write or handshake failure
    #[error("failed to establish tunnel: {0}")]
    Connect(String),

    /// Malformed proxy environment configuration
    #[error("invalid proxy setting: {0}")]
    ProxyConfig(String),

    /// Upgrade header absent or not acceptable
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The hosting HTTP stack cannot hand off the raw connection
    #[error("this server does not support upgrade protocol")]
    HijackUnsupported,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TunnelError {
    /// Build a connect error from anything displayable
    pub fn connect(err: impl std::fmt::Display) -> Self {
        Self::Connect(err.to_string())
    }

    /// HTTP status the server role answers with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Timeout => 504,
            Self::Connect(_) => 502,
            Self::ProxyConfig(_) => 500,
            Self::ProtocolMismatch(_) => 426,
            Self::HijackUnsupported => 500,
            Self::Io(e) if e.kind() == io::ErrorKind::TimedOut => 504,
            Self::Io(_) => 502,
        }
    }

    /// Whether this error represents an expired deadline
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

impl From<tokio::time::error::Elapsed> for TunnelError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

/// Convenience alias used throughout the library
pub type Result<T> = std::result::Result<T, TunnelError>;
