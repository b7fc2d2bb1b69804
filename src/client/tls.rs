//! TLS client setup for https/wss endpoints

use rustls::pki_types::ServerName;
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::{Result, TunnelError};

static CLIENT_CONFIG: OnceLock<std::result::Result<Arc<rustls::ClientConfig>, String>> =
    OnceLock::new();

/// Shared client configuration trusting the webpki root set
fn client_config() -> Result<Arc<rustls::ClientConfig>> {
    CLIENT_CONFIG
        .get_or_init(|| {
            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            rustls::ClientConfig::builder_with_provider(Arc::new(
                rustls::crypto::ring::default_provider(),
            ))
            .with_safe_default_protocol_versions()
            .map(|builder| {
                Arc::new(
                    builder
                        .with_root_certificates(root_store)
                        .with_no_client_auth(),
                )
            })
            .map_err(|e| e.to_string())
        })
        .clone()
        .map_err(|e| TunnelError::Connect(format!("TLS setup failed: {}", e)))
}

/// Run a TLS handshake for `host` over an established transport
pub async fn connect<S>(host: &str, stream: S) -> Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // IPv6 literals come bracketed out of URLs
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let server_name = ServerName::try_from(bare.to_string())
        .map_err(|e| TunnelError::Connect(format!("invalid TLS server name {:?}: {}", bare, e)))?;

    TlsConnector::from(client_config()?)
        .connect(server_name, stream)
        .await
        .map_err(|e| TunnelError::Connect(format!("TLS handshake with {} failed: {}", bare, e)))
}
