//! HTTP tunnel listener
//!
//! Accepts TCP connections and hands each one to a [`ConnectionHandler`]
//! on its own task.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::TunnelConfig;

use super::acceptor::ConnectionHandler;

/// HTTP side of the tunnel: `listen` address in, TCP `target` out
pub struct Server {
    listener: TcpListener,
    handler: Arc<ConnectionHandler>,
}

impl Server {
    /// Bind the listening socket. Failing to bind is fatal for the caller.
    pub async fn bind(listen: &str, target: &str, config: Arc<TunnelConfig>) -> Result<Self> {
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("failed to listen on {}", listen))?;

        Ok(Self {
            listener,
            handler: Arc::new(ConnectionHandler::new(target, config)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop. Accept errors are logged and the loop continues.
    pub async fn run(&self) -> Result<()> {
        info!(
            listen = %self.local_addr()?,
            target = %self.handler.target(),
            "http tunnel listening"
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(client = %peer, "new connection");
                    let handler = self.handler.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handler.handle(stream, peer).await {
                            debug!(error = %e, client = %peer, "request failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}
