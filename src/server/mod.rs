//! Server implementation
//!
//! HTTP listener and tunnel upgrade handling.

mod acceptor;
mod listener;

pub use acceptor::{ConnectionHandler, HEALTH_BODY};
pub use listener::Server;
