//! Stream adapters
//!
//! Everything a tunnel moves bytes between (accepted sockets, hijacked HTTP
//! connections, WebSocket sessions, process stdio) is normalized into a
//! [`DuplexStream`] before it reaches the pipe engine.

mod duplex;
mod websocket;

pub use duplex::{BoxReader, BoxWriter, Closer, DuplexStream};
pub use websocket::WsDuplex;
