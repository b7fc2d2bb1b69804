//! Wire protocol
//!
//! The upgrade token advertised by both ends of a tunnel and the small
//! HTTP/1.1 head codec used before the connection switches to raw bytes.

pub mod http;
mod identity;

pub use http::{Headers, RequestHead, ResponseHead};
pub use identity::ProtocolIdentity;
