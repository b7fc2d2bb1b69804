//! End-to-end tests over loopback listeners

mod common;
mod proxy_tests;
mod tunnel_tests;
mod websocket_tests;
