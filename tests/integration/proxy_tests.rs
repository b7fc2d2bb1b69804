//! Dialing through an HTTP proxy
//!
//! Tunnel URLs use a non-loopback host name so the proxy is actually
//! selected; the proxies under test route every request to the local
//! tunnel server regardless of the host asked for.

use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use url::Url;

use hpipe::client::ProxySettings;
use hpipe::protocol::RequestHead;
use hpipe::{TunnelConfig, TunnelError};

use crate::common::*;

fn http_proxy(value: String) -> ProxySettings {
    ProxySettings {
        http_proxy: Some(value),
        ..ProxySettings::default()
    }
}

/// CONNECT-only proxy answering with `status`; on success it bridges to
/// `upstream`. The CONNECT request it saw is reported back.
async fn start_connect_proxy(
    upstream: SocketAddr,
    status: &'static str,
) -> (SocketAddr, oneshot::Receiver<RequestHead>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (conn, _) = listener.accept().await.unwrap();
        let mut conn = BufReader::new(conn);
        let request = RequestHead::read(&mut conn).await.unwrap().unwrap();
        let _ = seen_tx.send(request);

        conn.write_all(format!("HTTP/1.1 {}\r\n\r\n", status).as_bytes())
            .await
            .unwrap();
        if status.starts_with("200") {
            let mut upstream = TcpStream::connect(upstream).await.unwrap();
            let _ = tokio::io::copy_bidirectional(&mut conn, &mut upstream).await;
        }
    });

    (addr, seen_rx)
}

#[tokio::test]
async fn test_plain_http_uses_absolute_form() {
    let target = start_echo_target().await;
    // The tunnel server accepts absolute-form requests, so it can stand in
    // for a forward proxy
    let server = start_server(&target.to_string()).await;

    let client = client_with(
        TunnelConfig::default(),
        http_proxy(format!("http://user:secret@{}", server)),
    );
    let url = Url::parse("http://tunnel.invalid/").unwrap();

    let stream = client.dial(&url).await.unwrap();
    let data = payload(65536);
    assert!(echo_round_trip(stream, data.clone()).await == data);
}

#[tokio::test]
async fn test_websocket_uses_connect_tunnel() {
    let target = start_echo_target().await;
    let server = start_server(&target.to_string()).await;
    let (proxy, seen) = start_connect_proxy(server, "200 Connection established").await;

    let client = client_with(
        TunnelConfig::default(),
        http_proxy(format!("http://us%3Aer:pa%40ss@{}", proxy)),
    );
    let url = Url::parse("ws://tunnel.invalid:8080/").unwrap();

    let stream = client.dial(&url).await.unwrap();
    let data = payload(100_000);
    assert!(echo_round_trip(stream, data.clone()).await == data);

    let request = seen.await.unwrap();
    assert_eq!(request.method, "CONNECT");
    assert_eq!(request.target, "tunnel.invalid:8080");
    // base64("us:er:pa@ss")
    assert_eq!(
        request.headers.get("Proxy-Authorization"),
        Some("Basic dXM6ZXI6cGFAc3M=")
    );
}

#[tokio::test]
async fn test_refused_connect_is_connect_error() {
    let (proxy, _seen) =
        start_connect_proxy(closed_addr().await, "407 Proxy Authentication Required").await;

    let client = client_with(TunnelConfig::default(), http_proxy(proxy.to_string()));
    let url = Url::parse("ws://tunnel.invalid/").unwrap();

    match client.dial(&url).await.unwrap_err() {
        TunnelError::Connect(msg) => assert!(msg.contains("407"), "{}", msg),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_proxy_setting_is_config_error() {
    let client = client_with(
        TunnelConfig::default(),
        http_proxy("socks5://127.0.0.1:1080".to_string()),
    );
    let url = Url::parse("http://tunnel.invalid/").unwrap();

    let err = client.dial(&url).await.unwrap_err();
    assert!(matches!(err, TunnelError::ProxyConfig(_)), "got {:?}", err);
}
