//! Custom `Upgrade` handshake, end to end

use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use hpipe::client::{ProxySettings, TcpForwarder};
use hpipe::{ProtocolIdentity, TunnelConfig, TunnelError};

use crate::common::*;

const SIZES: [usize; 4] = [0, 1, 65536, 4 * 1024 * 1024];

async fn tunnel_url() -> Url {
    let target = start_echo_target().await;
    let server = start_server(&target.to_string()).await;
    Url::parse(&format!("http://{}/", server)).unwrap()
}

#[tokio::test]
async fn test_round_trip_sizes() {
    let url = tunnel_url().await;

    for size in SIZES {
        let stream = direct_client().dial(&url).await.unwrap();
        let data = payload(size);
        let echoed = echo_round_trip(stream, data.clone()).await;
        assert!(echoed == data, "payload of {} bytes corrupted", size);
    }
}

#[tokio::test]
async fn test_round_trip_through_local_listener() {
    let url = tunnel_url().await;
    let forwarder = TcpForwarder::bind("127.0.0.1:0", url, direct_client())
        .await
        .unwrap();
    let local = forwarder.local_addr().unwrap();
    tokio::spawn(async move { forwarder.run().await });

    for size in [1, 65536, 4 * 1024 * 1024] {
        let conn = TcpStream::connect(local).await.unwrap();
        let data = payload(size);
        let echoed = echo_round_trip(conn, data.clone()).await;
        assert!(echoed == data, "payload of {} bytes corrupted", size);
    }
}

#[tokio::test]
async fn test_concurrent_tunnels_are_isolated() {
    let url = tunnel_url().await;

    let sessions: Vec<_> = (0..8)
        .map(|i| {
            let url = url.clone();
            tokio::spawn(async move {
                let stream = direct_client().dial(&url).await.unwrap();
                let data: Vec<u8> = payload(10_000 + i).into_iter().map(|b| b ^ i as u8).collect();
                let echoed = echo_round_trip(stream, data.clone()).await;
                assert!(echoed == data, "session {} corrupted", i);
            })
        })
        .collect();

    for session in sessions {
        session.await.unwrap();
    }
}

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let url = tunnel_url().await;
    let config = TunnelConfig {
        protocol: ProtocolIdentity::new("hpipe", "2"),
        ..TunnelConfig::default()
    };

    let err = client_with(config, ProxySettings::direct())
        .dial(&url)
        .await
        .unwrap_err();
    match err {
        TunnelError::Connect(status) => assert_eq!(status, "426 Upgrade Required"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_target_is_bad_gateway() {
    let target = closed_addr().await;
    let server = start_server(&target.to_string()).await;
    let url = Url::parse(&format!("http://{}/", server)).unwrap();

    let err = direct_client().dial(&url).await.unwrap_err();
    match err {
        TunnelError::Connect(status) => assert_eq!(status, "502 Bad Gateway"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_silent_endpoint_is_timeout() {
    // Accepts TCP but never answers the upgrade request
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((conn, _)) = listener.accept().await {
            held.push(conn);
        }
    });

    let config = TunnelConfig {
        dial_timeout_secs: 1,
        ..TunnelConfig::default()
    };
    let client = client_with(config, ProxySettings::direct());

    for scheme in ["http", "ws"] {
        let url = Url::parse(&format!("{}://{}/", scheme, addr)).unwrap();
        let started = std::time::Instant::now();
        let err = client.dial(&url).await.unwrap_err();

        assert!(matches!(err, TunnelError::Timeout), "{}: got {:?}", scheme, err);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
