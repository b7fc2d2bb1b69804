//! WebSocket fallback, end to end

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::common::*;

#[tokio::test]
async fn test_round_trip_sizes() {
    let target = start_echo_target().await;
    let server = start_server(&target.to_string()).await;
    let url = Url::parse(&format!("ws://{}/", server)).unwrap();

    for size in [0, 1, 65536, 4 * 1024 * 1024] {
        let stream = direct_client().dial(&url).await.unwrap();
        let data = payload(size);
        let echoed = echo_round_trip(stream, data.clone()).await;
        assert!(echoed == data, "payload of {} bytes corrupted", size);
    }
}

#[tokio::test]
async fn test_plain_websocket_client() {
    let target = start_echo_target().await;
    let server = start_server(&target.to_string()).await;

    let (mut ws, response) = tokio_tungstenite::connect_async(format!("ws://{}/", server))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 101);

    // Message boundaries don't matter, only the bytes
    ws.send(Message::Text("hel".into())).await.unwrap();
    ws.send(Message::Binary(b"lo".to_vec())).await.unwrap();

    let mut echoed = Vec::new();
    while echoed.len() < 5 {
        match ws.next().await.unwrap().unwrap() {
            Message::Binary(data) => echoed.extend_from_slice(&data),
            other => panic!("unexpected message {:?}", other),
        }
    }
    assert_eq!(echoed, b"hello");

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_target_close_ends_session() {
    // Target that greets and hangs up
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        let (mut conn, _) = listener.accept().await.unwrap();
        conn.write_all(b"SSH-2.0-test\r\n").await.unwrap();
    });

    let server = start_server(&target.to_string()).await;
    let url = Url::parse(&format!("ws://{}/", server)).unwrap();
    let mut stream = direct_client().dial(&url).await.unwrap();

    use tokio::io::AsyncReadExt;
    let mut greeting = Vec::new();
    tokio::time::timeout(IO_TIMEOUT, stream.read_to_end(&mut greeting))
        .await
        .expect("session did not end")
        .unwrap();
    assert_eq!(greeting, b"SSH-2.0-test\r\n");
}
