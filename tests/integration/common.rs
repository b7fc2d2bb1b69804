//! Shared fixtures: echo targets, tunnel servers and payload helpers

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use hpipe::client::ProxySettings;
use hpipe::{Server, TunnelClient, TunnelConfig};

/// Upper bound for any single exchange in these tests
pub const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP target echoing every byte back until the peer closes
pub async fn start_echo_target() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (conn, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = conn.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });

    addr
}

/// Tunnel server forwarding to `target`
pub async fn start_server(target: &str) -> SocketAddr {
    start_server_with(target, TunnelConfig::default()).await
}

pub async fn start_server_with(target: &str, config: TunnelConfig) -> SocketAddr {
    let server = Server::bind("127.0.0.1:0", target, Arc::new(config))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.run().await });
    addr
}

/// Client that ignores the proxy environment of the test process
pub fn direct_client() -> TunnelClient {
    client_with(TunnelConfig::default(), ProxySettings::direct())
}

pub fn client_with(config: TunnelConfig, proxy: ProxySettings) -> TunnelClient {
    TunnelClient::new(Arc::new(config)).with_proxy(proxy)
}

/// An address nothing listens on
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// A listener whose accept queue is full, so new connects stall.
///
/// With a zero backlog and nobody accepting, the kernel drops further SYNs
/// once one connection is queued. Keep the returned value alive for the
/// duration of the test.
pub async fn stalled_target() -> (SocketAddr, (socket2::Socket, Vec<TcpStream>)) {
    use socket2::{Domain, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    socket
        .bind(&"127.0.0.1:0".parse::<SocketAddr>().unwrap().into())
        .unwrap();
    socket.listen(0).unwrap();
    let addr = socket.local_addr().unwrap().as_socket().unwrap();

    let mut queued = Vec::new();
    for _ in 0..16 {
        match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
            Ok(Ok(conn)) => queued.push(conn),
            _ => break,
        }
    }

    (addr, (socket, queued))
}

/// Deterministic, non-repeating-per-page payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Send `data` through an echoing tunnel and return what comes back.
///
/// Writing runs concurrently with reading so large payloads can't deadlock
/// on full buffers. After the echo is complete the write side is shut down
/// and the stream must then reach EOF with nothing left over.
pub async fn echo_round_trip<S>(stream: S, data: Vec<u8>) -> Vec<u8>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let len = data.len();

    let write_task = tokio::spawn(async move {
        writer.write_all(&data).await.unwrap();
        writer.flush().await.unwrap();
        writer
    });

    let mut echoed = vec![0u8; len];
    tokio::time::timeout(IO_TIMEOUT, reader.read_exact(&mut echoed))
        .await
        .expect("echo timed out")
        .unwrap();

    let mut writer = write_task.await.unwrap();
    writer.shutdown().await.unwrap();

    let mut rest = Vec::new();
    tokio::time::timeout(IO_TIMEOUT, reader.read_to_end(&mut rest))
        .await
        .expect("tunnel did not close")
        .unwrap();
    assert!(rest.is_empty(), "{} unexpected trailing bytes", rest.len());

    echoed
}

/// Write a raw HTTP request and collect the whole response
pub async fn raw_exchange(addr: SocketAddr, request: &str) -> String {
    let mut conn = TcpStream::connect(addr).await.unwrap();
    conn.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(IO_TIMEOUT, conn.read_to_end(&mut response))
        .await
        .expect("response timed out")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}
