//! WebSocket message adapter
//!
//! Presents a message-oriented WebSocket session as a plain byte stream.
//! Inbound messages are buffered and handed out across as many reads as the
//! caller needs; every write becomes exactly one binary message.

use bytes::{Buf, Bytes};
use futures_util::{Sink, Stream};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

/// Byte-stream view over a [`WebSocketStream`]
pub struct WsDuplex<S> {
    inner: WebSocketStream<S>,
    read_buf: Bytes,
    read_eof: bool,
}

impl<S> WsDuplex<S> {
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self {
            inner,
            read_buf: Bytes::new(),
            read_eof: false,
        }
    }
}

impl<S> AsyncRead for WsDuplex<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.read_buf.is_empty() {
                let n = this.read_buf.len().min(buf.remaining());
                buf.put_slice(&this.read_buf[..n]);
                this.read_buf.advance(n);
                return Poll::Ready(Ok(()));
            }

            if this.read_eof {
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(Message::Binary(data))) => this.read_buf = Bytes::from(data),
                Some(Ok(Message::Text(text))) => this.read_buf = Bytes::from(text.into_bytes()),
                Some(Ok(Message::Close(_))) | None => this.read_eof = true,
                // Control frames carry no payload for the tunnel
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => match into_io_error(e) {
                    Some(e) => return Poll::Ready(Err(e)),
                    None => this.read_eof = true,
                },
            }
        }
    }
}

impl<S> AsyncWrite for WsDuplex<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let this = self.get_mut();

        ready!(Pin::new(&mut this.inner).poll_ready(cx)).map_err(closed_as_broken_pipe)?;
        Pin::new(&mut this.inner)
            .start_send(Message::Binary(buf.to_vec()))
            .map_err(closed_as_broken_pipe)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner)
            .poll_flush(cx)
            .map_err(closed_as_broken_pipe)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_close(cx)) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(into_io_error(e).map_or(Ok(()), Err)),
        }
    }
}

/// Map a WebSocket error to an I/O error; `None` means an orderly close.
///
/// A peer dropping TCP without a Close frame is still end of stream here,
/// the same as a FIN on a plain socket.
fn into_io_error(err: WsError) -> Option<io::Error> {
    match err {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => None,
        WsError::Io(e) => Some(e),
        other => Some(io::Error::other(other)),
    }
}

fn closed_as_broken_pipe(err: WsError) -> io::Error {
    into_io_error(err)
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "websocket closed"))
}
