use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One-shot close hook attached to a [`DuplexStream`]
pub struct Closer(Option<Box<dyn FnOnce() + Send>>);

impl Closer {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new(hook: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(hook)))
    }

    /// Run the hook if there is one. Without a hook this is a no-op.
    pub fn close(mut self) {
        if let Some(hook) = self.0.take() {
            hook();
        }
    }
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Closer").field(&self.0.is_some()).finish()
    }
}

/// A bidirectional byte stream built from an independent read side, write
/// side and optional close hook.
///
/// Reads and writes touch disjoint resources, so the two sides can be driven
/// from different tasks once separated with [`DuplexStream::into_parts`].
/// Dropping a side releases the underlying resource; the close hook is for
/// owners that need more than that (stdio ends the process).
pub struct DuplexStream {
    reader: BoxReader,
    writer: BoxWriter,
    closer: Closer,
}

impl DuplexStream {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            closer: Closer::none(),
        }
    }

    /// Split a single full-duplex I/O object into its two sides
    pub fn from_io<S>(io: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self::new(reader, writer)
    }

    /// Process stdin/stdout. Closing it terminates the process, since for
    /// the stdio role the process is the connection.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout()).with_closer(|| std::process::exit(0))
    }

    pub fn with_closer(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.closer = Closer::new(hook);
        self
    }

    pub fn into_parts(self) -> (BoxReader, BoxWriter, Closer) {
        (self.reader, self.writer, self.closer)
    }
}

impl fmt::Debug for DuplexStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexStream")
            .field("closer", &self.closer)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for DuplexStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for DuplexStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}
