//! Response body module
//!
//! Boxed body type shared by every response, plus a chunked body that streams
//! from an async reader so files are never buffered whole.

use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Body, Bytes, Frame, SizeHint};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Read size for streamed bodies
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Body type of every response produced by the server
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

/// Body holding a complete in-memory payload
pub fn full(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Body with no content (HEAD, 304, 204)
pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Streaming body reading `CHUNK_SIZE` bytes per frame until EOF
///
/// The reader is dropped as soon as EOF or an error is reached, and with the
/// body itself if the client goes away first.
pub struct ReaderBody<R> {
    reader: Option<R>,
    buf: Box<[u8]>,
    remaining: Option<u64>,
}

impl<R> ReaderBody<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// `length` is the exact number of bytes the reader yields, if known
    pub fn new(reader: R, length: Option<u64>) -> Self {
        Self {
            reader: Some(reader),
            buf: vec![0; CHUNK_SIZE].into_boxed_slice(),
            remaining: length,
        }
    }

    pub fn into_response_body(self) -> ResponseBody {
        BodyExt::boxed_unsync(self)
    }
}

impl<R> Body for ReaderBody<R>
where
    R: AsyncRead + Unpin,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let Some(reader) = this.reader.as_mut() else {
            return Poll::Ready(None);
        };

        let mut read_buf = ReadBuf::new(&mut this.buf);
        match Pin::new(reader).poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => {
                this.reader = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(Ok(())) => {
                let filled = read_buf.filled();
                if filled.is_empty() {
                    this.reader = None;
                    return Poll::Ready(None);
                }
                if let Some(remaining) = this.remaining.as_mut() {
                    *remaining = remaining.saturating_sub(filled.len() as u64);
                }
                Poll::Ready(Some(Ok(Frame::data(Bytes::copy_from_slice(filled)))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.reader.is_none() || self.remaining == Some(0)
    }

    fn size_hint(&self) -> SizeHint {
        match self.remaining {
            Some(remaining) => SizeHint::with_exact(remaining),
            None => SizeHint::default(),
        }
    }
}
