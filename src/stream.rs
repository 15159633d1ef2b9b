//! Adapter from a stream of byte chunks to `AsyncRead`
//!
//! HTTP clients usually hand out bodies as `Stream<Item = Result<Bytes, _>>`.
//! Wrap such a stream (mapping its error into `io::Error`) in
//! [`ChunkStreamReader`] to feed it to the async extractor.

use futures_util::Stream;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

pin_project! {
    /// `AsyncRead` over a stream of byte chunks
    ///
    /// Chunks are handed out as they arrive; nothing is read ahead. The reader
    /// is `Unpin` when the stream is; box-pin other streams first.
    pub struct ChunkStreamReader<S, B> {
        #[pin]
        stream: S,
        chunk: Option<B>,
        pos: usize,
        done: bool,
    }
}

impl<S, B> ChunkStreamReader<S, B>
where
    S: Stream<Item = io::Result<B>>,
    B: AsRef<[u8]>,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            chunk: None,
            pos: 0,
            done: false,
        }
    }

    /// Give back the stream; a partially consumed chunk is lost
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S, B> AsyncRead for ChunkStreamReader<S, B>
where
    S: Stream<Item = io::Result<B>>,
    B: AsRef<[u8]>,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut this = self.project();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            if let Some(chunk) = this.chunk.as_ref() {
                let bytes = chunk.as_ref();
                if *this.pos < bytes.len() {
                    let n = (bytes.len() - *this.pos).min(buf.remaining());
                    buf.put_slice(&bytes[*this.pos..*this.pos + n]);
                    *this.pos += n;
                    return Poll::Ready(Ok(()));
                }
                *this.chunk = None;
                *this.pos = 0;
            }

            if *this.done {
                return Poll::Ready(Ok(()));
            }

            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => *this.chunk = Some(chunk),
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => {
                    *this.done = true;
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }
}
