use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use pin_project::pin_project;

use crate::digest::Digest;
use crate::error::{DistributionErrorCode, Error};

/// The stream type every read path in the contract returns.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// A lazily-produced, single-pass sequence of listing results. The
/// first error terminates iteration.
pub type Paged<T> = Pin<Box<dyn Stream<Item = Result<T, Error>> + Send>>;

/// Drive a [`Paged`] stream to completion, short-circuiting on the
/// first error. Mirrors the client-side "collect all" helper.
pub async fn collect_all<T>(mut paged: Paged<T>) -> Result<Vec<T>, Error> {
    use futures::StreamExt;
    let mut out = Vec::new();
    while let Some(item) = paged.next().await {
        out.push(item?);
    }
    Ok(out)
}

const DEFAULT_CHUNK_SIZE: usize = 6 * 1024 * 1024;

/// Re-buffers an arbitrary byte stream into chunks no smaller than
/// `chunk_size` (the final chunk may be short). Used by the chunked
/// upload writers on both the server and client side so that callers
/// can write in whatever sizes are convenient.
#[pin_project]
pub struct ChunkedBody<S> {
    #[pin]
    inner: S,
    buffer: BytesMut,
    chunk_size: usize,
}

impl<S> ChunkedBody<S> {
    pub fn new(inner: S, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size };
        Self {
            inner,
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_size,
        }
    }
}

impl<S> Stream for ChunkedBody<S>
where
    S: Stream<Item = Result<Bytes, Error>>,
{
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(mut bytes))) => {
                    let remaining = *this.chunk_size - this.buffer.len();
                    if bytes.len() < remaining {
                        this.buffer.extend_from_slice(&bytes);
                        continue;
                    }
                    let exact = bytes.split_to(remaining);
                    this.buffer.extend_from_slice(&exact);
                    let buf = this.buffer.split();
                    if !bytes.is_empty() {
                        this.buffer.extend_from_slice(&bytes);
                    }
                    return Poll::Ready(Some(Ok(buf.freeze())));
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    if !this.buffer.is_empty() {
                        let buf = this.buffer.split();
                        return Poll::Ready(Some(Ok(buf.freeze())));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Wraps a byte stream with an incremental digest and a declared size,
/// failing early if the stream exceeds the declared size and failing
/// at EOF if the digest does not match. Used by the HTTP client to
/// verify `GetBlob`/`GetManifest` responses per the contract.
#[pin_project]
pub struct VerifyingBody<S> {
    #[pin]
    inner: S,
    digester: Option<crate::digest::Digester>,
    expected: Digest,
    expected_size: i64,
    seen: i64,
}

impl<S> VerifyingBody<S> {
    pub fn new(inner: S, expected: Digest, expected_size: i64) -> Self {
        let digester = expected.digester();
        Self {
            inner,
            digester: Some(digester),
            expected,
            expected_size,
            seen: 0,
        }
    }
}

impl<S> Stream for VerifyingBody<S>
where
    S: Stream<Item = Result<Bytes, Error>>,
{
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                *this.seen += bytes.len() as i64;
                if *this.seen > *this.expected_size {
                    return Poll::Ready(Some(Err(Error::new(DistributionErrorCode::SizeInvalid))));
                }
                if let Some(d) = this.digester.as_mut() {
                    d.update(&bytes);
                }
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                if *this.seen != *this.expected_size {
                    return Poll::Ready(Some(Err(Error::new(DistributionErrorCode::SizeInvalid))));
                }
                let digester = this.digester.take().expect("polled after completion");
                if digester.matches(this.expected) {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Err(Error::invalid_digest(format!(
                        "content did not match expected digest {}",
                        this.expected
                    )))))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
