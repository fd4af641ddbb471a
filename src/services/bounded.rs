use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf, Take};

#[derive(Debug, Error)]
#[error("upload exceeds the {limit}-byte ceiling")]
pub struct SizeLimitExceeded {
    pub limit: u64,
}

impl SizeLimitExceeded {
    pub fn into_io(self) -> io::Error {
        io::Error::other(self)
    }
}

/// Returns true when `err` carries a [`SizeLimitExceeded`] raised anywhere below it.
pub fn is_size_limit_exceeded(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.downcast_ref::<SizeLimitExceeded>().is_some())
}

/// Reader that yields at most `limit` bytes of the wrapped stream and fails with
/// [`SizeLimitExceeded`] as soon as a byte past the ceiling shows up.
///
/// Nothing is buffered here: reads are forwarded into the caller's buffer, clamped
/// to the bytes still allowed.
pub struct BoundedReader<R> {
    inner: Take<R>,
    limit: u64,
}

impl<R: AsyncRead + Unpin> BoundedReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner: inner.take(limit),
            limit,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Bytes handed out so far
    pub fn consumed(&self) -> u64 {
        self.limit - self.inner.limit()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for BoundedReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;

        if this.inner.limit() > 0 {
            return Pin::new(&mut this.inner).poll_read(cx, buf);
        }

        // Ceiling reached: one more byte from the source means overflow.
        let mut probe = [0u8; 1];
        let mut probe_buf = ReadBuf::new(&mut probe);
        ready!(Pin::new(this.inner.get_mut()).poll_read(cx, &mut probe_buf))?;

        if probe_buf.filled().is_empty() {
            Poll::Ready(Ok(()))
        } else {
            Poll::Ready(Err(SizeLimitExceeded { limit: this.limit }.into_io()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_under_limit_passes_through() {
        let data = b"hello world".to_vec();
        let mut reader = BoundedReader::new(&data[..], 64);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
        assert_eq!(reader.consumed(), data.len() as u64);
    }

    #[tokio::test]
    async fn test_exactly_at_limit_passes_through() {
        let data = vec![7u8; 4096];
        let mut reader = BoundedReader::new(&data[..], 4096);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let mut reader = BoundedReader::new(tokio::io::empty(), 0);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_over_limit_fails_before_extra_byte() {
        let limit = 1000u64;
        let source = tokio::io::repeat(0xAB).take(limit + 1);
        let mut reader = BoundedReader::new(source, limit);

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();

        assert!(is_size_limit_exceeded(&err));
        assert_eq!(out.len() as u64, limit);
    }

    #[tokio::test]
    async fn test_zero_limit_rejects_any_byte() {
        let mut reader = BoundedReader::new(&b"x"[..], 0);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert!(is_size_limit_exceeded(&err));
        assert!(out.is_empty());
    }

    #[test]
    fn test_plain_io_error_is_not_size_limit() {
        let err = io::Error::new(io::ErrorKind::BrokenPipe, "client went away");
        assert!(!is_size_limit_exceeded(&err));
    }
}
