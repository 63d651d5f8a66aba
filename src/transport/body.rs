//! Body reading under size and total-time limits.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::error_mapping::{map_body_io_error, names};
use super::request::BodyLimits;
use crate::error::GrabError;

/// Bytes requested per read when no size limit is set.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Chunk size for a given byte limit: one byte past the limit at most.
#[must_use]
pub fn chunk_size_for(max_bytes: Option<usize>) -> usize {
    match max_bytes {
        Some(max) => DEFAULT_CHUNK_SIZE.min(max.saturating_add(1)),
        None => DEFAULT_CHUNK_SIZE,
    }
}

/// Reads a response body in fixed-size chunks.
///
/// Stops once more than `max_bytes` have arrived and truncates to exactly
/// `max_bytes`. With `no_body` nothing is read. The `deadline` is checked
/// after every chunk, so a body that keeps trickling in past it fails with a
/// `TotalTimeoutError` even though each chunk arrived in time.
///
/// # Errors
///
/// Returns [`GrabError::Timeout`] when the deadline passes or a chunk read
/// times out, and [`GrabError::Connection`] for other stream faults.
pub async fn read_limited<R>(
    reader: &mut R,
    limits: BodyLimits,
    deadline: Option<Instant>,
    url: &str,
) -> Result<Vec<u8>, GrabError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if limits.no_body {
        return Ok(Vec::new());
    }

    let mut chunk = vec![0_u8; chunk_size_for(limits.max_bytes)];
    let mut data = Vec::new();
    loop {
        let read = reader
            .read(&mut chunk)
            .await
            .map_err(|e| map_body_io_error(e, url))?;
        if read == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..read]);
        if limits.max_bytes.is_some_and(|max| data.len() > max) {
            debug!(url, received = data.len(), "body size limit reached");
            break;
        }
        if deadline.is_some_and(|at| Instant::now() > at) {
            return Err(GrabError::timeout(names::TOTAL_TIMEOUT, url, None));
        }
    }

    if let Some(max) = limits.max_bytes {
        data.truncate(max);
    }
    Ok(data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;

    const URL: &str = "http://example.com/";

    #[test]
    fn test_chunk_size_is_clamped() {
        assert_eq!(chunk_size_for(None), DEFAULT_CHUNK_SIZE);
        assert_eq!(chunk_size_for(Some(5)), 6);
        assert_eq!(chunk_size_for(Some(50_000)), DEFAULT_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_reads_whole_body() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"hello ")
            .read(b"world")
            .build();
        let body = read_limited(&mut reader, BodyLimits::default(), None, URL)
            .await
            .unwrap();
        assert_eq!(body, b"hello world");
    }

    #[tokio::test]
    async fn test_truncates_to_limit_across_chunks() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"abcd")
            .read(b"efgh")
            .build();
        let limits = BodyLimits {
            max_bytes: Some(5),
            no_body: false,
        };
        let body = read_limited(&mut reader, limits, None, URL).await.unwrap();
        assert_eq!(body, b"abcde");
    }

    #[tokio::test]
    async fn test_exact_limit_is_kept() {
        let mut reader = tokio_test::io::Builder::new().read(b"abc").build();
        let limits = BodyLimits {
            max_bytes: Some(3),
            no_body: false,
        };
        let body = read_limited(&mut reader, limits, None, URL).await.unwrap();
        assert_eq!(body, b"abc");
    }

    #[tokio::test]
    async fn test_no_body_reads_nothing() {
        // An empty mock fails if anything is read from it.
        let mut reader = tokio_test::io::Builder::new().build();
        let limits = BodyLimits {
            max_bytes: None,
            no_body: true,
        };
        let body = read_limited(&mut reader, limits, None, URL).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_checked_between_chunks() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"first")
            .wait(Duration::from_millis(150))
            .read(b"second")
            .build();
        let deadline = Instant::now() + Duration::from_millis(50);
        let err = read_limited(&mut reader, BodyLimits::default(), Some(deadline), URL)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.name(), names::TOTAL_TIMEOUT);
    }

    #[tokio::test]
    async fn test_stream_timeout_maps_to_read_timeout() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"partial")
            .read_error(io::Error::new(io::ErrorKind::TimedOut, "stalled"))
            .build();
        let err = read_limited(&mut reader, BodyLimits::default(), None, URL)
            .await
            .unwrap_err();
        assert_eq!(err.name(), names::READ_TIMEOUT);
    }
}
