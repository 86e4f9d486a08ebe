//! Line-oriented HTTP/1.1 framing primitives.
//!
//! A message head is a run of `\n`-terminated lines closed by a bare `\r\n`.
//! Lines are kept as raw bytes with their terminators so that the exact header
//! block can be written back out unchanged; logical parsing strips the CRLF.

use bytes::{Bytes, BytesMut};
use std::borrow::Cow;
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

use super::error::MessageError;

/// Default upper bound for a whole header block, terminator included
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

/// Default upper bound for a materialized request body
pub const DEFAULT_MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// Initial buffer size for a body; the buffer grows as bytes arrive
const BODY_READ_CHUNK: u64 = 8 * 1024;

/// Header name (lowercase) to trimmed value.
pub type HeaderMap = HashMap<String, String>;

/// Size limits applied while parsing a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_header_bytes: usize,
    pub max_body_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Read one `\n`-terminated line into `line`, reading at most `limit` bytes.
///
/// Returns the number of bytes appended. A stream that ends before the
/// terminator is an `UnexpectedEof` error; a line that does not fit in
/// `limit` is `HeaderTooLarge`.
pub(crate) async fn read_line<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    limit: usize,
) -> Result<usize, MessageError>
where
    R: AsyncBufRead + Unpin,
{
    if limit == 0 {
        return Err(MessageError::HeaderTooLarge(limit));
    }

    let n = (&mut *reader)
        .take(limit as u64)
        .read_until(b'\n', line)
        .await?;

    if line.ends_with(b"\n") {
        return Ok(n);
    }
    if n == limit {
        return Err(MessageError::HeaderTooLarge(limit));
    }
    Err(MessageError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "stream closed before end of line",
    )))
}

/// Read header lines until the blank `\r\n` line.
///
/// The returned lines keep their terminators; the blank line itself is
/// consumed but not returned.
pub async fn read_header_lines<R>(
    reader: &mut R,
    limits: &Limits,
) -> Result<Vec<Vec<u8>>, MessageError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut total = 0usize;

    loop {
        let remaining = limits.max_header_bytes.saturating_sub(total);
        let mut line = Vec::with_capacity(64);
        let n = read_line(reader, &mut line, remaining)
            .await
            .map_err(|e| match e {
                MessageError::HeaderTooLarge(_) => {
                    MessageError::HeaderTooLarge(limits.max_header_bytes)
                }
                other => other,
            })?;
        total += n;

        // end of headers
        if line == b"\r\n" {
            break;
        }
        lines.push(line);
    }

    Ok(lines)
}

/// Text of a line with its trailing CRLF removed.
pub fn line_text(line: &[u8]) -> Cow<'_, str> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line)
}

/// Split a request or status line into its three space-separated fields.
///
/// The third field is the remainder of the line, so a status text may
/// contain spaces. Returns `None` when fewer than three fields exist.
pub fn split_start_line(line: &[u8]) -> Option<(String, String, String)> {
    let text = line_text(line);
    let mut fields = text.splitn(3, ' ');
    let first = fields.next()?;
    let second = fields.next()?;
    let third = fields.next()?;
    Some((first.to_string(), second.to_string(), third.to_string()))
}

/// Build the header map from `lines`, skipping the first `skip` lines.
///
/// Each line is split on its first colon only. Lines without a colon are
/// dropped. Names are lowercased, and on duplicates the last value wins.
pub fn parse_header_map(lines: &[Vec<u8>], skip: usize) -> HeaderMap {
    lines
        .iter()
        .skip(skip)
        .filter_map(|line| {
            let text = line_text(line);
            let (name, value) = text.split_once(':')?;
            Some((name.trim().to_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Numeric value of the `content-length` header, if any.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get("content-length")?.parse().ok()
}

/// True when the final transfer coding is `chunked`.
pub fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get("transfer-encoding")
        .and_then(|v| v.rsplit(',').next())
        .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

/// Read exactly `content-length` bytes of body.
///
/// A missing or non-numeric length yields an empty body. A stream that closes
/// before the declared length is reached is an error, never a short body.
pub async fn read_exact_body<R>(
    reader: &mut R,
    headers: &HeaderMap,
    limits: &Limits,
) -> Result<Bytes, MessageError>
where
    R: AsyncRead + Unpin,
{
    let Some(len) = content_length(headers) else {
        return Ok(Bytes::new());
    };
    if len > limits.max_body_bytes {
        return Err(MessageError::BodyTooLarge(len));
    }

    // grow with the data actually received
    let mut body = Vec::with_capacity(len.min(BODY_READ_CHUNK) as usize);
    let read = (&mut *reader).take(len).read_to_end(&mut body).await?;
    if (read as u64) < len {
        return Err(MessageError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("stream closed after {} of {} body bytes", read, len),
        )));
    }
    Ok(Bytes::from(body))
}

/// Concatenate `lines` as received and close the block with a blank line.
pub fn reconstruct_raw_header_block(lines: &[Vec<u8>]) -> Bytes {
    let size = lines.iter().map(Vec::len).sum::<usize>() + 2;
    let mut block = BytesMut::with_capacity(size);
    for line in lines {
        block.extend_from_slice(line);
    }
    block.extend_from_slice(b"\r\n");
    block.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<Vec<u8>> {
        raw.iter().map(|l| l.as_bytes().to_vec()).collect()
    }

    #[tokio::test]
    async fn test_read_header_lines() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n\r\nbody";
        let read = read_header_lines(&mut input, &Limits::default())
            .await
            .unwrap();

        assert_eq!(read, lines(&["GET / HTTP/1.1\r\n", "Host: x\r\n"]));
        assert_eq!(input, b"body");
    }

    #[tokio::test]
    async fn test_read_header_lines_truncated() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n";
        let err = read_header_lines(&mut input, &Limits::default())
            .await
            .unwrap_err();
        assert!(err.is_unexpected_eof());

        let mut input: &[u8] = b"GET / HTTP/1.1\r\nHos";
        let err = read_header_lines(&mut input, &Limits::default())
            .await
            .unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[tokio::test]
    async fn test_read_header_lines_too_large() {
        let limits = Limits {
            max_header_bytes: 32,
            ..Limits::default()
        };
        let mut input: &[u8] = b"GET / HTTP/1.1\r\nX-Long: aaaaaaaaaaaaaaaaaaaa\r\n\r\n";
        match read_header_lines(&mut input, &limits).await {
            Err(MessageError::HeaderTooLarge(32)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_split_start_line() {
        assert_eq!(
            split_start_line(b"HTTP/1.1 404 Not Found\r\n"),
            Some(("HTTP/1.1".to_string(), "404".to_string(), "Not Found".to_string()))
        );
        assert_eq!(split_start_line(b"GARBAGE\r\n"), None);
        assert_eq!(split_start_line(b"GET /\r\n"), None);
    }

    #[test]
    fn test_parse_header_map() {
        let map = parse_header_map(
            &lines(&[
                "GET / HTTP/1.1\r\n",
                "Host: example.com:8080\r\n",
                "no colon here\r\n",
                "X-Spaced:   a  b   \r\n",
                "HOST: other\r\n",
            ]),
            1,
        );

        assert_eq!(map.len(), 2);
        assert_eq!(map["host"], "other");
        assert_eq!(map["x-spaced"], "a  b");
    }

    #[test]
    fn test_parse_header_map_keeps_value_colons() {
        let map = parse_header_map(&lines(&["HTTP/1.1 200 OK\r\n", "Location: http://a:1/b\r\n"]), 1);
        assert_eq!(map["location"], "http://a:1/b");
    }

    #[test]
    fn test_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);

        headers.insert("content-length".to_string(), "12".to_string());
        assert_eq!(content_length(&headers), Some(12));

        headers.insert("content-length".to_string(), "twelve".to_string());
        assert_eq!(content_length(&headers), None);

        headers.insert("content-length".to_string(), "-1".to_string());
        assert_eq!(content_length(&headers), None);
    }

    #[test]
    fn test_is_chunked() {
        let mut headers = HeaderMap::new();
        assert!(!is_chunked(&headers));

        headers.insert("transfer-encoding".to_string(), "Chunked".to_string());
        assert!(is_chunked(&headers));

        headers.insert("transfer-encoding".to_string(), "gzip, chunked".to_string());
        assert!(is_chunked(&headers));

        headers.insert("transfer-encoding".to_string(), "chunked, gzip".to_string());
        assert!(!is_chunked(&headers));
    }

    #[tokio::test]
    async fn test_read_exact_body_leaves_rest() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length".to_string(), "5".to_string());

        let mut input: &[u8] = b"hello world";
        let body = read_exact_body(&mut input, &headers, &Limits::default())
            .await
            .unwrap();

        assert_eq!(&body[..], b"hello");
        assert_eq!(input, b" world");
    }

    #[tokio::test]
    async fn test_read_exact_body_early_close() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length".to_string(), "10".to_string());

        let mut input: &[u8] = b"short";
        let err = read_exact_body(&mut input, &headers, &Limits::default())
            .await
            .unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[tokio::test]
    async fn test_read_exact_body_declared_large_arrives_slowly() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-length".to_string(),
            DEFAULT_MAX_BODY_BYTES.to_string(),
        );

        // only a few bytes ever arrive for a maximal declared length
        let mock = tokio_test::io::Builder::new()
            .read(b"abc")
            .read(b"def")
            .build();
        let mut reader = tokio::io::BufReader::new(mock);
        let err = read_exact_body(&mut reader, &headers, &Limits::default())
            .await
            .unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[tokio::test]
    async fn test_read_exact_body_across_reads() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length".to_string(), "20000".to_string());

        let payload = vec![b'x'; 20000];
        let mock = tokio_test::io::Builder::new()
            .read(&payload[..7000])
            .read(&payload[7000..15000])
            .read(&payload[15000..])
            .build();
        let mut reader = tokio::io::BufReader::new(mock);
        let body = read_exact_body(&mut reader, &headers, &Limits::default())
            .await
            .unwrap();
        assert_eq!(body.len(), 20000);
        assert!(body.iter().all(|&b| b == b'x'));
    }

    #[tokio::test]
    async fn test_read_exact_body_without_length() {
        let mut headers = HeaderMap::new();
        let mut input: &[u8] = b"ignored";
        let body = read_exact_body(&mut input, &headers, &Limits::default())
            .await
            .unwrap();
        assert!(body.is_empty());

        headers.insert("content-length".to_string(), "abc".to_string());
        let body = read_exact_body(&mut input, &headers, &Limits::default())
            .await
            .unwrap();
        assert!(body.is_empty());
        assert_eq!(input, b"ignored");
    }

    #[tokio::test]
    async fn test_read_exact_body_too_large() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length".to_string(), "1024".to_string());
        let limits = Limits {
            max_body_bytes: 16,
            ..Limits::default()
        };

        let mut input: &[u8] = b"";
        match read_exact_body(&mut input, &headers, &limits).await {
            Err(MessageError::BodyTooLarge(1024)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reconstruct_raw_header_block() {
        let raw = lines(&["HTTP/1.1 200 OK\r\n", "X-B: 2\r\n", "x-a:1\r\n"]);
        let block = reconstruct_raw_header_block(&raw);
        assert_eq!(&block[..], b"HTTP/1.1 200 OK\r\nX-B: 2\r\nx-a:1\r\n\r\n");
    }
}
