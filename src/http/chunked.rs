//! Pass-through relay of `Transfer-Encoding: chunked` bodies.
//!
//! The body bytes are written out exactly as received. Chunk sizes are only
//! decoded to find where the body ends, so the backend connection does not
//! have to close for the relay to finish.

use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::MessageError;
use super::wire::{line_text, read_line};

/// Longest chunk-size or trailer line accepted
const MAX_CHUNK_LINE: usize = 4096;

/// Decode the hex size of a chunk-size line, ignoring any extension.
pub fn parse_chunk_size(line: &[u8]) -> Result<u64, MessageError> {
    let text = line_text(line);
    let size = text.split(';').next().unwrap_or_default().trim();
    let parsed = if size.is_empty() || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
        None
    } else {
        u64::from_str_radix(size, 16).ok()
    };
    match parsed {
        Some(size) => Ok(size),
        None => Err(MessageError::InvalidChunkSize(text.into_owned())),
    }
}

/// Relay one chunked body from `reader` to `writer`.
///
/// Stops right after the blank line that closes the trailer section and
/// returns the number of bytes written.
pub async fn relay_chunked<R, W>(reader: &mut R, writer: &mut W) -> Result<u64, MessageError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(32);
    let mut total = 0u64;

    loop {
        line.clear();
        read_line(reader, &mut line, MAX_CHUNK_LINE).await?;
        let size = parse_chunk_size(&line)?;
        writer.write_all(&line).await?;
        total += line.len() as u64;

        if size == 0 {
            break;
        }

        let copied = tokio::io::copy(&mut (&mut *reader).take(size), &mut *writer).await?;
        total += copied;
        if copied < size {
            return Err(MessageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream closed inside a chunk",
            )));
        }

        line.clear();
        read_line(reader, &mut line, MAX_CHUNK_LINE).await?;
        if line != b"\r\n" {
            return Err(MessageError::InvalidChunkSize(line_text(&line).into_owned()));
        }
        writer.write_all(&line).await?;
        total += 2;
    }

    // trailers, closed by a blank line
    loop {
        line.clear();
        read_line(reader, &mut line, MAX_CHUNK_LINE).await?;
        writer.write_all(&line).await?;
        total += line.len() as u64;
        if line == b"\r\n" {
            break;
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_size() {
        assert_eq!(parse_chunk_size(b"1\r\n").unwrap(), 1);
        assert_eq!(parse_chunk_size(b"1F\r\n").unwrap(), 0x1f);
        assert_eq!(parse_chunk_size(b"a; ieof\r\n").unwrap(), 10);
        assert_eq!(parse_chunk_size(b"0\r\n").unwrap(), 0);
    }

    #[test]
    fn test_parse_chunk_size_invalid() {
        assert!(matches!(
            parse_chunk_size(b"zz\r\n"),
            Err(MessageError::InvalidChunkSize(_))
        ));
        assert!(matches!(
            parse_chunk_size(b"\r\n"),
            Err(MessageError::InvalidChunkSize(_))
        ));
        assert!(matches!(
            parse_chunk_size(b"+5\r\n"),
            Err(MessageError::InvalidChunkSize(_))
        ));
    }

    #[tokio::test]
    async fn test_relay_chunked_stops_at_last_chunk() {
        let body = b"5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\n\r\n";
        let mut input = Vec::new();
        input.extend_from_slice(body);
        input.extend_from_slice(b"NEXT");

        let mut reader: &[u8] = &input;
        let mut out: Vec<u8> = Vec::new();
        let n = relay_chunked(&mut reader, &mut out).await.unwrap();

        assert_eq!(out, body);
        assert_eq!(n, body.len() as u64);
        assert_eq!(reader, b"NEXT");
    }

    #[tokio::test]
    async fn test_relay_chunked_with_trailers() {
        let body = b"3\r\nabc\r\n0\r\nX-Checksum: 1\r\n\r\n";
        let mut reader: &[u8] = body;
        let mut out: Vec<u8> = Vec::new();
        relay_chunked(&mut reader, &mut out).await.unwrap();
        assert_eq!(out, body);
    }

    #[tokio::test]
    async fn test_relay_chunked_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"4\r")
            .read(b"\nwi")
            .read(b"ki\r\n")
            .read(b"0\r\n")
            .read(b"\r\n")
            .build();
        let mut reader = tokio::io::BufReader::new(mock);
        let mut out: Vec<u8> = Vec::new();

        relay_chunked(&mut reader, &mut out).await.unwrap();
        assert_eq!(out, b"4\r\nwiki\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn test_relay_chunked_truncated() {
        let mut reader: &[u8] = b"a\r\nabc";
        let mut out: Vec<u8> = Vec::new();
        let err = relay_chunked(&mut reader, &mut out).await.unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[tokio::test]
    async fn test_relay_chunked_missing_crlf() {
        let mut reader: &[u8] = b"3\r\nabcX\r\n0\r\n\r\n";
        let mut out: Vec<u8> = Vec::new();
        assert!(matches!(
            relay_chunked(&mut reader, &mut out).await,
            Err(MessageError::InvalidChunkSize(_))
        ));
    }
}
