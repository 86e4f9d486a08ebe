//! Idle timeout for socket I/O.
//!
//! `IdleTimeout` wraps a stream and fails any single read or write that stays
//! pending for longer than the configured duration. Every blocking point of a
//! connection (header reads, body reads, writes, relays) goes through it, so a
//! stalled peer releases its task and sockets instead of holding them.

use pin_project_lite::pin_project;
use std::future::Future;
use std::io::{self, IoSlice};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Instant, Sleep};

/// Timer for one direction, armed when an operation first goes pending
#[derive(Default)]
struct Deadline {
    delay: Option<Pin<Box<Sleep>>>,
    armed: bool,
}

impl Deadline {
    fn poll_expired(&mut self, timeout: Duration, cx: &mut Context<'_>) -> bool {
        let delay = self
            .delay
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
        if !self.armed {
            delay.as_mut().reset(Instant::now() + timeout);
            self.armed = true;
        }
        if delay.as_mut().poll(cx).is_ready() {
            self.armed = false;
            return true;
        }
        false
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

fn timed_out(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} idle timeout", op))
}

pin_project! {
    /// Stream wrapper enforcing an idle timeout on reads and writes.
    pub struct IdleTimeout<S> {
        #[pin]
        inner: S,
        timeout: Option<Duration>,
        read: Deadline,
        write: Deadline,
    }
}

impl<S> IdleTimeout<S> {
    /// Wrap `inner`; `None` disables the timeout.
    pub fn new(inner: S, timeout: Option<Duration>) -> Self {
        IdleTimeout {
            inner,
            timeout,
            read: Deadline::default(),
            write: Deadline::default(),
        }
    }
}

impl<S: AsyncRead> AsyncRead for IdleTimeout<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        match this.inner.poll_read(cx, buf) {
            Poll::Ready(r) => {
                this.read.disarm();
                Poll::Ready(r)
            }
            Poll::Pending => match this.timeout {
                Some(timeout) if this.read.poll_expired(*timeout, cx) => {
                    Poll::Ready(Err(timed_out("read")))
                }
                _ => Poll::Pending,
            },
        }
    }
}

impl<S: AsyncWrite> IdleTimeout<S> {
    fn poll_write_op<T>(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        op: impl FnOnce(Pin<&mut S>, &mut Context<'_>) -> Poll<io::Result<T>>,
    ) -> Poll<io::Result<T>> {
        let this = self.project();
        match op(this.inner, &mut *cx) {
            Poll::Ready(r) => {
                this.write.disarm();
                Poll::Ready(r)
            }
            Poll::Pending => match this.timeout {
                Some(timeout) if this.write.poll_expired(*timeout, cx) => {
                    Poll::Ready(Err(timed_out("write")))
                }
                _ => Poll::Pending,
            },
        }
    }
}

impl<S: AsyncWrite> AsyncWrite for IdleTimeout<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.poll_write_op(cx, |inner, cx| inner.poll_write(cx, buf))
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.poll_write_op(cx, |inner, cx| inner.poll_write_vectored(cx, bufs))
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_write_op(cx, |inner, cx| inner.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_write_op(cx, |inner, cx| inner.poll_shutdown(cx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_read_times_out_when_peer_stalls() {
        let (client, _server) = tokio::io::duplex(64);
        let mut stream = IdleTimeout::new(client, Some(Duration::from_millis(50)));

        let mut buf = [0u8; 8];
        let err = stream.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_progress_keeps_stream_alive() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut stream = IdleTimeout::new(client, Some(Duration::from_millis(200)));

        tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                server.write_all(b"ab").await.unwrap();
            }
        });

        // total time exceeds the timeout but no single read does
        let mut buf = [0u8; 6];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ababab");
    }

    #[tokio::test]
    async fn test_write_times_out_when_peer_does_not_read() {
        let (client, _server) = tokio::io::duplex(4);
        let mut stream = IdleTimeout::new(client, Some(Duration::from_millis(50)));

        let err = stream.write_all(b"more than four bytes").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_disabled_timeout_never_fires() {
        let (client, _server) = tokio::io::duplex(64);
        let mut stream = IdleTimeout::new(client, None);

        let mut buf = [0u8; 8];
        let result =
            tokio::time::timeout(Duration::from_millis(100), stream.read(&mut buf)).await;
        assert!(result.is_err());
    }
}
