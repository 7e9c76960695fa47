//! Splicing of the server connection.
//!
//! The TLS client runs over a [`CiphertextTap`], which forwards every byte to
//! the server unchanged and reports a copy to the session task. The plaintext
//! side of the TLS stream is bridged to the [`TlsConnection`] handed to the
//! application, reporting every plaintext chunk as well. Both kinds of events
//! share one bounded channel, so the session task sees them in the order they
//! happened.

use std::{
    io,
    pin::Pin,
    task::{ready, Context, Poll},
};

use tlsproof_core::transcript::Direction;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf},
    sync::mpsc,
};
use tokio_rustls::client::TlsStream;
use tokio_util::sync::PollSender;
use tracing::{debug, trace, warn};

use crate::ProverError;

/// Capacity of the event channel between the connection and the session task.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 32;
/// Size of the buffer between the application and the TLS stream.
pub(crate) const CONNECTION_BUFFER_SIZE: usize = 1 << 16;
/// Largest plaintext chunk read at once, the maximum TLS record size.
const MAX_CHUNK_LEN: usize = 1 << 14;

/// Data observed on the server connection.
#[derive(Debug)]
pub(crate) enum Event {
    /// Ciphertext as it was written to or read from the server.
    Ciphertext(Direction, Vec<u8>),
    /// Plaintext as it was written to or read from the TLS stream.
    Plaintext(Direction, Vec<u8>),
}

/// Wraps the socket to the server, reporting all ciphertext.
pub(crate) struct CiphertextTap<S> {
    inner: S,
    read_events: PollSender<Event>,
    write_events: PollSender<Event>,
}

impl<S> CiphertextTap<S> {
    pub(crate) fn new(inner: S, events: mpsc::Sender<Event>) -> Self {
        Self {
            inner,
            read_events: PollSender::new(events.clone()),
            write_events: PollSender::new(events),
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "session task stopped")
}

impl<S: AsyncRead + Unpin> AsyncRead for CiphertextTap<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // Reserve a slot first, so that no ciphertext is consumed which can not be
        // reported.
        ready!(this.read_events.poll_reserve(cx)).map_err(|_| closed_error())?;

        let filled = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let data = &buf.filled()[filled..];
                if data.is_empty() {
                    this.read_events.abort_send();
                } else {
                    this.read_events
                        .send_item(Event::Ciphertext(Direction::Received, data.to_vec()))
                        .map_err(|_| closed_error())?;
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(err)) => {
                this.read_events.abort_send();
                Poll::Ready(Err(err))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CiphertextTap<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        ready!(this.write_events.poll_reserve(cx)).map_err(|_| closed_error())?;

        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                if n == 0 {
                    this.write_events.abort_send();
                } else {
                    this.write_events
                        .send_item(Event::Ciphertext(Direction::Sent, buf[..n].to_vec()))
                        .map_err(|_| closed_error())?;
                }
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(err)) => {
                this.write_events.abort_send();
                Poll::Ready(Err(err))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Plaintext connection with the server, handed to the application.
///
/// The connection only makes progress while the corresponding
/// [`ProverFuture`](crate::ProverFuture) is polled.
#[derive(Debug)]
pub struct TlsConnection(DuplexStream);

impl TlsConnection {
    pub(crate) fn new(io: DuplexStream) -> Self {
        Self(io)
    }
}

impl AsyncRead for TlsConnection {
    #[inline]
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsConnection {
    #[inline]
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    #[inline]
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    #[inline]
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

/// Moves plaintext between the application and the TLS stream until the
/// server closes the connection.
pub(crate) async fn bridge<S>(
    tls: TlsStream<CiphertextTap<S>>,
    app: DuplexStream,
    events: mpsc::Sender<Event>,
) -> Result<(), ProverError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut tls_read, mut tls_write) = tokio::io::split(tls);
    let (mut app_read, mut app_write) = tokio::io::split(app);

    let upstream = async {
        let mut buf = vec![0u8; MAX_CHUNK_LEN];
        loop {
            let n = app_read.read(&mut buf).await.map_err(ProverError::connect)?;
            if n == 0 {
                debug!("application closed the connection");
                // Sends close_notify, the server may already be gone.
                if let Err(err) = tls_write.shutdown().await {
                    debug!("failed to close the connection: {err}");
                }
                return Ok::<_, ProverError>(());
            }

            report(&events, Direction::Sent, &buf[..n]).await?;

            tls_write
                .write_all(&buf[..n])
                .await
                .map_err(ProverError::connect)?;
            tls_write.flush().await.map_err(ProverError::connect)?;
        }
    };

    let downstream = async {
        let mut buf = vec![0u8; MAX_CHUNK_LEN];
        let mut app_open = true;
        loop {
            let n = match tls_read.read(&mut buf).await {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!("server closed the connection without close_notify");
                    0
                }
                Err(err) => return Err(ProverError::connect(err)),
            };

            if n == 0 {
                debug!("server closed the connection");
                if app_open {
                    if let Err(err) = app_write.shutdown().await {
                        trace!("failed to close application side: {err}");
                    }
                }
                return Ok::<_, ProverError>(());
            }

            report(&events, Direction::Received, &buf[..n]).await?;

            if app_open {
                if let Err(err) = app_write.write_all(&buf[..n]).await {
                    // The rest of the response is still committed to.
                    debug!("application stopped reading: {err}");
                    app_open = false;
                }
            }
        }
    };

    futures::pin_mut!(upstream, downstream);

    let server_closed = tokio::select! {
        res = &mut upstream => {
            res?;
            false
        }
        res = &mut downstream => {
            res?;
            true
        }
    };

    if !server_closed {
        downstream.await?;
    }

    Ok(())
}

async fn report(
    events: &mpsc::Sender<Event>,
    direction: Direction,
    data: &[u8],
) -> Result<(), ProverError> {
    events
        .send(Event::Plaintext(direction, data.to_vec()))
        .await
        .map_err(|_| ProverError::protocol("session task stopped"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tap_reports_ciphertext() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut tap = CiphertextTap::new(client, tx);

        tap.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        server.write_all(b"world").await.unwrap();
        let mut buf = [0u8; 5];
        tap.read_exact(&mut buf).await.unwrap();

        let Some(Event::Ciphertext(Direction::Sent, data)) = rx.recv().await else {
            panic!("expected sent ciphertext");
        };
        assert_eq!(data, b"hello");

        let mut received = Vec::new();
        while received.len() < 5 {
            let Some(Event::Ciphertext(Direction::Received, data)) = rx.recv().await else {
                panic!("expected received ciphertext");
            };
            received.extend(data);
        }
        assert_eq!(received, b"world");
    }

    #[tokio::test]
    async fn test_tap_fails_when_session_stopped() {
        let (client, _server) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut tap = CiphertextTap::new(client, tx);
        drop(rx);

        let err = tap.write_all(b"hello").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_tap_eof_is_not_reported() {
        let (client, server) = tokio::io::duplex(1024);
        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut tap = CiphertextTap::new(client, tx);
        drop(server);

        let mut buf = Vec::new();
        tap.read_to_end(&mut buf).await.unwrap();
        drop(tap);

        assert!(buf.is_empty());
        assert!(rx.recv().await.is_none());
    }
}
