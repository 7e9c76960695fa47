//! Framed message channel.
//!
//! Messages are encoded with `bincode` and framed with a 32-bit length prefix.

use std::{error::Error, fmt};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Maximum length of a single frame.
pub const MAX_FRAME_LEN: usize = 1 << 24;

/// A bidirectional message channel over an IO object.
pub struct Channel<T> {
    inner: Framed<T, LengthDelimitedCodec>,
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

impl<T> Channel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new channel.
    pub fn new(io: T) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_LEN)
            .new_codec();

        Self {
            inner: Framed::new(io, codec),
        }
    }

    /// Sends a message.
    pub async fn send<M: Serialize>(&mut self, msg: &M) -> Result<(), ChannelError> {
        let bytes = bincode::serialize(msg).map_err(ChannelError::codec)?;
        self.inner
            .send(Bytes::from(bytes))
            .await
            .map_err(ChannelError::io)
    }

    /// Receives a message, failing if the peer closed the channel.
    pub async fn recv<M: DeserializeOwned>(&mut self) -> Result<M, ChannelError> {
        let frame = self
            .inner
            .next()
            .await
            .ok_or_else(ChannelError::closed)?
            .map_err(ChannelError::io)?;

        bincode::deserialize(&frame).map_err(ChannelError::codec)
    }

    /// Flushes and closes the channel.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        SinkExt::<Bytes>::close(&mut self.inner)
            .await
            .map_err(ChannelError::io)
    }
}

/// Error for [`Channel`].
#[derive(Debug, thiserror::Error)]
pub struct ChannelError {
    kind: ErrorKind,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
    Io,
    Codec,
    Closed,
}

impl ChannelError {
    fn io(err: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::Io,
            source: Some(Box::new(err)),
        }
    }

    fn codec(err: bincode::Error) -> Self {
        Self {
            kind: ErrorKind::Codec,
            source: Some(err),
        }
    }

    fn closed() -> Self {
        Self {
            kind: ErrorKind::Closed,
            source: None,
        }
    }

    /// Returns `true` if the peer closed the channel.
    pub fn is_closed(&self) -> bool {
        self.kind == ErrorKind::Closed
    }

    /// Returns `true` if a message could not be decoded.
    pub fn is_codec(&self) -> bool {
        self.kind == ErrorKind::Codec
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Io => f.write_str("channel io error")?,
            ErrorKind::Codec => f.write_str("channel codec error")?,
            ErrorKind::Closed => f.write_str("channel closed by peer")?,
        }

        if let Some(source) = &self.source {
            write!(f, " caused by: {}", source)?;
        }

        Ok(())
    }
}
