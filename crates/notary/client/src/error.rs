//! Notary client errors.
//!
//! This module handles errors that might occur during connection setup and
//! notarization requests.

use derive_builder::UninitializedFieldError;
use std::{error::Error, fmt};

/// Kind of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ErrorKind {
    Internal,
    Builder,
    Connection,
    TlsSetup,
    Http,
    Configuration,
    /// The server is at capacity.
    Unavailable,
    Timeout,
}

/// Error for [`NotaryClient`](crate::NotaryClient).
#[derive(Debug, thiserror::Error)]
pub struct ClientError {
    kind: ErrorKind,
    retry_after: Option<u64>,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ClientError {
    pub(crate) fn new(kind: ErrorKind, source: Option<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            kind,
            retry_after: None,
            source,
        }
    }

    pub(crate) fn unavailable(retry_after: Option<u64>) -> Self {
        Self {
            kind: ErrorKind::Unavailable,
            retry_after,
            source: None,
        }
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the number of seconds the server asked to wait before a new
    /// request, if it is at capacity.
    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client error: {:?}", self.kind)?;

        if let Some(retry_after) = self.retry_after {
            write!(f, ", retry after {retry_after}s")?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl From<UninitializedFieldError> for ClientError {
    fn from(ufe: UninitializedFieldError) -> Self {
        ClientError::new(ErrorKind::Builder, Some(Box::new(ufe)))
    }
}
