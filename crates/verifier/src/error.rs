use std::{error::Error, fmt};

use tlsproof_common::{channel::ChannelError, config::ProtocolConfigError};

/// Error for [`Verifier`](crate::Verifier).
#[derive(Debug, thiserror::Error)]
pub struct VerifierError {
    kind: ErrorKind,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl VerifierError {
    fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    pub(crate) fn server_name<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::ServerName, source)
    }

    pub(crate) fn desync<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::Desync, source)
    }

    pub(crate) fn limit<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::Limit, source)
    }

    pub(crate) fn attestation<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::Attestation, source)
    }

    pub(crate) fn protocol<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::Protocol, source)
    }

    /// Returns `true` if the mirrored ciphertext did not match.
    pub fn is_desync(&self) -> bool {
        matches!(self.kind, ErrorKind::Desync)
    }

    /// Returns `true` if the observed server name was rejected.
    pub fn is_server_name(&self) -> bool {
        matches!(self.kind, ErrorKind::ServerName)
    }

    /// Returns `true` if the Prover's configuration was rejected.
    pub fn is_config(&self) -> bool {
        matches!(self.kind, ErrorKind::Config)
    }

    /// Returns `true` if the connection with the Prover failed.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Io)
    }
}

#[derive(Debug)]
enum ErrorKind {
    Io,
    Config,
    ServerName,
    Desync,
    Limit,
    Attestation,
    Protocol,
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("verifier error: ")?;

        match self.kind {
            ErrorKind::Io => f.write_str("io error")?,
            ErrorKind::Config => f.write_str("config error")?,
            ErrorKind::ServerName => f.write_str("server name error")?,
            ErrorKind::Desync => f.write_str("transcript desync")?,
            ErrorKind::Limit => f.write_str("data limit exceeded")?,
            ErrorKind::Attestation => f.write_str("attestation error")?,
            ErrorKind::Protocol => f.write_str("protocol error")?,
        }

        if let Some(source) = &self.source {
            write!(f, " caused by: {}", source)?;
        }

        Ok(())
    }
}

impl From<ChannelError> for VerifierError {
    fn from(e: ChannelError) -> Self {
        Self::new(ErrorKind::Io, e)
    }
}

impl From<ProtocolConfigError> for VerifierError {
    fn from(e: ProtocolConfigError) -> Self {
        Self::new(ErrorKind::Config, e)
    }
}
