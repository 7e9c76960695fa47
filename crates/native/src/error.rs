use std::{error::Error as StdError, fmt};

use notary_client::ClientError;
use tlsproof_core::{disclosure::DisclosureError, VerificationError, VerificationErrorKind};
use tlsproof_prover::{ErrorKind as ProverErrorKind, ProverError};

/// Kind of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connection with the server could not be established or failed.
    ConnectError,
    /// The Notary could not be reached or refused the session.
    NotaryUnreachable,
    /// The Notary's view of the ciphertext diverged from the Prover's.
    TranscriptDesync,
    /// The Notary misbehaved or rejected the session.
    ProtocolViolation,
    /// The attestation signature is invalid or made with another key.
    SignatureInvalid,
    /// Disclosed data does not match the signed commitments.
    CommitmentMismatch,
    /// The artifact could not be parsed.
    MalformedArtifact,
    /// The disclosure policy could not be satisfied.
    PolicyConflict,
    /// A step of the session took too long.
    Timeout,
    /// The artifact is valid but for another domain or request.
    IdentityMismatch,
    /// The caller's input was rejected before any connection was made.
    InvalidInput,
    /// The async runtime could not be started.
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConnectError => "connect error",
            ErrorKind::NotaryUnreachable => "notary unreachable",
            ErrorKind::TranscriptDesync => "transcript desync",
            ErrorKind::ProtocolViolation => "protocol violation",
            ErrorKind::SignatureInvalid => "signature invalid",
            ErrorKind::CommitmentMismatch => "commitment mismatch",
            ErrorKind::MalformedArtifact => "malformed artifact",
            ErrorKind::PolicyConflict => "policy conflict",
            ErrorKind::Timeout => "timeout",
            ErrorKind::IdentityMismatch => "identity mismatch",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Runtime => "runtime error",
        };

        f.write_str(name)
    }
}

/// Error returned by [`prove`](crate::prove).
#[derive(Debug, thiserror::Error)]
pub struct Error {
    kind: ErrorKind,
    retry_after: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    pub(crate) fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            kind,
            retry_after: None,
            source: Some(source.into()),
        }
    }

    pub(crate) fn invalid_input<E>(source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::InvalidInput, source)
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the number of seconds a Notary at capacity asked to wait
    /// before a new attempt.
    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {retry_after}s)")?;
        }

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl From<ProverError> for Error {
    fn from(err: ProverError) -> Self {
        let kind = match err.kind() {
            ProverErrorKind::Config => ErrorKind::InvalidInput,
            ProverErrorKind::Connect => ErrorKind::ConnectError,
            ProverErrorKind::NotaryUnreachable => ErrorKind::NotaryUnreachable,
            ProverErrorKind::TranscriptDesync => ErrorKind::TranscriptDesync,
            ProverErrorKind::ProtocolViolation => ErrorKind::ProtocolViolation,
            ProverErrorKind::PolicyConflict => ErrorKind::PolicyConflict,
            ProverErrorKind::Timeout => ErrorKind::Timeout,
        };

        let retry_after = find_client_error(&err).and_then(ClientError::retry_after);

        Self {
            kind,
            retry_after,
            source: Some(Box::new(err)),
        }
    }
}

impl From<VerificationError> for Error {
    fn from(err: VerificationError) -> Self {
        let kind = match err.kind() {
            VerificationErrorKind::MalformedArtifact => ErrorKind::MalformedArtifact,
            VerificationErrorKind::SignatureInvalid => ErrorKind::SignatureInvalid,
            VerificationErrorKind::CommitmentMismatch => ErrorKind::CommitmentMismatch,
            VerificationErrorKind::IdentityMismatch => ErrorKind::IdentityMismatch,
        };

        Self::new(kind, err)
    }
}

impl From<DisclosureError> for Error {
    fn from(err: DisclosureError) -> Self {
        let kind = if err.is_policy_conflict() {
            ErrorKind::PolicyConflict
        } else {
            ErrorKind::CommitmentMismatch
        };

        Self::new(kind, err)
    }
}

/// Finds a notary client error in the source chain.
fn find_client_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a ClientError> {
    let mut source = err.source();
    while let Some(err) = source {
        if let Some(client_err) = err.downcast_ref::<ClientError>() {
            return Some(client_err);
        }
        source = err.source();
    }

    None
}
