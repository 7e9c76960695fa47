use std::{error::Error, fmt};

use tlsproof_common::{channel::ChannelError, error::PeerError};
use tlsproof_core::session::{AbortReason, TransitionError};

/// Error for [`Prover`](crate::Prover).
#[derive(Debug, thiserror::Error)]
pub struct ProverError {
    kind: ErrorKind,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

/// Kind of a [`ProverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid local configuration or input.
    Config,
    /// The connection with the server could not be established or failed.
    Connect,
    /// The Notary could not be reached, or the connection with it was lost.
    NotaryUnreachable,
    /// The Notary's view of the ciphertext diverged from the Prover's.
    TranscriptDesync,
    /// The Notary misbehaved or rejected the session.
    ProtocolViolation,
    /// A disclosure policy could not be satisfied.
    PolicyConflict,
    /// A step of the session took too long.
    Timeout,
}

impl ProverError {
    fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    pub(crate) fn config<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::Config, source)
    }

    pub(crate) fn connect<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::Connect, source)
    }

    pub(crate) fn notary_unreachable<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::NotaryUnreachable, source)
    }

    pub(crate) fn desync<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::TranscriptDesync, source)
    }

    pub(crate) fn protocol<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::ProtocolViolation, source)
    }

    pub(crate) fn policy_conflict<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::PolicyConflict, source)
    }

    pub(crate) fn timeout<E>(source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::new(ErrorKind::Timeout, source)
    }

    /// Creates an error from a rejection sent by the Notary.
    pub(crate) fn rejected(err: PeerError) -> Self {
        if err.is_desync() {
            Self::desync(err)
        } else {
            Self::protocol(err)
        }
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason a session fails with this error.
    pub fn abort_reason(&self) -> AbortReason {
        match self.kind {
            ErrorKind::Config | ErrorKind::ProtocolViolation => AbortReason::ProtocolViolation,
            ErrorKind::Connect => AbortReason::ConnectError,
            ErrorKind::NotaryUnreachable => AbortReason::NotaryUnreachable,
            ErrorKind::TranscriptDesync => AbortReason::TranscriptDesync,
            ErrorKind::PolicyConflict => AbortReason::PolicyConflict,
            ErrorKind::Timeout => AbortReason::Timeout,
        }
    }
}

impl fmt::Display for ProverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("prover error: ")?;

        match self.kind {
            ErrorKind::Config => f.write_str("config error")?,
            ErrorKind::Connect => f.write_str("connect error")?,
            ErrorKind::NotaryUnreachable => f.write_str("notary unreachable")?,
            ErrorKind::TranscriptDesync => f.write_str("transcript desync")?,
            ErrorKind::ProtocolViolation => f.write_str("protocol violation")?,
            ErrorKind::PolicyConflict => f.write_str("policy conflict")?,
            ErrorKind::Timeout => f.write_str("timeout")?,
        }

        if let Some(source) = &self.source {
            write!(f, " caused by: {}", source)?;
        }

        Ok(())
    }
}

impl From<ChannelError> for ProverError {
    fn from(e: ChannelError) -> Self {
        if e.is_codec() {
            Self::protocol(e)
        } else {
            Self::notary_unreachable(e)
        }
    }
}

impl From<TransitionError> for ProverError {
    fn from(e: TransitionError) -> Self {
        Self::protocol(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case::config(ProverError::config("bad"), AbortReason::ProtocolViolation)]
    #[case::connect(ProverError::connect("refused"), AbortReason::ConnectError)]
    #[case::notary(ProverError::notary_unreachable("refused"), AbortReason::NotaryUnreachable)]
    #[case::desync(ProverError::desync("gap"), AbortReason::TranscriptDesync)]
    #[case::policy(ProverError::policy_conflict("range"), AbortReason::PolicyConflict)]
    #[case::timeout(ProverError::timeout("slow"), AbortReason::Timeout)]
    fn test_abort_reason(#[case] err: ProverError, #[case] reason: AbortReason) {
        assert_eq!(err.abort_reason(), reason);
    }

    #[test]
    fn test_rejection() {
        let err = ProverError::rejected(PeerError::desync("ciphertext summaries differ"));
        assert_eq!(err.kind(), ErrorKind::TranscriptDesync);

        let err = ProverError::rejected(PeerError::server_name("other.example.com"));
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
        assert!(err.to_string().starts_with("prover error: protocol violation caused by:"));
    }
}
