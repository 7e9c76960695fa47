//! Protocol errors.

use serde::{Deserialize, Serialize};

use crate::config::ProtocolConfigError;

/// An error sent by the peer.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("peer error: {0}")]
pub struct PeerError(#[from] Repr);

impl PeerError {
    /// Creates an error for a server name which differs from the one observed
    /// in the handshake.
    pub fn server_name(reason: impl Into<String>) -> Self {
        PeerError(Repr::ServerName {
            reason: reason.into(),
        })
    }

    /// Creates an error for mirrored data which does not match.
    pub fn desync(reason: impl Into<String>) -> Self {
        PeerError(Repr::Desync {
            reason: reason.into(),
        })
    }

    /// Creates an error for a rejected attestation request.
    pub fn attestation(reason: impl Into<String>) -> Self {
        PeerError(Repr::Attestation {
            reason: reason.into(),
        })
    }

    /// Creates an error for a session exceeding the configured data limits.
    pub fn limit(reason: impl Into<String>) -> Self {
        PeerError(Repr::Limit {
            reason: reason.into(),
        })
    }

    /// Creates an error for an unexpected message.
    pub fn unexpected(reason: impl Into<String>) -> Self {
        PeerError(Repr::Unexpected {
            reason: reason.into(),
        })
    }

    /// Returns `true` if the peer detected a transcript desync.
    pub fn is_desync(&self) -> bool {
        matches!(self.0, Repr::Desync { .. })
    }

    /// Returns `true` if the peer rejected the server name.
    pub fn is_server_name(&self) -> bool {
        matches!(self.0, Repr::ServerName { .. })
    }

    /// Returns `true` if the peer rejected the protocol configuration.
    pub fn is_config(&self) -> bool {
        matches!(self.0, Repr::Config { .. })
    }
}

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
enum Repr {
    #[error("protocol configuration was rejected by the notary, reason: {reason}")]
    Config { reason: String },
    #[error("server name was rejected by the notary, reason: {reason}")]
    ServerName { reason: String },
    #[error("mirrored transcript diverged, reason: {reason}")]
    Desync { reason: String },
    #[error("attestation request was rejected by the notary, reason: {reason}")]
    Attestation { reason: String },
    #[error("session exceeded the data limits, reason: {reason}")]
    Limit { reason: String },
    #[error("unexpected message, reason: {reason}")]
    Unexpected { reason: String },
}

impl From<&ProtocolConfigError> for PeerError {
    fn from(value: &ProtocolConfigError) -> Self {
        PeerError(Repr::Config {
            reason: value.to_string(),
        })
    }
}
