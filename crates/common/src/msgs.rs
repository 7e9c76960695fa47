//! Messages exchanged between the Prover and the Notary.

use serde::{Deserialize, Serialize};

use tlsproof_core::{
    attestation::Attestation, connection::CiphertextSummary, request::AttestationRequest,
    transcript::Direction,
};

use crate::{config::ProtocolConfig, error::PeerError};

/// First message of a session, sent by the Prover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupRequest {
    /// Protocol configuration to be checked by the Notary.
    pub config: ProtocolConfig,
    /// Name of the server the Prover is going to connect to.
    pub server_name: String,
    /// The Prover's SEC1 encoded P-256 key share.
    pub key_share: Vec<u8>,
}

/// Notary's answer to a [`SetupRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SetupResponse {
    /// The session was accepted.
    Accepted {
        /// The Notary's SEC1 encoded P-256 key share.
        key_share: Vec<u8>,
    },
    /// The session was rejected.
    Rejected(PeerError),
}

/// A copy of ciphertext exchanged with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorFrame {
    /// Sequence number, starting at zero and shared by both directions.
    pub seq: u64,
    /// Direction of the ciphertext.
    pub direction: Direction,
    /// The ciphertext.
    pub data: Vec<u8>,
    /// Authentication tag under the mirror key.
    pub tag: [u8; 32],
}

/// Acknowledgment of a [`MirrorFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorAck {
    /// Sequence number of the acknowledged frame.
    pub seq: u64,
}

/// Sent by the Prover once the connection with the server is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorClose {
    /// Number of frames sent.
    pub frames: u64,
    /// The Prover's summary of the ciphertext.
    pub summary: CiphertextSummary,
}

/// Messages sent by the Prover after setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::large_enum_variant)]
pub enum ProverMessage {
    /// Mirrored ciphertext.
    Frame(MirrorFrame),
    /// End of the mirrored session.
    Close(MirrorClose),
    /// Request for an attestation.
    Request(AttestationRequest),
}

/// Messages sent by the Notary after setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::large_enum_variant)]
pub enum NotaryMessage {
    /// Acknowledgment of a mirrored frame.
    Ack(MirrorAck),
    /// The Notary's summary of the ciphertext it observed.
    Summary(CiphertextSummary),
    /// The signed attestation.
    Attestation(Attestation),
    /// The Notary aborted the session.
    Rejection(PeerError),
}
