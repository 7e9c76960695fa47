//! Core types for notarized TLS proofs.
//!
//! This crate contains the data model shared by the Prover, the Notary and
//! third-party verifiers: transcripts and their commitments, attestations
//! signed by the Notary, selective disclosure and the proof artifact format.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

pub mod artifact;
pub mod attestation;
pub mod commitment;
pub mod connection;
pub mod disclosure;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod hash;
pub mod http;
pub mod merkle;
pub mod notarization;
mod provider;
pub mod request;
mod serialize;
pub mod session;
pub mod signing;
pub mod transcript;

pub use artifact::{
    serialize, verify, verify_with_provider, verify_with_uri, ProofArtifact, VerificationError,
    VerificationErrorKind, VerifiedProof,
};
pub use notarization::Notarization;
pub use provider::CryptoProvider;
