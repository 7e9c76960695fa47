//! Prover states.

use tlsproof_common::{mirror::MirrorKey, IoChannel};
use tlsproof_core::{
    commitment::{CommitmentEngine, CommitmentSecrets},
    request::AttestationRequest,
};

/// Entry state
pub struct Initialized;

opaque_debug::implement!(Initialized);

/// State after the key exchange with the Notary.
pub struct Setup {
    pub(crate) channel: IoChannel,
    pub(crate) key: MirrorKey,
}

opaque_debug::implement!(Setup);

/// State after the TLS connection has been closed.
pub struct Closed {
    pub(crate) channel: IoChannel,
    pub(crate) engine: CommitmentEngine,
}

opaque_debug::implement!(Closed);

/// Notarizing state.
pub struct Notarize {
    pub(crate) channel: IoChannel,
    pub(crate) engine: CommitmentEngine,
}

opaque_debug::implement!(Notarize);

impl From<Closed> for Notarize {
    fn from(state: Closed) -> Self {
        Self {
            channel: state.channel,
            engine: state.engine,
        }
    }
}

/// State after the attestation request was sent.
pub struct AwaitSignature {
    pub(crate) channel: IoChannel,
    pub(crate) request: AttestationRequest,
    pub(crate) secrets: CommitmentSecrets,
}

opaque_debug::implement!(AwaitSignature);

#[allow(missing_docs)]
pub trait ProverState: sealed::Sealed {}

impl ProverState for Initialized {}
impl ProverState for Setup {}
impl ProverState for Closed {}
impl ProverState for Notarize {}
impl ProverState for AwaitSignature {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Initialized {}
    impl Sealed for super::Setup {}
    impl Sealed for super::Closed {}
    impl Sealed for super::Notarize {}
    impl Sealed for super::AwaitSignature {}
}
