//! Verifier states.

use tlsproof_common::{config::ProtocolConfig, mirror::MirrorKey, IoChannel};
use tlsproof_core::connection::{CiphertextSummary, ServerName};

/// Verifier state.
pub trait VerifierState: sealed::Sealed {}

/// Initialized state.
pub struct Initialized;

opaque_debug::implement!(Initialized);

/// State after the key exchange with the Prover.
pub struct Setup {
    pub(crate) channel: IoChannel,
    pub(crate) key: MirrorKey,
    pub(crate) protocol_config: ProtocolConfig,
    pub(crate) server_name: ServerName,
    pub(crate) start_time: u64,
}

opaque_debug::implement!(Setup);

/// State after the Prover closed the connection with the server.
pub struct Closed {
    pub(crate) channel: IoChannel,
    pub(crate) server_name: ServerName,
    pub(crate) start_time: u64,
    pub(crate) summary: CiphertextSummary,
}

opaque_debug::implement!(Closed);

impl VerifierState for Initialized {}
impl VerifierState for Setup {}
impl VerifierState for Closed {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Initialized {}
    impl Sealed for super::Setup {}
    impl Sealed for super::Closed {}
}
