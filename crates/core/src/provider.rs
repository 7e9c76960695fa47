use crate::{
    hash::HashProvider,
    signing::{SignatureVerifierProvider, SignerProvider},
};

/// Cryptography provider.
///
/// ## Custom Algorithms
///
/// This is the primary interface for extending cryptographic functionality. The
/// various providers can be configured with custom algorithms and
/// implementations.
///
/// Algorithms are uniquely identified using an 8-bit ID, eg.
/// [`HashAlgId`](crate::hash::HashAlgId), half of which is reserved for the
/// built-in algorithms. Other parties may assign different algorithms to the
/// same custom ID.
#[derive(Default)]
pub struct CryptoProvider {
    /// Hash provider.
    pub hash: HashProvider,
    /// Signer provider.
    ///
    /// This is used by the Notary for signing attestations.
    pub signer: SignerProvider,
    /// Signature verifier provider.
    ///
    /// This is used for verifying signatures of attestations.
    pub signature: SignatureVerifierProvider,
}

opaque_debug::implement!(CryptoProvider);
