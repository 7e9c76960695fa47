//! Attestation requests.
//!
//! After the TLS connection closes and the Notary has confirmed it observed
//! the same ciphertext, the Prover requests an attestation. The request
//! carries the Prover's aggregate transcript commitment along with the
//! algorithms the Notary should use.
//!
//! An [`AttestationRequest`] can be created using a [`RequestBuilder`].

mod builder;
mod config;

use serde::{Deserialize, Serialize};

use crate::{
    attestation::Attestation,
    commitment::TranscriptCommitment,
    connection::{ServerName, TranscriptLength},
    hash::HashAlgId,
    signing::SignatureAlgId,
};

pub use builder::{RequestBuilder, RequestBuilderError};
pub use config::{RequestConfig, RequestConfigBuilder, RequestConfigBuilderError};

/// Attestation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    pub(crate) signature_alg: SignatureAlgId,
    pub(crate) hash_alg: HashAlgId,
    pub(crate) server_name: ServerName,
    pub(crate) transcript_length: TranscriptLength,
    pub(crate) transcript_commitment: TranscriptCommitment,
}

impl AttestationRequest {
    /// Returns a new request builder.
    pub fn builder(config: &RequestConfig) -> RequestBuilder<'_> {
        RequestBuilder::new(config)
    }

    /// Returns the server name the attestation is requested for.
    pub fn server_name(&self) -> &ServerName {
        &self.server_name
    }

    /// Returns the plaintext transcript length.
    pub fn transcript_length(&self) -> TranscriptLength {
        self.transcript_length
    }

    /// Returns the aggregate transcript commitment.
    pub fn transcript_commitment(&self) -> &TranscriptCommitment {
        &self.transcript_commitment
    }

    /// Validates the content of the attestation against this request.
    pub fn validate(&self, attestation: &Attestation) -> Result<(), InconsistentAttestation> {
        if attestation.signature.alg != self.signature_alg {
            return Err(InconsistentAttestation(format!(
                "signature algorithm: expected {:?}, got {:?}",
                self.signature_alg, attestation.signature.alg
            )));
        }

        if attestation.header.root.alg != self.hash_alg {
            return Err(InconsistentAttestation(format!(
                "hash algorithm: expected {:?}, got {:?}",
                self.hash_alg, attestation.header.root.alg
            )));
        }

        if attestation.body.server_name() != &self.server_name {
            return Err(InconsistentAttestation(
                "server name does not match".to_string(),
            ));
        }

        if attestation.body.connection_info().transcript_length != self.transcript_length {
            return Err(InconsistentAttestation(
                "transcript length does not match".to_string(),
            ));
        }

        if attestation.body.transcript_commitment() != &self.transcript_commitment {
            return Err(InconsistentAttestation(
                "transcript commitment does not match".to_string(),
            ));
        }

        Ok(())
    }
}

/// Error for [`AttestationRequest::validate`].
#[derive(Debug, thiserror::Error)]
#[error("inconsistent attestation: {0}")]
pub struct InconsistentAttestation(String);

#[cfg(test)]
mod test {
    use super::*;

    use crate::{
        attestation::Uid,
        fixtures::{
            attestation_fixture, notary_signing_key, request_fixture, AttestationFixture,
            RequestFixture,
        },
        hash::TypedHash,
        CryptoProvider,
    };

    fn provider() -> CryptoProvider {
        let mut provider = CryptoProvider::default();
        provider.signer.set_secp256k1(&notary_signing_key()).unwrap();
        provider
    }

    #[test]
    fn test_success() {
        let provider = provider();
        let AttestationFixture {
            request,
            attestation,
            ..
        } = attestation_fixture(&provider);

        assert!(request.validate(&attestation).is_ok());
    }

    #[test]
    fn test_wrong_signature_alg() {
        let provider = provider();
        let AttestationFixture {
            mut request,
            attestation,
            ..
        } = attestation_fixture(&provider);

        request.signature_alg = SignatureAlgId::SECP256R1;

        assert!(request.validate(&attestation).is_err());
    }

    #[test]
    fn test_wrong_commitment() {
        let provider = provider();
        let AttestationFixture {
            mut request,
            attestation,
            ..
        } = attestation_fixture(&provider);

        request.transcript_commitment.root = TypedHash {
            alg: request.hash_alg,
            value: Default::default(),
        };

        assert!(request.validate(&attestation).is_err());
    }

    #[test]
    fn test_wrong_server_name() {
        let provider = provider();
        let AttestationFixture {
            mut request,
            attestation,
            ..
        } = attestation_fixture(&provider);

        request.server_name = ServerName::try_from("other.org").unwrap();

        assert!(request.validate(&attestation).is_err());
    }

    #[test]
    fn test_header_id_is_not_validated() {
        let provider = provider();
        let AttestationFixture {
            request,
            mut attestation,
            ..
        } = attestation_fixture(&provider);

        attestation.header.id = Uid([1; 16]);

        assert!(request.validate(&attestation).is_ok());
    }

    #[test]
    fn test_builder_rejects_mismatched_hash_alg() {
        let RequestFixture { request, .. } = request_fixture();

        let config = RequestConfig::builder()
            .hash_alg(HashAlgId::SHA256)
            .build()
            .unwrap();

        let mut builder = AttestationRequest::builder(&config);
        builder
            .server_name(request.server_name)
            .transcript_length(request.transcript_length)
            .transcript_commitment(request.transcript_commitment);

        assert!(builder.build().is_err());
    }
}
