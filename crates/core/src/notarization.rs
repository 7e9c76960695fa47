//! Notarized sessions kept for later disclosure.
//!
//! A [`Notarization`] holds a signed [`Attestation`] together with the
//! [`CommitmentSecrets`] of the commitments it attests to. Saving it allows
//! building further artifacts with other disclosure policies without running
//! a new session.
//!
//! The secrets open every committed byte of the transcript and must be kept
//! private.

use serde::{Deserialize, Serialize};

use crate::{
    artifact::{ProofArtifact, VerificationError, MAX_ARTIFACT_LEN},
    attestation::Attestation,
    commitment::CommitmentSecrets,
    disclosure::{DisclosureBuilder, DisclosureError, DisclosurePolicy},
};

/// Maximum size of an encoded notarization.
pub const MAX_NOTARIZATION_LEN: usize = MAX_ARTIFACT_LEN;

/// An attestation with the secrets of its commitments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notarization {
    /// Attestation signed by the Notary.
    pub attestation: Attestation,
    /// Secrets of the attested commitments.
    pub secrets: CommitmentSecrets,
}

impl Notarization {
    /// Creates a new notarization.
    pub fn new(attestation: Attestation, secrets: CommitmentSecrets) -> Self {
        Self {
            attestation,
            secrets,
        }
    }

    /// Encodes the notarization.
    pub fn serialize(&self) -> Vec<u8> {
        crate::serialize::CanonicalSerialize::serialize(self)
    }

    /// Decodes a notarization.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, VerificationError> {
        if bytes.len() > MAX_NOTARIZATION_LEN {
            return Err(VerificationError::malformed(format!(
                "notarization is {} bytes, the limit is {MAX_NOTARIZATION_LEN}",
                bytes.len()
            )));
        }

        bcs::from_bytes(bytes).map_err(VerificationError::malformed)
    }

    /// Builds an artifact disclosing the bytes of a policy.
    pub fn disclose(&self, policy: &DisclosurePolicy) -> Result<ProofArtifact, DisclosureError> {
        DisclosureBuilder::new(&self.attestation, &self.secrets).build(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fixtures::{
            attestation_fixture, notary_signing_key, AttestationFixture, REQUEST_RECORDS,
        },
        http::HttpTranscript,
        signing::SignatureAlgId,
        transcript::Direction,
        verify, CryptoProvider, VerificationErrorKind,
    };

    fn notarization() -> (Notarization, CryptoProvider) {
        let mut provider = CryptoProvider::default();
        provider.signer.set_secp256k1(&notary_signing_key()).unwrap();

        let AttestationFixture {
            attestation,
            secrets,
            ..
        } = attestation_fixture(&provider);

        (Notarization::new(attestation, secrets), provider)
    }

    #[test]
    fn test_saved_notarization_discloses_other_ranges() {
        let (notarization, provider) = notarization();
        let key = provider
            .signer
            .get(&SignatureAlgId::SECP256K1)
            .unwrap()
            .verifying_key();

        let saved = Notarization::deserialize(&notarization.serialize()).unwrap();
        assert_eq!(saved.attestation, notarization.attestation);

        // One record of the request.
        let mut record = DisclosurePolicy::new();
        record.disclose(Direction::Sent, 0..REQUEST_RECORDS[0].len());
        let artifact = saved.disclose(&record).unwrap();
        let proof = verify(&artifact.serialize(), &key, "www.example.com").unwrap();

        assert_eq!(proof.disclosed(Direction::Sent), REQUEST_RECORDS[0]);
        assert!(proof.disclosed(Direction::Received).is_empty());

        // The default HTTP policy, from the same notarization.
        let http = HttpTranscript::parse(saved.secrets.transcript()).unwrap();
        let artifact = saved.disclose(&DisclosurePolicy::from_http(&http)).unwrap();
        let proof = verify(&artifact.serialize(), &key, "www.example.com").unwrap();

        let received = String::from_utf8(proof.disclosed(Direction::Received)).unwrap();
        assert!(received.contains("<h1>Example Domain</h1>"));
        assert!(!received.contains("tracking=abc123"));
    }

    #[test]
    fn test_truncated_notarization() {
        let (notarization, _) = notarization();
        let bytes = notarization.serialize();

        let err = Notarization::deserialize(&bytes[..bytes.len() / 2]).unwrap_err();
        assert_eq!(err.kind(), VerificationErrorKind::MalformedArtifact);
    }

    #[test]
    fn test_out_of_range_policy() {
        let (notarization, _) = notarization();

        let mut policy = DisclosurePolicy::new();
        policy.disclose(Direction::Received, 0..1 << 20);

        let err = notarization.disclose(&policy).unwrap_err();
        assert!(err.is_policy_conflict());
    }
}
