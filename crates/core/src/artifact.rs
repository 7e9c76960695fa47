//! Proof artifacts.
//!
//! A [`ProofArtifact`] bundles a signed [`Attestation`] with openings of the
//! disclosed transcript commitments and a Merkle multi-proof tying them to the
//! signed aggregate. It is the only structure persisted by this crate.
//!
//! Artifacts are encoded with `bcs`, which is canonical, so [`serialize`] is
//! deterministic.
//!
//! [`verify`] checks an encoded artifact in the following order:
//!
//! 1. The bytes parse as an artifact of a supported version.
//! 2. The attestation header is signed by the trusted Notary key, and the body
//!    was issued under that key.
//! 3. The body fields hash to the signed root.
//! 4. Every opening hashes to a leaf which the multi-proof places under the
//!    signed aggregate.
//! 5. Overlapping openings agree and fit the attested transcript length.
//! 6. The attested server name is the expected domain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    attestation::{Attestation, AttestationErrorKind},
    connection::{DnsName, ServerName},
    merkle::MerkleProof,
    signing::VerifyingKey,
    transcript::{Direction, PartialTranscript, PlaintextHashOpening},
    CryptoProvider,
};

/// Current artifact version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Maximum size of an encoded artifact.
pub const MAX_ARTIFACT_LEN: usize = 1 << 24;

/// Maximum number of leaves in a commitment tree.
const MAX_TREE_LEN: usize = 1 << 20;

/// A notarized proof of a TLS session with selectively disclosed transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofArtifact {
    /// Artifact version.
    pub version: u32,
    /// Attestation signed by the Notary.
    pub attestation: Attestation,
    /// Openings of the disclosed commitments.
    pub openings: Vec<PlaintextHashOpening>,
    /// Inclusion proof of the opened commitments, absent if nothing is
    /// disclosed.
    pub commitment_proof: Option<MerkleProof>,
}

impl ProofArtifact {
    /// Encodes the artifact.
    pub fn serialize(&self) -> Vec<u8> {
        crate::serialize::CanonicalSerialize::serialize(self)
    }

    /// Decodes an artifact.
    ///
    /// Rejects oversized input, trailing bytes and unsupported versions.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, VerificationError> {
        if bytes.len() > MAX_ARTIFACT_LEN {
            return Err(VerificationError::malformed(format!(
                "artifact is {} bytes, the limit is {MAX_ARTIFACT_LEN}",
                bytes.len()
            )));
        }

        let artifact: ProofArtifact =
            bcs::from_bytes(bytes).map_err(VerificationError::malformed)?;

        if artifact.version != ARTIFACT_VERSION {
            return Err(VerificationError::malformed(format!(
                "unsupported artifact version: {}",
                artifact.version
            )));
        }

        if let Some(proof) = &artifact.commitment_proof {
            if proof.tree_len() > MAX_TREE_LEN {
                return Err(VerificationError::malformed("commitment tree is too large"));
            }
        }

        if artifact.openings.len() > MAX_TREE_LEN {
            return Err(VerificationError::malformed("too many openings"));
        }

        Ok(artifact)
    }

    /// Verifies the artifact against a trusted Notary key and the expected
    /// server domain.
    pub fn verify(
        self,
        provider: &CryptoProvider,
        notary_key: &VerifyingKey,
        expected_domain: &str,
    ) -> Result<VerifiedProof, VerificationError> {
        let ProofArtifact {
            attestation,
            openings,
            commitment_proof,
            ..
        } = self;

        attestation
            .verify(provider, notary_key)
            .map_err(|err| match err.kind() {
                AttestationErrorKind::Signature => VerificationError::signature(err),
                AttestationErrorKind::Body => VerificationError::commitment(err),
            })?;

        let body = &attestation.body;
        let commitment = body.transcript_commitment();
        let length = body.connection_info().transcript_length;

        let hasher = provider
            .hash
            .get(&commitment.root.alg)
            .map_err(VerificationError::malformed)?;

        let mut transcript =
            PartialTranscript::new(length.sent as usize, length.received as usize);

        match (openings.is_empty(), commitment_proof) {
            (true, _) => {}
            (false, None) => {
                return Err(VerificationError::commitment(
                    "openings are missing an inclusion proof",
                ))
            }
            (false, Some(proof)) => {
                if proof.tree_len() != commitment.leaf_count as usize {
                    return Err(VerificationError::commitment(
                        "inclusion proof is for a tree of a different size",
                    ));
                }

                let mut leaves = Vec::with_capacity(openings.len());
                let mut subsequences = Vec::with_capacity(openings.len());
                for opening in openings {
                    let (idx, leaf, direction, seq) =
                        opening.open(hasher).map_err(VerificationError::commitment)?;
                    leaves.push((idx, leaf));
                    subsequences.push((direction, seq));
                }

                proof
                    .verify(hasher, &commitment.root, leaves)
                    .map_err(VerificationError::commitment)?;

                for (direction, seq) in &subsequences {
                    transcript
                        .union_subsequence(*direction, seq)
                        .map_err(VerificationError::commitment)?;
                }
            }
        }

        let expected = DnsName::try_from(expected_domain).map_err(VerificationError::identity)?;
        let ServerName::Dns(name) = body.server_name();
        if *name != expected {
            return Err(VerificationError::identity(format!(
                "artifact is for {name}, expected {expected}"
            )));
        }

        Ok(VerifiedProof {
            server_name: body.server_name().clone(),
            time: body.connection_info().time,
            transcript,
            notary_key: body.verifying_key().clone(),
        })
    }
}

/// Encodes an artifact.
pub fn serialize(artifact: &ProofArtifact) -> Vec<u8> {
    artifact.serialize()
}

/// Verifies an encoded artifact with the default crypto provider.
pub fn verify(
    bytes: &[u8],
    notary_key: &VerifyingKey,
    expected_domain: &str,
) -> Result<VerifiedProof, VerificationError> {
    verify_with_provider(&CryptoProvider::default(), bytes, notary_key, expected_domain)
}

/// Verifies an encoded artifact.
pub fn verify_with_provider(
    provider: &CryptoProvider,
    bytes: &[u8],
    notary_key: &VerifyingKey,
    expected_domain: &str,
) -> Result<VerifiedProof, VerificationError> {
    ProofArtifact::deserialize(bytes)?.verify(provider, notary_key, expected_domain)
}

/// Verifies an encoded artifact, additionally checking that the first
/// disclosed request targets `expected_uri`.
pub fn verify_with_uri(
    bytes: &[u8],
    notary_key: &VerifyingKey,
    expected_domain: &str,
    expected_uri: &str,
) -> Result<VerifiedProof, VerificationError> {
    let proof = verify(bytes, notary_key, expected_domain)?;
    let target = proof.request_target().ok_or_else(|| {
        VerificationError::identity("request line is not disclosed")
    })?;

    if target != expected_uri {
        return Err(VerificationError::identity(format!(
            "request targets {target}, expected {expected_uri}"
        )));
    }

    Ok(proof)
}

/// The outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedProof {
    /// The server the Prover was connected to.
    pub server_name: ServerName,
    /// UNIX time at which the connection started.
    pub time: u64,
    /// The disclosed transcript. Redacted bytes are `0x00`.
    pub transcript: PartialTranscript,
    /// Key of the Notary which signed the attestation.
    pub notary_key: VerifyingKey,
}

impl VerifiedProof {
    /// Returns the target of the first request, if its request line is
    /// disclosed.
    pub fn request_target(&self) -> Option<String> {
        let sent = self.transcript.sent_unsafe();
        let end = sent.windows(2).position(|w| w == b"\r\n")?;

        if !self.transcript.sent_authed().contains_range(&(0..end)) {
            return None;
        }

        let line = std::str::from_utf8(&sent[..end]).ok()?;
        let mut parts = line.split(' ');
        let (_method, target, _version) = (parts.next()?, parts.next()?, parts.next()?);

        Some(target.to_string())
    }

    /// Returns the disclosed bytes of a direction, concatenated in order.
    pub fn disclosed(&self, direction: Direction) -> Vec<u8> {
        self.transcript.authed_bytes(direction)
    }
}

/// Kind of [`VerificationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationErrorKind {
    /// The bytes are not a valid artifact.
    MalformedArtifact,
    /// The Notary signature is invalid, or made with a different key.
    SignatureInvalid,
    /// The disclosed data does not match the signed commitments.
    CommitmentMismatch,
    /// The artifact is valid but for a different domain or request.
    IdentityMismatch,
}

impl fmt::Display for VerificationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedArtifact => f.write_str("malformed artifact"),
            Self::SignatureInvalid => f.write_str("signature invalid"),
            Self::CommitmentMismatch => f.write_str("commitment mismatch"),
            Self::IdentityMismatch => f.write_str("identity mismatch"),
        }
    }
}

/// Error for artifact verification.
#[derive(Debug, thiserror::Error)]
pub struct VerificationError {
    kind: VerificationErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl VerificationError {
    fn new<E>(kind: VerificationErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    pub(crate) fn malformed<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(VerificationErrorKind::MalformedArtifact, source)
    }

    fn signature<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(VerificationErrorKind::SignatureInvalid, source)
    }

    fn commitment<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(VerificationErrorKind::CommitmentMismatch, source)
    }

    fn identity<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(VerificationErrorKind::IdentityMismatch, source)
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> VerificationErrorKind {
        self.kind
    }
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verification error: {}", self.kind)?;

        if let Some(source) = &self.source {
            write!(f, " caused by: {source}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disclosure::{DisclosureBuilder, DisclosurePolicy},
        fixtures::{attestation_fixture, notary_signing_key, AttestationFixture},
        hash::{Blinded, HashAlgId, TypedHash},
        http::HttpTranscript,
        serialize::CanonicalSerialize,
        signing::SignatureAlgId,
    };
    use rstest::*;

    const DOMAIN: &str = "www.example.com";

    struct Setup {
        provider: CryptoProvider,
        key: VerifyingKey,
        artifact: ProofArtifact,
    }

    #[fixture]
    fn setup() -> Setup {
        let mut provider = CryptoProvider::default();
        provider.signer.set_secp256k1(&notary_signing_key()).unwrap();
        let key = provider
            .signer
            .get(&SignatureAlgId::SECP256K1)
            .unwrap()
            .verifying_key();

        let AttestationFixture {
            attestation,
            secrets,
            ..
        } = attestation_fixture(&provider);
        let http = HttpTranscript::parse(secrets.transcript()).unwrap();
        let artifact = DisclosureBuilder::new(&attestation, &secrets)
            .build(&DisclosurePolicy::from_http(&http))
            .unwrap();

        Setup {
            provider,
            key,
            artifact,
        }
    }

    fn kind(result: Result<VerifiedProof, VerificationError>) -> VerificationErrorKind {
        result.unwrap_err().kind()
    }

    #[rstest]
    fn test_round_trip(setup: Setup) {
        let bytes = serialize(&setup.artifact);
        let proof = verify(&bytes, &setup.key, DOMAIN).unwrap();

        assert_eq!(proof.server_name.as_str(), DOMAIN);
        assert_eq!(proof.request_target().as_deref(), Some("/"));
        assert!(String::from_utf8(proof.disclosed(Direction::Received))
            .unwrap()
            .contains("<h1>Example Domain</h1>"));
        assert!(!proof.transcript.is_complete());
    }

    #[rstest]
    fn test_serialize_is_deterministic(setup: Setup) {
        assert_eq!(serialize(&setup.artifact), serialize(&setup.artifact.clone()));
    }

    #[rstest]
    fn test_domain_is_case_insensitive(setup: Setup) {
        let bytes = serialize(&setup.artifact);
        assert!(verify(&bytes, &setup.key, "WWW.EXAMPLE.COM").is_ok());
    }

    #[rstest]
    fn test_wrong_key(setup: Setup) {
        let mut other = CryptoProvider::default();
        other.signer.set_secp256k1(&[9u8; 32]).unwrap();
        let key = other
            .signer
            .get(&SignatureAlgId::SECP256K1)
            .unwrap()
            .verifying_key();

        let bytes = serialize(&setup.artifact);
        assert_eq!(
            kind(verify(&bytes, &key, DOMAIN)),
            VerificationErrorKind::SignatureInvalid
        );
    }

    #[rstest]
    fn test_wrong_domain(setup: Setup) {
        let bytes = serialize(&setup.artifact);
        assert_eq!(
            kind(verify(&bytes, &setup.key, "example.org")),
            VerificationErrorKind::IdentityMismatch
        );
    }

    #[rstest]
    fn test_wrong_uri(setup: Setup) {
        let bytes = serialize(&setup.artifact);
        assert!(verify_with_uri(&bytes, &setup.key, DOMAIN, "/").is_ok());
        assert_eq!(
            kind(verify_with_uri(&bytes, &setup.key, DOMAIN, "/admin")),
            VerificationErrorKind::IdentityMismatch
        );
    }

    #[rstest]
    fn test_modified_disclosed_byte(setup: Setup) {
        for i in 0..setup.artifact.openings.len() {
            let len = setup.artifact.openings[i].data().len();

            for j in [0, len / 2, len - 1] {
                let mut artifact = setup.artifact.clone();
                let opening = &mut artifact.openings[i];
                let mut data = opening.data().to_vec();
                data[j] ^= 0x01;
                opening.data = Blinded::new_with_blinder(data, *opening.data.blinder());

                assert_eq!(
                    kind(verify_with_provider(
                        &setup.provider,
                        &serialize(&artifact),
                        &setup.key,
                        DOMAIN
                    )),
                    VerificationErrorKind::CommitmentMismatch
                );
            }
        }
    }

    #[rstest]
    fn test_moved_opening(setup: Setup) {
        let mut artifact = setup.artifact;
        let range = artifact.openings[0].range.clone();
        artifact.openings[0].range = range.start + 1..range.end + 1;

        assert_eq!(
            kind(verify(&serialize(&artifact), &setup.key, DOMAIN)),
            VerificationErrorKind::CommitmentMismatch
        );
    }

    #[rstest]
    fn test_dropped_proof(setup: Setup) {
        let mut artifact = setup.artifact;
        artifact.commitment_proof = None;

        assert_eq!(
            kind(verify(&serialize(&artifact), &setup.key, DOMAIN)),
            VerificationErrorKind::CommitmentMismatch
        );
    }

    #[rstest]
    fn test_modified_commitment(setup: Setup) {
        let mut artifact = setup.artifact;
        let commitment = *artifact.attestation.body.transcript_commitment();

        // The body ends with the commitment root followed by the 4 byte leaf
        // count, so this flips a byte of the root.
        let mut body = CanonicalSerialize::serialize(&artifact.attestation.body);
        let n = body.len();
        body[n - 8] ^= 0xff;
        artifact.attestation.body = bcs::from_bytes(&body).unwrap();
        assert_ne!(artifact.attestation.body.transcript_commitment(), &commitment);

        assert_eq!(
            kind(verify(&serialize(&artifact), &setup.key, DOMAIN)),
            VerificationErrorKind::CommitmentMismatch
        );
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::garbage(vec![0xde, 0xad, 0xbe, 0xef])]
    #[case::zeros(vec![0; 64])]
    fn test_malformed(setup: Setup, #[case] bytes: Vec<u8>) {
        assert_eq!(
            kind(verify(&bytes, &setup.key, DOMAIN)),
            VerificationErrorKind::MalformedArtifact
        );
    }

    #[rstest]
    fn test_trailing_bytes(setup: Setup) {
        let mut bytes = serialize(&setup.artifact);
        bytes.push(0);

        assert_eq!(
            kind(verify(&bytes, &setup.key, DOMAIN)),
            VerificationErrorKind::MalformedArtifact
        );
    }

    #[rstest]
    fn test_truncated(setup: Setup) {
        let bytes = serialize(&setup.artifact);

        for len in [1, bytes.len() / 2, bytes.len() - 1] {
            assert_eq!(
                kind(verify(&bytes[..len], &setup.key, DOMAIN)),
                VerificationErrorKind::MalformedArtifact
            );
        }
    }

    #[rstest]
    fn test_unsupported_version(setup: Setup) {
        let mut artifact = setup.artifact;
        artifact.version = 99;

        assert_eq!(
            kind(verify(&serialize(&artifact), &setup.key, DOMAIN)),
            VerificationErrorKind::MalformedArtifact
        );
    }

    #[rstest]
    fn test_unknown_hash_alg(setup: Setup) {
        let mut artifact = setup.artifact;
        artifact.attestation.header.root = TypedHash {
            alg: HashAlgId::new(200),
            value: artifact.attestation.header.root.value,
        };

        // The header is signed, so tampering is caught by the signature first.
        assert_eq!(
            kind(verify(&serialize(&artifact), &setup.key, DOMAIN)),
            VerificationErrorKind::SignatureInvalid
        );
    }
}
