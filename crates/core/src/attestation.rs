//! Attestation types.
//!
//! An attestation is a cryptographically signed document issued by a Notary who
//! co-observed a TLS connection. It contains fields which can be used to verify
//! statements about the connection and the associated application data.
//!
//! Attestations are comprised of two parts: a [`Header`] and a [`Body`].
//!
//! The header is the data structure which is signed by a Notary. It contains a
//! unique identifier, the protocol version, and a Merkle root of the body
//! fields.
//!
//! The body contains the fields of the attestation: the Notary's verifying
//! key, connection information, the server name, a summary of the ciphertext
//! the Notary observed, and the Prover's aggregate transcript commitment.

mod builder;
mod config;

use std::fmt;

use rand::distr::{Distribution, StandardUniform};
use serde::{Deserialize, Serialize};

use crate::{
    commitment::TranscriptCommitment,
    connection::{CiphertextSummary, ConnectionInfo, ServerName},
    hash::{impl_domain_separator, Hash, HashAlgorithm, HashAlgorithmExt, TypedHash},
    merkle::MerkleTree,
    serialize::CanonicalSerialize,
    signing::{Signature, VerifyingKey},
    CryptoProvider,
};

pub use builder::{Accept, AttestationBuilder, AttestationBuilderError, Sign};
pub use config::{AttestationConfig, AttestationConfigBuilder, AttestationConfigError};

/// Current version of attestations.
pub const VERSION: Version = Version(0);

/// Unique identifier for an attestation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(pub [u8; 16]);

impl From<[u8; 16]> for Uid {
    fn from(id: [u8; 16]) -> Self {
        Self(id)
    }
}

impl Distribution<Uid> for StandardUniform {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Uid {
        Uid(self.sample(rng))
    }
}

/// Version of an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(u32);

impl_domain_separator!(Version);

/// Public attestation field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field<T> {
    /// Identifier of the field.
    pub id: FieldId,
    /// Field data.
    pub data: T,
}

/// Identifier for a field.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FieldId(pub u32);

impl FieldId {
    pub(crate) fn next<T>(&mut self, data: T) -> Field<T> {
        let id = *self;
        self.0 += 1;

        Field { id, data }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attestation header.
///
/// See [module level documentation](crate::attestation) for more information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// An identifier for the attestation.
    pub id: Uid,
    /// Version of the attestation.
    pub version: Version,
    /// Merkle root of the attestation fields.
    pub root: TypedHash,
}

impl_domain_separator!(Header);

/// Attestation body.
///
/// See [module level documentation](crate::attestation) for more information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    verifying_key: Field<VerifyingKey>,
    connection_info: Field<ConnectionInfo>,
    server_name: Field<ServerName>,
    ciphertext_summary: Field<CiphertextSummary>,
    transcript_commitment: Field<TranscriptCommitment>,
}

impl Body {
    /// Returns the attestation verifying key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key.data
    }

    /// Returns the connection information.
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_info.data
    }

    /// Returns the server name.
    pub fn server_name(&self) -> &ServerName {
        &self.server_name.data
    }

    /// Returns the summary of the ciphertext observed by the Notary.
    pub fn ciphertext_summary(&self) -> &CiphertextSummary {
        &self.ciphertext_summary.data
    }

    /// Returns the aggregate transcript commitment.
    pub fn transcript_commitment(&self) -> &TranscriptCommitment {
        &self.transcript_commitment.data
    }

    /// Computes the Merkle root of the attestation fields.
    pub(crate) fn root(&self, hasher: &dyn HashAlgorithm) -> Option<TypedHash> {
        let mut tree = MerkleTree::new(hasher.id());
        let fields = self
            .hash_fields(hasher)
            .into_iter()
            .map(|(_, hash)| hash)
            .collect::<Vec<_>>();
        tree.insert(hasher, fields);
        tree.root()
    }

    /// Returns the fields of the body hashed and sorted by id.
    ///
    /// Each field is hashed with a domain separator to mitigate type confusion
    /// attacks.
    pub(crate) fn hash_fields(&self, hasher: &dyn HashAlgorithm) -> Vec<(FieldId, Hash)> {
        // Destructured so that a new field can't be left out of the root.
        let Self {
            verifying_key,
            connection_info,
            server_name,
            ciphertext_summary,
            transcript_commitment,
        } = self;

        let mut fields: Vec<(FieldId, Hash)> = vec![
            (verifying_key.id, hasher.hash_separated(&verifying_key.data)),
            (connection_info.id, hasher.hash_separated(&connection_info.data)),
            (server_name.id, hasher.hash_separated(&server_name.data)),
            (
                ciphertext_summary.id,
                hasher.hash_separated(&ciphertext_summary.data),
            ),
            (
                transcript_commitment.id,
                hasher.hash_separated(&transcript_commitment.data),
            ),
        ];

        fields.sort_by_key(|(id, _)| *id);
        fields
    }
}

/// An attestation document.
///
/// See [module level documentation](crate::attestation) for more information.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Attestation {
    /// The signature of the attestation.
    pub signature: Signature,
    /// The attestation header.
    pub header: Header,
    /// The attestation body.
    pub body: Body,
}

impl Attestation {
    /// Returns an attestation builder.
    pub fn builder(config: &AttestationConfig) -> AttestationBuilder<'_> {
        AttestationBuilder::new(config)
    }

    /// Verifies the attestation against a trusted Notary key.
    ///
    /// Checks that the header is signed by `key`, that the body was issued
    /// under `key`, and that the body fields hash to the signed root.
    pub fn verify(
        &self,
        provider: &CryptoProvider,
        key: &VerifyingKey,
    ) -> Result<(), AttestationError> {
        let verifier = provider.signature.get(&self.signature.alg).map_err(|_| {
            AttestationError::signature(format!(
                "unsupported signature algorithm: {}",
                self.signature.alg
            ))
        })?;

        verifier
            .verify(
                key,
                &CanonicalSerialize::serialize(&self.header),
                &self.signature.data,
            )
            .map_err(AttestationError::signature)?;

        if self.body.verifying_key() != key {
            return Err(AttestationError::signature(
                "attestation was issued under a different key",
            ));
        }

        let hasher = provider.hash.get(&self.header.root.alg).map_err(|_| {
            AttestationError::body(format!(
                "unsupported hash algorithm: {}",
                self.header.root.alg
            ))
        })?;

        if self.body.root(hasher).as_ref() != Some(&self.header.root) {
            return Err(AttestationError::body(
                "body fields do not match the signed root",
            ));
        }

        Ok(())
    }
}

/// Error for [`Attestation::verify`].
#[derive(Debug, thiserror::Error)]
pub struct AttestationError {
    kind: AttestationErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Kind of [`AttestationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationErrorKind {
    /// The signature is invalid or made with an unexpected key.
    Signature,
    /// The body is inconsistent with the signed header.
    Body,
}

impl AttestationError {
    fn signature<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind: AttestationErrorKind::Signature,
            source: Some(source.into()),
        }
    }

    fn body<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind: AttestationErrorKind::Body,
            source: Some(source.into()),
        }
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> AttestationErrorKind {
        self.kind
    }
}

impl fmt::Display for AttestationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AttestationErrorKind::Signature => f.write_str("attestation signature error")?,
            AttestationErrorKind::Body => f.write_str("attestation body error")?,
        }

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
        fixtures::{attestation_fixture, notary_signing_key},
        signing::SignatureAlgId,
    };

    fn provider() -> CryptoProvider {
        let mut provider = CryptoProvider::default();
        provider
            .signer
            .set_secp256k1(&notary_signing_key())
            .unwrap();
        provider
    }

    fn key(provider: &CryptoProvider) -> VerifyingKey {
        provider
            .signer
            .get(&SignatureAlgId::SECP256K1)
            .unwrap()
            .verifying_key()
    }

    #[test]
    fn test_verify_success() {
        let provider = provider();
        let fixture = attestation_fixture(&provider);

        fixture.attestation.verify(&provider, &key(&provider)).unwrap();
    }

    #[test]
    fn test_verify_wrong_key() {
        let provider = provider();
        let fixture = attestation_fixture(&provider);

        let mut other = CryptoProvider::default();
        other.signer.set_secp256k1(&[7u8; 32]).unwrap();

        let err = fixture
            .attestation
            .verify(&provider, &key(&other))
            .unwrap_err();
        assert_eq!(err.kind(), AttestationErrorKind::Signature);
    }

    #[test]
    fn test_verify_modified_body() {
        let provider = provider();
        let mut attestation = attestation_fixture(&provider).attestation;

        attestation.body.server_name.data = ServerName::try_from("evil.com").unwrap();

        let err = attestation.verify(&provider, &key(&provider)).unwrap_err();
        assert_eq!(err.kind(), AttestationErrorKind::Body);
    }

    #[test]
    fn test_verify_modified_header() {
        let provider = provider();
        let mut attestation = attestation_fixture(&provider).attestation;

        attestation.header.id = Uid([0xff; 16]);

        let err = attestation.verify(&provider, &key(&provider)).unwrap_err();
        assert_eq!(err.kind(), AttestationErrorKind::Signature);
    }

    #[test]
    fn test_field_ids_are_unique() {
        let provider = provider();
        let attestation = attestation_fixture(&provider).attestation;
        let hasher = provider.hash.get(&attestation.header.root.alg).unwrap();

        let fields = attestation.body.hash_fields(hasher);
        assert_eq!(fields.len(), 5);
        assert!(fields.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
