use std::error::Error;

use rand::{rng, Rng};

use crate::{
    attestation::{Attestation, AttestationConfig, Body, FieldId, Header, VERSION},
    commitment::TranscriptCommitment,
    connection::{CiphertextSummary, ConnectionInfo, ServerName, TranscriptLength},
    hash::HashAlgId,
    request::AttestationRequest,
    serialize::CanonicalSerialize,
    signing::SignatureAlgId,
    CryptoProvider,
};

/// Attestation builder state for accepting a request.
#[derive(Debug)]
pub struct Accept {}

/// Attestation builder state for signing an accepted request.
#[derive(Debug)]
pub struct Sign {
    signature_alg: SignatureAlgId,
    hash_alg: HashAlgId,
    server_name: ServerName,
    transcript_length: TranscriptLength,
    transcript_commitment: TranscriptCommitment,
    connection_time: Option<u64>,
    observed_server_name: Option<ServerName>,
    ciphertext_summary: Option<CiphertextSummary>,
}

/// An attestation builder.
#[derive(Debug)]
pub struct AttestationBuilder<'a, T = Accept> {
    config: &'a AttestationConfig,
    state: T,
}

impl<'a> AttestationBuilder<'a, Accept> {
    /// Creates a new attestation builder.
    pub fn new(config: &'a AttestationConfig) -> Self {
        Self {
            config,
            state: Accept {},
        }
    }

    /// Accepts the attestation request.
    pub fn accept_request(
        self,
        request: AttestationRequest,
    ) -> Result<AttestationBuilder<'a, Sign>, AttestationBuilderError> {
        let config = self.config;

        let AttestationRequest {
            signature_alg,
            hash_alg,
            server_name,
            transcript_length,
            transcript_commitment,
        } = request;

        if !config.supported_signature_algs().contains(&signature_alg) {
            return Err(AttestationBuilderError::new(
                ErrorKind::Request,
                format!("unsupported signature algorithm: {signature_alg}"),
            ));
        }

        if !config.supported_hash_algs().contains(&hash_alg) {
            return Err(AttestationBuilderError::new(
                ErrorKind::Request,
                format!("unsupported hash algorithm: {hash_alg}"),
            ));
        }

        if transcript_commitment.root.alg != hash_alg {
            return Err(AttestationBuilderError::new(
                ErrorKind::Request,
                "transcript commitment hash algorithm does not match the request",
            ));
        }

        Ok(AttestationBuilder {
            config: self.config,
            state: Sign {
                signature_alg,
                hash_alg,
                server_name,
                transcript_length,
                transcript_commitment,
                connection_time: None,
                observed_server_name: None,
                ciphertext_summary: None,
            },
        })
    }
}

impl AttestationBuilder<'_, Sign> {
    /// Sets the UNIX time at which the connection started.
    pub fn connection_time(&mut self, time: u64) -> &mut Self {
        self.state.connection_time = Some(time);
        self
    }

    /// Sets the server name the Notary observed in the ClientHello.
    pub fn observed_server_name(&mut self, name: ServerName) -> &mut Self {
        self.state.observed_server_name = Some(name);
        self
    }

    /// Sets the summary of the ciphertext the Notary observed.
    pub fn ciphertext_summary(&mut self, summary: CiphertextSummary) -> &mut Self {
        self.state.ciphertext_summary = Some(summary);
        self
    }

    /// Builds the attestation.
    pub fn build(self, provider: &CryptoProvider) -> Result<Attestation, AttestationBuilderError> {
        let Sign {
            signature_alg,
            hash_alg,
            server_name,
            transcript_length,
            transcript_commitment,
            connection_time,
            observed_server_name,
            ciphertext_summary,
        } = self.state;

        let hasher = provider.hash.get(&hash_alg).map_err(|_| {
            AttestationBuilderError::new(
                ErrorKind::Config,
                format!("accepted hash algorithm {hash_alg} but it's missing in the provider"),
            )
        })?;
        let signer = provider.signer.get(&signature_alg).map_err(|_| {
            AttestationBuilderError::new(
                ErrorKind::Config,
                format!(
                    "accepted signature algorithm {signature_alg} but it's missing in the provider"
                ),
            )
        })?;

        let time = connection_time.ok_or_else(|| {
            AttestationBuilderError::new(ErrorKind::Field, "connection time was not set")
        })?;
        let observed_server_name = observed_server_name.ok_or_else(|| {
            AttestationBuilderError::new(ErrorKind::Field, "observed server name was not set")
        })?;
        let ciphertext_summary = ciphertext_summary.ok_or_else(|| {
            AttestationBuilderError::new(ErrorKind::Field, "ciphertext summary was not set")
        })?;

        if server_name != observed_server_name {
            return Err(AttestationBuilderError::new(
                ErrorKind::Request,
                format!(
                    "requested server name {server_name} does not match observed {observed_server_name}"
                ),
            ));
        }

        // Plaintext is never longer than the ciphertext carrying it.
        if u64::from(transcript_length.sent) > ciphertext_summary.sent.bytes
            || u64::from(transcript_length.received) > ciphertext_summary.received.bytes
        {
            return Err(AttestationBuilderError::new(
                ErrorKind::Request,
                "transcript length exceeds observed ciphertext",
            ));
        }

        let mut field_id = FieldId::default();

        let body = Body {
            verifying_key: field_id.next(signer.verifying_key()),
            connection_info: field_id.next(ConnectionInfo {
                time,
                transcript_length,
            }),
            server_name: field_id.next(server_name),
            ciphertext_summary: field_id.next(ciphertext_summary),
            transcript_commitment: field_id.next(transcript_commitment),
        };

        let root = body.root(hasher).ok_or_else(|| {
            AttestationBuilderError::new(ErrorKind::Field, "attestation body is empty")
        })?;

        let header = Header {
            id: rng().random(),
            version: VERSION,
            root,
        };

        let signature = signer
            .sign(&CanonicalSerialize::serialize(&header))
            .map_err(|err| AttestationBuilderError::new(ErrorKind::Signature, err))?;

        Ok(Attestation {
            signature,
            header,
            body,
        })
    }
}

/// Error for [`AttestationBuilder`].
#[derive(Debug, thiserror::Error)]
pub struct AttestationBuilderError {
    kind: ErrorKind,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

#[derive(Debug)]
enum ErrorKind {
    Request,
    Config,
    Field,
    Signature,
}

impl AttestationBuilderError {
    fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            kind,
            source: Some(error.into()),
        }
    }

    /// Returns whether the error originates from a bad request.
    pub fn is_request(&self) -> bool {
        matches!(self.kind, ErrorKind::Request)
    }
}

impl std::fmt::Display for AttestationBuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ErrorKind::Request => f.write_str("request error")?,
            ErrorKind::Config => f.write_str("config error")?,
            ErrorKind::Field => f.write_str("field error")?,
            ErrorKind::Signature => f.write_str("signature error")?,
        }

        if let Some(source) = &self.source {
            write!(f, " caused by: {}", source)?;
        }

        Ok(())
    }
}
