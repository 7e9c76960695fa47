use crate::{
    commitment::TranscriptCommitment,
    connection::{ServerName, TranscriptLength},
    request::{AttestationRequest, RequestConfig},
};

/// Builder for [`AttestationRequest`].
#[derive(Debug)]
pub struct RequestBuilder<'a> {
    config: &'a RequestConfig,
    server_name: Option<ServerName>,
    transcript_length: Option<TranscriptLength>,
    transcript_commitment: Option<TranscriptCommitment>,
}

impl<'a> RequestBuilder<'a> {
    /// Creates a new request builder.
    pub fn new(config: &'a RequestConfig) -> Self {
        Self {
            config,
            server_name: None,
            transcript_length: None,
            transcript_commitment: None,
        }
    }

    /// Sets the server name.
    pub fn server_name(&mut self, name: ServerName) -> &mut Self {
        self.server_name = Some(name);
        self
    }

    /// Sets the plaintext transcript length.
    pub fn transcript_length(&mut self, length: TranscriptLength) -> &mut Self {
        self.transcript_length = Some(length);
        self
    }

    /// Sets the aggregate transcript commitment.
    pub fn transcript_commitment(&mut self, commitment: TranscriptCommitment) -> &mut Self {
        self.transcript_commitment = Some(commitment);
        self
    }

    /// Builds the attestation request.
    pub fn build(&self) -> Result<AttestationRequest, RequestBuilderError> {
        let server_name = self
            .server_name
            .clone()
            .ok_or_else(|| RequestBuilderError::new("server name is missing"))?;
        let transcript_length = self
            .transcript_length
            .ok_or_else(|| RequestBuilderError::new("transcript length is missing"))?;
        let transcript_commitment = self
            .transcript_commitment
            .ok_or_else(|| RequestBuilderError::new("transcript commitment is missing"))?;

        if transcript_commitment.root.alg != *self.config.hash_alg() {
            return Err(RequestBuilderError::new(format!(
                "transcript commitment uses {} but the request is configured with {}",
                transcript_commitment.root.alg,
                self.config.hash_alg()
            )));
        }

        Ok(AttestationRequest {
            signature_alg: *self.config.signature_alg(),
            hash_alg: *self.config.hash_alg(),
            server_name,
            transcript_length,
            transcript_commitment,
        })
    }
}

/// Error for [`RequestBuilder`].
#[derive(Debug, thiserror::Error)]
#[error("request builder error: {message}")]
pub struct RequestBuilderError {
    message: String,
}

impl RequestBuilderError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
