use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use eyre::Report;
use std::error::Error;
use tlsproof_common::config::ProtocolConfigValidatorBuilderError;
use tlsproof_core::attestation::AttestationConfigError;
use tlsproof_verifier::{VerifierConfigBuilderError, VerifierError};

#[derive(Debug, thiserror::Error)]
pub enum NotaryServerError {
    #[error(transparent)]
    Unexpected(#[from] Report),
    #[error("Failed to connect to prover: {0}")]
    Connection(String),
    #[error("Error occurred during notarization: {0}")]
    Notarization(Box<dyn Error + Send + Sync + 'static>),
    #[error("Invalid request from prover: {0}")]
    BadProverRequest(String),
    #[error("Notary is at capacity, retry after {retry_after}s")]
    Unavailable { retry_after: u64 },
}

impl From<VerifierError> for NotaryServerError {
    fn from(error: VerifierError) -> Self {
        Self::Notarization(Box::new(error))
    }
}

impl From<VerifierConfigBuilderError> for NotaryServerError {
    fn from(error: VerifierConfigBuilderError) -> Self {
        Self::Notarization(Box::new(error))
    }
}

impl From<ProtocolConfigValidatorBuilderError> for NotaryServerError {
    fn from(error: ProtocolConfigValidatorBuilderError) -> Self {
        Self::Notarization(Box::new(error))
    }
}

impl From<AttestationConfigError> for NotaryServerError {
    fn from(error: AttestationConfigError) -> Self {
        Self::Notarization(Box::new(error))
    }
}

/// Converts the error into an axum http response.
impl IntoResponse for NotaryServerError {
    fn into_response(self) -> Response {
        match self {
            bad_request_error @ NotaryServerError::BadProverRequest(_) => {
                (StatusCode::BAD_REQUEST, bad_request_error.to_string()).into_response()
            }
            unavailable @ NotaryServerError::Unavailable { retry_after } => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, retry_after.to_string())],
                unavailable.to_string(),
            )
                .into_response(),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something wrong happened.",
            )
                .into_response(),
        }
    }
}
