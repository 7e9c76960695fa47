//! Fixtures for testing

use std::sync::Arc;

use crate::{
    attestation::{Attestation, AttestationConfig},
    commitment::{CommitmentEngine, CommitmentSecrets},
    connection::{CiphertextObserver, CiphertextSummary, ServerName},
    disclosure::http_commit_config,
    hash::Blake3,
    http::HttpTranscript,
    request::{AttestationRequest, RequestConfig},
    signing::SignatureAlgId,
    transcript::{Direction, TranscriptCommitConfig},
    CryptoProvider,
};

/// Request sent to www.example.com, split into records.
pub const REQUEST_RECORDS: &[&[u8]] = &[
    b"GET / HTTP/1.1\r\nHost: www.example.com\r\n",
    b"Accept: text/html\r\nCookie: session=c2VjcmV0\r\nConnection: close\r\n\r\n",
];

/// Response from www.example.com, split into records.
pub const RESPONSE_RECORDS: &[&[u8]] = &[
    b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=UTF-8\r\n",
    b"Content-Length: 49\r\nSet-Cookie: tracking=abc123; HttpOnly\r\n\r\n",
    b"<html><body><h1>Example Domain</h1></body></html>",
];

/// Per-record ciphertext overhead of the simulated connection.
const RECORD_OVERHEAD: usize = 29;

/// Returns the signing key used by the fixture Notary.
pub fn notary_signing_key() -> [u8; 32] {
    [42u8; 32]
}

/// Returns the seed used by the fixture commitment engine.
pub fn commitment_seed() -> [u8; 32] {
    [7u8; 32]
}

/// A fixture containing an attestation request and the data behind it.
#[allow(missing_docs)]
pub struct RequestFixture {
    pub request: AttestationRequest,
    pub server_name: ServerName,
    pub summary: CiphertextSummary,
    pub secrets: CommitmentSecrets,
}

/// Returns a request fixture for an HTTP session with www.example.com.
pub fn request_fixture() -> RequestFixture {
    let server_name = ServerName::try_from("www.example.com").unwrap();

    let mut engine = CommitmentEngine::new(Arc::new(Blake3::default()), commitment_seed());
    let mut observer = CiphertextObserver::new();

    let records = REQUEST_RECORDS
        .iter()
        .map(|data| (Direction::Sent, *data))
        .chain(
            RESPONSE_RECORDS
                .iter()
                .map(|data| (Direction::Received, *data)),
        );

    for (direction, data) in records {
        engine.observe(direction, data);
        observer.observe(direction, &vec![0u8; data.len() + RECORD_OVERHEAD]);
        engine.finalize_pending();
    }

    let http = HttpTranscript::parse(engine.transcript()).unwrap();
    let mut builder = TranscriptCommitConfig::builder(engine.transcript());
    http_commit_config(&http, &mut builder).unwrap();
    let config = builder.build().unwrap();
    engine.commit_config(&config).unwrap();

    let length = engine.transcript().length();
    let (commitment, secrets) = engine.close().unwrap();

    let request_config = RequestConfig::default();
    let mut request_builder = AttestationRequest::builder(&request_config);
    request_builder
        .server_name(server_name.clone())
        .transcript_length(length)
        .transcript_commitment(commitment);
    let request = request_builder.build().unwrap();

    RequestFixture {
        request,
        server_name,
        summary: observer.summary(),
        secrets,
    }
}

/// A fixture containing a signed attestation.
#[allow(missing_docs)]
pub struct AttestationFixture {
    pub request: AttestationRequest,
    pub attestation: Attestation,
    pub secrets: CommitmentSecrets,
}

/// Returns an attestation fixture signed with the secp256k1 signer of the
/// provider.
pub fn attestation_fixture(provider: &CryptoProvider) -> AttestationFixture {
    let RequestFixture {
        request,
        server_name,
        summary,
        secrets,
    } = request_fixture();

    let config = AttestationConfig::builder()
        .supported_signature_algs([SignatureAlgId::SECP256K1])
        .build()
        .unwrap();

    let mut builder = Attestation::builder(&config)
        .accept_request(request.clone())
        .unwrap();
    builder
        .connection_time(1_700_000_000)
        .observed_server_name(server_name)
        .ciphertext_summary(summary);
    let attestation = builder.build(provider).unwrap();

    AttestationFixture {
        request,
        attestation,
        secrets,
    }
}
