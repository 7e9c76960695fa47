//! Selective disclosure.
//!
//! A [`DisclosurePolicy`] states which bytes of each direction of the
//! transcript are disclosed. Everything not explicitly disclosed is redacted.
//!
//! # Redaction policy
//!
//! Redaction is length-preserving. A verifier learns the full length of each
//! direction and the exact positions of the disclosed bytes. Redacted bytes
//! are presented as `0x00` and reported as unauthenticated, so a verifier
//! learns where redacted ranges are and how long they are, but nothing of
//! their content.
//!
//! A disclosure is only possible for ranges that are exactly covered by
//! commitments made before the attestation was signed. The
//! [`DisclosureBuilder`] refuses to build an artifact for a policy it can not
//! satisfy completely, it never drops a range silently.

use std::{fmt, ops::Range};

use tracing::debug;

use crate::{
    artifact::{ProofArtifact, ARTIFACT_VERSION},
    attestation::Attestation,
    commitment::CommitmentSecrets,
    http::HttpTranscript,
    transcript::{Direction, Idx, TranscriptCommitConfigBuilder},
};

/// Response headers disclosed by [`DisclosurePolicy::from_http`].
const DISCLOSED_RESPONSE_HEADERS: &[&str] = &["content-type", "content-length"];

/// Which transcript bytes are disclosed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisclosurePolicy {
    sent: Idx,
    recv: Idx,
}

impl DisclosurePolicy {
    /// Creates a policy which discloses nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the default policy for an HTTP transcript.
    ///
    /// Requests disclose the request line and the `Host` header; every other
    /// request header and the request body are redacted. Responses disclose the
    /// status line, the `Content-Type` and `Content-Length` headers and the
    /// body; every other response header is redacted.
    pub fn from_http(http: &HttpTranscript) -> Self {
        let mut policy = Self::new();

        for request in &http.requests {
            policy.disclose(Direction::Sent, request.request_line.clone());

            if let Some(host) = request.header("host") {
                policy.disclose(Direction::Sent, host.span.clone());
            }
        }

        for response in &http.responses {
            policy.disclose(Direction::Received, response.status_line.clone());

            for header in &response.headers {
                if DISCLOSED_RESPONSE_HEADERS
                    .iter()
                    .any(|name| header.name.eq_ignore_ascii_case(name))
                {
                    policy.disclose(Direction::Received, header.span.clone());
                }
            }

            if let Some(body) = &response.body {
                policy.disclose(Direction::Received, body.clone());
            }
        }

        policy
    }

    /// Discloses a range.
    pub fn disclose(&mut self, direction: Direction, range: Range<usize>) -> &mut Self {
        self.idx_mut(direction).union_range(&range);
        self
    }

    /// Redacts a range, overriding any earlier disclosure of it.
    pub fn redact(&mut self, direction: Direction, range: Range<usize>) -> &mut Self {
        self.idx_mut(direction).remove_range(&range);
        self
    }

    /// Returns the disclosed index of a direction.
    pub fn disclosed(&self, direction: Direction) -> &Idx {
        match direction {
            Direction::Sent => &self.sent,
            Direction::Received => &self.recv,
        }
    }

    /// Returns whether nothing is disclosed.
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.recv.is_empty()
    }

    /// Adds a commitment to every disclosed range, so that the policy can be
    /// satisfied once the attestation is signed.
    pub fn commit(
        &self,
        builder: &mut TranscriptCommitConfigBuilder<'_>,
    ) -> Result<(), DisclosureError> {
        for direction in [Direction::Sent, Direction::Received] {
            builder
                .commit_idx(self.disclosed(direction), direction)
                .map_err(|err| DisclosureError::new(ErrorKind::PolicyConflict, err))?;
        }

        Ok(())
    }

    fn idx_mut(&mut self, direction: Direction) -> &mut Idx {
        match direction {
            Direction::Sent => &mut self.sent,
            Direction::Received => &mut self.recv,
        }
    }
}

/// Commit config covering the HTTP structure of a transcript: each request
/// and status line, each header line and each body.
pub fn http_commit_config(
    http: &HttpTranscript,
    builder: &mut TranscriptCommitConfigBuilder<'_>,
) -> Result<(), DisclosureError> {
    let mut commit = |direction: Direction, range: Range<usize>| {
        builder
            .commit(range, direction)
            .map(|_| ())
            .map_err(|err| DisclosureError::new(ErrorKind::PolicyConflict, err))
    };

    for request in &http.requests {
        commit(Direction::Sent, request.request_line.clone())?;
        for header in &request.headers {
            commit(Direction::Sent, header.span.clone())?;
        }
        if let Some(body) = &request.body {
            commit(Direction::Sent, body.clone())?;
        }
    }

    for response in &http.responses {
        commit(Direction::Received, response.status_line.clone())?;
        for header in &response.headers {
            commit(Direction::Received, header.span.clone())?;
        }
        if let Some(body) = &response.body {
            commit(Direction::Received, body.clone())?;
        }
    }

    Ok(())
}

/// Builds a [`ProofArtifact`] disclosing the bytes of a policy.
#[derive(Debug)]
pub struct DisclosureBuilder<'a> {
    attestation: &'a Attestation,
    secrets: &'a CommitmentSecrets,
}

impl<'a> DisclosureBuilder<'a> {
    /// Creates a new builder for a signed attestation and the secrets of the
    /// commitments it attests to.
    pub fn new(attestation: &'a Attestation, secrets: &'a CommitmentSecrets) -> Self {
        Self {
            attestation,
            secrets,
        }
    }

    /// Builds the artifact.
    ///
    /// Fails with a policy conflict if a disclosed range lies outside the
    /// committed transcript or is not exactly covered by commitments.
    pub fn build(&self, policy: &DisclosurePolicy) -> Result<ProofArtifact, DisclosureError> {
        if self.secrets.aggregate().as_ref() != Some(self.attestation.body.transcript_commitment())
        {
            return Err(DisclosureError::new(
                ErrorKind::Secrets,
                "secrets do not match the attested transcript commitment",
            ));
        }

        let mut leaves = Vec::new();
        for direction in [Direction::Sent, Direction::Received] {
            let disclosed = policy.disclosed(direction);
            let len = self.secrets.transcript().len_of_direction(direction);

            if disclosed.end() > len {
                return Err(DisclosureError::new(
                    ErrorKind::PolicyConflict,
                    format!(
                        "{direction} range ends at {} but the transcript has {len} bytes",
                        disclosed.end()
                    ),
                ));
            }

            leaves.extend(self.cover(direction, disclosed)?);
        }

        let (openings, proof) = if leaves.is_empty() {
            (Vec::new(), None)
        } else {
            let (openings, proof) = self
                .secrets
                .open(&leaves)
                .map_err(|err| DisclosureError::new(ErrorKind::Secrets, err))?;
            (openings, Some(proof))
        };

        debug!(
            "disclosing {} sent and {} received bytes with {} openings",
            policy.sent.len(),
            policy.recv.len(),
            openings.len()
        );

        Ok(ProofArtifact {
            version: ARTIFACT_VERSION,
            attestation: self.attestation.clone(),
            openings,
            commitment_proof: proof,
        })
    }

    /// Selects committed ranges whose union is exactly `idx`.
    ///
    /// Candidates are taken largest first, skipping any which add no new bytes.
    fn cover(&self, direction: Direction, idx: &Idx) -> Result<Vec<u32>, DisclosureError> {
        let mut candidates = self
            .secrets
            .committed()
            .enumerate()
            .filter(|(_, (dir, range))| *dir == direction && idx.contains_range(range))
            .map(|(leaf, (_, range))| (leaf as u32, range.clone()))
            .collect::<Vec<_>>();
        candidates.sort_by_key(|(leaf, range)| (std::cmp::Reverse(range.len()), *leaf));

        let mut covered = Idx::empty();
        let mut selected = Vec::new();
        for (leaf, range) in candidates {
            if !covered.contains_range(&range) {
                covered.union_range(&range);
                selected.push(leaf);
            }
        }

        let missing = idx.difference(&covered);
        if !missing.is_empty() {
            return Err(DisclosureError::new(
                ErrorKind::PolicyConflict,
                format!(
                    "{direction} ranges {:?} are not covered by commitments",
                    missing.iter_ranges().collect::<Vec<_>>()
                ),
            ));
        }

        Ok(selected)
    }
}

/// Error for [`DisclosureBuilder`].
#[derive(Debug, thiserror::Error)]
pub struct DisclosureError {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
    PolicyConflict,
    Secrets,
}

impl DisclosureError {
    fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    /// Returns whether the policy can not be satisfied.
    pub fn is_policy_conflict(&self) -> bool {
        matches!(self.kind, ErrorKind::PolicyConflict)
    }
}

impl fmt::Display for DisclosureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::PolicyConflict => f.write_str("policy conflict")?,
            ErrorKind::Secrets => f.write_str("secrets error")?,
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
        fixtures::{attestation_fixture, notary_signing_key, AttestationFixture},
        CryptoProvider,
    };

    fn provider() -> CryptoProvider {
        let mut provider = CryptoProvider::default();
        provider.signer.set_secp256k1(&notary_signing_key()).unwrap();
        provider
    }

    #[test]
    fn test_from_http_discloses_default_parts() {
        let provider = provider();
        let AttestationFixture { secrets, .. } = attestation_fixture(&provider);
        let transcript = secrets.transcript();
        let http = HttpTranscript::parse(transcript).unwrap();

        let policy = DisclosurePolicy::from_http(&http);
        let partial = transcript.to_partial(
            policy.disclosed(Direction::Sent).clone(),
            policy.disclosed(Direction::Received).clone(),
        );

        let sent = String::from_utf8_lossy(&partial.authed_bytes(Direction::Sent)).to_string();
        assert!(sent.starts_with("GET / HTTP/1.1\r\n"));
        assert!(sent.contains("Host: www.example.com\r\n"));
        assert!(!sent.contains("Cookie"));

        let recv =
            String::from_utf8_lossy(&partial.authed_bytes(Direction::Received)).to_string();
        assert!(recv.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(recv.contains("Content-Type: text/html"));
        assert!(!recv.contains("Set-Cookie"));
    }

    #[test]
    fn test_redact_overrides_disclose() {
        let mut policy = DisclosurePolicy::new();
        policy
            .disclose(Direction::Sent, 0..10)
            .redact(Direction::Sent, 2..4);

        assert_eq!(
            policy.disclosed(Direction::Sent).iter_ranges().collect::<Vec<_>>(),
            vec![0..2, 4..10]
        );
        assert!(policy.disclosed(Direction::Received).is_empty());
    }

    #[test]
    fn test_build_default_policy() {
        let provider = provider();
        let AttestationFixture {
            attestation,
            secrets,
            ..
        } = attestation_fixture(&provider);
        let http = HttpTranscript::parse(secrets.transcript()).unwrap();

        let artifact = DisclosureBuilder::new(&attestation, &secrets)
            .build(&DisclosurePolicy::from_http(&http))
            .unwrap();

        assert!(!artifact.openings.is_empty());
        assert!(artifact.commitment_proof.is_some());
    }

    #[test]
    fn test_build_out_of_range_is_conflict() {
        let provider = provider();
        let AttestationFixture {
            attestation,
            secrets,
            ..
        } = attestation_fixture(&provider);
        let len = secrets.transcript().len().1;

        let mut policy = DisclosurePolicy::new();
        policy.disclose(Direction::Received, len - 2..len + 5);

        let err = DisclosureBuilder::new(&attestation, &secrets)
            .build(&policy)
            .unwrap_err();
        assert!(err.is_policy_conflict());
    }

    #[test]
    fn test_build_uncommitted_range_is_conflict() {
        let provider = provider();
        let AttestationFixture {
            attestation,
            secrets,
            ..
        } = attestation_fixture(&provider);

        // A single byte in the middle of the request line was never committed
        // on its own.
        let mut policy = DisclosurePolicy::new();
        policy.disclose(Direction::Sent, 1..2);

        let err = DisclosureBuilder::new(&attestation, &secrets)
            .build(&policy)
            .unwrap_err();
        assert!(err.is_policy_conflict());
    }

    #[test]
    fn test_build_empty_policy() {
        let provider = provider();
        let AttestationFixture {
            attestation,
            secrets,
            ..
        } = attestation_fixture(&provider);

        let artifact = DisclosureBuilder::new(&attestation, &secrets)
            .build(&DisclosurePolicy::new())
            .unwrap();

        assert!(artifact.openings.is_empty());
        assert!(artifact.commitment_proof.is_none());
    }
}
