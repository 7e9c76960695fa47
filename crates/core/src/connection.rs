//! TLS connection types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{hash::impl_domain_separator, transcript::Direction};

/// TLS server name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerName {
    /// DNS name.
    Dns(DnsName),
}

impl ServerName {
    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            ServerName::Dns(name) => name.as_str(),
        }
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerName::Dns(name) => write!(f, "{name}"),
        }
    }
}

impl_domain_separator!(ServerName);

impl TryFrom<&str> for ServerName {
    type Error = InvalidDnsNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        DnsName::try_from(value).map(ServerName::Dns)
    }
}

/// DNS name, stored in lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct DnsName(String);

impl DnsName {
    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for DnsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DnsName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Error for an invalid DNS name.
#[derive(Debug, thiserror::Error)]
#[error("invalid DNS name: {0}")]
pub struct InvalidDnsNameError(String);

impl TryFrom<&str> for DnsName {
    type Error = InvalidDnsNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let name = value.strip_suffix('.').unwrap_or(value);

        let valid_label = |label: &str| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        };

        if name.is_empty() || name.len() > 253 || !name.split('.').all(valid_label) {
            return Err(InvalidDnsNameError(value.to_string()));
        }

        // An all-numeric last label would make this an IP address.
        if name
            .rsplit('.')
            .next()
            .is_some_and(|tld| tld.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(InvalidDnsNameError(value.to_string()));
        }

        Ok(DnsName(name.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for DnsName {
    type Error = InvalidDnsNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// Transcript length information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLength {
    /// Number of bytes sent by the Prover to the Server.
    pub sent: u32,
    /// Number of bytes received by the Prover from the Server.
    pub received: u32,
}

/// Connection information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// UNIX time when the TLS connection started.
    pub time: u64,
    /// Transcript length.
    pub transcript_length: TranscriptLength,
}

impl_domain_separator!(ConnectionInfo);

/// What the notary observed of one direction of the ciphertext stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Number of mirrored frames.
    pub frames: u64,
    /// Number of ciphertext bytes.
    pub bytes: u64,
    /// BLAKE3 digest of the ciphertext byte stream.
    pub digest: [u8; 32],
}

/// Summary of the mirrored ciphertext, per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CiphertextSummary {
    /// Ciphertext sent to the server.
    pub sent: StreamSummary,
    /// Ciphertext received from the server.
    pub received: StreamSummary,
}

impl_domain_separator!(CiphertextSummary);

impl CiphertextSummary {
    /// Returns the summary for the given direction.
    pub fn get(&self, direction: Direction) -> &StreamSummary {
        match direction {
            Direction::Sent => &self.sent,
            Direction::Received => &self.received,
        }
    }
}

/// Running digest of the ciphertext flowing in both directions.
///
/// Both the prover and the notary keep one of these; the summaries must be
/// identical when the connection closes.
#[derive(Clone, Default)]
pub struct CiphertextObserver {
    sent: (u64, u64, blake3::Hasher),
    received: (u64, u64, blake3::Hasher),
}

opaque_debug::implement!(CiphertextObserver);

impl CiphertextObserver {
    /// Creates a new observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame of ciphertext.
    pub fn observe(&mut self, direction: Direction, data: &[u8]) {
        let (frames, bytes, hasher) = match direction {
            Direction::Sent => &mut self.sent,
            Direction::Received => &mut self.received,
        };

        *frames += 1;
        *bytes += data.len() as u64;
        hasher.update(data);
    }

    /// Returns the number of ciphertext bytes observed in a direction.
    pub fn bytes(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Sent => self.sent.1,
            Direction::Received => self.received.1,
        }
    }

    /// Returns the summary of everything observed so far.
    pub fn summary(&self) -> CiphertextSummary {
        let summarize = |(frames, bytes, hasher): &(u64, u64, blake3::Hasher)| StreamSummary {
            frames: *frames,
            bytes: *bytes,
            digest: hasher.finalize().into(),
        };

        CiphertextSummary {
            sent: summarize(&self.sent),
            received: summarize(&self.received),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case::simple("example.com")]
    #[case::subdomain("www.example.com")]
    #[case::trailing_dot("test-server.io.")]
    #[case::mixed_case("WWW.Example.COM")]
    fn test_dns_name_valid(#[case] name: &str) {
        assert!(DnsName::try_from(name).is_ok());
    }

    #[rstest]
    #[case::empty("")]
    #[case::ip("127.0.0.1")]
    #[case::space("exa mple.com")]
    #[case::leading_hyphen("-example.com")]
    #[case::empty_label("example..com")]
    fn test_dns_name_invalid(#[case] name: &str) {
        assert!(DnsName::try_from(name).is_err());
    }

    #[test]
    fn test_dns_name_is_normalized() {
        assert_eq!(
            DnsName::try_from("WWW.Example.com.").unwrap().as_str(),
            "www.example.com"
        );
    }

    #[test]
    fn test_observer_is_insensitive_to_framing() {
        let mut a = CiphertextObserver::new();
        a.observe(Direction::Sent, b"hello world");

        let mut b = CiphertextObserver::new();
        b.observe(Direction::Sent, b"hello ");
        b.observe(Direction::Sent, b"world");

        assert_eq!(a.summary().sent.digest, b.summary().sent.digest);
        assert_eq!(a.summary().sent.bytes, b.summary().sent.bytes);
        assert_ne!(a.summary().sent.frames, b.summary().sent.frames);
    }

    #[test]
    fn test_observer_separates_directions() {
        let mut observer = CiphertextObserver::new();
        observer.observe(Direction::Received, b"data");

        let summary = observer.summary();
        assert_eq!(summary.sent, StreamSummary {
            frames: 0,
            bytes: 0,
            digest: blake3::Hasher::new().finalize().into(),
        });
        assert_eq!(summary.get(Direction::Received).bytes, 4);
    }
}
