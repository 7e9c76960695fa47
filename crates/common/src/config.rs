//! Protocol config and config utilities.

use core::fmt;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{error::Error, sync::LazyLock};

/// Default for the maximum number of bytes that can be sent.
pub const DEFAULT_MAX_SENT_LIMIT: usize = 1 << 12;
/// Default for the maximum number of bytes that can be received.
pub const DEFAULT_MAX_RECV_LIMIT: usize = 1 << 14;

// Current version that is running.
static VERSION: LazyLock<Version> = LazyLock::new(|| {
    Version::parse(env!("CARGO_PKG_VERSION"))
        .map_err(|err| ProtocolConfigError::new(ErrorKind::Version, err))
        .unwrap()
});

/// Protocol configuration to be set up initially by prover and verifier.
#[derive(derive_builder::Builder, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct ProtocolConfig {
    /// Maximum number of bytes that can be sent.
    #[builder(default = "DEFAULT_MAX_SENT_LIMIT")]
    max_sent_data: usize,
    /// Maximum number of bytes that can be received.
    #[builder(default = "DEFAULT_MAX_RECV_LIMIT")]
    max_recv_data: usize,
    /// Version that is being run by prover/verifier.
    #[builder(setter(skip), default = "VERSION.clone()")]
    version: Version,
}

impl ProtocolConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_sent_data == Some(0) || self.max_recv_data == Some(0) {
            return Err("transcript limits must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_sent_data: DEFAULT_MAX_SENT_LIMIT,
            max_recv_data: DEFAULT_MAX_RECV_LIMIT,
            version: VERSION.clone(),
        }
    }
}

impl ProtocolConfig {
    /// Creates a new builder for `ProtocolConfig`.
    pub fn builder() -> ProtocolConfigBuilder {
        ProtocolConfigBuilder::default()
    }

    /// Returns the maximum number of bytes that can be sent.
    pub fn max_sent_data(&self) -> usize {
        self.max_sent_data
    }

    /// Returns the maximum number of bytes that can be received.
    pub fn max_recv_data(&self) -> usize {
        self.max_recv_data
    }

    /// Returns the protocol version.
    pub fn version(&self) -> &Version {
        &self.version
    }
}

/// Protocol configuration validator used by checker (i.e. notary) to perform
/// compatibility check with the peer's (i.e. the prover's) configuration.
#[derive(derive_builder::Builder, Clone, Debug)]
pub struct ProtocolConfigValidator {
    /// Maximum number of bytes that can be sent.
    max_sent_data: usize,
    /// Maximum number of bytes that can be received.
    max_recv_data: usize,
    /// Version that is being run by checker.
    #[builder(setter(skip), default = "VERSION.clone()")]
    version: Version,
}

impl ProtocolConfigValidator {
    /// Creates a new builder for `ProtocolConfigValidator`.
    pub fn builder() -> ProtocolConfigValidatorBuilder {
        ProtocolConfigValidatorBuilder::default()
    }

    /// Returns the maximum number of bytes that can be sent.
    pub fn max_sent_data(&self) -> usize {
        self.max_sent_data
    }

    /// Returns the maximum number of bytes that can be received.
    pub fn max_recv_data(&self) -> usize {
        self.max_recv_data
    }

    /// Performs compatibility check of the protocol configuration between
    /// prover and notary.
    pub fn validate(&self, config: &ProtocolConfig) -> Result<(), ProtocolConfigError> {
        self.check_max_transcript_size(config.max_sent_data, config.max_recv_data)?;
        self.check_version(&config.version)?;
        Ok(())
    }

    // Checks if both the sent and recv data are within limits.
    fn check_max_transcript_size(
        &self,
        max_sent_data: usize,
        max_recv_data: usize,
    ) -> Result<(), ProtocolConfigError> {
        if max_sent_data > self.max_sent_data {
            return Err(ProtocolConfigError::max_transcript_size(format!(
                "max_sent_data {:?} is greater than the configured limit {:?}",
                max_sent_data, self.max_sent_data,
            )));
        }

        if max_recv_data > self.max_recv_data {
            return Err(ProtocolConfigError::max_transcript_size(format!(
                "max_recv_data {:?} is greater than the configured limit {:?}",
                max_recv_data, self.max_recv_data,
            )));
        }

        Ok(())
    }

    // Versions are compatible if they agree on major and minor, and on the
    // pre-release tag while in alpha.
    fn check_version(&self, peer_version: &Version) -> Result<(), ProtocolConfigError> {
        if peer_version.major != self.version.major
            || peer_version.minor != self.version.minor
            || peer_version.pre != self.version.pre
        {
            return Err(ProtocolConfigError::version(format!(
                "prover's version {} is incompatible with notary's version {}",
                peer_version, self.version
            )));
        }

        Ok(())
    }
}

/// A ProtocolConfig error.
#[derive(thiserror::Error, Debug)]
pub struct ProtocolConfigError {
    kind: ErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ProtocolConfigError {
    fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    fn max_transcript_size(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MaxTranscriptSize, msg.into())
    }

    fn version(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Version, msg.into())
    }
}

impl fmt::Display for ProtocolConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::MaxTranscriptSize => write!(f, "max transcript size error")?,
            ErrorKind::Version => write!(f, "version error")?,
        }

        if let Some(ref source) = self.source {
            write!(f, " caused by: {}", source)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
enum ErrorKind {
    MaxTranscriptSize,
    Version,
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::{fixture, rstest};

    const TEST_MAX_SENT_LIMIT: usize = 1 << 12;
    const TEST_MAX_RECV_LIMIT: usize = 1 << 14;

    #[fixture]
    #[once]
    fn config_validator() -> ProtocolConfigValidator {
        ProtocolConfigValidator::builder()
            .max_sent_data(TEST_MAX_SENT_LIMIT)
            .max_recv_data(TEST_MAX_RECV_LIMIT)
            .build()
            .unwrap()
    }

    #[rstest]
    #[case::same_max_sent_recv_data(TEST_MAX_SENT_LIMIT, TEST_MAX_RECV_LIMIT)]
    #[case::smaller_max_sent_data(1 << 11, TEST_MAX_RECV_LIMIT)]
    #[case::smaller_max_recv_data(TEST_MAX_SENT_LIMIT, 1 << 13)]
    #[case::smaller_max_sent_recv_data(1 << 7, 1 << 9)]
    fn test_check_success(
        config_validator: &ProtocolConfigValidator,
        #[case] max_sent_data: usize,
        #[case] max_recv_data: usize,
    ) {
        let peer_config = ProtocolConfig::builder()
            .max_sent_data(max_sent_data)
            .max_recv_data(max_recv_data)
            .build()
            .unwrap();

        assert!(config_validator.validate(&peer_config).is_ok())
    }

    #[rstest]
    #[case::bigger_max_sent_data(1 << 13, TEST_MAX_RECV_LIMIT)]
    #[case::bigger_max_recv_data(1 << 10, 1 << 16)]
    #[case::bigger_max_sent_recv_data(1 << 14, 1 << 21)]
    fn test_check_fail(
        config_validator: &ProtocolConfigValidator,
        #[case] max_sent_data: usize,
        #[case] max_recv_data: usize,
    ) {
        let peer_config = ProtocolConfig::builder()
            .max_sent_data(max_sent_data)
            .max_recv_data(max_recv_data)
            .build()
            .unwrap();

        assert!(config_validator.validate(&peer_config).is_err())
    }

    #[rstest]
    fn test_check_version_mismatch(config_validator: &ProtocolConfigValidator) {
        let mut peer_config = ProtocolConfig::default();
        peer_config.version = Version::new(peer_config.version.major + 1, 0, 0);

        assert!(config_validator.validate(&peer_config).is_err())
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        assert!(ProtocolConfig::builder().max_sent_data(0).build().is_err());
    }
}
