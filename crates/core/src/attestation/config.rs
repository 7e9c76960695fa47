use crate::{hash::HashAlgId, signing::SignatureAlgId};

const DEFAULT_SUPPORTED_HASH_ALGS: &[HashAlgId] = &[HashAlgId::SHA256, HashAlgId::BLAKE3];

/// Error for [`AttestationConfig`].
#[derive(Debug, thiserror::Error)]
#[error("attestation config error: {reason}")]
pub struct AttestationConfigError {
    reason: String,
}

/// Attestation configuration of a Notary.
#[derive(Debug, Clone)]
pub struct AttestationConfig {
    supported_signature_algs: Vec<SignatureAlgId>,
    supported_hash_algs: Vec<HashAlgId>,
}

impl AttestationConfig {
    /// Creates a new builder.
    pub fn builder() -> AttestationConfigBuilder {
        AttestationConfigBuilder::default()
    }

    /// Returns the supported signature algorithms.
    pub fn supported_signature_algs(&self) -> &[SignatureAlgId] {
        &self.supported_signature_algs
    }

    /// Returns the supported hash algorithms.
    pub fn supported_hash_algs(&self) -> &[HashAlgId] {
        &self.supported_hash_algs
    }
}

/// Builder for [`AttestationConfig`].
#[derive(Debug)]
pub struct AttestationConfigBuilder {
    supported_signature_algs: Vec<SignatureAlgId>,
    supported_hash_algs: Vec<HashAlgId>,
}

impl Default for AttestationConfigBuilder {
    fn default() -> Self {
        Self {
            supported_signature_algs: Vec::default(),
            supported_hash_algs: DEFAULT_SUPPORTED_HASH_ALGS.to_vec(),
        }
    }
}

impl AttestationConfigBuilder {
    /// Sets the supported signature algorithms.
    pub fn supported_signature_algs(
        &mut self,
        supported_signature_algs: impl Into<Vec<SignatureAlgId>>,
    ) -> &mut Self {
        self.supported_signature_algs = supported_signature_algs.into();
        self
    }

    /// Sets the supported hash algorithms.
    pub fn supported_hash_algs(
        &mut self,
        supported_hash_algs: impl Into<Vec<HashAlgId>>,
    ) -> &mut Self {
        self.supported_hash_algs = supported_hash_algs.into();
        self
    }

    /// Builds the configuration.
    pub fn build(&self) -> Result<AttestationConfig, AttestationConfigError> {
        if self.supported_signature_algs.is_empty() {
            return Err(AttestationConfigError {
                reason: "at least one signature algorithm must be supported".to_string(),
            });
        }

        if self.supported_hash_algs.is_empty() {
            return Err(AttestationConfigError {
                reason: "at least one hash algorithm must be supported".to_string(),
            });
        }

        Ok(AttestationConfig {
            supported_signature_algs: self.supported_signature_algs.clone(),
            supported_hash_algs: self.supported_hash_algs.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_signature_alg() {
        assert!(AttestationConfig::builder().build().is_err());
        assert!(AttestationConfig::builder()
            .supported_signature_algs([SignatureAlgId::SECP256K1])
            .build()
            .is_ok());
    }
}
