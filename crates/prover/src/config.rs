use std::sync::Arc;

use tlsproof_common::config::ProtocolConfig;
use tlsproof_core::{
    connection::ServerName, request::RequestConfig, signing::VerifyingKey, CryptoProvider,
};
use tokio_rustls::rustls::{OwnedTrustAnchor, RootCertStore};

/// Configuration for the prover.
#[derive(Debug, Clone, derive_builder::Builder)]
pub struct ProverConfig {
    /// The server DNS name.
    #[builder(setter(into))]
    server_name: ServerName,
    /// Protocol configuration to be checked with the verifier.
    #[builder(default)]
    protocol_config: ProtocolConfig,
    /// Configuration of the attestation request.
    #[builder(default)]
    request_config: RequestConfig,
    /// Cryptography provider.
    #[builder(default, setter(into))]
    crypto_provider: Arc<CryptoProvider>,
    /// Root certificates trusted for the connection with the server.
    #[builder(default = "Arc::new(default_root_store())", setter(into))]
    root_store: Arc<RootCertStore>,
    /// Key the Notary is expected to sign with.
    ///
    /// If not set, the attestation is only checked against the key it names.
    #[builder(default, setter(strip_option))]
    notary_key: Option<VerifyingKey>,
}

impl ProverConfig {
    /// Creates a new builder for `ProverConfig`.
    pub fn builder() -> ProverConfigBuilder {
        ProverConfigBuilder::default()
    }

    /// Returns the server DNS name.
    pub fn server_name(&self) -> &ServerName {
        &self.server_name
    }

    /// Returns the protocol configuration.
    pub fn protocol_config(&self) -> &ProtocolConfig {
        &self.protocol_config
    }

    /// Returns the attestation request configuration.
    pub fn request_config(&self) -> &RequestConfig {
        &self.request_config
    }

    /// Returns the crypto provider.
    pub fn crypto_provider(&self) -> &CryptoProvider {
        &self.crypto_provider
    }

    /// Returns the root certificates trusted for the server connection.
    pub fn root_store(&self) -> &RootCertStore {
        &self.root_store
    }

    /// Returns the key the Notary is expected to sign with.
    pub fn notary_key(&self) -> Option<&VerifyingKey> {
        self.notary_key.as_ref()
    }
}

/// Default root store using mozilla certs.
pub fn default_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject.as_ref(),
            ta.subject_public_key_info.as_ref(),
            ta.name_constraints.as_ref().map(|nc| nc.as_ref()),
        )
    }));

    root_store
}
