use std::sync::Arc;

use tlsproof_common::config::{DEFAULT_MAX_RECV_LIMIT, DEFAULT_MAX_SENT_LIMIT};
use tlsproof_core::{disclosure::DisclosurePolicy, signing::VerifyingKey};
use tlsproof_prover::{default_root_store, session::SessionTimeouts};
use tokio_rustls::rustls::RootCertStore;

/// Options of a proof run.
#[derive(Debug, Clone, derive_builder::Builder)]
pub struct ProveOptions {
    /// Host of the Notary.
    #[builder(setter(into))]
    pub(crate) notary_host: String,
    /// Port of the Notary.
    #[builder(default = "443")]
    pub(crate) notary_port: u16,
    /// Whether the Notary is reached over TLS.
    #[builder(default = "true")]
    pub(crate) notary_tls: bool,
    /// URL path prefix of the Notary API.
    #[builder(default, setter(into))]
    pub(crate) notary_path_prefix: String,
    /// Roots trusted for the TLS connection with the Notary.
    #[builder(default = "default_root_store()")]
    pub(crate) notary_root_store: RootCertStore,
    /// Key the Notary is expected to sign with. Without it the attestation
    /// is checked against the key it names.
    #[builder(default, setter(strip_option))]
    pub(crate) notary_key: Option<VerifyingKey>,
    /// Domain of the server.
    #[builder(setter(into))]
    pub(crate) domain: String,
    /// Port of the server.
    #[builder(default = "443")]
    pub(crate) port: u16,
    /// Target of the request, starting with `/`.
    #[builder(setter(into))]
    pub(crate) uri: String,
    /// Roots trusted for the TLS connection with the server.
    #[builder(default = "Arc::new(default_root_store())", setter(into))]
    pub(crate) root_store: Arc<RootCertStore>,
    /// Maximum number of bytes that can be sent to the server.
    #[builder(default = "DEFAULT_MAX_SENT_LIMIT")]
    pub(crate) max_sent_data: usize,
    /// Maximum number of bytes that can be received from the server.
    #[builder(default = "DEFAULT_MAX_RECV_LIMIT")]
    pub(crate) max_recv_data: usize,
    /// Timeouts of the session transitions.
    #[builder(default)]
    pub(crate) timeouts: SessionTimeouts,
    /// Disclosure policy, derived from the HTTP transcript if not set.
    #[builder(default, setter(strip_option))]
    pub(crate) policy: Option<DisclosurePolicy>,
}

impl ProveOptions {
    /// Creates a new builder for `ProveOptions`.
    pub fn builder() -> ProveOptionsBuilder {
        ProveOptionsBuilder::default()
    }

    /// Returns the Notary host.
    pub fn notary_host(&self) -> &str {
        &self.notary_host
    }

    /// Returns the server domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the request target.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the pinned Notary key, if any.
    pub fn notary_key(&self) -> Option<&VerifyingKey> {
        self.notary_key.as_ref()
    }
}
