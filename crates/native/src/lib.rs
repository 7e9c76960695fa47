//! Entry point producing notarized TLS proofs.
//!
//! [`prove`] connects to a hosted Notary and to a server, fetches one
//! resource over HTTPS and returns the serialized proof artifact. The call
//! blocks the current thread.
//!
//! [`prove_notarized_with`] also returns the serialized [`Notarization`], from
//! which [`disclose`] builds artifacts with other policies later.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

mod dialer;
mod error;
mod options;

pub use dialer::NotaryDialer;
pub use error::{Error, ErrorKind};
pub use options::{ProveOptions, ProveOptionsBuilder, ProveOptionsBuilderError};
pub use tlsproof_prover::session::{DialError, Dialer, SessionTimeouts};

use tlsproof_common::config::ProtocolConfig;
use tlsproof_core::{
    artifact::ProofArtifact, connection::ServerName, disclosure::DisclosurePolicy, Notarization,
};
use tlsproof_prover::{
    session::{SessionConfig, SessionRunner},
    ProverConfig,
};
use tracing::{info, warn};

/// Proves the response of `GET https://<domain><uri>`, notarized by
/// `hosted_notary`, and returns the serialized artifact.
///
/// The Notary is reached over TLS on port 443 and the server on port 443.
/// Use [`prove_with`] for other settings.
pub fn prove(hosted_notary: &str, domain: &str, uri: &str) -> Result<Vec<u8>, Error> {
    let options = ProveOptions::builder()
        .notary_host(hosted_notary)
        .domain(domain)
        .uri(uri)
        .build()
        .map_err(Error::invalid_input)?;

    let dialer = NotaryDialer::new(&options)?;

    prove_with(&options, &dialer)
}

/// Proves with the given options, opening the connections with `dialer`.
///
/// Blocks the current thread, which must not be driving an async runtime.
pub fn prove_with(options: &ProveOptions, dialer: &dyn Dialer) -> Result<Vec<u8>, Error> {
    runtime()?.block_on(prove_async(options, dialer))
}

/// Async variant of [`prove_with`], for callers with their own runtime.
pub async fn prove_async(options: &ProveOptions, dialer: &dyn Dialer) -> Result<Vec<u8>, Error> {
    run(options, dialer).await.map(|(bytes, _)| bytes)
}

/// Output of [`prove_notarized_with`].
#[derive(Debug, Clone)]
pub struct NotarizedProof {
    /// The serialized proof artifact.
    pub artifact: Vec<u8>,
    /// The serialized notarization. It opens the whole transcript and must be
    /// kept private.
    pub notarization: Vec<u8>,
}

/// Like [`prove_with`], also returning the notarization the artifact was
/// built from.
pub fn prove_notarized_with(
    options: &ProveOptions,
    dialer: &dyn Dialer,
) -> Result<NotarizedProof, Error> {
    runtime()?.block_on(prove_notarized_async(options, dialer))
}

/// Async variant of [`prove_notarized_with`].
pub async fn prove_notarized_async(
    options: &ProveOptions,
    dialer: &dyn Dialer,
) -> Result<NotarizedProof, Error> {
    let (artifact, notarization) = run(options, dialer).await?;

    Ok(NotarizedProof {
        artifact,
        notarization: notarization.serialize(),
    })
}

/// Builds a serialized artifact disclosing the bytes of `policy` from a
/// serialized notarization.
pub fn disclose(notarization: &[u8], policy: &DisclosurePolicy) -> Result<Vec<u8>, Error> {
    let notarization = Notarization::deserialize(notarization)?;
    let artifact = notarization.disclose(policy)?;

    Ok(artifact.serialize())
}

fn runtime() -> Result<tokio::runtime::Runtime, Error> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| Error::new(ErrorKind::Runtime, err))
}

async fn run(
    options: &ProveOptions,
    dialer: &dyn Dialer,
) -> Result<(Vec<u8>, Notarization), Error> {
    let config = session_config(options)?;
    let mut runner = SessionRunner::new(config);

    let (artifact, notarization) = match runner.run_notarized(dialer).await {
        Ok(output) => output,
        Err(err) => {
            warn!(
                domain = options.domain(),
                state = %runner.session().state(),
                "proof failed: {err}"
            );
            return Err(err.into());
        }
    };

    let bytes = artifact.serialize();
    check(options, &artifact, &bytes)?;

    info!(
        domain = options.domain(),
        uri = options.uri(),
        "artifact of {} bytes",
        bytes.len()
    );

    Ok((bytes, notarization))
}

fn session_config(options: &ProveOptions) -> Result<SessionConfig, Error> {
    let server_name = ServerName::try_from(options.domain.as_str()).map_err(Error::invalid_input)?;

    if !options.uri.starts_with('/') {
        return Err(Error::invalid_input(format!(
            "request target must start with '/': {}",
            options.uri
        )));
    }

    let protocol_config = ProtocolConfig::builder()
        .max_sent_data(options.max_sent_data)
        .max_recv_data(options.max_recv_data)
        .build()
        .map_err(Error::invalid_input)?;

    let mut prover = ProverConfig::builder();
    prover
        .server_name(server_name)
        .protocol_config(protocol_config)
        .root_store(options.root_store.clone());
    if let Some(key) = &options.notary_key {
        prover.notary_key(key.clone());
    }
    let prover = prover.build().map_err(Error::invalid_input)?;

    let mut config = SessionConfig::builder();
    config
        .prover(prover)
        .uri(options.uri.as_str())
        .port(options.port)
        .notary_host(options.notary_host.as_str())
        .timeouts(options.timeouts);
    if let Some(policy) = &options.policy {
        config.policy(policy.clone());
    }

    config.build().map_err(Error::invalid_input)
}

/// Verifies the artifact as a third party would before handing it out.
fn check(options: &ProveOptions, artifact: &ProofArtifact, bytes: &[u8]) -> Result<(), Error> {
    let key = options
        .notary_key
        .clone()
        .unwrap_or_else(|| artifact.attestation.body.verifying_key().clone());

    // A custom policy may redact the request line.
    if options.policy.is_some() {
        tlsproof_core::verify(bytes, &key, &options.domain)?;
    } else {
        tlsproof_core::verify_with_uri(bytes, &key, &options.domain, &options.uri)?;
    }

    Ok(())
}
