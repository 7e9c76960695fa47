//! Complete proof runs.
//!
//! A [`SessionRunner`] drives one [`Session`] from `Idle` to `Signed`: it
//! dials the Notary and the server, fetches a single HTTP resource, requests
//! the attestation and builds the proof artifact. Every transition runs under
//! its own timeout and any failure aborts the session. Nothing is retried.

use std::{error::Error, future::Future, time::Duration};

use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::{body::Bytes, header, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tlsproof_common::Io;
use tlsproof_core::{
    artifact::ProofArtifact,
    disclosure::{http_commit_config, DisclosurePolicy},
    http::HttpTranscript,
    session::{AbortReason, Session, SessionState},
    transcript::TranscriptCommitConfig,
    Notarization,
};
use tracing::{debug, info, warn};

use crate::{state, Prover, ProverConfig, ProverError, TlsConnection};

/// Error returned by a [`Dialer`].
pub type DialError = Box<dyn Error + Send + Sync + 'static>;

/// Opens the transports of a session.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Opens the channel to the Notary.
    async fn notary(&self) -> Result<Box<dyn Io>, DialError>;

    /// Opens a TCP connection to the server.
    async fn server(&self, domain: &str, port: u16) -> Result<Box<dyn Io>, DialError>;
}

/// Timeouts of the session transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Time allowed to open the Notary channel.
    pub notary_connect: Duration,
    /// Time allowed for the key exchange.
    pub key_exchange: Duration,
    /// Time allowed for the TLS session with the server.
    pub session: Duration,
    /// Time allowed for each of sending the request and receiving the
    /// signature.
    pub signature: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            notary_connect: Duration::from_secs(30),
            key_exchange: Duration::from_secs(30),
            session: Duration::from_secs(120),
            signature: Duration::from_secs(60),
        }
    }
}

/// Configuration of a proof run.
#[derive(Debug, Clone, derive_builder::Builder)]
pub struct SessionConfig {
    /// Prover configuration, naming the server.
    prover: ProverConfig,
    /// Target of the request, starting with `/`.
    #[builder(setter(into))]
    uri: String,
    /// Port of the server.
    #[builder(default = "443")]
    port: u16,
    /// Host of the Notary, recorded in the session.
    #[builder(setter(into))]
    notary_host: String,
    /// Transition timeouts.
    #[builder(default)]
    timeouts: SessionTimeouts,
    /// Disclosure policy, derived from the HTTP transcript if not set.
    #[builder(default, setter(strip_option))]
    policy: Option<DisclosurePolicy>,
    /// Value of the `User-Agent` header.
    #[builder(default = "default_user_agent()", setter(into))]
    user_agent: String,
}

fn default_user_agent() -> String {
    format!("tlsproof/{}", env!("CARGO_PKG_VERSION"))
}

impl SessionConfig {
    /// Creates a new builder for `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Returns the prover configuration.
    pub fn prover(&self) -> &ProverConfig {
        &self.prover
    }

    /// Returns the request target.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the Notary host.
    pub fn notary_host(&self) -> &str {
        &self.notary_host
    }

    /// Returns the transition timeouts.
    pub fn timeouts(&self) -> &SessionTimeouts {
        &self.timeouts
    }

    /// Returns the disclosure policy, if set.
    pub fn policy(&self) -> Option<&DisclosurePolicy> {
        self.policy.as_ref()
    }
}

/// Runs a single proof session.
#[derive(Debug)]
pub struct SessionRunner {
    config: SessionConfig,
    session: Session,
}

impl SessionRunner {
    /// Creates a new runner with an idle session.
    pub fn new(config: SessionConfig) -> Self {
        let session = Session::new(
            config.prover.server_name().clone(),
            config.uri.clone(),
            config.notary_host.clone(),
        );

        Self { config, session }
    }

    /// Returns the session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Aborts an unfinished session after its run was dropped.
    pub fn cancel(&mut self) {
        if !self.session.state().is_terminal() {
            if let Err(err) = self.session.abort(AbortReason::Cancelled) {
                warn!("failed to record cancellation: {err}");
            }
        }
    }

    /// Runs the session to completion, returning the proof artifact.
    ///
    /// On failure the session ends in [`SessionState::Aborted`] with the
    /// reason matching the error. Dropping the returned future closes both
    /// connections and discards all commitments, [`SessionRunner::cancel`]
    /// then records the cancellation.
    pub async fn run(&mut self, dialer: &dyn Dialer) -> Result<ProofArtifact, ProverError> {
        self.run_notarized(dialer)
            .await
            .map(|(artifact, _)| artifact)
    }

    /// Runs the session to completion, returning the proof artifact and the
    /// notarization it was built from.
    ///
    /// The notarization can be saved to build artifacts with other disclosure
    /// policies later, see [`Notarization::disclose`].
    pub async fn run_notarized(
        &mut self,
        dialer: &dyn Dialer,
    ) -> Result<(ProofArtifact, Notarization), ProverError> {
        match self.run_inner(dialer).await {
            Ok(output) => {
                info!(
                    domain = %self.session.domain(),
                    uri = self.session.uri(),
                    "proof complete"
                );
                Ok(output)
            }
            Err(err) => {
                if let Err(transition) = self.session.abort(err.abort_reason()) {
                    warn!("failed after the session ended: {transition}");
                }
                Err(err)
            }
        }
    }

    async fn run_inner(
        &mut self,
        dialer: &dyn Dialer,
    ) -> Result<(ProofArtifact, Notarization), ProverError> {
        let timeouts = self.config.timeouts;

        let state = self.session.advance()?;
        let notary = step(state, timeouts.notary_connect, dialer.notary())
            .await?
            .map_err(ProverError::notary_unreachable)?;

        let state = self.session.advance()?;
        let prover = step(
            state,
            timeouts.key_exchange,
            Prover::new(self.config.prover.clone()).setup(notary),
        )
        .await??;

        let state = self.session.advance()?;
        let prover = step(
            state,
            timeouts.session,
            stream(&self.config, prover, dialer),
        )
        .await??;

        let state = self.session.advance()?;
        let mut prover = prover.start_notarize();

        let http = HttpTranscript::parse(prover.transcript());
        let policy = match (&self.config.policy, &http) {
            (Some(policy), _) => policy.clone(),
            (None, Ok(http)) => DisclosurePolicy::from_http(http),
            (None, Err(err)) => {
                return Err(ProverError::policy_conflict(format!(
                    "no policy given and the transcript is not HTTP: {err}"
                )))
            }
        };

        let mut builder = TranscriptCommitConfig::builder(prover.transcript());
        builder.hash_alg(*self.config.prover.request_config().hash_alg());
        if let Ok(http) = &http {
            http_commit_config(http, &mut builder).map_err(ProverError::policy_conflict)?;
        }
        policy
            .commit(&mut builder)
            .map_err(ProverError::policy_conflict)?;
        let commit_config = builder.build().map_err(ProverError::policy_conflict)?;
        prover.transcript_commit(&commit_config)?;

        let prover = step(state, timeouts.signature, prover.send_request()).await??;

        let state = self.session.advance()?;
        let (attestation, secrets) =
            step(state, timeouts.signature, prover.receive_attestation()).await??;

        self.session.advance()?;

        let notarization = Notarization::new(attestation, secrets);
        let artifact = notarization
            .disclose(&policy)
            .map_err(ProverError::policy_conflict)?;

        Ok((artifact, notarization))
    }
}

/// Runs a future under the timeout of a state.
async fn step<F: Future>(
    state: SessionState,
    timeout: Duration,
    fut: F,
) -> Result<F::Output, ProverError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ProverError::timeout(format!("{state} timed out after {timeout:?}")))
}

/// Connects to the server and fetches the resource.
async fn stream(
    config: &SessionConfig,
    prover: Prover<state::Setup>,
    dialer: &dyn Dialer,
) -> Result<Prover<state::Closed>, ProverError> {
    let domain = config.prover.server_name().as_str();

    let socket = dialer
        .server(domain, config.port)
        .await
        .map_err(ProverError::connect)?;

    let (conn, prover_fut) = prover.connect(socket).await?;

    let (_, prover) = futures::try_join!(fetch(conn, config), prover_fut)?;

    Ok(prover)
}

/// Sends a single `GET` request over the connection and reads the response.
async fn fetch(conn: TlsConnection, config: &SessionConfig) -> Result<(), ProverError> {
    if !config.uri.starts_with('/') {
        return Err(ProverError::config(format!(
            "request target must start with '/': {}",
            config.uri
        )));
    }

    let (mut request_sender, connection) =
        hyper::client::conn::http1::handshake(TokioIo::new(conn))
            .await
            .map_err(ProverError::connect)?;

    let request = Request::builder()
        .uri(config.uri.as_str())
        .header(header::HOST, config.prover.server_name().as_str())
        .header(header::ACCEPT, "*/*")
        .header(header::ACCEPT_ENCODING, "identity")
        .header(header::CONNECTION, "close")
        .header(header::USER_AGENT, config.user_agent.as_str())
        .body(Empty::<Bytes>::new())
        .map_err(ProverError::config)?;

    let response_fut = async {
        let response = request_sender
            .send_request(request)
            .await
            .map_err(ProverError::connect)?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(ProverError::connect)?
            .to_bytes();

        if status != StatusCode::OK {
            warn!("server responded with {status}");
        }
        debug!("received {} byte response body", body.len());

        Ok::<_, ProverError>(())
    };

    let connection_fut = async { connection.await.map_err(ProverError::connect) };

    futures::try_join!(connection_fut, response_fut)?;

    Ok(())
}
