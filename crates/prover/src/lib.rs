//! Prover side of a notarized TLS session.
//!
//! The [`Prover`] connects to a server over TLS while mirroring every
//! ciphertext record to a Notary. It commits to the plaintext as it is
//! exchanged and, once the connection is closed, asks the Notary to sign the
//! aggregate commitment.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod future;
mod mirror;
mod notarize;
pub mod session;
mod splice;
pub mod state;

pub use config::{default_root_store, ProverConfig, ProverConfigBuilder, ProverConfigBuilderError};
pub use error::{ErrorKind, ProverError};
pub use future::ProverFuture;
pub use splice::TlsConnection;

use std::sync::Arc;

use rand::Rng;
use tlsproof_common::{
    channel::Channel,
    mirror::KeyShare,
    msgs::{SetupRequest, SetupResponse},
    Io, IoChannel,
};
use tlsproof_core::{commitment::CommitmentEngine, transcript::Transcript};
use tokio::sync::mpsc;
use tokio_rustls::{rustls, TlsConnector};

use tracing::{debug, info_span, instrument, Instrument, Span};

/// A prover instance.
#[derive(Debug)]
pub struct Prover<T: state::ProverState = state::Initialized> {
    config: ProverConfig,
    span: Span,
    state: T,
}

impl Prover<state::Initialized> {
    /// Creates a new prover.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the prover.
    pub fn new(config: ProverConfig) -> Self {
        let span = info_span!("prover");
        Self {
            config,
            span,
            state: state::Initialized,
        }
    }

    /// Sets up the prover.
    ///
    /// Sends the protocol configuration to the Notary and agrees on the key
    /// which authenticates mirrored frames.
    ///
    /// # Arguments
    ///
    /// * `socket` - The socket to the Notary.
    #[instrument(parent = &self.span, level = "debug", skip_all, err)]
    pub async fn setup<S: Io>(self, socket: S) -> Result<Prover<state::Setup>, ProverError> {
        let mut channel: IoChannel = Channel::new(Box::new(socket) as Box<dyn Io>);

        let server_name = self.config.server_name().as_str();
        let share = KeyShare::random();
        let prover_share = share.public_key();

        channel
            .send(&SetupRequest {
                config: self.config.protocol_config().clone(),
                server_name: server_name.to_string(),
                key_share: prover_share.clone(),
            })
            .await?;

        let notary_share = match channel.recv::<SetupResponse>().await? {
            SetupResponse::Accepted { key_share } => key_share,
            SetupResponse::Rejected(err) => return Err(ProverError::rejected(err)),
        };

        let key = share
            .derive(&notary_share, &prover_share, &notary_share, server_name)
            .map_err(ProverError::protocol)?;

        debug!("key exchange complete");

        Ok(Prover {
            config: self.config,
            span: self.span,
            state: state::Setup { channel, key },
        })
    }
}

impl Prover<state::Setup> {
    /// Connects to the server using the provided socket.
    ///
    /// Returns a handle to the TLS connection, a future which returns the
    /// prover once the connection is closed.
    ///
    /// # Arguments
    ///
    /// * `socket` - The socket to the server.
    #[instrument(parent = &self.span, level = "debug", skip_all, err)]
    pub async fn connect<S: Io>(
        self,
        socket: S,
    ) -> Result<(TlsConnection, ProverFuture), ProverError> {
        let state::Setup { mut channel, key } = self.state;

        let server_name = rustls::ServerName::try_from(self.config.server_name().as_str())
            .map_err(|_| {
                ProverError::config(format!(
                    "invalid server name: {}",
                    self.config.server_name()
                ))
            })?;

        let tls_config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(self.config.root_store().clone())
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));

        let hasher = self
            .config
            .crypto_provider()
            .hash
            .get_shared(self.config.request_config().hash_alg())
            .map_err(ProverError::config)?;
        let mut engine = CommitmentEngine::new(hasher, rand::rng().random());

        let (events_tx, events_rx) = mpsc::channel(splice::EVENT_CHANNEL_CAPACITY);
        let (app_io, conn_io) = tokio::io::duplex(splice::CONNECTION_BUFFER_SIZE);
        let tap = splice::CiphertextTap::new(socket, events_tx.clone());

        let fut = Box::pin({
            let span = self.span.clone();
            let config = self.config;
            async move {
                let conn_fut = async move {
                    let tls = connector
                        .connect(server_name, tap)
                        .await
                        .map_err(ProverError::connect)?;

                    debug!("handshake complete");

                    splice::bridge(tls, conn_io, events_tx).await
                };

                let mirror_fut = mirror::mirror(
                    &mut channel,
                    &key,
                    config.protocol_config(),
                    &mut engine,
                    events_rx,
                );

                futures::try_join!(conn_fut, mirror_fut)?;

                debug!(
                    "connection closed, sent {} bytes, received {} bytes",
                    engine.transcript().sent().len(),
                    engine.transcript().received().len()
                );

                Ok(Prover {
                    config,
                    span,
                    state: state::Closed { channel, engine },
                })
            }
            .instrument(self.span.clone())
        });

        Ok((TlsConnection::new(app_io), ProverFuture { fut }))
    }
}

impl Prover<state::Closed> {
    /// Returns the transcript.
    pub fn transcript(&self) -> &Transcript {
        self.state.engine.transcript()
    }

    /// Starts notarization of the TLS session.
    pub fn start_notarize(self) -> Prover<state::Notarize> {
        Prover {
            config: self.config,
            span: self.span,
            state: self.state.into(),
        }
    }
}
