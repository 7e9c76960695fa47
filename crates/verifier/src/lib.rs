//! Notary side of a notarized TLS session.
//!
//! The [`Verifier`] receives an authenticated copy of every ciphertext frame
//! the Prover exchanges with the server. It reads the server name from the
//! ClientHello, keeps a running summary of the ciphertext, and once the
//! connection is closed signs an attestation binding the Prover's transcript
//! commitment to what it observed.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

pub(crate) mod config;
mod error;
mod notarize;
mod sni;
pub mod state;

pub use config::{VerifierConfig, VerifierConfigBuilder, VerifierConfigBuilderError};
pub use error::VerifierError;

use serde::Serialize;
use tlsproof_common::{
    channel::Channel,
    error::PeerError,
    mirror::KeyShare,
    msgs::{MirrorAck, NotaryMessage, ProverMessage, SetupRequest, SetupResponse},
    Io, IoChannel,
};
use tlsproof_core::{
    attestation::{Attestation, AttestationConfig},
    connection::{CiphertextObserver, ServerName},
    transcript::Direction,
};
use web_time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, info_span, instrument, trace, warn, Span};

/// Ciphertext a direction may carry on top of its plaintext limit, covering
/// the handshake and record overhead.
pub const CIPHERTEXT_ALLOWANCE: usize = 1 << 16;

/// A Verifier instance.
pub struct Verifier<T: state::VerifierState = state::Initialized> {
    config: VerifierConfig,
    span: Span,
    state: T,
}

impl Verifier<state::Initialized> {
    /// Creates a new verifier.
    pub fn new(config: VerifierConfig) -> Self {
        let span = info_span!("verifier");
        Self {
            config,
            span,
            state: state::Initialized,
        }
    }

    /// Sets up the verifier.
    ///
    /// Checks the Prover's protocol configuration and agrees on the key which
    /// authenticates mirrored frames.
    ///
    /// # Arguments
    ///
    /// * `socket` - The socket to the prover.
    #[instrument(parent = &self.span, level = "info", skip_all, err)]
    pub async fn setup<S: Io>(self, socket: S) -> Result<Verifier<state::Setup>, VerifierError> {
        let mut channel: IoChannel = Channel::new(Box::new(socket) as Box<dyn Io>);

        let request: SetupRequest = channel.recv().await?;

        if let Err(err) = self
            .config
            .protocol_config_validator()
            .validate(&request.config)
        {
            let rejection = SetupResponse::Rejected(PeerError::from(&err));
            return Err(reject(&mut channel, &rejection, err.into()).await);
        }

        let server_name = match ServerName::try_from(request.server_name.as_str()) {
            Ok(server_name) => server_name,
            Err(err) => {
                let rejection = SetupResponse::Rejected(PeerError::server_name(err.to_string()));
                return Err(reject(&mut channel, &rejection, VerifierError::server_name(err)).await);
            }
        };

        let share = KeyShare::random();
        let key_share = share.public_key();
        let key = match share.derive(
            &request.key_share,
            &request.key_share,
            &key_share,
            server_name.as_str(),
        ) {
            Ok(key) => key,
            Err(err) => {
                let rejection = SetupResponse::Rejected(PeerError::unexpected(err.to_string()));
                return Err(reject(&mut channel, &rejection, VerifierError::protocol(err)).await);
            }
        };

        channel
            .send(&SetupResponse::Accepted { key_share })
            .await?;

        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(VerifierError::protocol)?
            .as_secs();

        debug!("setup complete for {server_name}");

        Ok(Verifier {
            config: self.config,
            span: self.span,
            state: state::Setup {
                channel,
                key,
                protocol_config: request.config,
                server_name,
                start_time,
            },
        })
    }

    /// Runs the verifier to completion and attests to the TLS session.
    ///
    /// This is a convenience method which runs all the steps needed for
    /// notarization.
    ///
    /// # Arguments
    ///
    /// * `socket` - The socket to the prover.
    /// * `config` - The attestation configuration.
    #[instrument(parent = &self.span, level = "info", skip_all, err)]
    pub async fn notarize<S: Io>(
        self,
        socket: S,
        config: &AttestationConfig,
    ) -> Result<Attestation, VerifierError> {
        self.setup(socket).await?.run().await?.notarize(config).await
    }
}

impl Verifier<state::Setup> {
    /// Follows the Prover's TLS connection until it is closed.
    ///
    /// Every frame is checked for its sequence number and tag before it is
    /// acknowledged. Any mismatch aborts the session.
    #[instrument(parent = &self.span, level = "info", skip_all, err)]
    pub async fn run(self) -> Result<Verifier<state::Closed>, VerifierError> {
        let state::Setup {
            mut channel,
            key,
            protocol_config,
            server_name,
            start_time,
        } = self.state;

        let limit = |direction: Direction| {
            let max = match direction {
                Direction::Sent => protocol_config.max_sent_data(),
                Direction::Received => protocol_config.max_recv_data(),
            };
            (max + CIPHERTEXT_ALLOWANCE) as u64
        };

        let mut observer = CiphertextObserver::new();
        let mut client_hello = sni::ClientHelloBuffer::default();
        let mut observed_name: Option<ServerName> = None;
        let mut next_seq = 0u64;

        let summary = loop {
            let frame = match channel.recv::<ProverMessage>().await? {
                ProverMessage::Frame(frame) => frame,
                ProverMessage::Close(close) => {
                    let summary = observer.summary();

                    if close.frames != next_seq || close.summary != summary {
                        let err = format!(
                            "prover reported {} frames, notary observed {next_seq}",
                            close.frames
                        );
                        let rejection = NotaryMessage::Rejection(PeerError::desync(
                            "ciphertext summaries differ",
                        ));
                        return Err(
                            reject(&mut channel, &rejection, VerifierError::desync(err)).await,
                        );
                    }

                    if observed_name.is_none() {
                        let rejection = NotaryMessage::Rejection(PeerError::server_name(
                            "no ClientHello was observed",
                        ));
                        return Err(reject(
                            &mut channel,
                            &rejection,
                            VerifierError::server_name("no ClientHello was observed"),
                        )
                        .await);
                    }

                    break summary;
                }
                ProverMessage::Request(_) => {
                    let rejection = NotaryMessage::Rejection(PeerError::unexpected(
                        "attestation request before the connection was closed",
                    ));
                    return Err(reject(
                        &mut channel,
                        &rejection,
                        VerifierError::protocol("unexpected attestation request"),
                    )
                    .await);
                }
            };

            if frame.seq != next_seq {
                let err = format!("expected frame {next_seq}, got {}", frame.seq);
                let rejection = NotaryMessage::Rejection(PeerError::desync(err.clone()));
                return Err(reject(&mut channel, &rejection, VerifierError::desync(err)).await);
            }

            if !key.verify(&frame) {
                let err = format!("invalid tag on frame {}", frame.seq);
                let rejection = NotaryMessage::Rejection(PeerError::desync(err.clone()));
                return Err(reject(&mut channel, &rejection, VerifierError::desync(err)).await);
            }

            if observer.bytes(frame.direction) + frame.data.len() as u64 > limit(frame.direction) {
                let err = format!("{} ciphertext exceeds the configured limit", frame.direction);
                let rejection = NotaryMessage::Rejection(PeerError::limit(err.clone()));
                return Err(reject(&mut channel, &rejection, VerifierError::limit(err)).await);
            }

            observer.observe(frame.direction, &frame.data);

            if observed_name.is_none() {
                let result = match frame.direction {
                    Direction::Sent => client_hello
                        .push(&frame.data)
                        .map_err(|err| err.to_string()),
                    Direction::Received => {
                        Err("server data arrived before the ClientHello".to_string())
                    }
                };

                let name = result.and_then(|name| {
                    name.map(|name| {
                        ServerName::try_from(name.as_str()).map_err(|err| err.to_string())
                    })
                    .transpose()
                });

                match name {
                    Ok(Some(name)) if name == server_name => {
                        debug!("observed server name {name}");
                        observed_name = Some(name);
                    }
                    Ok(Some(name)) => {
                        let err = format!("ClientHello names {name}, expected {server_name}");
                        let rejection =
                            NotaryMessage::Rejection(PeerError::server_name(err.clone()));
                        return Err(
                            reject(&mut channel, &rejection, VerifierError::server_name(err))
                                .await,
                        );
                    }
                    Ok(None) => {}
                    Err(err) => {
                        let rejection =
                            NotaryMessage::Rejection(PeerError::server_name(err.clone()));
                        return Err(
                            reject(&mut channel, &rejection, VerifierError::server_name(err))
                                .await,
                        );
                    }
                }
            }

            trace!(
                "acknowledging {} frame {}: {} bytes",
                frame.direction,
                frame.seq,
                frame.data.len()
            );

            channel
                .send(&NotaryMessage::Ack(MirrorAck { seq: frame.seq }))
                .await?;
            next_seq += 1;
        };

        channel.send(&NotaryMessage::Summary(summary)).await?;

        info!(
            "connection closed after {next_seq} frames, sent {} bytes, received {} bytes",
            summary.sent.bytes, summary.received.bytes
        );

        Ok(Verifier {
            config: self.config,
            span: self.span,
            state: state::Closed {
                channel,
                server_name,
                start_time,
                summary,
            },
        })
    }
}

/// Sends a rejection to the Prover, returning the local error.
async fn reject<M: Serialize>(
    channel: &mut IoChannel,
    rejection: &M,
    err: VerifierError,
) -> VerifierError {
    warn!("aborting session: {err}");

    if let Err(send_err) = channel.send(rejection).await {
        debug!("failed to notify prover: {send_err}");
    }

    err
}
