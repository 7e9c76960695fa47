//! Signing of attestations.

use tlsproof_common::{
    error::PeerError,
    msgs::{NotaryMessage, ProverMessage},
};
use tlsproof_core::attestation::{Attestation, AttestationConfig};
use tracing::{info, instrument};

use crate::{reject, state::Closed, Verifier, VerifierError};

impl Verifier<Closed> {
    /// Receives the Prover's attestation request and answers it with a signed
    /// attestation.
    ///
    /// The request is only accepted if it names the server observed in the
    /// ClientHello and its transcript fits in the observed ciphertext.
    ///
    /// # Arguments
    ///
    /// * `config` - The attestation configuration.
    #[instrument(parent = &self.span, level = "info", skip_all, err)]
    pub async fn notarize(self, config: &AttestationConfig) -> Result<Attestation, VerifierError> {
        let Closed {
            mut channel,
            server_name,
            start_time,
            summary,
        } = self.state;

        let request = match channel.recv::<ProverMessage>().await? {
            ProverMessage::Request(request) => request,
            _ => {
                let rejection =
                    NotaryMessage::Rejection(PeerError::unexpected("expected attestation request"));
                return Err(reject(
                    &mut channel,
                    &rejection,
                    VerifierError::protocol("expected attestation request"),
                )
                .await);
            }
        };

        let attestation = Attestation::builder(config)
            .accept_request(request)
            .and_then(|mut builder| {
                builder
                    .connection_time(start_time)
                    .observed_server_name(server_name)
                    .ciphertext_summary(summary);

                builder.build(self.config.crypto_provider())
            });

        let attestation = match attestation {
            Ok(attestation) => attestation,
            Err(err) => {
                let rejection = NotaryMessage::Rejection(PeerError::attestation(err.to_string()));
                return Err(reject(&mut channel, &rejection, VerifierError::attestation(err)).await);
            }
        };

        channel
            .send(&NotaryMessage::Attestation(attestation.clone()))
            .await?;
        channel.close().await?;

        info!("sent attestation {}", hex::encode(attestation.header.id.0));

        Ok(attestation)
    }
}
