//! This module handles the notarization phase of the prover.
//!
//! The prover commits to ranges of the transcript, sends the aggregate
//! commitment to the Notary and checks the returned attestation.

use tlsproof_common::msgs::{NotaryMessage, ProverMessage};
use tlsproof_core::{
    attestation::Attestation,
    commitment::CommitmentSecrets,
    request::AttestationRequest,
    transcript::{Transcript, TranscriptCommitConfig},
};
use tracing::{debug, instrument};

use crate::{
    state::{AwaitSignature, Notarize},
    Prover, ProverError,
};

impl Prover<Notarize> {
    /// Returns the transcript.
    pub fn transcript(&self) -> &Transcript {
        self.state.engine.transcript()
    }

    /// Commits to the ranges of a commit config, in addition to the record
    /// commitments made while the connection was open.
    ///
    /// # Arguments
    ///
    /// * `config` - The ranges to commit to.
    pub fn transcript_commit(&mut self, config: &TranscriptCommitConfig) -> Result<(), ProverError> {
        let leaves = self
            .state
            .engine
            .commit_config(config)
            .map_err(ProverError::policy_conflict)?;

        debug!("committed to {} ranges", leaves.len());

        Ok(())
    }

    /// Sends the aggregate commitment to the Notary.
    #[instrument(parent = &self.span, level = "debug", skip_all, err)]
    pub async fn send_request(self) -> Result<Prover<AwaitSignature>, ProverError> {
        let Notarize {
            mut channel,
            engine,
        } = self.state;

        let (commitment, secrets) = engine.close().map_err(ProverError::protocol)?;

        let mut builder = AttestationRequest::builder(self.config.request_config());
        builder
            .server_name(self.config.server_name().clone())
            .transcript_length(secrets.transcript().length())
            .transcript_commitment(commitment);
        let request = builder.build().map_err(ProverError::config)?;

        channel
            .send(&ProverMessage::Request(request.clone()))
            .await?;

        debug!("sent commitment over {} leaves", commitment.leaf_count);

        Ok(Prover {
            config: self.config,
            span: self.span,
            state: AwaitSignature {
                channel,
                request,
                secrets,
            },
        })
    }

    /// Finalizes the notarization, returning the attestation and the secrets
    /// needed to disclose parts of the transcript.
    ///
    /// This is a convenience method which sends the request and waits for the
    /// attestation.
    pub async fn finalize(self) -> Result<(Attestation, CommitmentSecrets), ProverError> {
        self.send_request().await?.receive_attestation().await
    }
}

impl Prover<AwaitSignature> {
    /// Waits for the Notary's attestation and checks it.
    ///
    /// The attestation must match the request and carry a valid signature by
    /// the configured Notary key, or by the key it names if none is
    /// configured.
    #[instrument(parent = &self.span, level = "debug", skip_all, err)]
    pub async fn receive_attestation(
        self,
    ) -> Result<(Attestation, CommitmentSecrets), ProverError> {
        let AwaitSignature {
            mut channel,
            request,
            secrets,
        } = self.state;

        let attestation = match channel.recv::<NotaryMessage>().await? {
            NotaryMessage::Attestation(attestation) => attestation,
            NotaryMessage::Rejection(err) => return Err(ProverError::rejected(err)),
            _ => return Err(ProverError::protocol("expected attestation")),
        };

        request
            .validate(&attestation)
            .map_err(ProverError::protocol)?;

        let key = self
            .config
            .notary_key()
            .unwrap_or_else(|| attestation.body.verifying_key());
        attestation
            .verify(self.config.crypto_provider(), key)
            .map_err(ProverError::protocol)?;

        if let Err(err) = channel.close().await {
            debug!("failed to close notary channel: {err}");
        }

        debug!("received valid attestation");

        Ok((attestation, secrets))
    }
}
