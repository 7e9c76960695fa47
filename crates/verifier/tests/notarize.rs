use std::sync::Arc;

use tlsproof_common::{
    channel::Channel,
    config::{ProtocolConfig, ProtocolConfigValidator},
    mirror::{KeyShare, MirrorKey},
    msgs::{MirrorClose, NotaryMessage, ProverMessage, SetupRequest, SetupResponse},
    Io, IoChannel,
};
use tlsproof_core::{
    attestation::{Attestation, AttestationConfig},
    connection::{CiphertextObserver, ServerName, TranscriptLength},
    fixtures::{notary_signing_key, request_fixture},
    request::{AttestationRequest, RequestConfig},
    signing::SignatureAlgId,
    transcript::Direction,
    CryptoProvider,
};
use tlsproof_verifier::{Verifier, VerifierConfig, VerifierError, CIPHERTEXT_ALLOWANCE};
use tokio::{io::DuplexStream, task::JoinHandle};

const SERVER_NAME: &str = "www.example.com";

fn provider() -> CryptoProvider {
    let mut provider = CryptoProvider::default();
    provider
        .signer
        .set_secp256k1(&notary_signing_key())
        .unwrap();
    provider
}

fn verifier_config() -> VerifierConfig {
    VerifierConfig::builder()
        .protocol_config_validator(
            ProtocolConfigValidator::builder()
                .max_sent_data(1 << 12)
                .max_recv_data(1 << 14)
                .build()
                .unwrap(),
        )
        .crypto_provider(provider())
        .build()
        .unwrap()
}

fn attestation_config() -> AttestationConfig {
    AttestationConfig::builder()
        .supported_signature_algs([SignatureAlgId::SECP256K1])
        .build()
        .unwrap()
}

fn client_hello(server_name: &str) -> Vec<u8> {
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
    let server_name = rustls::ServerName::try_from(server_name).unwrap();
    let mut conn = rustls::ClientConnection::new(Arc::new(config), server_name).unwrap();

    let mut data = Vec::new();
    while conn.wants_write() {
        conn.write_tls(&mut data).unwrap();
    }
    data
}

fn spawn_notary(socket: DuplexStream) -> JoinHandle<Result<Attestation, VerifierError>> {
    tokio::spawn(async move {
        Verifier::new(verifier_config())
            .notarize(socket, &attestation_config())
            .await
    })
}

/// Plays the Prover's side of the protocol step by step.
struct ScriptedProver {
    channel: IoChannel,
    key: MirrorKey,
    observer: CiphertextObserver,
    seq: u64,
}

impl ScriptedProver {
    async fn setup(socket: DuplexStream, config: ProtocolConfig) -> Result<Self, SetupResponse> {
        let mut channel: IoChannel = Channel::new(Box::new(socket) as Box<dyn Io>);

        let share = KeyShare::random();
        let prover_share = share.public_key();
        channel
            .send(&SetupRequest {
                config,
                server_name: SERVER_NAME.to_string(),
                key_share: prover_share.clone(),
            })
            .await
            .unwrap();

        let notary_share = match channel.recv().await.unwrap() {
            SetupResponse::Accepted { key_share } => key_share,
            rejected => return Err(rejected),
        };

        let key = share
            .derive(&notary_share, &prover_share, &notary_share, SERVER_NAME)
            .unwrap();

        Ok(Self {
            channel,
            key,
            observer: CiphertextObserver::new(),
            seq: 0,
        })
    }

    async fn send_frame(&mut self, direction: Direction, data: Vec<u8>) -> NotaryMessage {
        self.observer.observe(direction, &data);
        let frame = self.key.frame(self.seq, direction, data);
        self.seq += 1;

        self.send(ProverMessage::Frame(frame)).await
    }

    async fn send(&mut self, msg: ProverMessage) -> NotaryMessage {
        self.channel.send(&msg).await.unwrap();
        self.channel.recv().await.unwrap()
    }

    async fn close(&mut self) -> NotaryMessage {
        let close = MirrorClose {
            frames: self.seq,
            summary: self.observer.summary(),
        };
        self.send(ProverMessage::Close(close)).await
    }
}

async fn accepted_session() -> (ScriptedProver, JoinHandle<Result<Attestation, VerifierError>>) {
    let (prover_socket, notary_socket) = tokio::io::duplex(1 << 16);
    let notary = spawn_notary(notary_socket);
    let prover = ScriptedProver::setup(prover_socket, ProtocolConfig::default())
        .await
        .unwrap();

    (prover, notary)
}

#[tokio::test]
async fn test_notarize() {
    let (mut prover, notary) = accepted_session().await;

    let reply = prover
        .send_frame(Direction::Sent, client_hello(SERVER_NAME))
        .await;
    assert!(matches!(reply, NotaryMessage::Ack(ack) if ack.seq == 0));

    let reply = prover.send_frame(Direction::Received, vec![0u8; 2048]).await;
    assert!(matches!(reply, NotaryMessage::Ack(ack) if ack.seq == 1));

    let reply = prover.send_frame(Direction::Sent, vec![1u8; 512]).await;
    assert!(matches!(reply, NotaryMessage::Ack(ack) if ack.seq == 2));

    let expected_summary = prover.observer.summary();
    let NotaryMessage::Summary(summary) = prover.close().await else {
        panic!("expected summary");
    };
    assert_eq!(summary, expected_summary);

    let fixture = request_fixture();
    let NotaryMessage::Attestation(attestation) =
        prover.send(ProverMessage::Request(fixture.request.clone())).await
    else {
        panic!("expected attestation");
    };

    let notary_attestation = notary.await.unwrap().unwrap();
    assert_eq!(attestation, notary_attestation);

    fixture.request.validate(&attestation).unwrap();
    assert_eq!(attestation.body.ciphertext_summary(), &expected_summary);
    assert_eq!(attestation.body.server_name().as_str(), SERVER_NAME);

    let provider = provider();
    let key = provider
        .signer
        .get(&SignatureAlgId::SECP256K1)
        .unwrap()
        .verifying_key();
    attestation.verify(&provider, &key).unwrap();
}

#[tokio::test]
async fn test_rejects_incompatible_config() {
    let (prover_socket, notary_socket) = tokio::io::duplex(1 << 16);
    let notary = spawn_notary(notary_socket);

    let config = ProtocolConfig::builder()
        .max_sent_data(1 << 20)
        .build()
        .unwrap();

    let Err(SetupResponse::Rejected(err)) = ScriptedProver::setup(prover_socket, config).await
    else {
        panic!("expected rejection");
    };
    assert!(err.is_config());

    assert!(notary.await.unwrap().unwrap_err().is_config());
}

#[tokio::test]
async fn test_rejects_other_server_name() {
    let (mut prover, notary) = accepted_session().await;

    let reply = prover
        .send_frame(Direction::Sent, client_hello("attacker.example.org"))
        .await;
    let NotaryMessage::Rejection(err) = reply else {
        panic!("expected rejection");
    };
    assert!(err.is_server_name());

    assert!(notary.await.unwrap().unwrap_err().is_server_name());
}

#[tokio::test]
async fn test_rejects_server_data_before_client_hello() {
    let (mut prover, notary) = accepted_session().await;

    let reply = prover.send_frame(Direction::Received, vec![0u8; 64]).await;
    assert!(matches!(reply, NotaryMessage::Rejection(err) if err.is_server_name()));

    assert!(notary.await.unwrap().unwrap_err().is_server_name());
}

#[tokio::test]
async fn test_rejects_out_of_order_frame() {
    let (mut prover, notary) = accepted_session().await;

    prover.seq = 1;
    let reply = prover
        .send_frame(Direction::Sent, client_hello(SERVER_NAME))
        .await;
    assert!(matches!(reply, NotaryMessage::Rejection(err) if err.is_desync()));

    assert!(notary.await.unwrap().unwrap_err().is_desync());
}

#[tokio::test]
async fn test_rejects_tampered_frame() {
    let (mut prover, notary) = accepted_session().await;

    let mut frame = prover
        .key
        .frame(0, Direction::Sent, client_hello(SERVER_NAME));
    frame.data[10] ^= 0xff;

    let reply = prover.send(ProverMessage::Frame(frame)).await;
    assert!(matches!(reply, NotaryMessage::Rejection(err) if err.is_desync()));

    assert!(notary.await.unwrap().unwrap_err().is_desync());
}

#[tokio::test]
async fn test_rejects_summary_mismatch() {
    let (mut prover, notary) = accepted_session().await;

    prover
        .send_frame(Direction::Sent, client_hello(SERVER_NAME))
        .await;
    prover.send_frame(Direction::Received, vec![0u8; 128]).await;

    // The Prover claims a frame the Notary never saw.
    prover.seq += 1;

    let reply = prover.close().await;
    assert!(matches!(reply, NotaryMessage::Rejection(err) if err.is_desync()));

    assert!(notary.await.unwrap().unwrap_err().is_desync());
}

#[tokio::test]
async fn test_rejects_data_over_limit() {
    let (mut prover, notary) = accepted_session().await;

    prover
        .send_frame(Direction::Sent, client_hello(SERVER_NAME))
        .await;

    let oversized = vec![0u8; (1 << 14) + CIPHERTEXT_ALLOWANCE + 1];
    let reply = prover.send_frame(Direction::Received, oversized).await;
    assert!(matches!(reply, NotaryMessage::Rejection(_)));

    assert!(notary.await.unwrap().is_err());
}

#[tokio::test]
async fn test_rejects_request_for_other_server() {
    let (mut prover, notary) = accepted_session().await;

    prover
        .send_frame(Direction::Sent, client_hello(SERVER_NAME))
        .await;
    prover.send_frame(Direction::Received, vec![0u8; 2048]).await;
    prover.close().await;

    let fixture = request_fixture();
    let request_config = RequestConfig::default();
    let mut builder = AttestationRequest::builder(&request_config);
    builder
        .server_name(ServerName::try_from("other.example.com").unwrap())
        .transcript_length(TranscriptLength {
            sent: 64,
            received: 64,
        })
        .transcript_commitment(*fixture.request.transcript_commitment());
    let request = builder.build().unwrap();

    let reply = prover.send(ProverMessage::Request(request)).await;
    assert!(matches!(reply, NotaryMessage::Rejection(_)));

    assert!(notary.await.unwrap().is_err());
}
