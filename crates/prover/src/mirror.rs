//! Mirroring of the server connection to the Notary.

use tlsproof_common::{
    config::ProtocolConfig,
    mirror::MirrorKey,
    msgs::{MirrorClose, NotaryMessage, ProverMessage},
    IoChannel,
};
use tlsproof_core::{
    commitment::CommitmentEngine, connection::CiphertextObserver, transcript::Direction,
};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{splice::Event, ProverError};

/// Reflects every ciphertext event to the Notary and stages a commitment for
/// every plaintext event, until the connection is closed.
///
/// Each frame is acknowledged before the next event is taken. Staged
/// commitments are only finalized once both ciphertext summaries agree.
pub(crate) async fn mirror(
    channel: &mut IoChannel,
    key: &MirrorKey,
    config: &ProtocolConfig,
    engine: &mut CommitmentEngine,
    mut events: mpsc::Receiver<Event>,
) -> Result<(), ProverError> {
    let mut observer = CiphertextObserver::new();
    let mut seq = 0u64;

    while let Some(event) = events.recv().await {
        match event {
            Event::Ciphertext(direction, data) => {
                observer.observe(direction, &data);

                trace!("mirroring {direction} frame {seq}: {} bytes", data.len());

                let frame = key.frame(seq, direction, data);
                channel.send(&ProverMessage::Frame(frame)).await?;

                match channel.recv::<NotaryMessage>().await? {
                    NotaryMessage::Ack(ack) if ack.seq == seq => {}
                    NotaryMessage::Ack(ack) => {
                        return Err(ProverError::desync(format!(
                            "notary acknowledged frame {}, expected {seq}",
                            ack.seq
                        )))
                    }
                    NotaryMessage::Rejection(err) => return Err(ProverError::rejected(err)),
                    _ => {
                        return Err(ProverError::protocol(
                            "expected acknowledgment of a mirrored frame",
                        ))
                    }
                }

                seq += 1;
            }
            Event::Plaintext(direction, data) => {
                let (len, max) = match direction {
                    Direction::Sent => (engine.transcript().sent().len(), config.max_sent_data()),
                    Direction::Received => (
                        engine.transcript().received().len(),
                        config.max_recv_data(),
                    ),
                };

                if len + data.len() > max {
                    return Err(ProverError::protocol(format!(
                        "{direction} data exceeds the configured limit of {max} bytes"
                    )));
                }

                engine.observe(direction, &data);
            }
        }
    }

    let summary = observer.summary();
    channel
        .send(&ProverMessage::Close(MirrorClose {
            frames: seq,
            summary,
        }))
        .await?;

    match channel.recv::<NotaryMessage>().await? {
        NotaryMessage::Summary(notary_summary) if notary_summary == summary => {}
        NotaryMessage::Summary(_) => {
            return Err(ProverError::desync("notary observed different ciphertext"))
        }
        NotaryMessage::Rejection(err) => return Err(ProverError::rejected(err)),
        _ => return Err(ProverError::protocol("expected ciphertext summary")),
    }

    let finalized = engine.finalize_pending();

    debug!("mirrored {seq} frames, finalized {finalized} record commitments");

    Ok(())
}
