pub mod tcp;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use notary_common::{
    NotarizationRequestQuery, NotarizationSessionRequest, NotarizationSessionResponse,
};
use tlsproof_common::{config::ProtocolConfigValidator, Io};
use tlsproof_core::{attestation::AttestationConfig, CryptoProvider};
use tlsproof_verifier::{Verifier, VerifierConfig};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::{
    error::NotaryServerError,
    service::tcp::{tcp_notarize, TcpUpgrade},
    types::{NotaryGlobals, SessionLimits},
};

/// Handler to upgrade the `/notarize` request to the underlying TCP
/// connection. The session id names the limits submitted to `/session` by the
/// same client.
pub async fn upgrade_protocol(
    tcp_upgrade: TcpUpgrade,
    State(notary_globals): State<NotaryGlobals>,
    Query(params): Query<NotarizationRequestQuery>,
) -> Response {
    info!("Received upgrade protocol request");

    // The permit is held until the notarization ends.
    let permit = match notary_globals.semaphore.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!("Rejecting notarization, all sessions are taken");
            return NotaryServerError::Unavailable {
                retry_after: notary_globals.retry_after,
            }
            .into_response();
        }
    };

    let session_id = params.session_id;
    let limits = match notary_globals.take_session(&session_id) {
        Ok(Some(limits)) => limits,
        Ok(None) => {
            let err_msg = format!("Session id {} does not exist", session_id);
            error!(err_msg);
            return NotaryServerError::BadProverRequest(err_msg).into_response();
        }
        Err(err) => return err.into_response(),
    };

    // Completes the HTTP upgrade, the notarization runs once the client
    // switches to the raw connection.
    tcp_upgrade.on_upgrade(move |stream| async move {
        tcp_notarize(stream, notary_globals, session_id, limits).await;
        drop(permit);
    })
}

/// Handler to initialize and configure a notarization session
pub async fn initialize(
    State(notary_globals): State<NotaryGlobals>,
    payload: Result<Json<NotarizationSessionRequest>, JsonRejection>,
) -> impl IntoResponse {
    info!(
        ?payload,
        "Received request for initializing a notarization session"
    );

    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(err) => {
            error!("Malformed payload submitted for initializing notarization: {err}");
            return NotaryServerError::BadProverRequest(err.to_string()).into_response();
        }
    };

    let limits = match session_limits(&notary_globals, &payload) {
        Ok(limits) => limits,
        Err(err) => return err.into_response(),
    };

    let prover_session_id = Uuid::new_v4().to_string();

    if let Err(err) = notary_globals.insert_session(prover_session_id.clone(), limits) {
        return err.into_response();
    }

    trace!(session_id = %prover_session_id, ?limits, "Stored session");

    (
        StatusCode::OK,
        Json(NotarizationSessionResponse {
            session_id: prover_session_id,
        }),
    )
        .into_response()
}

/// Returns the limits of a new session. Requested limits may not exceed the
/// global ones, missing limits default to them.
fn session_limits(
    notary_globals: &NotaryGlobals,
    payload: &NotarizationSessionRequest,
) -> Result<SessionLimits, NotaryServerError> {
    let global = &notary_globals.notarization_config;

    let max_sent_data = payload.max_sent_data.unwrap_or(global.max_sent_data);
    if max_sent_data > global.max_sent_data {
        error!(
            "Max sent data requested {} exceeds the global maximum threshold {}",
            max_sent_data, global.max_sent_data
        );
        return Err(NotaryServerError::BadProverRequest(
            "Max sent data requested exceeds the global maximum threshold".to_string(),
        ));
    }

    let max_recv_data = payload.max_recv_data.unwrap_or(global.max_recv_data);
    if max_recv_data > global.max_recv_data {
        error!(
            "Max recv data requested {} exceeds the global maximum threshold {}",
            max_recv_data, global.max_recv_data
        );
        return Err(NotaryServerError::BadProverRequest(
            "Max recv data requested exceeds the global maximum threshold".to_string(),
        ));
    }

    Ok(SessionLimits {
        max_sent_data,
        max_recv_data,
    })
}

/// Runs the notarization.
pub async fn notary_service<T: Io>(
    socket: T,
    crypto_provider: Arc<CryptoProvider>,
    session_id: &str,
    limits: SessionLimits,
    timeout: Duration,
) -> Result<(), NotaryServerError> {
    debug!(?session_id, "Starting notarization...");

    let att_config = AttestationConfig::builder()
        .supported_signature_algs(Vec::from_iter(crypto_provider.signer.supported_algs()))
        .build()?;

    let config = VerifierConfig::builder()
        .protocol_config_validator(
            ProtocolConfigValidator::builder()
                .max_sent_data(limits.max_sent_data)
                .max_recv_data(limits.max_recv_data)
                .build()?,
        )
        .crypto_provider(crypto_provider)
        .build()?;

    tokio::time::timeout(
        timeout,
        Verifier::new(config).notarize(socket, &att_config),
    )
    .await
    .map_err(|_| {
        NotaryServerError::Connection(format!("notarization timed out after {timeout:?}"))
    })??;

    Ok(())
}
