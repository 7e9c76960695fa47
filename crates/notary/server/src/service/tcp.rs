use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use std::{future::Future, time::Duration};
use tracing::{debug, error, info};

use crate::{
    service::notary_service,
    types::{NotaryGlobals, SessionLimits},
    NotaryServerError,
};

/// Extractor of the underlying TCP connection of a request carrying
/// `Upgrade: TCP`. The connection is only claimed once the response to the
/// ongoing HTTP request has been sent.
///
/// More info on the upgrade primitives: https://docs.rs/hyper/latest/hyper/upgrade/index.html
pub struct TcpUpgrade {
    pub on_upgrade: OnUpgrade,
}

impl<S> FromRequestParts<S> for TcpUpgrade
where
    S: Send + Sync,
{
    type Rejection = NotaryServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let is_tcp = parts
            .headers
            .get(header::UPGRADE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("tcp"));
        if !is_tcp {
            return Err(NotaryServerError::BadProverRequest(
                "Upgrade header is not set to TCP".to_string(),
            ));
        }

        let on_upgrade =
            parts
                .extensions
                .remove::<OnUpgrade>()
                .ok_or(NotaryServerError::BadProverRequest(
                    "Connection can not be upgraded".to_string(),
                ))?;

        Ok(Self { on_upgrade })
    }
}

impl TcpUpgrade {
    /// Completes the upgrade: returns the 101 response to the client and
    /// spawns a task which claims the connection and runs `callback` on it.
    pub fn on_upgrade<C, Fut>(self, callback: C) -> Response
    where
        C: FnOnce(TokioIo<Upgraded>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let on_upgrade = self.on_upgrade;
        tokio::spawn(async move {
            let upgraded = match on_upgrade.await {
                Ok(upgraded) => upgraded,
                Err(err) => {
                    error!("Something wrong with upgrading HTTP: {:?}", err);
                    return;
                }
            };
            let upgraded = TokioIo::new(upgraded);

            callback(upgraded).await;
        });

        #[allow(clippy::declare_interior_mutable_const)]
        const UPGRADE: HeaderValue = HeaderValue::from_static("upgrade");
        #[allow(clippy::declare_interior_mutable_const)]
        const TCP: HeaderValue = HeaderValue::from_static("tcp");

        let response = Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header(header::CONNECTION, UPGRADE)
            .header(header::UPGRADE, TCP)
            .body(Body::empty());

        match response {
            Ok(response) => response,
            Err(err) => NotaryServerError::Connection(err.to_string()).into_response(),
        }
    }
}

/// Performs notarization over the extracted tcp connection.
pub async fn tcp_notarize(
    stream: TokioIo<Upgraded>,
    notary_globals: NotaryGlobals,
    session_id: String,
    limits: SessionLimits,
) {
    debug!(?session_id, "Upgraded to tcp connection");
    match notary_service(
        stream,
        notary_globals.crypto_provider.clone(),
        &session_id,
        limits,
        Duration::from_secs(notary_globals.notarization_config.timeout),
    )
    .await
    {
        Ok(_) => {
            info!(?session_id, "Successful notarization using tcp!");
        }
        Err(err) => {
            error!(?session_id, "Failed notarization using tcp: {err}");
        }
    }
}
