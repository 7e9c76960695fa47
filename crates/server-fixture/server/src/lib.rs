//! HTTPS test server.
//!
//! Serves a handful of routes over TLS with the certificate from
//! `tlsproof-server-fixture-certs`. Every connection serves one request, the
//! server closes it after the response.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Query, State},
    response::{Html, Json},
    routing::get,
    Router,
};
use futures::channel::oneshot;
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    Request,
};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{
    rustls::{Certificate, PrivateKey, ServerConfig},
    TlsAcceptor,
};
use tower_service::Service;

pub use tlsproof_server_fixture_certs::*;

/// Default port of the server binary.
pub const DEFAULT_FIXTURE_PORT: u16 = 3000;

const HTML: &str = "<!DOCTYPE html>\n<html>\n<head><title>tlsproof</title></head>\n\
<body><p>Hello, World!</p></body>\n</html>\n";

struct AppState {
    shutdown: Option<oneshot::Sender<()>>,
}

impl AppState {
    /// Drops the connection without a TLS close_notify.
    fn shutdown(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            _ = sender.send(());
        }
    }
}

type SharedState = Arc<Mutex<AppState>>;

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Hello, World!" }))
        .route("/bytes", get(bytes))
        .route("/formats/json", get(json_doc))
        .route("/formats/html", get(html))
        .with_state(Arc::new(Mutex::new(state)))
}

/// Bind the server to the given socket.
pub async fn bind<T: AsyncRead + AsyncWrite + Send + Unpin + 'static>(
    socket: T,
) -> anyhow::Result<()> {
    let key = PrivateKey(SERVER_KEY_DER.to_vec());
    let cert = Certificate(SERVER_CERT_DER.to_vec());

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)?;

    let acceptor = TlsAcceptor::from(Arc::new(config));

    let conn = acceptor.accept(socket).await?;

    let io = TokioIo::new(conn);

    let (sender, receiver) = oneshot::channel();
    let state = AppState {
        shutdown: Some(sender),
    };
    let tower_service = app(state);

    let hyper_service = hyper::service::service_fn(move |request: Request<Incoming>| {
        tower_service.clone().call(request)
    });

    tokio::select! {
        res = http1::Builder::new()
                .keep_alive(false)
                .serve_connection(io, hyper_service) => res?,
        _ = receiver => {},
    }

    Ok(())
}

fn size(params: &HashMap<String, String>) -> usize {
    params
        .get("size")
        .and_then(|size| size.parse::<usize>().ok())
        .unwrap_or(1)
}

fn maybe_shutdown(state: &SharedState, params: &HashMap<String, String>) {
    if params.contains_key("shutdown") {
        if let Ok(mut state) = state.lock() {
            state.shutdown();
        }
    }
}

async fn bytes(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Bytes {
    maybe_shutdown(&state, &params);

    Bytes::from(vec![0x42u8; size(&params)])
}

async fn json_doc(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    maybe_shutdown(&state, &params);

    let items = (0..size(&params))
        .map(|id| json!({ "id": id, "name": format!("item {id}"), "price": id * 100 }))
        .collect::<Vec<_>>();

    Json(json!({
        "account": "1234567890",
        "currency": "EUR",
        "items": items,
    }))
}

async fn html(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    maybe_shutdown(&state, &params);

    Html(HTML)
}
