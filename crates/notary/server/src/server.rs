use axum::{
    extract::Request,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use eyre::{ensure, eyre, Result};
use hyper::{body::Incoming, server::conn::http1};
use hyper_util::rt::TokioIo;
use notary_common::InfoResponse;
use pkcs8::DecodePrivateKey;
use rustls::{Certificate, PrivateKey, ServerConfig};
use std::{
    fs::File as StdFile,
    io::BufReader,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use tlsproof_core::CryptoProvider;
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, AsyncWrite},
    net::TcpListener,
    sync::Semaphore,
};
use tokio_rustls::TlsAcceptor;
use tower_http::cors::CorsLayer;
use tower_service::Service;
use tracing::{debug, error, info, warn};
use zeroize::Zeroize;

use crate::{
    config::{NotarizationProperties, NotaryServerProperties, TLSProperties},
    error::NotaryServerError,
    service::{initialize, upgrade_protocol},
    signing::AttestationKey,
    types::NotaryGlobals,
};

/// Binds to the configured address and serves notarization requests.
#[tracing::instrument(skip(config))]
pub async fn run_server(config: &NotaryServerProperties) -> Result<(), NotaryServerError> {
    let notary_address = SocketAddr::new(
        IpAddr::V4(config.host.parse().map_err(|err| {
            eyre!("Failed to parse notary host address from server config: {err}")
        })?),
        config.port,
    );
    let listener = TcpListener::bind(notary_address)
        .await
        .map_err(|err| eyre!("Failed to bind server address to tcp listener: {err}"))?;

    info!("Listening for TCP traffic at {}", notary_address);

    serve(listener, config).await
}

/// Serves notarization requests on connections accepted by `listener`, with
/// or without TLS.
pub async fn serve(
    listener: TcpListener,
    config: &NotaryServerProperties,
) -> Result<(), NotaryServerError> {
    let attestation_key = get_attestation_key(&config.notarization).await?;
    let verifying_key_pem = attestation_key
        .verifying_key_pem()
        .map_err(|err| eyre!("Failed to get verifying key in PEM format: {err}"))?;

    let crypto_provider = build_crypto_provider(attestation_key)?;

    let tls_acceptor = build_tls_acceptor(&config.tls).await?;

    let protocol = Arc::new(http1::Builder::new());
    let notary_globals = NotaryGlobals::new(
        Arc::new(crypto_provider),
        config.notarization.clone(),
        Arc::new(Semaphore::new(config.concurrency)),
        config.retry_after,
    );
    let router = router(notary_globals, &config.html_info, verifying_key_pem);

    loop {
        // Errors of a single connection must not bring down the server.
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(err) => {
                error!("{}", NotaryServerError::Connection(err.to_string()));
                continue;
            }
        };
        debug!("Received a prover's TCP connection");

        if let Err(err) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {err}");
        }

        let tower_service = router.clone();
        let tls_acceptor = tls_acceptor.clone();
        let protocol = protocol.clone();

        tokio::spawn(async move {
            if let Some(acceptor) = tls_acceptor {
                match acceptor.accept(stream).await {
                    Ok(stream) => {
                        info!("Accepted prover's TLS-secured TCP connection");
                        serve_connection(&protocol, stream, tower_service).await;
                    }
                    Err(err) => {
                        error!("{}", NotaryServerError::Connection(err.to_string()));

                        if let Some(rustls::Error::InvalidMessage(
                            rustls::InvalidMessage::InvalidContentType,
                        )) = err
                            .get_ref()
                            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
                        {
                            error!("Perhaps the client is connecting without TLS");
                        }
                    }
                }
            } else {
                info!("Accepted prover's TCP connection");
                serve_connection(&protocol, stream, tower_service).await;
            }
        });
    }
}

/// Serves the router on a single connection. Upgrades are enabled so that
/// `/notarize` can claim the connection.
async fn serve_connection<T>(protocol: &http1::Builder, stream: T, router: Router)
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let io = TokioIo::new(stream);
    let hyper_service = hyper::service::service_fn(move |request: Request<Incoming>| {
        router.clone().call(request)
    });

    if let Err(err) = protocol
        .serve_connection(io, hyper_service)
        .with_upgrades()
        .await
    {
        debug!("Connection closed with error: {err}");
    }
}

fn router(notary_globals: NotaryGlobals, html_info: &str, verifying_key_pem: String) -> Router {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let html_info = Html(
        html_info
            .replace("{version}", &version)
            .replace("{public_key}", &verifying_key_pem),
    );
    let info = InfoResponse {
        version,
        public_key: verifying_key_pem,
    };

    Router::new()
        .route(
            "/",
            get(|| async move { (StatusCode::OK, html_info).into_response() }),
        )
        .route(
            "/healthcheck",
            get(|| async move { (StatusCode::OK, "Ok").into_response() }),
        )
        .route(
            "/info",
            get(|| async move { (StatusCode::OK, Json(info)).into_response() }),
        )
        .route("/session", post(initialize))
        .route("/notarize", get(upgrade_protocol))
        .layer(CorsLayer::permissive())
        .with_state(notary_globals)
}

fn build_crypto_provider(attestation_key: AttestationKey) -> Result<CryptoProvider> {
    let mut provider = CryptoProvider::default();
    provider.signer.set_signer(attestation_key.into_signer()?);
    Ok(provider)
}

/// Builds the TLS acceptor if TLS is turned on.
async fn build_tls_acceptor(config: &TLSProperties) -> Result<Option<TlsAcceptor>> {
    if !config.enabled {
        debug!("Skipping TLS setup as it is turned off.");
        return Ok(None);
    }

    let private_key_pem_path = config
        .private_key_path
        .as_deref()
        .ok_or_else(|| eyre!("TLS is enabled but private key PEM path is not set"))?;
    let certificate_pem_path = config
        .certificate_path
        .as_deref()
        .ok_or_else(|| eyre!("TLS is enabled but certificate PEM path is not set"))?;

    let (tls_private_key, tls_certificates) =
        load_tls_key_and_cert(private_key_pem_path, certificate_pem_path).await?;

    let mut server_config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(tls_certificates, tls_private_key)
        .map_err(|err| eyre!("Failed to instantiate notary server tls config: {err}"))?;

    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

/// Returns the notary signing key for attestations, or a random key if none
/// is configured.
async fn get_attestation_key(config: &NotarizationProperties) -> Result<AttestationKey> {
    let key = if let Some(private_key_path) = &config.private_key_path {
        debug!("Loading notary server's signing key");

        let mut file = File::open(private_key_path).await?;
        let mut pem = String::new();
        file.read_to_string(&mut pem)
            .await
            .map_err(|_| eyre!("pem file does not contain valid UTF-8"))?;

        let key = AttestationKey::from_pkcs8_pem(&pem)
            .map_err(|err| eyre!("Failed to load notary signing key for notarization: {err}"))?;

        pem.zeroize();

        key
    } else {
        warn!(
            "Using a random, ephemeral signing key because `notarization.private_key_path` is not set."
        );
        AttestationKey::random(&config.signature_algorithm)?
    };

    Ok(key)
}

/// Read a PEM-formatted file and return its buffer reader
async fn read_pem_file(file_path: &str) -> Result<BufReader<StdFile>> {
    let key_file = File::open(file_path).await?.into_std().await;
    Ok(BufReader::new(key_file))
}

/// Load notary tls private key and cert from static files
async fn load_tls_key_and_cert(
    private_key_pem_path: &str,
    certificate_pem_path: &str,
) -> Result<(PrivateKey, Vec<Certificate>)> {
    debug!("Loading notary server's tls private key and certificate");

    let mut private_key_file_reader = read_pem_file(private_key_pem_path).await?;
    let mut private_keys = rustls_pemfile::pkcs8_private_keys(&mut private_key_file_reader)?;
    ensure!(
        private_keys.len() == 1,
        "Expected exactly 1 key in the tls private key pem file"
    );
    let private_key = PrivateKey(private_keys.remove(0));

    let mut certificate_file_reader = read_pem_file(certificate_pem_path).await?;
    let certificates = rustls_pemfile::certs(&mut certificate_file_reader)?
        .into_iter()
        .map(Certificate)
        .collect();

    debug!("Successfully loaded notary server's tls private key and certificate!");
    Ok((private_key, certificates))
}
