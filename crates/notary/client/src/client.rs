//! Notary client.
//!
//! This module sets up connection to notary server via TCP or TLS for
//! subsequent requests for notarization.

use http_body_util::{BodyExt as _, Either, Empty, Full};
use hyper::{
    body::Bytes,
    client::conn::http1::Parts,
    header::RETRY_AFTER,
    HeaderMap, Request, StatusCode,
};
use hyper_util::rt::TokioIo;
use notary_common::{
    ClientType, InfoResponse, NotarizationSessionRequest, NotarizationSessionResponse,
};
use std::{
    io::Error as IoError,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
    time::{timeout, Duration},
};
use tokio_rustls::{
    client::TlsStream,
    rustls::{self, ClientConfig, OwnedTrustAnchor, RootCertStore},
    TlsConnector,
};
use tracing::{debug, error, warn};

use crate::error::{ClientError, ErrorKind};

/// Parameters used to configure notarization.
#[derive(Debug, Clone, derive_builder::Builder)]
pub struct NotarizationRequest {
    /// Maximum number of bytes that can be sent.
    max_sent_data: usize,
    /// Maximum number of bytes that can be received.
    max_recv_data: usize,
}

impl NotarizationRequest {
    /// Creates a new builder for `NotarizationRequest`.
    pub fn builder() -> NotarizationRequestBuilder {
        NotarizationRequestBuilder::default()
    }
}

/// An accepted notarization request.
#[derive(Debug)]
#[non_exhaustive]
pub struct Accepted {
    /// Session identifier.
    pub id: String,
    /// Connection to the notary server to be used by a prover.
    pub io: NotaryConnection,
}

/// A notary server connection.
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum NotaryConnection {
    /// Unencrypted TCP connection.
    Tcp(TcpStream),
    /// TLS connection.
    Tls(TlsStream<TcpStream>),
}

impl AsyncRead for NotaryConnection {
    #[inline]
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<(), IoError>> {
        match self.get_mut() {
            NotaryConnection::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            NotaryConnection::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NotaryConnection {
    #[inline]
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, IoError>> {
        match self.get_mut() {
            NotaryConnection::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            NotaryConnection::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    #[inline]
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), IoError>> {
        match self.get_mut() {
            NotaryConnection::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            NotaryConnection::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    #[inline]
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), IoError>> {
        match self.get_mut() {
            NotaryConnection::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            NotaryConnection::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Client that sets up connection to notary server.
#[derive(Debug, Clone, derive_builder::Builder)]
pub struct NotaryClient {
    /// Host of the notary server endpoint, either a DNS name (if TLS is used)
    /// or IP address.
    #[builder(setter(into))]
    host: String,
    /// Port of the notary server endpoint.
    #[builder(default = "self.default_port()")]
    port: u16,
    /// URL path prefix of the notary server endpoint, e.g. "https://<host>:<port>/<path_prefix>/...".
    #[builder(setter(into), default = "String::from(\"\")")]
    path_prefix: String,
    /// Flag to turn on/off using TLS with notary server.
    #[builder(setter(name = "enable_tls"), default = "true")]
    tls: bool,
    /// Root certificate store used for establishing TLS connection with notary
    /// server.
    #[builder(default = "default_root_store()")]
    root_cert_store: RootCertStore,
    /// The duration of notarization request timeout in seconds.
    #[builder(default = "60")]
    request_timeout: usize,
}

impl NotaryClientBuilder {
    // Default setter of port.
    fn default_port(&self) -> u16 {
        // If port is not specified, set it to 80 if TLS is off, else 443 since TLS is
        // on (including when self.tls = None, which means it's set to default
        // (true)).
        if let Some(false) = self.tls {
            80
        } else {
            443
        }
    }
}

impl NotaryClient {
    /// Creates a new builder for `NotaryClient`.
    pub fn builder() -> NotaryClientBuilder {
        NotaryClientBuilder::default()
    }

    /// Configures and requests a notarization, returning a connection to the
    /// notary server if successful.
    ///
    /// A server at capacity answers with an [`ErrorKind::Unavailable`] error
    /// carrying the server's `Retry-After` value. The request is not retried.
    pub async fn request_notarization(
        &self,
        notarization_request: NotarizationRequest,
    ) -> Result<Accepted, ClientError> {
        match self.connect().await? {
            NotaryConnection::Tcp(socket) => self
                .send_request(socket, notarization_request)
                .await
                .map(|(connection, session_id)| Accepted {
                    id: session_id,
                    io: NotaryConnection::Tcp(connection),
                }),
            NotaryConnection::Tls(socket) => self
                .send_request(socket, notarization_request)
                .await
                .map(|(connection, session_id)| Accepted {
                    id: session_id,
                    io: NotaryConnection::Tls(connection),
                }),
        }
    }

    /// Fetches the version and public key of the notary server.
    pub async fn info(&self) -> Result<InfoResponse, ClientError> {
        let socket = self.connect().await?;

        let (mut request_sender, connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(socket))
                .await
                .map_err(|err| ClientError::new(ErrorKind::Connection, Some(Box::new(err))))?;

        let request = Request::builder()
            .uri(format!("{}/info", self.path_prefix()))
            .method("GET")
            .header("Host", &self.host)
            .header("Connection", "close")
            .body(Empty::<Bytes>::new())
            .map_err(|err| ClientError::new(ErrorKind::Internal, Some(Box::new(err))))?;

        let response_fut = async {
            let response = request_sender
                .send_request(request)
                .await
                .map_err(|err| ClientError::new(ErrorKind::Http, Some(Box::new(err))))?;

            if response.status() != StatusCode::OK {
                return Err(ClientError::new(
                    ErrorKind::Http,
                    Some(format!("Info response status is not OK: {}", response.status()).into()),
                ));
            }

            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|err| ClientError::new(ErrorKind::Http, Some(Box::new(err))))?
                .to_bytes();

            serde_json::from_slice::<InfoResponse>(&body)
                .map_err(|err| ClientError::new(ErrorKind::Internal, Some(Box::new(err))))
        };

        let connection_fut = async {
            connection
                .await
                .map_err(|err| ClientError::new(ErrorKind::Http, Some(Box::new(err))))
        };

        let (_, info) = futures::try_join!(connection_fut, response_fut)?;

        Ok(info)
    }

    /// Opens a TCP or TLS connection to the notary server.
    async fn connect(&self) -> Result<NotaryConnection, ClientError> {
        let notary_socket = timeout(
            Duration::from_secs(self.request_timeout as u64),
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| {
            ClientError::new(
                ErrorKind::Timeout,
                Some(format!("Timed out connecting to {}:{}", self.host, self.port).into()),
            )
        })?
        .map_err(|err| ClientError::new(ErrorKind::Connection, Some(Box::new(err))))?;

        // Setting TCP_NODELAY will improve prover latency.
        notary_socket
            .set_nodelay(true)
            .map_err(|err| ClientError::new(ErrorKind::Connection, Some(Box::new(err))))?;

        if !self.tls {
            debug!("Using tcp connection to {}:{}", self.host, self.port);
            return Ok(NotaryConnection::Tcp(notary_socket));
        }

        debug!("Setting up tls connection to {}:{}", self.host, self.port);

        let notary_client_config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(self.root_cert_store.clone())
            .with_no_client_auth();

        let server_name = self.host.as_str().try_into().map_err(|err| {
            error!("Failed to parse notary server DNS name: {:?}", self.host);
            ClientError::new(ErrorKind::TlsSetup, Some(Box::new(err)))
        })?;

        let notary_tls_socket = TlsConnector::from(Arc::new(notary_client_config))
            .connect(server_name, notary_socket)
            .await
            .map_err(|err| {
                if is_tls_mismatch_error(&err) {
                    error!("Perhaps the notary server is not accepting our TLS connection");
                }
                ClientError::new(ErrorKind::TlsSetup, Some(Box::new(err)))
            })?;

        Ok(NotaryConnection::Tls(notary_tls_socket))
    }

    fn path_prefix(&self) -> String {
        if self.path_prefix.is_empty() {
            String::new()
        } else {
            format!("/{}", self.path_prefix.trim_matches('/'))
        }
    }

    /// Sends notarization request to the notary server.
    async fn send_request<S: AsyncWrite + AsyncRead + Send + Unpin + 'static>(
        &self,
        notary_socket: S,
        notarization_request: NotarizationRequest,
    ) -> Result<(S, String), ClientError> {
        let http_scheme = if self.tls { "https" } else { "http" };
        let path_prefix = self.path_prefix();

        // Attach the hyper HTTP client to the notary connection to send request to the
        // /session endpoint to configure notarization and obtain session id.
        let (mut notary_request_sender, notary_connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(notary_socket))
                .await
                .map_err(|err| {
                    error!("Failed to attach http client to notary socket");
                    ClientError::new(ErrorKind::Connection, Some(Box::new(err)))
                })?;

        // Create a future to poll the notary connection to completion before extracting
        // the socket.
        let notary_connection_fut = async {
            // Claim back notary socket after HTTP exchange is done.
            let Parts {
                io: notary_socket, ..
            } = notary_connection.without_shutdown().await.map_err(|err| {
                error!("Failed to claim back notary socket after HTTP exchange is done");
                ClientError::new(ErrorKind::Internal, Some(Box::new(err)))
            })?;

            Ok(notary_socket)
        };

        // Create a future to send configuration and notarization requests to the notary
        // server using the connection established above.
        let client_requests_fut = async {
            // Build the HTTP request to configure notarization.
            let configuration_request_payload =
                serde_json::to_string(&NotarizationSessionRequest {
                    client_type: ClientType::Tcp,
                    max_sent_data: Some(notarization_request.max_sent_data),
                    max_recv_data: Some(notarization_request.max_recv_data),
                })
                .map_err(|err| {
                    error!("Failed to serialise http request for configuration");
                    ClientError::new(ErrorKind::Internal, Some(Box::new(err)))
                })?;

            let configuration_request_builder = Request::builder()
                .uri(format!(
                    "{http_scheme}://{}:{}{}/session",
                    self.host, self.port, path_prefix
                ))
                .method("POST")
                .header("Host", &self.host)
                // Need to specify application/json for axum to parse it as json.
                .header("Content-Type", "application/json");

            let configuration_request = configuration_request_builder
                .body(Either::Left(Full::new(Bytes::from(
                    configuration_request_payload,
                ))))
                .map_err(|err| {
                    error!("Failed to build http request for configuration");
                    ClientError::new(ErrorKind::Internal, Some(Box::new(err)))
                })?;

            debug!("Sending configuration request: {:?}", configuration_request);

            let configuration_response = notary_request_sender
                .send_request(configuration_request)
                .await
                .map_err(|err| {
                    error!("Failed to send http request for configuration");
                    ClientError::new(ErrorKind::Http, Some(Box::new(err)))
                })?;

            debug!("Sent configuration request");

            if configuration_response.status() != StatusCode::OK {
                return Err(ClientError::new(
                    ErrorKind::Configuration,
                    Some(
                        format!(
                            "Configuration response status is not OK: {:?}",
                            configuration_response
                        )
                        .into(),
                    ),
                ));
            }

            let configuration_response_payload = configuration_response
                .into_body()
                .collect()
                .await
                .map_err(|err| {
                    error!("Failed to parse configuration response");
                    ClientError::new(ErrorKind::Http, Some(Box::new(err)))
                })?
                .to_bytes();

            let configuration_response_payload_parsed =
                serde_json::from_str::<NotarizationSessionResponse>(&String::from_utf8_lossy(
                    &configuration_response_payload,
                ))
                .map_err(|err| {
                    error!("Failed to parse configuration response payload");
                    ClientError::new(ErrorKind::Internal, Some(Box::new(err)))
                })?;

            debug!(
                "Configuration response: {:?}",
                configuration_response_payload_parsed
            );

            // Send notarization request via HTTP, where the underlying TCP/TLS connection
            // will be extracted later.
            let notarization_request = Request::builder()
                // Need to specify the session_id so that notary server knows the right
                // configuration to use as the configuration is set in the previous
                // HTTP call.
                .uri(format!(
                    "{http_scheme}://{}:{}{}/notarize?sessionId={}",
                    self.host,
                    self.port,
                    path_prefix,
                    &configuration_response_payload_parsed.session_id
                ))
                .method("GET")
                .header("Host", &self.host)
                .header("Connection", "Upgrade")
                // Need to specify this upgrade header for server to extract TCP/TLS connection
                // later.
                .header("Upgrade", "TCP")
                .body(Either::Right(Empty::<Bytes>::new()))
                .map_err(|err| {
                    error!("Failed to build http request for notarization");
                    ClientError::new(ErrorKind::Internal, Some(Box::new(err)))
                })?;

            debug!("Sending notarization request: {:?}", notarization_request);

            let notarization_response = timeout(
                Duration::from_secs(self.request_timeout as u64),
                notary_request_sender.send_request(notarization_request),
            )
            .await
            .map_err(|_| {
                ClientError::new(
                    ErrorKind::Timeout,
                    Some(
                        "Timed out while waiting for server to accept notarization request".into(),
                    ),
                )
            })?
            .map_err(|err| {
                error!("Failed to send http request for notarization");
                ClientError::new(ErrorKind::Http, Some(Box::new(err)))
            })?;

            if notarization_response.status() == StatusCode::SERVICE_UNAVAILABLE {
                // The caller decides whether and when to try again.
                let retry_after = parse_retry_after(notarization_response.headers());
                warn!("Notary server is at capacity, retry after {retry_after:?}s");

                return Err(ClientError::unavailable(retry_after));
            }

            debug!("Notarization request was accepted by the server");

            if notarization_response.status() != StatusCode::SWITCHING_PROTOCOLS {
                return Err(ClientError::new(
                    ErrorKind::Internal,
                    Some(
                        format!(
                            "Notarization response status is not SWITCHING_PROTOCOLS: {:?}",
                            notarization_response
                        )
                        .into(),
                    ),
                ));
            }

            Ok(configuration_response_payload_parsed.session_id)
        };

        // Poll both futures simultaneously to obtain the resulting socket and
        // session_id.
        let (notary_socket, session_id) =
            futures::try_join!(notary_connection_fut, client_requests_fut)?;

        Ok((notary_socket.into_inner(), session_id))
    }

    /// Sets notarization request timeout duration in seconds.
    pub fn request_timeout(&mut self, timeout: usize) {
        self.request_timeout = timeout;
    }
}

/// Default root store using mozilla certs.
fn default_root_store() -> RootCertStore {
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject.as_ref(),
            ta.subject_public_key_info.as_ref(),
            ta.name_constraints.as_ref().map(|nc| nc.as_ref()),
        )
    }));

    root_store
}

// Checks whether the error is potentially related to a mismatch in TLS
// configuration between the client and the server.
fn is_tls_mismatch_error(err: &std::io::Error) -> bool {
    if let Some(rustls::Error::InvalidMessage(rustls::InvalidMessage::InvalidContentType)) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        return true;
    }
    false
}

// Parses the value of the "Retry-After" header as a number of seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
