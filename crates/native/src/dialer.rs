use async_trait::async_trait;
use notary_client::{NotarizationRequest, NotaryClient};
use tlsproof_common::Io;
use tlsproof_prover::session::{DialError, Dialer};
use tokio::net::TcpStream;
use tracing::debug;

use crate::{Error, ProveOptions};

/// Dials a hosted Notary with [`NotaryClient`] and the server over TCP.
#[derive(Debug)]
pub struct NotaryDialer {
    client: NotaryClient,
    request: NotarizationRequest,
}

impl NotaryDialer {
    /// Creates a dialer for the Notary named in `options`.
    pub fn new(options: &ProveOptions) -> Result<Self, Error> {
        let client = NotaryClient::builder()
            .host(options.notary_host.as_str())
            .port(options.notary_port)
            .enable_tls(options.notary_tls)
            .path_prefix(options.notary_path_prefix.as_str())
            .root_cert_store(options.notary_root_store.clone())
            .build()
            .map_err(Error::invalid_input)?;

        let request = NotarizationRequest::builder()
            .max_sent_data(options.max_sent_data)
            .max_recv_data(options.max_recv_data)
            .build()
            .map_err(Error::invalid_input)?;

        Ok(Self { client, request })
    }
}

#[async_trait]
impl Dialer for NotaryDialer {
    async fn notary(&self) -> Result<Box<dyn Io>, DialError> {
        let accepted = self
            .client
            .request_notarization(self.request.clone())
            .await?;

        debug!("notary accepted session {}", accepted.id);

        Ok(Box::new(accepted.io))
    }

    async fn server(&self, domain: &str, port: u16) -> Result<Box<dyn Io>, DialError> {
        let socket = TcpStream::connect((domain, port)).await?;
        socket.set_nodelay(true)?;

        Ok(Box::new(socket))
    }
}
