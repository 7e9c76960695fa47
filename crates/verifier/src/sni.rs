//! Server name indication.
//!
//! The ClientHello is the only handshake message sent in the clear which names
//! the server, so the Notary reads the `server_name` extension from the first
//! ciphertext the Prover sends. The message may span several records, and
//! records may be split across frames.

const CONTENT_TYPE_HANDSHAKE: u8 = 22;
const HANDSHAKE_TYPE_CLIENT_HELLO: u8 = 1;
const EXTENSION_SERVER_NAME: u16 = 0;
const NAME_TYPE_HOST_NAME: u8 = 0;
const RECORD_HEADER_LEN: usize = 5;
const HANDSHAKE_HEADER_LEN: usize = 4;

/// Largest amount of ciphertext buffered while waiting for the ClientHello.
pub(crate) const MAX_CLIENT_HELLO_LEN: usize = 1 << 16;

/// Buffers the ciphertext sent by the Prover until the ClientHello is
/// complete.
#[derive(Debug, Default)]
pub(crate) struct ClientHelloBuffer {
    buf: Vec<u8>,
}

impl ClientHelloBuffer {
    /// Appends sent ciphertext, returning the server name once the ClientHello
    /// is complete.
    pub(crate) fn push(&mut self, data: &[u8]) -> Result<Option<String>, SniError> {
        self.buf.extend_from_slice(data);

        if self.buf.len() > MAX_CLIENT_HELLO_LEN {
            return Err(SniError::TooLong);
        }

        match client_hello(&self.buf)? {
            Some(body) => server_name(&body).map(Some),
            None => Ok(None),
        }
    }
}

/// Reassembles the body of the ClientHello from handshake records, returning
/// `None` if more data is needed.
fn client_hello(mut records: &[u8]) -> Result<Option<Vec<u8>>, SniError> {
    let mut payload = Vec::new();

    loop {
        if records.len() < RECORD_HEADER_LEN {
            return Ok(None);
        }

        if records[0] != CONTENT_TYPE_HANDSHAKE {
            return Err(SniError::NotHandshake(records[0]));
        }

        let len = u16::from_be_bytes([records[3], records[4]]) as usize;
        let Some(fragment) = records.get(RECORD_HEADER_LEN..RECORD_HEADER_LEN + len) else {
            return Ok(None);
        };

        payload.extend_from_slice(fragment);
        records = &records[RECORD_HEADER_LEN + len..];

        if payload.len() < HANDSHAKE_HEADER_LEN {
            continue;
        }

        if payload[0] != HANDSHAKE_TYPE_CLIENT_HELLO {
            return Err(SniError::NotClientHello(payload[0]));
        }

        let msg_len = u32::from_be_bytes([0, payload[1], payload[2], payload[3]]) as usize;
        if payload.len() >= HANDSHAKE_HEADER_LEN + msg_len {
            payload.truncate(HANDSHAKE_HEADER_LEN + msg_len);
            payload.drain(..HANDSHAKE_HEADER_LEN);
            return Ok(Some(payload));
        }
    }
}

fn server_name(body: &[u8]) -> Result<String, SniError> {
    let mut hello = Reader::new(body);

    // legacy_version and random
    hello.take(2 + 32)?;
    // legacy_session_id
    hello.vec_u8()?;
    // cipher_suites
    hello.vec_u16()?;
    // legacy_compression_methods
    hello.vec_u8()?;

    if hello.is_empty() {
        return Err(SniError::Missing);
    }

    let mut extensions = Reader::new(hello.vec_u16()?);
    while !extensions.is_empty() {
        let ty = extensions.u16()?;
        let data = extensions.vec_u16()?;

        if ty != EXTENSION_SERVER_NAME {
            continue;
        }

        let mut names = Reader::new(Reader::new(data).vec_u16()?);
        while !names.is_empty() {
            let name_type = names.u8()?;
            let name = names.vec_u16()?;

            if name_type == NAME_TYPE_HOST_NAME {
                return String::from_utf8(name.to_vec()).map_err(|_| SniError::Malformed);
            }
        }
    }

    Err(SniError::Missing)
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SniError> {
        if self.buf.len() < n {
            return Err(SniError::Malformed);
        }

        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, SniError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, SniError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn vec_u8(&mut self) -> Result<&'a [u8], SniError> {
        let len = self.u8()? as usize;
        self.take(len)
    }

    fn vec_u16(&mut self) -> Result<&'a [u8], SniError> {
        let len = self.u16()? as usize;
        self.take(len)
    }
}

/// Error for reading the server name from a ClientHello.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SniError {
    #[error("expected a handshake record, got content type {0}")]
    NotHandshake(u8),
    #[error("expected a ClientHello, got handshake type {0}")]
    NotClientHello(u8),
    #[error("ClientHello exceeds {MAX_CLIENT_HELLO_LEN} bytes")]
    TooLong,
    #[error("malformed ClientHello")]
    Malformed,
    #[error("ClientHello carries no server name")]
    Missing,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::*;

    use super::*;

    fn hello_body(server_name: Option<&str>) -> Vec<u8> {
        let mut body = vec![3, 3];
        body.extend([0u8; 32]);
        body.push(0);
        body.extend([0, 2, 0x13, 0x01]);
        body.extend([1, 0]);

        // supported_versions
        let mut extensions = vec![0, 43, 0, 3, 2, 3, 4];
        if let Some(name) = server_name {
            let name = name.as_bytes();
            let list_len = 3 + name.len();
            extensions.extend(EXTENSION_SERVER_NAME.to_be_bytes());
            extensions.extend(((list_len + 2) as u16).to_be_bytes());
            extensions.extend((list_len as u16).to_be_bytes());
            extensions.push(NAME_TYPE_HOST_NAME);
            extensions.extend((name.len() as u16).to_be_bytes());
            extensions.extend(name);
        }

        body.extend((extensions.len() as u16).to_be_bytes());
        body.extend(extensions);

        let mut msg = vec![HANDSHAKE_TYPE_CLIENT_HELLO];
        msg.extend(&(body.len() as u32).to_be_bytes()[1..]);
        msg.extend(body);
        msg
    }

    fn records(msg: &[u8], fragment_len: usize) -> Vec<u8> {
        let mut records = Vec::new();
        for fragment in msg.chunks(fragment_len) {
            records.extend([CONTENT_TYPE_HANDSHAKE, 3, 1]);
            records.extend((fragment.len() as u16).to_be_bytes());
            records.extend(fragment);
        }
        records
    }

    #[rstest]
    #[case::single_record(1 << 14)]
    #[case::fragmented(7)]
    #[case::tiny_fragments(2)]
    fn test_server_name(#[case] fragment_len: usize) {
        let data = records(&hello_body(Some("example.com")), fragment_len);

        let mut buffer = ClientHelloBuffer::default();
        assert_eq!(
            buffer.push(&data).unwrap().as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn test_server_name_across_pushes() {
        let data = records(&hello_body(Some("example.com")), 16);

        let mut buffer = ClientHelloBuffer::default();
        let (head, tail) = data.split_at(data.len() - 3);

        for chunk in head.chunks(5) {
            assert!(buffer.push(chunk).unwrap().is_none());
        }
        assert_eq!(buffer.push(tail).unwrap().as_deref(), Some("example.com"));
    }

    #[test]
    fn test_missing_server_name() {
        let data = records(&hello_body(None), 1 << 14);

        let err = ClientHelloBuffer::default().push(&data).unwrap_err();
        assert!(matches!(err, SniError::Missing));
    }

    #[test]
    fn test_not_handshake() {
        let mut data = records(&hello_body(Some("example.com")), 1 << 14);
        data[0] = 23;

        let err = ClientHelloBuffer::default().push(&data).unwrap_err();
        assert!(matches!(err, SniError::NotHandshake(23)));
    }

    #[test]
    fn test_not_client_hello() {
        let mut msg = hello_body(Some("example.com"));
        msg[0] = 2;

        let err = ClientHelloBuffer::default()
            .push(&records(&msg, 1 << 14))
            .unwrap_err();
        assert!(matches!(err, SniError::NotClientHello(2)));
    }

    #[test]
    fn test_truncated_extensions() {
        let mut msg = hello_body(Some("example.com"));
        // Claim a longer host name than present, keeping the message length.
        let len = msg.len();
        msg[len - 12] = 0xff;

        let err = ClientHelloBuffer::default()
            .push(&records(&msg, 1 << 14))
            .unwrap_err();
        assert!(matches!(err, SniError::Malformed));
    }

    #[test]
    fn test_too_long() {
        let mut buffer = ClientHelloBuffer::default();
        // A record header announcing more data than is ever sent.
        assert!(buffer.push(&[CONTENT_TYPE_HANDSHAKE, 3, 1, 0xff, 0xff]).unwrap().is_none());

        let err = buffer.push(&vec![0u8; MAX_CLIENT_HELLO_LEN]).unwrap_err();
        assert!(matches!(err, SniError::TooLong));
    }

    #[test]
    fn test_rustls_client_hello() {
        let config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth();
        let server_name = rustls::ServerName::try_from("tlsproof.example").unwrap();
        let mut conn = rustls::ClientConnection::new(Arc::new(config), server_name).unwrap();

        let mut data = Vec::new();
        while conn.wants_write() {
            conn.write_tls(&mut data).unwrap();
        }

        assert_eq!(
            ClientHelloBuffer::default().push(&data).unwrap().as_deref(),
            Some("tlsproof.example")
        );
    }
}
