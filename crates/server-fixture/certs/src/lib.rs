//! Certificate fixtures for the test server.

/// A certificate authority certificate fixture.
pub static CA_CERT_DER: &[u8] = include_bytes!("root_ca.der");
/// The certificate authority certificate in PEM format.
pub static CA_CERT_PEM: &str = include_str!("root_ca.pem");
/// A server certificate (domain=test-server.io) fixture.
///
/// The certificate is also valid for `www.example.com`, `api.example.com`,
/// `example.org` and `news.example.net`.
pub static SERVER_CERT_DER: &[u8] = include_bytes!("test_server.der");
/// A server private key fixture, PKCS#8 encoded.
pub static SERVER_KEY_DER: &[u8] = include_bytes!("test_server.key.der");
/// The domain name bound to the server certificate.
pub static SERVER_DOMAIN: &str = "test-server.io";
