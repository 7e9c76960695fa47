//! Types of the notary server HTTP API.

use serde::{Deserialize, Serialize};

/// Type of the connection a client requests for notarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientType {
    /// The `/notarize` request is upgraded to a raw TCP (or TLS) connection.
    Tcp,
}

/// Request body of the `/session` API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotarizationSessionRequest {
    /// Type of the connection.
    pub client_type: ClientType,
    /// Maximum number of bytes that can be sent.
    pub max_sent_data: Option<usize>,
    /// Maximum number of bytes that can be received.
    pub max_recv_data: Option<usize>,
}

/// Response body of the `/session` API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotarizationSessionResponse {
    /// Single-use identifier of the session.
    pub session_id: String,
}

/// Request query of the `/notarize` API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotarizationRequestQuery {
    /// Session id returned by the `/session` API.
    pub session_id: String,
}

/// Response body of the `/info` API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    /// Version of the notary server.
    pub version: String,
    /// PEM encoded public key of the notary signing key.
    pub public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_request_json() {
        let request = NotarizationSessionRequest {
            client_type: ClientType::Tcp,
            max_sent_data: Some(4096),
            max_recv_data: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"clientType":"Tcp","maxSentData":4096,"maxRecvData":null}"#
        );

        let request: NotarizationSessionRequest =
            serde_json::from_str(r#"{"clientType":"Tcp","maxSentData":1,"maxRecvData":2}"#)
                .unwrap();
        assert_eq!(request.max_recv_data, Some(2));
    }

    #[test]
    fn test_session_response_json() {
        let response: NotarizationSessionResponse =
            serde_json::from_str(r#"{"sessionId":"abc"}"#).unwrap();
        assert_eq!(response.session_id, "abc");
    }
}
