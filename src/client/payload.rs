//! JSON bodies exchanged with the operator

use serde::{Deserialize, Serialize};

use crate::identity::{Identity, IdentityInput, Millis};

/// Plaintext of a generate request, before sealing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_hash: Option<String>,
    pub optout_check: u8,
}

impl GeneratePayload {
    pub fn new(input: &IdentityInput) -> Self {
        let hash = input.hashed_value();
        let (email_hash, phone_hash) = if input.is_email() {
            (Some(hash), None)
        } else {
            (None, Some(hash))
        };
        Self {
            email_hash,
            phone_hash,
            optout_check: 1,
        }
    }
}

/// Body POSTed to the client-side generate endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientGenerateRequest {
    /// base64 `ciphertext || tag`
    pub payload: String,
    /// base64 nonce
    pub iv: String,
    /// base64 DER of the ephemeral public key
    pub public_key: String,
    pub subscription_id: String,
    pub timestamp: Millis,
    pub app_name: String,
}

/// Associated data for a client-side generate request: `[timestamp, app_name]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedData(pub Millis, pub String);

impl AuthenticatedData {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// `status` values the operator answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    OptOut,
    ExpiredToken,
    ClientError,
    InvalidToken,
    Unauthorized,
    Other(String),
}

impl ResponseStatus {
    pub fn from_wire(status: &str) -> Self {
        match status {
            "success" => ResponseStatus::Success,
            "optout" => ResponseStatus::OptOut,
            "expired_token" => ResponseStatus::ExpiredToken,
            "client_error" => ResponseStatus::ClientError,
            "invalid_token" => ResponseStatus::InvalidToken,
            "unauthorized" => ResponseStatus::Unauthorized,
            other => ResponseStatus::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            ResponseStatus::Success => "success",
            ResponseStatus::OptOut => "optout",
            ResponseStatus::ExpiredToken => "expired_token",
            ResponseStatus::ClientError => "client_error",
            ResponseStatus::InvalidToken => "invalid_token",
            ResponseStatus::Unauthorized => "unauthorized",
            ResponseStatus::Other(other) => other,
        }
    }
}

/// Decrypted body of a successful refresh or generate call.
///
/// `body` is left untyped: opt-out and expiry replies carry an empty or
/// partial object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn status(&self) -> ResponseStatus {
        ResponseStatus::from_wire(&self.status)
    }

    /// The issued identity, if `body` holds a complete one.
    pub fn identity(&self) -> Result<Identity, serde_json::Error> {
        let body = self.body.clone().unwrap_or(serde_json::Value::Null);
        serde_json::from_value(body)
    }

    pub fn success(identity: &Identity) -> Self {
        Self {
            body: serde_json::to_value(identity).ok(),
            status: ResponseStatus::Success.as_wire().to_string(),
            message: None,
        }
    }

    pub fn bare(status: ResponseStatus, message: Option<&str>) -> Self {
        Self {
            body: None,
            status: status.as_wire().to_string(),
            message: message.map(str::to_string),
        }
    }
}

/// Plain JSON body of a non-200 reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{NormalizedEmail, NormalizedPhone};

    #[test]
    fn test_generate_payload_tags_hash_kind() {
        let email = IdentityInput::Email(NormalizedEmail::new("myemail@example.com").unwrap());
        let json = serde_json::to_string(&GeneratePayload::new(&email)).unwrap();
        assert_eq!(
            json,
            r#"{"email_hash":"FsGNM28LJQ8OLZB0Us65ZYp07NrovJSGTCMSKnLMJ6U=","optout_check":1}"#
        );

        let phone = IdentityInput::Phone(NormalizedPhone::new("+12345678901").unwrap());
        let json = serde_json::to_string(&GeneratePayload::new(&phone)).unwrap();
        assert_eq!(
            json,
            r#"{"phone_hash":"EObwtHBUqDNZR33LNSMdtt5cafsYFuGmuY4ZLenlue4=","optout_check":1}"#
        );
    }

    #[test]
    fn test_authenticated_data_is_two_element_array() {
        let aad = AuthenticatedData(1_700_000_000_123, "com.example.app".into());
        assert_eq!(
            aad.to_bytes().unwrap(),
            br#"[1700000000123,"com.example.app"]"#.to_vec()
        );
    }

    #[test]
    fn test_response_status_mapping() {
        for status in [
            ResponseStatus::Success,
            ResponseStatus::OptOut,
            ResponseStatus::ExpiredToken,
            ResponseStatus::ClientError,
            ResponseStatus::InvalidToken,
            ResponseStatus::Unauthorized,
        ] {
            assert_eq!(ResponseStatus::from_wire(status.as_wire()), status);
        }
        assert_eq!(
            ResponseStatus::from_wire("teapot"),
            ResponseStatus::Other("teapot".into())
        );
    }

    #[test]
    fn test_api_response_identity() {
        let json = r#"{
            "body": {
                "advertising_token": "AgAAAA",
                "refresh_token": "RTRT",
                "identity_expires": 1000,
                "refresh_from": 500,
                "refresh_expires": 2000,
                "refresh_response_key": "yptCUTBoZm1ffosgCrmuwg=="
            },
            "status": "success"
        }"#;
        let response: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status(), ResponseStatus::Success);
        assert_eq!(response.identity().unwrap().refresh_from, 500);

        let optout: ApiResponse = serde_json::from_str(r#"{"body":{},"status":"optout"}"#).unwrap();
        assert_eq!(optout.status(), ResponseStatus::OptOut);
        assert!(optout.identity().is_err());
    }
}
