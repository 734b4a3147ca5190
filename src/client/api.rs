//! Refresh and generate calls against the operator

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::payload::{
    ApiResponse, AuthenticatedData, ClientGenerateRequest, ErrorBody, GeneratePayload,
    ResponseStatus,
};
use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::{GenerationError, RefreshError};
use crate::clock::Clock;
use crate::config::{Environment, Settings};
use crate::crypto::{
    decrypt_envelope, seal_request_envelope, EnvelopeCrypto, PrefixStrip, SymmetricKey,
};
use crate::identity::{Identity, IdentityInput, IdentityStatus};

pub const REFRESH_PATH: &str = "/v2/token/refresh";
pub const CLIENT_GENERATE_PATH: &str = "/v2/token/client-generate";
pub const GENERATE_PATH: &str = "/v2/token/generate";

/// What a refresh or generate call resolved to.
///
/// `identity` is present only for `Established` and `Refreshed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub identity: Option<Identity>,
    pub status: IdentityStatus,
    pub message: Option<String>,
}

/// API key and secret for the server-side generate endpoint.
#[derive(Debug, Clone)]
pub struct ServerCredentials {
    pub api_key: String,
    pub secret: SymmetricKey,
}

impl ServerCredentials {
    pub fn new(api_key: impl Into<String>, secret: SymmetricKey) -> Self {
        Self {
            api_key: api_key.into(),
            secret,
        }
    }
}

/// Why an otherwise readable response could not become an outcome.
enum MappingError {
    MissingIdentity(String),
    Unexpected {
        status: String,
        message: Option<String>,
    },
}

impl From<MappingError> for RefreshError {
    fn from(e: MappingError) -> Self {
        match e {
            MappingError::MissingIdentity(detail) => RefreshError::InvalidResponse(detail),
            MappingError::Unexpected { status, message } => {
                RefreshError::UnexpectedStatus { status, message }
            }
        }
    }
}

impl From<MappingError> for GenerationError {
    fn from(e: MappingError) -> Self {
        match e {
            MappingError::MissingIdentity(_) => GenerationError::InvalidResponse,
            MappingError::Unexpected { status, message } => {
                GenerationError::UnexpectedStatus { status, message }
            }
        }
    }
}

/// Map a decrypted operator response. `issued` is the status a returned
/// identity gets: `Refreshed` for refresh, `Established` for generate.
fn map_response(
    response: ApiResponse,
    issued: IdentityStatus,
) -> Result<RefreshOutcome, MappingError> {
    match response.status() {
        ResponseStatus::Success => {
            let identity = response
                .identity()
                .map_err(|e| MappingError::MissingIdentity(e.to_string()))?;
            Ok(RefreshOutcome {
                identity: Some(identity),
                status: issued,
                message: response.message,
            })
        }
        ResponseStatus::OptOut => Ok(RefreshOutcome {
            identity: None,
            status: IdentityStatus::OptOut,
            message: response.message,
        }),
        ResponseStatus::ExpiredToken => Ok(RefreshOutcome {
            identity: None,
            status: IdentityStatus::RefreshExpired,
            message: response.message,
        }),
        _ => Err(MappingError::Unexpected {
            status: response.status,
            message: response.message,
        }),
    }
}

/// Talks to one operator environment over an injected transport.
pub struct IdentityClient {
    environment: Environment,
    version_header: (&'static str, String),
    transport: Arc<dyn HttpTransport>,
    crypto: Arc<dyn EnvelopeCrypto>,
    clock: Arc<dyn Clock>,
    logging: bool,
}

impl IdentityClient {
    pub fn new(
        settings: &Settings,
        transport: Arc<dyn HttpTransport>,
        crypto: Arc<dyn EnvelopeCrypto>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            environment: settings.environment.clone(),
            version_header: settings.client_version_header(),
            transport,
            crypto,
            clock,
            logging: settings.logging_enabled,
        }
    }

    fn post(&self, path: &str, body: Vec<u8>) -> HttpRequest {
        let (name, value) = &self.version_header;
        HttpRequest::post(self.environment.url_for(path, &[]), body)
            .with_header(*name, value.clone())
    }

    /// Exchange a refresh token for a new identity.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        refresh_response_key: &str,
    ) -> Result<RefreshOutcome, RefreshError> {
        let request = self
            .post(REFRESH_PATH, refresh_token.as_bytes().to_vec())
            .with_header("Content-Type", "application/x-www-form-urlencoded");

        let response = self.transport.send(request).await?;
        if !response.is_ok() {
            return Err(rejection(&response));
        }

        let key =
            SymmetricKey::from_base64(refresh_response_key).map_err(|_| RefreshError::DecryptPayload)?;
        let plaintext = decrypt_envelope(&response.body, &key, PrefixStrip::TimestampAndNonce)
            .ok_or(RefreshError::DecryptPayload)?;

        let decoded: ApiResponse = serde_json::from_slice(&plaintext)
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        let outcome = map_response(decoded, IdentityStatus::Refreshed)?;

        log_if!(self.logging, debug, "Refresh resolved to {}", outcome.status);
        Ok(outcome)
    }

    /// Generate a new identity through the client-side endpoint, sealed to
    /// the operator's public key.
    pub async fn generate(
        &self,
        input: &IdentityInput,
        subscription_id: &str,
        server_public_key: &str,
        app_name: &str,
    ) -> Result<RefreshOutcome, GenerationError> {
        let (key, public_key) = self
            .crypto
            .parse_server_key(server_public_key)
            .map_err(|e| GenerationError::Configuration(e.to_string()))?;

        let timestamp = self.clock.now_millis();
        let payload = serde_json::to_vec(&GeneratePayload::new(input))
            .map_err(|e| GenerationError::Encryption(e.to_string()))?;
        let aad = AuthenticatedData(timestamp, app_name.to_string())
            .to_bytes()
            .map_err(|e| GenerationError::Encryption(e.to_string()))?;

        let sealed = self
            .crypto
            .encrypt(&payload, &key, &aad)
            .map_err(|e| GenerationError::Encryption(e.to_string()))?;
        let public_key = public_key
            .to_der_base64()
            .map_err(|e| GenerationError::Encryption(e.to_string()))?;

        let body = ClientGenerateRequest {
            payload: STANDARD.encode(sealed.ciphertext_and_tag()),
            iv: STANDARD.encode(sealed.nonce),
            public_key,
            subscription_id: subscription_id.to_string(),
            timestamp,
            app_name: app_name.to_string(),
        };
        let body =
            serde_json::to_vec(&body).map_err(|e| GenerationError::Encryption(e.to_string()))?;

        let request = self
            .post(CLIENT_GENERATE_PATH, body)
            .with_header("Content-Type", "application/json");
        let response = self.transport.send(request).await?;
        self.finish_generate(response, &key, PrefixStrip::None)
    }

    /// Generate through the server-side endpoint with an API key and secret.
    pub async fn generate_with_credentials(
        &self,
        input: &IdentityInput,
        credentials: &ServerCredentials,
    ) -> Result<RefreshOutcome, GenerationError> {
        let payload = serde_json::to_vec(&GeneratePayload::new(input))
            .map_err(|e| GenerationError::Encryption(e.to_string()))?;
        let envelope =
            seal_request_envelope(&credentials.secret, self.clock.now_millis(), &payload)
                .map_err(|e| GenerationError::Encryption(e.to_string()))?;

        let request = self
            .post(GENERATE_PATH, envelope.into_bytes())
            .with_header("Authorization", format!("Bearer {}", credentials.api_key))
            .with_header("Content-Type", "text/plain");
        let response = self.transport.send(request).await?;
        self.finish_generate(response, &credentials.secret, PrefixStrip::TimestampAndNonce)
    }

    fn finish_generate(
        &self,
        response: HttpResponse,
        key: &SymmetricKey,
        strip: PrefixStrip,
    ) -> Result<RefreshOutcome, GenerationError> {
        if !response.is_ok() {
            log_if!(
                self.logging,
                warn,
                "Generate failed with HTTP status {}",
                response.status
            );
            if !self.environment.is_production {
                log_if!(
                    self.logging,
                    info,
                    "Generate against a non-production endpoint ({}); check that the subscription and key belong to it",
                    self.environment.endpoint
                );
            }
            return Err(GenerationError::RequestFailure {
                status: response.status,
                body: response.body_text(),
            });
        }

        let plaintext =
            decrypt_envelope(&response.body, key, strip).ok_or(GenerationError::DecryptionFailure)?;
        let decoded: ApiResponse =
            serde_json::from_slice(&plaintext).map_err(|_| GenerationError::InvalidResponse)?;
        let outcome = map_response(decoded, IdentityStatus::Established)?;

        log_if!(self.logging, debug, "Generate resolved to {}", outcome.status);
        Ok(outcome)
    }
}

/// Classify a non-200 refresh reply.
fn rejection(response: &HttpResponse) -> RefreshError {
    match serde_json::from_slice::<ErrorBody>(&response.body) {
        Ok(body) => RefreshError::ServerRejected {
            status: body.status,
            message: body.message,
        },
        Err(_) => RefreshError::Decoding {
            http_status: response.status,
            message: response.body_text(),
        },
    }
}
