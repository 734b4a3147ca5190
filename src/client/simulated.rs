//! In-process operator
//!
//! Implements `HttpTransport` by playing the operator's side of the
//! protocol: it holds a P-256 key pair, opens client-side generate requests,
//! tracks the refresh tokens it issued and seals replies the way the real
//! service does. Used for testing the client and manager end to end without
//! a network.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p256::pkcs8::EncodePublicKey;
use p256::SecretKey;
use rand::rngs::OsRng;
use rand::RngCore;

use super::api::{CLIENT_GENERATE_PATH, GENERATE_PATH, REFRESH_PATH};
use super::payload::{
    ApiResponse, AuthenticatedData, ClientGenerateRequest, ErrorBody, GeneratePayload,
    ResponseStatus,
};
use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::TransportError;
use crate::clock::Clock;
use crate::crypto::{
    decrypt, encrypt, operator_agree, SymmetricKey, REQUEST_ENVELOPE_VERSION, RESPONSE_PREFIX_LEN,
};
use crate::identity::{Identity, Millis};

/// How the operator answers the next request of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorReply {
    /// `success` with a freshly issued identity.
    Issue,
    OptOut,
    ExpiredToken,
    /// A sealed reply carrying some other status string.
    Status(String),
    /// A plain non-200 reply.
    HttpError { status: u16, body: String },
    /// 200 with a body that is not a valid envelope.
    Undecryptable,
    /// The transport itself fails.
    Unreachable,
}

/// Offsets from issue time for the timestamps of issued identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifetimes {
    pub refresh_from: Millis,
    pub identity_expires: Millis,
    pub refresh_expires: Millis,
}

impl Default for Lifetimes {
    fn default() -> Self {
        Self {
            refresh_from: 60 * 60 * 1000,
            identity_expires: 4 * 60 * 60 * 1000,
            refresh_expires: 30 * 24 * 60 * 60 * 1000,
        }
    }
}

#[derive(Default)]
struct OperatorState {
    generate_replies: VecDeque<OperatorReply>,
    refresh_replies: VecDeque<OperatorReply>,
    lifetimes: Lifetimes,
    latency: Duration,
    /// refresh_token -> base64 refresh_response_key
    issued: HashMap<String, String>,
    credentials: Option<(String, SymmetricKey)>,
    requests: Vec<HttpRequest>,
    serial: u64,
}

pub struct SimulatedOperator {
    secret: SecretKey,
    clock: Arc<dyn Clock>,
    state: Mutex<OperatorState>,
}

impl SimulatedOperator {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            secret: SecretKey::random(&mut OsRng),
            clock,
            state: Mutex::new(OperatorState::default()),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, OperatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The public key string integrators are handed: prefix plus base64 SPKI.
    pub fn server_public_key(&self) -> String {
        let der = self
            .secret
            .public_key()
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .unwrap_or_default();
        format!("UID2-X-L-{}", STANDARD.encode(der))
    }

    pub fn set_lifetimes(&self, lifetimes: Lifetimes) {
        self.state().lifetimes = lifetimes;
    }

    /// Delay applied to every request. Runs on tokio time.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    pub fn register_credentials(&self, api_key: impl Into<String>, secret: SymmetricKey) {
        self.state().credentials = Some((api_key.into(), secret));
    }

    /// Queue the reply for the next generate call (either endpoint).
    pub fn push_generate_reply(&self, reply: OperatorReply) {
        self.state().generate_replies.push_back(reply);
    }

    /// Queue the reply for the next refresh call.
    pub fn push_refresh_reply(&self, reply: OperatorReply) {
        self.state().refresh_replies.push_back(reply);
    }

    /// Issue an identity directly, as if a generate call had happened earlier.
    pub fn issue_identity(&self) -> Identity {
        let now = self.clock.now_millis();
        issue(&mut self.state(), now)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state().requests.clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.url.path() == path)
            .count()
    }

    fn handle_client_generate(&self, request: &HttpRequest) -> HttpResponse {
        let Ok(body) = serde_json::from_slice::<ClientGenerateRequest>(&request.body) else {
            return client_error("malformed request body");
        };
        let Ok(client_der) = STANDARD.decode(&body.public_key) else {
            return client_error("public_key is not base64");
        };
        let Ok(key) = operator_agree(&self.secret, &client_der) else {
            return client_error("public_key is not a P-256 key");
        };

        let (Ok(mut combined), Ok(sealed)) = (STANDARD.decode(&body.iv), STANDARD.decode(&body.payload)) else {
            return client_error("payload is not base64");
        };
        combined.extend(sealed);
        let Ok(aad) = AuthenticatedData(body.timestamp, body.app_name).to_bytes() else {
            return client_error("bad authenticated data");
        };
        let Some(plaintext) = decrypt(&combined, &key, &aad) else {
            return client_error("payload could not be decrypted");
        };
        if !has_hash(&plaintext) {
            return client_error("payload carries no identifier");
        }

        let reply = self.state().generate_replies.pop_front();
        self.reply(reply.unwrap_or(OperatorReply::Issue), &key, false)
    }

    fn handle_server_generate(&self, request: &HttpRequest) -> HttpResponse {
        let credentials = self.state().credentials.clone();
        let Some((api_key, secret)) = credentials else {
            return unauthorized();
        };
        if request.header("authorization") != Some(format!("Bearer {}", api_key).as_str()) {
            return unauthorized();
        }

        let raw = match STANDARD.decode(&request.body) {
            Ok(raw) if raw.first() == Some(&REQUEST_ENVELOPE_VERSION) => raw,
            _ => return client_error("malformed envelope"),
        };
        let Some(framed) = decrypt(&raw[1..], &secret, &[]) else {
            return client_error("envelope could not be decrypted");
        };
        let payload = framed
            .get(RESPONSE_PREFIX_LEN..)
            .and_then(|rest| rest.strip_suffix(b"\n"))
            .unwrap_or_default();
        if !has_hash(payload) {
            return client_error("payload carries no identifier");
        }

        let reply = self.state().generate_replies.pop_front();
        self.reply(reply.unwrap_or(OperatorReply::Issue), &secret, true)
    }

    fn handle_refresh(&self, request: &HttpRequest) -> HttpResponse {
        let token = String::from_utf8_lossy(&request.body).into_owned();
        let (key, reply) = {
            let mut state = self.state();
            let Some(key) = state.issued.get(&token).cloned() else {
                return error_reply(400, "invalid_token", "unknown refresh token");
            };
            (key, state.refresh_replies.pop_front())
        };
        let Ok(key) = SymmetricKey::from_base64(&key) else {
            return error_reply(500, "error", "stored key unusable");
        };
        self.reply(reply.unwrap_or(OperatorReply::Issue), &key, true)
    }

    fn reply(&self, reply: OperatorReply, key: &SymmetricKey, prefixed: bool) -> HttpResponse {
        let now = self.clock.now_millis();
        let response = match reply {
            OperatorReply::Issue => ApiResponse::success(&issue(&mut self.state(), now)),
            OperatorReply::OptOut => ApiResponse::bare(ResponseStatus::OptOut, None),
            OperatorReply::ExpiredToken => {
                ApiResponse::bare(ResponseStatus::ExpiredToken, Some("refresh token expired"))
            }
            OperatorReply::Status(status) => ApiResponse::bare(ResponseStatus::from_wire(&status), None),
            OperatorReply::HttpError { status, body } => return HttpResponse::new(status, body),
            OperatorReply::Undecryptable => return HttpResponse::new(200, "bm90IGFuIGVudmVsb3Bl"),
            // Handled in `send`.
            OperatorReply::Unreachable => return HttpResponse::new(503, ""),
        };

        let mut plaintext = Vec::new();
        if prefixed {
            let mut nonce = [0u8; 8];
            OsRng.fill_bytes(&mut nonce);
            plaintext.extend_from_slice(&now.to_be_bytes());
            plaintext.extend_from_slice(&nonce);
        }
        let Ok(json) = serde_json::to_vec(&response) else {
            return error_reply(500, "error", "could not encode reply");
        };
        plaintext.extend(json);

        match encrypt(&plaintext, key, &[]) {
            Ok(sealed) => HttpResponse::new(200, STANDARD.encode(sealed.combined())),
            Err(e) => error_reply(500, "error", &e.to_string()),
        }
    }

    /// Whether the next queued reply for `path` is a transport failure.
    fn take_unreachable(&self, path: &str) -> bool {
        let mut state = self.state();
        let queue = match path {
            REFRESH_PATH => &mut state.refresh_replies,
            CLIENT_GENERATE_PATH | GENERATE_PATH => &mut state.generate_replies,
            _ => return false,
        };
        if queue.front() == Some(&OperatorReply::Unreachable) {
            queue.pop_front();
            true
        } else {
            false
        }
    }
}

fn issue(state: &mut OperatorState, now: Millis) -> Identity {
    state.serial += 1;
    let mut key = [0u8; 16];
    OsRng.fill_bytes(&mut key);
    let lifetimes = state.lifetimes;

    let identity = Identity {
        advertising_token: format!("AdvertisingToken-{}", state.serial),
        refresh_token: format!("RefreshToken-{}", state.serial),
        identity_expires: now + lifetimes.identity_expires,
        refresh_from: now + lifetimes.refresh_from,
        refresh_expires: now + lifetimes.refresh_expires,
        refresh_response_key: STANDARD.encode(key),
    };
    state.issued.insert(
        identity.refresh_token.clone(),
        identity.refresh_response_key.clone(),
    );
    identity
}

fn has_hash(plaintext: &[u8]) -> bool {
    serde_json::from_slice::<GeneratePayload>(plaintext)
        .map(|p| p.email_hash.is_some() || p.phone_hash.is_some())
        .unwrap_or(false)
}

fn error_reply(status: u16, wire_status: &str, message: &str) -> HttpResponse {
    let body = ErrorBody {
        status: wire_status.to_string(),
        message: Some(message.to_string()),
    };
    HttpResponse::new(status, serde_json::to_vec(&body).unwrap_or_default())
}

fn client_error(message: &str) -> HttpResponse {
    error_reply(400, "client_error", message)
}

fn unauthorized() -> HttpResponse {
    error_reply(401, "unauthorized", "invalid api key")
}

#[async_trait]
impl HttpTransport for SimulatedOperator {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let latency = {
            let mut state = self.state();
            state.requests.push(request.clone());
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let path = request.url.path().to_string();
        if self.take_unreachable(&path) {
            return Err(TransportError::Request("operator unreachable".into()));
        }

        Ok(match path.as_str() {
            CLIENT_GENERATE_PATH => self.handle_client_generate(&request),
            GENERATE_PATH => self.handle_server_generate(&request),
            REFRESH_PATH => self.handle_refresh(&request),
            _ => error_reply(404, "not_found", "unknown path"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{GenerationError, IdentityClient, RefreshError, ServerCredentials};
    use crate::clock::TokioClock;
    use crate::config::Settings;
    use crate::crypto::LiveCrypto;
    use crate::identity::{IdentityInput, IdentityStatus, NormalizedPhone};

    fn setup() -> (Arc<SimulatedOperator>, IdentityClient) {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::fixed());
        let operator = SimulatedOperator::new(clock.clone());
        let client = IdentityClient::new(
            &Settings::default(),
            operator.clone(),
            Arc::new(LiveCrypto),
            clock,
        );
        (operator, client)
    }

    fn phone() -> IdentityInput {
        IdentityInput::Phone(NormalizedPhone::new("+12345678901").unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_then_refresh() {
        let (operator, client) = setup();

        let generated = client
            .generate(&phone(), "sub", &operator.server_public_key(), "com.example")
            .await
            .unwrap();
        assert_eq!(generated.status, IdentityStatus::Established);
        let identity = generated.identity.unwrap();
        assert_eq!(identity.advertising_token, "AdvertisingToken-1");

        let refreshed = client
            .refresh(&identity.refresh_token, &identity.refresh_response_key)
            .await
            .unwrap();
        assert_eq!(refreshed.status, IdentityStatus::Refreshed);
        assert_eq!(
            refreshed.identity.unwrap().advertising_token,
            "AdvertisingToken-2"
        );
        assert_eq!(operator.request_count(REFRESH_PATH), 1);
        assert_eq!(operator.request_count(CLIENT_GENERATE_PATH), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_to_a_different_operator_key_is_rejected() {
        let (operator, client) = setup();
        let other = SimulatedOperator::new(Arc::new(TokioClock::fixed()));

        let err = client
            .generate(&phone(), "sub", &other.server_public_key(), "com.example")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::RequestFailure { status: 400, .. }));
        assert_eq!(operator.request_count(CLIENT_GENERATE_PATH), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_refresh_token() {
        let (_operator, client) = setup();
        let err = client
            .refresh("RefreshToken-unknown", "yptCUTBoZm1ffosgCrmuwg==")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RefreshError::ServerRejected {
                status: "invalid_token".into(),
                message: Some("unknown refresh token".into()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_replies() {
        let (operator, client) = setup();
        let identity = operator.issue_identity();
        operator.push_refresh_reply(OperatorReply::OptOut);
        operator.push_refresh_reply(OperatorReply::Unreachable);

        let outcome = client
            .refresh(&identity.refresh_token, &identity.refresh_response_key)
            .await
            .unwrap();
        assert_eq!(outcome.status, IdentityStatus::OptOut);

        let err = client
            .refresh(&identity.refresh_token, &identity.refresh_response_key)
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_side_generate() {
        let (operator, client) = setup();
        let secret = SymmetricKey::generate();
        operator.register_credentials("key-1", secret.clone());

        let outcome = client
            .generate_with_credentials(&phone(), &ServerCredentials::new("key-1", secret.clone()))
            .await
            .unwrap();
        assert_eq!(outcome.status, IdentityStatus::Established);

        let err = client
            .generate_with_credentials(&phone(), &ServerCredentials::new("key-2", secret))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::RequestFailure { status: 401, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_runs_on_tokio_time() {
        let (operator, client) = setup();
        let identity = operator.issue_identity();
        operator.set_latency(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        client
            .refresh(&identity.refresh_token, &identity.refresh_response_key)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }
}
