//! Operator API client
//!
//! - `transport`: the HTTP seam and its reqwest implementation
//! - `payload`: JSON request and response bodies
//! - `api`: refresh and generate calls
//! - `simulated`: an in-process operator for tests

pub mod api;
pub mod payload;
pub mod simulated;
pub mod transport;

pub use api::{
    IdentityClient, RefreshOutcome, ServerCredentials, CLIENT_GENERATE_PATH, GENERATE_PATH,
    REFRESH_PATH,
};
pub use payload::{ApiResponse, ResponseStatus};
pub use simulated::{OperatorReply, SimulatedOperator};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to read response body: {0}")]
    Body(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Refresh rejected with status {status}: {message:?}")]
    ServerRejected {
        status: String,
        message: Option<String>,
    },

    #[error("Undecodable error response (HTTP {http_status}): {message}")]
    Decoding { http_status: u16, message: String },

    #[error("Failed to decrypt refresh response payload")]
    DecryptPayload,

    #[error("Unexpected response status {status}: {message:?}")]
    UnexpectedStatus {
        status: String,
        message: Option<String>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<TransportError> for RefreshError {
    fn from(e: TransportError) -> Self {
        RefreshError::Transport(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Generate request failed with HTTP status {status}")]
    RequestFailure { status: u16, body: String },

    #[error("Failed to decrypt generate response")]
    DecryptionFailure,

    #[error("Generate response did not contain an identity")]
    InvalidResponse,

    #[error("Unexpected response status {status}: {message:?}")]
    UnexpectedStatus {
        status: String,
        message: Option<String>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl From<TransportError> for GenerationError {
    fn from(e: TransportError) -> Self {
        GenerationError::Transport(e.to_string())
    }
}
