//! Envelope encryption for identity requests and responses
//!
//! Requests to the operator are sealed with AES-GCM under a key agreed via
//! P-256 ECDH with the operator's published public key. Responses come back
//! as base64 `nonce || ciphertext || tag` envelopes.
//!
//! - `SymmetricKey`: AES-128/256 key material, zeroed on drop
//! - `server_key`: operator public key parsing and key agreement
//! - `envelope`: sealing, opening and request framing

pub mod envelope;
pub mod server_key;

pub use envelope::{
    decrypt, decrypt_envelope, encrypt, frame_request, seal_request_envelope, PrefixStrip,
    SealedBox, NONCE_LEN, REQUEST_ENVELOPE_VERSION, RESPONSE_PREFIX_LEN, TAG_LEN,
};
pub use server_key::{
    operator_agree, parse_server_key, EphemeralPublicKey, SERVER_KEY_PREFIX_LEN,
};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid server public key: {0}")]
    InvalidServerKey(String),

    #[error("Invalid symmetric key length: {0} bytes")]
    InvalidKeyLength(usize),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

/// AES-GCM key material.
///
/// Refresh response keys are 16 bytes (AES-128); keys agreed with the
/// operator are 32 bytes (AES-256).
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    bytes: Vec<u8>,
}

impl SymmetricKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        match bytes.len() {
            16 | 32 => Ok(Self {
                bytes: bytes.to_vec(),
            }),
            other => Err(CryptoError::InvalidKeyLength(other)),
        }
    }

    /// Decode base64 key material, e.g. an identity's `refresh_response_key`.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidKeyLength(0))?;
        Self::from_slice(&bytes)
    }

    /// Generate a random 256-bit key.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey({} bytes)", self.bytes.len())
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Crypto capability used by the identity client.
///
/// `LiveCrypto` is the production implementation. Tests substitute an
/// implementation with a known key so they can forge operator responses.
pub trait EnvelopeCrypto: Send + Sync {
    /// Parse the operator key and agree a fresh symmetric key with it.
    fn parse_server_key(
        &self,
        encoded: &str,
    ) -> Result<(SymmetricKey, EphemeralPublicKey), CryptoError>;

    /// Seal `plaintext`, authenticating `associated_data`.
    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &SymmetricKey,
        associated_data: &[u8],
    ) -> Result<SealedBox, CryptoError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LiveCrypto;

impl EnvelopeCrypto for LiveCrypto {
    fn parse_server_key(
        &self,
        encoded: &str,
    ) -> Result<(SymmetricKey, EphemeralPublicKey), CryptoError> {
        parse_server_key(encoded)
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &SymmetricKey,
        associated_data: &[u8],
    ) -> Result<SealedBox, CryptoError> {
        encrypt(plaintext, key, associated_data)
    }
}
