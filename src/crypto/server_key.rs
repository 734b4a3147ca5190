//! Operator public key parsing and P-256 key agreement
//!
//! The operator key handed to integrators looks like `UID2-X-P-<base64 SPKI>`:
//! a 9-byte ASCII prefix followed by a base64 DER SubjectPublicKeyInfo.
//! Each generate call agrees a fresh ephemeral key with it; the raw ECDH
//! shared secret is the AES-256 key for that request and its response.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p256::ecdh::EphemeralSecret;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use super::{CryptoError, SymmetricKey};

/// Length of the environment/type prefix on the operator key string.
pub const SERVER_KEY_PREFIX_LEN: usize = 9;

/// Our half of the key agreement, sent to the operator with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralPublicKey(PublicKey);

impl EphemeralPublicKey {
    /// DER-encoded SubjectPublicKeyInfo.
    pub fn to_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    pub fn to_der_base64(&self) -> Result<String, CryptoError> {
        Ok(STANDARD.encode(self.to_der()?))
    }
}

impl From<PublicKey> for EphemeralPublicKey {
    fn from(key: PublicKey) -> Self {
        Self(key)
    }
}

/// Decode the operator's public key from its prefixed string form.
pub fn decode_server_key(encoded: &str) -> Result<PublicKey, CryptoError> {
    let body = encoded
        .as_bytes()
        .get(SERVER_KEY_PREFIX_LEN..)
        .unwrap_or_default();

    let der = STANDARD
        .decode(body)
        .map_err(|_| CryptoError::InvalidServerKey("Invalid server public key as base64".into()))?;

    PublicKey::from_public_key_der(&der).map_err(|_| {
        CryptoError::InvalidServerKey("Invalid server public key representation".into())
    })
}

/// Generate an ephemeral key pair and agree a symmetric key with `server`.
pub fn agree(server: &PublicKey) -> Result<(SymmetricKey, EphemeralPublicKey), CryptoError> {
    let secret = EphemeralSecret::random(&mut OsRng);
    let public = EphemeralPublicKey(secret.public_key());
    let shared = secret.diffie_hellman(server);
    let key = SymmetricKey::from_slice(shared.raw_secret_bytes().as_slice())?;
    Ok((key, public))
}

/// Operator side of the agreement: derive the request key from the
/// client's DER-encoded ephemeral public key.
pub fn operator_agree(server: &SecretKey, client_der: &[u8]) -> Result<SymmetricKey, CryptoError> {
    let client = PublicKey::from_public_key_der(client_der)
        .map_err(|e| CryptoError::InvalidServerKey(e.to_string()))?;
    let shared = p256::ecdh::diffie_hellman(server.to_nonzero_scalar(), client.as_affine());
    SymmetricKey::from_slice(shared.raw_secret_bytes().as_slice())
}

/// Parse the operator key and derive this request's symmetric key.
pub fn parse_server_key(encoded: &str) -> Result<(SymmetricKey, EphemeralPublicKey), CryptoError> {
    let server = decode_server_key(encoded)?;
    agree(&server)
}
