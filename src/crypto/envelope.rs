//! AES-GCM sealing and opening of identity envelopes
//!
//! Response envelope (base64): `nonce (12) || ciphertext || tag (16)`.
//! Decrypted responses may carry a 16-byte `timestamp || nonce` prefix which
//! the caller asks to strip.
//!
//! Request envelope (server-side generate): `0x01 || nonce || ciphertext || tag`
//! over the plaintext `timestamp_ms (8, big-endian) || nonce (8) || json || '\n'`.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

use super::{CryptoError, SymmetricKey};

/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;
/// Length of the `timestamp || nonce` prefix on decrypted response payloads.
pub const RESPONSE_PREFIX_LEN: usize = 16;
/// Version byte leading an encrypted request envelope.
pub const REQUEST_ENVELOPE_VERSION: u8 = 0x01;

/// Output of an AES-GCM seal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl SealedBox {
    /// `ciphertext || tag`, the form sent as the generate request `payload`.
    pub fn ciphertext_and_tag(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// `nonce || ciphertext || tag`, the form used by response envelopes.
    pub fn combined(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }
}

/// Whether a decrypted payload starts with the 16-byte `timestamp || nonce` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixStrip {
    None,
    TimestampAndNonce,
}

impl PrefixStrip {
    fn len(self) -> usize {
        match self {
            PrefixStrip::None => 0,
            PrefixStrip::TimestampAndNonce => RESPONSE_PREFIX_LEN,
        }
    }
}

fn seal(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
    msg: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let nonce = Nonce::from_slice(nonce);
    let payload = Payload { msg, aad };
    let sealed = match key.len() {
        16 => Aes128Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?
            .encrypt(nonce, payload),
        32 => Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?
            .encrypt(nonce, payload),
        other => return Err(CryptoError::InvalidKeyLength(other)),
    };
    sealed.map_err(|e| CryptoError::Encryption(e.to_string()))
}

fn open(
    key: &SymmetricKey,
    nonce: &[u8],
    ciphertext_and_tag: &[u8],
    aad: &[u8],
) -> Option<Vec<u8>> {
    let nonce = Nonce::from_slice(nonce);
    let payload = Payload {
        msg: ciphertext_and_tag,
        aad,
    };
    match key.len() {
        16 => Aes128Gcm::new_from_slice(key.as_bytes())
            .ok()?
            .decrypt(nonce, payload)
            .ok(),
        32 => Aes256Gcm::new_from_slice(key.as_bytes())
            .ok()?
            .decrypt(nonce, payload)
            .ok(),
        _ => None,
    }
}

/// Seal `plaintext` under `key` with a random 96-bit nonce, authenticating
/// `associated_data` without encrypting it.
pub fn encrypt(
    plaintext: &[u8],
    key: &SymmetricKey,
    associated_data: &[u8],
) -> Result<SealedBox, CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut sealed = seal(key, &nonce, plaintext, associated_data)?;
    if sealed.len() < TAG_LEN {
        return Err(CryptoError::Encryption("sealed output shorter than tag".into()));
    }
    let tag_bytes = sealed.split_off(sealed.len() - TAG_LEN);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&tag_bytes);

    Ok(SealedBox {
        nonce,
        ciphertext: sealed,
        tag,
    })
}

/// Decode base64, skipping anything outside the standard alphabet
/// (line breaks, whitespace, quotes around a JSON string body).
fn decode_lenient(data: &[u8]) -> Option<Vec<u8>> {
    let filtered: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/' || *b == b'=')
        .collect();
    if filtered.is_empty() {
        return None;
    }
    STANDARD.decode(filtered).ok()
}

/// Open a base64 `nonce || ciphertext || tag` envelope.
///
/// Returns `None` on any decode or authentication failure: error bodies that
/// are not base64 at all are routine and must not abort the caller.
pub fn decrypt_envelope(data: &[u8], key: &SymmetricKey, strip: PrefixStrip) -> Option<Vec<u8>> {
    let decoded = decode_lenient(data)?;
    if decoded.len() < NONCE_LEN + TAG_LEN {
        return None;
    }

    let (nonce, rest) = decoded.split_at(NONCE_LEN);
    let mut plaintext = open(key, nonce, rest, &[])?;

    let prefix = strip.len();
    if plaintext.len() < prefix {
        return None;
    }
    Some(plaintext.split_off(prefix))
}

/// Open raw `nonce || ciphertext || tag` bytes, checking `associated_data`.
pub fn decrypt(combined: &[u8], key: &SymmetricKey, associated_data: &[u8]) -> Option<Vec<u8>> {
    if combined.len() < NONCE_LEN + TAG_LEN {
        return None;
    }
    let (nonce, rest) = combined.split_at(NONCE_LEN);
    open(key, nonce, rest, associated_data)
}

/// Frame a request payload: `timestamp_ms (8, BE) || nonce (8) || payload || '\n'`.
pub fn frame_request(timestamp_ms: i64, nonce: [u8; 8], payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(16 + payload.len() + 1);
    body.extend_from_slice(&timestamp_ms.to_be_bytes());
    body.extend_from_slice(&nonce);
    body.extend_from_slice(payload);
    body.push(b'\n');
    body
}

/// Frame, seal and base64-encode a request for the server-side generate endpoint.
pub fn seal_request_envelope(
    key: &SymmetricKey,
    timestamp_ms: i64,
    payload: &[u8],
) -> Result<String, CryptoError> {
    let mut request_nonce = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut request_nonce);

    let framed = frame_request(timestamp_ms, request_nonce, payload);
    let sealed = encrypt(&framed, key, &[])?;

    let mut envelope = Vec::with_capacity(1 + NONCE_LEN + sealed.ciphertext.len() + TAG_LEN);
    envelope.push(REQUEST_ENVELOPE_VERSION);
    envelope.extend_from_slice(&sealed.combined());
    Ok(STANDARD.encode(envelope))
}
