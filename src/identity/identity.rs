//! The token set issued by the operator

use serde::{Deserialize, Serialize};

use super::Millis;

/// An advertising identity as returned by the generate and refresh endpoints.
///
/// Timestamps are epoch milliseconds. `refresh_from <= identity_expires <=
/// refresh_expires` is expected but not guaranteed; validation copes with
/// any ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Consumer-facing pseudonymous identifier.
    pub advertising_token: String,
    /// Bearer credential for the refresh endpoint.
    pub refresh_token: String,
    /// When the advertising token stops being usable.
    pub identity_expires: Millis,
    /// Earliest time a refresh should be attempted.
    pub refresh_from: Millis,
    /// After this the refresh token is dead and a new identity must be generated.
    pub refresh_expires: Millis,
    /// Base64 key that decrypts the refresh response.
    pub refresh_response_key: String,
}

impl Identity {
    pub fn is_identity_expired(&self, now: Millis) -> bool {
        now >= self.identity_expires
    }

    pub fn is_refresh_expired(&self, now: Millis) -> bool {
        now >= self.refresh_expires
    }

    pub fn is_due_for_refresh(&self, now: Millis) -> bool {
        now >= self.refresh_from
    }
}
