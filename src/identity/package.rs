//! The persisted identity record and the validation that produces it

use serde::{Deserialize, Serialize};

use super::{Identity, IdentityStatus, Millis};

pub const MSG_NOT_AVAILABLE: &str = "Identity not available";
pub const MSG_BAD_ADVERTISING_TOKEN: &str = "advertising_token is not available or is not valid";
pub const MSG_BAD_REFRESH_TOKEN: &str = "refresh_token is not available or is not valid";
pub const MSG_REFRESH_EXPIRED: &str = "Identity expired, refresh expired";
pub const MSG_EXPIRED: &str = "Identity expired, refresh still valid";
pub const MSG_ESTABLISHED: &str = "Identity established";
pub const MSG_REFRESHED: &str = "Identity refreshed";
pub const MSG_OPTED_OUT: &str = "User opted out";

/// The unit written to and read from an identity store.
///
/// One record exists at a time; saving overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPackage {
    pub valid: bool,
    pub error_message: Option<String>,
    pub identity: Option<Identity>,
    pub status: IdentityStatus,
}

impl IdentityPackage {
    fn new(status: IdentityStatus, identity: Option<Identity>, message: &str) -> Self {
        Self {
            valid: status.is_valid(),
            error_message: Some(message.to_string()),
            identity,
            status,
        }
    }

    pub fn no_identity() -> Self {
        Self::new(IdentityStatus::NoIdentity, None, MSG_NOT_AVAILABLE)
    }

    pub fn opt_out() -> Self {
        Self::new(IdentityStatus::OptOut, None, MSG_OPTED_OUT)
    }

    pub fn refresh_expired(message: Option<&str>) -> Self {
        Self::new(
            IdentityStatus::RefreshExpired,
            None,
            message.unwrap_or(MSG_REFRESH_EXPIRED),
        )
    }

    pub fn established(identity: Identity) -> Self {
        Self::new(IdentityStatus::Established, Some(identity), MSG_ESTABLISHED)
    }
}

/// Derive the record for `candidate` at time `now`.
///
/// `is_new` selects Established over Refreshed for a currently valid
/// identity: it is set when no identity was held before this one.
pub fn derive_package(candidate: Option<&Identity>, now: Millis, is_new: bool) -> IdentityPackage {
    let Some(identity) = candidate else {
        return IdentityPackage::no_identity();
    };

    if identity.advertising_token.is_empty() {
        return IdentityPackage::new(IdentityStatus::Invalid, None, MSG_BAD_ADVERTISING_TOKEN);
    }
    if identity.refresh_token.is_empty() {
        return IdentityPackage::new(IdentityStatus::Invalid, None, MSG_BAD_REFRESH_TOKEN);
    }

    if identity.is_refresh_expired(now) {
        return IdentityPackage::new(IdentityStatus::RefreshExpired, None, MSG_REFRESH_EXPIRED);
    }

    if identity.is_identity_expired(now) {
        return IdentityPackage::new(IdentityStatus::Expired, Some(identity.clone()), MSG_EXPIRED);
    }

    if is_new {
        IdentityPackage::new(IdentityStatus::Established, Some(identity.clone()), MSG_ESTABLISHED)
    } else {
        IdentityPackage::new(IdentityStatus::Refreshed, Some(identity.clone()), MSG_REFRESHED)
    }
}
