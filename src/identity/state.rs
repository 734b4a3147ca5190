//! Lifecycle state held by the identity manager

use serde::{Deserialize, Serialize};

use super::{Identity, IdentityPackage, IdentityStatus};

/// The authoritative identity state. Exactly one is current at any time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    #[default]
    NoIdentity,
    Established(Identity),
    Refreshed(Identity),
    /// The advertising token has expired but the refresh token is still usable.
    Expired(Identity),
    /// Both tokens are dead; a new identity must be generated.
    RefreshExpired,
    /// The user declined; cleared only by an explicit reset.
    OptOut,
    Invalid,
}

impl State {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            State::Established(identity) | State::Refreshed(identity) | State::Expired(identity) => {
                Some(identity)
            }
            State::NoIdentity | State::RefreshExpired | State::OptOut | State::Invalid => None,
        }
    }

    pub fn status(&self) -> IdentityStatus {
        match self {
            State::NoIdentity => IdentityStatus::NoIdentity,
            State::Established(_) => IdentityStatus::Established,
            State::Refreshed(_) => IdentityStatus::Refreshed,
            State::Expired(_) => IdentityStatus::Expired,
            State::RefreshExpired => IdentityStatus::RefreshExpired,
            State::OptOut => IdentityStatus::OptOut,
            State::Invalid => IdentityStatus::Invalid,
        }
    }

    /// Rebuild a state from a record. Identity-bearing statuses without an
    /// identity collapse to `NoIdentity`.
    pub fn from_package(package: &IdentityPackage) -> State {
        let identity = package.identity.clone();
        match (package.status, identity) {
            (IdentityStatus::Established, Some(identity)) => State::Established(identity),
            (IdentityStatus::Refreshed, Some(identity)) => State::Refreshed(identity),
            (IdentityStatus::Expired, Some(identity)) => State::Expired(identity),
            (IdentityStatus::Established | IdentityStatus::Refreshed | IdentityStatus::Expired, None)
            | (IdentityStatus::NoIdentity, _) => State::NoIdentity,
            (IdentityStatus::RefreshExpired, _) => State::RefreshExpired,
            (IdentityStatus::OptOut, _) => State::OptOut,
            (IdentityStatus::Invalid, _) => State::Invalid,
        }
    }
}
