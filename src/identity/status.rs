//! Identity status codes

use serde::{Deserialize, Serialize};

/// Status of the current identity.
///
/// Persisted as the integer codes shared with the web and mobile SDKs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum IdentityStatus {
    Established,
    Refreshed,
    Expired,
    NoIdentity,
    Invalid,
    RefreshExpired,
    OptOut,
}

impl IdentityStatus {
    pub const ALL: [IdentityStatus; 7] = [
        IdentityStatus::Established,
        IdentityStatus::Refreshed,
        IdentityStatus::Expired,
        IdentityStatus::NoIdentity,
        IdentityStatus::Invalid,
        IdentityStatus::RefreshExpired,
        IdentityStatus::OptOut,
    ];

    pub fn code(self) -> i32 {
        match self {
            IdentityStatus::Established => 0,
            IdentityStatus::Refreshed => 1,
            IdentityStatus::Expired => 100,
            IdentityStatus::NoIdentity => -1,
            IdentityStatus::Invalid => -2,
            IdentityStatus::RefreshExpired => -3,
            IdentityStatus::OptOut => -4,
        }
    }

    /// The advertising token may be used.
    pub fn is_valid(self) -> bool {
        matches!(self, IdentityStatus::Established | IdentityStatus::Refreshed)
    }
}

impl TryFrom<i32> for IdentityStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        IdentityStatus::ALL
            .into_iter()
            .find(|status| status.code() == code)
            .ok_or_else(|| format!("unknown identity status code {}", code))
    }
}

impl From<IdentityStatus> for i32 {
    fn from(status: IdentityStatus) -> Self {
        status.code()
    }
}

impl std::fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IdentityStatus::Established => "established",
            IdentityStatus::Refreshed => "refreshed",
            IdentityStatus::Expired => "expired",
            IdentityStatus::NoIdentity => "no identity",
            IdentityStatus::Invalid => "invalid",
            IdentityStatus::RefreshExpired => "refresh expired",
            IdentityStatus::OptOut => "opt out",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for status in IdentityStatus::ALL {
            assert_eq!(IdentityStatus::try_from(status.code()), Ok(status));
        }
        assert!(IdentityStatus::try_from(42).is_err());
    }

    #[test]
    fn test_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&IdentityStatus::OptOut).unwrap(), "-4");
        assert_eq!(
            serde_json::from_str::<IdentityStatus>("100").unwrap(),
            IdentityStatus::Expired
        );
        assert!(serde_json::from_str::<IdentityStatus>("7").is_err());
    }

    #[test]
    fn test_validity() {
        assert!(IdentityStatus::Established.is_valid());
        assert!(IdentityStatus::Refreshed.is_valid());
        assert!(!IdentityStatus::Expired.is_valid());
        assert!(!IdentityStatus::OptOut.is_valid());
    }
}
