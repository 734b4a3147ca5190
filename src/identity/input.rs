//! Personal identifiers a new identity is generated from
//!
//! Raw emails and phone numbers are normalized here and only ever leave the
//! device as a base64 SHA-256 hash.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Identifier submitted to the generate endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityInput {
    Email(NormalizedEmail),
    /// Base64 SHA-256 of a normalized email, hashed by the caller.
    EmailHash(String),
    Phone(NormalizedPhone),
    /// Base64 SHA-256 of a normalized phone number, hashed by the caller.
    PhoneHash(String),
}

impl IdentityInput {
    /// The value sent on the wire: a hash for raw identifiers, the given
    /// value for pre-hashed ones.
    pub fn hashed_value(&self) -> String {
        match self {
            IdentityInput::Email(email) => sha256_base64(email.as_str()),
            IdentityInput::Phone(phone) => sha256_base64(phone.as_str()),
            IdentityInput::EmailHash(hash) | IdentityInput::PhoneHash(hash) => hash.clone(),
        }
    }

    pub fn is_email(&self) -> bool {
        matches!(self, IdentityInput::Email(_) | IdentityInput::EmailHash(_))
    }
}

fn sha256_base64(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    STANDARD.encode(digest)
}

/// An email address normalized for hashing.
///
/// Lower-cased, whitespace removed. For `gmail.com` the dots and any
/// `+extension` in the local part are dropped as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedEmail(String);

impl NormalizedEmail {
    pub fn new(raw: &str) -> Option<Self> {
        normalize_email(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NormalizedEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.to_lowercase();

    let mut local = String::new();
    // Local part without dots and without the `+extension`, used for gmail.
    let mut local_canonical = String::new();
    let mut domain = String::new();
    let mut pending_spaces = String::new();
    let mut in_domain = false;
    let mut in_extension = false;

    for c in email.chars() {
        if !in_domain {
            match c {
                ' ' => {}
                '@' => in_domain = true,
                '.' => local.push(c),
                '+' => {
                    local.push(c);
                    in_extension = true;
                }
                _ => {
                    local.push(c);
                    if !in_extension {
                        local_canonical.push(c);
                    }
                }
            }
        } else {
            match c {
                '@' => return None,
                ' ' => pending_spaces.push(c),
                _ => {
                    domain.push_str(&pending_spaces);
                    pending_spaces.clear();
                    domain.push(c);
                }
            }
        }
    }

    if domain.is_empty() {
        return None;
    }

    let local = if domain == "gmail.com" {
        local_canonical
    } else {
        local
    };
    if local.is_empty() {
        return None;
    }

    Some(format!("{}@{}", local, domain))
}

/// A phone number already in E.164 form: `+` followed by 10 to 15 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPhone(String);

impl NormalizedPhone {
    /// Accepts the number only if it is already normalized; nothing is rewritten.
    pub fn new(normalized: &str) -> Option<Self> {
        let digits = normalized.strip_prefix('+')?;
        let valid = (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit());
        valid.then(|| Self(normalized.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NormalizedPhone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalization() {
        let cases = [
            ("myemail@example.com", "myemail@example.com"),
            ("MyEmail@example.com", "myemail@example.com"),
            ("My.Email@example.com", "my.email@example.com"),
            ("JaneSaoirse+Work@example.com", "janesaoirse+work@example.com"),
            ("JANE.SAOIRSE@gmail.com", "janesaoirse@gmail.com"),
            ("JaneSaoirse+Work@gmail.com", "janesaoirse@gmail.com"),
            ("JaneSaoirse+@gmail.com", "janesaoirse@gmail.com"),
            ("JaneSaoirse+Work+more.work@gmail.com", "janesaoirse@gmail.com"),
            ("TEst.TEST@Test.com ", "test.test@test.com"),
            ("+test@test.com", "+test@test.com"),
            ("test+test@gmail.com", "test@gmail.com"),
            ("  testtest@test.com  ", "testtest@test.com"),
            (" TEstTEst@GMail.Com  ", "testtest@gmail.com"),
            ("TEst.TEst+123@GMail.Com", "testtest@gmail.com"),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                NormalizedEmail::new(raw).map(|e| e.to_string()).as_deref(),
                Some(expected),
                "{:?}",
                raw
            );
        }
    }

    #[test]
    fn test_email_rejections() {
        for raw in [
            "", " @", "@", "a@", "@b", "@b.com", "+", " ", "+@gmail.com", ".+@gmail.com",
            "a@ba@z.com",
        ] {
            assert!(NormalizedEmail::new(raw).is_none(), "{:?}", raw);
        }
    }

    #[test]
    fn test_phone_normalization() {
        for ok in [
            "+1234567890",
            "+12345678901",
            "+123456789012345",
        ] {
            assert!(NormalizedPhone::new(ok).is_some(), "{:?}", ok);
        }
        for bad in [
            "",
            "+",
            "1234567890",
            "+123456789",
            "+ 1234 56789",
            "+1234567890123456",
            "+1234567890A",
            "+1234567890 ",
            "+12345+67890",
            "(555) 555-5555",
        ] {
            assert!(NormalizedPhone::new(bad).is_none(), "{:?}", bad);
        }
    }

    #[test]
    fn test_email_hashing() {
        let cases = [
            ("myemail@example.com", "FsGNM28LJQ8OLZB0Us65ZYp07NrovJSGTCMSKnLMJ6U="),
            ("my.email@example.com", "4itTvG+HEnTzpiqzejyu1yFPwU1nYhWpaiQvz62hyB8="),
            ("janesaoirse+work@example.com", "KKruSBUjDNO069iMUVImVQZm6RrAGZKeOtrD9mwogYA="),
            ("janesaoirse@gmail.com", "ku4mBX7Z3qJTXWyLFB1INzkyR2WZGW4ANSJUiW21iI8="),
        ];
        for (email, expected) in cases {
            let input = IdentityInput::Email(NormalizedEmail::new(email).unwrap());
            assert_eq!(input.hashed_value(), expected);
        }
    }

    #[test]
    fn test_phone_hashing() {
        let cases = [
            ("+11234567890", "H6a42YbZuc0BvzaVGBUVi73p9SDAVnyDXf40eD0KQjE="),
            ("+6512345678", "xn2K5iZn+pV1H0nXXILY8ggcGt9dClVnIX13SXVVpZ8="),
        ];
        for (phone, expected) in cases {
            let input = IdentityInput::Phone(NormalizedPhone::new(phone).unwrap());
            assert_eq!(input.hashed_value(), expected);
        }
    }

    #[test]
    fn test_prehashed_values_pass_through() {
        let input = IdentityInput::EmailHash("im-a-hash".into());
        assert_eq!(input.hashed_value(), "im-a-hash");
        assert!(input.is_email());
        assert!(!IdentityInput::PhoneHash("p".into()).is_email());
    }
}
