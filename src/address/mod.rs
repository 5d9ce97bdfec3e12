//! Splitting raw caller input into a local part and a domain.
//!
//! Only the shape is checked: exactly one `@`, both sides non-empty.
//! Anything finer is left to the mail server answering `RCPT TO`.

mod list;

pub use list::split_address_list;

use std::fmt;

use thiserror::Error;

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub local: String,
    pub domain: String,
}

impl fmt::Display for ParsedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address contains no '@'")]
    MissingAt,
    #[error("address contains {count} '@' characters, expected exactly one")]
    MultipleAt { count: usize },
    #[error("local part is empty")]
    EmptyLocalPart,
    #[error("domain is empty")]
    EmptyDomain,
}

/// Split `raw` on its single `@`.
///
/// The input is taken as-is: no trimming, no case folding. Callers reading
/// user input are expected to trim first (see [`split_address_list`]).
pub fn parse_address(raw: &str) -> Result<ParsedAddress, AddressError> {
    let (local, domain) = match raw.matches('@').count() {
        0 => return Err(AddressError::MissingAt),
        1 => raw.split_once('@').ok_or(AddressError::MissingAt)?,
        count => return Err(AddressError::MultipleAt { count }),
    };

    if local.is_empty() {
        return Err(AddressError::EmptyLocalPart);
    }
    if domain.is_empty() {
        return Err(AddressError::EmptyDomain);
    }

    Ok(ParsedAddress {
        local: local.to_string(),
        domain: domain.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_basic_address() {
        let parsed = parse_address("alice@example.com").unwrap();
        assert_eq!(parsed.local, "alice");
        assert_eq!(parsed.domain, "example.com");
        assert_eq!(parsed.to_string(), "alice@example.com");
    }

    #[test]
    fn rejects_missing_at() {
        assert_eq!(parse_address("not-an-email"), Err(AddressError::MissingAt));
        assert_eq!(parse_address(""), Err(AddressError::MissingAt));
    }

    #[test]
    fn rejects_double_at() {
        assert_eq!(
            parse_address("user@@bad.com"),
            Err(AddressError::MultipleAt { count: 2 })
        );
        assert_eq!(
            parse_address("a@b@c"),
            Err(AddressError::MultipleAt { count: 2 })
        );
    }

    #[test]
    fn rejects_empty_sides() {
        assert_eq!(parse_address("@example.com"), Err(AddressError::EmptyLocalPart));
        assert_eq!(parse_address("alice@"), Err(AddressError::EmptyDomain));
        assert_eq!(parse_address("@"), Err(AddressError::EmptyLocalPart));
    }

    #[test]
    fn keeps_input_untrimmed() {
        let parsed = parse_address(" alice@example.com").unwrap();
        assert_eq!(parsed.local, " alice");
    }

    proptest! {
        #[test]
        fn single_at_round_trips(local in "[a-z0-9._+-]{1,20}", domain in "[a-z0-9.-]{1,30}") {
            let raw = format!("{local}@{domain}");
            let parsed = parse_address(&raw).unwrap();
            prop_assert_eq!(parsed.local, local);
            prop_assert_eq!(parsed.domain, domain);
        }

        #[test]
        fn without_at_always_fails(raw in "[^@]{0,40}") {
            prop_assert_eq!(parse_address(&raw), Err(AddressError::MissingAt));
        }

        #[test]
        fn domain_never_contains_at(raw in ".{0,40}") {
            if let Ok(parsed) = parse_address(&raw) {
                prop_assert!(!parsed.domain.contains('@'));
                prop_assert!(!parsed.domain.is_empty());
                prop_assert!(!parsed.local.is_empty());
            }
        }
    }
}
