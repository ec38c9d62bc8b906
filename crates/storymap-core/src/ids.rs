//! Identifier generation and the legacy prefix conventions.
//!
//! New stories get plain UUIDv7 strings, which sort by creation time. Manual
//! pins keep the `manual_` prefix so that pin tables without a `source`
//! column still tell manual pins apart. Organizations submitted to a story
//! table without a kind column get the `organization_` prefix for the same
//! reason.

use uuid::Uuid;

use crate::defaults::{MANUAL_PIN_PREFIX, MAX_ID_LENGTH, ORGANIZATION_ID_PREFIX};
use crate::error::{Error, Result};

/// Generate a time-ordered story identifier.
#[inline]
pub fn new_story_id() -> String {
    Uuid::now_v7().to_string()
}

/// Story identifier that marks an organization on its own.
pub fn new_organization_story_id() -> String {
    format!("{}{}", ORGANIZATION_ID_PREFIX, Uuid::now_v7().simple())
}

/// Generate an identifier for an admin-authored pin.
pub fn new_manual_pin_id() -> String {
    format!("{}{}", MANUAL_PIN_PREFIX, Uuid::now_v7().simple())
}

/// Legacy provenance signal for pins stored without a `source` column.
pub fn is_manual_pin_id(id: &str) -> bool {
    id.starts_with(MANUAL_PIN_PREFIX)
}

/// Legacy organization signal carried in the identifier.
pub fn has_organization_prefix(id: &str) -> bool {
    id.starts_with(ORGANIZATION_ID_PREFIX)
}

/// Check a caller-supplied identifier.
///
/// Accepts ASCII alphanumerics, `-` and `_`, up to [`MAX_ID_LENGTH`]
/// characters. The `manual_` prefix is reserved for standalone pins.
pub fn validate_supplied_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::MissingField("id"));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(Error::Validation(format!(
            "identifier exceeds {} characters",
            MAX_ID_LENGTH
        )));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
    {
        return Err(Error::Validation(format!(
            "identifier contains invalid character '{}'",
            bad
        )));
    }
    if is_manual_pin_id(id) {
        return Err(Error::Validation(format!(
            "identifier prefix '{}' is reserved for standalone pins",
            MANUAL_PIN_PREFIX
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_ids_are_uuid_v7() {
        let id = new_story_id();
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn test_story_ids_sort_by_creation() {
        let a = new_story_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_story_id();
        assert!(a < b);
    }

    #[test]
    fn test_manual_pin_ids_carry_prefix() {
        let id = new_manual_pin_id();
        assert!(is_manual_pin_id(&id));
        assert_ne!(id, new_manual_pin_id());
    }

    #[test]
    fn test_organization_prefix() {
        assert!(has_organization_prefix("organization_42"));
        assert!(!has_organization_prefix("my_organization_42"));
        let id = new_organization_story_id();
        assert!(has_organization_prefix(&id));
        assert!(validate_supplied_id(&id).is_ok());
    }

    #[test]
    fn test_validate_supplied_id() {
        assert!(validate_supplied_id("s1").is_ok());
        assert!(validate_supplied_id("organization_17").is_ok());
        assert!(matches!(
            validate_supplied_id(""),
            Err(Error::MissingField("id"))
        ));
        assert!(validate_supplied_id("has space").is_err());
        assert!(validate_supplied_id("manual_123").is_err());
        assert!(validate_supplied_id(&"a".repeat(MAX_ID_LENGTH + 1)).is_err());
    }
}
