// Identifier rules shared by accounts, events, outcomes, promotions and slips.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{EngineError, EngineResult};

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.:-]{1,64}$").expect("identifier pattern is valid")
    })
}

/// Reject identifiers that could break composite store keys.
pub fn validate_id(kind: &str, value: &str) -> EngineResult<()> {
    if id_pattern().is_match(value) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "{} id '{}' must be 1-64 characters of [A-Za-z0-9_.:-]",
            kind, value
        )))
    }
}

/// Fresh engine-generated identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("event", "epl-2026-ars-che").is_ok());
        assert!(validate_id("account", "player:42").is_ok());
        assert!(validate_id("event", "").is_err());
        assert!(validate_id("event", "a/b").is_err());
        assert!(validate_id("event", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_generated_ids_are_valid() {
        assert!(validate_id("slip", &new_id()).is_ok());
    }
}
