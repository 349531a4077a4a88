// ============================================================================
// Engine Errors
// ============================================================================
//
// Every failure the engine can report, with a stable machine-readable code.
//
// Categories:
//   - Validation: bad input, rejected before any read of shared state
//   - Business:   rule failures after read-only checks, nothing written
//   - Transient:  retry budget or deadline exhausted, safe to retry
//   - Integrity:  structural invariant violated, fatal and logged
//   - Internal:   storage / serialization faults
//
// ============================================================================

use rust_decimal::Decimal;
use serde::Serialize;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Validation,
    Business,
    Transient,
    Integrity,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid stake: {0}")]
    InvalidStake(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Slip contains more than one selection for event {0}")]
    DuplicateEventSelection(String),

    #[error("Slip has {count} selections, the limit is {max}")]
    TooManySelections { count: usize, max: usize },

    #[error("Outcome {outcome_id} is unavailable: {reason}")]
    OutcomeUnavailable { outcome_id: String, reason: String },

    #[error("Odds out of range: {0}")]
    OddsOutOfRange(String),

    #[error("Outcome not found: {0}")]
    OutcomeNotFound(String),

    #[error("Outcome suspended: {0}")]
    OutcomeSuspended(String),

    #[error("Promotion {promotion_id} is not applicable: {reason}")]
    PromotionNotApplicable { promotion_id: String, reason: String },

    #[error("Insufficient funds: {available} available, {required} required")]
    InsufficientFunds { available: Decimal, required: Decimal },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Event {0} was already settled with a different result")]
    EventAlreadyResolved(String),

    #[error("Idempotency key {0} was already used for a different request")]
    IdempotencyKeyReused(String),

    #[error("Concurrent modification, gave up after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("Operation exceeded its deadline of {0} ms")]
    Timeout(u64),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Stable reason code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidStake(_) => "INVALID_STAKE",
            EngineError::InvalidAmount(_) => "INVALID_AMOUNT",
            EngineError::DuplicateEventSelection(_) => "DUPLICATE_EVENT_SELECTION",
            EngineError::TooManySelections { .. } => "TOO_MANY_SELECTIONS",
            EngineError::OutcomeUnavailable { .. } => "OUTCOME_UNAVAILABLE",
            EngineError::OddsOutOfRange(_) => "ODDS_OUT_OF_RANGE",
            EngineError::OutcomeNotFound(_) => "OUTCOME_NOT_FOUND",
            EngineError::OutcomeSuspended(_) => "OUTCOME_SUSPENDED",
            EngineError::PromotionNotApplicable { .. } => "PROMOTION_NOT_APPLICABLE",
            EngineError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Forbidden(_) => "FORBIDDEN",
            EngineError::Unauthorized(_) => "UNAUTHORIZED",
            EngineError::AccountExists(_) => "ACCOUNT_EXISTS",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::EventAlreadyResolved(_) => "EVENT_ALREADY_RESOLVED",
            EngineError::IdempotencyKeyReused(_) => "IDEMPOTENCY_KEY_REUSED",
            EngineError::Conflict { .. } => "CONFLICT",
            EngineError::Timeout(_) => "TIMEOUT",
            EngineError::Integrity(_) => "INTEGRITY_VIOLATION",
            EngineError::Storage(_) => "STORAGE_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::InvalidStake(_)
            | EngineError::InvalidAmount(_)
            | EngineError::DuplicateEventSelection(_)
            | EngineError::TooManySelections { .. }
            | EngineError::OddsOutOfRange(_)
            | EngineError::Unauthorized(_)
            | EngineError::Validation(_) => ErrorCategory::Validation,
            EngineError::OutcomeUnavailable { .. }
            | EngineError::OutcomeNotFound(_)
            | EngineError::OutcomeSuspended(_)
            | EngineError::PromotionNotApplicable { .. }
            | EngineError::InsufficientFunds { .. }
            | EngineError::NotFound(_)
            | EngineError::Forbidden(_)
            | EngineError::AccountExists(_)
            | EngineError::EventAlreadyResolved(_)
            | EngineError::IdempotencyKeyReused(_) => ErrorCategory::Business,
            EngineError::Conflict { .. } | EngineError::Timeout(_) => ErrorCategory::Transient,
            EngineError::Integrity(_) => ErrorCategory::Integrity,
            EngineError::Storage(_) | EngineError::Serialization(_) => ErrorCategory::Internal,
        }
    }

    /// Only transient failures may be retried; everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_codes_are_stable() {
        let err = EngineError::InsufficientFunds {
            available: dec!(10.00),
            required: dec!(20.00),
        };
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(err.category(), ErrorCategory::Business);
        assert!(err.to_string().contains("10.00 available"));
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(EngineError::Conflict { attempts: 8 }.is_retryable());
        assert!(EngineError::Timeout(2000).is_retryable());
        assert!(!EngineError::InvalidStake("zero".into()).is_retryable());
        assert!(!EngineError::DuplicateEventSelection("evt".into()).is_retryable());
        assert!(!EngineError::Integrity("double debit".into()).is_retryable());
    }
}
