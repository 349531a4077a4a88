// ============================================================================
// Odds Module - Sportsbook Odds Catalog
// ============================================================================
//
// Versioned catalog of events, outcomes and prices.
//
// Pricing model:
//   - Every price is an immutable OddsSnapshot (outcome, version, price)
//   - A price update appends version N+1 and stamps `valid_until` on N
//   - Slips reference (outcome, version), so later updates never reach them
//
// Availability:
//   - Outcome: Active | Suspended (admin freeze, in-play, result pending)
//   - Event:   Open -> Settling -> Resolved | Voided
//   - Only Active outcomes of Open events can be frozen into a slip
//
// ============================================================================

pub mod catalog;

pub use catalog::*;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// A competitor; settled by score
    Team,
    /// Wins when the top scores tie
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Active,
    Suspended,
}

/// Live pointer to an outcome's current snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub id: String,
    pub event_id: String,
    pub label: String,
    pub kind: OutcomeKind,
    pub status: OutcomeStatus,
    pub current_version: u64,
}

/// Immutable price record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsSnapshot {
    pub outcome_id: String,
    pub event_id: String,
    pub version: u64,
    pub price: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedOutcome {
    pub outcome: Outcome,
    pub snapshot: OddsSnapshot,
}

/// A price captured at submission time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrozenSelection {
    pub outcome_id: String,
    pub event_id: String,
    pub label: String,
    pub price: Decimal,
    pub snapshot_version: u64,
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Open,
    /// Settlement has started; no new selections are accepted
    Settling,
    Resolved,
    Voided,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Resolved | EventStatus::Voided)
    }
}

/// Final result recorded on a resolved event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    /// Score per team outcome; empty for voided events
    pub scores: BTreeMap<String, u32>,
    /// Outcome ids that won; empty when the event was voided
    pub winners: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub sport: String,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub status: EventStatus,
    pub outcome_ids: Vec<String>,
    #[serde(default)]
    pub result: Option<EventResult>,
    pub created_at: DateTime<Utc>,
}

/// An event with the live price of each outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub event: Event,
    pub outcomes: Vec<PricedOutcome>,
}

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOutcome {
    #[serde(default)]
    pub id: Option<String>,
    pub label: String,
    #[serde(default = "default_kind")]
    pub kind: OutcomeKind,
    pub price: Decimal,
}

fn default_kind() -> OutcomeKind {
    OutcomeKind::Team
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub sport: String,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub outcomes: Vec<NewOutcome>,
}
