// Request and response bodies for the sportsbook API.
// Field names follow the frontend's camelCase contract.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::Account;
use crate::odds::{EventView, OutcomeKind};
use crate::promotions::{Availability, BonusType, Promotion};
use crate::slips::Receipt;

// ===== ERRORS =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

// ===== PLAYERS =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    pub id: String,
    pub name: String,
    pub last_name: String,
    pub account_balance: Decimal,
}

impl From<Account> for PlayerResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            name: account.name,
            last_name: account.last_name,
            account_balance: account.balance,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub transaction_id: String,
    pub balance: Decimal,
}

// ===== BET SLIPS =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSlipRequest {
    /// Stake as typed by the player
    pub amount: Decimal,
    pub odds_ids: Vec<String>,
    #[serde(default)]
    pub promotion_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSlipResponse {
    #[serde(flatten)]
    pub receipt: Receipt,
    pub account_balance: Decimal,
}

// ===== ODDS =====

/// One priced outcome as the frontend's odds board expects it
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOdds {
    pub odd_id: String,
    pub team_name: String,
    pub odds_value: Decimal,
    pub kind: OutcomeKind,
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEventData {
    pub event_id: String,
    pub event_name: String,
    pub sport: String,
    pub event_date: DateTime<Utc>,
    pub odds: Vec<ApiOdds>,
}

impl From<EventView> for ApiEventData {
    fn from(view: EventView) -> Self {
        Self {
            event_id: view.event.id,
            event_name: view.event.name,
            sport: view.event.sport,
            event_date: view.event.starts_at,
            odds: view
                .outcomes
                .into_iter()
                .map(|p| ApiOdds {
                    odd_id: p.outcome.id,
                    team_name: p.outcome.label,
                    odds_value: p.snapshot.price,
                    kind: p.outcome.kind,
                    version: p.snapshot.version,
                })
                .collect(),
        }
    }
}

// ===== PROMOTIONS =====

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionView {
    pub id: String,
    pub promotion_name: String,
    pub bonus_type: BonusType,
    pub bonus_value: Decimal,
    pub min_deposit: Option<Decimal>,
    pub max_deposit: Option<Decimal>,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub description: String,
    pub availability: Availability,
}

impl PromotionView {
    pub fn for_account(promotion: Promotion, account_id: &str, now: DateTime<Utc>) -> Self {
        let availability = promotion.availability(account_id, now);
        Self {
            id: promotion.id,
            promotion_name: promotion.name,
            bonus_type: promotion.bonus_type,
            bonus_value: promotion.bonus_value,
            min_deposit: promotion.min_deposit,
            max_deposit: promotion.max_deposit,
            date_start: promotion.date_start,
            date_end: promotion.date_end,
            description: promotion.description,
            availability,
        }
    }
}

// ===== ADMIN =====

#[derive(Debug, Deserialize)]
pub struct PriceUpdateRequest {
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeScore {
    #[serde(alias = "oddId")]
    pub outcome_id: String,
    pub score: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResultRequest {
    pub event_id: String,
    pub scores: Vec<OutcomeScore>,
}
