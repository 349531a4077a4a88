// ============================================================================
// Slips Module - Sportsbook Bet Slips
// ============================================================================
//
// A slip is one wager over one or more selections, each locked to a frozen
// odds snapshot.
//
// Lifecycle:
//   - Created atomically with its selections and the stake debit
//   - Selections move Pending -> Won | Lost | Void as events settle
//   - The slip moves Pending -> Won | Lost | Void exactly once, when every
//     selection is decided
//
// Submodules:
//   - builder:    request -> priced, validated SlipDraft (no side effects)
//   - acceptance: SlipDraft -> committed Slip + ledger debit, one unit of work
//
// ============================================================================

pub mod acceptance;
pub mod builder;

pub use acceptance::*;
pub use builder::*;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::ledger::TxKind;
use crate::money::{combine_odds, payout};
use crate::odds::FrozenSelection;
use crate::store::{key, prefix, read, Store, KEY_SEP};

// ============================================================================
// RESULT
// ============================================================================

/// Result of a slip or of one selection. The only result representation the
/// engine exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetResult {
    Pending,
    Won,
    Lost,
    Void,
}

impl BetResult {
    pub fn is_decided(&self) -> bool {
        !matches!(self, BetResult::Pending)
    }
}

// ============================================================================
// SLIP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipSelection {
    pub id: String,
    pub slip_id: String,
    pub event_id: String,
    pub outcome_id: String,
    pub label: String,
    /// Frozen price; never re-read from the live catalog
    pub price: Decimal,
    pub snapshot_version: u64,
    pub result: BetResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slip {
    pub id: String,
    pub account_id: String,
    /// Stake as typed by the player
    pub stake: Decimal,
    /// Stake after the promotion bonus
    pub effective_stake: Decimal,
    /// Amount the ledger actually debited
    pub debited_amount: Decimal,
    pub combined_odds: Decimal,
    pub potential_win: Decimal,
    pub promotion_id: Option<String>,
    pub status: BetResult,
    /// Amount credited at settlement (winnings or refund)
    pub payout: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    pub selections: Vec<SlipSelection>,
}

/// Final status of a fully decided slip and what to credit for it
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: BetResult,
    pub credit: Option<(TxKind, Decimal)>,
}

impl Slip {
    pub fn from_draft(slip_id: String, draft: &SlipDraft, created_at: DateTime<Utc>) -> Self {
        let selections = draft
            .selections
            .iter()
            .enumerate()
            .map(|(i, frozen)| SlipSelection {
                id: format!("{}-{}", slip_id, i + 1),
                slip_id: slip_id.clone(),
                event_id: frozen.event_id.clone(),
                outcome_id: frozen.outcome_id.clone(),
                label: frozen.label.clone(),
                price: frozen.price,
                snapshot_version: frozen.snapshot_version,
                result: BetResult::Pending,
            })
            .collect();

        Self {
            id: slip_id,
            account_id: draft.account_id.clone(),
            stake: draft.stake,
            effective_stake: draft.effective_stake,
            debited_amount: draft.debit_amount,
            combined_odds: draft.combined_odds,
            potential_win: draft.potential_win,
            promotion_id: draft.promotion_id.clone(),
            status: BetResult::Pending,
            payout: None,
            created_at,
            settled_at: None,
            idempotency_key: draft.idempotency_key.clone(),
            selections,
        }
    }

    /// Set pending selections on `event_id` from per-outcome results.
    /// Returns true when at least one selection changed.
    pub fn apply_event_results(
        &mut self,
        event_id: &str,
        results: &HashMap<String, BetResult>,
    ) -> bool {
        let mut changed = false;
        for selection in self
            .selections
            .iter_mut()
            .filter(|s| s.event_id == event_id && s.result == BetResult::Pending)
        {
            if let Some(result) = results.get(&selection.outcome_id) {
                selection.result = *result;
                changed = true;
            }
        }
        changed
    }

    pub fn all_decided(&self) -> bool {
        self.selections.iter().all(|s| s.result.is_decided())
    }

    /// Outcome of a fully decided slip; `None` while anything is pending.
    ///
    /// Any lost selection loses the slip. Voided selections drop out of the
    /// odds product, and a slip with nothing but voids is refunded.
    pub fn verdict(&self) -> EngineResult<Option<Verdict>> {
        if !self.all_decided() {
            return Ok(None);
        }
        if self.selections.iter().any(|s| s.result == BetResult::Lost) {
            return Ok(Some(Verdict {
                status: BetResult::Lost,
                credit: None,
            }));
        }
        if self.selections.iter().all(|s| s.result == BetResult::Void) {
            return Ok(Some(Verdict {
                status: BetResult::Void,
                credit: Some((TxKind::CreditRefund, self.debited_amount)),
            }));
        }
        let odds = combine_odds(
            self.selections
                .iter()
                .filter(|s| s.result == BetResult::Won)
                .map(|s| s.price),
        )?;
        Ok(Some(Verdict {
            status: BetResult::Won,
            credit: Some((TxKind::CreditWin, payout(self.effective_stake, odds)?)),
        }))
    }

    /// The single Pending -> terminal transition.
    pub fn settle(&mut self, verdict: &Verdict, at: DateTime<Utc>) -> EngineResult<()> {
        if self.status != BetResult::Pending {
            tracing::error!(slip_id = %self.id, status = ?self.status, "settling a slip twice");
            return Err(EngineError::Integrity(format!(
                "slip {} is already {:?}",
                self.id, self.status
            )));
        }
        if !verdict.status.is_decided() {
            return Err(EngineError::Integrity(format!(
                "slip {} cannot settle as Pending",
                self.id
            )));
        }
        self.status = verdict.status;
        self.payout = verdict.credit.map(|(_, amount)| amount);
        self.settled_at = Some(at);
        Ok(())
    }

    pub fn summary(&self) -> SlipSummary {
        SlipSummary {
            id: self.id.clone(),
            amount: self.stake,
            date: self.created_at,
            result: self.status,
            combined_odds: self.combined_odds,
            potential_win: self.potential_win,
            selection_count: self.selections.len(),
        }
    }
}

/// Row of the "my slips" list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipSummary {
    pub id: String,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub result: BetResult,
    pub combined_odds: Decimal,
    pub potential_win: Decimal,
    pub selection_count: usize,
}

// ============================================================================
// REQUEST / DRAFT / RECEIPT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SlipRequest {
    pub account_id: String,
    pub stake: Decimal,
    pub outcome_ids: Vec<String>,
    pub promotion_id: Option<String>,
    pub idempotency_key: Option<String>,
}

impl SlipRequest {
    /// SHA-256 over the economically relevant fields, independent of
    /// selection order.
    pub fn fingerprint(&self) -> String {
        let mut outcomes = self.outcome_ids.clone();
        outcomes.sort();

        let mut hasher = Sha256::new();
        hasher.update(self.account_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.stake.normalize().to_string().as_bytes());
        hasher.update([0u8]);
        for outcome in &outcomes {
            hasher.update(outcome.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.promotion_id.as_deref().unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Fully priced and validated slip, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct SlipDraft {
    pub account_id: String,
    pub stake: Decimal,
    pub effective_stake: Decimal,
    pub debit_amount: Decimal,
    pub combined_odds: Decimal,
    pub potential_win: Decimal,
    pub promotion_id: Option<String>,
    pub selections: Vec<FrozenSelection>,
    pub idempotency_key: Option<String>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub slip_id: String,
    pub combined_odds: Decimal,
    pub potential_win: Decimal,
    pub effective_stake: Decimal,
    pub debited_amount: Decimal,
    pub status: BetResult,
    /// True when an idempotency key matched an earlier submission
    pub replayed: bool,
}

impl Receipt {
    pub fn for_slip(slip: &Slip, replayed: bool) -> Self {
        Self {
            slip_id: slip.id.clone(),
            combined_odds: slip.combined_odds,
            potential_win: slip.potential_win,
            effective_stake: slip.effective_stake,
            debited_amount: slip.debited_amount,
            status: slip.status,
            replayed,
        }
    }
}

// ============================================================================
// SLIP BOOK (read side)
// ============================================================================

pub fn account_index_key(account_id: &str, slip_id: &str) -> String {
    key(&[account_id, slip_id])
}

pub fn event_index_key(event_id: &str, slip_id: &str) -> String {
    key(&[event_id, slip_id])
}

/// Read access to persisted slips and their indexes.
#[derive(Debug, Clone)]
pub struct SlipBook {
    store: Store,
}

impl SlipBook {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn get(&self, slip_id: &str) -> EngineResult<Option<Slip>> {
        read(&self.store.slips, slip_id)
    }

    /// Slip detail with an ownership check.
    pub fn get_for_account(&self, slip_id: &str, account_id: &str) -> EngineResult<Slip> {
        let slip = self
            .get(slip_id)?
            .ok_or_else(|| EngineError::NotFound(format!("slip {}", slip_id)))?;
        if slip.account_id != account_id {
            return Err(EngineError::Forbidden(format!(
                "slip {} belongs to another account",
                slip_id
            )));
        }
        Ok(slip)
    }

    fn ids_under(&self, tree: &sled::Tree, head: &str) -> EngineResult<Vec<String>> {
        let head = prefix(head);
        let mut ids = Vec::new();
        for entry in tree.scan_prefix(head.as_bytes()) {
            let (raw_key, _) = entry?;
            let raw_key = String::from_utf8_lossy(&raw_key);
            if let Some(slip_id) = raw_key.rsplit(KEY_SEP).next() {
                ids.push(slip_id.to_string());
            }
        }
        Ok(ids)
    }

    pub fn ids_for_event(&self, event_id: &str) -> EngineResult<Vec<String>> {
        self.ids_under(&self.store.slips_by_event, event_id)
    }

    /// The account's slips, newest first.
    pub fn for_account(&self, account_id: &str) -> EngineResult<Vec<Slip>> {
        let mut slips = Vec::new();
        for slip_id in self.ids_under(&self.store.slips_by_account, account_id)? {
            if let Some(slip) = self.get(&slip_id)? {
                slips.push(slip);
            }
        }
        slips.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(slips)
    }

    pub fn summaries_for_account(&self, account_id: &str) -> EngineResult<Vec<SlipSummary>> {
        Ok(self.for_account(account_id)?.iter().map(Slip::summary).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn slip(prices: &[Decimal]) -> Slip {
        let odds = combine_odds(prices.iter().copied()).unwrap();
        let draft = SlipDraft {
            account_id: "alice".into(),
            stake: dec!(20),
            effective_stake: dec!(20),
            debit_amount: dec!(20),
            combined_odds: odds,
            potential_win: payout(dec!(20), odds).unwrap(),
            promotion_id: None,
            selections: prices
                .iter()
                .enumerate()
                .map(|(i, price)| FrozenSelection {
                    outcome_id: format!("o{}", i),
                    event_id: format!("e{}", i),
                    label: format!("Team {}", i),
                    price: *price,
                    snapshot_version: 1,
                })
                .collect(),
            idempotency_key: None,
            fingerprint: String::new(),
        };
        Slip::from_draft("s1".into(), &draft, Utc::now())
    }

    fn decide(slip: &mut Slip, event: &str, outcome: &str, result: BetResult) {
        let results = HashMap::from([(outcome.to_string(), result)]);
        assert!(slip.apply_event_results(event, &results));
    }

    #[test]
    fn test_verdict_waits_for_every_selection() {
        let mut s = slip(&[dec!(1.50), dec!(2.00)]);
        decide(&mut s, "e0", "o0", BetResult::Won);
        assert!(s.verdict().unwrap().is_none());

        decide(&mut s, "e1", "o1", BetResult::Won);
        let verdict = s.verdict().unwrap().unwrap();
        assert_eq!(verdict.status, BetResult::Won);
        assert_eq!(verdict.credit, Some((TxKind::CreditWin, dec!(60.00))));
    }

    #[test]
    fn test_any_loss_loses_the_slip() {
        let mut s = slip(&[dec!(1.50), dec!(2.00)]);
        decide(&mut s, "e0", "o0", BetResult::Won);
        decide(&mut s, "e1", "o1", BetResult::Lost);
        let lost = Verdict {
            status: BetResult::Lost,
            credit: None,
        };
        assert_eq!(s.verdict().unwrap().unwrap(), lost);
    }

    #[test]
    fn test_void_selection_drops_out_of_odds() {
        let mut s = slip(&[dec!(1.50), dec!(2.00)]);
        decide(&mut s, "e0", "o0", BetResult::Void);
        decide(&mut s, "e1", "o1", BetResult::Won);
        let credit = s.verdict().unwrap().unwrap().credit;
        assert_eq!(credit, Some((TxKind::CreditWin, dec!(40.00))));
        // potential win stays as priced at acceptance
        assert_eq!(s.potential_win, dec!(60.00));
    }

    #[test]
    fn test_all_void_refunds_debit() {
        let mut s = slip(&[dec!(1.50)]);
        decide(&mut s, "e0", "o0", BetResult::Void);
        let verdict = s.verdict().unwrap().unwrap();
        assert_eq!(verdict.status, BetResult::Void);
        assert_eq!(verdict.credit, Some((TxKind::CreditRefund, dec!(20))));
    }

    #[test]
    fn test_settle_happens_once() {
        let mut s = slip(&[dec!(1.50)]);
        decide(&mut s, "e0", "o0", BetResult::Won);
        let verdict = s.verdict().unwrap().unwrap();
        s.settle(&verdict, Utc::now()).unwrap();
        assert_eq!(s.status, BetResult::Won);
        assert_eq!(s.payout, Some(dec!(30.00)));
        assert!(matches!(s.settle(&verdict, Utc::now()), Err(EngineError::Integrity(_))));
    }

    #[test]
    fn test_decided_selections_are_not_overwritten() {
        let mut s = slip(&[dec!(1.50)]);
        decide(&mut s, "e0", "o0", BetResult::Lost);
        let results = HashMap::from([("o0".to_string(), BetResult::Won)]);
        assert!(!s.apply_event_results("e0", &results));
        assert_eq!(s.selections[0].result, BetResult::Lost);
    }

    #[test]
    fn test_fingerprint_ignores_selection_order() {
        let a = SlipRequest {
            account_id: "alice".into(),
            stake: dec!(20.00),
            outcome_ids: vec!["x".into(), "y".into()],
            promotion_id: None,
            idempotency_key: Some("k1".into()),
        };
        let mut b = a.clone();
        b.outcome_ids.reverse();
        b.stake = dec!(20);
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = a.clone();
        c.stake = dec!(25);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
