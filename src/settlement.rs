// ============================================================================
// Settlement Engine - event results to slip payouts
// ============================================================================
//
// Resolution of one event runs in three steps:
//   1. validate the scores against the event's outcomes (nothing written)
//   2. close the event to new bets (Open -> Settling)
//   3. one transaction: selection results, slip verdicts, ledger credits
//      and the final event status
//
// Resolutions of the same event are serialized by a per-event lock; different
// events settle in parallel. A slip spanning two events is protected by sled's
// conflict detection on the slip row.
//
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::ledger::{CreditOutcome, LedgerTx};
use crate::odds::{
    tx_event, Event, EventResult, EventStatus, OddsCatalog, Outcome, OutcomeKind,
};
use crate::slips::{BetResult, Slip, SlipBook};
use crate::store::{abort, tx_read, tx_write, Deadline, Store, TxResult};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledSlip {
    pub slip_id: String,
    pub account_id: String,
    pub status: BetResult,
    pub payout: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub event_id: String,
    pub status: EventStatus,
    pub winners: Vec<String>,
    /// Slips with at least one selection decided by this call
    pub affected_slips: Vec<String>,
    /// Slips that reached a final status in this call
    pub settled: Vec<SettledSlip>,
    /// True when the event already carried this exact result
    pub already_resolved: bool,
}

/// Per-outcome results derived from a score map
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub results: HashMap<String, BetResult>,
    pub winners: Vec<String>,
}

/// Highest score wins. A tie at the top goes to the draw outcome when the
/// event has one; otherwise every selection on the event is voided.
pub fn decide_outcomes(
    outcomes: &[Outcome],
    scores: &BTreeMap<String, u32>,
) -> EngineResult<Decision> {
    for outcome_id in scores.keys() {
        match outcomes.iter().find(|o| &o.id == outcome_id) {
            None => {
                return Err(EngineError::Validation(format!(
                    "score given for unknown outcome {}",
                    outcome_id
                )))
            }
            Some(o) if o.kind == OutcomeKind::Draw => {
                return Err(EngineError::Validation(format!(
                    "draw outcome {} cannot carry a score",
                    outcome_id
                )))
            }
            Some(_) => {}
        }
    }

    let teams: Vec<&Outcome> = outcomes.iter().filter(|o| o.kind == OutcomeKind::Team).collect();
    let mut best = 0u32;
    for team in &teams {
        let score = scores.get(&team.id).copied().ok_or_else(|| {
            EngineError::Validation(format!("missing score for outcome {}", team.id))
        })?;
        best = best.max(score);
    }
    let leaders: Vec<&str> = teams
        .iter()
        .filter(|t| scores.get(&t.id) == Some(&best))
        .map(|t| t.id.as_str())
        .collect();

    let draw = outcomes.iter().find(|o| o.kind == OutcomeKind::Draw);
    let winners: Vec<String> = match (leaders.as_slice(), draw) {
        ([single], _) => vec![single.to_string()],
        (_, Some(draw)) => vec![draw.id.clone()],
        (_, None) => Vec::new(),
    };

    let results = outcomes
        .iter()
        .map(|o| {
            let result = if winners.is_empty() {
                BetResult::Void
            } else if winners.contains(&o.id) {
                BetResult::Won
            } else {
                BetResult::Lost
            };
            (o.id.clone(), result)
        })
        .collect();

    Ok(Decision { results, winners })
}

// ============================================================================
// EVENT LOCKS
// ============================================================================

/// One mutex per event id, created on first use.
#[derive(Debug, Default)]
pub struct EventLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EventLocks {
    pub fn handle(&self, event_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(event_id.to_string()).or_default())
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct SettlementEngine {
    store: Store,
    catalog: OddsCatalog,
    slips: SlipBook,
    locks: EventLocks,
    timeout: Duration,
}

impl SettlementEngine {
    pub fn new(store: Store, catalog: OddsCatalog, timeout: Duration) -> Self {
        Self {
            slips: SlipBook::new(store.clone()),
            store,
            catalog,
            locks: EventLocks::default(),
            timeout,
        }
    }

    /// Record the final score of an event and settle every slip it decides.
    pub fn resolve_event(
        &self,
        event_id: &str,
        scores: &BTreeMap<String, u32>,
    ) -> EngineResult<Resolution> {
        let lock = self.locks.handle(event_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let event = self.catalog.event(event_id)?;
        match event.status {
            EventStatus::Resolved | EventStatus::Voided
                if event.result.as_ref().map(|r| &r.scores) == Some(scores) =>
            {
                tracing::info!(event_id, "event already resolved with the same scores");
                return Ok(Self::unchanged(&event));
            }
            EventStatus::Resolved | EventStatus::Voided => {
                return Err(EngineError::EventAlreadyResolved(event_id.to_string()));
            }
            EventStatus::Open | EventStatus::Settling => {}
        }

        let outcomes = event
            .outcome_ids
            .iter()
            .map(|id| self.catalog.outcome(id))
            .collect::<EngineResult<Vec<_>>>()?;
        let decision = decide_outcomes(&outcomes, scores)?;

        let status = if decision.winners.is_empty() {
            EventStatus::Voided
        } else {
            EventStatus::Resolved
        };
        self.settle(event_id, status, scores.clone(), decision)
    }

    /// Cancel an event: every selection on it is voided.
    pub fn void_event(&self, event_id: &str) -> EngineResult<Resolution> {
        let lock = self.locks.handle(event_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let event = self.catalog.event(event_id)?;
        match event.status {
            EventStatus::Voided => return Ok(Self::unchanged(&event)),
            EventStatus::Resolved => {
                return Err(EngineError::EventAlreadyResolved(event_id.to_string()))
            }
            EventStatus::Open | EventStatus::Settling => {}
        }

        let decision = Decision {
            results: event
                .outcome_ids
                .iter()
                .map(|id| (id.clone(), BetResult::Void))
                .collect(),
            winners: Vec::new(),
        };
        self.settle(event_id, EventStatus::Voided, BTreeMap::new(), decision)
    }

    fn unchanged(event: &Event) -> Resolution {
        Resolution {
            event_id: event.id.clone(),
            status: event.status,
            winners: event.result.as_ref().map(|r| r.winners.clone()).unwrap_or_default(),
            affected_slips: Vec::new(),
            settled: Vec::new(),
            already_resolved: true,
        }
    }

    fn settle(
        &self,
        event_id: &str,
        status: EventStatus,
        scores: BTreeMap<String, u32>,
        decision: Decision,
    ) -> EngineResult<Resolution> {
        self.catalog.begin_settlement(event_id)?;
        let slip_ids = self.slips.ids_for_event(event_id)?;
        tracing::info!(event_id, status = ?status, slips = slip_ids.len(), "settling event");

        let store = &self.store;
        let resolution = store.transact(
            (
                &store.events,
                &store.slips,
                &store.accounts,
                &store.ledger_log,
                &store.ledger_keys,
            ),
            Deadline::after(self.timeout),
            |(events, slips, accounts, log, keys)| {
                let now = Utc::now();
                let ledger = LedgerTx::new(accounts, log, keys);
                let mut affected = Vec::new();
                let mut settled = Vec::new();

                for slip_id in &slip_ids {
                    let Some(mut slip) = tx_read::<Slip>(slips, slip_id)? else {
                        return abort(EngineError::Integrity(format!(
                            "event index points at missing slip {}",
                            slip_id
                        )));
                    };
                    if !slip.apply_event_results(event_id, &decision.results) {
                        continue;
                    }
                    affected.push(slip.id.clone());

                    if slip.status == BetResult::Pending {
                        if let Some(done) = settle_slip(&ledger, &mut slip, now)? {
                            settled.push(done);
                        }
                    }
                    tx_write(slips, &slip.id, &slip)?;
                }

                let mut event = tx_event(events, event_id)?;
                event.status = status;
                event.result = Some(EventResult {
                    scores: scores.clone(),
                    winners: decision.winners.clone(),
                    decided_at: now,
                });
                tx_write(events, event_id, &event)?;

                Ok(Resolution {
                    event_id: event_id.to_string(),
                    status,
                    winners: decision.winners.clone(),
                    affected_slips: affected,
                    settled,
                    already_resolved: false,
                })
            },
        )?;

        for slip in &resolution.settled {
            tracing::info!(
                slip_id = %slip.slip_id,
                account_id = %slip.account_id,
                status = ?slip.status,
                payout = ?slip.payout,
                "slip settled"
            );
        }
        tracing::info!(
            event_id,
            status = ?resolution.status,
            affected = resolution.affected_slips.len(),
            settled = resolution.settled.len(),
            "event settled"
        );
        Ok(resolution)
    }
}

/// Credit and close a pending slip once every selection is decided.
///
/// A credit already on the ledger for a slip that is still pending means the
/// ledger and the slip disagree; the whole settlement aborts.
fn settle_slip(
    ledger: &LedgerTx<'_>,
    slip: &mut Slip,
    now: DateTime<Utc>,
) -> TxResult<Option<SettledSlip>> {
    let verdict = match slip.verdict() {
        Ok(Some(verdict)) => verdict,
        Ok(None) => return Ok(None),
        Err(e) => return abort(e),
    };
    if let Some((kind, amount)) = verdict.credit {
        if let CreditOutcome::AlreadyApplied =
            ledger.credit(&slip.account_id, amount, &slip.id, kind)?
        {
            tracing::error!(
                slip_id = %slip.id,
                kind = kind.as_str(),
                "credit already posted for a pending slip"
            );
            return abort(EngineError::Integrity(format!(
                "{} already posted for pending slip {}",
                kind.as_str(),
                slip.id
            )));
        }
    }
    if let Err(e) = slip.settle(&verdict, now) {
        return abort(e);
    }
    Ok(Some(SettledSlip {
        slip_id: slip.id.clone(),
        account_id: slip.account_id.clone(),
        status: slip.status,
        payout: slip.payout,
    }))
}
