use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use super::{
    account_index_key, event_index_key, Receipt, Slip, SlipBook, SlipBuilder, SlipDraft,
    SlipRequest, SlipSelection,
};
use crate::error::{EngineError, EngineResult};
use crate::ids::new_id;
use crate::ledger::LedgerTx;
use crate::odds::{Event, EventStatus, Outcome, OutcomeStatus};
use crate::store::{abort, key, read, tx_read, tx_write, Deadline, Store, TxResult};
use sled::transaction::TransactionalTree;

/// Submission states, logged as a request moves through acceptance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Received,
    Validated,
    Reserved,
    Committed,
    Rejected,
}

/// Stored under `account/key` in the `idempotency` tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct IdempotencyRecord {
    slip_id: String,
    fingerprint: String,
    created_at: DateTime<Utc>,
}

fn idempotency_key(account_id: &str, client_key: &str) -> String {
    key(&[account_id, client_key])
}

enum Committed {
    Fresh,
    Replayed(String),
}

/// Turns a validated draft into a persisted slip and its stake debit.
///
/// Everything a submission writes (slip, selections, indexes, idempotency
/// record, ledger debit) commits in one sled transaction or not at all.
#[derive(Clone)]
pub struct AcceptanceEngine {
    store: Store,
    builder: SlipBuilder,
    slips: SlipBook,
    timeout: Duration,
}

impl AcceptanceEngine {
    pub fn new(store: Store, builder: SlipBuilder, timeout: Duration) -> Self {
        Self {
            slips: SlipBook::new(store.clone()),
            store,
            builder,
            timeout,
        }
    }

    pub fn submit(&self, request: SlipRequest) -> EngineResult<Receipt> {
        let span = tracing::info_span!("submit_slip", account_id = %request.account_id);
        let _enter = span.enter();
        tracing::debug!(
            stage = ?SubmissionStage::Received,
            selections = request.outcome_ids.len(),
            stake = %request.stake
        );

        let result = self
            .replay(&request)
            .and_then(|replayed| match replayed {
                Some(receipt) => Ok(receipt),
                None => {
                    let draft = self.builder.build(&request, Utc::now())?;
                    tracing::debug!(
                        stage = ?SubmissionStage::Validated,
                        combined_odds = %draft.combined_odds
                    );
                    self.commit(&draft)
                }
            });

        match &result {
            Ok(receipt) if receipt.replayed => tracing::info!(
                slip_id = %receipt.slip_id,
                "idempotent resubmission, returning existing slip"
            ),
            Ok(receipt) => tracing::info!(
                stage = ?SubmissionStage::Committed,
                slip_id = %receipt.slip_id,
                debited = %receipt.debited_amount,
                potential_win = %receipt.potential_win,
                "slip accepted"
            ),
            Err(e) => tracing::warn!(
                stage = ?SubmissionStage::Rejected,
                code = e.code(),
                "slip rejected: {}",
                e
            ),
        }
        result
    }

    /// Existing slip for a repeated idempotency key.
    fn replay(&self, request: &SlipRequest) -> EngineResult<Option<Receipt>> {
        let Some(client_key) = &request.idempotency_key else {
            return Ok(None);
        };
        let record: Option<IdempotencyRecord> =
            read(&self.store.idempotency, &idempotency_key(&request.account_id, client_key))?;
        match record {
            None => Ok(None),
            Some(record) if record.fingerprint != request.fingerprint() => {
                Err(EngineError::IdempotencyKeyReused(client_key.clone()))
            }
            Some(record) => self.replayed_receipt(&record.slip_id).map(Some),
        }
    }

    fn replayed_receipt(&self, slip_id: &str) -> EngineResult<Receipt> {
        let slip = self.slips.get(slip_id)?.ok_or_else(|| {
            EngineError::Integrity(format!("idempotency record points at missing slip {}", slip_id))
        })?;
        Ok(Receipt::for_slip(&slip, true))
    }

    /// Persist a draft: recheck every frozen price, debit the stake, write the
    /// slip with its indexes.
    pub fn commit(&self, draft: &SlipDraft) -> EngineResult<Receipt> {
        let slip = Slip::from_draft(new_id(), draft, Utc::now());
        let events: BTreeSet<&str> = slip.selections.iter().map(|s| s.event_id.as_str()).collect();

        let store = &self.store;
        let committed = store.transact(
            (
                &store.accounts,
                &store.ledger_log,
                &store.ledger_keys,
                &store.slips,
                &store.slips_by_account,
                &store.slips_by_event,
                &store.idempotency,
                &store.events,
                &store.outcomes,
            ),
            Deadline::after(self.timeout),
            |(
                accounts,
                log,
                keys,
                slips,
                by_account,
                by_event,
                idempotency,
                event_tree,
                outcome_tree,
            )| {
                if let Some(client_key) = &draft.idempotency_key {
                    let record_key = idempotency_key(&draft.account_id, client_key);
                    if let Some(record) = tx_read::<IdempotencyRecord>(idempotency, &record_key)? {
                        if record.fingerprint != draft.fingerprint {
                            return abort(EngineError::IdempotencyKeyReused(client_key.clone()));
                        }
                        return Ok(Committed::Replayed(record.slip_id));
                    }
                    tx_write(
                        idempotency,
                        &record_key,
                        &IdempotencyRecord {
                            slip_id: slip.id.clone(),
                            fingerprint: draft.fingerprint.clone(),
                            created_at: slip.created_at,
                        },
                    )?;
                }

                for selection in &slip.selections {
                    recheck_selection(event_tree, outcome_tree, selection)?;
                }

                let token = LedgerTx::new(accounts, log, keys).reserve(
                    &slip.account_id,
                    slip.debited_amount,
                    Some(&slip.id),
                )?;
                tracing::debug!(
                    stage = ?SubmissionStage::Reserved,
                    balance = %token.resulting_balance
                );

                tx_write(slips, &slip.id, &slip)?;
                let account_key = account_index_key(&slip.account_id, &slip.id);
                by_account.insert(account_key.as_bytes(), slip.id.as_bytes())?;
                for event_id in &events {
                    let event_key = event_index_key(event_id, &slip.id);
                    by_event.insert(event_key.as_bytes(), slip.id.as_bytes())?;
                }
                Ok(Committed::Fresh)
            },
        )?;

        match committed {
            Committed::Fresh => Ok(Receipt::for_slip(&slip, false)),
            Committed::Replayed(slip_id) => self.replayed_receipt(&slip_id),
        }
    }
}

/// The frozen price must still be the live one, on an active outcome of an
/// open event.
fn recheck_selection(
    events: &TransactionalTree,
    outcomes: &TransactionalTree,
    selection: &SlipSelection,
) -> TxResult<()> {
    let unavailable = |reason: String| EngineError::OutcomeUnavailable {
        outcome_id: selection.outcome_id.clone(),
        reason,
    };

    let Some(outcome) = tx_read::<Outcome>(outcomes, &selection.outcome_id)? else {
        return abort(unavailable("unknown outcome".into()));
    };
    if outcome.status != OutcomeStatus::Active {
        return abort(unavailable("outcome was suspended".into()));
    }
    if outcome.current_version != selection.snapshot_version {
        return abort(unavailable(format!(
            "price moved from version {} to {}",
            selection.snapshot_version, outcome.current_version
        )));
    }

    let Some(event) = tx_read::<Event>(events, &selection.event_id)? else {
        return abort(unavailable(format!("event {} is missing", selection.event_id)));
    };
    if event.status != EventStatus::Open {
        return abort(unavailable(format!("event {} is {:?}", event.id, event.status)));
    }
    Ok(())
}
