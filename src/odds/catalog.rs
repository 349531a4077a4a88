use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::time::Duration;

use super::*;
use crate::error::{EngineError, EngineResult};
use crate::ids::{new_id, validate_id};
use crate::money::{MAX_ODDS, MIN_ODDS};
use crate::store::{
    abort, key, prefix, read, scan, scan_all, tx_read, tx_write, Deadline, Store, TxResult,
};
use sled::transaction::TransactionalTree;

pub fn snapshot_key(outcome_id: &str, version: u64) -> String {
    key(&[outcome_id, &format!("{:010}", version)])
}

fn check_price(outcome_id: &str, price: Decimal) -> EngineResult<()> {
    if price < MIN_ODDS {
        return Err(EngineError::Validation(format!(
            "price {} for outcome {} is below {}",
            price, outcome_id, MIN_ODDS
        )));
    }
    if price > MAX_ODDS {
        return Err(EngineError::Validation(format!(
            "price {} for outcome {} is above {}",
            price, outcome_id, MAX_ODDS
        )));
    }
    Ok(())
}

/// Versioned odds catalog backed by the `events`, `outcomes` and
/// `odds_snapshots` trees.
#[derive(Debug, Clone)]
pub struct OddsCatalog {
    store: Store,
    timeout: Duration,
}

impl OddsCatalog {
    pub fn new(store: Store, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    // ========================================================================
    // PUBLISHING
    // ========================================================================

    /// Create an event, its outcomes and their version-1 snapshots.
    pub fn publish_event(&self, request: NewEvent) -> EngineResult<EventView> {
        let event_id = request.id.clone().unwrap_or_else(new_id);
        validate_id("event", &event_id)?;
        if request.sport.trim().is_empty() || request.name.trim().is_empty() {
            return Err(EngineError::Validation("event sport and name are required".into()));
        }

        let teams = request.outcomes.iter().filter(|o| o.kind == OutcomeKind::Team).count();
        let draws = request.outcomes.len() - teams;
        if teams < 2 {
            return Err(EngineError::Validation(format!(
                "event {} needs at least two team outcomes",
                event_id
            )));
        }
        if draws > 1 {
            return Err(EngineError::Validation(format!(
                "event {} has more than one draw outcome",
                event_id
            )));
        }

        let now = Utc::now();
        let mut seen = HashSet::new();
        let mut priced = Vec::with_capacity(request.outcomes.len());
        for new in &request.outcomes {
            let outcome_id = new.id.clone().unwrap_or_else(new_id);
            validate_id("outcome", &outcome_id)?;
            if !seen.insert(outcome_id.clone()) {
                return Err(EngineError::Validation(format!(
                    "outcome id {} appears twice",
                    outcome_id
                )));
            }
            check_price(&outcome_id, new.price)?;

            priced.push(PricedOutcome {
                outcome: Outcome {
                    id: outcome_id.clone(),
                    event_id: event_id.clone(),
                    label: new.label.trim().to_string(),
                    kind: new.kind,
                    status: OutcomeStatus::Active,
                    current_version: 1,
                },
                snapshot: OddsSnapshot {
                    outcome_id,
                    event_id: event_id.clone(),
                    version: 1,
                    price: new.price,
                    valid_from: now,
                    valid_until: None,
                },
            });
        }

        let event = Event {
            id: event_id.clone(),
            sport: request.sport.trim().to_lowercase(),
            name: request.name.trim().to_string(),
            starts_at: request.starts_at,
            status: EventStatus::Open,
            outcome_ids: priced.iter().map(|p| p.outcome.id.clone()).collect(),
            result: None,
            created_at: now,
        };

        let store = &self.store;
        store.transact(
            (&store.events, &store.outcomes, &store.snapshots),
            Deadline::after(self.timeout),
            |(events, outcomes, snapshots)| {
                if events.get(event.id.as_bytes())?.is_some() {
                    return abort(EngineError::Validation(format!(
                        "event {} already exists",
                        event.id
                    )));
                }
                for p in &priced {
                    if outcomes.get(p.outcome.id.as_bytes())?.is_some() {
                        return abort(EngineError::Validation(format!(
                            "outcome {} already exists",
                            p.outcome.id
                        )));
                    }
                    tx_write(outcomes, &p.outcome.id, &p.outcome)?;
                    tx_write(snapshots, &snapshot_key(&p.outcome.id, 1), &p.snapshot)?;
                }
                tx_write(events, &event.id, &event)
            },
        )?;

        tracing::info!(
            event_id = %event.id,
            sport = %event.sport,
            outcomes = priced.len(),
            "event published"
        );
        Ok(EventView {
            event,
            outcomes: priced,
        })
    }

    /// Append a new price version and close the previous one.
    pub fn update_price(&self, outcome_id: &str, price: Decimal) -> EngineResult<OddsSnapshot> {
        check_price(outcome_id, price)?;

        let store = &self.store;
        let snapshot = store.transact(
            (&store.events, &store.outcomes, &store.snapshots),
            Deadline::after(self.timeout),
            |(events, outcomes, snapshots)| {
                let mut outcome = tx_outcome(outcomes, outcome_id)?;
                let event = tx_event(events, &outcome.event_id)?;
                if event.status.is_terminal() {
                    return abort(EngineError::Validation(format!(
                        "event {} is already {:?}",
                        event.id, event.status
                    )));
                }

                let now = Utc::now();
                let previous_key = snapshot_key(outcome_id, outcome.current_version);
                let mut previous: OddsSnapshot = match tx_read(snapshots, &previous_key)? {
                    Some(s) => s,
                    None => {
                        return abort(EngineError::Integrity(format!(
                            "outcome {} has no snapshot for version {}",
                            outcome_id, outcome.current_version
                        )))
                    }
                };
                previous.valid_until = Some(now);
                tx_write(snapshots, &previous_key, &previous)?;

                outcome.current_version += 1;
                let next = OddsSnapshot {
                    outcome_id: outcome.id.clone(),
                    event_id: outcome.event_id.clone(),
                    version: outcome.current_version,
                    price,
                    valid_from: now,
                    valid_until: None,
                };
                tx_write(snapshots, &snapshot_key(outcome_id, next.version), &next)?;
                tx_write(outcomes, outcome_id, &outcome)?;
                Ok(next)
            },
        )?;

        tracing::info!(outcome_id, version = snapshot.version, price = %price, "price updated");
        Ok(snapshot)
    }

    pub fn suspend(&self, outcome_id: &str) -> EngineResult<Outcome> {
        self.set_outcome_status(outcome_id, OutcomeStatus::Suspended)
    }

    pub fn resume(&self, outcome_id: &str) -> EngineResult<Outcome> {
        self.set_outcome_status(outcome_id, OutcomeStatus::Active)
    }

    fn set_outcome_status(&self, outcome_id: &str, status: OutcomeStatus) -> EngineResult<Outcome> {
        let store = &self.store;
        let outcome = store.transact(&store.outcomes, Deadline::after(self.timeout), |outcomes| {
            let mut outcome = tx_outcome(outcomes, outcome_id)?;
            outcome.status = status;
            tx_write(outcomes, outcome_id, &outcome)?;
            Ok(outcome)
        })?;
        tracing::info!(outcome_id, status = ?status, "outcome availability changed");
        Ok(outcome)
    }

    /// Move an open event into `Settling`. Already settling events are left as is.
    pub fn begin_settlement(&self, event_id: &str) -> EngineResult<Event> {
        let store = &self.store;
        store.transact(&store.events, Deadline::after(self.timeout), |events| {
            let mut event = tx_event(events, event_id)?;
            if event.status == EventStatus::Open {
                event.status = EventStatus::Settling;
                tx_write(events, event_id, &event)?;
            }
            Ok(event)
        })
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn event(&self, event_id: &str) -> EngineResult<Event> {
        read::<Event>(&self.store.events, event_id)?
            .ok_or_else(|| EngineError::NotFound(format!("event {}", event_id)))
    }

    pub fn outcome(&self, outcome_id: &str) -> EngineResult<Outcome> {
        read::<Outcome>(&self.store.outcomes, outcome_id)?
            .ok_or_else(|| EngineError::OutcomeNotFound(outcome_id.to_string()))
    }

    pub fn snapshot(&self, outcome_id: &str, version: u64) -> EngineResult<Option<OddsSnapshot>> {
        read(&self.store.snapshots, &snapshot_key(outcome_id, version))
    }

    pub fn price_history(&self, outcome_id: &str) -> EngineResult<Vec<OddsSnapshot>> {
        self.outcome(outcome_id)?;
        scan(&self.store.snapshots, &prefix(outcome_id))
    }

    /// Live price of an outcome that is available for betting.
    pub fn get_current_price(&self, outcome_id: &str) -> EngineResult<PricedOutcome> {
        let outcome = self.outcome(outcome_id)?;
        if outcome.status == OutcomeStatus::Suspended {
            return Err(EngineError::OutcomeSuspended(outcome_id.to_string()));
        }
        let event = self.event(&outcome.event_id)?;
        if event.status != EventStatus::Open {
            return Err(EngineError::OutcomeSuspended(outcome_id.to_string()));
        }
        let snapshot = self
            .snapshot(outcome_id, outcome.current_version)?
            .ok_or_else(|| {
                EngineError::Integrity(format!(
                    "outcome {} has no snapshot for version {}",
                    outcome_id, outcome.current_version
                ))
            })?;
        Ok(PricedOutcome { outcome, snapshot })
    }

    /// Capture the live price as an immutable reference.
    pub fn freeze_selection(&self, outcome_id: &str) -> EngineResult<FrozenSelection> {
        let priced = self.get_current_price(outcome_id)?;
        Ok(FrozenSelection {
            outcome_id: priced.outcome.id,
            event_id: priced.outcome.event_id,
            label: priced.outcome.label,
            price: priced.snapshot.price,
            snapshot_version: priced.snapshot.version,
        })
    }

    fn view(&self, event: Event) -> EngineResult<EventView> {
        let mut outcomes = Vec::with_capacity(event.outcome_ids.len());
        for outcome_id in &event.outcome_ids {
            let outcome = self.outcome(outcome_id)?;
            if let Some(snapshot) = self.snapshot(outcome_id, outcome.current_version)? {
                outcomes.push(PricedOutcome { outcome, snapshot });
            }
        }
        Ok(EventView { event, outcomes })
    }

    fn views_where<P>(&self, keep: P) -> EngineResult<Vec<EventView>>
    where
        P: Fn(&Event) -> bool,
    {
        let mut events: Vec<Event> = scan_all::<Event>(&self.store.events)?
            .into_iter()
            .filter(|e| keep(e))
            .collect();
        events.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.id.cmp(&b.id)));
        events.into_iter().map(|e| self.view(e)).collect()
    }

    /// Open events of one sport with live prices.
    pub fn events_for_sport(&self, sport: &str) -> EngineResult<Vec<EventView>> {
        let sport = sport.trim().to_lowercase();
        self.views_where(|e| e.status == EventStatus::Open && e.sport == sport)
    }

    /// Events still waiting for a result.
    pub fn unresolved_events(&self) -> EngineResult<Vec<EventView>> {
        self.views_where(|e| !e.status.is_terminal())
    }
}

pub(crate) fn tx_event(events: &TransactionalTree, event_id: &str) -> TxResult<Event> {
    match tx_read::<Event>(events, event_id)? {
        Some(event) => Ok(event),
        None => abort(EngineError::NotFound(format!("event {}", event_id))),
    }
}

pub(crate) fn tx_outcome(outcomes: &TransactionalTree, outcome_id: &str) -> TxResult<Outcome> {
    match tx_read::<Outcome>(outcomes, outcome_id)? {
        Some(outcome) => Ok(outcome),
        None => abort(EngineError::OutcomeNotFound(outcome_id.to_string())),
    }
}
