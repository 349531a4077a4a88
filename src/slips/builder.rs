use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

use super::{SlipDraft, SlipRequest};
use crate::config::{Config, StakeDebit};
use crate::error::{EngineError, EngineResult};
use crate::ids::validate_id;
use crate::money::{combine_odds, is_cent_precise, payout};
use crate::odds::{FrozenSelection, OddsCatalog};
use crate::promotions::{effective_stake, PromotionSource};

/// Prices and validates a slip request without writing anything.
///
/// Checks run in a fixed order and stop at the first failure:
/// stake, selection shape, odds freeze, promotion.
#[derive(Clone)]
pub struct SlipBuilder {
    catalog: OddsCatalog,
    promotions: Arc<dyn PromotionSource>,
    max_stake: Decimal,
    max_selections: usize,
    stake_debit: StakeDebit,
}

impl SlipBuilder {
    pub fn new(
        catalog: OddsCatalog,
        promotions: Arc<dyn PromotionSource>,
        config: &Config,
    ) -> Self {
        Self {
            catalog,
            promotions,
            max_stake: config.max_stake,
            max_selections: config.max_selections,
            stake_debit: config.stake_debit,
        }
    }

    pub fn build(&self, request: &SlipRequest, now: DateTime<Utc>) -> EngineResult<SlipDraft> {
        validate_id("account", &request.account_id)?;
        if let Some(key) = &request.idempotency_key {
            validate_id("idempotency key", key)?;
        }

        self.check_stake(request.stake)?;
        self.check_selections(&request.outcome_ids)?;

        let selections = self.freeze_all(&request.outcome_ids)?;
        let combined_odds = combine_odds(selections.iter().map(|s| s.price))?;

        let effective = match &request.promotion_id {
            Some(promotion_id) => self.apply_promotion(promotion_id, request, now)?,
            None => request.stake,
        };

        let debit_amount = match self.stake_debit {
            StakeDebit::Effective => effective,
            StakeDebit::Raw => request.stake,
        };

        let potential_win = payout(effective, combined_odds)?;

        Ok(SlipDraft {
            account_id: request.account_id.clone(),
            stake: request.stake,
            effective_stake: effective,
            debit_amount,
            combined_odds,
            potential_win,
            promotion_id: request.promotion_id.clone(),
            selections,
            idempotency_key: request.idempotency_key.clone(),
            fingerprint: request.fingerprint(),
        })
    }

    fn check_stake(&self, stake: Decimal) -> EngineResult<()> {
        if stake <= Decimal::ZERO {
            return Err(EngineError::InvalidStake(format!(
                "{} must be greater than zero",
                stake
            )));
        }
        if !is_cent_precise(stake) {
            return Err(EngineError::InvalidStake(format!(
                "{} has more than two decimal places",
                stake
            )));
        }
        if stake > self.max_stake {
            return Err(EngineError::InvalidStake(format!(
                "{} exceeds the maximum stake of {}",
                stake, self.max_stake
            )));
        }
        Ok(())
    }

    /// Non-empty, within the limit, at most one selection per event.
    ///
    /// Outcomes that cannot be found here are left for the freeze step to
    /// report as unavailable.
    fn check_selections(&self, outcome_ids: &[String]) -> EngineResult<()> {
        if outcome_ids.is_empty() {
            return Err(EngineError::Validation("slip has no selections".into()));
        }
        if outcome_ids.len() > self.max_selections {
            return Err(EngineError::TooManySelections {
                count: outcome_ids.len(),
                max: self.max_selections,
            });
        }

        let mut events = HashSet::new();
        for outcome_id in outcome_ids {
            let outcome = match self.catalog.outcome(outcome_id) {
                Ok(outcome) => outcome,
                Err(EngineError::OutcomeNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if !events.insert(outcome.event_id.clone()) {
                return Err(EngineError::DuplicateEventSelection(outcome.event_id));
            }
        }
        Ok(())
    }

    fn freeze_all(&self, outcome_ids: &[String]) -> EngineResult<Vec<FrozenSelection>> {
        outcome_ids
            .iter()
            .map(|outcome_id| {
                self.catalog
                    .freeze_selection(outcome_id)
                    .map_err(|e| match e {
                        EngineError::OutcomeNotFound(_) => EngineError::OutcomeUnavailable {
                            outcome_id: outcome_id.clone(),
                            reason: "unknown outcome".into(),
                        },
                        EngineError::OutcomeSuspended(_) => EngineError::OutcomeUnavailable {
                            outcome_id: outcome_id.clone(),
                            reason: "suspended or event closed".into(),
                        },
                        EngineError::NotFound(what) => EngineError::OutcomeUnavailable {
                            outcome_id: outcome_id.clone(),
                            reason: format!("{} is missing", what),
                        },
                        other => other,
                    })
            })
            .collect()
    }

    fn apply_promotion(
        &self,
        promotion_id: &str,
        request: &SlipRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<Decimal> {
        let not_applicable = |reason: String| EngineError::PromotionNotApplicable {
            promotion_id: promotion_id.to_string(),
            reason,
        };

        let promotion = self
            .promotions
            .promotion(promotion_id)?
            .ok_or_else(|| not_applicable("unknown promotion".into()))?;
        promotion
            .check_applicable(&request.account_id, request.stake, now)
            .map_err(not_applicable)?;

        effective_stake(&promotion.bonus_type, promotion.bonus_value, request.stake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odds::{NewEvent, NewOutcome, OutcomeKind};
    use crate::promotions::{BonusType, Promotion, PromotionBook};
    use crate::store::Store;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Fixture {
        builder: SlipBuilder,
        catalog: OddsCatalog,
        promotions: PromotionBook,
    }

    impl Fixture {
        fn build(&self, stake: Decimal, outcomes: &[&str]) -> EngineResult<SlipDraft> {
            self.builder.build(&request(stake, outcomes), Utc::now())
        }
    }

    fn fixture(config: Config) -> Fixture {
        let store = Store::temporary().unwrap();
        let catalog = OddsCatalog::new(store.clone(), Duration::from_secs(5));
        let promotions = PromotionBook::new(store);
        for (id, home, away) in [("e1", dec!(1.50), dec!(2.60)), ("e2", dec!(2.00), dec!(1.80))] {
            catalog
                .publish_event(NewEvent {
                    id: Some(id.into()),
                    sport: "soccer".into(),
                    name: format!("{} match", id),
                    starts_at: Utc.with_ymd_and_hms(2026, 11, 1, 15, 0, 0).unwrap(),
                    outcomes: vec![
                        NewOutcome {
                            id: Some(format!("{}-home", id)),
                            label: "Home".into(),
                            kind: OutcomeKind::Team,
                            price: home,
                        },
                        NewOutcome {
                            id: Some(format!("{}-away", id)),
                            label: "Away".into(),
                            kind: OutcomeKind::Team,
                            price: away,
                        },
                    ],
                })
                .unwrap();
        }
        let builder = SlipBuilder::new(catalog.clone(), Arc::new(promotions.clone()), &config);
        Fixture { builder, catalog, promotions }
    }

    fn request(stake: Decimal, outcomes: &[&str]) -> SlipRequest {
        SlipRequest {
            account_id: "alice".into(),
            stake,
            outcome_ids: outcomes.iter().map(|o| o.to_string()).collect(),
            promotion_id: None,
            idempotency_key: None,
        }
    }

    #[test]
    fn test_prices_accumulator() {
        let f = fixture(Config::default());
        let draft = f.build(dec!(20), &["e1-home", "e2-home"]).unwrap();
        assert_eq!(draft.combined_odds, dec!(3.00));
        assert_eq!(draft.potential_win, dec!(60.00));
        assert_eq!(draft.debit_amount, dec!(20));
        assert_eq!(draft.selections[0].snapshot_version, 1);
    }

    #[test]
    fn test_stake_rules() {
        let f = fixture(Config::default());
        for stake in [dec!(0), dec!(-5), dec!(1.005), dec!(10000.01)] {
            let err = f.build(stake, &["e1-home"]).unwrap_err();
            assert!(matches!(err, EngineError::InvalidStake(_)), "stake {}", stake);
        }
    }

    #[test]
    fn test_selection_rules() {
        let f = fixture(Config {
            max_selections: 1,
            ..Config::default()
        });

        let err = f.build(dec!(10), &[]).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = f.build(dec!(10), &["e1-home", "e2-home"]).unwrap_err();
        assert!(matches!(err, EngineError::TooManySelections { count: 2, max: 1 }));

        let f = fixture(Config::default());
        let err = f.build(dec!(10), &["e1-home", "e1-away"]).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateEventSelection(ref e) if e == "e1"));
    }

    #[test]
    fn test_unavailable_outcomes() {
        let f = fixture(Config::default());
        let err = f.build(dec!(10), &["nope"]).unwrap_err();
        assert!(matches!(err, EngineError::OutcomeUnavailable { .. }));

        f.catalog.suspend("e2-away").unwrap();
        let err = f.build(dec!(10), &["e1-home", "e2-away"]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::OutcomeUnavailable { ref outcome_id, .. } if outcome_id == "e2-away"
        ));
    }

    #[test]
    fn test_promotion_adjusts_stake_and_debit() {
        let now = Utc::now();
        let promo = Promotion {
            id: "double".into(),
            name: "Double up".into(),
            bonus_type: BonusType::Percentage,
            bonus_value: dec!(100),
            date_start: now - ChronoDuration::days(1),
            date_end: now + ChronoDuration::days(1),
            min_deposit: None,
            max_deposit: Some(dec!(100)),
            eligible_accounts: None,
            description: String::new(),
        };

        let f = fixture(Config::default());
        f.promotions.upsert(&promo).unwrap();
        let mut req = request(dec!(50), &["e1-home"]);
        req.promotion_id = Some("double".into());
        let draft = f.builder.build(&req, now).unwrap();
        assert_eq!(draft.effective_stake, dec!(100));
        assert_eq!(draft.debit_amount, dec!(100));
        assert_eq!(draft.potential_win, dec!(150.00));

        let raw = fixture(Config { stake_debit: StakeDebit::Raw, ..Config::default() });
        raw.promotions.upsert(&promo).unwrap();
        let draft = raw.builder.build(&req, now).unwrap();
        assert_eq!(draft.effective_stake, dec!(100));
        assert_eq!(draft.debit_amount, dec!(50));

        req.stake = dec!(150);
        let err = f.builder.build(&req, now).unwrap_err();
        assert!(matches!(err, EngineError::PromotionNotApplicable { .. }));

        req.promotion_id = Some("missing".into());
        req.stake = dec!(50);
        let err = f.builder.build(&req, now).unwrap_err();
        assert!(matches!(err, EngineError::PromotionNotApplicable { .. }));
    }
}
