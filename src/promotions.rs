// ============================================================================
// Promotions - bonus rules and the promotion source seam
// ============================================================================
//
// Promotions are owned by an external collaborator; the engine only reads
// them through `PromotionSource`. The evaluator is a pure function:
//
//   percentage: effective = stake + stake * value / 100   (rounded half up)
//   fixed:      effective = stake + value
//   otherwise:  effective = stake                          (bonus ignored)
//
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::ids::validate_id;
use crate::money::round_currency;
use crate::store::{read, scan_all, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BonusType {
    Percentage,
    Fixed,
    /// Any type the engine does not know; carried through untouched
    Other(String),
}

impl From<String> for BonusType {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "percentage" => BonusType::Percentage,
            "fixed" => BonusType::Fixed,
            _ => BonusType::Other(raw),
        }
    }
}

impl From<BonusType> for String {
    fn from(bonus: BonusType) -> Self {
        match bonus {
            BonusType::Percentage => "percentage".to_string(),
            BonusType::Fixed => "fixed".to_string(),
            BonusType::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub id: String,
    #[serde(alias = "promotionName")]
    pub name: String,
    pub bonus_type: BonusType,
    pub bonus_value: Decimal,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    #[serde(default)]
    pub min_deposit: Option<Decimal>,
    #[serde(default)]
    pub max_deposit: Option<Decimal>,
    /// Accounts allowed to use the promotion; `None` means everyone
    #[serde(default)]
    pub eligible_accounts: Option<Vec<String>>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
    Expired,
}

impl Promotion {
    pub fn is_eligible(&self, account_id: &str) -> bool {
        match &self.eligible_accounts {
            Some(accounts) => accounts.iter().any(|a| a == account_id),
            None => true,
        }
    }

    pub fn availability(&self, account_id: &str, now: DateTime<Utc>) -> Availability {
        if now > self.date_end {
            Availability::Expired
        } else if now < self.date_start || !self.is_eligible(account_id) {
            Availability::Unavailable
        } else {
            Availability::Available
        }
    }

    /// Every rule a slip must satisfy to use this promotion. The error is the
    /// human-readable reason.
    pub fn check_applicable(
        &self,
        account_id: &str,
        stake: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        match self.availability(account_id, now) {
            Availability::Expired => return Err(format!("ended at {}", self.date_end)),
            Availability::Unavailable if now < self.date_start => {
                return Err(format!("starts at {}", self.date_start))
            }
            Availability::Unavailable => {
                return Err(format!("account {} is not eligible", account_id))
            }
            Availability::Available => {}
        }
        if let Some(min) = self.min_deposit {
            if stake < min {
                return Err(format!("stake {} is below the minimum of {}", stake, min));
            }
        }
        if let Some(max) = self.max_deposit {
            if stake > max {
                return Err(format!("stake {} is above the maximum of {}", stake, max));
            }
        }
        Ok(())
    }

    fn validate(&self) -> EngineResult<()> {
        validate_id("promotion", &self.id)?;
        if self.bonus_value < Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "promotion {} has a negative bonus value",
                self.id
            )));
        }
        if self.date_end < self.date_start {
            return Err(EngineError::Validation(format!(
                "promotion {} ends before it starts",
                self.id
            )));
        }
        if let (Some(min), Some(max)) = (self.min_deposit, self.max_deposit) {
            if min > max {
                return Err(EngineError::Validation(format!(
                    "promotion {} has minDeposit above maxDeposit",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Bonus-adjusted stake. Unknown bonus types leave the stake unchanged.
pub fn effective_stake(
    bonus_type: &BonusType,
    bonus_value: Decimal,
    stake: Decimal,
) -> EngineResult<Decimal> {
    let adjusted = match bonus_type {
        BonusType::Percentage => stake
            .checked_mul(bonus_value)
            .map(|bonus| bonus / Decimal::ONE_HUNDRED)
            .and_then(|bonus| stake.checked_add(bonus)),
        BonusType::Fixed => stake.checked_add(bonus_value),
        BonusType::Other(_) => return Ok(stake),
    };
    adjusted.map(round_currency).ok_or_else(|| {
        EngineError::OddsOutOfRange(format!("bonus of {} on {} overflows", bonus_value, stake))
    })
}

// ============================================================================
// PROMOTION SOURCE
// ============================================================================

/// Read access to the promotions collaborator.
pub trait PromotionSource: Send + Sync {
    fn promotion(&self, id: &str) -> EngineResult<Option<Promotion>>;

    fn promotions(&self) -> EngineResult<Vec<Promotion>>;
}

/// Promotions mirrored into the local `promotions` tree.
#[derive(Debug, Clone)]
pub struct PromotionBook {
    store: Store,
}

impl PromotionBook {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert or replace a promotion as delivered by the promotions feed.
    pub fn upsert(&self, promotion: &Promotion) -> EngineResult<()> {
        promotion.validate()?;
        let bytes = crate::store::encode(promotion)?;
        self.store.promotions.insert(promotion.id.as_bytes(), bytes)?;
        tracing::info!(
            promotion_id = %promotion.id,
            bonus_type = ?promotion.bonus_type,
            "promotion stored"
        );
        Ok(())
    }
}

impl PromotionSource for PromotionBook {
    fn promotion(&self, id: &str) -> EngineResult<Option<Promotion>> {
        read(&self.store.promotions, id)
    }

    fn promotions(&self) -> EngineResult<Vec<Promotion>> {
        scan_all(&self.store.promotions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn promo(bonus_type: &str, value: Decimal) -> Promotion {
        Promotion {
            id: "promo-1".into(),
            name: "Weekend boost".into(),
            bonus_type: BonusType::from(bonus_type.to_string()),
            bonus_value: value,
            date_start: Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
            date_end: Utc.with_ymd_and_hms(2026, 10, 31, 23, 59, 59).unwrap(),
            min_deposit: Some(dec!(10)),
            max_deposit: Some(dec!(500)),
            eligible_accounts: None,
            description: String::new(),
        }
    }

    fn mid_october() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_promotion_math() {
        let percent = |value, stake| effective_stake(&BonusType::Percentage, value, stake).unwrap();
        assert_eq!(percent(dec!(100), dec!(50)), dec!(100));
        assert_eq!(effective_stake(&BonusType::Fixed, dec!(20), dec!(50)).unwrap(), dec!(70));
        let cashback = BonusType::Other("cashback".into());
        assert_eq!(effective_stake(&cashback, dec!(20), dec!(50)).unwrap(), dec!(50));
        // 12.5% of 10.01 = 1.25125, rounded half up to cents
        assert_eq!(percent(dec!(12.5), dec!(10.01)), dec!(11.26));

        assert!(effective_stake(&BonusType::Fixed, Decimal::MAX, dec!(50)).is_err());
    }

    #[test]
    fn test_bonus_type_roundtrips_unknown_values() {
        assert_eq!(BonusType::from("PERCENTAGE".to_string()), BonusType::Percentage);
        let other = BonusType::from("freebet".to_string());
        assert_eq!(String::from(other), "freebet");
    }

    #[test]
    fn test_applicability_rules() {
        let p = promo("percentage", dec!(10));
        assert!(p.check_applicable("alice", dec!(50), mid_october()).is_ok());
        assert!(p.check_applicable("alice", dec!(5), mid_october()).is_err());
        assert!(p.check_applicable("alice", dec!(501), mid_october()).is_err());

        let november = Utc.with_ymd_and_hms(2026, 11, 2, 0, 0, 0).unwrap();
        assert_eq!(p.availability("alice", november), Availability::Expired);
        assert!(p.check_applicable("alice", dec!(50), november).is_err());

        let mut restricted = p.clone();
        restricted.eligible_accounts = Some(vec!["bob".into()]);
        assert_eq!(restricted.availability("alice", mid_october()), Availability::Unavailable);
        assert!(restricted.check_applicable("bob", dec!(50), mid_october()).is_ok());
    }

    #[test]
    fn test_book_upsert_and_read() {
        let book = PromotionBook::new(Store::temporary().unwrap());
        book.upsert(&promo("fixed", dec!(20))).unwrap();

        let stored = book.promotion("promo-1").unwrap().unwrap();
        assert_eq!(stored.bonus_type, BonusType::Fixed);
        assert_eq!(book.promotions().unwrap().len(), 1);

        let mut broken = promo("fixed", dec!(-1));
        broken.id = "promo-2".into();
        assert!(matches!(book.upsert(&broken), Err(EngineError::Validation(_))));
    }
}
