use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Price and commission cap of one membership tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub tier: u32,
    pub cost: Decimal,
    /// Most a referrer at this tier can earn from a single referred purchase.
    pub commission_cap: Decimal,
}

/// Immutable tier configuration: `cost[tier]` and `commission_cap[tier]`.
///
/// Tiers are numbered contiguously from 1; tier 0 means no membership yet and
/// has neither a cost nor a cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TierSpec>", into = "Vec<TierSpec>")]
pub struct TierTable {
    tiers: Vec<TierSpec>,
}

impl TierTable {
    pub fn new(mut tiers: Vec<TierSpec>) -> Result<Self> {
        tiers.sort_by_key(|spec| spec.tier);
        for (index, spec) in tiers.iter().enumerate() {
            let expected = index as u32 + 1;
            if spec.tier != expected {
                return Err(LedgerError::Config(format!(
                    "Tiers must be numbered contiguously from 1; expected tier {expected}, found {}",
                    spec.tier
                )));
            }
            if spec.cost <= Decimal::ZERO {
                return Err(LedgerError::Config(format!(
                    "Tier {} must have a positive cost",
                    spec.tier
                )));
            }
            if spec.commission_cap < Decimal::ZERO {
                return Err(LedgerError::Config(format!(
                    "Tier {} has a negative commission cap",
                    spec.tier
                )));
            }
        }
        Ok(Self { tiers })
    }

    fn spec(&self, tier: u32) -> Option<&TierSpec> {
        let index = tier.checked_sub(1)? as usize;
        self.tiers.get(index)
    }

    pub fn cost(&self, tier: u32) -> Option<Decimal> {
        self.spec(tier).map(|spec| spec.cost)
    }

    pub fn commission_cap(&self, tier: u32) -> Option<Decimal> {
        self.spec(tier).map(|spec| spec.commission_cap)
    }

    pub fn highest_tier(&self) -> u32 {
        self.tiers.len() as u32
    }
}

impl Default for TierTable {
    fn default() -> Self {
        let table = [
            (2000, 1000),
            (4000, 1000),
            (6000, 1500),
            (8000, 2000),
            (10000, 2500),
            (20000, 5000),
            (40000, 10000),
            (60000, 15000),
            (80000, 20000),
            (100000, 25000),
        ];
        let tiers = table
            .iter()
            .zip(1u32..)
            .map(|(&(cost, cap), tier)| TierSpec {
                tier,
                cost: Decimal::from(cost),
                commission_cap: Decimal::from(cap),
            })
            .collect();
        Self { tiers }
    }
}

impl TryFrom<Vec<TierSpec>> for TierTable {
    type Error = LedgerError;

    fn try_from(tiers: Vec<TierSpec>) -> Result<Self> {
        Self::new(tiers)
    }
}

impl From<TierTable> for Vec<TierSpec> {
    fn from(table: TierTable) -> Self {
        table.tiers
    }
}

/// Share of the purchased tier's cost offered to the referrer, before the cap.
pub fn commission_rate(purchased_tier: u32) -> Decimal {
    if purchased_tier == 1 { dec!(0.50) } else { dec!(0.25) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = TierTable::default();
        assert_eq!(table.highest_tier(), 10);
        assert_eq!(table.cost(1), Some(dec!(2000)));
        assert_eq!(table.cost(10), Some(dec!(100000)));
        assert_eq!(table.commission_cap(3), Some(dec!(1500)));
        assert_eq!(table.cost(0), None);
        assert_eq!(table.cost(11), None);
        assert_eq!(table.commission_cap(0), None);
    }

    #[test]
    fn test_rejects_gaps() {
        let result = TierTable::new(vec![
            TierSpec {
                tier: 1,
                cost: dec!(600),
                commission_cap: dec!(1),
            },
            TierSpec {
                tier: 3,
                cost: dec!(900),
                commission_cap: dec!(5),
            },
        ]);
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_rejects_non_positive_cost() {
        let result = TierTable::new(vec![TierSpec {
            tier: 1,
            cost: dec!(0),
            commission_cap: dec!(1),
        }]);
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"[
            {"tier": 2, "cost": "1200", "commission_cap": "5"},
            {"tier": 1, "cost": "600", "commission_cap": "1"}
        ]"#;
        let table: TierTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.cost(1), Some(dec!(600)));
        assert_eq!(table.commission_cap(2), Some(dec!(5)));

        let bad = r#"[{"tier": 2, "cost": "1200", "commission_cap": "5"}]"#;
        assert!(serde_json::from_str::<TierTable>(bad).is_err());
    }

    #[test]
    fn test_commission_rate() {
        assert_eq!(commission_rate(1), dec!(0.50));
        assert_eq!(commission_rate(2), dec!(0.25));
        assert_eq!(commission_rate(10), dec!(0.25));
    }
}
