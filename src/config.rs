use crate::domain::tiers::TierTable;
use crate::error::{LedgerError, Result};
use chrono::Duration;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::path::Path;

/// Service-wide settings. Every field has a default, so a config file only
/// needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub tiers: TierTable,
    /// Flat fee held on top of every withdrawal amount.
    pub withdrawal_fee: Decimal,
    pub min_withdrawal: Decimal,
    /// Decimal places of the currency's smallest unit.
    pub currency_scale: u32,
    pub dialog_timeout_secs: i64,
    /// Number of upgrades and withdrawals listed in an account summary.
    pub recent_history: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tiers: TierTable::default(),
            withdrawal_fee: Decimal::from(300),
            min_withdrawal: Decimal::from(1000),
            currency_scale: 2,
            dialog_timeout_secs: 600,
            recent_history: 3,
        }
    }
}

impl ServiceConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<()> {
        if self.withdrawal_fee < Decimal::ZERO {
            return Err(LedgerError::Config(
                "withdrawal_fee must not be negative".to_string(),
            ));
        }
        if self.min_withdrawal <= Decimal::ZERO {
            return Err(LedgerError::Config(
                "min_withdrawal must be positive".to_string(),
            ));
        }
        if self.min_withdrawal.checked_add(self.withdrawal_fee).is_none() {
            return Err(LedgerError::Config(
                "min_withdrawal plus withdrawal_fee is out of range".to_string(),
            ));
        }
        if self.dialog_timeout_secs <= 0
            || Duration::try_seconds(self.dialog_timeout_secs).is_none()
        {
            return Err(LedgerError::Config(format!(
                "dialog_timeout_secs must be between 1 and {}",
                Duration::MAX.num_seconds()
            )));
        }
        Ok(())
    }

    /// Idle time after which an open dialog is discarded. Values beyond the
    /// representable range never expire.
    pub fn dialog_timeout(&self) -> Duration {
        Duration::try_seconds(self.dialog_timeout_secs).unwrap_or(Duration::MAX)
    }

    /// Truncates `value` to the currency's smallest unit.
    pub fn round_to_unit(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.currency_scale, RoundingStrategy::ToZero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.withdrawal_fee, dec!(300));
        assert_eq!(config.min_withdrawal, dec!(1000));
        assert_eq!(config.tiers.cost(1), Some(dec!(2000)));
        assert_eq!(config.dialog_timeout(), Duration::seconds(600));
    }

    #[test]
    fn test_out_of_range_timeout_never_expires() {
        let config = ServiceConfig {
            dialog_timeout_secs: i64::MAX,
            ..ServiceConfig::default()
        };
        assert_eq!(config.dialog_timeout(), Duration::MAX);
    }

    #[test]
    fn test_partial_override() {
        let config = ServiceConfig::from_json(
            r#"{
                "withdrawal_fee": "10",
                "tiers": [
                    {"tier": 1, "cost": "600", "commission_cap": "1"},
                    {"tier": 2, "cost": "1200", "commission_cap": "5"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.withdrawal_fee, dec!(10));
        assert_eq!(config.min_withdrawal, dec!(1000));
        assert_eq!(config.tiers.highest_tier(), 2);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            ServiceConfig::from_json(r#"{"min_withdrawal": "0"}"#),
            Err(LedgerError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_json(r#"{"dialog_timeout_secs": 0}"#),
            Err(LedgerError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_json(r#"{"dialog_timeout_secs": 9223372036854775807}"#),
            Err(LedgerError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_json(
                r#"{"min_withdrawal": "79228162514264337593543950335", "withdrawal_fee": "1"}"#
            ),
            Err(LedgerError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_json(r#"{"withdrawl_fee": "1"}"#),
            Err(LedgerError::SerdeError(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"dialog_timeout_secs": 30}}"#).unwrap();
        let config = ServiceConfig::load(file.path()).unwrap();
        assert_eq!(config.dialog_timeout_secs, 30);
    }

    #[test]
    fn test_round_to_unit() {
        let config = ServiceConfig::default();
        assert_eq!(config.round_to_unit(dec!(12.349)), dec!(12.34));
        assert_eq!(config.round_to_unit(dec!(5)), dec!(5));
    }
}
