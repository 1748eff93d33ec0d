use super::service::AccountService;
use crate::config::ServiceConfig;
use crate::domain::account::{AccountId, Amount};
use crate::domain::tiers::commission_rate;
use crate::error::Result;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Why a referral produced no commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommissionSkip {
    ReferrerNotFound,
    /// Referrer is still at tier 0.
    ReferrerNotMember,
    /// The purchased tier has no configured cost.
    UnpricedTier,
    /// The referrer's tier lies outside the configured cap table.
    CapNotConfigured,
    NothingEarned,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommissionOutcome {
    Paid { referrer: AccountId, amount: Decimal },
    Skipped(CommissionSkip),
}

/// Commission owed to a referrer at `referrer_tier` for a purchase of `purchased_tier`:
/// `min(rate * cost[purchased], cap[referrer])`, truncated to the currency unit.
pub fn compute_commission(
    config: &ServiceConfig,
    referrer_tier: u32,
    purchased_tier: u32,
) -> std::result::Result<Decimal, CommissionSkip> {
    if referrer_tier < 1 {
        return Err(CommissionSkip::ReferrerNotMember);
    }
    let cost = config
        .tiers
        .cost(purchased_tier)
        .ok_or(CommissionSkip::UnpricedTier)?;
    let cap = config
        .tiers
        .commission_cap(referrer_tier)
        .ok_or(CommissionSkip::CapNotConfigured)?;

    let potential = commission_rate(purchased_tier) * cost;
    let earned = config.round_to_unit(potential.min(cap));
    if earned > Decimal::ZERO {
        Ok(earned)
    } else {
        Err(CommissionSkip::NothingEarned)
    }
}

impl AccountService {
    /// Pays referral commission for an approved upgrade of `purchaser` to `purchased_tier`.
    ///
    /// Runs as its own unit of work on the referrer's account and must be called
    /// after the purchaser's change has been committed. Skips are logged, never
    /// errors; only storage failures are returned.
    pub async fn pay_commission(
        &self,
        referrer_code: &str,
        purchased_tier: u32,
        purchaser: AccountId,
    ) -> Result<CommissionOutcome> {
        let Some(referrer) = self.store().find_by_referral_code(referrer_code).await? else {
            warn!(%purchaser, code = %referrer_code, "Commission skipped: referrer not found");
            return Ok(CommissionOutcome::Skipped(CommissionSkip::ReferrerNotFound));
        };
        let referrer_id = referrer.id;

        let config = self.config();
        let earned = self
            .mutate(referrer_id, |referrer| {
                let earned = compute_commission(config, referrer.tier, purchased_tier);
                if let Ok(amount) = earned {
                    referrer.credit_commission(Amount::new(amount)?)?;
                }
                Ok(earned.map_err(|skip| (skip, referrer.tier)))
            })
            .await?;

        match earned {
            Ok(amount) => {
                info!(
                    referrer = %referrer_id,
                    %purchaser,
                    tier = purchased_tier,
                    %amount,
                    "Commission paid"
                );
                self.notify(
                    referrer_id,
                    format!(
                        "You earned {amount} commission: account {purchaser} you referred reached tier {purchased_tier}."
                    ),
                )
                .await;
                Ok(CommissionOutcome::Paid {
                    referrer: referrer_id,
                    amount,
                })
            }
            Err((CommissionSkip::CapNotConfigured, referrer_tier)) => {
                warn!(
                    referrer = %referrer_id,
                    referrer_tier,
                    "Commission skipped: no commission cap configured for referrer tier"
                );
                Ok(CommissionOutcome::Skipped(CommissionSkip::CapNotConfigured))
            }
            Err((skip, referrer_tier)) => {
                info!(
                    referrer = %referrer_id,
                    referrer_tier,
                    ?skip,
                    "No commission paid"
                );
                Ok(CommissionOutcome::Skipped(skip))
            }
        }
    }
}
