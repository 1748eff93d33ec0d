use super::commission::CommissionOutcome;
use super::service::AccountService;
use crate::config::ServiceConfig;
use crate::domain::account::{Account, AccountId, PendingUpgrade, RequestId, UpgradeRecord};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info};

/// Result of an admin decision on an upgrade request.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeDecision {
    /// History entry appended on approval, `None` on rejection.
    pub record: Option<UpgradeRecord>,
    /// Commission paid for the approved upgrade, when the account was referred.
    pub commission: Option<CommissionOutcome>,
}

/// Checks that `account` may open an upgrade request for `tier` right now and
/// returns the tier's cost.
pub fn check_upgrade(config: &ServiceConfig, account: &Account, tier: u32) -> Result<Decimal> {
    if account.tier >= config.tiers.highest_tier() {
        return Err(LedgerError::TopTierReached);
    }
    if tier != account.tier + 1 {
        return Err(LedgerError::NonAdjacentTier {
            current: account.tier,
            requested: tier,
        });
    }
    if !matches!(account.pending_upgrade(), PendingUpgrade::None) {
        return Err(LedgerError::UpgradeAlreadyPending);
    }
    config.tiers.cost(tier).ok_or(LedgerError::UnknownTier(tier))
}

impl AccountService {
    /// Opens an externally paid upgrade to `tier`, evidenced by `payload`.
    pub async fn request_proof_upgrade(
        &self,
        id: AccountId,
        tier: u32,
        payload: String,
    ) -> Result<RequestId> {
        let config = self.config();
        let request = self
            .mutate(id, |account| {
                check_upgrade(config, account, tier)?;
                account.open_proof_request(tier, payload, Utc::now())
            })
            .await?;
        info!(account = %id, tier, request = %request, "Proof upgrade requested");
        Ok(request)
    }

    /// Opens a balance-funded upgrade to `tier`. The balance must cover the
    /// cost now but is only charged on approval.
    pub async fn request_balance_upgrade(&self, id: AccountId, tier: u32) -> Result<RequestId> {
        let config = self.config();
        let request = self
            .mutate(id, |account| {
                let cost = check_upgrade(config, account, tier)?;
                account.open_balance_upgrade_request(tier, cost, Utc::now())
            })
            .await?;
        info!(account = %id, tier, request = %request, "Balance upgrade requested");
        Ok(request)
    }

    pub async fn resolve_proof_upgrade(
        &self,
        id: AccountId,
        request: Option<RequestId>,
        approve: bool,
    ) -> Result<UpgradeDecision> {
        let config = self.config();
        let (record, referred_by) = self
            .mutate(id, |account| {
                let cost = account
                    .proof_request
                    .as_ref()
                    .and_then(|pending| config.tiers.cost(pending.requested_tier));
                let record = account.resolve_proof_request(request, approve, cost, Utc::now())?;
                Ok((record, account.referred_by.clone()))
            })
            .await?;
        self.finish_upgrade(id, record, referred_by).await
    }

    pub async fn resolve_balance_upgrade(
        &self,
        id: AccountId,
        request: Option<RequestId>,
        approve: bool,
    ) -> Result<UpgradeDecision> {
        let config = self.config();
        let (record, referred_by) = self
            .mutate(id, |account| {
                let cost = account
                    .balance_upgrade
                    .as_ref()
                    .and_then(|pending| config.tiers.cost(pending.target_tier));
                let record =
                    account.resolve_balance_upgrade_request(request, approve, cost, Utc::now())?;
                Ok((record, account.referred_by.clone()))
            })
            .await?;
        self.finish_upgrade(id, record, referred_by).await
    }

    /// Runs after the purchaser's change is stored and its lock released.
    async fn finish_upgrade(
        &self,
        id: AccountId,
        record: Option<UpgradeRecord>,
        referred_by: Option<String>,
    ) -> Result<UpgradeDecision> {
        let Some(record) = record else {
            info!(account = %id, "Upgrade request rejected");
            self.notify(id, "Your upgrade request was rejected.").await;
            return Ok(UpgradeDecision {
                record: None,
                commission: None,
            });
        };

        info!(
            account = %id,
            tier = record.tier,
            cost = %record.cost,
            method = ?record.method,
            "Upgrade approved"
        );
        self.notify(
            id,
            format!("Your upgrade was approved. You are now at tier {}.", record.tier),
        )
        .await;

        let commission = match referred_by {
            Some(code) => match self.pay_commission(&code, record.tier, id).await {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    error!(account = %id, code = %code, error = %err, "Commission payment failed");
                    None
                }
            },
            None => None,
        };

        Ok(UpgradeDecision {
            record: Some(record),
            commission,
        })
    }
}
