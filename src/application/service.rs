use super::locks::AccountLocks;
use crate::config::ServiceConfig;
use crate::domain::account::{
    Account, AccountId, PendingUpgrade, RequestId, UpgradeRecord, Withdrawal,
};
use crate::domain::ports::{AccountStoreBox, NotifierBox};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Owns the account store and applies every ledger mutation.
///
/// All writes go through [`AccountService::mutate`], which holds the account's
/// lock across load, validation and store. Work that touches a second account
/// (commission) runs only after the first account's lock is released.
pub struct AccountService {
    accounts: AccountStoreBox,
    notifier: NotifierBox,
    config: ServiceConfig,
    locks: AccountLocks,
}

/// Upgrade path currently awaiting a decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum PendingUpgradeSummary {
    Proof { id: RequestId, tier: u32 },
    Balance { id: RequestId, tier: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub id: AccountId,
    pub verified: bool,
    pub tier: u32,
    pub balance: Decimal,
    pub commission_earned: Decimal,
    pub referral_code: String,
    pub payout_destination: Option<String>,
    pub pending_upgrade: Option<PendingUpgradeSummary>,
    pub pending_withdrawals: usize,
    /// Most recent first.
    pub recent_upgrades: Vec<UpgradeRecord>,
    /// Most recent first.
    pub recent_withdrawals: Vec<Withdrawal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferredAccount {
    pub id: AccountId,
    pub tier: u32,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralReport {
    pub referral_code: String,
    /// Highest tier first, then by id.
    pub referred: Vec<ReferredAccount>,
}

impl AccountService {
    pub fn new(accounts: AccountStoreBox, notifier: NotifierBox, config: ServiceConfig) -> Self {
        Self {
            accounts,
            notifier,
            config,
            locks: AccountLocks::new(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &AccountStoreBox {
        &self.accounts
    }

    /// Reads an account without taking its lock.
    pub async fn account(&self, id: AccountId) -> Result<Account> {
        self.accounts
            .get(id)
            .await?
            .ok_or(LedgerError::AccountNotFound(id))
    }

    /// Snapshot of every account, in no particular order.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.accounts.get_all().await
    }

    /// Applies `change` to the account as one atomic unit.
    ///
    /// `change` works on a copy; the copy is stored only when it returns `Ok`,
    /// so a rejected change never reaches the store.
    pub(crate) async fn mutate<T, F>(&self, id: AccountId, change: F) -> Result<T>
    where
        F: FnOnce(&mut Account) -> Result<T>,
    {
        let _guard = self.locks.acquire(id).await;
        let mut account = self.account(id).await?;
        let output = change(&mut account).inspect_err(|err| {
            debug!(account = %id, error = %err, "Ledger change rejected");
        })?;
        self.accounts.store(account).await?;
        Ok(output)
    }

    /// Sends a message to the account. Failures are logged and swallowed.
    pub(crate) async fn notify(&self, to: AccountId, text: impl Into<String>) {
        if let Err(err) = self.notifier.send(to, text.into()).await {
            warn!(account = %to, error = %err, "Notification delivery failed");
        }
    }

    /// Creates a tier-0 account with a freshly generated referral code.
    pub async fn register(&self, id: AccountId, referred_by: Option<String>) -> Result<Account> {
        let _guard = self.locks.acquire(id).await;
        if self.accounts.get(id).await?.is_some() {
            return Err(LedgerError::AlreadyRegistered(id));
        }

        let referral_code = loop {
            let candidate = generate_referral_code();
            if self.accounts.find_by_referral_code(&candidate).await?.is_none() {
                break candidate;
            }
        };

        if let Some(code) = &referred_by
            && self.accounts.find_by_referral_code(code).await?.is_none()
        {
            warn!(account = %id, code = %code, "Registering with an unknown referral code");
        }

        let account = Account::new(id, referral_code, referred_by, Utc::now());
        self.accounts.store(account.clone()).await?;
        info!(account = %id, code = %account.referral_code, "Account registered");
        Ok(account)
    }

    pub async fn verify(&self, id: AccountId) -> Result<()> {
        self.mutate(id, |account| {
            account.verified = true;
            Ok(())
        })
        .await?;
        info!(account = %id, "Account verified");
        Ok(())
    }

    pub async fn set_payout_destination(&self, id: AccountId, address: &str) -> Result<()> {
        let address = address.trim();
        self.mutate(id, |account| account.set_payout_destination(address))
            .await?;
        info!(account = %id, "Payout destination updated");
        Ok(())
    }

    pub async fn get_summary(&self, id: AccountId) -> Result<AccountSummary> {
        let account = self.account(id).await?;
        let recent = self.config.recent_history;

        let pending_upgrade = match account.pending_upgrade() {
            PendingUpgrade::None => None,
            PendingUpgrade::Proof(request) => Some(PendingUpgradeSummary::Proof {
                id: request.id,
                tier: request.requested_tier,
            }),
            PendingUpgrade::Balance(request) => Some(PendingUpgradeSummary::Balance {
                id: request.id,
                tier: request.target_tier,
            }),
        };

        Ok(AccountSummary {
            id: account.id,
            verified: account.verified,
            tier: account.tier,
            balance: account.balance.value(),
            commission_earned: account.commission_earned.value(),
            referral_code: account.referral_code.clone(),
            payout_destination: account.payout_destination.clone(),
            pending_upgrade,
            pending_withdrawals: account.pending_withdrawals().count(),
            recent_upgrades: account.upgrade_history.iter().rev().take(recent).cloned().collect(),
            recent_withdrawals: account.withdrawals.iter().rev().take(recent).cloned().collect(),
        })
    }

    pub async fn list_referrals(&self, id: AccountId) -> Result<ReferralReport> {
        let account = self.account(id).await?;
        let mut referred: Vec<ReferredAccount> = self
            .accounts
            .find_referred_by(&account.referral_code)
            .await?
            .into_iter()
            .map(|referred| ReferredAccount {
                id: referred.id,
                tier: referred.tier,
                verified: referred.verified,
            })
            .collect();
        referred.sort_by(|a, b| b.tier.cmp(&a.tier).then(a.id.cmp(&b.id)));

        Ok(ReferralReport {
            referral_code: account.referral_code,
            referred,
        })
    }
}

fn generate_referral_code() -> String {
    format!("{:08x}", rand::random::<u32>())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::account::Balance;
    use crate::infrastructure::in_memory::{InMemoryAccountStore, RecordingNotifier};
    use rust_decimal_macros::dec;

    pub(crate) fn service_with(config: ServiceConfig) -> (AccountService, RecordingNotifier) {
        let notifier = RecordingNotifier::new();
        let service = AccountService::new(
            Box::new(InMemoryAccountStore::new()),
            Box::new(notifier.clone()),
            config,
        );
        (service, notifier)
    }

    #[tokio::test]
    async fn test_register_generates_unique_codes() {
        let (service, _) = service_with(ServiceConfig::default());
        let first = service.register(AccountId(1), None).await.unwrap();
        let second = service
            .register(AccountId(2), Some(first.referral_code.clone()))
            .await
            .unwrap();

        assert_eq!(first.referral_code.len(), 8);
        assert_ne!(first.referral_code, second.referral_code);
        assert_eq!(second.referred_by.as_deref(), Some(first.referral_code.as_str()));
        assert_eq!(second.tier, 0);
        assert_eq!(second.balance, Balance::ZERO);
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let (service, _) = service_with(ServiceConfig::default());
        service.register(AccountId(1), None).await.unwrap();
        assert!(matches!(
            service.register(AccountId(1), None).await,
            Err(LedgerError::AlreadyRegistered(AccountId(1)))
        ));
    }

    #[tokio::test]
    async fn test_mutate_discards_failed_changes() {
        let (service, _) = service_with(ServiceConfig::default());
        service.register(AccountId(1), None).await.unwrap();

        let result: Result<()> = service
            .mutate(AccountId(1), |account| {
                account.verified = true;
                account.adjust_balance(dec!(-1))
            })
            .await;
        assert!(result.is_err());

        let account = service.account(AccountId(1)).await.unwrap();
        assert!(!account.verified);
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let (service, _) = service_with(ServiceConfig::default());
        assert!(matches!(
            service.verify(AccountId(404)).await,
            Err(LedgerError::AccountNotFound(AccountId(404)))
        ));
    }

    #[tokio::test]
    async fn test_summary_lists_recent_history_first() {
        let config = ServiceConfig {
            recent_history: 2,
            ..Default::default()
        };
        let (service, _) = service_with(config);
        service.register(AccountId(1), None).await.unwrap();
        service
            .mutate(AccountId(1), |account| {
                for tier in 1..=3 {
                    account.set_tier(tier)?;
                    account.record_upgrade(UpgradeRecord {
                        tier,
                        cost: Decimal::from(tier * 100),
                        method: crate::domain::account::UpgradeMethod::Proof,
                        approved_at: Utc::now(),
                    })?;
                }
                Ok(())
            })
            .await
            .unwrap();

        let summary = service.get_summary(AccountId(1)).await.unwrap();
        assert_eq!(summary.tier, 3);
        let tiers: Vec<u32> = summary.recent_upgrades.iter().map(|u| u.tier).collect();
        assert_eq!(tiers, vec![3, 2]);
        assert_eq!(summary.pending_upgrade, None);
    }

    #[tokio::test]
    async fn test_referrals_sorted_by_tier() {
        let (service, _) = service_with(ServiceConfig::default());
        let referrer = service.register(AccountId(1), None).await.unwrap();
        for id in [2, 3, 4] {
            service
                .register(AccountId(id), Some(referrer.referral_code.clone()))
                .await
                .unwrap();
        }
        service
            .mutate(AccountId(4), |account| account.set_tier(1))
            .await
            .unwrap();

        let report = service.list_referrals(AccountId(1)).await.unwrap();
        let ids: Vec<AccountId> = report.referred.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![AccountId(4), AccountId(2), AccountId(3)]);
        assert_eq!(report.referral_code, referrer.referral_code);
    }

    #[tokio::test]
    async fn test_set_payout_destination_validates() {
        let (service, _) = service_with(ServiceConfig::default());
        service.register(AccountId(1), None).await.unwrap();

        assert!(matches!(
            service.set_payout_destination(AccountId(1), "not-an-address").await,
            Err(LedgerError::ValidationError(_))
        ));
        service
            .set_payout_destination(AccountId(1), " TQn9Y2khEsLJW1ChVWFMSMeRDow5KcbLSE ")
            .await
            .unwrap();
        let account = service.account(AccountId(1)).await.unwrap();
        assert_eq!(
            account.payout_destination.as_deref(),
            Some("TQn9Y2khEsLJW1ChVWFMSMeRDow5KcbLSE")
        );
    }
}
