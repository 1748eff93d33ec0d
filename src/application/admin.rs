//! Admin decision channel and operator reports.
//!
//! Authentication of the admin caller is the transport's job; everything here
//! assumes the caller is already authorised.

use super::service::AccountService;
use super::upgrade::UpgradeDecision;
use crate::domain::account::{AccountId, Amount, RequestId, RequestKind, RequestStatus, Withdrawal};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

/// `(account, kind, request id, approve)` as supplied by an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminDecision {
    pub account: AccountId,
    pub kind: RequestKind,
    /// Optional for upgrade requests (an account has at most one pending);
    /// required for withdrawals.
    pub request: Option<RequestId>,
    pub approve: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Upgrade(UpgradeDecision),
    Withdrawal(Withdrawal),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingProof {
    pub account: AccountId,
    pub request: RequestId,
    pub tier: u32,
    pub payload: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingBalanceUpgrade {
    pub account: AccountId,
    pub request: RequestId,
    pub tier: u32,
    pub cost: Option<Decimal>,
    /// Balance at report time; approval re-checks it.
    pub balance: Decimal,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingWithdrawal {
    pub account: AccountId,
    pub request: RequestId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub payout_destination: Option<String>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub account: AccountId,
    pub verified: bool,
    pub tier: u32,
    pub balance: Decimal,
    pub commission_earned: Decimal,
    pub total_deposited: Decimal,
    pub total_withdrawn: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UserStatsReport {
    pub users: Vec<UserStats>,
    pub total_balance: Decimal,
    pub total_commission: Decimal,
    pub total_deposited: Decimal,
    pub total_withdrawn: Decimal,
}

impl AccountService {
    /// Applies an admin decision to the named request.
    pub async fn decide(&self, decision: AdminDecision) -> Result<DecisionOutcome> {
        let AdminDecision {
            account,
            kind,
            request,
            approve,
        } = decision;
        info!(%account, %kind, ?request, approve, "Admin decision received");

        match kind {
            RequestKind::Proof => self
                .resolve_proof_upgrade(account, request, approve)
                .await
                .map(DecisionOutcome::Upgrade),
            RequestKind::BalanceUpgrade => self
                .resolve_balance_upgrade(account, request, approve)
                .await
                .map(DecisionOutcome::Upgrade),
            RequestKind::Withdrawal => {
                let request = request.ok_or_else(|| {
                    LedgerError::ValidationError(
                        "A withdrawal decision must name the withdrawal id".to_string(),
                    )
                })?;
                self.resolve_withdrawal(account, request, approve)
                    .await
                    .map(DecisionOutcome::Withdrawal)
            }
        }
    }

    /// Manual administrative credit.
    pub async fn credit_balance(&self, id: AccountId, amount: Decimal) -> Result<()> {
        let amount = Amount::new(amount)?;
        self.mutate(id, |account| account.adjust_balance(amount.value()))
            .await?;
        info!(account = %id, amount = %amount.value(), "Balance credited");
        self.notify(
            id,
            format!("{} has been credited to your balance.", amount.value()),
        )
        .await;
        Ok(())
    }

    pub async fn pending_proofs(&self) -> Result<Vec<PendingProof>> {
        let mut pending: Vec<PendingProof> = self
            .accounts()
            .await?
            .into_iter()
            .filter_map(|account| {
                let request = account.proof_request?;
                (request.status == RequestStatus::Pending).then(|| PendingProof {
                    account: account.id,
                    request: request.id,
                    tier: request.requested_tier,
                    payload: request.payload,
                    uploaded_at: request.uploaded_at,
                })
            })
            .collect();
        pending.sort_by_key(|p| p.uploaded_at);
        Ok(pending)
    }

    pub async fn pending_balance_upgrades(&self) -> Result<Vec<PendingBalanceUpgrade>> {
        let tiers = &self.config().tiers;
        let mut pending: Vec<PendingBalanceUpgrade> = self
            .accounts()
            .await?
            .into_iter()
            .filter_map(|account| {
                let request = account.balance_upgrade?;
                Some(PendingBalanceUpgrade {
                    account: account.id,
                    request: request.id,
                    tier: request.target_tier,
                    cost: tiers.cost(request.target_tier),
                    balance: account.balance.value(),
                    requested_at: request.requested_at,
                })
            })
            .collect();
        pending.sort_by_key(|p| p.requested_at);
        Ok(pending)
    }

    pub async fn pending_withdrawals(&self) -> Result<Vec<PendingWithdrawal>> {
        let mut pending: Vec<PendingWithdrawal> = self
            .accounts()
            .await?
            .iter()
            .flat_map(|account| {
                account.pending_withdrawals().map(move |w| PendingWithdrawal {
                    account: account.id,
                    request: w.id,
                    amount: w.amount,
                    fee: w.fee,
                    payout_destination: account.payout_destination.clone(),
                    requested_at: w.requested_at,
                })
            })
            .collect();
        pending.sort_by_key(|p| (p.requested_at, p.account, p.request));
        Ok(pending)
    }

    pub async fn user_stats(&self) -> Result<UserStatsReport> {
        let mut accounts = self.accounts().await?;
        accounts.sort_by_key(|account| account.id);

        let mut report = UserStatsReport::default();
        for account in accounts {
            let stats = UserStats {
                account: account.id,
                verified: account.verified,
                tier: account.tier,
                balance: account.balance.value(),
                commission_earned: account.commission_earned.value(),
                total_deposited: account.total_deposited(),
                total_withdrawn: account.total_withdrawn(),
            };
            report.total_balance = report.total_balance.saturating_add(stats.balance);
            report.total_commission = report
                .total_commission
                .saturating_add(stats.commission_earned);
            report.total_deposited = report
                .total_deposited
                .saturating_add(stats.total_deposited);
            report.total_withdrawn = report
                .total_withdrawn
                .saturating_add(stats.total_withdrawn);
            report.users.push(stats);
        }
        Ok(report)
    }
}
