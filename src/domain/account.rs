use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identity of an account, as assigned by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a proof, balance-upgrade or withdrawal request.
///
/// Issued from a per-account counter, so an id below the counter that is no
/// longer pending has necessarily been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Proof,
    BalanceUpgrade,
    Withdrawal,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Proof => write!(f, "proof"),
            RequestKind::BalanceUpgrade => write!(f, "balance upgrade"),
            RequestKind::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

impl FromStr for RequestKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "proof" => Ok(RequestKind::Proof),
            "balance_upgrade" => Ok(RequestKind::BalanceUpgrade),
            "withdrawal" => Ok(RequestKind::Withdrawal),
            other => Err(LedgerError::ValidationError(format!(
                "Unknown request kind: {other}"
            ))),
        }
    }
}

/// A non-negative monetary value.
///
/// Changes go through [`Balance::checked_add`] and [`Balance::checked_sub`], so
/// a negative or overflowing balance can never be produced.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(Decimal);

/// Represents a positive monetary amount for requests.
///
/// Ensures that requested amounts are always positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(LedgerError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Adds `rhs`, or returns `None` when the sum does not fit a `Decimal`.
    pub fn checked_add(self, rhs: Decimal) -> Option<Self> {
        self.0.checked_add(rhs).map(Self)
    }

    /// Subtracts `rhs`, or returns `None` when the result would be negative.
    pub fn checked_sub(self, rhs: Decimal) -> Option<Self> {
        let rest = self.0.checked_sub(rhs)?;
        (rest >= Decimal::ZERO).then_some(Self(rest))
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeMethod {
    Proof,
    Balance,
}

/// Externally paid upgrade awaiting an admin decision.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ProofRequest {
    pub id: RequestId,
    /// Photo file id or transaction reference supplied by the user.
    pub payload: String,
    pub requested_tier: u32,
    pub status: RequestStatus,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Balance-funded upgrade awaiting an admin decision. Nothing is deducted
/// until approval.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct BalanceUpgradeRequest {
    pub id: RequestId,
    pub target_tier: u32,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UpgradeRecord {
    pub tier: u32,
    pub cost: Decimal,
    pub method: UpgradeMethod,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Withdrawal {
    pub id: RequestId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Withdrawal {
    /// Amount held on the balance while the withdrawal is pending.
    pub fn total(&self) -> Option<Decimal> {
        self.amount.checked_add(self.fee)
    }
}

/// The upgrade path currently in flight for an account, if any.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PendingUpgrade<'a> {
    None,
    Proof(&'a ProofRequest),
    Balance(&'a BalanceUpgradeRequest),
}

/// The durable ledger entry of one registered identity.
///
/// Every mutator validates first and only then writes, so a failed call
/// leaves the account exactly as it was.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub id: AccountId,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub verified: bool,
    pub tier: u32,
    pub balance: Balance,
    pub commission_earned: Balance,
    pub payout_destination: Option<String>,
    pub proof_request: Option<ProofRequest>,
    pub balance_upgrade: Option<BalanceUpgradeRequest>,
    pub upgrade_history: Vec<UpgradeRecord>,
    pub withdrawals: Vec<Withdrawal>,
    next_request_id: u64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        id: AccountId,
        referral_code: String,
        referred_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            referral_code,
            referred_by,
            verified: false,
            tier: 0,
            balance: Balance::ZERO,
            commission_earned: Balance::ZERO,
            payout_destination: None,
            proof_request: None,
            balance_upgrade: None,
            upgrade_history: Vec::new(),
            withdrawals: Vec::new(),
            next_request_id: 1,
            created_at: now,
        }
    }

    pub fn pending_upgrade(&self) -> PendingUpgrade<'_> {
        if let Some(request) = &self.balance_upgrade {
            return PendingUpgrade::Balance(request);
        }
        match &self.proof_request {
            Some(request) if request.status == RequestStatus::Pending => {
                PendingUpgrade::Proof(request)
            }
            _ => PendingUpgrade::None,
        }
    }

    pub fn pending_withdrawals(&self) -> impl Iterator<Item = &Withdrawal> {
        self.withdrawals
            .iter()
            .filter(|w| w.status == RequestStatus::Pending)
    }

    /// Sum of the costs of every approved upgrade.
    pub fn total_deposited(&self) -> Decimal {
        self.upgrade_history
            .iter()
            .fold(Decimal::ZERO, |total, u| total.saturating_add(u.cost))
    }

    /// Sum of approved withdrawal amounts, fees excluded.
    pub fn total_withdrawn(&self) -> Decimal {
        self.withdrawals
            .iter()
            .filter(|w| w.status == RequestStatus::Approved)
            .fold(Decimal::ZERO, |total, w| total.saturating_add(w.amount))
    }

    fn issue_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        id
    }

    fn was_issued(&self, id: RequestId) -> bool {
        id.0 >= 1 && id.0 < self.next_request_id
    }

    fn missing_request(&self, kind: RequestKind, id: Option<RequestId>) -> LedgerError {
        match id {
            Some(id) if self.was_issued(id) => LedgerError::AlreadyProcessed { kind, id },
            Some(id) => LedgerError::RequestNotFound { kind, id },
            None => LedgerError::NoPendingRequest(kind),
        }
    }

    fn ensure_next_tier(&self, requested: u32) -> Result<()> {
        if requested == self.tier + 1 {
            Ok(())
        } else {
            Err(LedgerError::NonAdjacentTier {
                current: self.tier,
                requested,
            })
        }
    }

    fn ensure_no_pending_upgrade(&self) -> Result<()> {
        match self.pending_upgrade() {
            PendingUpgrade::None => Ok(()),
            _ => Err(LedgerError::UpgradeAlreadyPending),
        }
    }

    fn ensure_funds(&self, required: Decimal) -> Result<()> {
        if self.balance.value() >= required {
            Ok(())
        } else {
            Err(LedgerError::InsufficientBalance {
                required,
                available: self.balance.value(),
            })
        }
    }

    /// Credits (positive `delta`) or debits (negative `delta`) the balance.
    pub fn adjust_balance(&mut self, delta: Decimal) -> Result<()> {
        if delta < Decimal::ZERO {
            self.ensure_funds(-delta)?;
        }
        self.balance = self
            .balance
            .checked_add(delta)
            .ok_or(LedgerError::AmountOverflow)?;
        Ok(())
    }

    /// Credits referral commission to both the balance and the running total.
    pub fn credit_commission(&mut self, amount: Amount) -> Result<()> {
        let balance = self.balance.checked_add(amount.value());
        let earned = self.commission_earned.checked_add(amount.value());
        let (Some(balance), Some(earned)) = (balance, earned) else {
            return Err(LedgerError::AmountOverflow);
        };
        self.balance = balance;
        self.commission_earned = earned;
        Ok(())
    }

    /// Moves the account to `tier`, which must be exactly one above the current tier.
    pub fn set_tier(&mut self, tier: u32) -> Result<()> {
        self.ensure_next_tier(tier)?;
        self.tier = tier;
        Ok(())
    }

    /// Appends to the upgrade history. Entries must follow the tier already reached.
    pub fn record_upgrade(&mut self, entry: UpgradeRecord) -> Result<()> {
        if entry.tier != self.tier {
            return Err(LedgerError::ValidationError(format!(
                "Upgrade record for tier {} does not match current tier {}",
                entry.tier, self.tier
            )));
        }
        self.upgrade_history.push(entry);
        Ok(())
    }

    pub fn set_payout_destination(&mut self, address: &str) -> Result<()> {
        validate_payout_address(address)?;
        self.payout_destination = Some(address.to_string());
        Ok(())
    }

    /// Places a hold of `amount + fee` on the balance and records a pending withdrawal.
    pub fn open_withdrawal(
        &mut self,
        amount: Amount,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Result<RequestId> {
        if self.payout_destination.is_none() {
            return Err(LedgerError::MissingPayoutDestination);
        }
        if self.tier < 1 {
            return Err(LedgerError::MembershipRequired);
        }
        let total = amount
            .value()
            .checked_add(fee)
            .ok_or(LedgerError::AmountOverflow)?;
        let rest = self
            .balance
            .checked_sub(total)
            .ok_or(LedgerError::InsufficientBalance {
                required: total,
                available: self.balance.value(),
            })?;

        let id = self.issue_request_id();
        self.balance = rest;
        self.withdrawals.push(Withdrawal {
            id,
            amount: amount.value(),
            fee,
            status: RequestStatus::Pending,
            requested_at: now,
            processed_at: None,
        });
        Ok(id)
    }

    /// Approves (keeps the hold) or rejects (restores the hold) a pending withdrawal.
    pub fn resolve_withdrawal(
        &mut self,
        id: RequestId,
        approve: bool,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal> {
        let withdrawal = self
            .withdrawals
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(LedgerError::RequestNotFound {
                kind: RequestKind::Withdrawal,
                id,
            })?;

        if withdrawal.status != RequestStatus::Pending {
            return Err(LedgerError::AlreadyProcessed {
                kind: RequestKind::Withdrawal,
                id,
            });
        }

        let refund = if approve {
            Decimal::ZERO
        } else {
            withdrawal.total().ok_or(LedgerError::AmountOverflow)?
        };
        let balance = self
            .balance
            .checked_add(refund)
            .ok_or(LedgerError::AmountOverflow)?;

        withdrawal.processed_at = Some(now);
        withdrawal.status = if approve {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        };
        let resolved = withdrawal.clone();
        self.balance = balance;
        Ok(resolved)
    }

    pub fn open_proof_request(
        &mut self,
        tier: u32,
        payload: String,
        now: DateTime<Utc>,
    ) -> Result<RequestId> {
        self.ensure_next_tier(tier)?;
        self.ensure_no_pending_upgrade()?;
        if payload.trim().is_empty() {
            return Err(LedgerError::ValidationError(
                "Proof payload must not be empty".to_string(),
            ));
        }

        let id = self.issue_request_id();
        self.proof_request = Some(ProofRequest {
            id,
            payload,
            requested_tier: tier,
            status: RequestStatus::Pending,
            uploaded_at: now,
            processed_at: None,
        });
        Ok(id)
    }

    /// Resolves the pending proof request.
    ///
    /// On approval the tier is re-checked against the current tier; a request
    /// that no longer targets the next tier fails with `StaleRequest` and the
    /// account is left untouched. Returns the appended history entry on approval.
    pub fn resolve_proof_request(
        &mut self,
        id: Option<RequestId>,
        approve: bool,
        cost: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Option<UpgradeRecord>> {
        let requested_tier = match &self.proof_request {
            Some(request)
                if request.status == RequestStatus::Pending
                    && id.is_none_or(|id| id == request.id) =>
            {
                request.requested_tier
            }
            _ => return Err(self.missing_request(RequestKind::Proof, id)),
        };

        let record = if approve {
            if requested_tier != self.tier + 1 {
                return Err(LedgerError::StaleRequest {
                    current: self.tier,
                    requested: requested_tier,
                });
            }
            let cost = cost.ok_or(LedgerError::UnknownTier(requested_tier))?;
            let record = UpgradeRecord {
                tier: requested_tier,
                cost,
                method: UpgradeMethod::Proof,
                approved_at: now,
            };
            self.set_tier(requested_tier)?;
            self.record_upgrade(record.clone())?;
            Some(record)
        } else {
            None
        };

        if let Some(request) = self.proof_request.as_mut() {
            request.status = if approve {
                RequestStatus::Approved
            } else {
                RequestStatus::Rejected
            };
            request.processed_at = Some(now);
        }
        Ok(record)
    }

    /// Opens a balance-funded upgrade request. The balance is checked but not
    /// deducted; deduction happens on approval.
    pub fn open_balance_upgrade_request(
        &mut self,
        tier: u32,
        cost: Decimal,
        now: DateTime<Utc>,
    ) -> Result<RequestId> {
        self.ensure_next_tier(tier)?;
        self.ensure_no_pending_upgrade()?;
        self.ensure_funds(cost)?;

        let id = self.issue_request_id();
        self.balance_upgrade = Some(BalanceUpgradeRequest {
            id,
            target_tier: tier,
            requested_at: now,
        });
        Ok(id)
    }

    /// Resolves the pending balance upgrade.
    ///
    /// Approval re-checks adjacency and funds at this instant, then deducts the
    /// cost and advances the tier in one step. Rejection only clears the request.
    pub fn resolve_balance_upgrade_request(
        &mut self,
        id: Option<RequestId>,
        approve: bool,
        cost: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Option<UpgradeRecord>> {
        let target_tier = match &self.balance_upgrade {
            Some(request) if id.is_none_or(|id| id == request.id) => request.target_tier,
            _ => return Err(self.missing_request(RequestKind::BalanceUpgrade, id)),
        };

        if !approve {
            self.balance_upgrade = None;
            return Ok(None);
        }

        if target_tier != self.tier + 1 {
            return Err(LedgerError::StaleRequest {
                current: self.tier,
                requested: target_tier,
            });
        }
        let cost = cost.ok_or(LedgerError::UnknownTier(target_tier))?;
        self.ensure_funds(cost)?;

        let record = UpgradeRecord {
            tier: target_tier,
            cost,
            method: UpgradeMethod::Balance,
            approved_at: now,
        };
        self.adjust_balance(-cost)?;
        self.set_tier(target_tier)?;
        self.record_upgrade(record.clone())?;
        self.balance_upgrade = None;
        Ok(Some(record))
    }
}

/// Checks the shape of a TRC20 payout address: `T` followed by 33 base58 characters.
pub fn validate_payout_address(address: &str) -> Result<()> {
    const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

    let valid = address.len() == 34
        && address.starts_with('T')
        && address.chars().skip(1).all(|c| BASE58.contains(c));
    if valid {
        Ok(())
    } else {
        Err(LedgerError::ValidationError(
            "Payout address must start with 'T' and be 34 base58 characters long".to_string(),
        ))
    }
}
