use crate::domain::account::{AccountId, RequestId, RequestKind};
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Coarse classification of a [`LedgerError`].
///
/// Callers branch on the class rather than on individual variants: validation
/// errors re-prompt, business-rule and not-found errors are reported, conflicts
/// ask the caller to refresh and retry, infrastructure errors are fatal for the
/// current operation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    BusinessRule,
    NotFound,
    Conflict,
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Amount is too large")]
    AmountOverflow,

    #[error("Insufficient balance: {required} required, {available} available")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },
    #[error("Tier {requested} cannot be reached from tier {current}; upgrades go one tier at a time")]
    NonAdjacentTier { current: u32, requested: u32 },
    #[error("Tier {0} has no configured cost")]
    UnknownTier(u32),
    #[error("Highest tier already reached")]
    TopTierReached,
    #[error("An upgrade request is already pending")]
    UpgradeAlreadyPending,
    #[error("Payout destination must be set before withdrawing")]
    MissingPayoutDestination,
    #[error("Withdrawal amount {amount} is below the minimum of {minimum}")]
    BelowMinimumWithdrawal { amount: Decimal, minimum: Decimal },
    #[error("Membership tier 1 or higher is required")]
    MembershipRequired,
    #[error("Account is not verified")]
    NotVerified,
    #[error("Account {0} is already registered")]
    AlreadyRegistered(AccountId),

    #[error("Account {0} not found")]
    AccountNotFound(AccountId),
    #[error("No pending {0} request")]
    NoPendingRequest(RequestKind),
    #[error("{kind} request {id} not found")]
    RequestNotFound { kind: RequestKind, id: RequestId },

    #[error("{kind} request {id} has already been processed")]
    AlreadyProcessed { kind: RequestKind, id: RequestId },
    #[error("Stale request: account is now at tier {current}, request targeted tier {requested}")]
    StaleRequest { current: u32, requested: u32 },

    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        LedgerError::InternalError(Box::new(err))
    }
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::ValidationError(_) | LedgerError::AmountOverflow => {
                ErrorClass::Validation
            }
            LedgerError::InsufficientBalance { .. }
            | LedgerError::NonAdjacentTier { .. }
            | LedgerError::UnknownTier(_)
            | LedgerError::TopTierReached
            | LedgerError::UpgradeAlreadyPending
            | LedgerError::MissingPayoutDestination
            | LedgerError::BelowMinimumWithdrawal { .. }
            | LedgerError::MembershipRequired
            | LedgerError::NotVerified
            | LedgerError::AlreadyRegistered(_) => ErrorClass::BusinessRule,
            LedgerError::AccountNotFound(_)
            | LedgerError::NoPendingRequest(_)
            | LedgerError::RequestNotFound { .. } => ErrorClass::NotFound,
            LedgerError::AlreadyProcessed { .. } | LedgerError::StaleRequest { .. } => {
                ErrorClass::Conflict
            }
            LedgerError::Config(_)
            | LedgerError::CsvError(_)
            | LedgerError::IoError(_)
            | LedgerError::SerdeError(_)
            | LedgerError::InternalError(_) => ErrorClass::Infrastructure,
        }
    }

    /// Whether repeating the operation after refreshing state can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Conflict | ErrorClass::Infrastructure
        )
    }
}
