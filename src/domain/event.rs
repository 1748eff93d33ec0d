use super::account::AccountId;
use crate::error::{LedgerError, Result};
use std::str::FromStr;

/// An inbound chat event, already attributed to an account by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub account: AccountId,
    pub payload: Payload,
}

impl InboundEvent {
    pub fn text(account: AccountId, text: impl Into<String>) -> Self {
        Self {
            account,
            payload: Payload::Text(text.into()),
        }
    }

    pub fn photo(account: AccountId, file_id: impl Into<String>) -> Self {
        Self {
            account,
            payload: Payload::Photo {
                file_id: file_id.into(),
            },
        }
    }

    pub fn callback(account: AccountId, callback: Callback) -> Self {
        Self {
            account,
            payload: Payload::Callback(callback),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Photo { file_id: String },
    Callback(Callback),
}

/// Structured button presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    PayWithProof { tier: u32 },
    PayFromBalance { tier: u32 },
    ConfirmWithdrawal,
    CancelWithdrawal,
}

impl FromStr for Callback {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let parse_tier = |raw: &str| {
            raw.trim().parse::<u32>().map_err(|_| {
                LedgerError::ValidationError(format!("Invalid tier in callback: {raw}"))
            })
        };
        match s.trim().split_once(':') {
            Some(("pay_proof", tier)) => Ok(Callback::PayWithProof {
                tier: parse_tier(tier)?,
            }),
            Some(("pay_balance", tier)) => Ok(Callback::PayFromBalance {
                tier: parse_tier(tier)?,
            }),
            None if s.trim() == "confirm_withdraw" => Ok(Callback::ConfirmWithdrawal),
            None if s.trim() == "cancel_withdraw" => Ok(Callback::CancelWithdrawal),
            _ => Err(LedgerError::ValidationError(format!(
                "Unknown callback: {s}"
            ))),
        }
    }
}

/// Top-level commands, only recognised when no dialog is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { referral_code: Option<String> },
    Verify,
    Balance,
    Buy,
    Withdraw,
    Wallet,
    Referrals,
    Help,
}

impl Command {
    /// Parses `/name [argument]`. Returns `None` for anything that is not a known command.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        let command = match name {
            "start" => Command::Start {
                referral_code: argument
                    .strip_prefix("ref_")
                    .filter(|code| !code.is_empty())
                    .map(str::to_string),
            },
            "verify" => Command::Verify,
            "balance" | "mybalance" => Command::Balance,
            "buy" => Command::Buy,
            "withdraw" => Command::Withdraw,
            "wallet" | "addpaymentdetails" => Command::Wallet,
            "referrals" => Command::Referrals,
            "help" => Command::Help,
            _ => return None,
        };
        Some(command)
    }
}
