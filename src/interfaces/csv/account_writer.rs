use crate::domain::account::{Account, AccountId};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct AccountRow {
    account: AccountId,
    verified: bool,
    tier: u32,
    balance: Decimal,
    commission_earned: Decimal,
    pending_withdrawals: usize,
}

impl From<&Account> for AccountRow {
    fn from(account: &Account) -> Self {
        Self {
            account: account.id,
            verified: account.verified,
            tier: account.tier,
            balance: account.balance.value().normalize(),
            commission_earned: account.commission_earned.value().normalize(),
            pending_withdrawals: account.pending_withdrawals().count(),
        }
    }
}

/// Writes the final account state as CSV, one row per account ordered by id.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, mut accounts: Vec<Account>) -> Result<()> {
        accounts.sort_by_key(|account| account.id);
        for account in &accounts {
            self.writer.serialize(AccountRow::from(account))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
