use crate::domain::account::{Account, AccountId};
use crate::domain::ports::AccountStore;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;

/// Column Family for storing account records.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family indexing referral codes to account ids.
pub const CF_REFERRAL_CODES: &str = "referral_codes";

/// A persistent account store using RocksDB.
///
/// Account records are stored as JSON under their big-endian id. A second
/// Column Family maps each referral code to its owner so referrers can be
/// resolved without a scan. Both are written in one batch.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating the
    /// required column families when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_accounts = ColumnFamilyDescriptor::new(CF_ACCOUNTS, Options::default());
        let cf_codes = ColumnFamilyDescriptor::new(CF_REFERRAL_CODES, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_accounts, cf_codes])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LedgerError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn decode(bytes: &[u8]) -> Result<Account> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn store(&self, account: Account) -> Result<()> {
        let accounts = self.cf(CF_ACCOUNTS)?;
        let codes = self.cf(CF_REFERRAL_CODES)?;

        let key = account.id.0.to_be_bytes();
        let value = serde_json::to_vec(&account)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(accounts, key, value);
        batch.put_cf(codes, account.referral_code.as_bytes(), key);
        self.db.write(batch)?;

        Ok(())
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, id.0.to_be_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>> {
        let codes = self.cf(CF_REFERRAL_CODES)?;
        let Some(raw_id) = self.db.get_cf(codes, code.as_bytes())? else {
            return Ok(None);
        };
        let id: [u8; 8] = raw_id.as_slice().try_into().map_err(|_| {
            LedgerError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Corrupt referral index entry for {code}"),
            )))
        })?;
        self.get(AccountId(u64::from_be_bytes(id))).await
    }

    async fn find_referred_by(&self, code: &str) -> Result<Vec<Account>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|account| account.referred_by.as_deref() == Some(code))
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;

        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            accounts.push(Self::decode(&value)?);
        }

        Ok(accounts)
    }
}
