use super::account::{Account, AccountId};
use super::conversation::Conversation;
use crate::error::Result;
use async_trait::async_trait;

/// Durable storage of [`Account`] records.
///
/// Writes replace the whole record. Callers serialise read-modify-write
/// sequences per account (see `application::locks`), so implementations only
/// need last-write-wins semantics per key.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn store(&self, account: Account) -> Result<()>;
    async fn get(&self, id: AccountId) -> Result<Option<Account>>;
    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>>;
    async fn find_referred_by(&self, code: &str) -> Result<Vec<Account>>;
    async fn get_all(&self) -> Result<Vec<Account>>;
}

/// Key-value store of in-flight dialogs, one entry per account.
///
/// Contract: the last write for a key is visible to the next read of that key.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, id: AccountId) -> Result<Option<Conversation>>;
    async fn put(&self, id: AccountId, conversation: Conversation) -> Result<()>;
    async fn remove(&self, id: AccountId) -> Result<()>;
}

/// Outbound side of the messaging gateway. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: AccountId, text: String) -> Result<()>;
}

pub type AccountStoreBox = Box<dyn AccountStore>;
pub type ConversationStoreBox = Box<dyn ConversationStore>;
pub type NotifierBox = Box<dyn Notifier>;
