use crate::domain::account::{Account, AccountId};
use crate::domain::conversation::Conversation;
use crate::domain::ports::{AccountStore, ConversationStore, Notifier};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for accounts.
///
/// Uses `Arc<RwLock<HashMap<AccountId, Account>>>` to allow shared concurrent access.
/// Ideal for testing or small deployments where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<AccountId, Account>>>,
}

impl InMemoryAccountStore {
    /// Creates a new, empty in-memory account store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn store(&self, account: Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id, account);
        Ok(())
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|account| account.referral_code == code)
            .cloned())
    }

    async fn find_referred_by(&self, code: &str) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .filter(|account| account.referred_by.as_deref() == Some(code))
            .cloned()
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().cloned().collect())
    }
}

/// Process-local dialog table. Lost on restart, which only abandons
/// in-flight dialogs; pending ledger requests live in the account store.
#[derive(Default, Clone)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<AccountId, Conversation>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, id: AccountId) -> Result<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id).cloned())
    }

    async fn put(&self, id: AccountId, conversation: Conversation) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(id, conversation);
        Ok(())
    }

    async fn remove(&self, id: AccountId) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations.remove(&id);
        Ok(())
    }
}

/// A notifier that keeps every outbound message in order of sending.
///
/// Clones share the same outbox, so a test can hand one clone to the service
/// and inspect the other.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    outbox: Arc<RwLock<Vec<(AccountId, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<(AccountId, String)> {
        self.outbox.read().await.clone()
    }

    pub async fn messages_for(&self, id: AccountId) -> Vec<String> {
        self.outbox
            .read()
            .await
            .iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Removes and returns everything sent so far.
    pub async fn drain(&self) -> Vec<(AccountId, String)> {
        std::mem::take(&mut *self.outbox.write().await)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: AccountId, text: String) -> Result<()> {
        self.outbox.write().await.push((to, text));
        Ok(())
    }
}
