#![allow(dead_code)]

use rust_decimal::Decimal;
use std::sync::Arc;
use tierledger::application::dialog::DialogEngine;
use tierledger::application::service::AccountService;
use tierledger::config::ServiceConfig;
use tierledger::domain::account::AccountId;
use tierledger::domain::tiers::{TierSpec, TierTable};
use tierledger::infrastructure::in_memory::{
    InMemoryAccountStore, InMemoryConversationStore, RecordingNotifier,
};

pub const ADDRESS: &str = "TQn9Y2khEsLJW1ChVWFMSMeRDow5KcbLSE";

pub fn service_with(config: ServiceConfig) -> (Arc<AccountService>, RecordingNotifier) {
    let notifier = RecordingNotifier::new();
    let service = AccountService::new(
        Box::new(InMemoryAccountStore::new()),
        Box::new(notifier.clone()),
        config,
    );
    (Arc::new(service), notifier)
}

pub fn engine_with(config: ServiceConfig) -> (DialogEngine, RecordingNotifier) {
    let (service, notifier) = service_with(config);
    let engine = DialogEngine::new(service, Box::new(InMemoryConversationStore::new()));
    (engine, notifier)
}

/// Two tiers: 600 with cap 100, then 1200 with cap 5.
pub fn two_tier_config() -> ServiceConfig {
    ServiceConfig {
        tiers: TierTable::new(vec![
            TierSpec {
                tier: 1,
                cost: Decimal::from(600),
                commission_cap: Decimal::from(100),
            },
            TierSpec {
                tier: 2,
                cost: Decimal::from(1200),
                commission_cap: Decimal::from(5),
            },
        ])
        .unwrap(),
        ..Default::default()
    }
}

/// Advances a registered account by one tier through an approved proof upgrade.
pub async fn promote(service: &AccountService, id: AccountId) {
    let tier = service.account(id).await.unwrap().tier + 1;
    service
        .request_proof_upgrade(id, tier, format!("proof-for-tier-{tier}"))
        .await
        .unwrap();
    service.resolve_proof_upgrade(id, None, true).await.unwrap();
}

/// Registers a verified tier-1 account with a payout address and `balance`.
pub async fn member(service: &AccountService, id: AccountId, balance: Decimal) {
    service.register(id, None).await.unwrap();
    service.verify(id).await.unwrap();
    promote(service, id).await;
    service.set_payout_destination(id, ADDRESS).await.unwrap();
    if balance > Decimal::ZERO {
        service.credit_balance(id, balance).await.unwrap();
    }
}
