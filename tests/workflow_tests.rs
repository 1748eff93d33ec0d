mod common;

use common::{ADDRESS, member, promote, service_with, two_tier_config};
use rust_decimal_macros::dec;
use tierledger::application::admin::{AdminDecision, DecisionOutcome};
use tierledger::application::commission::CommissionOutcome;
use tierledger::config::ServiceConfig;
use tierledger::domain::account::{AccountId, Balance, RequestId, RequestKind, UpgradeMethod};
use tierledger::error::{ErrorClass, LedgerError};

#[tokio::test]
async fn test_balance_upgrade_with_capped_commission() {
    let (service, _) = service_with(two_tier_config());

    // Referrer R at tier 2, where the cap is 5
    let referrer = service.register(AccountId(1), None).await.unwrap();
    promote(&service, AccountId(1)).await;
    promote(&service, AccountId(1)).await;

    service
        .register(AccountId(2), Some(referrer.referral_code.clone()))
        .await
        .unwrap();
    service.credit_balance(AccountId(2), dec!(1000)).await.unwrap();

    let request = service
        .request_balance_upgrade(AccountId(2), 1)
        .await
        .unwrap();
    let outcome = service
        .decide(AdminDecision {
            account: AccountId(2),
            kind: RequestKind::BalanceUpgrade,
            request: Some(request),
            approve: true,
        })
        .await
        .unwrap();

    let DecisionOutcome::Upgrade(decision) = outcome else {
        panic!("expected an upgrade decision");
    };
    assert_eq!(
        decision.commission,
        Some(CommissionOutcome::Paid {
            referrer: AccountId(1),
            amount: dec!(5)
        })
    );

    let account = service.account(AccountId(2)).await.unwrap();
    assert_eq!(account.balance, Balance::new(dec!(400)));
    assert_eq!(account.tier, 1);
    assert_eq!(account.upgrade_history.len(), 1);
    assert_eq!(account.upgrade_history[0].method, UpgradeMethod::Balance);

    let referrer = service.account(AccountId(1)).await.unwrap();
    assert_eq!(referrer.balance, Balance::new(dec!(5)));
    assert_eq!(referrer.commission_earned, Balance::new(dec!(5)));
}

#[tokio::test]
async fn test_referrer_at_tier_zero_earns_nothing() {
    let (service, notifier) = service_with(ServiceConfig::default());
    let referrer = service.register(AccountId(1), None).await.unwrap();
    service
        .register(AccountId(2), Some(referrer.referral_code))
        .await
        .unwrap();

    promote(&service, AccountId(2)).await;

    let referrer = service.account(AccountId(1)).await.unwrap();
    assert_eq!(referrer.balance, Balance::ZERO);
    assert_eq!(referrer.commission_earned, Balance::ZERO);
    assert!(notifier.messages_for(AccountId(1)).await.is_empty());
}

#[tokio::test]
async fn test_tier_only_moves_one_step() {
    let (service, _) = service_with(ServiceConfig::default());
    service.register(AccountId(1), None).await.unwrap();

    let skip = service
        .request_proof_upgrade(AccountId(1), 2, "proof-for-tier-2".to_string())
        .await;
    assert!(matches!(
        skip,
        Err(LedgerError::NonAdjacentTier {
            current: 0,
            requested: 2
        })
    ));

    for expected in 1..=3 {
        promote(&service, AccountId(1)).await;
        let account = service.account(AccountId(1)).await.unwrap();
        assert_eq!(account.tier, expected);
    }
    let account = service.account(AccountId(1)).await.unwrap();
    let tiers: Vec<u32> = account.upgrade_history.iter().map(|u| u.tier).collect();
    assert_eq!(tiers, vec![1, 2, 3]);
    assert_eq!(account.total_deposited(), dec!(12000));
}

#[tokio::test]
async fn test_withdrawal_idempotent_resolution() {
    let (service, _) = service_with(ServiceConfig::default());
    member(&service, AccountId(1), dec!(5000)).await;

    let request = service
        .request_withdrawal(AccountId(1), dec!(1000))
        .await
        .unwrap();
    let decision = |approve| AdminDecision {
        account: AccountId(1),
        kind: RequestKind::Withdrawal,
        request: Some(request),
        approve,
    };

    service.decide(decision(true)).await.unwrap();
    for approve in [true, false] {
        let err = service.decide(decision(approve)).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    let account = service.account(AccountId(1)).await.unwrap();
    assert_eq!(account.balance, Balance::new(dec!(3700)));
    assert_eq!(account.total_withdrawn(), dec!(1000));

    let unknown = service
        .decide(AdminDecision {
            request: Some(RequestId(99)),
            ..decision(false)
        })
        .await
        .unwrap_err();
    assert_eq!(unknown.class(), ErrorClass::NotFound);
}

#[tokio::test]
async fn test_upgrade_paths_are_exclusive() {
    let (service, _) = service_with(ServiceConfig::default());
    service.register(AccountId(1), None).await.unwrap();
    service.credit_balance(AccountId(1), dec!(2000)).await.unwrap();

    // a proof request cannot coexist with a balance request
    service.request_balance_upgrade(AccountId(1), 1).await.unwrap();
    assert!(matches!(
        service
            .request_proof_upgrade(AccountId(1), 1, "proof-for-tier-1".to_string())
            .await,
        Err(LedgerError::UpgradeAlreadyPending)
    ));
    service
        .resolve_balance_upgrade(AccountId(1), None, true)
        .await
        .unwrap();

    let account = service.account(AccountId(1)).await.unwrap();
    assert_eq!(account.tier, 1);
    assert_eq!(account.balance, Balance::ZERO);
}

#[tokio::test]
async fn test_summary_and_referrals() {
    let (service, _) = service_with(ServiceConfig::default());
    member(&service, AccountId(1), dec!(5000)).await;
    let code = service.account(AccountId(1)).await.unwrap().referral_code;
    for id in [2, 3] {
        service
            .register(AccountId(id), Some(code.clone()))
            .await
            .unwrap();
    }
    promote(&service, AccountId(3)).await;
    service
        .request_withdrawal(AccountId(1), dec!(1000))
        .await
        .unwrap();

    let summary = service.get_summary(AccountId(1)).await.unwrap();
    assert_eq!(summary.tier, 1);
    // 5000 - 1300 held + 1000 commission from account 3
    assert_eq!(summary.balance, dec!(4700));
    assert_eq!(summary.commission_earned, dec!(1000));
    assert_eq!(summary.payout_destination.as_deref(), Some(ADDRESS));
    assert_eq!(summary.pending_withdrawals, 1);
    assert_eq!(summary.recent_upgrades.len(), 1);

    let report = service.list_referrals(AccountId(1)).await.unwrap();
    let ids: Vec<AccountId> = report.referred.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![AccountId(3), AccountId(2)]);
}
