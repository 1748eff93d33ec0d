use super::service::AccountService;
use crate::domain::account::{AccountId, Amount, RequestId, RequestStatus, Withdrawal};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

impl AccountService {
    /// Places `amount` plus the configured fee on hold and opens a pending withdrawal.
    pub async fn request_withdrawal(&self, id: AccountId, amount: Decimal) -> Result<RequestId> {
        let amount = Amount::new(amount)?;
        let minimum = self.config().min_withdrawal;
        if amount.value() < minimum {
            return Err(LedgerError::BelowMinimumWithdrawal {
                amount: amount.value(),
                minimum,
            });
        }

        let fee = self.config().withdrawal_fee;
        let request = self
            .mutate(id, |account| account.open_withdrawal(amount, fee, Utc::now()))
            .await?;
        info!(
            account = %id,
            request = %request,
            amount = %amount.value(),
            %fee,
            "Withdrawal requested"
        );
        Ok(request)
    }

    /// Approves or rejects a pending withdrawal. Rejection returns the hold to the balance.
    pub async fn resolve_withdrawal(
        &self,
        id: AccountId,
        request: RequestId,
        approve: bool,
    ) -> Result<Withdrawal> {
        let withdrawal = self
            .mutate(id, |account| {
                account.resolve_withdrawal(request, approve, Utc::now())
            })
            .await?;

        info!(
            account = %id,
            request = %request,
            status = ?withdrawal.status,
            "Withdrawal resolved"
        );
        let message = match withdrawal.status {
            RequestStatus::Approved => format!(
                "Your withdrawal of {} has been approved and will be sent to your payout address.",
                withdrawal.amount
            ),
            _ => format!(
                "Your withdrawal of {} was rejected. The amount and the {} fee have been returned to your balance.",
                withdrawal.amount, withdrawal.fee
            ),
        };
        self.notify(id, message).await;
        Ok(withdrawal)
    }
}

#[cfg(test)]
mod tests {
    use crate::application::service::tests::service_with;
    use crate::config::ServiceConfig;
    use crate::domain::account::{AccountId, Balance, RequestStatus};
    use crate::error::LedgerError;
    use rust_decimal_macros::dec;

    const ADDRESS: &str = "TQn9Y2khEsLJW1ChVWFMSMeRDow5KcbLSE";

    async fn member_with_balance(
        service: &crate::application::service::AccountService,
        balance: rust_decimal::Decimal,
    ) {
        service.register(AccountId(1), None).await.unwrap();
        service
            .set_payout_destination(AccountId(1), ADDRESS)
            .await
            .unwrap();
        service
            .mutate(AccountId(1), |account| {
                account.set_tier(1)?;
                account.adjust_balance(balance)
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_withdrawal_round_trip() {
        let (service, notifier) = service_with(ServiceConfig::default());
        member_with_balance(&service, dec!(5000)).await;

        let request = service
            .request_withdrawal(AccountId(1), dec!(1500))
            .await
            .unwrap();
        let account = service.account(AccountId(1)).await.unwrap();
        assert_eq!(account.balance, Balance::new(dec!(3200)));

        let withdrawal = service
            .resolve_withdrawal(AccountId(1), request, false)
            .await
            .unwrap();
        assert_eq!(withdrawal.status, RequestStatus::Rejected);
        let account = service.account(AccountId(1)).await.unwrap();
        assert_eq!(account.balance, Balance::new(dec!(5000)));
        assert_eq!(notifier.messages_for(AccountId(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_second_resolution_conflicts() {
        let (service, _) = service_with(ServiceConfig::default());
        member_with_balance(&service, dec!(5000)).await;

        let request = service
            .request_withdrawal(AccountId(1), dec!(1000))
            .await
            .unwrap();
        service
            .resolve_withdrawal(AccountId(1), request, true)
            .await
            .unwrap();

        let second = service.resolve_withdrawal(AccountId(1), request, false).await;
        assert!(matches!(second, Err(LedgerError::AlreadyProcessed { .. })));
        let account = service.account(AccountId(1)).await.unwrap();
        assert_eq!(account.balance, Balance::new(dec!(3700)));
    }

    #[tokio::test]
    async fn test_withdrawal_below_minimum() {
        let (service, _) = service_with(ServiceConfig::default());
        member_with_balance(&service, dec!(5000)).await;

        assert!(matches!(
            service.request_withdrawal(AccountId(1), dec!(999.99)).await,
            Err(LedgerError::BelowMinimumWithdrawal { .. })
        ));
        assert!(matches!(
            service.request_withdrawal(AccountId(1), dec!(-5)).await,
            Err(LedgerError::ValidationError(_))
        ));
        let account = service.account(AccountId(1)).await.unwrap();
        assert!(account.withdrawals.is_empty());
    }

    #[tokio::test]
    async fn test_withdrawal_needs_amount_plus_fee() {
        let (service, _) = service_with(ServiceConfig::default());
        member_with_balance(&service, dec!(1200)).await;

        assert!(matches!(
            service.request_withdrawal(AccountId(1), dec!(1000)).await,
            Err(LedgerError::InsufficientBalance { .. })
        ));
        let account = service.account(AccountId(1)).await.unwrap();
        assert_eq!(account.balance, Balance::new(dec!(1200)));
    }

    #[tokio::test]
    async fn test_huge_amount_fails_without_panicking() {
        let (service, _) = service_with(ServiceConfig::default());
        member_with_balance(&service, dec!(5000)).await;

        assert!(matches!(
            service
                .request_withdrawal(AccountId(1), rust_decimal::Decimal::MAX)
                .await,
            Err(LedgerError::AmountOverflow)
        ));
        let account = service.account(AccountId(1)).await.unwrap();
        assert_eq!(account.balance, Balance::new(dec!(5000)));
        assert!(account.withdrawals.is_empty());
    }
}
