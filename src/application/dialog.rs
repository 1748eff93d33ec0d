use super::locks::AccountLocks;
use super::service::{AccountService, PendingUpgradeSummary};
use super::upgrade::check_upgrade;
use crate::domain::account::{Account, AccountId, validate_payout_address};
use crate::domain::conversation::{Conversation, Flow, Step};
use crate::domain::event::{Callback, Command, InboundEvent, Payload};
use crate::domain::ports::ConversationStoreBox;
use crate::error::{ErrorClass, LedgerError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

const HELP: &str = "Available commands:\n\
/start - register (use /start ref_<code> when invited)\n\
/verify - confirm you joined the channel\n\
/balance - tier, balance and recent activity\n\
/buy - upgrade to the next tier\n\
/withdraw - request a withdrawal\n\
/wallet - set your payout address\n\
/referrals - accounts you referred";

const NOT_UNDERSTOOD: &str =
    "Sorry, I didn't understand that. Send /help to see the available commands.";

/// What an inbound event did to the account's dialog.
#[derive(Debug)]
pub enum Outcome {
    /// A flow started or moved to its next step.
    Prompted,
    /// The input was not usable at the current step; the step is unchanged.
    Reprompted,
    /// A ledger operation was applied.
    Committed,
    Cancelled,
    /// The dialog had been idle too long and was discarded.
    Expired,
    /// The operation was refused. Any active flow has been discarded.
    Rejected(LedgerError),
    /// Informational answer without state change.
    Replied,
}

enum Answer {
    Yes,
    No,
    Other,
}

impl Answer {
    fn parse(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "yes" | "y" | "confirm" => Answer::Yes,
            "no" | "n" | "cancel" => Answer::No,
            _ => Answer::Other,
        }
    }
}

fn is_cancel(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("cancel")
}

/// A text proof is a transaction reference of 11 to 99 characters.
fn is_proof_reference(text: &str) -> bool {
    (11..=99).contains(&text.trim().chars().count())
}

/// Drives the per-account conversation state machine.
///
/// Events for one account are handled strictly one at a time. While a flow is
/// active every event is flow input; commands are only recognised when no
/// flow is active.
pub struct DialogEngine {
    service: Arc<AccountService>,
    conversations: ConversationStoreBox,
    locks: AccountLocks,
}

impl DialogEngine {
    pub fn new(service: Arc<AccountService>, conversations: ConversationStoreBox) -> Self {
        Self {
            service,
            conversations,
            locks: AccountLocks::new(),
        }
    }

    pub fn service(&self) -> &Arc<AccountService> {
        &self.service
    }

    /// Handles one inbound event.
    ///
    /// Expected failures come back as [`Outcome::Rejected`]; only
    /// infrastructure errors are returned as `Err`, and those leave any active
    /// dialog in place.
    pub async fn handle(&self, event: InboundEvent) -> Result<Outcome> {
        let InboundEvent { account: id, payload } = event;
        let _guard = self.locks.acquire(id).await;
        let now = Utc::now();

        match self.conversations.get(id).await? {
            Some(conversation)
                if conversation.is_expired(now, self.service.config().dialog_timeout()) =>
            {
                self.conversations.remove(id).await?;
                debug!(account = %id, flow = ?conversation.flow, "Dialog expired");
                self.reply(id, "Your previous session expired. Please start again.")
                    .await;
                Ok(Outcome::Expired)
            }
            Some(conversation) => self.continue_flow(id, conversation, payload, now).await,
            None => match payload {
                Payload::Text(text) => match Command::parse(&text) {
                    Some(command) => self.command(id, command, now).await,
                    None => {
                        self.reply(id, NOT_UNDERSTOOD).await;
                        Ok(Outcome::Replied)
                    }
                },
                Payload::Photo { .. } => {
                    self.reply(id, NOT_UNDERSTOOD).await;
                    Ok(Outcome::Replied)
                }
                Payload::Callback(callback) => self.callback(id, callback, now).await,
            },
        }
    }

    async fn reply(&self, id: AccountId, text: impl Into<String>) {
        self.service.notify(id, text).await;
    }

    async fn reprompt(&self, id: AccountId, text: impl Into<String>) -> Result<Outcome> {
        self.reply(id, text).await;
        Ok(Outcome::Reprompted)
    }

    async fn cancel(&self, id: AccountId, text: &str) -> Result<Outcome> {
        self.conversations.remove(id).await?;
        self.reply(id, text).await;
        Ok(Outcome::Cancelled)
    }

    /// Reports a refused operation to the user. Infrastructure errors are
    /// propagated instead.
    async fn refuse(&self, id: AccountId, err: LedgerError) -> Result<Outcome> {
        if err.class() == ErrorClass::Infrastructure {
            return Err(err);
        }
        debug!(account = %id, error = %err, "Request refused");
        let message = match &err {
            LedgerError::AccountNotFound(_) => "Please /start the bot first.".to_string(),
            LedgerError::NotVerified => "Please /verify your account first.".to_string(),
            other => other.to_string(),
        };
        self.reply(id, message).await;
        Ok(Outcome::Rejected(err))
    }

    /// Ends the active flow once its workflow command has run.
    async fn finish(&self, id: AccountId, result: Result<String>) -> Result<Outcome> {
        match result {
            Ok(message) => {
                self.conversations.remove(id).await?;
                self.reply(id, message).await;
                Ok(Outcome::Committed)
            }
            Err(err) if err.class() == ErrorClass::Infrastructure => Err(err),
            Err(err) => {
                self.conversations.remove(id).await?;
                self.refuse(id, err).await
            }
        }
    }

    async fn abort(&self, id: AccountId, err: LedgerError) -> Result<Outcome> {
        self.finish(id, Err(err)).await
    }

    async fn require_verified(&self, id: AccountId) -> Result<Account> {
        let account = self.service.account(id).await?;
        if account.verified {
            Ok(account)
        } else {
            Err(LedgerError::NotVerified)
        }
    }

    async fn continue_flow(
        &self,
        id: AccountId,
        conversation: Conversation,
        payload: Payload,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        match (conversation.flow, conversation.step) {
            (Flow::Withdraw, Step::AskAmount) => {
                self.withdrawal_amount(id, conversation, payload, now).await
            }
            (Flow::Withdraw, Step::Confirm) => {
                self.withdrawal_confirmation(id, conversation, payload)
                    .await
            }
            (Flow::SetPayoutDestination, Step::AskAddress) => {
                self.payout_address(id, payload).await
            }
            (Flow::SubmitProof, Step::AwaitingPayload) => {
                self.proof_payload(id, conversation, payload).await
            }
            (Flow::ConfirmBalanceUpgrade, Step::AskYesNo) => {
                self.balance_upgrade_answer(id, conversation, payload).await
            }
            (flow, step) => {
                warn!(account = %id, ?flow, ?step, "Discarding dialog in an inconsistent step");
                self.cancel(id, NOT_UNDERSTOOD).await
            }
        }
    }

    async fn withdrawal_amount(
        &self,
        id: AccountId,
        conversation: Conversation,
        payload: Payload,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let text = match payload {
            Payload::Text(text) => text,
            Payload::Callback(Callback::CancelWithdrawal) => {
                return self.cancel(id, "Withdrawal request cancelled.").await;
            }
            _ => {
                return self
                    .reprompt(id, "Please enter the amount to withdraw, or send cancel.")
                    .await;
            }
        };
        if is_cancel(&text) {
            return self.cancel(id, "Withdrawal request cancelled.").await;
        }

        let config = self.service.config();
        let parsed = text.trim().parse::<Decimal>().ok().and_then(|amount| {
            let total = amount.checked_add(config.withdrawal_fee)?;
            (amount > Decimal::ZERO && config.round_to_unit(amount) == amount)
                .then_some((amount, total))
        });
        let (amount, total) = match parsed {
            Some(parsed) => parsed,
            None => {
                return self
                    .reprompt(id, "Invalid amount. Please enter a positive number.")
                    .await;
            }
        };
        if amount < config.min_withdrawal {
            return self
                .reprompt(
                    id,
                    format!(
                        "Minimum withdrawal is {}. Please enter a valid amount.",
                        config.min_withdrawal
                    ),
                )
                .await;
        }

        let account = match self.service.account(id).await {
            Ok(account) => account,
            Err(err) => return self.abort(id, err).await,
        };
        if account.balance.value() < total {
            return self
                .abort(
                    id,
                    LedgerError::InsufficientBalance {
                        required: total,
                        available: account.balance.value(),
                    },
                )
                .await;
        }

        let destination = account.payout_destination.unwrap_or_default();
        let mut next = conversation.advance(Step::Confirm, now);
        next.data.amount = Some(amount);
        self.conversations.put(id, next).await?;
        self.reply(
            id,
            format!(
                "You requested to withdraw {amount}.\nFee: {}.\nTotal deduction: {total}.\nWithdrawal to: {destination}\n\nConfirm withdrawal? Reply yes or no.",
                config.withdrawal_fee
            ),
        )
        .await;
        Ok(Outcome::Prompted)
    }

    async fn withdrawal_confirmation(
        &self,
        id: AccountId,
        conversation: Conversation,
        payload: Payload,
    ) -> Result<Outcome> {
        let answer = match &payload {
            Payload::Callback(Callback::ConfirmWithdrawal) => Answer::Yes,
            Payload::Callback(Callback::CancelWithdrawal) => Answer::No,
            Payload::Text(text) => Answer::parse(text),
            _ => Answer::Other,
        };

        match answer {
            Answer::Yes => {
                let Some(amount) = conversation.data.amount else {
                    return self
                        .abort(
                            id,
                            LedgerError::ValidationError(
                                "Withdrawal amount missing, please start again".to_string(),
                            ),
                        )
                        .await;
                };
                let result = self
                    .service
                    .request_withdrawal(id, amount)
                    .await
                    .map(|request| {
                        format!(
                            "Withdrawal request #{request} for {amount} submitted. An admin will process it and you will be notified."
                        )
                    });
                self.finish(id, result).await
            }
            Answer::No => self.cancel(id, "Withdrawal request cancelled.").await,
            Answer::Other => {
                self.reprompt(id, "Please reply yes to confirm or no to cancel the withdrawal.")
                    .await
            }
        }
    }

    async fn payout_address(&self, id: AccountId, payload: Payload) -> Result<Outcome> {
        let Payload::Text(text) = payload else {
            return self
                .reprompt(id, "Please send your TRC20 wallet address, or send cancel.")
                .await;
        };
        if is_cancel(&text) {
            return self.cancel(id, "Wallet address update cancelled.").await;
        }

        let address = text.trim();
        if validate_payout_address(address).is_err() {
            return self
                .reprompt(
                    id,
                    "Invalid TRC20 wallet address. It should start with 'T' and be 34 characters long. Please try again or send cancel.",
                )
                .await;
        }
        let result = self
            .service
            .set_payout_destination(id, address)
            .await
            .map(|()| "Your payout address has been saved.".to_string());
        self.finish(id, result).await
    }

    async fn proof_payload(
        &self,
        id: AccountId,
        conversation: Conversation,
        payload: Payload,
    ) -> Result<Outcome> {
        let proof = match payload {
            Payload::Text(text) if is_cancel(&text) => {
                return self.cancel(id, "Upgrade purchase cancelled.").await;
            }
            Payload::Photo { file_id } => file_id,
            Payload::Text(text) if is_proof_reference(&text) => text.trim().to_string(),
            _ => {
                return self
                    .reprompt(
                        id,
                        "That doesn't look like a valid payment proof. Send a screenshot of the transaction or its reference, or send cancel.",
                    )
                    .await;
            }
        };
        let Some(tier) = conversation.data.tier else {
            return self
                .abort(
                    id,
                    LedgerError::ValidationError(
                        "Requested tier missing, please start again".to_string(),
                    ),
                )
                .await;
        };

        let result = self
            .service
            .request_proof_upgrade(id, tier, proof)
            .await
            .map(|request| {
                format!(
                    "Your payment proof for tier {tier} has been submitted as request #{request}. Please wait for admin approval."
                )
            });
        self.finish(id, result).await
    }

    async fn balance_upgrade_answer(
        &self,
        id: AccountId,
        conversation: Conversation,
        payload: Payload,
    ) -> Result<Outcome> {
        let answer = match &payload {
            Payload::Text(text) => Answer::parse(text),
            _ => Answer::Other,
        };

        match answer {
            Answer::Yes => {
                let Some(tier) = conversation.data.tier else {
                    return self
                        .abort(
                            id,
                            LedgerError::ValidationError(
                                "Requested tier missing, please start again".to_string(),
                            ),
                        )
                        .await;
                };
                // the balance is re-checked by the request itself
                let result = self
                    .service
                    .request_balance_upgrade(id, tier)
                    .await
                    .map(|request| {
                        format!(
                            "Upgrade to tier {tier} from balance submitted as request #{request}. Awaiting admin approval."
                        )
                    });
                self.finish(id, result).await
            }
            Answer::No => self.cancel(id, "Upgrade from balance cancelled.").await,
            Answer::Other => {
                self.reprompt(id, "Please reply yes to confirm or no to cancel the upgrade.")
                    .await
            }
        }
    }

    async fn command(&self, id: AccountId, command: Command, now: DateTime<Utc>) -> Result<Outcome> {
        let result = match command {
            Command::Start { referral_code } => self.start(id, referral_code).await,
            Command::Verify => self.verify(id).await,
            Command::Balance => self.balance(id).await,
            Command::Buy => self.buy(id).await,
            Command::Withdraw => self.start_withdrawal(id, now).await,
            Command::Wallet => self.start_wallet(id, now).await,
            Command::Referrals => self.referrals(id).await,
            Command::Help => {
                self.reply(id, HELP).await;
                Ok(Outcome::Replied)
            }
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) => self.refuse(id, err).await,
        }
    }

    async fn callback(&self, id: AccountId, callback: Callback, now: DateTime<Utc>) -> Result<Outcome> {
        let result = match callback {
            Callback::PayWithProof { tier } => self.start_proof(id, tier, now).await,
            Callback::PayFromBalance { tier } => self.start_balance_upgrade(id, tier, now).await,
            Callback::ConfirmWithdrawal | Callback::CancelWithdrawal => {
                self.reply(id, "There is no withdrawal awaiting confirmation.")
                    .await;
                Ok(Outcome::Replied)
            }
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) => self.refuse(id, err).await,
        }
    }

    async fn start(&self, id: AccountId, referral_code: Option<String>) -> Result<Outcome> {
        match self.service.account(id).await {
            Ok(_) => {
                self.reply(id, "Welcome back!").await;
                Ok(Outcome::Replied)
            }
            Err(LedgerError::AccountNotFound(_)) => {
                let account = self.service.register(id, referral_code).await?;
                self.reply(
                    id,
                    format!(
                        "Welcome! Your referral code is {}. Join our channel and then send /verify to complete your setup.",
                        account.referral_code
                    ),
                )
                .await;
                Ok(Outcome::Committed)
            }
            Err(err) => Err(err),
        }
    }

    async fn verify(&self, id: AccountId) -> Result<Outcome> {
        let account = self.service.account(id).await?;
        if account.verified {
            self.reply(id, "You are already verified!").await;
            return Ok(Outcome::Replied);
        }
        self.service.verify(id).await?;
        self.reply(id, "You have been verified. All features are now available.")
            .await;
        Ok(Outcome::Committed)
    }

    async fn balance(&self, id: AccountId) -> Result<Outcome> {
        let summary = self.service.get_summary(id).await?;

        let mut message = format!(
            "Tier: {}\nBalance: {}\nCommission earned: {}\nReferral code: {}\nPayout address: {}",
            summary.tier,
            summary.balance,
            summary.commission_earned,
            summary.referral_code,
            summary.payout_destination.as_deref().unwrap_or("not set"),
        );
        match &summary.pending_upgrade {
            Some(PendingUpgradeSummary::Proof { id, tier }) => {
                let _ = write!(message, "\nPending proof upgrade #{id} to tier {tier}");
            }
            Some(PendingUpgradeSummary::Balance { id, tier }) => {
                let _ = write!(message, "\nPending balance upgrade #{id} to tier {tier}");
            }
            None => {}
        }
        if summary.pending_withdrawals > 0 {
            let _ = write!(
                message,
                "\nPending withdrawals: {}",
                summary.pending_withdrawals
            );
        }
        if !summary.recent_upgrades.is_empty() {
            message.push_str("\n\nRecent upgrades:");
            for upgrade in &summary.recent_upgrades {
                let _ = write!(
                    message,
                    "\n- tier {} for {} ({:?}) on {}",
                    upgrade.tier,
                    upgrade.cost,
                    upgrade.method,
                    upgrade.approved_at.format("%Y-%m-%d")
                );
            }
        }
        if !summary.recent_withdrawals.is_empty() {
            message.push_str("\n\nRecent withdrawals:");
            for withdrawal in &summary.recent_withdrawals {
                let _ = write!(
                    message,
                    "\n- #{} {} ({:?}) on {}",
                    withdrawal.id,
                    withdrawal.amount,
                    withdrawal.status,
                    withdrawal.requested_at.format("%Y-%m-%d")
                );
            }
        }

        self.reply(id, message).await;
        Ok(Outcome::Replied)
    }

    async fn buy(&self, id: AccountId) -> Result<Outcome> {
        let account = self.require_verified(id).await?;
        let config = self.service.config();
        if account.tier >= config.tiers.highest_tier() {
            self.reply(id, "Congratulations! You have reached the highest tier.")
                .await;
            return Ok(Outcome::Replied);
        }

        let tier = account.tier + 1;
        let cost = check_upgrade(config, &account, tier)?;
        let mut message = format!(
            "Your current tier is {}. Tier {tier} costs {cost}.\nPay externally and send a proof: pay_proof:{tier}",
            account.tier
        );
        if account.balance.value() >= cost {
            let _ = write!(
                message,
                "\nPay from your balance of {}: pay_balance:{tier}",
                account.balance.value()
            );
        }
        self.reply(id, message).await;
        Ok(Outcome::Replied)
    }

    async fn start_withdrawal(&self, id: AccountId, now: DateTime<Utc>) -> Result<Outcome> {
        let account = self.require_verified(id).await?;
        if account.tier < 1 {
            return Err(LedgerError::MembershipRequired);
        }
        let Some(destination) = account.payout_destination.as_deref() else {
            return Err(LedgerError::MissingPayoutDestination);
        };
        let config = self.service.config();
        let required = config
            .min_withdrawal
            .checked_add(config.withdrawal_fee)
            .ok_or(LedgerError::AmountOverflow)?;
        if account.balance.value() < required {
            return Err(LedgerError::InsufficientBalance {
                required,
                available: account.balance.value(),
            });
        }

        self.conversations
            .put(id, Conversation::withdraw(now))
            .await?;
        self.reply(
            id,
            format!(
                "Enter the amount to withdraw.\nMinimum: {}\nFee: {}\nYour balance: {}\nPayout address: {destination}\n\nSend cancel to abort.",
                config.min_withdrawal,
                config.withdrawal_fee,
                account.balance.value()
            ),
        )
        .await;
        Ok(Outcome::Prompted)
    }

    async fn start_wallet(&self, id: AccountId, now: DateTime<Utc>) -> Result<Outcome> {
        let account = self.require_verified(id).await?;
        self.conversations
            .put(id, Conversation::set_payout_destination(now))
            .await?;
        self.reply(
            id,
            format!(
                "Your current payout address: {}\nSend your new TRC20 wallet address, or send cancel.",
                account.payout_destination.as_deref().unwrap_or("not set")
            ),
        )
        .await;
        Ok(Outcome::Prompted)
    }

    async fn referrals(&self, id: AccountId) -> Result<Outcome> {
        self.require_verified(id).await?;
        let report = self.service.list_referrals(id).await?;

        let mut message = format!(
            "Your referral link: /start ref_{}\nReferred accounts: {}",
            report.referral_code,
            report.referred.len()
        );
        for referred in &report.referred {
            let _ = write!(message, "\n- account {} at tier {}", referred.id, referred.tier);
        }
        self.reply(id, message).await;
        Ok(Outcome::Replied)
    }

    async fn start_proof(&self, id: AccountId, tier: u32, now: DateTime<Utc>) -> Result<Outcome> {
        let account = self.require_verified(id).await?;
        let cost = check_upgrade(self.service.config(), &account, tier)?;

        self.conversations
            .put(id, Conversation::submit_proof(tier, now))
            .await?;
        self.reply(
            id,
            format!(
                "Send {cost} for tier {tier}, then upload a screenshot of the completed transaction or send its reference. Send cancel to abort."
            ),
        )
        .await;
        Ok(Outcome::Prompted)
    }

    async fn start_balance_upgrade(
        &self,
        id: AccountId,
        tier: u32,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let account = self.require_verified(id).await?;
        let cost = check_upgrade(self.service.config(), &account, tier)?;
        if account.balance.value() < cost {
            return Err(LedgerError::InsufficientBalance {
                required: cost,
                available: account.balance.value(),
            });
        }

        self.conversations
            .put(id, Conversation::confirm_balance_upgrade(tier, now))
            .await?;
        self.reply(
            id,
            format!(
                "Upgrade to tier {tier} for {cost} using your balance of {}? Reply yes to confirm or no to cancel.",
                account.balance.value()
            ),
        )
        .await;
        Ok(Outcome::Prompted)
    }
}
