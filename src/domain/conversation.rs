use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A multi-step dialog an account can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Withdraw,
    SetPayoutDestination,
    SubmitProof,
    ConfirmBalanceUpgrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    AskAmount,
    Confirm,
    AskAddress,
    AwaitingPayload,
    AskYesNo,
}

/// Input accumulated by earlier steps of a flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogData {
    pub amount: Option<Decimal>,
    pub tier: Option<u32>,
}

/// Ephemeral per-account dialog state: `{flow, step, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub flow: Flow,
    pub step: Step,
    pub data: DialogData,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn withdraw(now: DateTime<Utc>) -> Self {
        Self::start(Flow::Withdraw, Step::AskAmount, DialogData::default(), now)
    }

    pub fn set_payout_destination(now: DateTime<Utc>) -> Self {
        Self::start(
            Flow::SetPayoutDestination,
            Step::AskAddress,
            DialogData::default(),
            now,
        )
    }

    pub fn submit_proof(tier: u32, now: DateTime<Utc>) -> Self {
        let data = DialogData {
            tier: Some(tier),
            ..Default::default()
        };
        Self::start(Flow::SubmitProof, Step::AwaitingPayload, data, now)
    }

    pub fn confirm_balance_upgrade(tier: u32, now: DateTime<Utc>) -> Self {
        let data = DialogData {
            tier: Some(tier),
            ..Default::default()
        };
        Self::start(Flow::ConfirmBalanceUpgrade, Step::AskYesNo, data, now)
    }

    fn start(flow: Flow, step: Step, data: DialogData, now: DateTime<Utc>) -> Self {
        Self {
            flow,
            step,
            data,
            updated_at: now,
        }
    }

    /// Moves to `step`, refreshing the inactivity clock.
    pub fn advance(mut self, step: Step, now: DateTime<Utc>) -> Self {
        self.step = step;
        self.updated_at = now;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.updated_at > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let start = Utc::now();
        let conversation = Conversation::withdraw(start);
        let timeout = Duration::seconds(600);
        assert!(!conversation.is_expired(start + Duration::seconds(600), timeout));
        assert!(conversation.is_expired(start + Duration::seconds(601), timeout));

        let later = start + Duration::seconds(500);
        let advanced = conversation.advance(Step::Confirm, later);
        assert_eq!(advanced.step, Step::Confirm);
        assert!(!advanced.is_expired(start + Duration::seconds(1000), timeout));
    }

    #[test]
    fn test_flow_data() {
        let conversation = Conversation::submit_proof(3, Utc::now());
        assert_eq!(conversation.flow, Flow::SubmitProof);
        assert_eq!(conversation.step, Step::AwaitingPayload);
        assert_eq!(conversation.data.tier, Some(3));
        assert_eq!(conversation.data.amount, None);
    }
}
