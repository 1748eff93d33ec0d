use crate::application::admin::AdminDecision;
use crate::application::dialog::{DialogEngine, Outcome};
use crate::domain::account::{AccountId, RequestId, RequestKind};
use crate::domain::event::{Callback, InboundEvent};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ScriptKind {
    Register,
    Verify,
    Credit,
    Text,
    Photo,
    Callback,
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
struct ScriptRecord {
    kind: ScriptKind,
    account: u64,
    data: Option<String>,
}

/// One row of a replay script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptEvent {
    Register {
        account: AccountId,
        /// Account whose referral code the new account signs up with.
        referrer: Option<AccountId>,
    },
    Verify(AccountId),
    Credit {
        account: AccountId,
        amount: Decimal,
    },
    Inbound(InboundEvent),
    Decision(AdminDecision),
}

fn required(data: Option<String>, kind: &str) -> Result<String> {
    data.filter(|value| !value.is_empty())
        .ok_or_else(|| LedgerError::ValidationError(format!("'{kind}' rows need a data column")))
}

/// Parses `proof`, `proof:<id>`, `balance_upgrade[:<id>]` or `withdrawal:<id>`.
fn parse_target(data: &str) -> Result<(RequestKind, Option<RequestId>)> {
    let (kind, id) = match data.split_once(':') {
        Some((kind, id)) => {
            let id = id.trim().parse::<u64>().map_err(|_| {
                LedgerError::ValidationError(format!("Invalid request id: {id}"))
            })?;
            (kind, Some(RequestId(id)))
        }
        None => (data, None),
    };
    Ok((kind.trim().parse()?, id))
}

impl TryFrom<ScriptRecord> for ScriptEvent {
    type Error = LedgerError;

    fn try_from(record: ScriptRecord) -> Result<Self> {
        let account = AccountId(record.account);
        let data = record.data;
        let event = match record.kind {
            ScriptKind::Register => {
                let referrer = data
                    .filter(|value| !value.is_empty())
                    .map(|value| {
                        value.parse::<u64>().map(AccountId).map_err(|_| {
                            LedgerError::ValidationError(format!("Invalid referrer: {value}"))
                        })
                    })
                    .transpose()?;
                ScriptEvent::Register { account, referrer }
            }
            ScriptKind::Verify => ScriptEvent::Verify(account),
            ScriptKind::Credit => {
                let raw = required(data, "credit")?;
                let amount = raw.parse::<Decimal>().map_err(|_| {
                    LedgerError::ValidationError(format!("Invalid amount: {raw}"))
                })?;
                ScriptEvent::Credit { account, amount }
            }
            ScriptKind::Text => {
                ScriptEvent::Inbound(InboundEvent::text(account, data.unwrap_or_default()))
            }
            ScriptKind::Photo => {
                ScriptEvent::Inbound(InboundEvent::photo(account, required(data, "photo")?))
            }
            ScriptKind::Callback => {
                let callback: Callback = required(data, "callback")?.parse()?;
                ScriptEvent::Inbound(InboundEvent::callback(account, callback))
            }
            ScriptKind::Approve | ScriptKind::Reject => {
                let (kind, request) = parse_target(&required(data, "decision")?)?;
                ScriptEvent::Decision(AdminDecision {
                    account,
                    kind,
                    request,
                    approve: record.kind == ScriptKind::Approve,
                })
            }
        };
        Ok(event)
    }
}

impl ScriptEvent {
    /// Applies the event through the dialog engine or directly on the service.
    pub async fn apply(self, engine: &DialogEngine) -> Result<()> {
        let service = engine.service();
        match self {
            ScriptEvent::Register { account, referrer } => {
                let referral_code = match referrer {
                    Some(referrer) => Some(service.account(referrer).await?.referral_code),
                    None => None,
                };
                service.register(account, referral_code).await?;
            }
            ScriptEvent::Verify(account) => service.verify(account).await?,
            ScriptEvent::Credit { account, amount } => {
                service.credit_balance(account, amount).await?
            }
            ScriptEvent::Inbound(event) => {
                let account = event.account;
                match engine.handle(event).await? {
                    Outcome::Rejected(err) => {
                        debug!(%account, error = %err, "Dialog step refused")
                    }
                    outcome => debug!(%account, ?outcome, "Dialog step handled"),
                }
            }
            ScriptEvent::Decision(decision) => {
                service.decide(decision).await?;
            }
        }
        Ok(())
    }
}

/// Reads replay events from a CSV source with the columns `kind, account, data`.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and converts rows; a malformed row yields an `Err` item
    /// without ending the stream.
    pub fn events(self) -> impl Iterator<Item = Result<ScriptEvent>> {
        self.reader
            .into_deserialize::<ScriptRecord>()
            .map(|record| -> Result<ScriptEvent> { ScriptEvent::try_from(record?) })
    }
}
