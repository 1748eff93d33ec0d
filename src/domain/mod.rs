//! Domain layer: the account ledger, tier configuration, dialog state and the
//! ports through which the application reaches storage and the chat gateway.

pub mod account;
pub mod conversation;
pub mod event;
pub mod ports;
pub mod tiers;
