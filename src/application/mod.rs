//! Application layer: the workflows that run on top of the account ledger.
//!
//! [`service::AccountService`] owns the store and applies every ledger change
//! as one atomic unit per account. The upgrade, withdrawal, commission and admin
//! workflows extend it; [`dialog::DialogEngine`] drives the per-account
//! conversation state machine on top of it.

pub mod admin;
pub mod commission;
pub mod dialog;
pub mod locks;
pub mod service;
pub mod upgrade;
pub mod withdrawal;
