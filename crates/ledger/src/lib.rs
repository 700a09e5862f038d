//! `pixelmint-ledger` — metered token accounts.
//!
//! Holds each account's token balance and exposes atomic debit/credit.
//! Balances never go negative: a debit either fully succeeds or makes no
//! mutation. Accounts are created on first contact with an initial grant
//! and are never deleted, so a refund credit always has a target.

pub mod account;
pub mod ledger;

pub use account::{Account, AccountSettings};
pub use ledger::{default_initial_grant, InMemoryLedger, Ledger, LedgerError};
