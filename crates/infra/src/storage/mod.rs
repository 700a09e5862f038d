//! Durable storage backends.
//!
//! In-memory implementations live next to their traits in
//! `pixelmint-ledger` and `pixelmint-jobs`; this module adds the
//! Postgres-backed ones.

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::{ensure_schema, PostgresJobStore, PostgresLedger};
