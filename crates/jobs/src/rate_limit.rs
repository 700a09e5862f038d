//! Sliding-window submission rate limiter.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use pixelmint_core::AccountId;

use crate::store::{JobStore, JobStoreError};

/// Default trailing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Default number of jobs an account may create per window.
pub const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The account hit the submission cap. Not retried; surfaced directly
    /// to the caller.
    #[error("rate limited: at most {limit} jobs per window")]
    Limited { limit: u32 },

    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Counts an account's job creations within a trailing window.
///
/// Evaluated *before* the ledger debit, so a denied submission never
/// reserves tokens.
pub struct RateLimiter {
    store: Arc<dyn JobStore>,
    window: Duration,
    limit: u32,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn JobStore>, window: Duration, limit: u32) -> Self {
        Self {
            store,
            window,
            limit,
        }
    }

    pub fn with_defaults(store: Arc<dyn JobStore>) -> Self {
        Self::new(store, DEFAULT_WINDOW, DEFAULT_LIMIT)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Allow or deny a submission for this account.
    pub async fn check(&self, account_id: AccountId) -> Result<(), RateLimitError> {
        let since = Utc::now()
            - chrono::Duration::from_std(self.window).unwrap_or_else(|_| chrono::Duration::hours(1));
        let recent = self.store.count_created_since(account_id, since).await?;
        if recent >= u64::from(self.limit) {
            return Err(RateLimitError::Limited { limit: self.limit });
        }
        Ok(())
    }
}
