//! Outcome notification boundary.
//!
//! Fire-and-forget: delivery failures are logged by the caller and never
//! affect job or ledger state. A user told "done" while the row says
//! otherwise is acceptable; the reverse is not.

use std::sync::Mutex;

use tracing::info;

use pixelmint_core::AccountId;

use crate::provider::ImageRef;

#[derive(Debug, Clone, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers terminal job outcomes to the requester.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// The job finished; `result` points at the generated image.
    async fn success(
        &self,
        owner: AccountId,
        result: &ImageRef,
        original_prompt: &str,
    ) -> Result<(), NotifyError>;

    /// The job exhausted its retries; `refunded` tokens went back to the
    /// owner's balance.
    async fn failure(&self, owner: AccountId, refunded: i64) -> Result<(), NotifyError>;
}

/// Production default: structured log lines only. Real transports (chat,
/// webhooks, email) live outside the core.
#[derive(Debug, Default)]
pub struct TracingNotificationSink;

#[async_trait::async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn success(
        &self,
        owner: AccountId,
        result: &ImageRef,
        original_prompt: &str,
    ) -> Result<(), NotifyError> {
        info!(
            account_id = %owner,
            result = %result,
            prompt = original_prompt,
            "job finished"
        );
        Ok(())
    }

    async fn failure(&self, owner: AccountId, refunded: i64) -> Result<(), NotifyError> {
        info!(account_id = %owner, refunded, "job failed, tokens refunded");
        Ok(())
    }
}

/// A recorded notification (test observability).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success {
        owner: AccountId,
        result: ImageRef,
        prompt: String,
    },
    Failure {
        owner: AccountId,
        refunded: i64,
    },
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    inner: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.inner.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn success(
        &self,
        owner: AccountId,
        result: &ImageRef,
        original_prompt: &str,
    ) -> Result<(), NotifyError> {
        self.inner.lock().unwrap().push(Notification::Success {
            owner,
            result: result.clone(),
            prompt: original_prompt.to_string(),
        });
        Ok(())
    }

    async fn failure(&self, owner: AccountId, refunded: i64) -> Result<(), NotifyError> {
        self.inner
            .lock()
            .unwrap()
            .push(Notification::Failure { owner, refunded });
        Ok(())
    }
}
