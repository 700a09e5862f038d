//! `pixelmint-jobs` — the generation-job domain.
//!
//! ## Design
//!
//! - A submission escrows tokens *before* the job is ever processed:
//!   rate-limit check, ledger debit, job row creation, enqueue, in that
//!   order, so a denied submission never reserves tokens.
//! - Deliveries are at-least-once. The conditional [`JobStore::transition`]
//!   serializes duplicate deliveries of one job: at most one worker holds a
//!   job in `processing`.
//! - Failures consume bounded retries with a backoff schedule; exhausting
//!   them finalizes the job and refunds exactly the recorded cost, once.
//!
//! ## Components
//!
//! - [`Job`]/[`JobStatus`]: the durable job record and its state machine
//! - [`JobStore`]: persistence with conditional transitions
//! - [`RetryScheduler`]: the backoff policy
//! - [`RateLimiter`]: sliding-window submission gate
//! - [`ProviderAdapter`]/[`NotificationSink`]/[`JobQueue`]: collaborator
//!   boundaries implemented in `pixelmint-infra`
//! - [`JobLifecycle`]: the orchestrator owning every status transition

pub mod lifecycle;
pub mod notify;
pub mod provider;
pub mod queue;
pub mod rate_limit;
pub mod retry;
pub mod store;
pub mod templates;
pub mod types;

pub use lifecycle::{
    JobLifecycle, ProcessOutcome, Processor, SubmitError, SubmitOutcome, SubmitRequest,
    MAX_PROMPT_LEN,
};
pub use notify::{
    InMemoryNotificationSink, Notification, NotificationSink, NotifyError, TracingNotificationSink,
};
pub use provider::{GenerationRequest, ImageRef, ProviderAdapter, ProviderError};
pub use queue::{EnqueueError, JobQueue, RecordingQueue};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use retry::{RetryDecision, RetryScheduler, DEFAULT_BACKOFF, MAX_RETRIES};
pub use store::{InMemoryJobStore, JobStore, JobStoreError, TransitionError, TransitionFields};
pub use templates::{active_templates, template_by_id, PromptTemplate};
pub use types::{Job, JobKind, JobStatus, NewJob, SourceRef};
