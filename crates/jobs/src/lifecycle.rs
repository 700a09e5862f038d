//! Job lifecycle orchestration.
//!
//! Owns every status transition. Submission escrows tokens before the job
//! is ever processed, which is why every failure path must credit back
//! exactly the job's recorded cost, never a recomputed one.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pixelmint_core::{image_tokens, AccountId, DomainError, ImageSize, JobId, Quality};
use pixelmint_ledger::{Ledger, LedgerError};

use crate::notify::NotificationSink;
use crate::provider::{GenerationRequest, ImageRef, ProviderAdapter, ProviderError};
use crate::queue::JobQueue;
use crate::rate_limit::{RateLimitError, RateLimiter};
use crate::retry::{RetryDecision, RetryScheduler};
use crate::store::{JobStore, JobStoreError, TransitionError, TransitionFields};
use crate::templates::template_by_id;
use crate::types::{Job, JobKind, JobStatus, NewJob, SourceRef};

/// Longest accepted prompt, in characters.
pub const MAX_PROMPT_LEN: usize = 2_000;

/// A submission request, as handed over by the serving layer.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub account_id: AccountId,
    pub kind: JobKind,
    /// Free-form prompt. Mutually exclusive with `template_id`.
    pub prompt: Option<String>,
    /// Curated template id. Mutually exclusive with `prompt`.
    pub template_id: Option<String>,
    /// Overrides the account's quality setting when present.
    pub quality: Option<Quality>,
    /// Overrides the account's size setting when present.
    pub size: Option<ImageSize>,
    /// Source image, required for edit jobs.
    pub source_ref: Option<SourceRef>,
}

/// Outcome of a submission attempt.
///
/// Denials are outcomes, not errors: they are user-correctable and leave
/// no state behind.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Tokens escrowed, job row created, delivery enqueued.
    Created(Job),
    /// The balance does not cover the cost; nothing was mutated.
    InsufficientBalance { required: i64, available: i64 },
    /// The account hit the submission cap; no debit was performed.
    RateLimited { limit: u32 },
}

/// Infrastructure or validation failure during submission. The whole
/// submission aborts with no partial state.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("ledger unavailable: {0}")]
    Ledger(LedgerError),

    #[error("job store unavailable: {0}")]
    Store(#[from] JobStoreError),
}

/// Typed result of one delivery of `process`, interpreted by the queue
/// worker. Replaces exception-driven retry control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Terminal success; result recorded and owner notified.
    Completed,
    /// The attempt failed; redeliver after `delay`.
    Retry { delay: Duration },
    /// Terminal failure; cost refunded and owner notified.
    Failed { error: String },
    /// The delivery had no effect: duplicate of an in-flight or finished
    /// job, unknown id, or a lost transition race.
    Skipped,
}

/// What the queue workers call. Implemented by [`JobLifecycle`]; test
/// harnesses substitute scripted processors.
#[async_trait::async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, job_id: JobId) -> ProcessOutcome;
}

/// Orchestrates submission and processing over injected collaborators.
///
/// All dependencies come in through the constructor; there are no
/// process-global instances.
pub struct JobLifecycle {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn JobStore>,
    provider: Arc<dyn ProviderAdapter>,
    notifier: Arc<dyn NotificationSink>,
    queue: Arc<dyn JobQueue>,
    limiter: RateLimiter,
    scheduler: RetryScheduler,
}

impl JobLifecycle {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn JobStore>,
        provider: Arc<dyn ProviderAdapter>,
        notifier: Arc<dyn NotificationSink>,
        queue: Arc<dyn JobQueue>,
        limiter: RateLimiter,
        scheduler: RetryScheduler,
    ) -> Self {
        Self {
            ledger,
            store,
            provider,
            notifier,
            queue,
            limiter,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    /// Submit a job: rate-limit check, ledger debit, job creation,
    /// enqueue, in that order. A denial at any gate leaves no trace.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, SubmitError> {
        let (prompt, multiplier) = resolve_prompt(&request)?;

        if request.kind == JobKind::Edit && request.source_ref.is_none() {
            return Err(DomainError::validation("edit jobs require a source image").into());
        }
        if request.kind == JobKind::Generate && request.source_ref.is_some() {
            return Err(DomainError::validation("generate jobs take no source image").into());
        }

        let (account, created) = self
            .ledger
            .get_or_create(request.account_id)
            .await
            .map_err(SubmitError::Ledger)?;
        if created {
            info!(account_id = %account.id, balance = account.balance, "account created on first contact");
        }

        let quality = request.quality.unwrap_or(account.settings.quality);
        let size = request.size.unwrap_or(account.settings.size);
        let cost = image_tokens(quality, size) * multiplier;

        if let Err(err) = self.limiter.check(request.account_id).await {
            match err {
                RateLimitError::Limited { limit } => {
                    debug!(account_id = %request.account_id, limit, "submission rate limited");
                    return Ok(SubmitOutcome::RateLimited { limit });
                }
                RateLimitError::Store(err) => return Err(SubmitError::Store(err)),
            }
        }

        match self.ledger.debit(request.account_id, cost).await {
            Ok(_) => {}
            Err(LedgerError::InsufficientBalance {
                required,
                available,
            }) => {
                debug!(account_id = %request.account_id, required, available, "submission denied, balance too low");
                return Ok(SubmitOutcome::InsufficientBalance {
                    required,
                    available,
                });
            }
            Err(other) => return Err(SubmitError::Ledger(other)),
        }

        let job = match self
            .store
            .create(NewJob {
                account_id: request.account_id,
                kind: request.kind,
                prompt,
                source_ref: request.source_ref,
                cost,
                model: account.settings.model,
                quality,
                size,
            })
            .await
        {
            Ok(job) => job,
            Err(err) => {
                // The row never existed, so return the escrow.
                if let Err(credit_err) = self.ledger.credit(request.account_id, cost).await {
                    error!(
                        account_id = %request.account_id,
                        cost,
                        error = %credit_err,
                        "could not return escrow after create failure"
                    );
                }
                return Err(SubmitError::Store(err));
            }
        };

        info!(
            job_id = %job.id,
            account_id = %job.account_id,
            kind = %job.kind,
            cost,
            "job created"
        );

        if let Err(err) = self.queue.enqueue(job.id, self.scheduler.clone()).await {
            // Tokens are escrowed and the row is pending; a redelivery
            // sweep can still pick the job up.
            warn!(job_id = %job.id, error = %err, "enqueue failed, job left pending");
        }

        Ok(SubmitOutcome::Created(job))
    }

    /// Process one delivery of a job. Safe under duplicate delivery: the
    /// conditional claim makes every redundant invocation a no-op.
    pub async fn process(&self, job_id: JobId) -> ProcessOutcome {
        let token = Uuid::now_v7();
        let job = match self
            .store
            .transition(
                job_id,
                JobStatus::Pending,
                JobStatus::Processing,
                TransitionFields::attempt_token(token),
            )
            .await
        {
            Ok(job) => job,
            Err(TransitionError::Conflict { actual, .. }) => {
                debug!(job_id = %job_id, %actual, "duplicate delivery ignored");
                return ProcessOutcome::Skipped;
            }
            Err(TransitionError::NotFound(_)) => {
                warn!(job_id = %job_id, "delivered job does not exist");
                return ProcessOutcome::Skipped;
            }
            Err(TransitionError::Storage(err)) => {
                error!(job_id = %job_id, error = %err, "claim failed, requeueing delivery");
                return ProcessOutcome::Retry {
                    delay: self.scheduler.delay_for(1),
                };
            }
        };

        debug!(
            job_id = %job.id,
            attempt_token = %token,
            retry_count = job.retry_count,
            "processing job"
        );

        let request = GenerationRequest {
            prompt: job.prompt.clone(),
            model: job.model.clone(),
            quality: job.quality,
            size: job.size,
        };

        let result = match job.kind {
            JobKind::Generate => self.provider.generate(&request).await,
            JobKind::Edit => match &job.source_ref {
                Some(source) => self.provider.edit(source, &request).await,
                // Submission validates this; treat corruption like any
                // other failed attempt so the job still terminates.
                None => Err(ProviderError::Source(
                    "edit job has no source image".to_string(),
                )),
            },
        };

        match result {
            Ok(image_ref) => self.complete(&job, image_ref).await,
            Err(err) => self.handle_failure(&job, &err).await,
        }
    }

    async fn complete(&self, job: &Job, image_ref: ImageRef) -> ProcessOutcome {
        match self
            .store
            .transition(
                job.id,
                JobStatus::Processing,
                JobStatus::Done,
                TransitionFields::result_ref(image_ref.as_str()),
            )
            .await
        {
            Ok(done) => {
                info!(job_id = %done.id, result = %image_ref, "job done");
                if let Err(err) = self
                    .notifier
                    .success(done.account_id, &image_ref, &done.prompt)
                    .await
                {
                    warn!(job_id = %done.id, error = %err, "success notification dropped");
                }
                ProcessOutcome::Completed
            }
            Err(err) => {
                // Provider work succeeded but could not be recorded; see
                // DESIGN.md on this crash window.
                error!(job_id = %job.id, error = %err, "could not record completion");
                ProcessOutcome::Skipped
            }
        }
    }

    async fn handle_failure(&self, job: &Job, provider_err: &ProviderError) -> ProcessOutcome {
        let error = provider_err.to_string();
        let next_retry = job.retry_count + 1;
        warn!(
            job_id = %job.id,
            retry = next_retry,
            error = %error,
            "provider attempt failed"
        );

        match self.scheduler.decide(next_retry) {
            RetryDecision::Requeue { delay } => {
                match self
                    .store
                    .transition(
                        job.id,
                        JobStatus::Processing,
                        JobStatus::Pending,
                        TransitionFields::failure(error.as_str()),
                    )
                    .await
                {
                    Ok(_) => ProcessOutcome::Retry { delay },
                    Err(err) => {
                        warn!(job_id = %job.id, error = %err, "lost retry transition race");
                        ProcessOutcome::Skipped
                    }
                }
            }
            RetryDecision::Finalize => {
                match self
                    .store
                    .transition(
                        job.id,
                        JobStatus::Processing,
                        JobStatus::Failed,
                        TransitionFields::failure(error.as_str()),
                    )
                    .await
                {
                    Ok(failed) => {
                        // Only the worker that wins this transition
                        // refunds: refund-once under duplicate delivery.
                        match self.ledger.credit(failed.account_id, failed.cost).await {
                            Ok(_) => {
                                info!(
                                    job_id = %failed.id,
                                    refunded = failed.cost,
                                    "job failed, cost refunded"
                                );
                            }
                            Err(credit_err) => {
                                error!(
                                    job_id = %failed.id,
                                    cost = failed.cost,
                                    error = %credit_err,
                                    "refund failed; ledger is short for this job"
                                );
                            }
                        }
                        if let Err(err) =
                            self.notifier.failure(failed.account_id, failed.cost).await
                        {
                            warn!(job_id = %failed.id, error = %err, "failure notification dropped");
                        }
                        ProcessOutcome::Failed { error }
                    }
                    Err(err) => {
                        warn!(job_id = %job.id, error = %err, "lost finalize race");
                        ProcessOutcome::Skipped
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Processor for JobLifecycle {
    async fn process(&self, job_id: JobId) -> ProcessOutcome {
        self.process(job_id).await
    }
}

fn resolve_prompt(request: &SubmitRequest) -> Result<(String, i64), DomainError> {
    match (&request.prompt, &request.template_id) {
        (Some(_), Some(_)) => Err(DomainError::validation(
            "provide either a prompt or a template, not both",
        )),
        (None, None) => Err(DomainError::validation("a prompt or a template is required")),
        (Some(prompt), None) => {
            let prompt = prompt.trim();
            if prompt.is_empty() {
                return Err(DomainError::validation("prompt must not be empty"));
            }
            if prompt.chars().count() > MAX_PROMPT_LEN {
                return Err(DomainError::validation(format!(
                    "prompt exceeds {MAX_PROMPT_LEN} characters"
                )));
            }
            Ok((prompt.to_string(), 1))
        }
        (None, Some(template_id)) => {
            if request.kind != JobKind::Generate {
                return Err(DomainError::validation("templates apply to generation jobs"));
            }
            let template = template_by_id(template_id).ok_or_else(|| {
                DomainError::validation(format!("unknown template: {template_id}"))
            })?;
            Ok((template.prompt.to_string(), template.cost_multiplier))
        }
    }
}
