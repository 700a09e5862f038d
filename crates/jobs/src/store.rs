//! Job persistence with conditional transitions.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use pixelmint_core::{AccountId, JobId};

use crate::types::{Job, JobStatus, NewJob};

/// Job store error (non-transition operations).
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Transition failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransitionError {
    /// The job's current status did not match the expected one. No
    /// mutation was performed. This is the concurrency guard that stops a
    /// redelivered job from being processed twice; it is never surfaced to
    /// users.
    #[error("job {job_id} is {actual}, transition aborted")]
    Conflict { job_id: JobId, actual: JobStatus },

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Optional fields applied together with a status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionFields {
    pub result_ref: Option<String>,
    pub last_error: Option<String>,
    pub increment_retry: bool,
    pub attempt_token: Option<uuid::Uuid>,
}

impl TransitionFields {
    pub fn result_ref(result_ref: impl Into<String>) -> Self {
        Self {
            result_ref: Some(result_ref.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            last_error: Some(error.into()),
            increment_retry: true,
            ..Self::default()
        }
    }

    pub fn attempt_token(token: uuid::Uuid) -> Self {
        Self {
            attempt_token: Some(token),
            ..Self::default()
        }
    }
}

/// Durable record of jobs.
///
/// `transition` is the only mutation the lifecycle uses after creation;
/// its compare-and-set semantics give each job a totally ordered status
/// history even under duplicate delivery.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Create a pending job with retry_count = 0.
    async fn create(&self, new_job: NewJob) -> Result<Job, JobStoreError>;

    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Conditionally move a job from `expected` to `to`, applying `fields`.
    ///
    /// Must not mutate anything (and report [`TransitionError::Conflict`])
    /// when the job's current status differs from `expected`.
    async fn transition(
        &self,
        id: JobId,
        expected: JobStatus,
        to: JobStatus,
        fields: TransitionFields,
    ) -> Result<Job, TransitionError>;

    /// Number of jobs the account created at or after `since`
    /// (rate-limiter input).
    async fn count_created_since(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<u64, JobStoreError>;

    /// The account's most recent jobs, newest first.
    async fn history(&self, account_id: AccountId, limit: usize) -> Result<Vec<Job>, JobStoreError>;
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored jobs (test visibility).
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn apply_fields(job: &mut Job, fields: TransitionFields) {
    if let Some(result_ref) = fields.result_ref {
        job.result_ref = Some(result_ref);
    }
    if let Some(last_error) = fields.last_error {
        job.last_error = Some(last_error);
    }
    if fields.increment_retry {
        job.retry_count += 1;
    }
    if let Some(token) = fields.attempt_token {
        job.attempt_token = Some(token);
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, JobStoreError> {
        let job = Job::from_new(new_job);
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn transition(
        &self,
        id: JobId,
        expected: JobStatus,
        to: JobStatus,
        fields: TransitionFields,
    ) -> Result<Job, TransitionError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(TransitionError::NotFound(id))?;

        if job.status != expected {
            return Err(TransitionError::Conflict {
                job_id: id,
                actual: job.status,
            });
        }

        job.status = to;
        apply_fields(job, fields);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn count_created_since(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<u64, JobStoreError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .values()
            .filter(|j| j.account_id == account_id && j.created_at >= since)
            .count() as u64)
    }

    async fn history(&self, account_id: AccountId, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.lock().unwrap();
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.account_id == account_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        Ok(result)
    }
}
