//! Core job types.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pixelmint_core::{AccountId, DomainError, ImageSize, JobId, Quality};

/// What the job asks the provider to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Generate an image from a text prompt.
    Generate,
    /// Edit an existing image according to a text prompt.
    Edit,
}

impl core::fmt::Display for JobKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            JobKind::Generate => f.write_str("generate"),
            JobKind::Edit => f.write_str("edit"),
        }
    }
}

impl FromStr for JobKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate" => Ok(JobKind::Generate),
            "edit" => Ok(JobKind::Edit),
            other => Err(DomainError::validation(format!("unknown job kind: {other}"))),
        }
    }
}

/// Reference to the source image of an edit job.
///
/// Either a remote URL or an opaque key into the file store; the provider
/// adapter normalizes both to raw bytes before calling out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(String);

impl SourceRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this reference points at a remote URL (vs. a stored file).
    pub fn is_remote(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }
}

impl core::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job execution status.
///
/// `Done` and `Failed` are terminal: no further transitions occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Escrowed and waiting for a worker (initial state, and the state a
    /// retried job returns to between attempts).
    Pending,
    /// Claimed by exactly one worker; the provider call is in flight.
    Processing,
    /// Finished successfully; `result_ref` is set.
    Done,
    /// Exhausted retries; `last_error` is set and the cost was refunded.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// A generation job.
///
/// `cost` is fixed at creation time and equals the amount already debited
/// from the owner's balance; it is never recomputed. The status history is
/// append-only: jobs are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub account_id: AccountId,
    pub kind: JobKind,
    pub prompt: String,
    /// Source image, edit jobs only.
    pub source_ref: Option<SourceRef>,
    /// Set exactly once, on the transition to `Done`.
    pub result_ref: Option<String>,
    pub status: JobStatus,
    /// Tokens escrowed for this job (immutable).
    pub cost: i64,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Provider-attempt marker: recorded by the worker that claims the job,
    /// before the provider call goes out.
    pub attempt_token: Option<Uuid>,
    /// Generation parameters captured at submission time.
    pub model: String,
    pub quality: Quality,
    pub size: ImageSize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a job row. Status starts at `Pending`,
/// retry_count at 0.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub account_id: AccountId,
    pub kind: JobKind,
    pub prompt: String,
    pub source_ref: Option<SourceRef>,
    pub cost: i64,
    pub model: String,
    pub quality: Quality,
    pub size: ImageSize,
}

impl Job {
    /// Build a fresh pending job from submission fields (storage backends
    /// use this to keep creation semantics identical).
    pub fn from_new(new_job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            account_id: new_job.account_id,
            kind: new_job.kind,
            prompt: new_job.prompt,
            source_ref: new_job.source_ref,
            result_ref: None,
            status: JobStatus::Pending,
            cost: new_job.cost,
            retry_count: 0,
            last_error: None,
            attempt_token: None,
            model: new_job.model,
            quality: new_job.quality,
            size: new_job.size,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Done,
            JobStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn source_ref_classifies_remote_and_stored() {
        assert!(SourceRef::new("https://cdn.example.com/a.png").is_remote());
        assert!(SourceRef::new("http://cdn.example.com/a.png").is_remote());
        assert!(!SourceRef::new("file-3f2a9c").is_remote());
    }
}
