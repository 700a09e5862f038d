//! Request/response shapes for the HTTP boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pixelmint_core::{AccountId, ImageSize, JobId, Quality};
use pixelmint_jobs::{Job, JobKind, JobStatus, PromptTemplate, SourceRef, SubmitRequest};
use pixelmint_ledger::Account;

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub account_id: AccountId,
    pub kind: JobKind,
    pub prompt: Option<String>,
    pub template_id: Option<String>,
    pub quality: Option<Quality>,
    pub size: Option<ImageSize>,
    pub source_ref: Option<String>,
}

impl SubmitBody {
    pub fn into_request(self) -> SubmitRequest {
        SubmitRequest {
            account_id: self.account_id,
            kind: self.kind,
            prompt: self.prompt,
            template_id: self.template_id,
            quality: self.quality,
            size: self.size,
            source_ref: self.source_ref.map(SourceRef::new),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SettingsBody {
    pub model: Option<String>,
    pub quality: Option<Quality>,
    pub size: Option<ImageSize>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: JobId,
    pub account_id: AccountId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub prompt: String,
    pub cost: i64,
    pub retry_count: u32,
    pub source_ref: Option<String>,
    pub result_ref: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            account_id: job.account_id,
            kind: job.kind,
            status: job.status,
            prompt: job.prompt,
            cost: job.cost,
            retry_count: job.retry_count,
            source_ref: job.source_ref.map(|s| s.as_str().to_string()),
            result_ref: job.result_ref,
            last_error: job.last_error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub balance: i64,
    pub model: String,
    pub quality: Quality,
    pub size: ImageSize,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            balance: account.balance,
            model: account.settings.model,
            quality: account.settings.quality,
            size: account.settings.size,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub cost_multiplier: i64,
}

impl From<&'static PromptTemplate> for TemplateResponse {
    fn from(template: &'static PromptTemplate) -> Self {
        Self {
            id: template.id,
            name: template.name,
            description: template.description,
            cost_multiplier: template.cost_multiplier,
        }
    }
}
