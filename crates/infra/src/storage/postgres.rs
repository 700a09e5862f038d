//! Postgres-backed ledger and job store.
//!
//! Both stores lean on single-statement conditional UPDATEs for their
//! atomicity guarantees:
//!
//! - a debit is `UPDATE ... SET balance = balance - $n WHERE id = $1 AND
//!   balance >= $n`: row-level locking serializes concurrent debits
//!   against one account, and a denied debit touches nothing;
//! - a transition is `UPDATE ... WHERE id = $1 AND status = $expected`:
//!   two workers racing on a redelivered job cannot both win.
//!
//! SQLx errors are mapped to the respective `Storage` variants; callers
//! never see driver types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use pixelmint_core::{AccountId, ImageSize, JobId, Quality};
use pixelmint_ledger::{Account, AccountSettings, Ledger, LedgerError};
use pixelmint_jobs::{
    Job, JobKind, JobStatus, JobStore, JobStoreError, NewJob, TransitionError, TransitionFields,
};

/// Create the tables when they do not exist yet.
///
/// Schema evolution beyond bootstrap belongs to an external migration
/// tool; this only makes a fresh database usable.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id UUID PRIMARY KEY,
            balance BIGINT NOT NULL CHECK (balance >= 0),
            model TEXT NOT NULL,
            quality TEXT NOT NULL,
            size TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            account_id UUID NOT NULL REFERENCES accounts(id),
            kind TEXT NOT NULL,
            prompt TEXT NOT NULL,
            source_ref TEXT,
            result_ref TEXT,
            status TEXT NOT NULL,
            cost BIGINT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            attempt_token UUID,
            model TEXT NOT NULL,
            quality TEXT NOT NULL,
            size TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_jobs_account_created ON jobs (account_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn account_from_row(row: &PgRow) -> Result<Account, LedgerError> {
    let quality: String = row
        .try_get("quality")
        .map_err(|e| LedgerError::Storage(e.to_string()))?;
    let size: String = row
        .try_get("size")
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

    Ok(Account {
        id: AccountId::from_uuid(
            row.try_get::<Uuid, _>("id")
                .map_err(|e| LedgerError::Storage(e.to_string()))?,
        ),
        balance: row
            .try_get("balance")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        settings: AccountSettings {
            model: row
                .try_get("model")
                .map_err(|e| LedgerError::Storage(e.to_string()))?,
            quality: Quality::from_str(&quality)
                .map_err(|e| LedgerError::Storage(e.to_string()))?,
            size: ImageSize::from_str(&size).map_err(|e| LedgerError::Storage(e.to_string()))?,
        },
        created_at: row
            .try_get("created_at")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
    })
}

fn job_from_row(row: &PgRow) -> Result<Job, JobStoreError> {
    let storage = |e: sqlx::Error| JobStoreError::Storage(e.to_string());
    let parse = |e: pixelmint_core::DomainError| JobStoreError::Storage(e.to_string());

    let kind: String = row.try_get("kind").map_err(storage)?;
    let status: String = row.try_get("status").map_err(storage)?;
    let quality: String = row.try_get("quality").map_err(storage)?;
    let size: String = row.try_get("size").map_err(storage)?;
    let retry_count: i32 = row.try_get("retry_count").map_err(storage)?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get::<Uuid, _>("id").map_err(storage)?),
        account_id: AccountId::from_uuid(row.try_get::<Uuid, _>("account_id").map_err(storage)?),
        kind: JobKind::from_str(&kind).map_err(parse)?,
        prompt: row.try_get("prompt").map_err(storage)?,
        source_ref: row
            .try_get::<Option<String>, _>("source_ref")
            .map_err(storage)?
            .map(pixelmint_jobs::SourceRef::new),
        result_ref: row.try_get("result_ref").map_err(storage)?,
        status: JobStatus::from_str(&status).map_err(parse)?,
        cost: row.try_get("cost").map_err(storage)?,
        retry_count: retry_count.max(0) as u32,
        last_error: row.try_get("last_error").map_err(storage)?,
        attempt_token: row
            .try_get::<Option<Uuid>, _>("attempt_token")
            .map_err(storage)?,
        model: row.try_get("model").map_err(storage)?,
        quality: Quality::from_str(&quality).map_err(parse)?,
        size: ImageSize::from_str(&size).map_err(parse)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

/// Postgres-backed token ledger.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
    initial_grant: i64,
}

impl PostgresLedger {
    pub fn new(pool: PgPool, initial_grant: i64) -> Self {
        Self {
            pool,
            initial_grant,
        }
    }
}

#[async_trait::async_trait]
impl Ledger for PostgresLedger {
    async fn get_or_create(&self, id: AccountId) -> Result<(Account, bool), LedgerError> {
        let account = Account::new(id, self.initial_grant);

        // Insert-if-absent; the RETURNING row is present only when this
        // call actually created the account.
        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (id, balance, model, quality, size, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(*account.id.as_uuid())
        .bind(account.balance)
        .bind(&account.settings.model)
        .bind(account.settings.quality.to_string())
        .bind(account.settings.size.to_string())
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        if let Some(row) = inserted {
            return Ok((account_from_row(&row)?, true));
        }

        let existing = self.get(id).await?.ok_or(LedgerError::NotFound(id))?;
        Ok((existing, false))
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        row.map(|row| account_from_row(&row)).transpose()
    }

    async fn debit(&self, id: AccountId, amount: i64) -> Result<Account, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }

        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance - $2, updated_at = $3
            WHERE id = $1 AND balance >= $2
            RETURNING *
            "#,
        )
        .bind(*id.as_uuid())
        .bind(amount)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        match updated {
            Some(row) => account_from_row(&row),
            None => {
                let account = self.get(id).await?.ok_or(LedgerError::NotFound(id))?;
                Err(LedgerError::InsufficientBalance {
                    required: amount,
                    available: account.balance,
                })
            }
        }
    }

    async fn credit(&self, id: AccountId, amount: i64) -> Result<Account, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }

        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance + $2, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(*id.as_uuid())
        .bind(amount)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        match updated {
            Some(row) => account_from_row(&row),
            None => Err(LedgerError::NotFound(id)),
        }
    }

    async fn update_settings(
        &self,
        id: AccountId,
        settings: AccountSettings,
    ) -> Result<Account, LedgerError> {
        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET model = $2, quality = $3, size = $4, updated_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(*id.as_uuid())
        .bind(&settings.model)
        .bind(settings.quality.to_string())
        .bind(settings.size.to_string())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        match updated {
            Some(row) => account_from_row(&row),
            None => Err(LedgerError::NotFound(id)),
        }
    }
}

/// Postgres-backed job store.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresJobStore {
    async fn create(&self, new_job: NewJob) -> Result<Job, JobStoreError> {
        let job = Job::from_new(new_job);

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, account_id, kind, prompt, source_ref, result_ref, status,
                cost, retry_count, last_error, attempt_token, model, quality,
                size, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(*job.id.as_uuid())
        .bind(*job.account_id.as_uuid())
        .bind(job.kind.to_string())
        .bind(&job.prompt)
        .bind(job.source_ref.as_ref().map(|s| s.as_str().to_string()))
        .bind(&job.result_ref)
        .bind(job.status.to_string())
        .bind(job.cost)
        .bind(job.retry_count as i32)
        .bind(&job.last_error)
        .bind(job.attempt_token)
        .bind(&job.model)
        .bind(job.quality.to_string())
        .bind(job.size.to_string())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| JobStoreError::Storage(e.to_string()))?;

        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| JobStoreError::Storage(e.to_string()))?;

        row.map(|row| job_from_row(&row)).transpose()
    }

    async fn transition(
        &self,
        id: JobId,
        expected: JobStatus,
        to: JobStatus,
        fields: TransitionFields,
    ) -> Result<Job, TransitionError> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $3,
                result_ref = COALESCE($4, result_ref),
                last_error = COALESCE($5, last_error),
                retry_count = retry_count + $6,
                attempt_token = COALESCE($7, attempt_token),
                updated_at = $8
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(*id.as_uuid())
        .bind(expected.to_string())
        .bind(to.to_string())
        .bind(&fields.result_ref)
        .bind(&fields.last_error)
        .bind(i32::from(fields.increment_retry))
        .bind(fields.attempt_token)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TransitionError::Storage(e.to_string()))?;

        if let Some(row) = updated {
            return job_from_row(&row).map_err(|e| TransitionError::Storage(e.to_string()));
        }

        // The conditional update hit nothing: missing row or lost race.
        let actual: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TransitionError::Storage(e.to_string()))?;

        match actual {
            None => Err(TransitionError::NotFound(id)),
            Some(status) => {
                let actual = JobStatus::from_str(&status)
                    .map_err(|e| TransitionError::Storage(e.to_string()))?;
                Err(TransitionError::Conflict { job_id: id, actual })
            }
        }
    }

    async fn count_created_since(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<u64, JobStoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE account_id = $1 AND created_at >= $2",
        )
        .bind(*account_id.as_uuid())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| JobStoreError::Storage(e.to_string()))?;

        Ok(count.max(0) as u64)
    }

    async fn history(&self, account_id: AccountId, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE account_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(*account_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| JobStoreError::Storage(e.to_string()))?;

        rows.iter().map(job_from_row).collect()
    }
}
