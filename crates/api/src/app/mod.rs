//! Router construction and dependency wiring.
//!
//! Everything the lifecycle needs is passed in as [`Collaborators`];
//! there are no process-global clients. The UI layer in front of this API
//! owns conversation flow and message formatting; this boundary only
//! speaks job submission and status.

pub mod dto;
pub mod errors;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use uuid::Uuid;

use pixelmint_core::{AccountId, JobId};
use pixelmint_infra::{DeliveryQueue, WorkerPool};
use pixelmint_jobs::{
    active_templates, JobLifecycle, JobQueue, JobStore, NotificationSink, Processor,
    ProviderAdapter, RateLimiter, RetryScheduler, SubmitOutcome,
};
use pixelmint_ledger::{AccountSettings, Ledger};

use self::dto::{
    AccountResponse, HistoryParams, JobResponse, SettingsBody, SubmitBody, TemplateResponse,
};
use self::errors::ApiError;

/// Serving-layer knobs (storage and provider choices live in
/// [`Collaborators`]).
#[derive(Clone)]
pub struct AppConfig {
    pub workers: usize,
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub scheduler: RetryScheduler,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            rate_limit: 20,
            rate_window: Duration::from_secs(60 * 60),
            scheduler: RetryScheduler::default(),
        }
    }
}

/// Injected collaborators for the job lifecycle.
pub struct Collaborators {
    pub ledger: Arc<dyn Ledger>,
    pub store: Arc<dyn JobStore>,
    pub provider: Arc<dyn ProviderAdapter>,
    pub notifier: Arc<dyn NotificationSink>,
}

struct AppState {
    lifecycle: Arc<JobLifecycle>,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn JobStore>,
}

/// Build the router and start the delivery workers.
///
/// The returned [`WorkerPool`] must be kept alive for as long as the app
/// serves traffic.
pub fn build_app(config: AppConfig, deps: Collaborators) -> (Router, WorkerPool) {
    let queue = Arc::new(DeliveryQueue::new());
    let limiter = RateLimiter::new(deps.store.clone(), config.rate_window, config.rate_limit);

    let lifecycle = Arc::new(JobLifecycle::new(
        deps.ledger.clone(),
        deps.store.clone(),
        deps.provider,
        deps.notifier,
        queue.clone() as Arc<dyn JobQueue>,
        limiter,
        config.scheduler,
    ));

    let workers = WorkerPool::spawn(
        queue.as_ref(),
        lifecycle.clone() as Arc<dyn Processor>,
        config.workers,
    );

    let state = Arc::new(AppState {
        lifecycle,
        ledger: deps.ledger,
        store: deps.store,
    });

    let router = Router::new()
        .route("/health", get(health))
        .route("/jobs", post(submit_job))
        .route("/jobs/:id", get(get_job))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/settings", put(update_settings))
        .route("/accounts/:id/jobs", get(account_history))
        .route("/templates", get(list_templates))
        .layer(Extension(state));

    (router, workers)
}

async fn health() -> &'static str {
    "ok"
}

async fn submit_job(
    Extension(state): Extension<Arc<AppState>>,
    Json(body): Json<SubmitBody>,
) -> Result<Response, ApiError> {
    let outcome = state.lifecycle.submit(body.into_request()).await?;

    let response = match outcome {
        SubmitOutcome::Created(job) => {
            (StatusCode::CREATED, Json(JobResponse::from(job))).into_response()
        }
        SubmitOutcome::InsufficientBalance {
            required,
            available,
        } => (
            StatusCode::PAYMENT_REQUIRED,
            Json(serde_json::json!({
                "error": "insufficient balance",
                "required": required,
                "available": available,
            })),
        )
            .into_response(),
        SubmitOutcome::RateLimited { limit } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate limited",
                "limit": limit,
            })),
        )
            .into_response(),
    };

    Ok(response)
}

async fn get_job(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state
        .store
        .get(JobId::from_uuid(id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(JobResponse::from(job)))
}

async fn get_account(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AccountResponse>, ApiError> {
    // First contact creates the account with its initial grant.
    let (account, _) = state.ledger.get_or_create(AccountId::from_uuid(id)).await?;
    Ok(Json(AccountResponse::from(account)))
}

async fn update_settings(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SettingsBody>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account_id = AccountId::from_uuid(id);
    let (account, _) = state.ledger.get_or_create(account_id).await?;

    let settings = AccountSettings {
        model: body.model.unwrap_or(account.settings.model),
        quality: body.quality.unwrap_or(account.settings.quality),
        size: body.size.unwrap_or(account.settings.size),
    };

    let updated = state.ledger.update_settings(account_id, settings).await?;
    Ok(Json(AccountResponse::from(updated)))
}

async fn account_history(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<JobResponse>>, ApiError> {
    let limit = params.limit.unwrap_or(10).min(50);
    let jobs = state
        .store
        .history(AccountId::from_uuid(id), limit)
        .await?;
    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}

async fn list_templates() -> Json<Vec<TemplateResponse>> {
    Json(active_templates().map(TemplateResponse::from).collect())
}
