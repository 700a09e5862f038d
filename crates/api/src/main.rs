use std::sync::Arc;

use sqlx::PgPool;

use pixelmint_api::app::{build_app, AppConfig, Collaborators};
use pixelmint_infra::storage::{ensure_schema, PostgresJobStore, PostgresLedger};
use pixelmint_infra::{Config, LocalFileStore, OpenAiImageProvider};
use pixelmint_jobs::{InMemoryJobStore, JobStore, RetryScheduler, TracingNotificationSink};
use pixelmint_ledger::{default_initial_grant, InMemoryLedger, Ledger};

#[tokio::main]
async fn main() {
    pixelmint_observability::init();

    let config = Config::from_env();
    let grant = default_initial_grant(config.initial_credits);

    let (ledger, store): (Arc<dyn Ledger>, Arc<dyn JobStore>) = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .expect("failed to connect to postgres");
            ensure_schema(&pool)
                .await
                .expect("failed to prepare database schema");
            (
                Arc::new(PostgresLedger::new(pool.clone(), grant)),
                Arc::new(PostgresJobStore::new(pool)),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory storage");
            (
                Arc::new(InMemoryLedger::new(grant)),
                Arc::new(InMemoryJobStore::new()),
            )
        }
    };

    let files = Arc::new(LocalFileStore::new(config.file_store_root.clone()));
    let provider = Arc::new(OpenAiImageProvider::new(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        files,
    ));

    let (app, _workers) = build_app(
        AppConfig {
            workers: config.workers,
            rate_limit: config.rate_limit,
            rate_window: config.rate_window,
            scheduler: RetryScheduler::default(),
        },
        Collaborators {
            ledger,
            store,
            provider,
            notifier: Arc::new(TracingNotificationSink),
        },
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.bind_addr));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
