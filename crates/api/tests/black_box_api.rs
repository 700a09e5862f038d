use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

use pixelmint_api::app::{build_app, AppConfig, Collaborators};
use pixelmint_core::{image_tokens, ImageSize, Quality};
use pixelmint_infra::WorkerPool;
use pixelmint_jobs::{
    GenerationRequest, ImageRef, InMemoryJobStore, ProviderAdapter, ProviderError, RetryScheduler,
    SourceRef, TracingNotificationSink,
};
use pixelmint_ledger::InMemoryLedger;

/// Provider that fails its first `fail_first` calls, then succeeds.
struct FlakyProvider {
    fail_first: usize,
    calls: AtomicUsize,
}

impl FlakyProvider {
    fn new(fail_first: usize) -> Self {
        Self {
            fail_first,
            calls: AtomicUsize::new(0),
        }
    }

    fn reliable() -> Self {
        Self::new(0)
    }

    fn answer(&self) -> Result<ImageRef, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(ProviderError::Api {
                status: 503,
                message: "temporarily overloaded".to_string(),
            })
        } else {
            Ok(ImageRef("https://img.example/out.png".to_string()))
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for FlakyProvider {
    async fn generate(&self, _request: &GenerationRequest) -> Result<ImageRef, ProviderError> {
        self.answer()
    }

    async fn edit(
        &self,
        _source: &SourceRef,
        _request: &GenerationRequest,
    ) -> Result<ImageRef, ProviderError> {
        self.answer()
    }
}

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    _workers: WorkerPool,
}

impl TestServer {
    /// Build the app (same wiring as prod, in-memory storage), bind to an
    /// ephemeral port, and run it in the background with fast retries.
    async fn spawn(provider: Arc<dyn ProviderAdapter>, grant: i64, rate_limit: u32) -> Self {
        let config = AppConfig {
            workers: 2,
            rate_limit,
            rate_window: Duration::from_secs(3600),
            scheduler: RetryScheduler::new(3, vec![Duration::from_millis(5)]),
        };
        let deps = Collaborators {
            ledger: Arc::new(InMemoryLedger::new(grant)),
            store: Arc::new(InMemoryJobStore::new()),
            provider,
            notifier: Arc::new(TracingNotificationSink),
        };
        let (app, workers) = build_app(config, deps);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            _workers: workers,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn base_cost() -> i64 {
    image_tokens(Quality::Medium, ImageSize::Square)
}

async fn submit(
    client: &reqwest::Client,
    base_url: &str,
    account: Uuid,
    prompt: &str,
) -> reqwest::Response {
    client
        .post(format!("{}/jobs", base_url))
        .json(&json!({
            "account_id": account,
            "kind": "generate",
            "prompt": prompt,
        }))
        .send()
        .await
        .unwrap()
}

async fn balance_of(client: &reqwest::Client, base_url: &str, account: Uuid) -> i64 {
    let body: serde_json::Value = client
        .get(format!("{}/accounts/{}", base_url, account))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["balance"].as_i64().unwrap()
}

/// Processing is asynchronous; poll until the job reaches the expected
/// terminal status.
async fn get_job_eventually(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &str,
    status: &str,
) -> serde_json::Value {
    for _ in 0..200 {
        let res = client
            .get(format!("{}/jobs/{}", base_url, job_id))
            .send()
            .await
            .unwrap();
        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            if body["status"] == status {
                return body;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach status {status:?} within timeout");
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let srv = TestServer::spawn(Arc::new(FlakyProvider::reliable()), 0, 20).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn submission_runs_to_done_and_spends_the_escrow() {
    let grant = 5 * base_cost();
    let srv = TestServer::spawn(Arc::new(FlakyProvider::reliable()), grant, 20).await;
    let client = reqwest::Client::new();
    let account = Uuid::now_v7();

    let res = submit(&client, &srv.base_url, account, "a lighthouse at dusk").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let job: serde_json::Value = res.json().await.unwrap();
    assert_eq!(job["status"], "pending");
    let job_id = job["id"].as_str().unwrap().to_string();

    let done = get_job_eventually(&client, &srv.base_url, &job_id, "done").await;
    assert_eq!(done["result_ref"], "https://img.example/out.png");
    assert_eq!(done["retry_count"], 0);

    // Escrow spent, not refunded.
    assert_eq!(
        balance_of(&client, &srv.base_url, account).await,
        grant - base_cost()
    );
}

#[tokio::test]
async fn insufficient_balance_is_rejected_with_details() {
    let srv = TestServer::spawn(Arc::new(FlakyProvider::reliable()), 0, 20).await;
    let client = reqwest::Client::new();
    let account = Uuid::now_v7();

    let res = submit(&client, &srv.base_url, account, "a lighthouse at dusk").await;
    assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["required"].as_i64().unwrap(), base_cost());
    assert_eq!(body["available"].as_i64().unwrap(), 0);

    // No job row was created for the denied submission.
    let history: serde_json::Value = client
        .get(format!("{}/accounts/{}/jobs", srv.base_url, account))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn rate_limit_applies_per_account() {
    let grant = 100 * base_cost();
    let srv = TestServer::spawn(Arc::new(FlakyProvider::reliable()), grant, 1).await;
    let client = reqwest::Client::new();
    let account = Uuid::now_v7();

    let first = submit(&client, &srv.base_url, account, "first").await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = submit(&client, &srv.base_url, account, "second").await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["limit"].as_u64().unwrap(), 1);

    // The denial reserved nothing.
    assert_eq!(
        balance_of(&client, &srv.base_url, account).await,
        grant - base_cost()
    );

    // A different account is not affected.
    let other = Uuid::now_v7();
    let res = submit(&client, &srv.base_url, other, "other account").await;
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn exhausted_retries_refund_the_account() {
    let grant = 5 * base_cost();
    let srv = TestServer::spawn(Arc::new(FlakyProvider::new(usize::MAX)), grant, 20).await;
    let client = reqwest::Client::new();
    let account = Uuid::now_v7();

    let res = submit(&client, &srv.base_url, account, "doomed").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let job: serde_json::Value = res.json().await.unwrap();
    let job_id = job["id"].as_str().unwrap().to_string();

    let failed = get_job_eventually(&client, &srv.base_url, &job_id, "failed").await;
    assert_eq!(failed["retry_count"], 3);
    assert!(failed["last_error"]
        .as_str()
        .unwrap()
        .contains("temporarily overloaded"));

    // Full refund of exactly the job's cost.
    assert_eq!(balance_of(&client, &srv.base_url, account).await, grant);
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let grant = 5 * base_cost();
    let srv = TestServer::spawn(Arc::new(FlakyProvider::new(2)), grant, 20).await;
    let client = reqwest::Client::new();
    let account = Uuid::now_v7();

    let res = submit(&client, &srv.base_url, account, "eventually fine").await;
    let job: serde_json::Value = res.json().await.unwrap();
    let job_id = job["id"].as_str().unwrap().to_string();

    let done = get_job_eventually(&client, &srv.base_url, &job_id, "done").await;
    assert_eq!(done["retry_count"], 2);
    assert_eq!(
        balance_of(&client, &srv.base_url, account).await,
        grant - base_cost()
    );
}

#[tokio::test]
async fn settings_update_changes_the_cost_basis() {
    let grant = 5 * base_cost();
    let srv = TestServer::spawn(Arc::new(FlakyProvider::reliable()), grant, 20).await;
    let client = reqwest::Client::new();
    let account = Uuid::now_v7();

    let res = client
        .put(format!("{}/accounts/{}/settings", srv.base_url, account))
        .json(&json!({"quality": "low"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["quality"], "low");

    let res = submit(&client, &srv.base_url, account, "cheap one").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let job: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        job["cost"].as_i64().unwrap(),
        image_tokens(Quality::Low, ImageSize::Square)
    );
}

#[tokio::test]
async fn templates_are_listed() {
    let srv = TestServer::spawn(Arc::new(FlakyProvider::reliable()), 0, 20).await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .get(format!("{}/templates", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let templates = body.as_array().unwrap();
    assert!(!templates.is_empty());
    assert!(templates.iter().all(|t| t["id"].is_string()));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let srv = TestServer::spawn(Arc::new(FlakyProvider::reliable()), 0, 20).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/jobs/{}", srv.base_url, Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn submission_without_prompt_or_template_is_rejected() {
    let srv = TestServer::spawn(Arc::new(FlakyProvider::reliable()), 0, 20).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/jobs", srv.base_url))
        .json(&json!({
            "account_id": Uuid::now_v7(),
            "kind": "generate",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
