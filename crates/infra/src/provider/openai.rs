//! OpenAI Images API adapter.
//!
//! Implements [`ProviderAdapter`] over the `images/generations` and
//! `images/edits` endpoints. Edit sources are normalized to raw bytes
//! first: remote URLs are downloaded, opaque keys are resolved through
//! the [`FileStore`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info};

use pixelmint_jobs::{GenerationRequest, ImageRef, ProviderAdapter, ProviderError, SourceRef};

use crate::files::FileStore;

/// Upper bound on one provider call; a hang past this surfaces as a
/// request error and goes through the normal retry path.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiImageProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    files: Arc<dyn FileStore>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiImageProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, files: Arc<dyn FileStore>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build http client");
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
            files,
        }
    }

    async fn resolve_source(&self, source: &SourceRef) -> Result<Vec<u8>, ProviderError> {
        if source.is_remote() {
            let response = self
                .http
                .get(source.as_str())
                .send()
                .await
                .map_err(|e| ProviderError::Source(e.to_string()))?;
            if !response.status().is_success() {
                return Err(ProviderError::Source(format!(
                    "source download returned status {}",
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ProviderError::Source(e.to_string()))?;
            debug!(source = %source, len = bytes.len(), "downloaded remote edit source");
            Ok(bytes.to_vec())
        } else {
            let bytes = self
                .files
                .load(source.as_str())
                .await
                .map_err(|e| ProviderError::Source(e.to_string()))?;
            debug!(source = %source, len = bytes.len(), "loaded stored edit source");
            Ok(bytes)
        }
    }

    async fn parse_image_response(response: reqwest::Response) -> Result<ImageRef, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        let parsed: ImagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("empty data array".to_string()))?;

        match first.url {
            Some(url) if !url.is_empty() => Ok(ImageRef(url)),
            _ => Err(ProviderError::InvalidResponse(
                "image entry carries no url".to_string(),
            )),
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiImageProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<ImageRef, ProviderError> {
        debug!(model = %request.model, "requesting image generation");

        let body = serde_json::json!({
            "model": request.model,
            "prompt": request.prompt,
            "n": 1,
            "size": request.size.to_string(),
            "quality": request.quality.to_string(),
        });

        let response = self
            .http
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let image = Self::parse_image_response(response).await?;
        info!(result = %image, "image generated");
        Ok(image)
    }

    async fn edit(
        &self,
        source: &SourceRef,
        request: &GenerationRequest,
    ) -> Result<ImageRef, ProviderError> {
        debug!(model = %request.model, source = %source, "requesting image edit");

        let bytes = self.resolve_source(source).await?;

        let part = multipart::Part::bytes(bytes)
            .file_name("source.png")
            .mime_str("image/png")
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let form = multipart::Form::new()
            .part("image", part)
            .text("model", request.model.clone())
            .text("prompt", request.prompt.clone())
            .text("n", "1")
            .text("size", request.size.to_string())
            .text("quality", request.quality.to_string());

        let response = self
            .http
            .post(format!("{}/images/edits", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let image = Self::parse_image_response(response).await?;
        info!(result = %image, "image edited");
        Ok(image)
    }
}

fn extract_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return parsed.error.message;
    }
    let mut message = body.to_string();
    message.truncate(200);
    message
}

#[cfg(test)]
mod tests {
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use pixelmint_core::{ImageSize, Quality};

    use super::*;
    use crate::files::InMemoryFileStore;

    #[derive(Clone)]
    struct FakeResponse {
        status: StatusCode,
        body: serde_json::Value,
    }

    async fn images_endpoint(State(fake): State<FakeResponse>) -> (StatusCode, Json<serde_json::Value>) {
        (fake.status, Json(fake.body))
    }

    async fn source_bytes() -> &'static [u8] {
        b"png-bytes"
    }

    /// Ephemeral-port fake of the Images API; returns its base URL.
    async fn spawn_fake(status: StatusCode, body: serde_json::Value) -> String {
        let fake = FakeResponse { status, body };
        let app = Router::new()
            .route("/v1/images/generations", post(images_endpoint))
            .route("/v1/images/edits", post(images_endpoint))
            .route("/source.png", get(source_bytes))
            .with_state(fake);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "a lighthouse at dusk".to_string(),
            model: "gpt-image-1".to_string(),
            quality: Quality::Medium,
            size: ImageSize::Square,
        }
    }

    fn provider(base: &str) -> OpenAiImageProvider {
        OpenAiImageProvider::new(
            "test-key",
            format!("{base}/v1"),
            Arc::new(InMemoryFileStore::new()),
        )
    }

    #[tokio::test]
    async fn generate_returns_the_first_image_url() {
        let base = spawn_fake(
            StatusCode::OK,
            serde_json::json!({"data": [{"url": "https://img.example/out.png"}]}),
        )
        .await;

        let image = provider(&base).generate(&request()).await.unwrap();
        assert_eq!(image.as_str(), "https://img.example/out.png");
    }

    #[tokio::test]
    async fn api_failures_carry_status_and_message() {
        let base = spawn_fake(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": {"message": "model overloaded"}}),
        )
        .await;

        let err = provider(&base).generate(&request()).await.unwrap_err();
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "model overloaded");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_data_is_a_malformed_response() {
        let base = spawn_fake(StatusCode::OK, serde_json::json!({"data": []})).await;

        let err = provider(&base).generate(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn edit_resolves_a_stored_source_through_the_file_store() {
        let base = spawn_fake(
            StatusCode::OK,
            serde_json::json!({"data": [{"url": "https://img.example/edited.png"}]}),
        )
        .await;

        let files = Arc::new(InMemoryFileStore::new());
        files.insert("file-3f2a9c", b"png-bytes".to_vec());
        let provider =
            OpenAiImageProvider::new("test-key", format!("{base}/v1"), files);

        let image = provider
            .edit(&SourceRef::new("file-3f2a9c"), &request())
            .await
            .unwrap();
        assert_eq!(image.as_str(), "https://img.example/edited.png");
    }

    #[tokio::test]
    async fn edit_downloads_a_remote_source() {
        let base = spawn_fake(
            StatusCode::OK,
            serde_json::json!({"data": [{"url": "https://img.example/edited.png"}]}),
        )
        .await;

        let source = SourceRef::new(format!("{base}/source.png"));
        let image = provider(&base).edit(&source, &request()).await.unwrap();
        assert_eq!(image.as_str(), "https://img.example/edited.png");
    }

    #[tokio::test]
    async fn missing_stored_source_fails_before_any_provider_call() {
        let base = spawn_fake(StatusCode::OK, serde_json::json!({"data": []})).await;

        let err = provider(&base)
            .edit(&SourceRef::new("file-missing"), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Source(_)));
    }
}
