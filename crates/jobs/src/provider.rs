//! Generation-provider boundary.

use serde::{Deserialize, Serialize};

use pixelmint_core::{ImageSize, Quality};

use crate::types::SourceRef;

/// Reference to a generated image (URL or opaque storage key, as returned
/// by the provider).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for one provider call, captured from the job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub quality: Quality,
    pub size: ImageSize,
}

/// Provider failure.
///
/// The lifecycle treats every variant as retryable: each failure consumes
/// one attempt regardless of cause. No permanent/transient distinction is
/// made at this boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The request never produced a response (connect/timeout/transport).
    #[error("provider request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The response arrived but could not be interpreted.
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),

    /// The edit source could not be resolved to image bytes.
    #[error("source image unavailable: {0}")]
    Source(String),
}

/// External generation backend.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Generate an image from a text prompt.
    async fn generate(&self, request: &GenerationRequest) -> Result<ImageRef, ProviderError>;

    /// Edit an existing image. `source` may be a remote URL or a
    /// stored-file reference; implementations normalize it to raw bytes
    /// before calling the remote endpoint.
    async fn edit(
        &self,
        source: &SourceRef,
        request: &GenerationRequest,
    ) -> Result<ImageRef, ProviderError>;
}
