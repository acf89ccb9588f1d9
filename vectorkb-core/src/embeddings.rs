//! Embeddings module — Amazon Titan Text Embeddings v2 over the Bedrock runtime.
//!
//! Provides an `EmbeddingBackend` trait with the production `TitanEmbeddingClient`
//! implementation. Titan v2 supports exactly three output dimensionalities, and
//! this knowledge base uses all of them:
//! - 1024 — document chunk content
//! - 512  — consolidated metadata JSON
//! - 256  — individual labeled fields (provider, category, doc type)

use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::ProvideErrorMetadata;
use aws_sdk_bedrockruntime::primitives::Blob;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

/// Chunk content embedding dimensions
pub const DOCUMENT_DIMENSIONS: usize = 1024;

/// Consolidated metadata embedding dimensions
pub const METADATA_DIMENSIONS: usize = 512;

/// Labeled field embedding dimensions
pub const FIELD_DIMENSIONS: usize = 256;

/// Bedrock model id for Titan Text Embeddings v2
pub const TITAN_MODEL_ID: &str = "amazon.titan-embed-text-v2:0";

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text at the requested dimensionality.
    async fn embed(&self, text: &str, dimensions: usize) -> Result<Vec<f32>, EmbeddingError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

/// Embedding generation errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Bedrock API error ({code}): {message}")]
    Api { code: String, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Unsupported embedding dimensions: {0} (must be 256, 512, or 1024)")]
    UnsupportedDimensions(usize),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Request serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl EmbeddingError {
    /// Only API failures can resolve on a later attempt; malformed requests
    /// and bad responses fail the same way every time.
    fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::Api { .. })
    }
}

// ============================================================================
// Config types
// ============================================================================

/// Titan embedding client configuration
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub model_id: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_id: TITAN_MODEL_ID.to_string(),
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl From<&crate::config::EmbeddingConfig> for EmbeddingSettings {
    fn from(c: &crate::config::EmbeddingConfig) -> Self {
        Self {
            model_id: c.model_id.clone(),
            max_retries: c.max_retries,
            retry_delay_ms: c.retry_delay_ms,
        }
    }
}

// ============================================================================
// Titan request/response structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TitanRequest<'a> {
    input_text: &'a str,
    dimensions: usize,
    normalize: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitanResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    #[allow(dead_code)]
    input_text_token_count: Option<u64>,
}

/// Parse and validate an InvokeModel response payload.
fn parse_titan_response(payload: &[u8], dimensions: usize) -> Result<Vec<f32>, EmbeddingError> {
    let response: TitanResponse = serde_json::from_slice(payload)
        .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

    if response.embedding.len() != dimensions {
        return Err(EmbeddingError::InvalidDimensions {
            expected: dimensions,
            actual: response.embedding.len(),
        });
    }

    Ok(response.embedding)
}

// ============================================================================
// TitanEmbeddingClient
// ============================================================================

/// Titan embedding client — calls Bedrock `InvokeModel` with retry/backoff.
///
/// SDK-level retries are expected to be disabled on the provided client; this
/// type owns the backoff policy via `tokio-retry`.
#[derive(Debug, Clone)]
pub struct TitanEmbeddingClient {
    client: aws_sdk_bedrockruntime::Client,
    settings: EmbeddingSettings,
}

impl TitanEmbeddingClient {
    pub fn new(client: aws_sdk_bedrockruntime::Client, settings: EmbeddingSettings) -> Self {
        Self { client, settings }
    }

    /// Generate an embedding with exponential backoff (capped at 10s per delay).
    pub async fn embed_with_retry(
        &self,
        text: &str,
        dimensions: usize,
    ) -> Result<Vec<f32>, EmbeddingError> {
        if !matches!(dimensions, 256 | 512 | 1024) {
            return Err(EmbeddingError::UnsupportedDimensions(dimensions));
        }

        let retry_strategy = ExponentialBackoff::from_millis(self.settings.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.settings.max_retries);

        RetryIf::spawn(
            retry_strategy,
            || self.embed_once(text, dimensions),
            EmbeddingError::is_retryable,
        )
        .await
        .map_err(|e| {
            tracing::error!(
                attempts = self.settings.max_retries,
                dimensions = dimensions,
                error = %e,
                "Embedding generation failed"
            );
            e
        })
    }

    async fn embed_once(&self, text: &str, dimensions: usize) -> Result<Vec<f32>, EmbeddingError> {
        let request = TitanRequest {
            input_text: text,
            dimensions,
            normalize: true,
        };
        let body = serde_json::to_vec(&request)?;

        let response = self
            .client
            .invoke_model()
            .model_id(&self.settings.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                let code = e.code().unwrap_or("Unknown").to_string();
                let message = e.message().map(str::to_string).unwrap_or_else(|| e.to_string());
                tracing::error!(code = %code, message = %message, "Bedrock InvokeModel error");
                EmbeddingError::Api { code, message }
            })?;

        parse_titan_response(&response.body.into_inner(), dimensions)
    }
}

#[async_trait]
impl EmbeddingBackend for TitanEmbeddingClient {
    async fn embed(&self, text: &str, dimensions: usize) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_with_retry(text, dimensions).await
    }

    fn name(&self) -> &str {
        "titan-v2"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_bedrockruntime::config::retry::RetryConfig;
    use aws_sdk_bedrockruntime::config::{BehaviorVersion, Credentials, Region};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str, max_retries: usize) -> TitanEmbeddingClient {
        let conf = aws_sdk_bedrockruntime::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .endpoint_url(base_url)
            .retry_config(RetryConfig::disabled())
            .build();

        TitanEmbeddingClient::new(
            aws_sdk_bedrockruntime::Client::from_conf(conf),
            EmbeddingSettings {
                model_id: TITAN_MODEL_ID.to_string(),
                max_retries,
                retry_delay_ms: 10,
            },
        )
    }

    fn mock_embedding_response(dimensions: usize) -> serde_json::Value {
        let values: Vec<f32> = (0..dimensions).map(|i| (i as f32) / dimensions as f32).collect();
        serde_json::json!({
            "embedding": values,
            "inputTextTokenCount": 7
        })
    }

    #[test]
    fn test_titan_request_wire_shape() {
        let request = TitanRequest {
            input_text: "hello world",
            dimensions: 1024,
            normalize: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "inputText": "hello world",
                "dimensions": 1024,
                "normalize": true
            })
        );
    }

    #[test]
    fn test_parse_titan_response_validates_dimensions() {
        let body = serde_json::to_vec(&mock_embedding_response(512)).unwrap();
        assert_eq!(parse_titan_response(&body, 512).unwrap().len(), 512);

        match parse_titan_response(&body, 1024) {
            Err(EmbeddingError::InvalidDimensions { expected, actual }) => {
                assert_eq!(expected, 1024);
                assert_eq!(actual, 512);
            }
            other => panic!("Expected InvalidDimensions, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_titan_response_rejects_garbage() {
        let result = parse_titan_response(b"not json", 256);
        assert!(matches!(result, Err(EmbeddingError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_embed_returns_vector_of_requested_length() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_embedding_response(1024)),
            )
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 1);
        let embedding = client.embed("hello world", 1024).await.unwrap();
        assert_eq!(embedding.len(), 1024);
        assert_eq!(client.name(), "titan-v2");
    }

    #[tokio::test]
    async fn test_embed_rejects_unsupported_dimensions() {
        let mock_server = MockServer::start().await;
        let client = test_client(&mock_server.uri(), 1);

        let result = client.embed("hello", 768).await;
        assert!(matches!(result, Err(EmbeddingError::UnsupportedDimensions(768))));

        // No request should have reached the mock
        let requests = mock_server.received_requests().await.unwrap_or_default();
        assert!(requests.is_empty(), "Unsupported dims must fail before calling Bedrock");
    }

    #[tokio::test]
    async fn test_embed_surfaces_api_error_after_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "message": "Internal server error"
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 2);
        let result = client.embed("hello", 256).await;
        assert!(matches!(result, Err(EmbeddingError::Api { .. })));
    }

    #[tokio::test]
    async fn test_embed_retries_then_succeeds() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "message": "Too many requests"
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(mock_embedding_response(256)),
            )
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 3);
        let embedding = client.embed("hello", 256).await.unwrap();
        assert_eq!(embedding.len(), 256);
    }

    #[tokio::test]
    async fn test_embed_fails_on_wrong_length_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": [0.1, 0.2, 0.3],
                "inputTextTokenCount": 2
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri(), 1);
        let result = client.embed("hello", 1024).await;
        match result {
            Err(EmbeddingError::InvalidDimensions { expected, actual }) => {
                assert_eq!(expected, 1024);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected InvalidDimensions, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_api_errors_are_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": [0.1, 0.2],
                "inputTextTokenCount": 2
            })))
            .mount(&mock_server)
            .await;

        // A wrong-length response will never improve on retry
        let client = test_client(&mock_server.uri(), 3);
        let result = client.embed("hello", 256).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidDimensions { .. })));

        let requests = mock_server.received_requests().await.unwrap_or_default();
        assert_eq!(requests.len(), 1, "dimension mismatch must fail on the first attempt");
    }
}
