//! Gemini 임베딩 백엔드 - 원격 API
//!
//! 로컬 모델 대신 Gemini `gemini-embedding-001`을 사용합니다.
//! 무료 티어(60 RPM)에 맞춰 요청 간격을 1초로 유지하고,
//! 429나 전송 실패는 지수 백오프로 재시도합니다.
//! ref: https://ai.google.dev/gemini-api/docs/embeddings

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EmbeddingProvider, ModelLoader, ProgressReporter};
use crate::http::{backoff, ApiReply, Pacer};

/// Gemini 임베딩 API 엔드포인트
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

const GEMINI_MODEL: &str = "models/gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 지원 차원 (Matryoshka 출력 크기)
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 요청 간 간격 (60 RPM)
const REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// 재시도 횟수와 첫 지연
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'static str,
    content: EmbedContent<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

// ============================================================================
// GeminiEmbedding
// ============================================================================

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    dimension: usize,
    pacer: Pacer,
    retry_delay: Duration,
}

impl GeminiEmbedding {
    /// 기본 차원(768)으로 생성
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성 (768, 1536, 3072 중 하나)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        anyhow::ensure!(
            SUPPORTED_DIMENSIONS.contains(&dimension),
            "Invalid dimension: {}. Must be one of {:?}",
            dimension,
            SUPPORTED_DIMENSIONS
        );
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: GEMINI_EMBED_URL.to_string(),
            api_key,
            dimension,
            pacer: Pacer::new(REQUEST_INTERVAL),
            retry_delay: RETRY_DELAY,
        })
    }

    /// 요청 한 번 (키는 URL이 아닌 헤더로 전송)
    async fn send(&self, request: &EmbedRequest<'_>) -> Result<ApiReply> {
        self.pacer.wait().await;

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        ApiReply::read(response).await
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: GEMINI_MODEL,
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
            task_type: "RETRIEVAL_DOCUMENT",
            output_dimensionality: self.dimension,
        };

        let mut delays = backoff(self.retry_delay, MAX_RETRIES);
        loop {
            // 재시도할 실패만 여기까지 내려옴
            let (failure, hint) = match self.send(&request).await {
                Ok(ApiReply::RateLimited(hint)) => {
                    (anyhow::anyhow!("Gemini API error: rate limit exceeded (429)"), hint)
                }
                Ok(reply) => {
                    let body = reply.into_body("Gemini")?;
                    let parsed: EmbedResponse = serde_json::from_str(&body)
                        .context("Failed to parse embedding response")?;
                    return Ok(parsed.embedding.values);
                }
                Err(e) => (e, None),
            };

            let Some(delay) = delays.next() else {
                return Err(failure.context(format!("giving up after {} retries", MAX_RETRIES)));
            };
            let delay = hint.unwrap_or(delay);
            tracing::warn!("{:#}; retrying in {:?}", failure, delay);
            tokio::time::sleep(delay).await;
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// GeminiLoader
// ============================================================================

/// Gemini 백엔드 로더
///
/// 클라이언트를 만든 뒤 짧은 요청 하나로 키와 네트워크, 차원을 확인합니다.
pub struct GeminiLoader {
    api_key: String,
    dimension: usize,
}

impl GeminiLoader {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            dimension: DEFAULT_DIMENSION,
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

#[async_trait]
impl ModelLoader for GeminiLoader {
    async fn load(&self, progress: &ProgressReporter<'_>) -> Result<Arc<dyn EmbeddingProvider>> {
        let embedder = GeminiEmbedding::with_dimension(self.api_key.clone(), self.dimension)?;
        verify(embedder, progress).await
    }

    fn model_name(&self) -> &str {
        "gemini-embedding-001"
    }
}

/// 연결 확인 후 프로바이더로 반환
async fn verify(
    embedder: GeminiEmbedding,
    progress: &ProgressReporter<'_>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    progress.report(30.0, "Checking Gemini embedding API...");
    let sample = embedder
        .embed("connectivity check")
        .await
        .context("Gemini embedding check failed")?;
    anyhow::ensure!(
        sample.len() == embedder.dimension,
        "Gemini returned {} dimensions, expected {}",
        sample.len(),
        embedder.dimension
    );
    progress.report(90.0, "Gemini embedding API ready");

    Ok(Arc::new(embedder))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_server, test_client, Reply};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn embedding_body(dimension: usize) -> String {
        serde_json::json!({ "embedding": { "values": vec![0.5f32; dimension] } }).to_string()
    }

    /// 로컬 서버를 가리키고 대기 시간을 없앤 임베더
    fn local_embedder(endpoint: String) -> GeminiEmbedding {
        let mut embedder = GeminiEmbedding::new("test-key".to_string()).unwrap();
        embedder.client = test_client();
        embedder.endpoint = endpoint;
        embedder.pacer = Pacer::new(Duration::ZERO);
        embedder.retry_delay = Duration::from_millis(1);
        embedder
    }

    #[test]
    fn test_invalid_dimension() {
        let err = GeminiEmbedding::with_dimension("fake_key".to_string(), 999).unwrap_err();
        assert!(err.to_string().contains("Invalid dimension"));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in SUPPORTED_DIMENSIONS {
            assert!(GeminiEmbedding::with_dimension("fake_key".to_string(), dim).is_ok());
        }
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(GeminiEmbedding::new("  ".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).unwrap();
        let v = embedder.embed("   ").await.unwrap();
        assert_eq!(v.len(), DEFAULT_DIMENSION);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbedRequest {
            model: GEMINI_MODEL,
            content: EmbedContent {
                parts: [EmbedPart { text: "hello" }],
            },
            task_type: "RETRIEVAL_DOCUMENT",
            output_dimensionality: 768,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "models/gemini-embedding-001");
        assert_eq!(json["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(json["outputDimensionality"], 768);
        assert_eq!(json["content"]["parts"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_embed_sends_key_header() {
        let keys = Arc::new(Mutex::new(Vec::new()));
        let seen = keys.clone();
        let server = spawn_server(move |request| {
            seen.lock().unwrap().push(request.header("x-goog-api-key"));
            Reply::json(embedding_body(DEFAULT_DIMENSION))
        })
        .await;

        let embedder = local_embedder(server.url("/embed"));
        let v = embedder.embed("refund policy").await.unwrap();

        assert_eq!(v.len(), DEFAULT_DIMENSION);
        assert_eq!(*keys.lock().unwrap(), vec![Some("test-key".to_string())]);
    }

    #[tokio::test]
    async fn test_embed_retries_rate_limit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let server = spawn_server(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Reply::status(429, "")
            } else {
                Reply::json(embedding_body(DEFAULT_DIMENSION))
            }
        })
        .await;

        let embedder = local_embedder(server.url("/embed"));
        assert_eq!(embedder.embed("refund").await.unwrap().len(), DEFAULT_DIMENSION);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_embed_gives_up_after_retries() {
        let server = spawn_server(|_| Reply::status(429, "")).await;

        let embedder = local_embedder(server.url("/embed"));
        let err = embedder.embed("refund").await.unwrap_err();

        assert!(format!("{:#}", err).contains("429"));
        assert_eq!(server.hits().len(), 1 + MAX_RETRIES as usize);
    }

    #[tokio::test]
    async fn test_embed_client_error_not_retried() {
        let server = spawn_server(|_| {
            Reply::status(
                400,
                r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID"}}"#,
            )
        })
        .await;

        let embedder = local_embedder(server.url("/embed"));
        let err = embedder.embed("refund").await.unwrap_err();

        assert_eq!(err.to_string(), "Gemini API error (400): API key not valid");
        assert_eq!(server.hits().len(), 1);
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_dimension() {
        let server = spawn_server(|_| Reply::json(embedding_body(3))).await;
        let embedder = local_embedder(server.url("/embed"));

        let callback = |_: f32, _: &str| {};
        let progress = ProgressReporter::new(&callback);
        let err = verify(embedder, &progress).await.err().unwrap();
        assert!(err.to_string().contains("expected 768"));
    }
}
