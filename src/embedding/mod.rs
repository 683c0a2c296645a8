//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트를 고정 길이 벡터로 변환합니다. 백엔드는 좁은 트레이트
//! [`EmbeddingProvider`] 뒤에 숨겨져 있어 로컬 모델과 원격 API를
//! 저장소/검색 로직 수정 없이 교체할 수 있습니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = Embedder::new(Arc::new(LocalModelLoader::new(cache_dir)));
//! embedder.initialize(|pct, msg| println!("{pct:.0}% {msg}")).await?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

mod gemini;
mod hash;
mod local;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::error::{RagError, Result};

pub use gemini::{GeminiEmbedding, GeminiLoader, DEFAULT_DIMENSION as GEMINI_DEFAULT_DIMENSION};
pub use hash::{HashEmbedding, HashLoader};
pub use local::{LocalEmbedding, LocalModelLoader, LOCAL_EMBEDDING_DIMENSION};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 모델 로더 트레이트
///
/// 모델을 내려받거나 초기화해서 프로바이더를 만듭니다.
/// 진행률은 `progress`로 보고합니다.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, progress: &ProgressReporter<'_>)
        -> anyhow::Result<Arc<dyn EmbeddingProvider>>;

    /// 로더가 만드는 모델 이름
    fn model_name(&self) -> &str;
}

// ============================================================================
// Progress Reporting
// ============================================================================

/// 진행률 보고기
///
/// 보고값을 `[0, 100]`으로 자르고, 이전 값보다 작으면 이전 값을 유지해
/// 항상 단조 증가하도록 보장합니다.
pub struct ProgressReporter<'a> {
    callback: &'a (dyn Fn(f32, &str) + Send + Sync),
    last: Mutex<f32>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(callback: &'a (dyn Fn(f32, &str) + Send + Sync)) -> Self {
        Self {
            callback,
            last: Mutex::new(0.0),
        }
    }

    /// 진행률 보고
    pub fn report(&self, percent: f32, message: &str) {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };

        let value = {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            if percent > *last {
                *last = percent;
            }
            *last
        };

        tracing::debug!("Embedder progress {:.0}%: {}", value, message);
        (self.callback)(value, message);
    }
}

// ============================================================================
// Embedder
// ============================================================================

/// 임베더 - 모델 수명주기 관리
///
/// 미초기화 → `initialize` (1회, 비동기) → 준비 완료 (프로세스 수명 동안 유지).
/// 동시에 `initialize`가 호출되면 두 번째 호출은 첫 번째가 끝날 때까지 기다립니다.
pub struct Embedder {
    loader: Arc<dyn ModelLoader>,
    provider: OnceCell<Arc<dyn EmbeddingProvider>>,
}

impl Embedder {
    /// 로더로 생성 (아직 초기화되지 않음)
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            provider: OnceCell::new(),
        }
    }

    /// 모델 로드
    ///
    /// 이미 초기화되어 있으면 다시 로드하지 않고 즉시 반환합니다.
    /// 실패하면 미초기화 상태로 남아 다음 호출에서 재시도할 수 있습니다.
    pub async fn initialize<F>(&self, on_progress: F) -> Result<()>
    where
        F: Fn(f32, &str) + Send + Sync,
    {
        if self.provider.initialized() {
            return Ok(());
        }

        let reporter = ProgressReporter::new(&on_progress);

        self.provider
            .get_or_try_init(|| async {
                reporter.report(10.0, "Loading embedding model...");
                tracing::info!("Loading embedding model: {}", self.loader.model_name());

                let provider = self.loader.load(&reporter).await.map_err(|e| {
                    tracing::error!("Failed to initialize embedder: {:#}", e);
                    RagError::model_load(e)
                })?;

                reporter.report(100.0, "Model loaded!");
                tracing::info!(
                    "Embedding model ready: {} (dimension: {})",
                    provider.name(),
                    provider.dimension()
                );
                Ok::<_, RagError>(provider)
            })
            .await?;

        Ok(())
    }

    /// 준비 여부
    pub fn is_ready(&self) -> bool {
        self.provider.initialized()
    }

    /// 임베딩 차원 (초기화 후)
    pub fn dimension(&self) -> Option<usize> {
        self.provider.get().map(|p| p.dimension())
    }

    /// 프로바이더 이름 (초기화 후)
    pub fn provider_name(&self) -> Option<String> {
        self.provider.get().map(|p| p.name().to_string())
    }

    /// 텍스트 임베딩 (L2 정규화)
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let provider = self.provider.get().ok_or(RagError::NotInitialized)?;
        let embedding = provider.embed(text).await.map_err(RagError::embedding)?;
        Ok(l2_normalize(embedding))
    }

    /// 배치 임베딩 (각 벡터 L2 정규화)
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let provider = self.provider.get().ok_or(RagError::NotInitialized)?;
        let embeddings = provider
            .embed_batch(texts)
            .await
            .map_err(RagError::embedding)?;
        Ok(embeddings.into_iter().map(l2_normalize).collect())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// L2 정규화 (영벡터는 그대로)
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    vector
}

// ============================================================================
// Tests
// ============================================================================
