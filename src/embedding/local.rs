//! 로컬 임베딩 백엔드 - fastembed (ONNX)
//!
//! `AllMiniLML6V2` 문장 임베딩 모델을 로컬에서 실행합니다 (384차원,
//! 토큰 평균 풀링). 첫 사용 시 모델 파일을 캐시 디렉토리로 내려받습니다.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{EmbeddingProvider, ModelLoader, ProgressReporter};

/// AllMiniLML6V2 출력 차원
pub const LOCAL_EMBEDDING_DIMENSION: usize = 384;

const MODEL_NAME: &str = "all-MiniLM-L6-v2";

// ============================================================================
// LocalEmbedding
// ============================================================================

/// fastembed 로컬 임베딩
///
/// 추론은 CPU를 점유하므로 blocking 스레드에서 실행합니다.
pub struct LocalEmbedding {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl LocalEmbedding {
    fn embed_blocking(model: &Mutex<TextEmbedding>, text: String) -> Result<Vec<f32>> {
        let model = model
            .lock()
            .map_err(|_| anyhow::anyhow!("Embedding model lock poisoned"))?;
        let mut embeddings = model
            .embed(vec![text], None)
            .context("Local model inference failed")?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Model returned no embedding"))
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || Self::embed_blocking(&model, text))
            .await
            .context("Embedding task panicked")?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("Embedding model lock poisoned"))?;
            model
                .embed(texts, None)
                .context("Local model inference failed")
        })
        .await
        .context("Embedding task panicked")?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        MODEL_NAME
    }
}

// ============================================================================
// LocalModelLoader
// ============================================================================

/// 로컬 모델 로더
pub struct LocalModelLoader {
    cache_dir: PathBuf,
    show_download_progress: bool,
}

impl LocalModelLoader {
    /// 캐시 디렉토리를 지정하여 생성
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            show_download_progress: false,
        }
    }

    /// fastembed 자체 다운로드 진행 표시줄 사용 여부
    pub fn with_download_progress(mut self, show: bool) -> Self {
        self.show_download_progress = show;
        self
    }
}

#[async_trait]
impl ModelLoader for LocalModelLoader {
    async fn load(&self, progress: &ProgressReporter<'_>) -> Result<Arc<dyn EmbeddingProvider>> {
        std::fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("Failed to create model cache directory: {:?}", self.cache_dir)
        })?;

        progress.report(20.0, &format!("Loading model: {}", MODEL_NAME));

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_cache_dir(self.cache_dir.clone())
            .with_show_download_progress(self.show_download_progress);

        let model = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
            .await
            .context("Model initialization task panicked")?
            .context(
                "Failed to load embedding model. Check your internet connection for initial download.",
            )?;

        progress.report(90.0, "Warming up model...");

        let model = Arc::new(Mutex::new(model));
        let warm_model = Arc::clone(&model);
        let warm_up = tokio::task::spawn_blocking(move || {
            LocalEmbedding::embed_blocking(&warm_model, "warm up".to_string())
        })
        .await
        .context("Warm-up task panicked")??;

        tracing::debug!("Local model warm-up produced {} dimensions", warm_up.len());

        Ok(Arc::new(LocalEmbedding {
            model,
            dimension: warm_up.len(),
        }))
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_defaults() {
        let loader = LocalModelLoader::new(PathBuf::from("/tmp/autoverse-models"));
        assert_eq!(loader.model_name(), "all-MiniLM-L6-v2");
        assert!(!loader.show_download_progress);

        let loader = loader.with_download_progress(true);
        assert!(loader.show_download_progress);
    }
}
