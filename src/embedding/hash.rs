//! 해시 임베딩 백엔드 - 오프라인/테스트용
//!
//! 토큰별 SHA-256으로 버킷과 부호를 정하는 feature hashing 방식입니다.
//! 모델 다운로드 없이 결정적인 벡터를 만들고, 단어를 공유하는 텍스트끼리는
//! 양의 유사도를 갖습니다.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{EmbeddingProvider, ModelLoader, ProgressReporter};

/// 기본 차원 (로컬 모델과 동일)
pub const DEFAULT_HASH_DIMENSION: usize = 384;

/// 해시 기반 임베딩
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// 동기 임베딩 (토큰 평균)
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dimension;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            tokens += 1;
        }

        if tokens > 0 {
            for x in vector.iter_mut() {
                *x /= tokens as f32;
            }
        }
        vector
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash-embedding"
    }
}

/// 해시 임베딩 로더 (즉시 준비)
#[derive(Debug, Clone, Default)]
pub struct HashLoader {
    dimension: Option<usize>,
}

impl HashLoader {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
        }
    }
}

#[async_trait]
impl ModelLoader for HashLoader {
    async fn load(&self, progress: &ProgressReporter<'_>) -> Result<Arc<dyn EmbeddingProvider>> {
        progress.report(50.0, "Using offline hash embeddings");
        let embedding = self
            .dimension
            .map(HashEmbedding::new)
            .unwrap_or_default();
        Ok(Arc::new(embedding))
    }

    fn model_name(&self) -> &str {
        "hash-embedding"
    }
}

// ============================================================================
// Tests
// ============================================================================
