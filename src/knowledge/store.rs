//! Document Store - 인메모리 청크 저장소
//!
//! 청크 레코드(콘텐츠, 출처 URL, 제목, 임베딩)를 삽입 순서대로 보관합니다.
//! 변경 연산은 "청크 추가"와 "전체 삭제" 두 가지뿐입니다.
//! 저장 위치: 프로세스 메모리 (영속화 없음)

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::error::{RagError, Result};

use super::chunker::{exceeds_min_length, MIN_CONTENT_LENGTH};

// ============================================================================
// Types
// ============================================================================

/// 저장된 청크 (검색 단위)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// `{source_url}-{sequence_index}` 형식의 고유 ID
    pub id: String,
    /// 청크 텍스트
    pub content: String,
    /// 원본 페이지 URL
    pub source_url: String,
    /// 출처 제목 (페이지 제목 또는 URL)
    pub title: String,
    /// L2 정규화된 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 저장소 통계
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub source_count: usize,
    pub total_content_bytes: usize,
    pub dimension: Option<usize>,
}

#[derive(Debug, Default)]
struct StoreInner {
    chunks: Vec<Arc<Chunk>>,
    /// URL별 다음 시퀀스 번호
    next_sequence: HashMap<String, usize>,
    /// 첫 삽입에서 고정되는 임베딩 차원
    dimension: Option<usize>,
}

// ============================================================================
// DocumentStore
// ============================================================================

/// Document Store - 인메모리 청크 저장소
///
/// 멀티스레드 런타임에서 공유되므로 내부는 `RwLock`으로 보호됩니다.
#[derive(Debug, Default)]
pub struct DocumentStore {
    inner: RwLock<StoreInner>,
}

impl DocumentStore {
    /// 빈 저장소 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 청크 추가
    ///
    /// URL별 시퀀스 카운터로 ID를 생성합니다. 같은 URL을 다시 수집해도
    /// 카운터가 이어지므로 ID가 충돌하지 않습니다.
    ///
    /// # Returns
    /// 생성된 청크 ID
    pub fn add_chunk(
        &self,
        content: String,
        source_url: &str,
        title: &str,
        embedding: Vec<f32>,
    ) -> Result<String> {
        if !exceeds_min_length(&content, MIN_CONTENT_LENGTH) {
            return Err(RagError::InvalidChunk(format!(
                "content must be longer than {} characters",
                MIN_CONTENT_LENGTH
            )));
        }
        if embedding.is_empty() {
            return Err(RagError::InvalidChunk("embedding is empty".to_string()));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(RagError::InvalidChunk(
                "embedding contains non-finite values".to_string(),
            ));
        }

        let mut inner = self.write();

        match inner.dimension {
            Some(dim) if dim != embedding.len() => {
                return Err(RagError::InvalidChunk(format!(
                    "embedding dimension {} does not match store dimension {}",
                    embedding.len(),
                    dim
                )));
            }
            Some(_) => {}
            None => inner.dimension = Some(embedding.len()),
        }

        let sequence = inner
            .next_sequence
            .entry(source_url.to_string())
            .or_insert(0);
        let id = format!("{}-{}", source_url, sequence);
        *sequence += 1;

        inner.chunks.push(Arc::new(Chunk {
            id: id.clone(),
            content,
            source_url: source_url.to_string(),
            title: title.to_string(),
            embedding,
        }));

        Ok(id)
    }

    /// 청크 개수
    pub fn count(&self) -> usize {
        self.read().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// 전체 삭제 (시퀀스 카운터와 차원도 초기화)
    pub fn clear(&self) {
        let mut inner = self.write();
        let dropped = inner.chunks.len();
        *inner = StoreInner::default();
        tracing::info!("Cleared document store ({} chunks dropped)", dropped);
    }

    /// 삽입 순서대로 전체 청크 스냅샷 (읽기 전용)
    pub fn all(&self) -> Vec<Arc<Chunk>> {
        self.read().chunks.clone()
    }

    /// 고정된 임베딩 차원
    pub fn dimension(&self) -> Option<usize> {
        self.read().dimension
    }

    /// 저장소 통계
    pub fn stats(&self) -> StoreStats {
        let inner = self.read();
        let sources: HashSet<&str> = inner
            .chunks
            .iter()
            .map(|c| c.source_url.as_str())
            .collect();

        StoreStats {
            chunk_count: inner.chunks.len(),
            source_count: sources.len(),
            total_content_bytes: inner.chunks.iter().map(|c| c.content.len()).sum(),
            dimension: inner.dimension,
        }
    }

    // 패닉한 작성자가 있어도 저장소 상태는 항상 일관적이므로 poison을 무시
    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================
