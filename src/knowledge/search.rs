//! Similarity Search - 코사인 유사도 기반 선형 검색
//!
//! 저장된 모든 청크와 쿼리 벡터의 코사인 유사도를 계산하고
//! 하한을 넘는 상위 K개를 반환합니다. 근사 인덱스 없이 전체 스캔합니다.

use std::sync::Arc;

use super::store::{Chunk, DocumentStore};

/// 기본 결과 개수
pub const DEFAULT_TOP_K: usize = 10;

/// 기본 유사도 하한 (재현율 우선으로 낮게 유지)
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.1;

// ============================================================================
// Types
// ============================================================================

/// 검색 옵션
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// 최대 결과 수
    pub top_k: usize,
    /// 유사도 하한 (이 값을 초과해야 반환)
    pub min_similarity: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// 매칭된 청크
    pub chunk: Arc<Chunk>,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
}

// ============================================================================
// Search
// ============================================================================

/// 저장소 검색
///
/// 유사도 내림차순으로 안정 정렬하므로 동점은 삽입 순서를 유지합니다.
/// 저장소가 비었거나 하한을 넘는 청크가 부족하면 더 적게(0개 포함) 반환합니다.
pub fn search(
    store: &DocumentStore,
    query_embedding: &[f32],
    options: SearchOptions,
) -> Vec<ScoredChunk> {
    rank(store.all(), query_embedding, options)
}

/// 청크 목록 순위 매기기
pub fn rank(
    chunks: Vec<Arc<Chunk>>,
    query_embedding: &[f32],
    options: SearchOptions,
) -> Vec<ScoredChunk> {
    if chunks.is_empty() || options.top_k == 0 {
        return vec![];
    }

    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let similarity = cosine_similarity(query_embedding, &chunk.embedding);
            ScoredChunk { chunk, similarity }
        })
        .collect();

    // sort_by는 안정 정렬, total_cmp는 전순서
    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    for top in scored.iter().take(3) {
        tracing::debug!(
            "Top similarity {:.3} for {} ({})",
            top.similarity,
            top.chunk.id,
            truncate_title(&top.chunk.title, 30)
        );
    }

    let results: Vec<ScoredChunk> = scored
        .into_iter()
        .filter(|s| s.similarity > options.min_similarity)
        .take(options.top_k)
        .collect();

    tracing::debug!("Returning {} relevant chunks", results.len());
    results
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도 `dot(a,b) / (|a| * |b|)`를 계산합니다.
/// 길이가 다르거나 비어있거나 노름이 0이면 0.0을 반환합니다.
/// 큰 값에서 넘치지 않도록 f64로 누적하며, 유한하지 않은 결과도 0.0입니다.
///
/// # Returns
/// 코사인 유사도 (-1.0 ~ 1.0)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot_product, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a.sqrt() * norm_b.sqrt());
    if !similarity.is_finite() {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0) as f32
}

fn truncate_title(title: &str, max_chars: usize) -> String {
    title.chars().take(max_chars).collect()
}

// ============================================================================
// Tests
// ============================================================================
