//! 에러 타입 - RAG 코어의 태그된 에러 분류
//!
//! 외부 협력자(크롤러, 임베딩 백엔드, 완성 서비스)는 `anyhow::Result`를 반환하고,
//! 코어는 이를 `RagError`로 변환합니다. 호출자는 메시지 파싱 대신
//! [`ErrorKind`]로 분기할 수 있습니다.

use thiserror::Error;

/// RAG 코어 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// RagError
// ============================================================================

/// RAG 코어 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 임베딩 모델 초기화 실패 (네트워크, 리소스)
    #[error("Failed to load embedding model: {cause}")]
    ModelLoad { cause: String },

    /// 초기화 전에 embed/search 호출
    #[error("Embedder not initialized")]
    NotInitialized,

    /// 크롤러가 사용 가능한 페이지를 하나도 반환하지 않음
    #[error("No pages found on {url}")]
    EmptyCrawl { url: String },

    /// 크롤러 호출 자체가 실패 (네트워크, 원격 에러)
    #[error("Failed to crawl {url}: {cause}")]
    CrawlTransport { url: String, cause: String },

    /// 완성 서비스 실패 또는 에러 페이로드
    #[error("Failed to generate answer: {cause}")]
    Generation { cause: String },

    /// 초기화 이후 임베딩 백엔드 실패
    #[error("Failed to embed text: {cause}")]
    Embedding { cause: String },

    /// 저장소 불변식 위반 (너무 짧은 콘텐츠, 차원 불일치)
    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),

    /// 협력적 취소
    #[error("Ingestion cancelled")]
    Cancelled,
}

/// 에러 종류 (페이로드 없는 분기용)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ModelLoad,
    NotInitialized,
    EmptyCrawl,
    CrawlTransport,
    Generation,
    Embedding,
    InvalidChunk,
    Cancelled,
}

impl RagError {
    /// 에러 종류 반환
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::ModelLoad { .. } => ErrorKind::ModelLoad,
            RagError::NotInitialized => ErrorKind::NotInitialized,
            RagError::EmptyCrawl { .. } => ErrorKind::EmptyCrawl,
            RagError::CrawlTransport { .. } => ErrorKind::CrawlTransport,
            RagError::Generation { .. } => ErrorKind::Generation,
            RagError::Embedding { .. } => ErrorKind::Embedding,
            RagError::InvalidChunk(_) => ErrorKind::InvalidChunk,
            RagError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// anyhow 에러 체인 전체를 원인 문자열로 보존
    pub(crate) fn model_load(err: anyhow::Error) -> Self {
        RagError::ModelLoad {
            cause: format!("{:#}", err),
        }
    }

    pub(crate) fn crawl_transport(url: &str, err: anyhow::Error) -> Self {
        RagError::CrawlTransport {
            url: url.to_string(),
            cause: format!("{:#}", err),
        }
    }

    pub(crate) fn generation(err: anyhow::Error) -> Self {
        RagError::Generation {
            cause: format!("{:#}", err),
        }
    }

    pub(crate) fn embedding(err: anyhow::Error) -> Self {
        RagError::Embedding {
            cause: format!("{:#}", err),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(RagError::NotInitialized.kind(), ErrorKind::NotInitialized);
        assert_eq!(
            RagError::EmptyCrawl {
                url: "https://example.com".to_string()
            }
            .kind(),
            ErrorKind::EmptyCrawl
        );
        assert_eq!(RagError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_cause_keeps_context_chain() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("connection refused"));
        let err = inner.context("Firecrawl request failed").unwrap_err();

        let rag = RagError::crawl_transport("https://bad.example", err);
        let message = rag.to_string();
        assert!(message.contains("https://bad.example"));
        assert!(message.contains("Firecrawl request failed"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_model_load_message_is_human_readable() {
        let err = RagError::model_load(anyhow::anyhow!("no network"));
        assert_eq!(
            err.to_string(),
            "Failed to load embedding model: no network"
        );
    }
}
