//! autoverse-rag - 인메모리 RAG 엔진
//!
//! 웹사이트를 크롤링해 메모리에만 존재하는 청크 인덱스를 만들고,
//! 임베딩 유사도로 검색한 결과를 근거로 원격 언어 모델이 답변합니다.

pub mod cli;
pub mod config;
pub mod crawler;
pub mod embedding;
pub mod error;
mod http;
pub mod knowledge;
pub mod pipeline;
pub mod rag;
pub mod synthesis;

#[cfg(test)]
mod test_support;

// Re-exports
pub use config::RagConfig;
pub use crawler::{
    CrawlOptions, CrawlResult, CrawlStatus, CrawledPage, FirecrawlCrawler, SiteCrawler,
    WebScraper,
};
pub use embedding::{
    Embedder, EmbeddingProvider, GeminiLoader, HashLoader, LocalModelLoader, ModelLoader,
};
pub use error::{ErrorKind, RagError, Result};
pub use knowledge::{Chunk, ChunkConfig, DocumentStore, ScoredChunk, SearchOptions, StoreStats};
pub use pipeline::{CancelFlag, IngestEvent, IngestReport, UrlIngest, UrlStatus};
pub use rag::{RagIndex, RagIndexBuilder, RagState};
pub use synthesis::{
    build_prompt, AnswerSynthesizer, ChatCompletionService, CompletionService, Prompt,
    NO_CONTEXT_ANSWER,
};
