//! Knowledge 모듈 - 인메모리 RAG 지식 저장소
//!
//! - Chunker: 겹치는 단어 윈도우 분할
//! - Store: 삽입 순서를 보존하는 청크 저장소
//! - Search: 코사인 유사도 선형 스캔

mod chunker;
mod search;
mod store;

// Re-exports
pub use chunker::{
    default_chunker, exceeds_min_length, split, split_with, word_chunker, ChunkConfig, Chunker,
    WordWindowChunker, DEFAULT_OVERLAP, DEFAULT_WINDOW_SIZE, MIN_CONTENT_LENGTH,
};
pub use search::{
    cosine_similarity, rank, search, ScoredChunk, SearchOptions, DEFAULT_MIN_SIMILARITY,
    DEFAULT_TOP_K,
};
pub use store::{Chunk, DocumentStore, StoreStats};
