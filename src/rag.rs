//! RagIndex - RAG 엔진 조립 루트
//!
//! 임베더, 저장소, 수집 파이프라인, 답변 합성기를 하나로 묶습니다.
//! 전역 상태 없이 호출자가 생성하고 소유합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let index = RagIndex::builder()
//!     .model_loader(Arc::new(LocalModelLoader::new(cache_dir)))
//!     .crawler(Arc::new(WebScraper::new()?))
//!     .completion(Arc::new(ChatCompletionService::new(url, model, key)?))
//!     .build()?;
//!
//! index.initialize_embedder(|pct, msg| println!("{pct:.0}% {msg}")).await?;
//! index.ingest_site("https://example.com", &CrawlOptions::default()).await?;
//! let answer = index.query("What is the return policy?").await?;
//! ```

use std::sync::Arc;

use anyhow::Context;
use uuid::Uuid;

use crate::crawler::{CrawlOptions, SiteCrawler};
use crate::embedding::{Embedder, ModelLoader};
use crate::error::Result;
use crate::knowledge::{
    search, ChunkConfig, DocumentStore, ScoredChunk, SearchOptions, StoreStats, WordWindowChunker,
};
use crate::pipeline::{
    ignore_events, CancelFlag, IngestEvent, IngestPipeline, IngestReport, UrlIngest,
};
use crate::synthesis::{AnswerSynthesizer, CompletionService};

/// 인덱스 상태 스냅샷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RagState {
    /// 임베더 준비 여부
    pub ready: bool,
    pub chunk_count: usize,
}

// ============================================================================
// RagIndex
// ============================================================================

/// 인메모리 RAG 인덱스
pub struct RagIndex {
    id: Uuid,
    embedder: Arc<Embedder>,
    store: Arc<DocumentStore>,
    pipeline: IngestPipeline,
    synthesizer: AnswerSynthesizer,
    search_options: SearchOptions,
}

impl RagIndex {
    pub fn builder() -> RagIndexBuilder {
        RagIndexBuilder::default()
    }

    /// 로그 상관관계용 ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 임베딩 모델 로드 (멱등)
    pub async fn initialize_embedder<F>(&self, on_progress: F) -> Result<()>
    where
        F: Fn(f32, &str) + Send + Sync,
    {
        tracing::info!(index = %self.id, "Initializing embedder");
        self.embedder.initialize(on_progress).await
    }

    /// 단일 사이트 수집
    pub async fn ingest_site(&self, url: &str, options: &CrawlOptions) -> Result<IngestReport> {
        tracing::info!(index = %self.id, "Ingesting {}", url);
        self.pipeline
            .ingest_site(url, options, &CancelFlag::new(), &ignore_events)
            .await
    }

    /// URL 배치 수집 (에러 없이 URL별 최종 상태 반환)
    pub async fn ingest_batch<F>(
        &self,
        urls: &[String],
        options: &CrawlOptions,
        observer: F,
    ) -> Vec<UrlIngest>
    where
        F: Fn(IngestEvent<'_>) + Send + Sync,
    {
        self.ingest_batch_with_cancel(urls, options, &CancelFlag::new(), observer)
            .await
    }

    /// 취소 가능한 배치 수집
    pub async fn ingest_batch_with_cancel<F>(
        &self,
        urls: &[String],
        options: &CrawlOptions,
        cancel: &CancelFlag,
        observer: F,
    ) -> Vec<UrlIngest>
    where
        F: Fn(IngestEvent<'_>) + Send + Sync,
    {
        tracing::info!(index = %self.id, "Ingesting batch of {} URLs", urls.len());
        self.pipeline
            .ingest_batch(urls, options, cancel, &observer)
            .await
    }

    /// 단일 문서 추가
    ///
    /// # Returns
    /// 추가된 청크 수
    pub async fn add_document(&self, content: &str, url: &str, title: &str) -> Result<usize> {
        self.pipeline.add_document(content, url, title).await
    }

    /// 유사 청크 검색
    ///
    /// 저장소가 비어 있으면 임베딩 없이 빈 결과를 반환합니다.
    pub async fn search(&self, text: &str) -> Result<Vec<ScoredChunk>> {
        if !self.embedder.is_ready() {
            return Err(crate::error::RagError::NotInitialized);
        }
        if self.store.is_empty() {
            tracing::debug!(index = %self.id, "Search on empty store");
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(text).await?;
        Ok(search(&self.store, &query_embedding, self.search_options))
    }

    /// 검색 + 답변 생성
    pub async fn query(&self, text: &str) -> Result<String> {
        let results = self.search(text).await?;
        tracing::info!(index = %self.id, "Found {} relevant chunks", results.len());
        self.synthesizer.answer(text, &results).await
    }

    /// 현재 상태
    pub fn state(&self) -> RagState {
        RagState {
            ready: self.embedder.is_ready(),
            chunk_count: self.store.count(),
        }
    }

    /// 저장소 통계
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// 전체 청크 삭제 (임베더 상태는 유지)
    pub fn clear(&self) {
        tracing::info!(index = %self.id, "Clearing knowledge base");
        self.store.clear();
    }

    /// 완성 서비스 연결 확인 (서비스가 없으면 `false`)
    pub async fn check_completion(&self) -> bool {
        self.synthesizer.check().await
    }

    /// 임베딩 모델 이름 (초기화 후)
    pub fn embedder_name(&self) -> Option<String> {
        self.embedder.provider_name()
    }

    pub fn crawler_name(&self) -> &str {
        self.pipeline.crawler_name()
    }

    /// 완성 서비스 이름 (설정된 경우)
    pub fn completion_name(&self) -> Option<&str> {
        self.synthesizer.service_name()
    }
}

// ============================================================================
// RagIndexBuilder
// ============================================================================

/// RagIndex 빌더
#[derive(Default)]
pub struct RagIndexBuilder {
    loader: Option<Arc<dyn ModelLoader>>,
    crawler: Option<Arc<dyn SiteCrawler>>,
    completion: Option<Arc<dyn CompletionService>>,
    chunk_config: ChunkConfig,
    search_options: SearchOptions,
}

impl RagIndexBuilder {
    pub fn model_loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn crawler(mut self, crawler: Arc<dyn SiteCrawler>) -> Self {
        self.crawler = Some(crawler);
        self
    }

    pub fn completion(mut self, completion: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn chunk_config(mut self, config: ChunkConfig) -> Self {
        self.chunk_config = config;
        self
    }

    pub fn search_options(mut self, options: SearchOptions) -> Self {
        self.search_options = options;
        self
    }

    pub fn build(self) -> anyhow::Result<RagIndex> {
        let loader = self.loader.context("An embedding model loader is required")?;
        let crawler = self.crawler.context("A site crawler is required")?;

        let id = Uuid::new_v4();
        let embedder = Arc::new(Embedder::new(loader));
        let store = Arc::new(DocumentStore::new());
        let pipeline = IngestPipeline::new(
            embedder.clone(),
            store.clone(),
            crawler,
            Arc::new(WordWindowChunker::new(self.chunk_config)),
        );

        tracing::debug!(index = %id, "Created RAG index");

        Ok(RagIndex {
            id,
            embedder,
            store,
            pipeline,
            synthesizer: match self.completion {
                Some(service) => AnswerSynthesizer::new(service),
                None => AnswerSynthesizer::without_service(),
            },
            search_options: self.search_options,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
