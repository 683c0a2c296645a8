//! 수집 파이프라인 - 크롤 → 청킹 → 임베딩 → 저장
//!
//! URL마다 상태 머신을 따라 진행합니다:
//! `Pending → Crawling → Processing → Done | Error`
//!
//! 배치 수집은 URL을 순서대로 처리하며, 한 URL의 실패가 다른 URL에
//! 영향을 주지 않습니다. 취소는 페이지/청크 사이에서 협력적으로 확인합니다.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embedding::Embedder;
use crate::error::{ErrorKind, RagError, Result};
use crate::knowledge::{exceeds_min_length, Chunker, DocumentStore, MIN_CONTENT_LENGTH};

pub use crate::crawler::CrawlOptions;
use crate::crawler::SiteCrawler;

// ============================================================================
// Types
// ============================================================================

/// 한 URL의 수집 결과 요약
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub url: String,
    /// 크롤러가 반환한 페이지 수
    pub pages_found: usize,
    /// 청크가 만들어진 페이지 수
    pub pages_indexed: usize,
    /// 본문이 너무 짧아 건너뛴 페이지 수
    pub pages_skipped: usize,
    pub chunks_added: usize,
    /// 크롤이 시간 초과로 일부만 완료됨
    pub partial: bool,
    pub finished_at: DateTime<Utc>,
}

/// URL별 수집 상태
#[derive(Debug, Clone, PartialEq)]
pub enum UrlStatus {
    Pending,
    Crawling,
    Processing { pages: usize },
    Done(IngestReport),
    Error { message: String, kind: ErrorKind },
}

impl UrlStatus {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, UrlStatus::Done(_) | UrlStatus::Error { .. })
    }

    fn from_error(err: &RagError) -> Self {
        UrlStatus::Error {
            message: err.to_string(),
            kind: err.kind(),
        }
    }
}

/// 배치 수집의 URL별 최종 결과
#[derive(Debug, Clone, PartialEq)]
pub struct UrlIngest {
    pub url: String,
    pub status: UrlStatus,
}

/// 관찰자에게 전달되는 이벤트
#[derive(Debug, Clone, Copy)]
pub enum IngestEvent<'a> {
    /// 상태 전이
    Status { url: &'a str, status: &'a UrlStatus },
    /// 페이지 처리 시작 (`index`는 1부터)
    Page {
        url: &'a str,
        index: usize,
        total: usize,
        title: &'a str,
    },
}

/// 이벤트 관찰자
pub type Observer<'a> = &'a (dyn Fn(IngestEvent<'_>) + Send + Sync);

/// 아무것도 하지 않는 관찰자
pub fn ignore_events(_event: IngestEvent<'_>) {}

/// 협력적 취소 플래그
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RagError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// IngestPipeline
// ============================================================================

/// 수집 파이프라인
pub struct IngestPipeline {
    embedder: Arc<Embedder>,
    store: Arc<DocumentStore>,
    crawler: Arc<dyn SiteCrawler>,
    chunker: Arc<dyn Chunker>,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<Embedder>,
        store: Arc<DocumentStore>,
        crawler: Arc<dyn SiteCrawler>,
        chunker: Arc<dyn Chunker>,
    ) -> Self {
        Self {
            embedder,
            store,
            crawler,
            chunker,
        }
    }

    /// 크롤러 이름
    pub fn crawler_name(&self) -> &str {
        self.crawler.name()
    }

    /// 단일 사이트 수집
    ///
    /// 임베더 준비 여부를 크롤 전에 확인합니다. 이미 저장된 청크는
    /// 중간에 실패하거나 취소되어도 그대로 남습니다.
    pub async fn ingest_site(
        &self,
        url: &str,
        options: &CrawlOptions,
        cancel: &CancelFlag,
        observer: Observer<'_>,
    ) -> Result<IngestReport> {
        if !self.embedder.is_ready() {
            return Err(RagError::NotInitialized);
        }
        cancel.check()?;

        observer(IngestEvent::Status {
            url,
            status: &UrlStatus::Crawling,
        });
        tracing::info!("Crawling {} with {}", url, self.crawler.name());

        let crawl = self
            .crawler
            .crawl(url, options)
            .await
            .map_err(|e| RagError::crawl_transport(url, e))?;

        if crawl.pages.is_empty() {
            return Err(RagError::EmptyCrawl {
                url: url.to_string(),
            });
        }
        if let Some(message) = &crawl.message {
            tracing::warn!("{}: {}", url, message);
        }

        let total = crawl.pages.len();
        observer(IngestEvent::Status {
            url,
            status: &UrlStatus::Processing { pages: total },
        });

        let mut pages_indexed = 0;
        let mut pages_skipped = 0;
        let mut chunks_added = 0;

        for (i, page) in crawl.pages.iter().enumerate() {
            cancel.check()?;

            let source_url = if page.url.trim().is_empty() {
                url
            } else {
                page.url.as_str()
            };
            let title = if page.title.trim().is_empty() {
                source_url
            } else {
                page.title.as_str()
            };

            observer(IngestEvent::Page {
                url,
                index: i + 1,
                total,
                title,
            });

            if !exceeds_min_length(&page.text, MIN_CONTENT_LENGTH) {
                tracing::debug!("Skipping short page: {}", source_url);
                pages_skipped += 1;
                continue;
            }

            let added = self.index_text(&page.text, source_url, title, cancel).await?;
            if added > 0 {
                pages_indexed += 1;
            }
            chunks_added += added;
        }

        let report = IngestReport {
            url: url.to_string(),
            pages_found: total,
            pages_indexed,
            pages_skipped,
            chunks_added,
            partial: crawl.is_partial(),
            finished_at: Utc::now(),
        };

        tracing::info!(
            "Indexed {}: {} chunks from {}/{} pages{}",
            url,
            report.chunks_added,
            report.pages_indexed,
            report.pages_found,
            if report.partial { " (partial)" } else { "" }
        );
        Ok(report)
    }

    /// URL 배치 수집 (에러를 반환하지 않음)
    ///
    /// 중복 URL은 첫 번째만 처리합니다.
    /// 취소되면 현재 URL과 남은 URL 모두 `Cancelled` 에러 상태로 끝납니다.
    pub async fn ingest_batch(
        &self,
        urls: &[String],
        options: &CrawlOptions,
        cancel: &CancelFlag,
        observer: Observer<'_>,
    ) -> Vec<UrlIngest> {
        let mut seen = HashSet::new();
        let urls: Vec<&str> = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| {
                let first = seen.insert(*u);
                if !first {
                    tracing::debug!("Skipping duplicate URL: {}", u);
                }
                first
            })
            .collect();

        for &url in &urls {
            observer(IngestEvent::Status {
                url,
                status: &UrlStatus::Pending,
            });
        }

        let mut results = Vec::with_capacity(urls.len());

        for &url in &urls {
            let status = match self.ingest_site(url, options, cancel, observer).await {
                Ok(report) => UrlStatus::Done(report),
                Err(e) => {
                    tracing::warn!("Failed to ingest {}: {}", url, e);
                    UrlStatus::from_error(&e)
                }
            };

            observer(IngestEvent::Status {
                url,
                status: &status,
            });
            results.push(UrlIngest {
                url: url.to_string(),
                status,
            });
        }

        let succeeded = results
            .iter()
            .filter(|r| matches!(r.status, UrlStatus::Done(_)))
            .count();
        tracing::info!("Batch finished: {}/{} URLs indexed", succeeded, urls.len());

        results
    }

    /// 단일 문서 추가 (크롤 없이)
    ///
    /// # Returns
    /// 추가된 청크 수 (본문이 너무 짧으면 0)
    pub async fn add_document(&self, content: &str, url: &str, title: &str) -> Result<usize> {
        if !self.embedder.is_ready() {
            return Err(RagError::NotInitialized);
        }
        if !exceeds_min_length(content, MIN_CONTENT_LENGTH) {
            tracing::debug!("Document from {} too short, skipping", url);
            return Ok(0);
        }

        let title = if title.trim().is_empty() { url } else { title };
        self.index_text(content, url, title, &CancelFlag::new()).await
    }

    /// 텍스트 청킹 → 임베딩 → 저장 (청크 순서대로 하나씩)
    async fn index_text(
        &self,
        text: &str,
        source_url: &str,
        title: &str,
        cancel: &CancelFlag,
    ) -> Result<usize> {
        let chunks = self.chunker.chunk(text);
        let mut added = 0;

        for chunk in chunks {
            cancel.check()?;

            if !exceeds_min_length(&chunk, MIN_CONTENT_LENGTH) {
                continue;
            }

            let embedding = self.embedder.embed(&chunk).await?;
            let id = self.store.add_chunk(chunk, source_url, title, embedding)?;
            tracing::debug!("Stored chunk {}", id);
            added += 1;
        }

        Ok(added)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{CrawlResult, CrawledPage};
    use crate::knowledge::WordWindowChunker;
    use crate::test_support::{page, words, FakeCrawler, KeywordLoader};
    use std::sync::atomic::Ordering as AtomicOrdering;
    use std::sync::Mutex;

    type Fixture = (IngestPipeline, Arc<DocumentStore>, Arc<FakeCrawler>);

    async fn pipeline_with(crawler: FakeCrawler) -> Fixture {
        let embedder = Arc::new(Embedder::new(Arc::new(KeywordLoader::default())));
        embedder.initialize(|_, _| {}).await.unwrap();
        let store = Arc::new(DocumentStore::new());
        let crawler = Arc::new(crawler);
        let pipeline = IngestPipeline::new(
            embedder,
            store.clone(),
            crawler.clone(),
            Arc::new(WordWindowChunker::with_defaults()),
        );
        (pipeline, store, crawler)
    }

    async fn ingest(pipeline: &IngestPipeline, url: &str) -> Result<IngestReport> {
        pipeline
            .ingest_site(url, &CrawlOptions::default(), &CancelFlag::new(), &ignore_events)
            .await
    }

    fn site(url: &str, title: &str, word: &str) -> Vec<CrawledPage> {
        vec![page(url, title, &words(word, 20))]
    }

    #[tokio::test]
    async fn test_not_initialized_checked_before_crawl() {
        let crawler = Arc::new(FakeCrawler::new());
        let pipeline = IngestPipeline::new(
            Arc::new(Embedder::new(Arc::new(KeywordLoader::default()))),
            Arc::new(DocumentStore::new()),
            crawler.clone(),
            Arc::new(WordWindowChunker::with_defaults()),
        );

        let err = ingest(&pipeline, "https://a.example").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
        assert_eq!(crawler.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ingest_site_counts_pages() {
        let crawler = FakeCrawler::new().with_pages(
            "https://shop.example",
            vec![
                page("https://shop.example/refunds", "Refunds", &words("refund", 30)),
                page("https://shop.example/empty", "Empty", "too short"),
                page("https://shop.example/ship", "Shipping", &words("shipping", 1200)),
            ],
        );
        let (pipeline, store, _) = pipeline_with(crawler).await;

        let report = ingest(&pipeline, "https://shop.example").await.unwrap();

        assert_eq!(report.pages_found, 3);
        assert_eq!(report.pages_skipped, 1);
        assert_eq!(report.pages_indexed, 2);
        // 30단어 1개 + 1200단어 3개
        assert_eq!(report.chunks_added, 4);
        assert!(!report.partial);
        assert_eq!(store.count(), 4);

        let ids: Vec<String> = store.all().iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids[0], "https://shop.example/refunds-0");
        assert_eq!(ids[3], "https://shop.example/ship-2");
    }

    #[tokio::test]
    async fn test_empty_crawl_is_error() {
        let (pipeline, _, _) = pipeline_with(FakeCrawler::new()).await;
        let err = ingest(&pipeline, "https://nothing.example").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyCrawl);
    }

    #[tokio::test]
    async fn test_partial_crawl_still_done() {
        let crawler = FakeCrawler::new().with_result(
            "https://slow.example",
            CrawlResult::partial(
                vec![page("https://slow.example", "Slow", &words("warehouse", 40))],
                "Crawl timed out, returning partial results",
            ),
        );
        let (pipeline, _, _) = pipeline_with(crawler).await;

        let report = ingest(&pipeline, "https://slow.example").await.unwrap();
        assert!(report.partial);
        assert_eq!(report.chunks_added, 1);
    }

    #[tokio::test]
    async fn test_title_falls_back_to_url() {
        let crawler = FakeCrawler::new().with_pages(
            "https://a.example",
            vec![page("https://a.example/page", "  ", &words("salary", 20))],
        );
        let (pipeline, store, _) = pipeline_with(crawler).await;

        ingest(&pipeline, "https://a.example").await.unwrap();
        assert_eq!(store.all()[0].title, "https://a.example/page");
    }

    #[tokio::test]
    async fn test_batch_emits_transitions_in_order() {
        let crawler = FakeCrawler::new()
            .with_pages("https://good.example", site("https://good.example", "Good", "policy"))
            .with_failure("https://bad.example", "connection refused");
        let (pipeline, _, _) = pipeline_with(crawler).await;

        let log = Mutex::new(Vec::new());
        let observer = |event: IngestEvent<'_>| {
            if let IngestEvent::Status { url, status } = event {
                let label = match status {
                    UrlStatus::Pending => "pending",
                    UrlStatus::Crawling => "crawling",
                    UrlStatus::Processing { .. } => "processing",
                    UrlStatus::Done(_) => "done",
                    UrlStatus::Error { .. } => "error",
                };
                log.lock().unwrap().push(format!("{} {}", url, label));
            }
        };

        let urls = vec!["https://good.example".to_string(), "https://bad.example".to_string()];
        let results = pipeline
            .ingest_batch(&urls, &CrawlOptions::default(), &CancelFlag::new(), &observer)
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status.is_terminal()));
        assert_eq!(
            log.into_inner().unwrap(),
            vec![
                "https://good.example pending",
                "https://bad.example pending",
                "https://good.example crawling",
                "https://good.example processing",
                "https://good.example done",
                "https://bad.example crawling",
                "https://bad.example error",
            ]
        );
    }

    #[tokio::test]
    async fn test_batch_skips_duplicate_urls() {
        let crawler = FakeCrawler::new()
            .with_pages("https://a.example", site("https://a.example", "A", "refund"))
            .with_pages("https://b.example", site("https://b.example", "B", "shipping"));
        let (pipeline, store, crawler) = pipeline_with(crawler).await;

        let urls = vec![
            "https://a.example".to_string(),
            "https://b.example".to_string(),
            " https://a.example ".to_string(),
        ];
        let results = pipeline
            .ingest_batch(&urls, &CrawlOptions::default(), &CancelFlag::new(), &ignore_events)
            .await;

        let processed: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(processed, vec!["https://a.example", "https://b.example"]);
        assert_eq!(crawler.calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(store.count(), 2);
    }

    #[tokio::test]
    async fn test_page_events() {
        let crawler = FakeCrawler::new().with_pages(
            "https://a.example",
            vec![
                page("https://a.example/1", "One", &words("return", 20)),
                page("https://a.example/2", "Two", &words("refund", 20)),
            ],
        );
        let (pipeline, _, _) = pipeline_with(crawler).await;

        let pages = Mutex::new(Vec::new());
        let observer = |event: IngestEvent<'_>| {
            if let IngestEvent::Page { index, total, title, .. } = event {
                pages.lock().unwrap().push((index, total, title.to_string()));
            }
        };
        let options = CrawlOptions::default();
        pipeline
            .ingest_site("https://a.example", &options, &CancelFlag::new(), &observer)
            .await
            .unwrap();

        assert_eq!(
            pages.into_inner().unwrap(),
            vec![(1, 2, "One".to_string()), (2, 2, "Two".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cancel_before_batch_skips_crawling() {
        let crawler = FakeCrawler::new()
            .with_pages("https://a.example", site("https://a.example", "A", "days"));
        let (pipeline, store, crawler) = pipeline_with(crawler).await;

        let cancel = CancelFlag::new();
        cancel.cancel();
        let urls = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let results = pipeline
            .ingest_batch(&urls, &CrawlOptions::default(), &cancel, &ignore_events)
            .await;

        for result in &results {
            match &result.status {
                UrlStatus::Error { kind, .. } => assert_eq!(*kind, ErrorKind::Cancelled),
                other => panic!("expected cancelled, got {:?}", other),
            }
        }
        assert_eq!(crawler.calls.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(store.count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_crawl_stops_remaining_urls() {
        let cancel = CancelFlag::new();
        let crawler = FakeCrawler::new()
            .with_pages("https://a.example", site("https://a.example", "A", "days"))
            .with_pages("https://b.example", site("https://b.example", "B", "days"))
            .cancelling(cancel.clone());
        let (pipeline, store, crawler) = pipeline_with(crawler).await;

        let urls = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let results = pipeline
            .ingest_batch(&urls, &CrawlOptions::default(), &cancel, &ignore_events)
            .await;

        assert!(results
            .iter()
            .all(|r| matches!(r.status, UrlStatus::Error { kind: ErrorKind::Cancelled, .. })));
        assert_eq!(crawler.calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(store.count(), 0);
    }

    #[tokio::test]
    async fn test_add_document() {
        let (pipeline, store, _) = pipeline_with(FakeCrawler::new()).await;

        let added = pipeline
            .add_document(&words("careers", 600), "https://jobs.example", "")
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(store.count(), 2);
        assert_eq!(store.all()[0].title, "https://jobs.example");

        let skipped = pipeline
            .add_document("short", "https://jobs.example", "Jobs")
            .await
            .unwrap();
        assert_eq!(skipped, 0);
    }
}
