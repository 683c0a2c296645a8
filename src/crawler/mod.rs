//! 크롤러 모듈 - 사이트 크롤링 협력자
//!
//! 코어는 [`SiteCrawler`] 트레이트에만 의존합니다. 구현체:
//! - [`FirecrawlCrawler`]: Firecrawl v1 API (작업 시작 → 폴링)
//! - [`WebScraper`]: 직접 HTML을 가져오는 동일 호스트 BFS 크롤러

mod firecrawl;
mod web;

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use url::Url;

pub use firecrawl::FirecrawlCrawler;
pub use web::WebScraper;

/// 기본 페이지 수 한도
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// 기본 최대 깊이
pub const DEFAULT_MAX_DEPTH: usize = 3;

// ============================================================================
// Types
// ============================================================================

/// 크롤 옵션
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    /// 최대 페이지 수
    pub page_limit: usize,
    /// 시드에서의 최대 링크 깊이
    pub max_depth: usize,
    /// 포함할 경로 패턴 (정규식, 비어있으면 전체)
    pub include_paths: Vec<String>,
    /// 제외할 경로 패턴 (정규식)
    pub exclude_paths: Vec<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            max_depth: DEFAULT_MAX_DEPTH,
            include_paths: vec![],
            exclude_paths: vec![],
        }
    }
}

/// 크롤된 페이지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledPage {
    /// 페이지 URL
    pub url: String,
    /// 페이지 제목 (없으면 URL)
    pub title: String,
    /// 추출된 본문 텍스트
    pub text: String,
}

/// 크롤 완료 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStatus {
    /// 정상 완료
    Completed,
    /// 시간 초과 등으로 일부 결과만 반환
    Partial,
}

/// 크롤 결과
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub status: CrawlStatus,
    pub pages: Vec<CrawledPage>,
    pub message: Option<String>,
}

impl CrawlResult {
    pub fn completed(pages: Vec<CrawledPage>) -> Self {
        Self {
            status: CrawlStatus::Completed,
            pages,
            message: None,
        }
    }

    pub fn partial(pages: Vec<CrawledPage>, message: impl Into<String>) -> Self {
        Self {
            status: CrawlStatus::Partial,
            pages,
            message: Some(message.into()),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.status == CrawlStatus::Partial
    }
}

// ============================================================================
// SiteCrawler Trait
// ============================================================================

/// 사이트 크롤러 트레이트
///
/// 존재하는 것보다 많은 페이지를 요청해도 에러 없이 더 적게 반환해야 합니다.
/// 실패는 사람이 읽을 수 있는 메시지를 담은 `Err`로 반환합니다.
#[async_trait]
pub trait SiteCrawler: Send + Sync {
    async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResult>;

    /// 크롤러 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Polling
// ============================================================================

/// 폴링 한 번의 결과
#[derive(Debug)]
pub enum PollStep<T> {
    Pending,
    Done(T),
    Failed(String),
}

/// 폴링 루프 최종 결과
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Completed(T),
    Failed(String),
    TimedOut,
}

/// 고정 간격 + 하드 데드라인 폴링 루프
///
/// 매 반복마다 `interval`만큼 기다린 뒤 `check`를 호출합니다.
/// `deadline`이 지나면 `TimedOut`을 반환합니다.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    deadline: Duration,
    mut check: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStep<T>>>,
{
    let start = tokio::time::Instant::now();
    let mut attempts = 0u32;

    while start.elapsed() < deadline {
        tokio::time::sleep(interval).await;
        attempts += 1;

        match check().await? {
            PollStep::Pending => {
                tracing::debug!("Poll attempt {} pending", attempts);
            }
            PollStep::Done(value) => return Ok(PollOutcome::Completed(value)),
            PollStep::Failed(message) => return Ok(PollOutcome::Failed(message)),
        }
    }

    tracing::warn!("Polling timed out after {:?} ({} attempts)", deadline, attempts);
    Ok(PollOutcome::TimedOut)
}

// ============================================================================
// URL Helpers
// ============================================================================

/// URL 정규화
///
/// 앞뒤 공백을 제거하고, 스킴이 없으면 `https://`를 붙이며,
/// http/https만 허용합니다.
pub fn normalize_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    anyhow::ensure!(!trimmed.is_empty(), "URL is required");

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate).with_context(|| format!("Invalid URL provided: {}", raw))?;
    anyhow::ensure!(
        matches!(url.scheme(), "http" | "https"),
        "Invalid protocol: {}",
        url.scheme()
    );
    anyhow::ensure!(url.host_str().is_some(), "URL has no host: {}", raw);

    Ok(url)
}

/// 경로 필터 (include/exclude 정규식)
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PathFilter {
    pub fn new(options: &CrawlOptions) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| Regex::new(p).with_context(|| format!("Invalid path pattern: {}", p)))
                .collect()
        };

        Ok(Self {
            include: compile(&options.include_paths)?,
            exclude: compile(&options.exclude_paths)?,
        })
    }

    /// 경로 허용 여부
    pub fn allows(&self, path: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(path))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_normalize_url_adds_scheme() {
        let url = normalize_url("  example.com/docs ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/docs");
    }

    #[test]
    fn test_normalize_url_keeps_http() {
        let url = normalize_url("http://example.com").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn test_normalize_url_rejects_garbage() {
        assert!(normalize_url("").is_err());
        assert!(normalize_url("   ").is_err());
        assert!(normalize_url("https://").is_err());
    }

    #[test]
    fn test_path_filter() {
        let options = CrawlOptions {
            include_paths: vec!["^/docs".to_string()],
            exclude_paths: vec!["/private".to_string()],
            ..Default::default()
        };
        let filter = PathFilter::new(&options).unwrap();
        assert!(filter.allows("/docs/intro"));
        assert!(!filter.allows("/blog/post"));
        assert!(!filter.allows("/docs/private/keys"));

        let open = PathFilter::new(&CrawlOptions::default()).unwrap();
        assert!(open.allows("/anything"));
    }

    #[test]
    fn test_path_filter_invalid_pattern() {
        let options = CrawlOptions {
            include_paths: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(PathFilter::new(&options).is_err());
    }

    #[test]
    fn test_crawl_options_default() {
        let options = CrawlOptions::default();
        assert_eq!(options.page_limit, 20);
        assert_eq!(options.max_depth, 3);
    }

    #[tokio::test]
    async fn test_poll_until_completes() {
        let calls = AtomicUsize::new(0);
        let outcome = poll_until(Duration::from_millis(1), Duration::from_secs(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Ok(PollStep::Pending)
                } else {
                    Ok(PollStep::Done(n))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Completed(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_failed() {
        let outcome: PollOutcome<()> =
            poll_until(Duration::from_millis(1), Duration::from_secs(5), || async {
                Ok(PollStep::Failed("Crawl failed".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Failed("Crawl failed".to_string()));
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let outcome: PollOutcome<()> =
            poll_until(Duration::from_millis(5), Duration::from_millis(20), || async {
                Ok(PollStep::Pending)
            })
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_poll_until_propagates_errors() {
        let result: Result<PollOutcome<()>> =
            poll_until(Duration::from_millis(1), Duration::from_secs(5), || async {
                Err(anyhow::anyhow!("status request failed"))
            })
            .await;
        assert!(result.is_err());
    }
}
