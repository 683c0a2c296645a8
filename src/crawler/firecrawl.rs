//! Firecrawl 크롤러 - Firecrawl v1 API 클라이언트
//!
//! 크롤 작업을 시작한 뒤 작업 상태를 고정 간격으로 폴링합니다.
//! 데드라인을 넘기면 마지막으로 한 번 더 조회해서 부분 결과를 반환합니다.
//! ref: https://docs.firecrawl.dev/api-reference/endpoint/crawl-post

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http::ApiReply;

use super::{
    normalize_url, poll_until, CrawlOptions, CrawlResult, CrawledPage, PollOutcome, PollStep,
    SiteCrawler,
};

/// 폴링 간격
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// 최대 대기 시간
const MAX_WAIT: Duration = Duration::from_secs(60);

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlRequest<'a> {
    url: &'a str,
    limit: usize,
    max_depth: usize,
    #[serde(skip_serializing_if = "no_paths")]
    include_paths: &'a [String],
    #[serde(skip_serializing_if = "no_paths")]
    exclude_paths: &'a [String],
    scrape_options: ScrapeOptions,
}

fn no_paths(paths: &&[String]) -> bool {
    paths.is_empty()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeOptions {
    formats: Vec<&'static str>,
    only_main_content: bool,
}

/// 크롤 시작 응답
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    data: Option<Vec<FirecrawlPage>>,
}

/// 작업 상태 응답
#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    data: Vec<FirecrawlPage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FirecrawlPage {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    metadata: Option<PageMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "sourceURL")]
    source_url: Option<String>,
}

impl FirecrawlPage {
    /// 제목: metadata.title → metadata.sourceURL → 시드 URL
    fn into_page(self, seed_url: &str) -> CrawledPage {
        let metadata = self.metadata.unwrap_or(PageMetadata {
            title: None,
            source_url: None,
        });
        let source_url = metadata
            .source_url
            .filter(|u| !u.trim().is_empty());
        let title = metadata
            .title
            .filter(|t| !t.trim().is_empty())
            .or_else(|| source_url.clone())
            .unwrap_or_else(|| seed_url.to_string());

        CrawledPage {
            url: source_url.unwrap_or_else(|| seed_url.to_string()),
            title,
            text: self.markdown.unwrap_or_default(),
        }
    }
}

fn into_pages(pages: Vec<FirecrawlPage>, seed_url: &str) -> Vec<CrawledPage> {
    pages.into_iter().map(|p| p.into_page(seed_url)).collect()
}

// ============================================================================
// FirecrawlCrawler
// ============================================================================

/// Firecrawl API 크롤러
pub struct FirecrawlCrawler {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl FirecrawlCrawler {
    /// 새 크롤러 생성
    pub fn new(api_key: String, base_url: &str) -> Result<Self> {
        anyhow::ensure!(
            !api_key.trim().is_empty(),
            "Firecrawl connector not configured. Set FIRECRAWL_API_KEY."
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: POLL_INTERVAL,
            max_wait: MAX_WAIT,
        })
    }

    /// 폴링 간격/최대 대기 시간 변경
    pub fn with_polling(mut self, interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = interval;
        self.max_wait = max_wait;
        self
    }

    async fn start(&self, url: &str, options: &CrawlOptions) -> Result<StartResponse> {
        let request = CrawlRequest {
            url,
            limit: options.page_limit,
            max_depth: options.max_depth,
            include_paths: &options.include_paths,
            exclude_paths: &options.exclude_paths,
            scrape_options: ScrapeOptions {
                formats: vec!["markdown"],
                only_main_content: true,
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/crawl", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Firecrawl request failed")?;

        let body = ApiReply::read(response).await?.into_body("Firecrawl")?;
        serde_json::from_str(&body).context("Failed to parse Firecrawl crawl response")
    }

    async fn job_status(&self, job_id: &str) -> Result<StatusResponse> {
        let response = self
            .client
            .get(format!("{}/v1/crawl/{}", self.base_url, job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Firecrawl status request failed")?;

        let body = ApiReply::read(response).await?.into_body("Firecrawl")?;
        serde_json::from_str(&body).context("Failed to parse Firecrawl status response")
    }
}

#[async_trait]
impl SiteCrawler for FirecrawlCrawler {
    async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResult> {
        let seed = normalize_url(url)?;
        let seed = seed.as_str();
        tracing::info!(
            "Crawling {} with Firecrawl (limit: {}, depth: {})",
            seed,
            options.page_limit,
            options.max_depth
        );

        let started = self.start(seed, options).await?;

        let job_id = match started.id.or(started.job_id) {
            Some(id) => id,
            None => {
                // 작업 ID 없이 바로 결과가 온 경우
                let pages = into_pages(started.data.unwrap_or_default(), seed);
                tracing::info!("Crawl completed directly with {} pages", pages.len());
                return Ok(CrawlResult::completed(pages));
            }
        };
        tracing::info!("Crawl job started with ID: {}", job_id);

        let outcome = poll_until(self.poll_interval, self.max_wait, || async {
            let status = self.job_status(&job_id).await?;
            tracing::debug!(
                "Crawl status: {} (completed: {:?}, total: {:?})",
                status.status,
                status.completed,
                status.total
            );
            Ok(match status.status.as_str() {
                "completed" => PollStep::Done(status.data),
                "failed" => PollStep::Failed(
                    status.error.unwrap_or_else(|| "Crawl failed".to_string()),
                ),
                _ => PollStep::Pending,
            })
        })
        .await?;

        match outcome {
            PollOutcome::Completed(data) => {
                let pages = into_pages(data, seed);
                tracing::info!("Crawl completed successfully with {} pages", pages.len());
                Ok(CrawlResult::completed(pages))
            }
            PollOutcome::Failed(message) => bail!("{}", message),
            PollOutcome::TimedOut => {
                let last = self.job_status(&job_id).await?;
                let pages = into_pages(last.data, seed);
                tracing::warn!(
                    "Crawl timed out, returning {} partial results",
                    pages.len()
                );
                Ok(CrawlResult::partial(
                    pages,
                    "Crawl timed out, returning partial results",
                ))
            }
        }
    }

    fn name(&self) -> &str {
        "firecrawl"
    }
}

// ============================================================================
// Tests
// ============================================================================
