//! 웹 스크래퍼 - 직접 HTML을 가져오는 로컬 크롤러
//!
//! 페이지에서 제목과 본문 텍스트를 추출하고, 같은 호스트의 링크를
//! 너비 우선으로 따라갑니다. 외부 크롤링 서비스 없이 동작합니다.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use super::{normalize_url, CrawlOptions, CrawlResult, CrawledPage, PathFilter, SiteCrawler};

/// 본문 후보 선택자 (우선순위 순)
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=main]",
    ".content",
    "#content",
    "body",
];

/// 텍스트 추출에서 제외할 요소
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "form", "svg", "button",
    "template", "iframe",
];

/// 본문 후보로 인정할 최소 텍스트 길이
const MIN_MAIN_CONTENT: usize = 100;

/// 전체 크롤 최대 시간
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

// ============================================================================
// WebScraper
// ============================================================================

/// 웹 스크래퍼
pub struct WebScraper {
    client: reqwest::Client,
    max_wait: Duration,
}

impl WebScraper {
    /// 새 스크래퍼 생성
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("autoverse-rag/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            max_wait: DEFAULT_MAX_WAIT,
        })
    }

    /// 크롤 전체 데드라인 변경
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// 단일 페이지 HTML 가져오기
    async fn fetch_html(&self, url: &Url) -> Result<String> {
        tracing::info!("Scraping: {}", url);

        let response = self
            .client
            .get(url.as_str())
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Failed to fetch URL: {}", status);
        }

        let html = response.text().await.context("Failed to read response body")?;
        tracing::debug!("Fetched {} bytes from {}", html.len(), url);
        Ok(html)
    }

    /// HTML 파싱 → 페이지 + 링크
    ///
    /// `Html`은 `Send`가 아니므로 await 지점 밖에서 동기적으로 처리합니다.
    fn parse_page(url: &Url, html: &str) -> (CrawledPage, Vec<Url>) {
        let document = Html::parse_document(html);

        let page = CrawledPage {
            url: url.to_string(),
            title: extract_title(&document).unwrap_or_else(|| url.to_string()),
            text: extract_content(&document),
        };
        let links = extract_links(&document, url);

        (page, links)
    }
}

#[async_trait]
impl SiteCrawler for WebScraper {
    async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResult> {
        let seed = normalize_url(url)?;
        let filter = PathFilter::new(options)?;
        let deadline = tokio::time::Instant::now() + self.max_wait;

        let mut queue: VecDeque<(Url, usize)> = VecDeque::from([(seed.clone(), 0)]);
        let mut seen: HashSet<String> = HashSet::from([seed.to_string()]);
        let mut pages = Vec::new();

        while let Some((page_url, depth)) = queue.pop_front() {
            if pages.len() >= options.page_limit {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("Crawl of {} hit its deadline after {} pages", seed, pages.len());
                return Ok(CrawlResult::partial(
                    pages,
                    "Crawl timed out, returning partial results",
                ));
            }

            let html = match self.fetch_html(&page_url).await {
                Ok(html) => html,
                Err(e) if depth == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping {}: {:#}", page_url, e);
                    continue;
                }
            };

            let (page, links) = Self::parse_page(&page_url, &html);

            if depth < options.max_depth {
                for link in links {
                    if same_site(&seed, &link)
                        && filter.allows(link.path())
                        && seen.insert(link.to_string())
                    {
                        queue.push_back((link, depth + 1));
                    }
                }
            }

            pages.push(page);
        }

        tracing::info!("Crawled {} pages from {}", pages.len(), seed);
        Ok(CrawlResult::completed(pages))
    }

    fn name(&self) -> &str {
        "local"
    }
}

// ============================================================================
// Extraction Helpers
// ============================================================================

/// 제목 추출: `<title>` → `<h1>`
fn extract_title(document: &Html) -> Option<String> {
    for selector_str in ["title", "h1"] {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let title = collapse_whitespace(&element.text().collect::<String>());
                if !title.is_empty() {
                    return Some(title);
                }
            }
        }
    }
    None
}

/// 본문 추출 (우선순위: article > main > .content > body)
fn extract_content(document: &Html) -> String {
    let mut fallback = None;

    for selector_str in CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = extract_text_from_element(element);
                if text.len() > MIN_MAIN_CONTENT {
                    return text;
                }
                if *selector_str == "body" {
                    fallback = Some(text);
                }
            }
        }
    }

    fallback.unwrap_or_default()
}

/// 요소에서 텍스트 추출 (스크립트/내비게이션 등 제외)
fn extract_text_from_element(element: ElementRef) -> String {
    let mut parts = Vec::new();
    collect_text(element, &mut parts);
    collapse_whitespace(&parts.join(" "))
}

fn collect_text<'a>(element: ElementRef<'a>, parts: &mut Vec<&'a str>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed);
                }
            }
            Node::Element(el) if !SKIPPED_TAGS.contains(&el.name()) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, parts);
                }
            }
            _ => {}
        }
    }
}

/// 연속 공백 정리
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 문서의 링크를 절대 URL로 변환 (프래그먼트 제거, http/https만)
fn extract_links(document: &Html, base: &Url) -> Vec<Url> {
    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return vec![],
    };

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url
        })
        .collect()
}

/// 같은 호스트(및 포트)인지
fn same_site(seed: &Url, candidate: &Url) -> bool {
    seed.host_str() == candidate.host_str()
        && seed.port_or_known_default() == candidate.port_or_known_default()
}

// ============================================================================
// Tests
// ============================================================================
