//! 설정 모듈 - 환경변수 기반 구성
//!
//! API 키와 엔드포인트는 환경변수에서 읽고, 나머지는 기본값을 사용합니다.
//! CLI 플래그가 있으면 그 값이 우선합니다.

use std::path::PathBuf;

use crate::crawler::CrawlOptions;
use crate::knowledge::{ChunkConfig, SearchOptions};

// ============================================================================
// Environment Variables
// ============================================================================

/// Firecrawl API 키
pub const FIRECRAWL_API_KEY_VARS: &[&str] = &["FIRECRAWL_API_KEY"];

/// 완성 서비스(AI 게이트웨이) API 키 - 우선순위 순서
pub const COMPLETION_API_KEY_VARS: &[&str] = &["LOVABLE_API_KEY", "AI_GATEWAY_API_KEY"];

/// Gemini 임베딩 API 키 - 우선순위 순서
pub const GEMINI_API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

/// 완성 서비스 엔드포인트 오버라이드
pub const COMPLETION_URL_VAR: &str = "AUTOVERSE_COMPLETION_URL";

/// 완성 모델 오버라이드
pub const COMPLETION_MODEL_VAR: &str = "AUTOVERSE_COMPLETION_MODEL";

/// 모델 캐시 디렉토리 오버라이드
pub const MODEL_CACHE_VAR: &str = "AUTOVERSE_MODEL_CACHE";

/// URL당 기본 페이지 수 오버라이드
pub const CRAWL_LIMIT_VAR: &str = "AUTOVERSE_CRAWL_LIMIT";

/// 기본 링크 깊이 오버라이드
pub const CRAWL_DEPTH_VAR: &str = "AUTOVERSE_CRAWL_DEPTH";

/// 기본 완성 엔드포인트 (OpenAI 호환 chat completions)
pub const DEFAULT_COMPLETION_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";

/// 기본 완성 모델
pub const DEFAULT_COMPLETION_MODEL: &str = "google/gemini-2.5-flash";

/// 기본 Firecrawl API 베이스
pub const DEFAULT_FIRECRAWL_URL: &str = "https://api.firecrawl.dev";

// ============================================================================
// RagConfig
// ============================================================================

/// RAG 엔진 전체 설정
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 검색 설정 (top-k, 유사도 하한)
    pub search: SearchOptions,
    /// 기본 크롤 옵션 (CLI의 --limit/--depth가 없을 때 사용)
    pub crawl: CrawlOptions,
    /// 로컬 임베딩 모델 캐시 디렉토리
    pub model_cache_dir: PathBuf,
    /// 완성 서비스 엔드포인트
    pub completion_url: String,
    /// 완성 모델
    pub completion_model: String,
    /// 완성 서비스 API 키
    pub completion_api_key: Option<String>,
    /// Firecrawl API 베이스 URL
    pub firecrawl_url: String,
    /// Firecrawl API 키
    pub firecrawl_api_key: Option<String>,
    /// Gemini 임베딩 API 키
    pub gemini_api_key: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            search: SearchOptions::default(),
            crawl: CrawlOptions::default(),
            model_cache_dir: default_model_cache_dir(),
            completion_url: DEFAULT_COMPLETION_URL.to_string(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            completion_api_key: None,
            firecrawl_url: DEFAULT_FIRECRAWL_URL.to_string(),
            firecrawl_api_key: None,
            gemini_api_key: None,
        }
    }
}

impl RagConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dir) = non_empty_var(MODEL_CACHE_VAR) {
            config.model_cache_dir = PathBuf::from(dir);
        }
        if let Some(url) = non_empty_var(COMPLETION_URL_VAR) {
            config.completion_url = url;
        }
        if let Some(model) = non_empty_var(COMPLETION_MODEL_VAR) {
            config.completion_model = model;
        }
        if let Some(limit) = non_empty_var(CRAWL_LIMIT_VAR) {
            config.crawl.page_limit =
                parse_count(CRAWL_LIMIT_VAR, &limit, 1).unwrap_or(config.crawl.page_limit);
        }
        if let Some(depth) = non_empty_var(CRAWL_DEPTH_VAR) {
            config.crawl.max_depth =
                parse_count(CRAWL_DEPTH_VAR, &depth, 0).unwrap_or(config.crawl.max_depth);
        }

        config.completion_api_key = first_env(COMPLETION_API_KEY_VARS);
        config.firecrawl_api_key = first_env(FIRECRAWL_API_KEY_VARS);
        config.gemini_api_key = first_env(GEMINI_API_KEY_VARS);

        config
    }

    /// Firecrawl 사용 가능 여부
    pub fn has_firecrawl(&self) -> bool {
        self.firecrawl_api_key.is_some()
    }
}

/// 모델 캐시 디렉토리 (~/.cache/autoverse-rag/models)
pub fn default_model_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autoverse-rag")
        .join("models")
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 후보 환경변수 중 첫 번째로 설정된 값
pub fn first_env(names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(value) = non_empty_var(name) {
            tracing::debug!("Using value from {}", name);
            return Some(value);
        }
    }
    None
}

/// 정수 설정값 파싱 (`min` 미만이거나 숫자가 아니면 경고 후 무시)
fn parse_count(name: &str, raw: &str, min: usize) -> Option<usize> {
    match raw.parse::<usize>() {
        Ok(value) if value >= min => Some(value),
        _ => {
            tracing::warn!("Ignoring {}={:?}: expected an integer >= {}", name, raw, min);
            None
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
