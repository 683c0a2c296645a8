//! CLI 모듈
//!
//! autoverse-rag CLI 명령어 정의 및 구현
//!
//! 인덱스는 프로세스 메모리에만 존재하므로 각 명령어는 수집부터 시작합니다.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::RagConfig;
use crate::crawler::{CrawlOptions, FirecrawlCrawler, SiteCrawler, WebScraper};
use crate::embedding::{
    EmbeddingProvider, GeminiLoader, HashEmbedding, HashLoader, LocalModelLoader, ModelLoader,
    GEMINI_DEFAULT_DIMENSION, LOCAL_EMBEDDING_DIMENSION,
};
use crate::pipeline::{IngestEvent, UrlStatus};
use crate::rag::RagIndex;
use crate::synthesis::{AnswerSynthesizer, ChatCompletionService};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "autoverse-rag")]
#[command(version, about = "인메모리 RAG 엔진 - 웹사이트를 크롤링해서 질문에 답합니다", long_about = None)]
pub struct Cli {
    /// 크롤러 백엔드
    #[arg(long, global = true, value_enum, default_value_t = CrawlerKind::Auto)]
    pub crawler: CrawlerKind,

    /// 임베딩 백엔드
    #[arg(long, global = true, value_enum, default_value_t = EmbedderKind::Local)]
    pub embedder: EmbedderKind,

    /// 검색 결과 개수
    #[arg(long, global = true)]
    pub top_k: Option<usize>,

    /// 유사도 하한 (이 값을 초과해야 사용)
    #[arg(long, global = true)]
    pub min_similarity: Option<f32>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 크롤러 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CrawlerKind {
    /// FIRECRAWL_API_KEY가 있으면 Firecrawl, 없으면 로컬
    Auto,
    Firecrawl,
    Local,
}

/// 임베딩 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// fastembed all-MiniLM-L6-v2 (로컬)
    Local,
    /// Gemini gemini-embedding-001 (원격)
    Gemini,
    /// 해시 임베딩 (오프라인, 모델 없음)
    Hash,
}

/// 크롤 관련 인자
#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// 크롤할 URL (여러 번 지정 가능)
    #[arg(short, long = "url", required = true)]
    pub urls: Vec<String>,

    /// URL당 최대 페이지 수 [기본: 20, AUTOVERSE_CRAWL_LIMIT]
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// 최대 링크 깊이 [기본: 3, AUTOVERSE_CRAWL_DEPTH]
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// 포함할 경로 패턴 (정규식)
    #[arg(long)]
    pub include: Vec<String>,

    /// 제외할 경로 패턴 (정규식)
    #[arg(long)]
    pub exclude: Vec<String>,
}

impl CrawlArgs {
    /// 설정의 기본 크롤 옵션에 플래그 적용
    fn options(&self, defaults: &CrawlOptions) -> CrawlOptions {
        let mut options = defaults.clone();
        if let Some(limit) = self.limit {
            options.page_limit = limit;
        }
        if let Some(depth) = self.depth {
            options.max_depth = depth;
        }
        if !self.include.is_empty() {
            options.include_paths = self.include.clone();
        }
        if !self.exclude.is_empty() {
            options.exclude_paths = self.exclude.clone();
        }
        options
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 사이트를 수집한 뒤 질문 하나에 답변
    Ask {
        #[command(flatten)]
        crawl: CrawlArgs,

        /// 질문
        question: String,

        /// 답변에 사용된 출처 표시
        #[arg(long)]
        sources: bool,
    },

    /// 사이트를 수집한 뒤 대화형으로 질문 (stdin)
    Chat {
        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// 사이트를 수집하고 결과만 출력
    Crawl {
        #[command(flatten)]
        crawl: CrawlArgs,
    },

    /// 설정 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = RagConfig::from_env();
    if let Some(top_k) = cli.top_k {
        config.search.top_k = top_k;
    }
    if let Some(min_similarity) = cli.min_similarity {
        config.search.min_similarity = min_similarity;
    }

    match &cli.command {
        Commands::Ask {
            crawl,
            question,
            sources,
        } => cmd_ask(&cli, &config, crawl, question, *sources).await,
        Commands::Chat { crawl } => cmd_chat(&cli, &config, crawl).await,
        Commands::Crawl { crawl } => cmd_crawl(&cli, &config, crawl).await,
        Commands::Status => cmd_status(&cli, &config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 질문 명령어 (ask)
async fn cmd_ask(
    cli: &Cli,
    config: &RagConfig,
    crawl: &CrawlArgs,
    question: &str,
    show_sources: bool,
) -> Result<()> {
    let index = build_index(cli, config, true)?;
    prepare_index(&index, config, crawl).await?;

    if show_sources {
        let results = index.search(question).await.context("검색 실패")?;
        println!("[*] 관련 청크 {} 건:", results.len());
        for (i, result) in results.iter().enumerate() {
            println!(
                "  {}. [유사도: {:.3}] {}",
                i + 1,
                result.similarity,
                truncate_text(&result.chunk.title, 60)
            );
            println!("     {}", result.chunk.source_url);
        }
        println!();
    }

    println!("[*] 답변 생성 중: \"{}\"", question);
    let answer = index.query(question).await.context("답변 생성 실패")?;

    println!();
    println!("{}", answer);

    Ok(())
}

/// 대화 명령어 (chat)
async fn cmd_chat(cli: &Cli, config: &RagConfig, crawl: &CrawlArgs) -> Result<()> {
    let index = build_index(cli, config, true)?;
    prepare_index(&index, config, crawl).await?;

    println!();
    println!("[OK] 질문을 입력하세요. (/status, /clear, /quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("입력 읽기 실패")? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/status" => print_state(&index),
            "/clear" => {
                index.clear();
                println!("[OK] 지식베이스를 비웠습니다");
            }
            question => match index.query(question).await {
                Ok(answer) => {
                    println!();
                    println!("{}", answer);
                    println!();
                }
                Err(e) => println!("[!] 답변 생성 실패: {}", e),
            },
        }
    }

    Ok(())
}

/// 크롤 명령어 (crawl)
async fn cmd_crawl(cli: &Cli, config: &RagConfig, crawl: &CrawlArgs) -> Result<()> {
    let index = build_index(cli, config, false)?;
    prepare_index(&index, config, crawl).await?;

    let stats = index.stats();
    println!();
    println!("[OK] 지식베이스:");
    println!("     청크: {} 건", stats.chunk_count);
    println!("     출처: {} 페이지", stats.source_count);
    println!("     총 콘텐츠: {}", format_bytes(stats.total_content_bytes));
    if let Some(dimension) = stats.dimension {
        println!("     임베딩 차원: {}", dimension);
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(cli: &Cli, config: &RagConfig) -> Result<()> {
    println!("autoverse-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // 크롤러
    let crawler = resolve_crawler(cli.crawler, config);
    println!("[*] 크롤러: {:?}", crawler);
    if config.has_firecrawl() {
        println!("[OK] Firecrawl API 키: 설정됨");
    } else {
        println!("[!] Firecrawl API 키: 미설정 (로컬 크롤러 사용)");
        println!("    설정: export FIRECRAWL_API_KEY=fc-...");
    }

    // 임베딩
    let dimension = match cli.embedder {
        EmbedderKind::Local => LOCAL_EMBEDDING_DIMENSION,
        EmbedderKind::Gemini => GEMINI_DEFAULT_DIMENSION,
        EmbedderKind::Hash => HashEmbedding::default().dimension(),
    };
    println!("[*] 임베딩: {:?} ({}차원)", cli.embedder, dimension);
    println!("[*] 모델 캐시: {}", config.model_cache_dir.display());
    if cli.embedder == EmbedderKind::Gemini && config.gemini_api_key.is_none() {
        println!("[!] Gemini API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    // 완성 서비스
    println!("[*] 완성 모델: {} @ {}", config.completion_model, config.completion_url);
    match &config.completion_api_key {
        Some(key) => {
            println!("[OK] AI 게이트웨이 키: 설정됨");
            let service = ChatCompletionService::new(
                &config.completion_url,
                &config.completion_model,
                key.clone(),
            )?;
            if AnswerSynthesizer::new(Arc::new(service)).check().await {
                println!("[OK] 완성 서비스 연결: 정상");
            } else {
                println!("[!] 완성 서비스 연결: 실패");
            }
        }
        None => {
            println!("[!] AI 게이트웨이 키: 미설정");
            println!("    설정: export LOVABLE_API_KEY=your-key");
        }
    }

    println!(
        "[*] 크롤: URL당 최대 {} 페이지, 깊이 {}",
        config.crawl.page_limit, config.crawl.max_depth
    );
    println!(
        "[*] 검색: top-k {}, 유사도 하한 {}",
        config.search.top_k, config.search.min_similarity
    );

    Ok(())
}

// ============================================================================
// Index Setup
// ============================================================================

/// 플래그/설정으로 인덱스 조립
fn build_index(cli: &Cli, config: &RagConfig, needs_completion: bool) -> Result<RagIndex> {
    let crawler: Arc<dyn SiteCrawler> = match resolve_crawler(cli.crawler, config) {
        CrawlerKind::Firecrawl => {
            let key = config
                .firecrawl_api_key
                .clone()
                .context("Firecrawl API 키가 설정되지 않았습니다. 설정: export FIRECRAWL_API_KEY=fc-...")?;
            Arc::new(FirecrawlCrawler::new(key, &config.firecrawl_url)?)
        }
        _ => Arc::new(WebScraper::new().context("WebScraper 생성 실패")?),
    };

    let loader: Arc<dyn ModelLoader> = match cli.embedder {
        EmbedderKind::Local => Arc::new(
            LocalModelLoader::new(config.model_cache_dir.clone()).with_download_progress(true),
        ),
        EmbedderKind::Gemini => {
            let key = config.gemini_api_key.clone().context(
                "Gemini API 키가 설정되지 않았습니다.\n\
                 설정: export GEMINI_API_KEY=your-key\n\
                 API 키 발급: https://aistudio.google.com/app/apikey",
            )?;
            Arc::new(GeminiLoader::new(key))
        }
        EmbedderKind::Hash => Arc::new(HashLoader::default()),
    };

    let mut builder = RagIndex::builder()
        .model_loader(loader)
        .crawler(crawler)
        .chunk_config(config.chunk.clone())
        .search_options(config.search);

    match &config.completion_api_key {
        Some(key) => {
            let service = ChatCompletionService::new(
                &config.completion_url,
                &config.completion_model,
                key.clone(),
            )?;
            builder = builder.completion(Arc::new(service));
        }
        None if needs_completion => {
            bail!(
                "AI 게이트웨이 키가 설정되지 않았습니다.\n\n\
                 설정 방법:\n  \
                 export LOVABLE_API_KEY=your-api-key\n  \
                 또는\n  \
                 export AI_GATEWAY_API_KEY=your-api-key"
            );
        }
        None => {}
    }

    builder.build()
}

fn resolve_crawler(kind: CrawlerKind, config: &RagConfig) -> CrawlerKind {
    match kind {
        CrawlerKind::Auto if config.has_firecrawl() => CrawlerKind::Firecrawl,
        CrawlerKind::Auto => CrawlerKind::Local,
        other => other,
    }
}

/// 임베더 초기화 + URL 수집
async fn prepare_index(index: &RagIndex, config: &RagConfig, crawl: &CrawlArgs) -> Result<()> {
    println!("[*] 임베딩 모델 로드 중...");
    index
        .initialize_embedder(|pct, msg| println!("    {:>3.0}% {}", pct, msg))
        .await
        .context("임베딩 모델 초기화 실패")?;

    println!("[*] {} 개 URL 수집 ({} 크롤러)", crawl.urls.len(), index.crawler_name());
    let results = index
        .ingest_batch(&crawl.urls, &crawl.options(&config.crawl), print_event)
        .await;

    let failed = results
        .iter()
        .filter(|r| matches!(r.status, UrlStatus::Error { .. }))
        .count();
    if failed == results.len() {
        println!("[!] 모든 URL 수집에 실패했습니다");
    }

    print_state(index);
    Ok(())
}

fn print_event(event: IngestEvent<'_>) {
    match event {
        IngestEvent::Status { url, status } => match status {
            UrlStatus::Pending => {}
            UrlStatus::Crawling => println!("[*] 크롤링 중: {}", url),
            UrlStatus::Processing { pages } => println!("[*] {} 페이지 처리 중...", pages),
            UrlStatus::Done(report) => {
                println!(
                    "[OK] {}: {} 청크 (페이지 {}/{}, 건너뜀 {})",
                    url,
                    report.chunks_added,
                    report.pages_indexed,
                    report.pages_found,
                    report.pages_skipped
                );
                if report.partial {
                    println!("     (시간 초과로 일부 페이지만 수집됨)");
                }
            }
            UrlStatus::Error { message, .. } => println!("[!] {}: {}", url, message),
        },
        IngestEvent::Page {
            index,
            total,
            title,
            ..
        } => println!("    [{}/{}] {}", index, total, truncate_text(title, 60)),
    }
}

fn print_state(index: &RagIndex) {
    let state = index.state();
    println!(
        "[*] 상태: {} | 청크 {} 건",
        if state.ready { "준비됨" } else { "초기화 안 됨" },
        state.chunk_count
    );
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
