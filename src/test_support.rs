//! 테스트용 가짜 협력자 (네트워크 없음)

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::crawler::{CrawlOptions, CrawlResult, CrawledPage, SiteCrawler};
use crate::embedding::{EmbeddingProvider, ModelLoader, ProgressReporter};
use crate::pipeline::CancelFlag;
use crate::synthesis::CompletionService;

/// 키워드 사전
const VOCABULARY: &[&str] = &[
    "return", "refund", "policy", "days", "shipping", "warehouse", "careers", "salary",
];

/// 키워드 출현 횟수를 차원으로 쓰는 임베딩
pub struct KeywordEmbedding;

impl KeywordEmbedding {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; VOCABULARY.len()];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .map(|t| t.to_lowercase())
        {
            let stem = token.trim_end_matches('s');
            if let Some(i) = VOCABULARY
                .iter()
                .position(|w| w.trim_end_matches('s') == stem)
            {
                v[i] += 1.0;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len()
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// 로드 횟수를 세는 키워드 임베딩 로더
#[derive(Default)]
pub struct KeywordLoader {
    pub loads: AtomicUsize,
}

#[async_trait]
impl ModelLoader for KeywordLoader {
    async fn load(
        &self,
        progress: &ProgressReporter<'_>,
    ) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        progress.report(50.0, "keyword model");
        Ok(Arc::new(KeywordEmbedding))
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

/// URL별로 미리 정해진 결과를 반환하는 크롤러
#[derive(Default)]
pub struct FakeCrawler {
    sites: HashMap<String, Result<CrawlResult, String>>,
    pub calls: AtomicUsize,
    /// 크롤 중에 취소를 트리거
    cancel_on_crawl: Option<CancelFlag>,
}

impl FakeCrawler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, url: &str, pages: Vec<CrawledPage>) -> Self {
        self.sites
            .insert(url.to_string(), Ok(CrawlResult::completed(pages)));
        self
    }

    pub fn with_result(mut self, url: &str, result: CrawlResult) -> Self {
        self.sites.insert(url.to_string(), Ok(result));
        self
    }

    pub fn with_failure(mut self, url: &str, message: &str) -> Self {
        self.sites.insert(url.to_string(), Err(message.to_string()));
        self
    }

    pub fn cancelling(mut self, flag: CancelFlag) -> Self {
        self.cancel_on_crawl = Some(flag);
        self
    }
}

#[async_trait]
impl SiteCrawler for FakeCrawler {
    async fn crawl(&self, url: &str, _options: &CrawlOptions) -> anyhow::Result<CrawlResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(flag) = &self.cancel_on_crawl {
            flag.cancel();
        }
        match self.sites.get(url) {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(message)) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(CrawlResult::completed(vec![])),
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// 사용자 프롬프트를 그대로 돌려주는 완성 서비스
#[derive(Default)]
pub struct EchoCompletion {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CompletionService for EchoCompletion {
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(user_prompt.to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

pub fn page(url: &str, title: &str, text: &str) -> CrawledPage {
    CrawledPage {
        url: url.to_string(),
        title: title.to_string(),
        text: text.to_string(),
    }
}

/// 최소 길이를 넘는 반복 텍스트
pub fn words(word: &str, count: usize) -> String {
    vec![word; count].join(" ")
}

// ============================================================================
// Local HTTP server
// ============================================================================

/// 테스트 서버가 받은 요청
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }
}

/// 테스트 서버 응답
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.into(),
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into(),
        }
    }
}

type Handler = dyn Fn(&Request) -> Reply + Send + Sync;

/// 127.0.0.1 임의 포트에서 동작하는 HTTP/1.1 서버 (연결당 요청 1개)
pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// 받은 요청 목록 (`"GET /path"`)
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

pub async fn spawn_server<F>(handler: F) -> TestServer
where
    F: Fn(&Request) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind to random port");
    let addr = listener.local_addr().expect("should have local addr");
    let handler: Arc<Handler> = Arc::new(handler);
    let hits = Arc::new(Mutex::new(Vec::new()));

    let log = hits.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = handler.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let _ = serve_connection(stream, handler, log).await;
            });
        }
    });

    TestServer { addr, hits }
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await?;

    let request = Request {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    log.lock()
        .unwrap()
        .push(format!("{} {}", request.method, request.path));

    let reply = handler(&request);
    let reason = if reply.status < 400 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reason,
        reply.content_type,
        reply.body.len(),
        reply.body
    );

    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// 시스템 프록시를 거치지 않는 클라이언트
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("should build test client")
}
