//! HTTP 공통 처리 - 원격 API 응답 분류와 요청 속도 조절
//!
//! 임베딩, 완성, 크롤 클라이언트가 같은 규칙으로 상태 코드와 에러 본문을
//! 해석합니다. 에러 본문은 `{"error": "..."}` 또는
//! `{"error": {"message": "..."}}` 형식을 모두 받습니다.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::Instant;

// ============================================================================
// ApiReply
// ============================================================================

/// 상태 코드로 분류한 응답
#[derive(Debug)]
pub(crate) enum ApiReply {
    /// 2xx 응답 본문
    Success(String),
    /// 429 (`Retry-After` 힌트가 있으면 함께)
    RateLimited(Option<Duration>),
    /// 그 밖의 실패
    Failed { status: StatusCode, message: String },
}

impl ApiReply {
    /// 응답 본문을 읽고 분류
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;
        Ok(Self::classify(status, retry_after, body))
    }

    fn classify(status: StatusCode, retry_after: Option<Duration>, body: String) -> Self {
        if status.is_success() {
            return ApiReply::Success(body);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return ApiReply::RateLimited(retry_after);
        }

        let message = error_message(&body).unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("no response body").to_string()
            } else {
                trimmed.to_string()
            }
        });
        ApiReply::Failed { status, message }
    }

    /// 성공 본문을 꺼내거나 `{service} API error`로 실패
    pub(crate) fn into_body(self, service: &str) -> Result<String> {
        match self {
            ApiReply::Success(body) => Ok(body),
            ApiReply::RateLimited(_) => bail!("{} API error: rate limit exceeded (429)", service),
            ApiReply::Failed { status, message } => {
                bail!("{} API error ({}): {}", service, status.as_u16(), message)
            }
        }
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorPayload {
    Message(String),
    Detailed { message: String },
}

/// 본문에서 에러 메시지 추출 (에러 형식이 아니면 `None`)
pub(crate) fn error_message(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    let message = match envelope.error {
        ErrorPayload::Message(m) => m,
        ErrorPayload::Detailed { message } => message,
    };
    Some(message)
}

// ============================================================================
// Pacing
// ============================================================================

/// 요청 사이 최소 간격 유지
///
/// 다음 요청 슬롯을 잠금 안에서 예약하고 잠금 밖에서 기다립니다.
#[derive(Debug)]
pub(crate) struct Pacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// 자기 차례까지 대기
    pub(crate) async fn wait(&self) {
        let delay = {
            let mut next_slot = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let slot = next_slot.map_or(now, |next| next.max(now));
            *next_slot = Some(slot + self.interval);
            slot.saturating_duration_since(now)
        };

        if !delay.is_zero() {
            tracing::debug!("Pacing request, waiting {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

/// 재시도 지연 (지수 백오프: initial, 2×, 4×, ...)
pub(crate) fn backoff(initial: Duration, retries: u32) -> impl Iterator<Item = Duration> {
    (0..retries).map(move |attempt| initial.saturating_mul(2u32.saturating_pow(attempt)))
}

// ============================================================================
// Tests
// ============================================================================
