//! OpenAI 호환 chat completions 클라이언트
//!
//! 기본 엔드포인트는 AI 게이트웨이이며, 엔드포인트/모델/키를 바꿔
//! 다른 OpenAI 호환 서비스에도 사용할 수 있습니다.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::CompletionService;
use crate::http::{error_message, ApiReply};

/// 최대 생성 토큰
const MAX_TOKENS: usize = 2048;

/// 샘플링 온도
const TEMPERATURE: f32 = 0.5;

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// 응답 본문에서 답변 추출
///
/// 게이트웨이는 200 응답에도 `error` 본문을 담을 수 있습니다.
fn parse_answer(body: &str) -> Result<String> {
    if let Some(message) = error_message(body) {
        bail!("AI API error: {}", message);
    }

    let parsed: ChatResponse =
        serde_json::from_str(body).context("Failed to parse completion response")?;

    let answer = parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();

    if answer.is_empty() {
        bail!("Completion service returned no content");
    }
    Ok(answer)
}

// ============================================================================
// ChatCompletionService
// ============================================================================

/// Chat completions 서비스
pub struct ChatCompletionService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatCompletionService {
    /// 새 서비스 생성
    pub fn new(endpoint: &str, model: &str, api_key: String) -> Result<Self> {
        anyhow::ensure!(
            !api_key.trim().is_empty(),
            "AI gateway not configured. Set LOVABLE_API_KEY or AI_GATEWAY_API_KEY."
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl CompletionService for ChatCompletionService {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        tracing::debug!("Calling completion service: {} ({})", self.endpoint, self.model);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&request)
            .send()
            .await
            .context("Completion request failed")?;

        tracing::debug!("Completion response status: {}", response.status());

        let body = ApiReply::read(response).await?.into_body("AI")?;
        parse_answer(&body)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
