//! 답변 합성 모듈 - 검색된 청크로 근거 있는 답변 생성
//!
//! 검색 결과를 프롬프트로 조립해 원격 언어 모델에 전달합니다.
//! 검색 결과가 없으면 모델을 호출하지 않고 고정 문구를 반환합니다.

mod chat;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::knowledge::ScoredChunk;

pub use chat::ChatCompletionService;

/// 관련 컨텍스트가 없을 때의 고정 답변
pub const NO_CONTEXT_ANSWER: &str = "I don't have any relevant information in my knowledge base to answer this question. Please scrape a website first.";

/// 청크 구분자
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

const SYSTEM_PROMPT: &str = "\
You are an expert knowledge assistant that provides DETAILED, COMPREHENSIVE answers based on the provided context.

YOUR MISSION:
- Provide thorough, well-structured answers that cover ALL relevant information from the context
- Include specific details, examples, definitions, and explanations found in the content
- Use bullet points, numbered lists, and clear formatting for better readability
- Synthesize information from multiple context sources to give a complete picture

GUIDELINES:
1. Answer ONLY from the provided context - do not use external knowledge
2. If the question relates to the context, provide the MOST DETAILED answer possible
3. Include relevant quotes or specific information from the scraped content
4. If information is partial, share what you have and note what might be missing
5. If the question is completely unrelated to the context, politely redirect

The user has scraped website content and expects detailed, informative answers from that knowledge base.";

const ANSWER_INSTRUCTIONS: &str = "Provide a DETAILED, COMPREHENSIVE answer using ALL relevant information from the knowledge base above. Include specific details, examples, and explanations. Format your answer clearly with sections if the topic is complex.";

// ============================================================================
// CompletionService Trait
// ============================================================================

/// 완성 서비스 트레이트 (원격 언어 모델)
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// 시스템/사용자 프롬프트로 답변 텍스트 생성
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String>;

    /// 서비스 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Prompt
// ============================================================================

/// 조립된 프롬프트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// 질문과 검색 결과로 프롬프트 조립
pub fn build_prompt(query: &str, chunks: &[ScoredChunk]) -> Prompt {
    let context = chunks
        .iter()
        .map(|scored| format!("Source: {}\n{}", scored.chunk.title, scored.chunk.content))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    let user = format!(
        "KNOWLEDGE BASE CONTENT:\n\n{}{}USER QUESTION: {}\n\n{}",
        context, CONTEXT_SEPARATOR, query, ANSWER_INSTRUCTIONS
    );

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

// ============================================================================
// AnswerSynthesizer
// ============================================================================

/// 답변 합성기
pub struct AnswerSynthesizer {
    service: Option<Arc<dyn CompletionService>>,
}

impl AnswerSynthesizer {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self {
            service: Some(service),
        }
    }

    /// 완성 서비스 없이 생성 (컨텍스트가 있는 질문은 `Generation` 에러)
    pub fn without_service() -> Self {
        Self { service: None }
    }

    /// 완성 서비스 이름
    pub fn service_name(&self) -> Option<&str> {
        self.service.as_ref().map(|s| s.name())
    }

    /// 검색 결과에 근거한 답변 생성
    ///
    /// 결과가 비어 있으면 서비스를 호출하지 않고 [`NO_CONTEXT_ANSWER`]를 반환합니다.
    /// 서비스 실패는 재시도 없이 `RagError::Generation`으로 전달됩니다.
    pub async fn answer(&self, query: &str, chunks: &[ScoredChunk]) -> Result<String> {
        if chunks.is_empty() {
            tracing::info!("No relevant chunks for query, returning fallback answer");
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let service = self.service.as_ref().ok_or_else(|| RagError::Generation {
            cause: "No completion service configured".to_string(),
        })?;

        let prompt = build_prompt(query, chunks);
        tracing::debug!(
            "Generating answer with {} ({} chunks, {} prompt chars)",
            service.name(),
            chunks.len(),
            prompt.user.len()
        );

        let answer = service
            .complete(&prompt.system, &prompt.user)
            .await
            .map_err(|e| {
                tracing::error!("Completion service failed: {:#}", e);
                RagError::generation(e)
            })?;

        tracing::info!("Generated answer ({} chars)", answer.len());
        Ok(answer)
    }

    /// 완성 서비스 연결 확인
    pub async fn check(&self) -> bool {
        let Some(service) = &self.service else {
            return false;
        };

        match service.complete("Reply with OK.", "Connection check").await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Completion service check failed: {:#}", e);
                false
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
