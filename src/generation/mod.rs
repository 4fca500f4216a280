//! 생성 프로바이더 모듈
//!
//! 텍스트 생성 백엔드의 공통 인터페이스와 페일오버 체인을 제공합니다.
//! 체인 구성(순서/멤버십)은 설정이며, 특정 벤더에 하드코딩되지 않습니다.

pub mod chain;
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// Chat Messages
// ============================================================================

/// 메시지 역할 (OpenAI 호환 와이어 포맷)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// 대화 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// GenerationProvider Trait
// ============================================================================

/// 텍스트 조각 스트림
pub type FragmentStream<'a> = BoxStream<'a, Result<String>>;

/// 생성 프로바이더 트레이트
///
/// 단일 논리 요청으로 텍스트 조각을 스트리밍합니다. 스트림은 단방향
/// 1회성이며 재시작할 수 없습니다. 에러는 `PipelineError::Provider`로
/// 반환되어 체인 페일오버를 유발합니다.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// 프로바이더 식별자 (로그 및 설정 키)
    fn name(&self) -> &str;

    /// 스트리밍 생성
    ///
    /// 프롬프트와 이전 대화 이력을 받아 텍스트 조각 스트림을 반환합니다.
    /// 스트림을 드롭하면 진행 중인 요청이 취소됩니다.
    fn stream(&self, prompt: String, history: Vec<ChatMessage>) -> FragmentStream<'_>;

    /// 수집형 생성 (스트림을 모아 하나의 문자열로)
    ///
    /// LLM 쿼리 생성 경로처럼 전체 응답이 필요한 호출자용 기본 구현입니다.
    async fn complete(&self, prompt: String, history: Vec<ChatMessage>) -> Result<String> {
        let mut stream = self.stream(prompt, history);
        let mut out = String::new();
        while let Some(fragment) = stream.next().await {
            out.push_str(&fragment?);
        }
        Ok(out)
    }

    /// 연결 상태 확인
    async fn health_check(&self) -> bool {
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_wire_format() {
        let msg = ChatMessage::user("你好");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));

        let msg = ChatMessage::assistant("回答");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
    }
}
