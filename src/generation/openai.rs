//! OpenAI 호환 채팅 프로바이더
//!
//! `/chat/completions` SSE 스트리밍 엔드포인트를 사용합니다.
//! OpenAI 호환 게이트웨이(OneAPI, SiliconFlow, DashScope 호환 모드 등)를
//! 모두 이 구현 하나로 체인에 등록할 수 있습니다.
//! 프로바이더 추가는 설정 변경이지 코드 변경이 아닙니다.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, FragmentStream, GenerationProvider, MessageRole};
use crate::error::PipelineError;

// ============================================================================
// OpenAiChatProvider
// ============================================================================

/// OpenAI 호환 스트리밍 채팅 프로바이더
pub struct OpenAiChatProvider {
    id: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    temperature: f32,
}

impl OpenAiChatProvider {
    /// 새 프로바이더 생성
    ///
    /// # Arguments
    /// * `id` - 체인 설정에서 쓰는 식별자
    /// * `base_url` - API 베이스 URL (예: https://api.siliconflow.cn/v1)
    /// * `model` - 모델 이름
    /// * `api_key` - Bearer 토큰 (없으면 인증 헤더 생략)
    /// * `timeout_secs` - 생성 요청 전체 타임아웃 (초)
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            timeout: Duration::from_secs(timeout_secs),
            temperature: 0.7,
        }
    }

    /// 온도 설정
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn provider_err(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::provider(&self.id, reason)
    }
}

#[async_trait]
impl GenerationProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn stream(&self, prompt: String, history: Vec<ChatMessage>) -> FragmentStream<'_> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = history;
        messages.push(ChatMessage {
            role: MessageRole::User,
            content: prompt,
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            temperature: self.temperature,
        };

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let timeout = self.timeout;

        Box::pin(async_stream::stream! {
            let mut builder = client.post(&url).json(&request).timeout(timeout);
            if let Some(ref key) = api_key {
                builder = builder.bearer_auth(key);
            }

            let response = match builder.send().await {
                Ok(res) => res,
                Err(e) => {
                    yield Err(self.provider_err(format!("request failed: {}", e)));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                yield Err(self.provider_err(format!("API error ({}): {}", status, body)));
                return;
            }

            // SSE 라인 프레이밍: "data: {json}" / "data: [DONE]"
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(self.provider_err(format!("stream read failed: {}", e)));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data.is_empty() {
                        continue;
                    }
                    if data == "[DONE]" {
                        return;
                    }

                    match serde_json::from_str::<StreamChunk>(data) {
                        Ok(parsed) => {
                            if let Some(content) = parsed
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content)
                            {
                                if !content.is_empty() {
                                    yield Ok(content);
                                }
                            }
                        }
                        Err(e) => {
                            yield Err(self.provider_err(format!("malformed chunk: {}", e)));
                            return;
                        }
                    }
                }
            }
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let mut builder = self.client.get(&url).timeout(Duration::from_secs(5));
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        match builder.send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
