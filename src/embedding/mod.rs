//! 임베딩 모듈 - 텍스트 벡터화
//!
//! OpenAI 호환 `/embeddings` 엔드포인트를 통해 텍스트를 벡터로 변환합니다.
//! 시맨틱(벡터) 검색 경로의 핵심 의존성이며, 임베딩이 불가하면 해당 질문의
//! 벡터 경로만 건너뜁니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = HttpEmbedding::from_env()?;
//! let embedding = embedder.embed("青铜器").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 차원 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// HTTP Embedding (OpenAI 호환)
// ============================================================================

/// 기본 임베딩 차원 (BAAI/bge-m3)
pub const DEFAULT_DIMENSION: usize = 1024;

/// 기본 임베딩 모델
const DEFAULT_EMBED_MODEL: &str = "BAAI/bge-m3";

/// 429/전송 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 1000;

/// OpenAI 호환 임베딩 구현체
#[derive(Debug)]
pub struct HttpEmbedding {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    dimension: usize,
}

impl HttpEmbedding {
    /// 새 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `base_url` - API 베이스 URL
    /// * `model` - 임베딩 모델 이름
    /// * `api_key` - API 키
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Self::with_dimension(base_url, model, api_key, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성
    pub fn with_dimension(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        dimension: usize,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(PipelineError::Config(
                "embedding dimension must be positive".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            dimension,
        })
    }

    /// 환경변수에서 생성
    ///
    /// `ONEAPI_BASE_URL`, `ONEAPI_API_KEY`, `ONEAPI_EMBEDDING_MODEL`을 읽습니다.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("ONEAPI_BASE_URL")
            .unwrap_or_else(|_| "https://api.siliconflow.cn/v1".to_string());
        let api_key = get_api_key()?;
        let model = std::env::var("ONEAPI_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string());

        Self::new(base_url, model, api_key)
    }

    fn unavailable(reason: impl Into<String>) -> PipelineError {
        PipelineError::EmbeddingUnavailable(reason.into())
    }
}

/// 임베딩 API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

/// 임베딩 API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let url = format!("{}/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            input: vec![text],
        };

        let mut last_error: Option<PipelineError> = None;

        // 재시도 루프 (429/전송 에러 시 지수 백오프)
        for attempt in 0..=MAX_RETRIES {
            let response = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(Self::unavailable(format!("request failed: {}", e)));
                    if attempt < MAX_RETRIES {
                        let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "embedding request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| Self::unavailable(format!("failed to read response: {}", e)))?;

            if status.is_success() {
                let parsed: EmbedResponse = serde_json::from_str(&body)
                    .map_err(|e| Self::unavailable(format!("malformed response: {}", e)))?;
                let embedding = parsed
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .ok_or_else(|| Self::unavailable("empty embedding data"))?;
                return Ok(embedding);
            }

            if status.as_u16() == 429 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                tracing::warn!(
                    "embedding rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(Self::unavailable("rate limit exceeded (429)"));

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                // 다른 에러 - 즉시 실패
                return Err(Self::unavailable(format!(
                    "API error ({}): {}",
                    status, body
                )));
            }
        }

        Err(last_error
            .unwrap_or_else(|| Self::unavailable(format!("failed after {} retries", MAX_RETRIES))))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
pub fn get_api_key() -> Result<String> {
    if let Ok(key) = std::env::var("ONEAPI_API_KEY") {
        if !key.is_empty() {
            return Ok(key);
        }
    }

    Err(PipelineError::Config(
        "API key not found. Set ONEAPI_API_KEY environment variable.".to_string(),
    ))
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    std::env::var("ONEAPI_API_KEY")
        .map(|k| !k.is_empty())
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================
