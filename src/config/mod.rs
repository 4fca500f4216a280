//! 파이프라인 설정
//!
//! 모든 조정 가능한 값(검색 한도, 임계값, 타임아웃, 프로바이더 체인 순서)을
//! 한 곳에 모읍니다. 핸들은 기동 시점에 이 설정으로 구성되어 파이프라인에
//! 주입됩니다. 프로바이더 추가/재배열은 설정 변경이며 코드 변경이 아닙니다.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::retrieval::RetrievalConfig;
use crate::schema::GraphSchema;

// ============================================================================
// ProviderConfig
// ============================================================================

/// 생성 프로바이더 한 개의 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// 체인에서 쓰는 식별자
    pub id: String,
    /// OpenAI 호환 API 베이스 URL
    pub base_url: String,
    /// 모델 이름
    pub model: String,
    /// API 키를 담은 환경변수 이름
    pub api_key_env: String,
    /// 생성 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// 환경변수에서 API 키 로드
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }

    /// 베이스 URL 유효성 검사
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url).map_err(|e| {
            PipelineError::Config(format!(
                "invalid base_url for provider '{}': {}",
                self.id, e
            ))
        })?;
        Ok(())
    }
}

// ============================================================================
// PipelineConfig
// ============================================================================

/// 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 그래프 변형당 결과 수 제한 (Cypher LIMIT)
    pub result_limit: usize,
    /// 벡터 검색 top-K
    pub top_k: usize,
    /// 유사도 임계값 (0-100)
    pub similarity_threshold: f32,
    /// 증거 집합 최대 크기
    pub max_evidence: usize,
    /// 그래프 경로 사용 여부
    pub use_graph: bool,
    /// 벡터 경로 사용 여부
    pub use_vector: bool,
    /// LLM 쿼리 생성 경로 사용 여부
    pub use_llm_translator: bool,
    /// StoreUnavailable 재시도 횟수
    pub store_retries: u32,
    /// 재시도 간 지연 (ms)
    pub retry_delay_ms: u64,
    /// 저장소 연결 확인 타임아웃 (초)
    pub ping_timeout_secs: u64,
    /// 같은 프로바이더 추가 재시도 횟수
    pub retries_per_provider: u32,
    /// 대화 기억 용량 (질문-답변 쌍)
    pub memory_capacity: usize,
    /// 생성 프로바이더 체인 (순서 = 시도 순서)
    pub providers: Vec<ProviderConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            result_limit: 10,
            top_k: 5,
            similarity_threshold: 60.0,
            max_evidence: 30,
            use_graph: true,
            use_vector: true,
            use_llm_translator: false,
            store_retries: 2,
            retry_delay_ms: 1000,
            ping_timeout_secs: 5,
            retries_per_provider: 1,
            memory_capacity: 5,
            providers: vec![],
        }
    }
}

impl PipelineConfig {
    /// 환경변수에서 설정 로드
    ///
    /// 프로바이더 체인은 설정된 키가 있는 것만 등록됩니다:
    /// - `ONEAPI_API_KEY` (+ `ONEAPI_BASE_URL`, `ONEAPI_MODEL`) -> "oneapi"
    /// - `DASHSCOPE_API_KEY` (+ `DASHSCOPE_MODEL`) -> "qwen"
    ///
    /// `RAG_PROVIDER_ORDER` (쉼표 구분 id 목록)로 순서를 바꿀 수 있습니다.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("RAG_RESULT_LIMIT") {
            config.result_limit = v;
        }
        if let Some(v) = env_parse::<usize>("RAG_TOP_K") {
            config.top_k = v;
        }
        if let Some(v) = env_parse::<f32>("RAG_SIMILARITY_THRESHOLD") {
            config.similarity_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("RAG_MAX_EVIDENCE") {
            config.max_evidence = v;
        }
        if let Some(v) = env_parse::<bool>("RAG_USE_GRAPH") {
            config.use_graph = v;
        }
        if let Some(v) = env_parse::<bool>("RAG_USE_VECTOR") {
            config.use_vector = v;
        }
        if let Some(v) = env_parse::<bool>("RAG_USE_LLM_TRANSLATOR") {
            config.use_llm_translator = v;
        }
        if let Some(v) = env_parse::<usize>("RAG_MEMORY_CAPACITY") {
            config.memory_capacity = v;
        }

        // OneAPI 계열 (기본 프로바이더)
        if std::env::var("ONEAPI_API_KEY").map(|k| !k.is_empty()).unwrap_or(false) {
            config.providers.push(ProviderConfig {
                id: "oneapi".to_string(),
                base_url: std::env::var("ONEAPI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.siliconflow.cn/v1".to_string()),
                model: std::env::var("ONEAPI_MODEL")
                    .unwrap_or_else(|_| "Qwen/Qwen2.5-72B-Instruct".to_string()),
                api_key_env: "ONEAPI_API_KEY".to_string(),
                timeout_secs: 120,
            });
        }

        // 통의천문 호환 모드 (폴백 프로바이더)
        if std::env::var("DASHSCOPE_API_KEY").map(|k| !k.is_empty()).unwrap_or(false) {
            config.providers.push(ProviderConfig {
                id: "qwen".to_string(),
                base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
                model: std::env::var("DASHSCOPE_MODEL")
                    .unwrap_or_else(|_| "qwen-plus".to_string()),
                api_key_env: "DASHSCOPE_API_KEY".to_string(),
                timeout_secs: 120,
            });
        }

        // 체인 순서 재배열
        if let Ok(order) = std::env::var("RAG_PROVIDER_ORDER") {
            config.reorder_providers(&order);
        }

        config
    }

    /// 쉼표 구분 id 목록 순서로 프로바이더 재배열 (목록에 없는 id는 제외)
    pub fn reorder_providers(&mut self, order: &str) {
        let ids: Vec<&str> = order.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        if ids.is_empty() {
            return;
        }
        let mut reordered = Vec::new();
        for id in ids {
            if let Some(p) = self.providers.iter().find(|p| p.id == id) {
                reordered.push(p.clone());
            }
        }
        self.providers = reordered;
    }

    /// 설정 유효성 검사 (기동 시점에 호출)
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.similarity_threshold) {
            return Err(PipelineError::Config(format!(
                "similarity threshold must be in [0, 100], got {}",
                self.similarity_threshold
            )));
        }
        if self.max_evidence == 0 {
            return Err(PipelineError::Config(
                "max_evidence must be positive".to_string(),
            ));
        }
        if self.providers.is_empty() {
            return Err(PipelineError::Config(
                "at least one generation provider must be configured".to_string(),
            ));
        }
        for provider in &self.providers {
            provider.validate()?;
        }
        Ok(())
    }

    /// 검색 집계 설정으로 변환
    pub fn retrieval(&self, schema: &GraphSchema) -> RetrievalConfig {
        RetrievalConfig {
            top_k: self.top_k,
            similarity_threshold: self.similarity_threshold,
            max_evidence: self.max_evidence,
            store_retries: self.store_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            entity_name_columns: schema.entity_name_columns.clone(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// ============================================================================
// Tests
// ============================================================================
