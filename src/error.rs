//! 파이프라인 에러 타입
//!
//! 검색-생성 파이프라인의 에러 분류입니다.
//! 각 에러는 복구 전략이 다릅니다:
//! - `TranslationFailure`: 재시도 없이 호출자에게 전달
//! - `QuerySyntax`: 변형 단위로 스킵 (과잉 생성된 변형의 일부 실패는 정상)
//! - `StoreUnavailable`: 제한된 재시도 후 해당 경로만 스킵
//! - `Provider`: 다음 프로바이더로 페일오버
//! - `EmbeddingUnavailable`: 벡터 경로만 스킵

use thiserror::Error;

/// 파이프라인 에러 분류
#[derive(Error, Debug)]
pub enum PipelineError {
    /// 질문에서 사용 가능한 키워드를 추출하지 못함
    #[error("cannot interpret question: no usable keywords")]
    TranslationFailure,

    /// 단일 쿼리 변형이 스키마에 대해 잘못됨
    #[error("query syntax error: {0}")]
    QuerySyntax(String),

    /// 저장소 연결 불가 (벡터 또는 그래프)
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// 생성 프로바이더 에러 (쿼터, 타임아웃, 잘못된 응답)
    #[error("provider '{provider}' error: {reason}")]
    Provider { provider: String, reason: String },

    /// 임베딩 호출 불가
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// 설정 오류 (프로바이더 미설정 등, 기동 시점에 발생)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// 생성 프로바이더 에러 생성 헬퍼
    pub fn provider(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

impl From<lancedb::Error> for PipelineError {
    fn from(e: lancedb::Error) -> Self {
        PipelineError::StoreUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::TranslationFailure;
        assert!(err.to_string().contains("cannot interpret"));

        let err = PipelineError::provider("oneapi", "quota exceeded");
        assert!(err.to_string().contains("oneapi"));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_store_unavailable_message() {
        let err = PipelineError::StoreUnavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "store unavailable: connection refused");
    }
}
