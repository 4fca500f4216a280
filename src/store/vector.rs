//! Vector Store 트레이트
//!
//! 벡터 저장소의 공통 인터페이스입니다. 검색 결과는 저장소 원시 거리를
//! 그대로 담습니다. 거리를 유사도로 바꾸는 정책은 검색 집계 단계의
//! 책임입니다.

use async_trait::async_trait;

use crate::error::Result;

/// 벡터 임베딩 차원 (BAAI/bge-m3 기본값)
pub const EMBEDDING_DIMENSION: i32 = 1024;

// ============================================================================
// Types
// ============================================================================

/// 청크 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct ChunkEntry {
    /// 출처 문서 식별자 (파일 경로 등)
    pub source_id: String,
    /// 청크 인덱스 (0-based)
    pub chunk_index: i32,
    /// 청크 텍스트
    pub content: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 히트
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// 청크 텍스트
    pub content: String,
    /// 출처 문서 식별자
    pub source_id: String,
    /// 저장소 원시 거리 (작을수록 유사)
    pub distance: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 청크 배치 삽입
    async fn insert_batch(&self, entries: &[ChunkEntry]) -> Result<usize>;

    /// 최근접 이웃 검색
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<VectorHit>>;

    /// 저장된 청크 개수
    async fn count(&self) -> Result<usize>;
}
