//! 저장소 모듈 - 벡터/그래프 저장소 인터페이스와 구현
//!
//! 두 저장소 모두 능력 트레이트 뒤에 있으며, 파이프라인에는 기동 시점에
//! 구성된 핸들이 주입됩니다. 전역 싱글톤은 없습니다.

pub mod graph;
pub mod lance;
pub mod vector;

use std::path::PathBuf;

pub use graph::{GraphRecord, GraphStore, Neo4jHttpStore};
pub use lance::LanceVectorStore;
pub use vector::{ChunkEntry, VectorHit, VectorStore, EMBEDDING_DIMENSION};

/// 데이터 디렉토리 경로 (~/.relic-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relic-rag")
}
