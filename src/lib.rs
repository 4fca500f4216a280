//! relic-rag - 박물관 문물 지식그래프 + 벡터 RAG 질의응답 파이프라인
//!
//! 자연어 질문을 Neo4j 지식그래프와 LanceDB 벡터 인덱스 양쪽에서 검색한
//! 증거로 근거 짓고, 프로바이더 체인을 통해 답변을 스트리밍합니다.
//! 번역 -> 검색 -> 합성의 각 단계는 실패 시 단일 출처 증거 또는 오프라인
//! 폴백으로 강등됩니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod retrieval;
pub mod schema;
pub mod segment;
pub mod store;
pub mod synthesis;
pub mod translator;

// Re-exports
pub use config::{PipelineConfig, ProviderConfig};
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, HttpEmbedding};
pub use error::{PipelineError, Result};
pub use generation::chain::{ChainEvent, ChainState, ProviderChain};
pub use generation::openai::OpenAiChatProvider;
pub use generation::{ChatMessage, GenerationProvider, MessageRole};
pub use knowledge::{default_chunker, ChunkConfig, Chunker, CjkChunker};
pub use pipeline::{Pipeline, PipelineStatus};
pub use retrieval::{EvidenceSet, RetrievalConfig, RetrievedItem, Retriever};
pub use schema::{GraphSchema, MuseumAlias};
pub use segment::{LexiconSegmenter, Segmenter};
pub use store::{
    get_data_dir, ChunkEntry, GraphRecord, GraphStore, LanceVectorStore, Neo4jHttpStore,
    VectorHit, VectorStore,
};
pub use synthesis::{
    AnswerChunk, AnswerMeta, ConversationMemory, Provenance, Synthesizer, EVIDENCE_TAG, MODEL_TAG,
};
pub use translator::{QueryVariant, Translator, VariantStrategy};
