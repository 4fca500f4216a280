//! 지식 인제스트 모듈
//!
//! 벡터 인덱스에 넣을 문서를 청크로 분할합니다. 문서 포맷 파싱(PDF 등)은
//! 이 시스템의 범위 밖이며, UTF-8 텍스트만 다룹니다.

pub mod chunker;

pub use chunker::{default_chunker, ChunkConfig, Chunker, CjkChunker};
