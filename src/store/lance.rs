//! LanceDB Vector Store - 청크 벡터 인덱스
//!
//! ANN (Approximate Nearest Neighbor) 검색으로 대용량 청크에서도 빠른
//! 검색을 지원합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::vector::{ChunkEntry, VectorHit, VectorStore, EMBEDDING_DIMENSION};
use crate::error::{PipelineError, Result};

/// 청크 테이블 이름
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// Apache Arrow 기반 columnar 저장소로, 연결은 질문 간에 재사용됩니다.
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    PipelineError::StoreUnavailable(format!(
                        "failed to create LanceDB directory: {}",
                        e
                    ))
                })?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| PipelineError::StoreUnavailable("invalid path encoding".to_string()))?;

        let db = lancedb::connect(path_str).execute().await?;

        Ok(Self { db })
    }

    /// 청크 테이블 스키마 생성
    fn create_schema() -> Schema {
        Schema::new(vec![
            Field::new("source_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("content", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIMENSION,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[ChunkEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            return Err(PipelineError::StoreUnavailable(
                "cannot create batch from empty entries".to_string(),
            ));
        }

        let source_ids: Vec<&str> = entries.iter().map(|e| e.source_id.as_str()).collect();
        let chunk_indices: Vec<i32> = entries.iter().map(|e| e.chunk_index).collect();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            EMBEDDING_DIMENSION,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(|e| {
            PipelineError::StoreUnavailable(format!("failed to create embedding array: {}", e))
        })?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema()),
            vec![
                Arc::new(StringArray::from(source_ids)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(contents)),
                Arc::new(embeddings_list),
            ],
        )
        .map_err(|e| {
            PipelineError::StoreUnavailable(format!("failed to create RecordBatch: {}", e))
        })?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[ChunkEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self.db.open_table(TABLE_NAME).execute().await?;
            table.add(batches).execute().await?;
        } else {
            self.db.create_table(TABLE_NAME, batches).execute().await?;
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self.db.open_table(TABLE_NAME).execute().await?;

        let results = table
            .vector_search(query_embedding.to_vec())
            .map_err(|e| {
                PipelineError::StoreUnavailable(format!("failed to create vector search: {}", e))
            })?
            .limit(top_k)
            .execute()
            .await?;

        let mut hits = Vec::new();

        // RecordBatch 스트림에서 결과 추출
        use futures::TryStreamExt;
        let batches: Vec<RecordBatch> = results.try_collect().await.map_err(|e| {
            PipelineError::StoreUnavailable(format!("failed to collect results: {}", e))
        })?;

        for batch in batches {
            let source_ids = batch
                .column_by_name("source_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| {
                    PipelineError::StoreUnavailable("missing source_id column".to_string())
                })?;

            let contents = batch
                .column_by_name("content")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| {
                    PipelineError::StoreUnavailable("missing content column".to_string())
                })?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| {
                    PipelineError::StoreUnavailable("missing _distance column".to_string())
                })?;

            for i in 0..batch.num_rows() {
                hits.push(VectorHit {
                    content: contents.value(i).to_string(),
                    source_id: source_ids.value(i).to_string(),
                    distance: distances.value(i),
                });
            }
        }

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let count = table.count_rows(None).await?;
        Ok(count)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_entry(source_id: &str, chunk_index: i32) -> ChunkEntry {
        ChunkEntry {
            source_id: source_id.to_string(),
            chunk_index,
            content: format!("Test chunk {} for {}", chunk_index, source_id),
            embedding: vec![0.1; EMBEDDING_DIMENSION as usize],
        }
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("test.lance");

        let store = LanceVectorStore::open(&lance_path).await.unwrap();

        // 초기 상태
        assert_eq!(store.count().await.unwrap(), 0);

        // 삽입
        let entries = vec![create_test_entry("doc-1", 0), create_test_entry("doc-1", 1)];
        let inserted = store.insert_batch(&entries).await.unwrap();
        assert_eq!(inserted, 2);

        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lance_search_returns_distances() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("search_test.lance");

        let store = LanceVectorStore::open(&lance_path).await.unwrap();

        let entries = vec![
            create_test_entry("doc-1", 0),
            create_test_entry("doc-2", 0),
            create_test_entry("doc-3", 0),
        ];
        store.insert_batch(&entries).await.unwrap();

        let query = vec![0.1; EMBEDDING_DIMENSION as usize];
        let hits = store.search(&query, 2).await.unwrap();

        assert!(!hits.is_empty());
        assert!(hits.len() <= 2);
        // 거리는 음수가 될 수 없음
        assert!(hits.iter().all(|h| h.distance >= 0.0));
    }

    #[tokio::test]
    async fn test_lance_search_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("empty_test.lance");

        let store = LanceVectorStore::open(&lance_path).await.unwrap();
        let query = vec![0.1; EMBEDDING_DIMENSION as usize];
        let hits = store.search(&query, 5).await.unwrap();

        assert!(hits.is_empty());
    }
}
