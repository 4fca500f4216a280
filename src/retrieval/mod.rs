//! 검색 집계 모듈
//!
//! 벡터/그래프 두 경로의 검색 결과를 모아 증거 집합(EvidenceSet)을 만듭니다.
//! 빈 결과는 유효한 결과이며, 경로 단위 실패는 다른 경로로 강등됩니다.
//! 파이프라인은 전체 실패 대신 단일 출처 증거로 degrade 합니다.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::embedding::EmbeddingProvider;
use crate::error::{PipelineError, Result};
use crate::store::{GraphRecord, GraphStore, VectorHit, VectorStore};
use crate::translator::QueryVariant;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 항목 (출처 저장소 태그 포함)
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievedItem {
    /// 벡터 검색 결과
    Vector {
        /// 청크 텍스트
        content: String,
        /// 출처 문서 식별자
        source_id: String,
        /// 유사도 퍼센트 (0-100)
        similarity: f32,
    },
    /// 그래프 검색 결과: 엔티티 + 속성 쌍들
    Graph {
        /// 엔티티 이름
        entity: String,
        /// (속성, 값) 쌍
        attributes: Vec<(String, String)>,
    },
}

impl RetrievedItem {
    /// 중복 제거 키
    ///
    /// 벡터: 콘텐츠 앞 100자, 그래프: 엔티티 이름.
    pub fn dedup_key(&self) -> String {
        match self {
            RetrievedItem::Vector { content, .. } => content.chars().take(100).collect(),
            RetrievedItem::Graph { entity, .. } => entity.clone(),
        }
    }
}

/// 증거 집합: 중복 제거, 임계 필터, 크기 제한이 적용된 순서 있는 항목 열
pub type EvidenceSet = Vec<RetrievedItem>;

/// 검색 집계 설정
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// 벡터 검색 top-K
    pub top_k: usize,
    /// 유사도 임계값 (0-100)
    pub similarity_threshold: f32,
    /// 증거 집합 최대 크기 (프롬프트 크기 제한)
    pub max_evidence: usize,
    /// StoreUnavailable 재시도 횟수
    pub store_retries: u32,
    /// 재시도 간 고정 지연
    pub retry_delay: Duration,
    /// 결과 행에서 엔티티 이름으로 쓸 컬럼 우선순위
    pub entity_name_columns: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 60.0,
            max_evidence: 30,
            store_retries: 2,
            retry_delay: Duration::from_secs(1),
            entity_name_columns: vec![
                "relic_name".to_string(),
                "name".to_string(),
                "museum_name".to_string(),
            ],
        }
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// 검색 집계기
///
/// 저장소/임베딩 핸들은 기동 시점에 주입됩니다. 설정되지 않은 경로는
/// 호출 없이 건너뜁니다.
pub struct Retriever {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    vector: Option<Arc<dyn VectorStore>>,
    graph: Option<Arc<dyn GraphStore>>,
    config: RetrievalConfig,
}

impl Retriever {
    /// 새 집계기 생성
    pub fn new(config: RetrievalConfig) -> Self {
        Self {
            embedder: None,
            vector: None,
            graph: None,
            config,
        }
    }

    /// 벡터 경로 구성 (임베더 + 벡터 저장소)
    pub fn with_vector(
        mut self,
        embedder: Arc<dyn EmbeddingProvider>,
        vector: Arc<dyn VectorStore>,
    ) -> Self {
        self.embedder = Some(embedder);
        self.vector = Some(vector);
        self
    }

    /// 그래프 경로 구성
    pub fn with_graph(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// 벡터 경로 사용 가능 여부
    pub fn has_vector(&self) -> bool {
        self.embedder.is_some() && self.vector.is_some()
    }

    /// 그래프 경로 사용 가능 여부
    pub fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// 질문에 대한 증거 집합 수집
    ///
    /// 그래프 변형 실행 결과가 먼저, 벡터 결과가 뒤에 붙습니다.
    /// 한 경로가 실패하면 로그만 남기고 다른 경로 결과로 degrade 합니다.
    pub async fn gather(&self, question: &str, variants: &[QueryVariant]) -> EvidenceSet {
        let graph_fut = self.graph_path(variants);
        let vector_fut = self.vector_path(question);
        let (graph_result, vector_result) = futures::join!(graph_fut, vector_fut);

        let mut evidence = EvidenceSet::new();

        match graph_result {
            Ok(items) => evidence.extend(items),
            Err(e) => {
                tracing::warn!(error = %e, "graph retrieval path skipped");
            }
        }

        match vector_result {
            Ok(items) => evidence.extend(items),
            Err(e) => {
                tracing::warn!(error = %e, "vector retrieval path skipped");
            }
        }

        // 프롬프트 크기 제한
        evidence.truncate(self.config.max_evidence);
        evidence
    }

    /// 벡터 경로: 임베딩 -> top-K 검색 -> 필터링
    pub async fn vector_path(&self, question: &str) -> Result<Vec<RetrievedItem>> {
        let (Some(embedder), Some(vector)) = (&self.embedder, &self.vector) else {
            return Ok(vec![]);
        };

        // 임베딩 실패 시 벡터 경로 전체 스킵 (호출자가 로그)
        let embedding = embedder.embed(question).await?;

        let top_k = self.config.top_k;
        let hits = self
            .with_retries("vector search", || vector.search(&embedding, top_k))
            .await?;

        Ok(filter_vector_hits(hits, self.config.similarity_threshold))
    }

    /// 그래프 경로: 변형 실행 -> 결과 합집합 -> 엔티티 중복 제거
    ///
    /// 변형 개수에 따라 분기: 0개면 저장소 호출 없음, 여러 개면 동시 실행 후
    /// 변형 순서대로 이어붙입니다 (완료 순서가 아니라 생성 순서이므로 중복
    /// 엔티티는 가장 낮은 인덱스의 변형 결과가 남습니다). 변형 하나의 구문 에러는
    /// 삼켜지고 나머지 변형은 계속 실행됩니다.
    pub async fn graph_path(&self, variants: &[QueryVariant]) -> Result<Vec<RetrievedItem>> {
        let Some(graph) = &self.graph else {
            return Ok(vec![]);
        };
        if variants.is_empty() {
            return Ok(vec![]);
        }

        let executions = variants.iter().map(|v| {
            let cypher = v.cypher.clone();
            async move {
                self.with_retries("graph query", || graph.query(&cypher))
                    .await
            }
        });

        // join_all은 입력 순서를 보존한다
        let results = futures::future::join_all(executions).await;

        let mut all_records: Vec<GraphRecord> = Vec::new();
        let mut unavailable = 0usize;

        for (variant, result) in variants.iter().zip(results) {
            match result {
                Ok(records) => {
                    tracing::debug!(
                        strategy = ?variant.strategy,
                        rows = records.len(),
                        "graph variant executed"
                    );
                    all_records.extend(records);
                }
                Err(PipelineError::QuerySyntax(msg)) => {
                    // 과잉 생성된 변형의 일부 실패는 예상된 동작
                    tracing::warn!(
                        cypher = %variant.cypher,
                        error = %msg,
                        "malformed query variant skipped"
                    );
                }
                Err(e) => {
                    tracing::warn!(cypher = %variant.cypher, error = %e, "graph variant failed");
                    unavailable += 1;
                }
            }
        }

        // 모든 변형이 연결 실패면 경로 자체가 죽은 것
        if unavailable == variants.len() {
            return Err(PipelineError::StoreUnavailable(
                "all graph query variants failed".to_string(),
            ));
        }

        Ok(dedup_graph_records(
            all_records,
            &self.config.entity_name_columns,
        ))
    }

    /// StoreUnavailable에 한해 고정 지연 재시도
    async fn with_retries<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e @ PipelineError::StoreUnavailable(_)) if attempt < self.config.store_retries => {
                    attempt += 1;
                    tracing::warn!(
                        what,
                        attempt,
                        error = %e,
                        "store unavailable, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ============================================================================
// Filtering & Dedup
// ============================================================================

/// 저장소 원시 거리를 유사도 퍼센트로 변환
///
/// 거리가 [0,100] 범위라는 가정 하의 아핀 변환이며, 범위를 벗어나는
/// 거리 지표에 대해서는 clamp가 실질적인 방어선입니다.
pub fn distance_to_similarity(distance: f32) -> f32 {
    (100.0 * (1.0 - distance / 100.0)).clamp(0.0, 100.0)
}

/// 벡터 히트 필터링: 임계값 -> 최상위 보존 -> 접두사 중복 제거
///
/// 임계값 미달로 전부 버려져도 결과가 하나라도 있었다면 최고 점수
/// 항목 하나는 남깁니다 (답변 앵커 보장).
pub fn filter_vector_hits(hits: Vec<VectorHit>, threshold: f32) -> Vec<RetrievedItem> {
    let items: Vec<RetrievedItem> = hits
        .into_iter()
        .map(|h| RetrievedItem::Vector {
            similarity: distance_to_similarity(h.distance),
            content: h.content,
            source_id: h.source_id,
        })
        .collect();

    if items.is_empty() {
        return vec![];
    }

    let mut filtered: Vec<RetrievedItem> = items
        .iter()
        .filter(|item| match item {
            RetrievedItem::Vector { similarity, .. } => *similarity >= threshold,
            _ => false,
        })
        .cloned()
        .collect();

    // 전부 탈락하면 최상위(저장소 랭킹 첫 번째) 하나는 유지
    if filtered.is_empty() {
        filtered.push(items[0].clone());
    }

    dedup_by_key(filtered)
}

/// 그래프 레코드를 증거 항목으로 변환하고 엔티티 이름으로 중복 제거
pub fn dedup_graph_records(
    records: Vec<GraphRecord>,
    name_columns: &[String],
) -> Vec<RetrievedItem> {
    let items = records
        .iter()
        .filter_map(|r| record_to_item(r, name_columns))
        .collect();
    dedup_by_key(items)
}

/// dedup 키 기준으로 첫 등장만 유지
fn dedup_by_key(items: Vec<RetrievedItem>) -> Vec<RetrievedItem> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.dedup_key()))
        .collect()
}

/// 결과 행 -> 그래프 증거 항목
///
/// 엔티티 이름은 설정된 컬럼 우선순위에서 찾고, 없으면 첫 번째 문자열
/// 값을 씁니다. 쓸 수 있는 값이 하나도 없는 행은 버립니다.
fn record_to_item(record: &GraphRecord, name_columns: &[String]) -> Option<RetrievedItem> {
    let entity_col = name_columns
        .iter()
        .find(|col| {
            record
                .iter()
                .any(|(k, v)| k == *col && matches!(v, Value::String(s) if !s.is_empty()))
        })
        .cloned()
        .or_else(|| {
            record
                .iter()
                .find(|(_, v)| matches!(v, Value::String(s) if !s.is_empty()))
                .map(|(k, _)| k.clone())
        })?;

    let entity = record
        .iter()
        .find(|(k, _)| *k == entity_col)
        .and_then(|(_, v)| v.as_str())
        .map(str::to_string)?;

    let attributes = record
        .iter()
        .filter(|(k, v)| *k != entity_col && !v.is_null())
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect();

    Some(RetrievedItem::Graph { entity, attributes })
}

// ============================================================================
// Tests
// ============================================================================
