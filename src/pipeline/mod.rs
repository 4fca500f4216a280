//! 질의응답 파이프라인 - 단일 진입점
//!
//! 질문 -> 쿼리 번역 -> 검색 집계 -> 답변 합성의 흐름을 엮습니다.
//! 모든 외부 핸들(임베더, 저장소, 프로바이더)은 기동 시점에 구성되어
//! 주입됩니다. 전역 싱글톤이 없으므로 테스트에서는 페이크 구현을 그대로
//! 끼울 수 있습니다.
//!
//! 강등 규칙:
//! - 임베딩 불가 -> 벡터 경로만 스킵, 그래프 경로 진행
//! - 그래프 저장소 불가 -> 재시도 후 그래프 경로만 스킵, 벡터 경로 진행
//! - 번역 실패 -> 벡터 경로가 있으면 벡터 단독으로 진행, 없으면 호출자에 전파
//! - 프로바이더 전체 실패 -> 오프라인 폴백 답변

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::config::PipelineConfig;
use crate::embedding::{EmbeddingProvider, HttpEmbedding};
use crate::error::{PipelineError, Result};
use crate::generation::chain::ProviderChain;
use crate::generation::openai::OpenAiChatProvider;
use crate::generation::GenerationProvider;
use crate::retrieval::Retriever;
use crate::schema::GraphSchema;
use crate::segment::{LexiconSegmenter, Segmenter};
use crate::store::{get_data_dir, GraphStore, LanceVectorStore, Neo4jHttpStore, VectorStore};
use crate::synthesis::{AnswerChunk, ConversationMemory, Synthesizer};
use crate::translator::llm::LlmQueryGenerator;
use crate::translator::{QueryVariant, Translator};

// ============================================================================
// Pipeline
// ============================================================================

/// 검색-생성 파이프라인
pub struct Pipeline {
    config: PipelineConfig,
    translator: Translator,
    llm_generator: Option<LlmQueryGenerator>,
    retriever: Retriever,
    synthesizer: Synthesizer,
    vector: Option<Arc<dyn VectorStore>>,
    graph: Option<Arc<dyn GraphStore>>,
}

/// 파이프라인 구성 요소 상태
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    /// 벡터 인덱스 청크 수 (벡터 경로 미설정이면 None)
    pub vector_chunks: Option<usize>,
    /// 그래프 저장소 연결 상태 (그래프 경로 미설정이면 None)
    pub graph_ok: Option<bool>,
    /// 체인의 프로바이더 id 목록 (시도 순서)
    pub providers: Vec<String>,
}

impl Pipeline {
    /// 주입된 핸들로 파이프라인 조립
    ///
    /// 프로바이더가 하나도 없으면 즉시 실패합니다 (기동 시점 검증).
    pub fn new(
        config: PipelineConfig,
        schema: GraphSchema,
        segmenter: Arc<dyn Segmenter>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        vector: Option<Arc<dyn VectorStore>>,
        graph: Option<Arc<dyn GraphStore>>,
        providers: Vec<Arc<dyn GenerationProvider>>,
    ) -> Result<Self> {
        let chain = ProviderChain::new(providers, config.retries_per_provider)?;

        let llm_generator = if config.use_llm_translator {
            Some(LlmQueryGenerator::new(
                chain.primary(),
                schema.clone(),
                config.result_limit,
            ))
        } else {
            None
        };

        let mut retriever = Retriever::new(config.retrieval(&schema));
        if config.use_vector {
            if let (Some(e), Some(v)) = (&embedder, &vector) {
                retriever = retriever.with_vector(Arc::clone(e), Arc::clone(v));
            }
        }
        if config.use_graph {
            if let Some(g) = &graph {
                retriever = retriever.with_graph(Arc::clone(g));
            }
        }

        let translator = Translator::new(schema, segmenter, config.result_limit);

        Ok(Self {
            translator,
            llm_generator,
            retriever,
            synthesizer: Synthesizer::new(chain),
            vector,
            graph,
            config,
        })
    }

    /// 환경변수 설정으로 운영 구성 조립
    ///
    /// LanceDB는 `~/.relic-rag/vectors.lance`, Neo4j/프로바이더는 각자의
    /// 환경변수를 사용합니다.
    pub async fn from_env() -> Result<Self> {
        Self::with_config(PipelineConfig::from_env()).await
    }

    /// 주어진 설정으로 운영 구성 조립 (핸들은 환경변수에서)
    pub async fn with_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let schema = GraphSchema::default();
        let segmenter: Arc<dyn Segmenter> = Arc::new(LexiconSegmenter::with_defaults());

        let (embedder, vector) = if config.use_vector {
            let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HttpEmbedding::from_env()?);
            let lance_path = get_data_dir().join("vectors.lance");
            let store: Arc<dyn VectorStore> =
                Arc::new(LanceVectorStore::open(&lance_path).await?);
            (Some(embedder), Some(store))
        } else {
            (None, None)
        };

        let graph: Option<Arc<dyn GraphStore>> = if config.use_graph {
            let store = Neo4jHttpStore::from_env()?
                .with_timeouts(30, config.ping_timeout_secs);
            Some(Arc::new(store))
        } else {
            None
        };

        let providers: Vec<Arc<dyn GenerationProvider>> = config
            .providers
            .iter()
            .map(|p| {
                Arc::new(OpenAiChatProvider::new(
                    &p.id,
                    &p.base_url,
                    &p.model,
                    p.api_key(),
                    p.timeout_secs,
                )) as Arc<dyn GenerationProvider>
            })
            .collect();

        Self::new(config, schema, segmenter, embedder, vector, graph, providers)
    }

    /// 설정 참조
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 설정된 용량의 새 대화 기억 생성
    pub fn new_memory(&self) -> ConversationMemory {
        ConversationMemory::new(self.config.memory_capacity)
    }

    /// 질문에 답변 (단일 진입점)
    ///
    /// 답변 조각의 순서 있는 스트림을 반환하며, 스트림은 반드시
    /// `AnswerChunk::Done`으로 끝납니다. 에러로 끝나는 유일한 경우는
    /// 그래프 경로가 유일한 검색 경로인데 질문을 해석할 수 없을 때입니다.
    pub async fn answer(
        &self,
        question: &str,
        memory: &ConversationMemory,
    ) -> Result<BoxStream<'_, AnswerChunk>> {
        let variants = self.plan_graph_variants(question).await?;

        let evidence = self.retriever.gather(question, &variants).await;
        tracing::info!(
            variants = variants.len(),
            evidence = evidence.len(),
            "retrieval complete"
        );

        Ok(self
            .synthesizer
            .stream_answer(question.to_string(), evidence, memory))
    }

    /// 그래프 쿼리 변형 계획
    ///
    /// LLM 경로가 설정되어 있으면 먼저 시도하고, 실패하거나 빈 결과면
    /// 휴리스틱 경로로 폴백합니다.
    async fn plan_graph_variants(&self, question: &str) -> Result<Vec<QueryVariant>> {
        if !self.config.use_graph || !self.retriever.has_graph() {
            return Ok(vec![]);
        }

        if let Some(generator) = &self.llm_generator {
            match generator.generate(question).await {
                Ok(variants) if !variants.is_empty() => return Ok(variants),
                Ok(_) => {
                    tracing::debug!("LLM translator returned no variants, using heuristics");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "LLM translator failed, using heuristics");
                }
            }
        }

        match self.translator.translate(question) {
            Ok(variants) => Ok(variants),
            Err(PipelineError::TranslationFailure) => {
                if self.config.use_vector && self.retriever.has_vector() {
                    // 벡터 경로가 있으면 그래프 없이 진행
                    tracing::warn!("no usable keywords, degrading to vector-only retrieval");
                    Ok(vec![])
                } else {
                    Err(PipelineError::TranslationFailure)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// 구성 요소 상태 점검
    pub async fn status(&self) -> PipelineStatus {
        let vector_chunks = match &self.vector {
            Some(store) => store.count().await.ok(),
            None => None,
        };

        let graph_ok = match &self.graph {
            Some(store) => Some(store.ping().await.is_ok()),
            None => None,
        };

        PipelineStatus {
            vector_chunks,
            graph_ok,
            providers: self.synthesizer.chain().provider_names(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
