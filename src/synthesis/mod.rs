//! 답변 합성 모듈
//!
//! 증거 집합과 질문을 출처 표기 프롬프트로 엮어 프로바이더 체인을 구동하고,
//! 답변 조각을 스트리밍합니다. 내부 실패는 호출자에게 전파되지 않습니다.
//! 모든 실패 경로는 오프라인 폴백 포매터로 강등되며, 스트림은 항상 종료
//! 마커가 있는 유한 열로 끝납니다.

pub mod fallback;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::generation::chain::{ChainEvent, ProviderChain};
use crate::generation::ChatMessage;
use crate::retrieval::{EvidenceSet, RetrievedItem};

// ============================================================================
// Provenance
// ============================================================================

/// 증거 기반 답변 태그 (답변 첫 줄)
pub const EVIDENCE_TAG: &str = "【基于知识图谱】";
/// 모델 자체 지식 답변 태그 (답변 첫 줄)
pub const MODEL_TAG: &str = "【AI回答】";

/// 답변 출처 구분
///
/// 최종 답변 텍스트의 첫 줄 태그에서 파싱됩니다. 다운스트림 UI가 이 값으로
/// 출처 표시를 렌더링합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// 검색된 증거에 근거한 답변
    EvidenceGrounded,
    /// 모델 자체 지식만 사용한 답변
    ModelOnly,
}

impl Provenance {
    /// 답변 선두 텍스트에서 출처 태그 파싱
    ///
    /// 태그가 없으면 모델 지식으로 간주합니다.
    pub fn parse(answer_head: &str) -> Self {
        let head = answer_head.trim_start();
        if head.starts_with(EVIDENCE_TAG) {
            Provenance::EvidenceGrounded
        } else {
            Provenance::ModelOnly
        }
    }
}

// ============================================================================
// AnswerChunk
// ============================================================================

/// 스트리밍 답변 조각
///
/// 순서 있는 1회성 열이며, `Done`이 종료 마커입니다.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerChunk {
    /// 텍스트 조각
    Delta(String),
    /// 종료 마커 + 답변 메타데이터
    Done(AnswerMeta),
}

/// 완료된 답변의 메타데이터
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerMeta {
    /// 첫 줄 태그에서 파싱한 출처
    pub provenance: Provenance,
    /// 답변을 생성한 프로바이더 (오프라인 폴백이면 None)
    pub provider: Option<String>,
    /// 오프라인 폴백 사용 여부
    pub offline_fallback: bool,
}

// ============================================================================
// ConversationMemory
// ============================================================================

/// 대화 기억 항목
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// 제한 용량 대화 기억
///
/// (질문, 답변) 쌍을 최대 K개 유지하며, 넘치면 가장 오래된 항목부터
/// 버립니다. 합성 세션이 소유하고 검색 단계는 접근하지 않습니다.
#[derive(Debug)]
pub struct ConversationMemory {
    entries: VecDeque<MemoryEntry>,
    capacity: usize,
}

impl ConversationMemory {
    /// 용량 K로 생성
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 대화 한 쌍 저장 (용량 초과 시 오래된 항목 축출)
    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(MemoryEntry {
            question: question.into(),
            answer: answer.into(),
            created_at: Utc::now(),
        });
    }

    /// 기억 초기화
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 프로바이더 이력 메시지로 변환 (user/assistant 교대)
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.entries.len() * 2);
        for entry in &self.entries {
            messages.push(ChatMessage::user(entry.question.clone()));
            messages.push(ChatMessage::assistant(entry.answer.clone()));
        }
        messages
    }
}

// ============================================================================
// Prompt Construction
// ============================================================================

/// 시스템 프롬프트
const SYSTEM_PROMPT: &str = "你是一个专业的博物馆文物知识问答助手。请基于检索到的参考信息，准确回答用户的问题。";

/// 증거 집합을 번호 목록으로 렌더링
///
/// 벡터 항목은 유사도 퍼센트를, 그래프 항목은 key:value 쌍을 포함합니다.
pub fn render_evidence(evidence: &EvidenceSet) -> String {
    if evidence.is_empty() {
        return "None".to_string();
    }

    let mut lines = Vec::with_capacity(evidence.len());
    for (i, item) in evidence.iter().enumerate() {
        match item {
            RetrievedItem::Vector {
                content,
                similarity,
                ..
            } => {
                lines.push(format!(
                    "文档 {} (相似度: {:.2}%):\n{}",
                    i + 1,
                    similarity,
                    content
                ));
            }
            RetrievedItem::Graph { entity, attributes } => {
                let attrs = attributes
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join(" | ");
                if attrs.is_empty() {
                    lines.push(format!("{}. {}", i + 1, entity));
                } else {
                    lines.push(format!("{}. {} | {}", i + 1, entity, attrs));
                }
            }
        }
    }

    lines.join("\n\n")
}

/// 질문 + 증거 -> 출처 표기 지시가 포함된 프롬프트
///
/// 지시 우선순위: (1) 증거로 답할 수 있으면 증거만으로 답변,
/// (2) 증거가 무관하면 답변 불가를 명시, (3) 첫 줄에 출처 태그.
pub fn build_prompt(question: &str, evidence: &EvidenceSet) -> String {
    format!(
        "问题：\"{question}\"\n\
         检索到的参考信息：\n{evidence}\n\n\
         请先考虑参考信息，再结合自身能力和知识回答问题。\n\n\
         回答要求：\n\
         1. 如果参考信息能解答问题，请仅根据参考信息详细回答\n\
         2. 如果参考信息为 None 或与问题无关，请明确说明无法根据资料回答\n\
         3. 若使用了参考信息，以\"{evidence_tag}\"开头\n\
         4. 若参考信息为 None 或帮助很小，以\"{model_tag}\"开头\n\
         5. 必须在回答最开头标注信息来源，标注必须使用中文方括号【】\n\
         6. 标注后换行再开始回答",
        question = question,
        evidence = render_evidence(evidence),
        evidence_tag = EVIDENCE_TAG,
        model_tag = MODEL_TAG,
    )
}

// ============================================================================
// Synthesizer
// ============================================================================

/// provenance 파싱에 쓰는 답변 선두 길이 (문자)
const HEAD_CHARS: usize = 64;

/// 답변 합성기
pub struct Synthesizer {
    chain: ProviderChain,
}

impl Synthesizer {
    pub fn new(chain: ProviderChain) -> Self {
        Self { chain }
    }

    /// 체인 참조 (상태 조회용)
    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    /// 답변 스트리밍
    ///
    /// 조각은 프로바이더에서 도착하는 대로 전달되며, 스트림은 반드시
    /// `AnswerChunk::Done`으로 끝납니다. 프로바이더가 전부 실패하거나
    /// 빈 스트림을 반환하면 오프라인 폴백 텍스트가 단일 조각으로 나갑니다.
    /// 스트림을 드롭하면 진행 중인 프로바이더 요청이 취소됩니다.
    pub fn stream_answer(
        &self,
        question: String,
        evidence: EvidenceSet,
        memory: &ConversationMemory,
    ) -> BoxStream<'_, AnswerChunk> {
        let mut history = vec![ChatMessage::system(SYSTEM_PROMPT)];
        history.extend(memory.to_messages());
        let prompt = build_prompt(&question, &evidence);

        Box::pin(async_stream::stream! {
            let mut head = String::new();
            let mut events = self.chain.stream(prompt, history);
            let mut done = false;

            while let Some(event) = events.next().await {
                match event {
                    ChainEvent::Fragment(text) => {
                        if head.chars().count() < HEAD_CHARS {
                            head.push_str(&text);
                        }
                        yield AnswerChunk::Delta(text);
                    }
                    ChainEvent::Switched { to, restarted } => {
                        tracing::info!(next = %to, restarted, "switching generation provider");
                        if restarted {
                            // 이전 프로바이더의 부분 출력은 버리고 새로 누적
                            head.clear();
                        }
                    }
                    ChainEvent::Done {
                        provider,
                        fragments,
                    } => {
                        if fragments == 0 {
                            // 빈 스트림 방어: 결정적 폴백 조각 하나를 보장
                            let text = fallback::format_offline(&evidence);
                            yield AnswerChunk::Delta(text.clone());
                            yield AnswerChunk::Done(AnswerMeta {
                                provenance: Provenance::parse(&text),
                                provider: Some(provider),
                                offline_fallback: true,
                            });
                        } else {
                            yield AnswerChunk::Done(AnswerMeta {
                                provenance: Provenance::parse(&head),
                                provider: Some(provider),
                                offline_fallback: false,
                            });
                        }
                        done = true;
                    }
                    ChainEvent::Exhausted => {
                        let text = fallback::format_offline(&evidence);
                        yield AnswerChunk::Delta(text.clone());
                        yield AnswerChunk::Done(AnswerMeta {
                            provenance: Provenance::parse(&text),
                            provider: None,
                            offline_fallback: true,
                        });
                        done = true;
                    }
                }
            }

            // 체인 스트림이 종료 이벤트 없이 끝나도 빈 스트림은 내보내지 않는다
            if !done {
                let text = fallback::format_offline(&evidence);
                yield AnswerChunk::Delta(text.clone());
                yield AnswerChunk::Done(AnswerMeta {
                    provenance: Provenance::parse(&text),
                    provider: None,
                    offline_fallback: true,
                });
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::generation::{FragmentStream, GenerationProvider};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct ScriptedProvider {
        id: String,
        fragments: Vec<String>,
        fail: bool,
    }

    impl ScriptedProvider {
        fn ok(id: &str, fragments: &[&str]) -> Arc<dyn GenerationProvider> {
            Arc::new(Self {
                id: id.to_string(),
                fragments: fragments.iter().map(|s| s.to_string()).collect(),
                fail: false,
            })
        }

        fn failing(id: &str) -> Arc<dyn GenerationProvider> {
            Arc::new(Self {
                id: id.to_string(),
                fragments: vec![],
                fail: true,
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.id
        }

        fn stream(&self, _prompt: String, _history: Vec<ChatMessage>) -> FragmentStream<'_> {
            let fragments = self.fragments.clone();
            let fail = self.fail;
            let id = self.id.clone();
            Box::pin(async_stream::stream! {
                if fail {
                    yield Err(PipelineError::provider(&id, "down"));
                    return;
                }
                for f in fragments {
                    yield Ok(f);
                }
            })
        }
    }

    fn graph_item(entity: &str, attrs: &[(&str, &str)]) -> RetrievedItem {
        RetrievedItem::Graph {
            entity: entity.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    async fn collect_chunks(synth: &Synthesizer, evidence: EvidenceSet) -> Vec<AnswerChunk> {
        let memory = ConversationMemory::new(5);
        synth
            .stream_answer("X是什么材质的？".to_string(), evidence, &memory)
            .collect()
            .await
    }

    // -- 기억 --

    #[test]
    fn test_memory_eviction() {
        let mut memory = ConversationMemory::new(2);
        memory.push("q1", "a1");
        memory.push("q2", "a2");
        memory.push("q3", "a3");

        assert_eq!(memory.len(), 2);
        let messages = memory.to_messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, "q2");
    }

    #[test]
    fn test_memory_zero_capacity() {
        let mut memory = ConversationMemory::new(0);
        memory.push("q", "a");
        assert!(memory.is_empty());
    }

    // -- 프롬프트 --

    #[test]
    fn test_prompt_contains_evidence_value() {
        // 증거 값("jade")이 프롬프트 컨텍스트에 그대로 들어가야 한다
        let evidence = vec![graph_item("X", &[("material", "jade")])];
        let prompt = build_prompt("What is X made of?", &evidence);

        assert!(prompt.contains("jade"));
        assert!(prompt.contains(EVIDENCE_TAG));
        assert!(prompt.contains(MODEL_TAG));
    }

    #[test]
    fn test_prompt_empty_evidence_is_none() {
        let prompt = build_prompt("问题", &vec![]);
        assert!(prompt.contains("None"));
    }

    #[test]
    fn test_render_evidence_numbered_with_similarity() {
        let evidence = vec![
            RetrievedItem::Vector {
                content: "唐三彩介绍".to_string(),
                source_id: "doc-1".to_string(),
                similarity: 87.5,
            },
            graph_item("青铜鼎", &[("dynasty", "商代")]),
        ];
        let rendered = render_evidence(&evidence);

        assert!(rendered.contains("文档 1 (相似度: 87.50%)"));
        assert!(rendered.contains("2. 青铜鼎 | dynasty: 商代"));
    }

    // -- 출처 파싱 --

    #[test]
    fn test_provenance_parse() {
        assert_eq!(
            Provenance::parse("【基于知识图谱】\n答案"),
            Provenance::EvidenceGrounded
        );
        assert_eq!(Provenance::parse("【AI回答】\n答案"), Provenance::ModelOnly);
        assert_eq!(Provenance::parse("无标注的回答"), Provenance::ModelOnly);
    }

    // -- 스트리밍 --

    #[tokio::test]
    async fn test_grounded_answer_stream() {
        let chain = ProviderChain::new(
            vec![ScriptedProvider::ok("a", &["【基于知识图谱】\n", "X由jade制成"])],
            0,
        )
        .unwrap();
        let synth = Synthesizer::new(chain);

        let evidence = vec![graph_item("X", &[("material", "jade")])];
        let chunks = collect_chunks(&synth, evidence).await;

        assert_eq!(
            chunks[0],
            AnswerChunk::Delta("【基于知识图谱】\n".to_string())
        );
        match chunks.last().unwrap() {
            AnswerChunk::Done(meta) => {
                assert_eq!(meta.provenance, Provenance::EvidenceGrounded);
                assert_eq!(meta.provider.as_deref(), Some("a"));
                assert!(!meta.offline_fallback);
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_provider_stream_yields_fallback_chunk() {
        let chain = ProviderChain::new(vec![ScriptedProvider::ok("a", &[])], 0).unwrap();
        let synth = Synthesizer::new(chain);

        let chunks = collect_chunks(&synth, vec![graph_item("青铜鼎", &[])]).await;

        // 빈 스트림 대신 폴백 조각 + 종료 마커
        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[0], AnswerChunk::Delta(t) if !t.is_empty()));
        assert!(matches!(
            chunks.last().unwrap(),
            AnswerChunk::Done(meta) if meta.offline_fallback
        ));
    }

    #[tokio::test]
    async fn test_all_providers_fail_terminates_with_fallback() {
        let chain = ProviderChain::new(
            vec![
                ScriptedProvider::failing("a"),
                ScriptedProvider::failing("b"),
                ScriptedProvider::failing("c"),
            ],
            1,
        )
        .unwrap();
        let synth = Synthesizer::new(chain);

        let evidence = vec![graph_item("青铜鼎", &[("dynasty", "商代")])];
        let chunks = collect_chunks(&synth, evidence).await;

        // 유한 단계 내 종료 + 오프라인 폴백 답변
        match chunks.last().unwrap() {
            AnswerChunk::Done(meta) => {
                assert!(meta.offline_fallback);
                assert!(meta.provider.is_none());
                assert_eq!(meta.provenance, Provenance::EvidenceGrounded);
            }
            other => panic!("expected Done, got {:?}", other),
        }
        assert!(matches!(&chunks[0], AnswerChunk::Delta(t) if t.contains("青铜鼎")));
    }

    #[tokio::test]
    async fn test_failover_uses_second_provider() {
        let chain = ProviderChain::new(
            vec![
                ScriptedProvider::failing("a"),
                ScriptedProvider::ok("b", &["【AI回答】\n模型回答"]),
            ],
            0,
        )
        .unwrap();
        let synth = Synthesizer::new(chain);

        let chunks = collect_chunks(&synth, vec![]).await;

        match chunks.last().unwrap() {
            AnswerChunk::Done(meta) => {
                assert_eq!(meta.provider.as_deref(), Some("b"));
                assert_eq!(meta.provenance, Provenance::ModelOnly);
            }
            other => panic!("expected Done, got {:?}", other),
        }
    }
}
