//! 쿼리 번역기 - 자연어 질문을 Cypher 변형 집합으로 변환
//!
//! 변환 경로는 세 가지이며 우선순위 순서로 시도됩니다:
//! 1. 패턴 인식기 (patterns): 정밀 구문 규칙, 일치하면 단일 변형으로 단락
//! 2. 조합 생성 (이 모듈): 키워드 단건 / 인접 쌍 / 앵커 조합 변형
//! 3. LLM 생성 (llm): 설정 시 스키마+예시 프롬프트로 위임
//!
//! 변형은 의도적으로 과잉 생성되며 일부는 실행 시점에 실패해도 됩니다.
//! 검색 단계가 변형 단위 실패를 흡수합니다.

pub mod llm;
pub mod patterns;

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::schema::GraphSchema;
use crate::segment::Segmenter;

// ============================================================================
// Types
// ============================================================================

/// 변형 생성 전략 태그
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantStrategy {
    /// 키워드 단건 (기본 속성 부분 일치)
    SingleKeyword,
    /// 인접 키워드 쌍 연결 (분절로 끊긴 복합어 보완)
    AdjacentPair,
    /// 앵커-키워드 조합 (양방향 속성 검색)
    AnchorCombination,
    /// 패턴 인식기 (규칙 이름 포함)
    Pattern(String),
    /// LLM 생성
    LlmGenerated,
}

/// 단일 쿼리 변형
///
/// 렌더링된 Cypher 텍스트가 동일하면 같은 변형으로 취급됩니다 (집합 의미).
#[derive(Debug, Clone)]
pub struct QueryVariant {
    /// 렌더링된 Cypher (LIMIT 포함)
    pub cypher: String,
    /// 생성 전략
    pub strategy: VariantStrategy,
}

// ============================================================================
// Translator
// ============================================================================

/// 휴리스틱 쿼리 번역기
pub struct Translator {
    schema: GraphSchema,
    segmenter: Arc<dyn Segmenter>,
    stop_words: HashSet<String>,
    rules: Vec<patterns::PatternRule>,
    limit: usize,
}

impl Translator {
    /// 스키마와 분절기로 생성
    pub fn new(schema: GraphSchema, segmenter: Arc<dyn Segmenter>, limit: usize) -> Self {
        Self {
            rules: patterns::default_rules(),
            schema,
            segmenter,
            stop_words: default_stop_words(),
            limit,
        }
    }

    /// 불용어 집합 교체
    pub fn with_stop_words(mut self, stop_words: HashSet<String>) -> Self {
        self.stop_words = stop_words;
        self
    }

    /// 질문에서 키워드 추출
    ///
    /// 분절 -> 불용어 제거 -> 길이 1 이하 토큰 제거.
    /// 순서는 질문 내 등장 순서를 유지합니다.
    pub fn extract_keywords(&self, question: &str) -> Vec<String> {
        self.segmenter
            .segment(question)
            .into_iter()
            .map(|t| t.to_lowercase())
            .filter(|t| t.chars().count() > 1 && !self.stop_words.contains(t))
            .collect()
    }

    /// 질문을 쿼리 변형 집합으로 번역
    ///
    /// 패턴 인식기가 먼저 실행되며 일치 시 조합 생성을 건너뜁니다.
    /// 키워드가 하나도 없으면 `TranslationFailure`.
    pub fn translate(&self, question: &str) -> Result<Vec<QueryVariant>> {
        // 1. 정밀 패턴 우선
        if let Some(variants) = patterns::recognize(&self.rules, question, &self.schema, self.limit)
        {
            tracing::debug!(count = variants.len(), "pattern recognizer matched");
            return Ok(dedup_variants(variants));
        }

        // 2. 조합 생성 폴백
        let keywords = self.extract_keywords(question);
        if keywords.is_empty() {
            return Err(PipelineError::TranslationFailure);
        }

        let mut variants = Vec::new();

        // 키워드 단건
        for kw in &keywords {
            variants.push(self.single_keyword_variant(kw));
        }

        // 인접 쌍 연결 (연결 결과는 불용어 재검사를 하지 않는다)
        for pair in keywords.windows(2) {
            let joined = format!("{}{}", pair[0], pair[1]);
            let mut v = self.single_keyword_variant(&joined);
            v.strategy = VariantStrategy::AdjacentPair;
            variants.push(v);
        }

        // 앵커 조합: 앵커가 질문에 있으면 나머지 키워드와 양방향 조합
        let anchor = self.schema.anchor_keyword.to_lowercase();
        if keywords.iter().any(|k| k == &anchor) {
            for kw in keywords.iter().filter(|k| *k != &anchor) {
                variants.push(self.anchor_variant(&anchor, kw));
            }
        }

        let variants = dedup_variants(variants);
        tracing::debug!(
            keywords = keywords.len(),
            variants = variants.len(),
            "combinatorial variants generated"
        );

        Ok(variants)
    }

    /// 키워드 단건 변형: 문물 이름 속성 부분 일치
    fn single_keyword_variant(&self, keyword: &str) -> QueryVariant {
        let s = &self.schema;
        let cypher = format!(
            "MATCH (r:{label}) \
             WHERE toLower(r.{name}) CONTAINS toLower('{kw}') \
             RETURN {ret} LIMIT {limit}",
            label = s.relic_label,
            name = s.relic_name_attr,
            kw = escape_literal(keyword),
            ret = s.relic_return_clause(),
            limit = self.limit,
        );
        QueryVariant {
            cypher,
            strategy: VariantStrategy::SingleKeyword,
        }
    }

    /// 앵커 조합 변형: 관계 양쪽 속성을 모두 탐색
    fn anchor_variant(&self, anchor: &str, keyword: &str) -> QueryVariant {
        let s = &self.schema;
        let cypher = format!(
            "MATCH (r:{relic})-[:{rel}]->(m:{museum}) \
             WHERE (toLower(r.{rname}) CONTAINS toLower('{kw}') \
             AND toLower(m.{mname}) CONTAINS toLower('{anchor}')) \
             OR (toLower(r.{rname}) CONTAINS toLower('{anchor}') \
             AND toLower(m.{mname}) CONTAINS toLower('{kw}')) \
             RETURN r.{rname} as relic_name, m.{mname} as museum_name LIMIT {limit}",
            relic = s.relic_label,
            rel = s.located_in_rel,
            museum = s.museum_label,
            rname = s.relic_name_attr,
            mname = s.museum_name_attr,
            kw = escape_literal(keyword),
            anchor = escape_literal(anchor),
            limit = self.limit,
        );
        QueryVariant {
            cypher,
            strategy: VariantStrategy::AnchorCombination,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 렌더링 텍스트 기준 중복 제거 (생성 순서 유지)
pub fn dedup_variants(variants: Vec<QueryVariant>) -> Vec<QueryVariant> {
    let mut seen = HashSet::new();
    variants
        .into_iter()
        .filter(|v| seen.insert(v.cypher.clone()))
        .collect()
}

/// Cypher 문자열 리터럴 이스케이프
pub fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// 기본 불용어 집합 (중국어 불용어 + 의문사)
pub fn default_stop_words() -> HashSet<String> {
    [
        "的", "了", "和", "是", "在", "我", "有", "这", "那", "你", "就", "也", "与",
        "而", "使", "一个", "吗", "呢", "吧", "啊", "什么", "哪些", "哪个", "哪里",
        "请问",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::LexiconSegmenter;

    fn translator() -> Translator {
        Translator::new(
            GraphSchema::default(),
            Arc::new(LexiconSegmenter::with_defaults()),
            10,
        )
    }

    #[test]
    fn test_keyword_union_variant_count() {
        // "red lacquer box" -> 키워드 3개 -> 단건 3 + 인접 쌍 2 = 최소 5 변형
        let t = translator();
        let variants = t.translate("red lacquer box").unwrap();
        assert!(variants.len() >= 5);

        let singles = variants
            .iter()
            .filter(|v| v.strategy == VariantStrategy::SingleKeyword)
            .count();
        let pairs = variants
            .iter()
            .filter(|v| v.strategy == VariantStrategy::AdjacentPair)
            .count();
        assert_eq!(singles, 3);
        assert_eq!(pairs, 2);
    }

    #[test]
    fn test_stop_words_only_fails() {
        let t = translator();
        let result = t.translate("的是吗");
        assert!(matches!(result, Err(PipelineError::TranslationFailure)));
    }

    #[test]
    fn test_translate_idempotent() {
        let t = translator();
        let a = t.translate("red lacquer box").unwrap();
        let b = t.translate("red lacquer box").unwrap();

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.cypher, y.cypher);
        }
    }

    #[test]
    fn test_variants_deduplicated() {
        let t = translator();
        // 반복 키워드는 동일 변형으로 접힘
        let variants = t.translate("lacquer lacquer").unwrap();
        let mut seen = HashSet::new();
        for v in &variants {
            assert!(seen.insert(v.cypher.clone()), "duplicate variant: {}", v.cypher);
        }
    }

    #[test]
    fn test_anchor_generates_both_directions() {
        let t = translator();
        // "青铜器 博物馆" -> 앵커 변형 포함
        let variants = t.translate("青铜器博物馆").unwrap();
        let anchored: Vec<_> = variants
            .iter()
            .filter(|v| v.strategy == VariantStrategy::AnchorCombination)
            .collect();
        assert!(!anchored.is_empty());
        // 양방향 탐색: 앵커가 관계 양쪽에 모두 나타남
        assert!(anchored[0].cypher.matches("CONTAINS").count() >= 4);
    }

    #[test]
    fn test_limit_embedded() {
        let t = translator();
        let variants = t.translate("lacquer box").unwrap();
        for v in &variants {
            assert!(v.cypher.contains("LIMIT 10"), "missing limit: {}", v.cypher);
        }
    }

    #[test]
    fn test_keyword_length_filter() {
        let t = translator();
        // 길이 1 토큰은 버려짐
        let keywords = t.extract_keywords("a red box");
        assert_eq!(keywords, vec!["red", "box"]);
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("it's"), "it\\'s");
        assert_eq!(escape_literal("back\\slash"), "back\\\\slash");
    }
}
