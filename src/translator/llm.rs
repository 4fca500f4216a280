//! LLM 쿼리 생성 경로
//!
//! 휴리스틱 조합 대신 생성 모델에 키워드-변형 생성을 위임하는 고정밀
//! 대안 경로입니다. 모델 출력은 스키마 검증 없이 그대로 실행됩니다.
//! 실행 시점 실패가 곧 검증이며, 검색 단계가 변형 단위 실패를 흡수합니다.

use std::sync::Arc;

use super::{dedup_variants, QueryVariant, VariantStrategy};
use crate::error::Result;
use crate::generation::{ChatMessage, GenerationProvider};
use crate::schema::GraphSchema;

/// 복수 쿼리 구분 토큰
pub const QUERY_SEPARATOR: &str = "***";

// ============================================================================
// LlmQueryGenerator
// ============================================================================

/// LLM 기반 Cypher 생성기
pub struct LlmQueryGenerator {
    provider: Arc<dyn GenerationProvider>,
    schema: GraphSchema,
    limit: usize,
}

impl LlmQueryGenerator {
    pub fn new(provider: Arc<dyn GenerationProvider>, schema: GraphSchema, limit: usize) -> Self {
        Self {
            provider,
            schema,
            limit,
        }
    }

    /// 질문에 대한 Cypher 변형 생성
    ///
    /// 프로바이더 에러는 그대로 전파됩니다 (호출자가 휴리스틱 경로로 폴백).
    pub async fn generate(&self, question: &str) -> Result<Vec<QueryVariant>> {
        let system = self.system_prompt();
        let prompt = format!("请为以下问题生成Cypher查询语句：\n{}", question);

        let reply = self
            .provider
            .complete(prompt, vec![ChatMessage::system(system)])
            .await?;

        let variants = parse_reply(&reply);
        tracing::debug!(count = variants.len(), "LLM generated query variants");
        Ok(variants)
    }

    /// 스키마 + 작성 예시가 포함된 시스템 프롬프트
    fn system_prompt(&self) -> String {
        format!(
            "你是一个专业的Neo4j Cypher查询生成器。请根据用户的问题生成对应的Cypher查询语句。\n\n\
             规则：\n\
             1. 仅使用提供的关系类型和属性\n\
             2. 不要使用未在schema中定义的关系类型或属性\n\
             3. 不要包含任何解释或歉意\n\
             4. 每个查询都要添加 LIMIT {limit}\n\
             5. 多个查询语句使用 {sep} 分隔，每个查询必须是完整的独立语句\n\
             6. 用反引号(```)包裹整个查询结果\n\
             7. 如果无法生成符合规则的查询，返回 MATCH (n) RETURN n LIMIT 0\n\
             8. 使用单引号(')表示字符串，使用 CONTAINS 进行模糊匹配\n\
             9. 对于博物馆名称，考虑中英文名称的变体，使用 OR 组合\n\n\
             数据库模式：\n{schema}\n\n\
             示例：\n\
             1. 某博物馆的文物查询：\n\
             MATCH (r:{relic})-[:{rel}]->(m:{museum})\n\
             WHERE toLower(m.{mname}) CONTAINS toLower('大英博物馆')\n   \
             OR toLower(m.{mname}) CONTAINS toLower('British Museum')\n\
             RETURN r.{rname} as relic_name, r.description as description, m.{mname} as museum_name LIMIT {limit}\n\
             2. 某文物的材质：\n\
             MATCH (r:{relic}) WHERE r.{rname} = '镂空模纹壶'\n\
             RETURN r.{rname} as relic_name, r.material_name as material_name LIMIT {limit}\n\
             3. 某文物收藏于哪个博物馆：\n\
             MATCH (r:{relic})-[:{rel}]->(m:{museum})\n\
             WHERE r.{rname} = '镂空模纹壶'\n\
             RETURN r.{rname} as relic_name, m.{mname} as museum_name LIMIT {limit}",
            limit = self.limit,
            sep = QUERY_SEPARATOR,
            schema = self.schema.schema_text(),
            relic = self.schema.relic_label,
            rel = self.schema.located_in_rel,
            museum = self.schema.museum_label,
            rname = self.schema.relic_name_attr,
            mname = self.schema.museum_name_attr,
        )
    }
}

// ============================================================================
// Reply Parsing
// ============================================================================

/// 모델 응답 파싱: 코드 펜스 제거 -> 구분 토큰 분리
pub fn parse_reply(reply: &str) -> Vec<QueryVariant> {
    let body = strip_fences(reply);

    let variants = body
        .split(QUERY_SEPARATOR)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| QueryVariant {
            cypher: q.to_string(),
            strategy: VariantStrategy::LlmGenerated,
        })
        .collect();

    dedup_variants(variants)
}

/// 코드 펜스와 언어 태그 제거
fn strip_fences(reply: &str) -> String {
    let mut body = reply.trim();

    // 펜스가 있으면 첫 펜스 쌍 내부만 사용
    if body.contains("```") {
        let mut parts = body.splitn(3, "```");
        let _ = parts.next();
        if let Some(inner) = parts.next() {
            body = inner;
        }
    }

    // 선두 언어 태그 (```cypher 등) 제거
    let body = body.trim();
    for tag in ["cypher", "sql"] {
        if let Some(rest) = body.strip_prefix(tag) {
            if rest.starts_with(['\n', '\r']) {
                return rest.trim().to_string();
            }
        }
    }

    body.to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_reply_with_separator() {
        let reply = "```cypher\nMATCH (r:CulturalRelic) RETURN r.name LIMIT 5\n***\nMATCH (m:Museum) RETURN m.museum_name LIMIT 5\n```";
        let variants = parse_reply(reply);

        assert_eq!(variants.len(), 2);
        assert!(variants[0].cypher.starts_with("MATCH (r:CulturalRelic)"));
        assert!(variants[1].cypher.starts_with("MATCH (m:Museum)"));
        assert!(variants
            .iter()
            .all(|v| v.strategy == VariantStrategy::LlmGenerated));
    }

    #[test]
    fn test_parse_unfenced_reply() {
        let reply = "MATCH (n) RETURN n LIMIT 10";
        let variants = parse_reply(reply);

        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].cypher, "MATCH (n) RETURN n LIMIT 10");
    }

    #[test]
    fn test_parse_empty_reply() {
        assert!(parse_reply("").is_empty());
        assert!(parse_reply("```\n```").is_empty());
    }

    #[test]
    fn test_parse_dedups_identical_queries() {
        let reply = "MATCH (n) RETURN n LIMIT 5\n***\nMATCH (n) RETURN n LIMIT 5";
        let variants = parse_reply(reply);
        assert_eq!(variants.len(), 1);
    }

    #[test]
    fn test_strip_language_tag_only_when_fenced_line() {
        // "cypher"로 시작하는 쿼리 본문을 언어 태그로 오인하지 않는다
        let reply = "cypher_index RETURN 1";
        let variants = parse_reply(reply);
        assert_eq!(variants[0].cypher, "cypher_index RETURN 1");
    }
}
