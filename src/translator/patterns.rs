//! 정밀 패턴 인식기
//!
//! 자주 나오는 질문 구문을 순서 있는 (판별, 처리) 규칙 테이블로 인식합니다.
//! 규칙이 일치하면 조합 생성 대신 정밀한 단일 변형을 반환합니다 (정밀도 우선,
//! 조합 폴백은 재현율 담당). 규칙은 독립적으로 추가/재배열/테스트할 수 있습니다.
//!
//! 구문 규칙은 중국어 어순 기준이며, 일치 실패 시 다음 규칙으로 넘어갑니다.

use regex::Regex;

use super::{escape_literal, QueryVariant, VariantStrategy};
use crate::schema::GraphSchema;

// ============================================================================
// PatternRule
// ============================================================================

/// 패턴 규칙: 판별자 + 처리자
///
/// 판별자가 참이어도 처리자가 이름 추출에 실패하면(None) 다음 규칙으로
/// 넘어갑니다.
pub struct PatternRule {
    /// 규칙 이름 (변형의 전략 태그로 기록)
    pub name: &'static str,
    /// 구문 판별자
    pub predicate: fn(&str) -> bool,
    /// 변형 생성자
    pub handler: fn(&str, &GraphSchema, usize) -> Option<Vec<QueryVariant>>,
}

/// 규칙 테이블을 순서대로 평가
pub fn recognize(
    rules: &[PatternRule],
    question: &str,
    schema: &GraphSchema,
    limit: usize,
) -> Option<Vec<QueryVariant>> {
    for rule in rules {
        if (rule.predicate)(question) {
            if let Some(variants) = (rule.handler)(question, schema, limit) {
                tracing::debug!(rule = rule.name, "pattern rule matched");
                return Some(variants);
            }
        }
    }
    None
}

/// 기본 규칙 테이블 (평가 순서 = 배열 순서)
pub fn default_rules() -> Vec<PatternRule> {
    vec![
        PatternRule {
            name: "museum-relics",
            predicate: |q| {
                Regex::new(r"博物馆.*(文物|藏品|展品)").unwrap().is_match(q)
            },
            handler: museum_relics,
        },
        PatternRule {
            name: "relic-membership",
            predicate: |q| q.contains("属于") && q.contains("博物馆"),
            handler: relic_membership,
        },
        PatternRule {
            name: "relic-location",
            predicate: |q| {
                ["收藏于", "收藏地", "在哪", "哪里"].iter().any(|p| q.contains(p))
                    || (q.contains('在') && q.contains("博物馆"))
            },
            handler: relic_location,
        },
        PatternRule {
            name: "relic-material",
            predicate: |q| q.contains("材质"),
            handler: relic_material,
        },
        PatternRule {
            name: "relic-basic-info",
            predicate: |q| q.contains("基本信息"),
            handler: relic_basic_info,
        },
        PatternRule {
            name: "relic-dynasty",
            predicate: |q| q.contains("朝代") || q.contains("年代"),
            handler: relic_dynasty,
        },
        PatternRule {
            name: "relic-size",
            predicate: |q| q.contains("尺寸") || q.contains("多大"),
            handler: relic_size,
        },
        PatternRule {
            name: "relic-author",
            predicate: |q| q.contains("作者") || q.contains("谁制作"),
            handler: relic_author,
        },
        PatternRule {
            name: "museum-intro",
            predicate: |q| q.contains("简介") && q.contains("博物馆"),
            handler: museum_intro,
        },
    ]
}

// ============================================================================
// Handlers
// ============================================================================

/// 박물관 소장 문물 나열: "大英博物馆有哪些文物"
fn museum_relics(question: &str, schema: &GraphSchema, limit: usize) -> Option<Vec<QueryVariant>> {
    let museum = Regex::new(r"(.*?博物馆)")
        .unwrap()
        .captures(question)
        .map(|c| clean_name(&c[1]))?;
    if museum.is_empty() {
        return None;
    }

    let cypher = format!(
        "MATCH (r:{relic})-[:{rel}]->(m:{museum_label}) WHERE {cond} \
         RETURN {ret}, m.{mname} as museum_name LIMIT {limit}",
        relic = schema.relic_label,
        rel = schema.located_in_rel,
        museum_label = schema.museum_label,
        cond = museum_variant_clause(schema, &museum),
        ret = schema.relic_return_clause(),
        mname = schema.museum_name_attr,
        limit = limit,
    );

    Some(vec![pattern_variant("museum-relics", cypher)])
}

/// 소속 확인: "镂空模纹壶属于大英博物馆吗"
fn relic_membership(
    question: &str,
    schema: &GraphSchema,
    limit: usize,
) -> Option<Vec<QueryVariant>> {
    let caps = Regex::new(r"(.*?)属于(.*?博物馆)")
        .unwrap()
        .captures(question)?;
    let relic = clean_name(&caps[1]);
    let museum = clean_name(&caps[2]);
    if relic.is_empty() || museum.is_empty() {
        return None;
    }

    let cypher = format!(
        "MATCH (r:{rl})-[:{rel}]->(m:{ml}) \
         WHERE toLower(r.{rname}) CONTAINS toLower('{relic}') AND ({cond}) \
         RETURN r.{rname} as relic_name, m.{mname} as museum_name LIMIT {limit}",
        rl = schema.relic_label,
        rel = schema.located_in_rel,
        ml = schema.museum_label,
        rname = schema.relic_name_attr,
        relic = escape_literal(&relic),
        cond = museum_variant_clause(schema, &museum),
        mname = schema.museum_name_attr,
        limit = limit,
    );

    Some(vec![pattern_variant("relic-membership", cypher)])
}

/// 소장처 질의: "镂空模纹壶在大英博物馆吗" / "镂空模纹壶收藏于哪里"
fn relic_location(
    question: &str,
    schema: &GraphSchema,
    limit: usize,
) -> Option<Vec<QueryVariant>> {
    // 문물-박물관 쌍 형태
    if let Some(caps) = Regex::new(r"(.*?)[在于](.*?博物馆)")
        .unwrap()
        .captures(question)
    {
        let relic = clean_name(&caps[1]);
        let museum = clean_name(&caps[2]);
        if !relic.is_empty() && !museum.is_empty() {
            let cypher = format!(
                "MATCH (r:{rl})-[:{rel}]->(m:{ml}) \
                 WHERE toLower(r.{rname}) CONTAINS toLower('{relic}') AND ({cond}) \
                 RETURN r.{rname} as relic_name, m.{mname} as museum_name LIMIT {limit}",
                rl = schema.relic_label,
                rel = schema.located_in_rel,
                ml = schema.museum_label,
                rname = schema.relic_name_attr,
                relic = escape_literal(&relic),
                cond = museum_variant_clause(schema, &museum),
                mname = schema.museum_name_attr,
                limit = limit,
            );
            return Some(vec![pattern_variant("relic-location", cypher)]);
        }
    }

    // 소재지 형태: 문물 이름만 추출
    let name = clean_name(&strip_phrases(
        question,
        &["收藏于哪里", "收藏于哪个博物馆", "收藏于", "收藏地", "在哪里", "在哪", "哪里"],
    ));
    if name.is_empty() {
        return None;
    }

    let cypher = format!(
        "MATCH (r:{rl})-[:{rel}]->(m:{ml}) \
         WHERE toLower(r.{rname}) CONTAINS toLower('{name}') \
         RETURN r.{rname} as relic_name, m.{mname} as museum_name LIMIT {limit}",
        rl = schema.relic_label,
        rel = schema.located_in_rel,
        ml = schema.museum_label,
        rname = schema.relic_name_attr,
        name = escape_literal(&name),
        mname = schema.museum_name_attr,
        limit = limit,
    );

    Some(vec![pattern_variant("relic-location", cypher)])
}

/// 재질 질의: "镂空模纹壶的材质是什么"
///
/// 재질 정보가 이름/설명 어느 쪽에 있어도 찾도록 두 속성을 함께 검색합니다.
fn relic_material(
    question: &str,
    schema: &GraphSchema,
    limit: usize,
) -> Option<Vec<QueryVariant>> {
    let caps = Regex::new(r"(.*?)(的材质|是什么材质|材质)")
        .unwrap()
        .captures(question)?;
    let name = clean_name(&caps[1]);
    if name.is_empty() {
        return None;
    }

    let cypher = format!(
        "MATCH (r:{rl}) \
         WHERE toLower(r.{rname}) CONTAINS toLower('{name}') \
         OR toLower(r.description) CONTAINS toLower('{name}') \
         RETURN r.{rname} as relic_name, r.material_name as material_name, \
         r.matrials as matrials, r.description as description LIMIT {limit}",
        rl = schema.relic_label,
        rname = schema.relic_name_attr,
        name = escape_literal(&name),
        limit = limit,
    );

    Some(vec![pattern_variant("relic-material", cypher)])
}

/// 기본 정보 질의: "镂空模纹壶的基本信息"
fn relic_basic_info(
    question: &str,
    schema: &GraphSchema,
    limit: usize,
) -> Option<Vec<QueryVariant>> {
    let name = clean_name(&strip_phrases(
        question,
        &["的基本信息是什么", "的基本信息", "基本信息"],
    ));
    if name.is_empty() {
        return None;
    }

    let cypher = format!(
        "MATCH (r:{rl}) WHERE toLower(r.{rname}) CONTAINS toLower('{name}') \
         RETURN {ret} LIMIT {limit}",
        rl = schema.relic_label,
        rname = schema.relic_name_attr,
        name = escape_literal(&name),
        ret = schema.relic_return_clause(),
        limit = limit,
    );

    Some(vec![pattern_variant("relic-basic-info", cypher)])
}

/// 시대 질의: "镂空模纹壶属于哪个朝代"
fn relic_dynasty(
    question: &str,
    schema: &GraphSchema,
    limit: usize,
) -> Option<Vec<QueryVariant>> {
    let name = clean_name(&strip_phrases(
        question,
        &["属于哪个朝代", "的朝代", "的年代", "朝代", "年代"],
    ));
    single_attr_query(schema, &name, "dynasty", "relic-dynasty", limit)
}

/// 크기 질의: "镂空模纹壶有多大"
fn relic_size(question: &str, schema: &GraphSchema, limit: usize) -> Option<Vec<QueryVariant>> {
    let name = clean_name(&strip_phrases(question, &["有多大", "的尺寸", "尺寸", "多大"]));
    single_attr_query(schema, &name, "size", "relic-size", limit)
}

/// 작자 질의: "镂空模纹壶是谁制作的"
fn relic_author(question: &str, schema: &GraphSchema, limit: usize) -> Option<Vec<QueryVariant>> {
    let name = clean_name(&strip_phrases(
        question,
        &["是谁制作的", "谁制作的", "谁制作", "的作者", "作者"],
    ));
    single_attr_query(schema, &name, "author", "relic-author", limit)
}

/// 박물관 소개 질의: "大英博物馆的简介"
fn museum_intro(question: &str, schema: &GraphSchema, limit: usize) -> Option<Vec<QueryVariant>> {
    let museum = clean_name(&strip_phrases(question, &["的简介", "简介"]));
    if museum.is_empty() {
        return None;
    }

    let cypher = format!(
        "MATCH (m:{ml}) WHERE {cond} \
         RETURN m.{mname} as museum_name, m.description as description LIMIT {limit}",
        ml = schema.museum_label,
        cond = museum_variant_clause(schema, &museum),
        mname = schema.museum_name_attr,
        limit = limit,
    );

    Some(vec![pattern_variant("museum-intro", cypher)])
}

// ============================================================================
// Helpers
// ============================================================================

fn pattern_variant(rule: &str, cypher: String) -> QueryVariant {
    QueryVariant {
        cypher,
        strategy: VariantStrategy::Pattern(rule.to_string()),
    }
}

/// 단일 속성 조회 쿼리
fn single_attr_query(
    schema: &GraphSchema,
    name: &str,
    attr: &str,
    rule: &str,
    limit: usize,
) -> Option<Vec<QueryVariant>> {
    if name.is_empty() {
        return None;
    }

    let cypher = format!(
        "MATCH (r:{rl}) WHERE toLower(r.{rname}) CONTAINS toLower('{name}') \
         RETURN r.{rname} as relic_name, r.{attr} as {attr} LIMIT {limit}",
        rl = schema.relic_label,
        rname = schema.relic_name_attr,
        name = escape_literal(name),
        attr = attr,
        limit = limit,
    );

    Some(vec![pattern_variant(rule, cypher)])
}

/// 박물관 이름 변형들의 OR 조건절
fn museum_variant_clause(schema: &GraphSchema, museum: &str) -> String {
    schema
        .museum_name_variants(museum)
        .iter()
        .map(|v| {
            format!(
                "toLower(m.{}) CONTAINS toLower('{}')",
                schema.museum_name_attr,
                escape_literal(v)
            )
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// 구문 조각 제거 (앞에 나오는 구문부터 순서대로)
fn strip_phrases(question: &str, phrases: &[&str]) -> String {
    let mut s = question.to_string();
    for p in phrases {
        s = s.replace(p, "");
    }
    s
}

/// 이름 정리: 공백/인용부호/문말 조사 제거
fn clean_name(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| matches!(c, '\'' | '"' | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}'))
        .trim_end_matches(&['吗', '呢', '？', '?', '。', '.'][..])
        .trim()
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run(question: &str) -> Option<Vec<QueryVariant>> {
        let rules = default_rules();
        recognize(&rules, question, &GraphSchema::default(), 10)
    }

    fn rule_name(v: &QueryVariant) -> String {
        match &v.strategy {
            VariantStrategy::Pattern(name) => name.clone(),
            other => panic!("expected pattern strategy, got {:?}", other),
        }
    }

    #[test]
    fn test_museum_relics_listing() {
        let variants = run("大英博物馆有哪些文物").unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(rule_name(&variants[0]), "museum-relics");
        assert!(variants[0].cypher.contains("British Museum"));
        assert!(variants[0].cypher.contains("所在博物馆"));
    }

    #[test]
    fn test_membership_question() {
        let variants = run("镂空模纹壶属于大英博物馆吗").unwrap();
        assert_eq!(rule_name(&variants[0]), "relic-membership");
        assert!(variants[0].cypher.contains("镂空模纹壶"));
        assert!(variants[0].cypher.contains("大英博物馆"));
        // 말미 조사는 이름에서 제거됨
        assert!(!variants[0].cypher.contains('吗'));
    }

    #[test]
    fn test_location_pair_question() {
        let variants = run("镂空模纹壶在大英博物馆吗").unwrap();
        assert_eq!(rule_name(&variants[0]), "relic-location");
        assert!(variants[0].cypher.contains("镂空模纹壶"));
    }

    #[test]
    fn test_location_whereabouts_question() {
        let variants = run("镂空模纹壶收藏于哪里").unwrap();
        assert_eq!(rule_name(&variants[0]), "relic-location");
        assert!(variants[0].cypher.contains("镂空模纹壶"));
        assert!(variants[0].cypher.contains("museum_name"));
    }

    #[test]
    fn test_material_question() {
        let variants = run("镂空模纹壶的材质是什么").unwrap();
        assert_eq!(rule_name(&variants[0]), "relic-material");
        assert!(variants[0].cypher.contains("material_name"));
        assert!(variants[0].cypher.contains("description"));
    }

    #[test]
    fn test_dynasty_question() {
        let variants = run("镂空模纹壶属于哪个朝代").unwrap();
        assert_eq!(rule_name(&variants[0]), "relic-dynasty");
        assert!(variants[0].cypher.contains("r.dynasty as dynasty"));
    }

    #[test]
    fn test_size_question() {
        let variants = run("镂空模纹壶有多大").unwrap();
        assert_eq!(rule_name(&variants[0]), "relic-size");
        assert!(variants[0].cypher.contains("r.size as size"));
    }

    #[test]
    fn test_author_question() {
        let variants = run("镂空模纹壶是谁制作的").unwrap();
        assert_eq!(rule_name(&variants[0]), "relic-author");
        assert!(variants[0].cypher.contains("r.author as author"));
    }

    #[test]
    fn test_museum_intro_question() {
        let variants = run("大英博物馆的简介").unwrap();
        assert_eq!(rule_name(&variants[0]), "museum-intro");
        assert!(variants[0].cypher.contains("m.description"));
    }

    #[test]
    fn test_no_pattern_match_falls_through() {
        assert!(run("青铜器的纹样风格").is_none());
    }

    #[test]
    fn test_relics_word_before_museum_does_not_match_listing() {
        // 문물 언급이 博物馆 앞에 오면 나열 규칙이 아니라 소속 규칙
        let variants = run("这件文物属于大英博物馆吗").unwrap();
        assert_eq!(rule_name(&variants[0]), "relic-membership");
    }

    #[test]
    fn test_rule_order_is_stable() {
        let rules = default_rules();
        let names: Vec<_> = rules.iter().map(|r| r.name).collect();
        assert_eq!(names[0], "museum-relics");
        assert!(names.contains(&"relic-material"));
    }
}
