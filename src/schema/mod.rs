//! 그래프 스키마 기술자
//!
//! 대상 그래프 저장소의 고정 스키마(노드 라벨, 관계, 속성)를 기술합니다.
//! 쿼리 번역기는 이 기술자에 정의된 라벨/속성만 사용하여 Cypher를 렌더링합니다.
//! 스키마는 설정 시점에 합의된 작은 고정 집합이며, 임의 스키마에 대한
//! 쿼리 정확성은 보장하지 않습니다.

use serde::{Deserialize, Serialize};

// ============================================================================
// GraphSchema
// ============================================================================

/// 대상 그래프 스키마 기술자
///
/// 기본값은 박물관 문물 지식그래프 스키마입니다:
/// `(:CulturalRelic)-[:所在博物馆]->(:Museum)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSchema {
    /// 문물 노드 라벨
    pub relic_label: String,
    /// 박물관 노드 라벨
    pub museum_label: String,
    /// 문물 -> 박물관 관계 이름
    pub located_in_rel: String,
    /// 문물 노드의 기본 검색 속성
    pub relic_name_attr: String,
    /// 문물 노드의 나머지 속성들
    pub relic_attrs: Vec<String>,
    /// 박물관 노드의 기본 검색 속성
    pub museum_name_attr: String,
    /// 박물관 노드의 나머지 속성들
    pub museum_attrs: Vec<String>,
    /// 도메인 앵커 키워드 (질문에 포함되면 앵커-키워드 조합 변형 생성)
    pub anchor_keyword: String,
    /// 박물관 이름 별칭 (중/영 변형, 패턴 쿼리의 OR 절로 확장)
    pub museum_aliases: Vec<MuseumAlias>,
    /// 결과 행에서 엔티티 이름으로 쓸 컬럼 우선순위
    pub entity_name_columns: Vec<String>,
}

/// 박물관 이름 별칭 매핑
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuseumAlias {
    /// 대표 이름 (중국어)
    pub canonical: String,
    /// 별칭 목록 (영문 명칭, 축약형 등)
    pub aliases: Vec<String>,
}

impl Default for GraphSchema {
    fn default() -> Self {
        Self {
            relic_label: "CulturalRelic".to_string(),
            museum_label: "Museum".to_string(),
            located_in_rel: "所在博物馆".to_string(),
            relic_name_attr: "name".to_string(),
            relic_attrs: vec![
                "description".to_string(),
                "dynasty".to_string(),
                "type".to_string(),
                "size".to_string(),
                "material_name".to_string(),
                "matrials".to_string(),
                "author".to_string(),
            ],
            museum_name_attr: "museum_name".to_string(),
            museum_attrs: vec![
                "description".to_string(),
                "location".to_string(),
                "established_year".to_string(),
            ],
            anchor_keyword: "博物馆".to_string(),
            museum_aliases: vec![
                MuseumAlias {
                    canonical: "大英博物馆".to_string(),
                    aliases: vec![
                        "British Museum".to_string(),
                        "The British Museum".to_string(),
                        "大英".to_string(),
                    ],
                },
                MuseumAlias {
                    canonical: "哈佛艺术博物馆".to_string(),
                    aliases: vec![
                        "Harvard Art Museum".to_string(),
                        "Harvard Museum of Art".to_string(),
                        "Harvard".to_string(),
                    ],
                },
                MuseumAlias {
                    canonical: "卢浮宫".to_string(),
                    aliases: vec![
                        "Louvre Museum".to_string(),
                        "Musée du Louvre".to_string(),
                        "The Louvre".to_string(),
                    ],
                },
                MuseumAlias {
                    canonical: "大都会艺术博物馆".to_string(),
                    aliases: vec![
                        "Metropolitan Museum of Art".to_string(),
                        "The Met".to_string(),
                        "Metropolitan".to_string(),
                    ],
                },
                MuseumAlias {
                    canonical: "故宫博物院".to_string(),
                    aliases: vec![
                        "Palace Museum".to_string(),
                        "Forbidden City".to_string(),
                        "故宫".to_string(),
                    ],
                },
            ],
            entity_name_columns: vec![
                "relic_name".to_string(),
                "name".to_string(),
                "museum_name".to_string(),
                "knowledge_point".to_string(),
            ],
        }
    }
}

impl GraphSchema {
    /// 박물관 이름의 모든 변형 반환 (대표 이름 포함)
    ///
    /// 별칭 테이블에 없으면 흔한 접미사 변형을 생성합니다.
    pub fn museum_name_variants(&self, museum_name: &str) -> Vec<String> {
        let mut variants = vec![museum_name.to_string()];

        if let Some(alias) = self
            .museum_aliases
            .iter()
            .find(|a| a.canonical == museum_name)
        {
            variants.extend(alias.aliases.iter().cloned());
        } else if museum_name.contains("博物馆") {
            let base = museum_name.replace("博物馆", "");
            variants.push(base.clone());
            variants.push(format!("{} Museum", base));
            variants.push(format!("{} Art Museum", base));
        }

        variants
    }

    /// 문물 노드의 RETURN 절 (별칭 포함)
    pub fn relic_return_clause(&self) -> String {
        let mut cols = vec![format!("r.{} as relic_name", self.relic_name_attr)];
        for attr in &self.relic_attrs {
            cols.push(format!("r.{} as {}", attr, attr));
        }
        cols.join(", ")
    }

    /// LLM 프롬프트용 스키마 텍스트
    pub fn schema_text(&self) -> String {
        format!(
            "Node: {relic} {{ {relic_name}: STRING, {relic_attrs} }}\n\
             Node: {museum} {{ {museum_name}: STRING, {museum_attrs} }}\n\
             Relationship: (:{relic})-[:{rel}]->(:{museum})",
            relic = self.relic_label,
            relic_name = self.relic_name_attr,
            relic_attrs = self
                .relic_attrs
                .iter()
                .map(|a| format!("{}: STRING", a))
                .collect::<Vec<_>>()
                .join(", "),
            museum = self.museum_label,
            museum_name = self.museum_name_attr,
            museum_attrs = self
                .museum_attrs
                .iter()
                .map(|a| format!("{}: STRING", a))
                .collect::<Vec<_>>()
                .join(", "),
            rel = self.located_in_rel,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_museum_variants() {
        let schema = GraphSchema::default();
        let variants = schema.museum_name_variants("大英博物馆");

        assert!(variants.contains(&"大英博物馆".to_string()));
        assert!(variants.contains(&"British Museum".to_string()));
        assert!(variants.contains(&"大英".to_string()));
    }

    #[test]
    fn test_unknown_museum_variants() {
        let schema = GraphSchema::default();
        let variants = schema.museum_name_variants("南京博物馆");

        assert!(variants.contains(&"南京博物馆".to_string()));
        assert!(variants.contains(&"南京".to_string()));
        assert!(variants.contains(&"南京 Museum".to_string()));
    }

    #[test]
    fn test_schema_text_contains_labels() {
        let schema = GraphSchema::default();
        let text = schema.schema_text();

        assert!(text.contains("CulturalRelic"));
        assert!(text.contains("Museum"));
        assert!(text.contains("所在博物馆"));
    }

    #[test]
    fn test_relic_return_clause() {
        let schema = GraphSchema::default();
        let clause = schema.relic_return_clause();

        assert!(clause.starts_with("r.name as relic_name"));
        assert!(clause.contains("r.dynasty as dynasty"));
    }
}
