//! 오프라인 폴백 포매터
//!
//! 모든 생성 프로바이더가 죽었을 때 쓰는 결정적 답변 합성기입니다.
//! 네트워크를 일절 호출하지 않고 항상 성공합니다. 출력 품질이 모델 생성
//! 문장보다 낮은 것은 의도된 트레이드오프입니다. 에러 대신 쓸모 있는
//! 무언가로 강등하는 것이 목적입니다.

use crate::retrieval::{EvidenceSet, RetrievedItem};

use super::{EVIDENCE_TAG, MODEL_TAG};

/// 벡터 항목 본문 미리보기 길이 (문자)
const CONTENT_PREVIEW_CHARS: usize = 200;

/// 증거 집합을 결정적 답변 텍스트로 렌더링
///
/// 그래프 항목은 엔티티별로 묶어 속성을 불릿 목록으로, 벡터 항목은
/// 출처와 본문 미리보기로 렌더링합니다. 증거가 없으면 고정 문장 하나를
/// 반환합니다.
pub fn format_offline(evidence: &EvidenceSet) -> String {
    if evidence.is_empty() {
        return format!("{}\n未查到相关信息，建议访问官网进一步核实。", MODEL_TAG);
    }

    let mut out = format!("{}\n根据检索到的信息，找到以下相关内容：\n", EVIDENCE_TAG);

    for item in evidence {
        match item {
            RetrievedItem::Graph { entity, attributes } => {
                if attributes.is_empty() {
                    out.push_str(&format!("\n- {}\n", entity));
                } else {
                    out.push_str(&format!("\n- {}:\n", entity));
                    for (key, value) in attributes {
                        out.push_str(&format!("  • {}: {}\n", key, value));
                    }
                }
            }
            RetrievedItem::Vector {
                content,
                source_id,
                similarity,
            } => {
                out.push_str(&format!(
                    "\n- {} (相似度: {:.2}%): {}\n",
                    source_id,
                    similarity,
                    preview(content)
                ));
            }
        }
    }

    out
}

/// 본문 미리보기 (UTF-8 안전 자르기)
fn preview(content: &str) -> String {
    let cleaned = content.replace('\n', " ");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= CONTENT_PREVIEW_CHARS {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(CONTENT_PREVIEW_CHARS).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_evidence_fixed_sentence() {
        let text = format_offline(&vec![]);
        assert!(text.starts_with(MODEL_TAG));
        assert!(text.contains("未查到相关信息"));
    }

    #[test]
    fn test_graph_items_grouped_with_bullets() {
        let evidence = vec![RetrievedItem::Graph {
            entity: "青铜鼎".to_string(),
            attributes: vec![
                ("dynasty".to_string(), "商代".to_string()),
                ("material".to_string(), "青铜".to_string()),
            ],
        }];
        let text = format_offline(&evidence);

        assert!(text.starts_with(EVIDENCE_TAG));
        assert!(text.contains("- 青铜鼎:"));
        assert!(text.contains("• dynasty: 商代"));
        assert!(text.contains("• material: 青铜"));
    }

    #[test]
    fn test_vector_items_rendered_with_source() {
        let evidence = vec![RetrievedItem::Vector {
            content: "唐三彩是唐代的彩色釉陶器。".to_string(),
            source_id: "relics.md".to_string(),
            similarity: 88.0,
        }];
        let text = format_offline(&evidence);

        assert!(text.contains("relics.md"));
        assert!(text.contains("88.00%"));
        assert!(text.contains("唐三彩"));
    }

    #[test]
    fn test_deterministic_output() {
        let evidence = vec![RetrievedItem::Graph {
            entity: "红漆盒".to_string(),
            attributes: vec![("material".to_string(), "漆木".to_string())],
        }];
        assert_eq!(format_offline(&evidence), format_offline(&evidence));
    }

    #[test]
    fn test_long_content_truncated() {
        let evidence = vec![RetrievedItem::Vector {
            content: "字".repeat(300),
            source_id: "doc".to_string(),
            similarity: 90.0,
        }];
        let text = format_offline(&evidence);
        assert!(text.contains("..."));
    }
}
