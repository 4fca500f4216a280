//! 분절(토큰화) 모듈
//!
//! 질문 텍스트를 키워드 후보 토큰으로 분리합니다.
//! 시스템은 중/영 이중언어를 다루므로 공백 분리로는 부족하고,
//! 토큰 경계는 외부 분절 능력(트레이트)에서 옵니다.
//!
//! 기본 구현은 사전 기반 전방 최장 일치(FMM)입니다:
//! - 한자 구간: 렉시콘 최장 일치 -> 불용 문자 단독 분리 -> 잔여 연속 한자 묶음
//! - 비한자 구간: UAX#29 단어 경계 (unicode-segmentation)

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

// ============================================================================
// Segmenter Trait
// ============================================================================

/// 분절 능력 트레이트
pub trait Segmenter: Send + Sync {
    /// 텍스트를 토큰 열로 분리
    fn segment(&self, text: &str) -> Vec<String>;

    /// 분절기 이름
    fn name(&self) -> &str;
}

// ============================================================================
// LexiconSegmenter
// ============================================================================

/// 사전 기반 FMM 분절기
///
/// 렉시콘은 스키마와 함께 설정되는 도메인 어휘입니다.
/// 사전에 없는 연속 한자는 하나의 토큰으로 묶입니다. 불용 문자는
/// 묶음을 끊고 길이 1 토큰으로 분리되어 이후 길이 필터에서 버려집니다.
pub struct LexiconSegmenter {
    lexicon: HashSet<String>,
    stop_chars: HashSet<char>,
    max_word_chars: usize,
}

impl LexiconSegmenter {
    /// 렉시콘과 불용 문자로 생성
    pub fn new(lexicon: Vec<String>, stop_chars: Vec<char>) -> Self {
        let max_word_chars = lexicon.iter().map(|w| w.chars().count()).max().unwrap_or(1);
        Self {
            lexicon: lexicon.into_iter().collect(),
            stop_chars: stop_chars.into_iter().collect(),
            max_word_chars,
        }
    }

    /// 기본 도메인 렉시콘으로 생성
    pub fn with_defaults() -> Self {
        Self::new(default_lexicon(), default_stop_chars())
    }

    /// 한자 여부 (CJK 통합 한자 + 확장 A)
    fn is_han(c: char) -> bool {
        matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
    }

    /// 한자 구간 분절: FMM -> 불용 문자 분리 -> 잔여 묶음
    fn segment_han(&self, run: &[char], out: &mut Vec<String>) {
        let mut pending = String::new();
        let mut i = 0;

        while i < run.len() {
            // 최장 사전 일치 (2자 이상)
            let max_len = self.max_word_chars.min(run.len() - i);
            let matched = (2..=max_len).rev().find_map(|len| {
                let cand: String = run[i..i + len].iter().collect();
                self.lexicon.contains(&cand).then_some((cand, len))
            });

            if let Some((word, len)) = matched {
                Self::flush(&mut pending, out);
                out.push(word);
                i += len;
            } else if self.stop_chars.contains(&run[i]) {
                Self::flush(&mut pending, out);
                out.push(run[i].to_string());
                i += 1;
            } else {
                pending.push(run[i]);
                i += 1;
            }
        }

        Self::flush(&mut pending, out);
    }

    fn flush(pending: &mut String, out: &mut Vec<String>) {
        if !pending.is_empty() {
            out.push(std::mem::take(pending));
        }
    }
}

impl Segmenter for LexiconSegmenter {
    fn segment(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut han_run: Vec<char> = Vec::new();
        let mut other_run = String::new();

        for c in text.chars() {
            if Self::is_han(c) {
                if !other_run.is_empty() {
                    tokens.extend(other_run.unicode_words().map(str::to_string));
                    other_run.clear();
                }
                han_run.push(c);
            } else {
                if !han_run.is_empty() {
                    self.segment_han(&han_run, &mut tokens);
                    han_run.clear();
                }
                other_run.push(c);
            }
        }

        if !han_run.is_empty() {
            self.segment_han(&han_run, &mut tokens);
        }
        if !other_run.is_empty() {
            tokens.extend(other_run.unicode_words().map(str::to_string));
        }

        tokens
    }

    fn name(&self) -> &str {
        "lexicon-fmm"
    }
}

// ============================================================================
// Defaults
// ============================================================================

/// 기본 도메인 렉시콘 (박물관 문물 어휘)
pub fn default_lexicon() -> Vec<String> {
    [
        // 도메인 명사
        "博物馆", "博物院", "文物", "藏品", "展品", "材质", "朝代", "年代", "尺寸",
        "作者", "简介", "收藏", "介绍", "列举", "展示", "基本信息", "图片",
        // 질문 어휘 (불용어 필터에서 제거됨)
        "什么", "哪些", "哪个", "哪里", "多大", "属于", "收藏于",
        // 문물 분류
        "青铜器", "瓷器", "玉器", "书画", "木版画", "雕塑", "壁画",
        // 대표 박물관
        "大英博物馆", "故宫博物院", "卢浮宫", "哈佛艺术博物馆", "大都会艺术博物馆",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// 기본 불용 문자 (단독 한자 불용어)
pub fn default_stop_chars() -> Vec<char> {
    vec![
        '的', '了', '和', '是', '在', '我', '有', '这', '那', '你', '就', '也', '与',
        '而', '使', '吗', '呢', '吧', '啊',
    ]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_chars_isolate() {
        let seg = LexiconSegmenter::with_defaults();
        let tokens = seg.segment("的是吗");
        assert_eq!(tokens, vec!["的", "是", "吗"]);
    }

    #[test]
    fn test_lexicon_longest_match() {
        let seg = LexiconSegmenter::with_defaults();
        let tokens = seg.segment("故宫博物院有哪些文物");
        // "故宫博物院"은 "博物院"보다 긴 사전 항목이므로 우선 일치
        assert_eq!(tokens, vec!["故宫博物院", "有", "哪些", "文物"]);
    }

    #[test]
    fn test_han_run_fallback() {
        let seg = LexiconSegmenter::with_defaults();
        // 사전에 없는 연속 한자는 하나로 묶임
        let tokens = seg.segment("镂空模纹壶");
        assert_eq!(tokens, vec!["镂空模纹壶"]);
    }

    #[test]
    fn test_latin_words() {
        let seg = LexiconSegmenter::with_defaults();
        let tokens = seg.segment("red lacquer box");
        assert_eq!(tokens, vec!["red", "lacquer", "box"]);
    }

    #[test]
    fn test_mixed_script() {
        let seg = LexiconSegmenter::with_defaults();
        let tokens = seg.segment("British Museum的文物");
        assert_eq!(tokens, vec!["British", "Museum", "的", "文物"]);
    }

    #[test]
    fn test_stop_char_breaks_run() {
        let seg = LexiconSegmenter::with_defaults();
        // 불용 문자 '的'가 잔여 묶음을 끊는다
        let tokens = seg.segment("青花瓷的纹样");
        assert_eq!(tokens, vec!["青花瓷", "的", "纹样"]);
    }

    #[test]
    fn test_segment_idempotent() {
        let seg = LexiconSegmenter::with_defaults();
        let a = seg.segment("大英博物馆有哪些文物");
        let b = seg.segment("大英博物馆有哪些文物");
        assert_eq!(a, b);
    }
}
