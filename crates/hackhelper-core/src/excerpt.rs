//! 探针标记摘录扫描（核心算法）
//!
//! 在任意文本中查找探针标记的每一次出现，为每次出现截取一段有界的上下文：
//! - 定位只在“工作副本”上进行：每命中一次，就把该处标记覆盖为等长占位符，
//!   之后的查找不可能再命中同一处，循环次数恰好等于出现次数；
//! - 占位符是 ASCII 且不出现在标记中，因此被覆盖的区域永远不会参与新的匹配；
//! - 覆盖是等长的，工作副本与原文下标一致，摘录始终从未改动的原文截取；
//! - 边距按字符计，不会切断 UTF-8 码点；非法字节只在截取出的窗口里被替换为 U+FFFD，偏移仍是原始字节偏移。
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, Input, MatchKind};

use crate::error::HarnessError;

/// 默认探针标记：若未被正确转义，尖括号会在渲染结果中变形
pub const PROBE_MARKER: &str = "aa<bbcc>dd";
/// 默认边距（标记两侧各保留的字符数）
pub const DEFAULT_MARGIN: usize = 10;
/// 默认占位符
pub const DEFAULT_PLACEHOLDER: char = '_';

const ELLIPSIS_HEAD: &str = "... ";
const ELLIPSIS_TAIL: &str = " ...";

/// 首选占位符与标记冲突时，依次尝试的候选
const PLACEHOLDER_FALLBACKS: &[u8] = b"_#~|^`\x01";

/// 单次命中的摘录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    /// 标记在原文中的起始字节偏移
    pub offset: usize,
    /// 截取后的上下文（可能带省略号）
    pub text: String,
}

/// 摘录扫描器：构造时绑定标记、边距与占位符
#[derive(Debug, Clone)]
pub struct ExcerptScanner {
    marker: String,
    margin: usize,
    placeholder: u8,
    ac: AhoCorasick,
}

impl ExcerptScanner {
    /// 使用默认占位符构建
    pub fn new(marker: &str, margin: usize) -> Result<Self, HarnessError> {
        Self::with_placeholder(marker, margin, DEFAULT_PLACEHOLDER)
    }

    /// 指定首选占位符构建；若其出现在标记中，则改用第一个不冲突的候选
    pub fn with_placeholder(marker: &str, margin: usize, preferred: char) -> Result<Self, HarnessError> {
        if marker.is_empty() {
            return Err(HarnessError::invalid("probe marker must not be empty"));
        }
        if !preferred.is_ascii() {
            return Err(HarnessError::invalid(format!("placeholder {preferred:?} must be an ASCII character")));
        }
        let placeholder = choose_placeholder(marker, preferred as u8)
            .ok_or_else(|| HarnessError::invalid(format!("no placeholder disjoint from marker {marker:?}")))?;

        let ac = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostFirst)
            .build([marker])
            .map_err(|e| HarnessError::invalid(format!("build marker automaton: {e}")))?;

        Ok(Self { marker: marker.to_string(), margin, placeholder, ac })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    /// 实际使用的占位符
    pub fn placeholder(&self) -> char {
        self.placeholder as char
    }

    /// 返回每次出现对应的摘录文本（从左到右）
    pub fn scan(&self, text: &str) -> Vec<String> {
        self.find_excerpts(text).into_iter().map(|e| e.text).collect()
    }

    /// 返回摘录及其在原文中的偏移
    pub fn find_excerpts(&self, text: &str) -> Vec<Excerpt> {
        self.find_excerpts_in_bytes(text.as_bytes())
    }

    /// 在原始字节上查找（不要求是合法 UTF-8），偏移为字节偏移；只有摘录窗口做有损解码
    pub fn find_excerpts_in_bytes(&self, bytes: &[u8]) -> Vec<Excerpt> {
        let mut excerpts = Vec::new();
        if bytes.is_empty() {
            return excerpts;
        }

        let mut working: Vec<u8> = bytes.to_vec();
        // 命中之前的区域已确认无匹配，从上次命中处继续即可，结果与每次从头查找一致
        let mut from = 0usize;
        loop {
            let found = self.ac.find(Input::new(&working).span(from..working.len()));
            let Some(m) = found else { break };
            let (start, end) = (m.start(), m.end());

            excerpts.push(Excerpt { offset: start, text: self.cut_window(bytes, start, end) });

            // 中和本次命中
            working[start..end].fill(self.placeholder);
            from = start;
        }

        excerpts
    }

    /// 以 [start, end) 为中心截取窗口；窗口触及文本边界时不加省略号
    fn cut_window(&self, bytes: &[u8], start: usize, end: usize) -> String {
        let win_start = chars_back(bytes, start, self.margin);
        let win_end = chars_forward(bytes, end, self.margin);

        let window = String::from_utf8_lossy(&bytes[win_start..win_end]);
        let body = window.trim();
        let mut excerpt = String::with_capacity(body.len() + ELLIPSIS_HEAD.len() + ELLIPSIS_TAIL.len());
        if win_start > 0 {
            excerpt.push_str(ELLIPSIS_HEAD);
        }
        excerpt.push_str(body);
        if win_end < bytes.len() {
            excerpt.push_str(ELLIPSIS_TAIL);
        }
        excerpt
    }
}

/// UTF-8 续字节（10xxxxxx）不是字符起点
fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// 从 `pos` 向前跨过至多 `n` 个字符，返回窗口起点
fn chars_back(bytes: &[u8], mut pos: usize, n: usize) -> usize {
    for _ in 0..n {
        if pos == 0 {
            break;
        }
        pos -= 1;
        while pos > 0 && is_continuation(bytes[pos]) {
            pos -= 1;
        }
    }
    pos
}

/// 从 `pos` 向后跨过至多 `n` 个字符，返回窗口终点（不含）
fn chars_forward(bytes: &[u8], mut pos: usize, n: usize) -> usize {
    for _ in 0..n {
        if pos >= bytes.len() {
            break;
        }
        pos += 1;
        while pos < bytes.len() && is_continuation(bytes[pos]) {
            pos += 1;
        }
    }
    pos
}

/// 按默认边距扫描：`text` 中 `marker` 的全部摘录
pub fn extract_matching_excerpts(text: &str, marker: &str) -> Result<Vec<String>, HarnessError> {
    Ok(ExcerptScanner::new(marker, DEFAULT_MARGIN)?.scan(text))
}

fn choose_placeholder(marker: &str, preferred: u8) -> Option<u8> {
    let bytes = marker.as_bytes();
    std::iter::once(preferred)
        .chain(PLACEHOLDER_FALLBACKS.iter().copied())
        .find(|c| !bytes.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: &str = PROBE_MARKER;

    fn scanner() -> ExcerptScanner {
        ExcerptScanner::new(M, DEFAULT_MARGIN).unwrap()
    }

    #[test]
    fn no_match_yields_empty_sequence() {
        assert!(extract_matching_excerpts("hello world", "xyz").unwrap().is_empty());
        assert!(scanner().scan("").is_empty());
    }

    #[test]
    fn literal_fixture_fits_whole_text() {
        let out = extract_matching_excerpts("xx aa<bbcc>dd yy", "aa<bbcc>dd").unwrap();
        assert_eq!(out, vec!["xx aa<bbcc>dd yy".to_string()]);
    }

    #[test]
    fn interior_match_has_both_ellipses() {
        let text = format!("0123456789abcdefghij{M}klmnopqrstuvwxyz0123");
        let out = scanner().scan(&text);
        assert_eq!(out, vec![format!("... abcdefghij{M}klmnopqrst ...")]);

        let inner = out[0].trim_start_matches("... ").trim_end_matches(" ...");
        assert!(inner.chars().count() <= 2 * DEFAULT_MARGIN + M.len());
    }

    #[test]
    fn boundary_matches_drop_ellipsis() {
        let head = scanner().scan(&format!("{M} followed by a long enough tail"));
        assert_eq!(head, vec![format!("{M} followed ...")]);

        let tail = scanner().scan(&format!("a long enough head then {M}"));
        assert_eq!(tail, vec![format!("... head then {M}")]);
    }

    #[test]
    fn multiple_matches_in_order() {
        let (a, b, c, d) = ("A".repeat(15), "B".repeat(15), "C".repeat(15), "D".repeat(15));
        let text = format!("{a}{M}{b}{M}{c}{M}{d}");
        let found = scanner().find_excerpts(&text);

        let offsets: Vec<usize> = found.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![15, 40, 65]);
        assert_eq!(found[0].text, format!("... {}{M}{} ...", "A".repeat(10), "B".repeat(10)));
        assert_eq!(found[1].text, format!("... {}{M}{} ...", "B".repeat(10), "C".repeat(10)));
        assert_eq!(found[2].text, format!("... {}{M}{} ...", "C".repeat(10), "D".repeat(10)));
    }

    #[test]
    fn adjacent_matches_are_cut_from_original_text() {
        let text = format!("{M}{M}");
        let out = scanner().scan(&text);
        assert_eq!(out, vec![text.clone(), text]);
    }

    #[test]
    fn overlapping_candidates_count_once() {
        let s = ExcerptScanner::new("aa", 10).unwrap();
        assert_eq!(s.scan("aaa"), vec!["aaa".to_string()]);
        assert_eq!(s.scan("aaaa").len(), 2);
    }

    #[test]
    fn window_is_trimmed_before_ellipsis() {
        let s = ExcerptScanner::new(M, 5).unwrap();
        let out = s.scan(&format!("abcde     {M}     vwxyz"));
        assert_eq!(out, vec![format!("... {M} ...")]);
    }

    #[test]
    fn margin_counts_characters() {
        let s = ExcerptScanner::new("<x>", 2).unwrap();
        assert_eq!(s.scan("äöü<x>éè漢"), vec!["... öü<x>éè ...".to_string()]);
    }

    #[test]
    fn zero_margin_keeps_only_marker() {
        let s = ExcerptScanner::new(M, 0).unwrap();
        assert_eq!(s.scan(&format!("x{M}y")), vec![format!("... {M} ...")]);
        assert_eq!(s.scan(M), vec![M.to_string()]);
    }

    #[test]
    fn empty_marker_is_rejected() {
        for text in ["", "abc"] {
            let err = extract_matching_excerpts(text, "").unwrap_err();
            assert!(matches!(err, HarnessError::InvalidArgument(_)));
        }
    }

    #[test]
    fn placeholder_avoids_marker_alphabet() {
        let s = ExcerptScanner::new("a_b", 3).unwrap();
        assert_eq!(s.placeholder(), '#');
        assert_eq!(s.scan("a_ba_b").len(), 2);

        let err = ExcerptScanner::with_placeholder(M, 3, '§').unwrap_err();
        assert!(matches!(err, HarnessError::InvalidArgument(_)));
    }

    #[test]
    fn many_occurrences_terminate() {
        let text: String = (0..1000).map(|i| format!("{i:04}{M}")).collect();
        let found = scanner().find_excerpts(&text);
        assert_eq!(found.len(), 1000);
        assert!(found.windows(2).all(|w| w[0].offset < w[1].offset));
        assert_eq!(found[999].offset, 999 * 14 + 4);
    }

    #[test]
    fn offsets_follow_raw_bytes() {
        let found = scanner().find_excerpts_in_bytes(b"\xffxaa<bbcc>dd");
        assert_eq!(found, vec![Excerpt { offset: 2, text: format!("\u{FFFD}x{M}") }]);

        let s = ExcerptScanner::new("<x>", 1).unwrap();
        let found = s.find_excerpts_in_bytes(b"ab\xff\xfe<x>\xc3\xa9z");
        assert_eq!(found[0].offset, 4);
        assert_eq!(found[0].text, "... \u{FFFD}<x>\u{e9} ...");
    }

    #[test]
    fn rescan_is_stable() {
        let text = format!("one {M} two {M} three");
        let s = scanner();
        assert_eq!(s.scan(&text), s.scan(&text));
    }
}
