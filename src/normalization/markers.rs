//! Rule tables for legacy-compatible company name normalization
//!
//! These lists are frozen: changing any entry changes cache keys and temporary ids
//! for every name it touches. Add parity cases before editing.

/// Status markers removed at the start or end of a name (or when bracketed).
/// Matched longest-first so `已转出` wins over `转出`.
pub const STATUS_MARKERS: [&str; 29] = [
    "已转出",
    "待转出",
    "转出",
    "已终止",
    "终止",
    "已作废",
    "作废",
    "已注销",
    "待注销",
    "注销",
    "已清算",
    "待清算",
    "清算中",
    "清算",
    "已停缴",
    "停缴",
    "暂停",
    "已保留",
    "保留",
    "存量",
    "已转移",
    "转移终止",
    "已划转",
    "划转",
    "已撤销",
    "撤销",
    "空白",
    "团托",
    "集合计划",
];

/// Business suffixes that describe scope rather than identity
pub const BUSINESS_SUFFIX_PATTERNS: [&str; 3] = [
    r"及下属子?(公司|企业|单位|机构)$",
    r"及其?(子公司|分公司|下属公司|关联公司)$",
    r"(企业)?年金计划$",
];

/// Characters trimmed from either end once markers are gone
pub const EDGE_SEPARATORS: [char; 13] = [
    '-', '_', '—', '–', '·', '.', ',', '、', '/', ':', ';', '。', '~',
];

/// Map any supported bracket glyph onto the canonical ASCII pair
pub fn canonical_bracket(c: char) -> char {
    match c {
        '[' | '【' | '〔' | '「' | '『' | '〈' | '《' | '〖' | '{' => '(',
        ']' | '】' | '〕' | '」' | '』' | '〉' | '》' | '〗' | '}' => ')',
        other => other,
    }
}

/// Full-width ASCII variants (U+FF01..U+FF5E) folded onto their half-width forms
pub fn to_half_width(c: char) -> char {
    match c {
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        other => other,
    }
}
