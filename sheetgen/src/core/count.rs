//! Best-effort inference of how many items an instruction asks for.
//!
//! Heuristics run in a fixed priority order and the first hit wins:
//! phrase table, `top N` / `N <word>` / `list N`, CJK numeral + classifier,
//! then the last bare 1-3 digit number when a list noun is present.

use std::sync::LazyLock;

use regex::Regex;

/// Count used when nothing in the instruction signals one.
pub const DEFAULT_COUNT: u32 = 10;
/// Parse-time sanity ceiling, independent of configuration.
pub const PARSE_HARD_CAP: u32 = 200;

const COUNT_PHRASES: &[(&str, u32)] = &[
    ("a few", 3),
    ("a couple", 2),
    ("a dozen", 12),
    ("dozen", 12),
];

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:top\s+([0-9]+)|([0-9]+)\s+[a-z]+|list\s+([0-9]+))\b")
        .expect("count regex should be valid")
});

static CJK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([一二三四五六七八九十百千两]+)(个|条|项|名|名字|新闻)")
        .expect("cjk count regex should be valid")
});

static LIST_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(ideas|items|names|options|headlines|examples|questions|facts|insights|products|suggestions)",
    )
    .expect("list keyword regex should be valid")
});

static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{1,3}").expect("digits regex should be valid"));

/// Count signalled by `text`, or [`DEFAULT_COUNT`] when there is none.
pub fn infer_count(text: &str) -> u32 {
    detect_count(text).unwrap_or(DEFAULT_COUNT)
}

/// Count signalled by `text`, clamped to `[1, PARSE_HARD_CAP]`.
///
/// Returns `None` when no heuristic matches.
fn detect_count(text: &str) -> Option<u32> {
    if text.trim().is_empty() {
        return None;
    }

    let lowered = text.to_lowercase();
    for (phrase, count) in COUNT_PHRASES {
        if lowered.contains(phrase) {
            return Some(clamp_count(*count));
        }
    }

    if let Some(caps) = NUMBER_RE.captures(text) {
        let digits = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str());
        if let Some(digits) = digits {
            return Some(clamp_count(parse_digits(digits)));
        }
    }

    if let Some(caps) = CJK_RE.captures(text) {
        if let Some(value) = caps.get(1).and_then(|m| cjk_numeral_value(m.as_str())) {
            return Some(clamp_count(value));
        }
    }

    if LIST_KEYWORD_RE.is_match(text) {
        if let Some(last) = DIGITS_RE.find_iter(text).last() {
            return Some(clamp_count(parse_digits(last.as_str())));
        }
    }

    None
}

fn clamp_count(value: u32) -> u32 {
    value.clamp(1, PARSE_HARD_CAP)
}

/// Digit runs too long for `u32` saturate; they clamp to the cap anyway.
fn parse_digits(digits: &str) -> u32 {
    digits.parse().unwrap_or(u32::MAX)
}

fn cjk_digit(c: char) -> Option<u32> {
    match c {
        '一' => Some(1),
        '二' | '两' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        '十' => Some(10),
        _ => None,
    }
}

fn single_cjk_digit(text: &str) -> Option<u32> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => cjk_digit(c),
        _ => None,
    }
}

/// Convert a CJK numeral in `1..=99` (`十` alone is 10).
fn cjk_numeral_value(text: &str) -> Option<u32> {
    if text.chars().count() == 1 {
        return single_cjk_digit(text);
    }
    let (tens, ones) = text.split_once('十')?;
    let tens = if tens.is_empty() {
        1
    } else {
        single_cjk_digit(tens).unwrap_or(1)
    };
    let ones = if ones.is_empty() {
        0
    } else {
        single_cjk_digit(ones).unwrap_or(0)
    };
    Some(tens * 10 + ones)
}
