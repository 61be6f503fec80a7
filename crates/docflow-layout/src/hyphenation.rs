//! Rule-based hyphenation point finder.

use crate::config::HyphenationConfig;

pub const SOFT_HYPHEN: char = '\u{00AD}';

const PREFIXES: &[&str] = &[
    "counter", "inter", "micro", "multi", "super", "trans", "under", "anti", "auto", "over",
    "semi", "dis", "mis", "non", "out", "pre", "sub", "un", "re",
];

const SUFFIXES: &[&str] = &[
    "ingly", "tion", "sion", "ment", "ness", "less", "able", "ible", "ally", "edly", "ful",
    "ing", "ism", "ist", "ity", "ous", "ive", "ize", "ise", "ly",
];

/// Split positions (source char index where the second part starts), ascending.
///
/// Soft hyphens, when present and enabled, are the only candidates. Otherwise
/// the prefix, suffix and doubled-consonant rules run on the alphabetic core
/// of the word, keeping `min_side_chars` letters on each side.
pub fn hyphenation_points(word: &str, cfg: &HyphenationConfig) -> Vec<usize> {
    let chars: Vec<char> = word.chars().collect();
    if chars.contains(&SOFT_HYPHEN) {
        if !cfg.soft_hyphens {
            return Vec::new();
        }
        return chars
            .iter()
            .enumerate()
            .filter(|(idx, ch)| **ch == SOFT_HYPHEN && *idx > 0 && idx + 1 < chars.len())
            .map(|(idx, _)| idx + 1)
            .collect();
    }
    if !cfg.enabled {
        return Vec::new();
    }

    let lead = chars.iter().take_while(|c| !c.is_alphabetic()).count();
    let trail = chars.iter().rev().take_while(|c| !c.is_alphabetic()).count();
    if lead + trail >= chars.len() {
        return Vec::new();
    }
    let core = &chars[lead..chars.len() - trail];
    if core.len() < cfg.min_word_chars.max(2) || !core.iter().all(|c| c.is_alphabetic()) {
        return Vec::new();
    }
    let min_side = cfg.min_side_chars.max(1);
    core_points(core)
        .into_iter()
        .filter(|&p| p >= min_side && core.len() - p >= min_side)
        .map(|p| p + lead)
        .collect()
}

fn core_points(core: &[char]) -> Vec<usize> {
    let lower: String = core.iter().flat_map(|c| c.to_lowercase()).collect();
    if lower.chars().count() != core.len() {
        return Vec::new();
    }
    let mut points = Vec::with_capacity(4);
    for prefix in PREFIXES {
        if lower.starts_with(prefix) && lower.len() > prefix.len() + 2 {
            points.push(prefix.chars().count());
            break;
        }
    }
    for suffix in SUFFIXES {
        if lower.ends_with(suffix) {
            let split = core.len().saturating_sub(suffix.chars().count());
            if split >= 2 {
                points.push(split);
            }
            break;
        }
    }
    let is_vowel = |c: char| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    for i in 1..core.len() {
        let (a, b) = (core[i - 1].to_ascii_lowercase(), core[i].to_ascii_lowercase());
        if a == b && a.is_ascii_alphabetic() && !is_vowel(a) && !matches!(a, 'l' | 's') {
            points.push(i);
        }
    }
    // "ll"/"ss" split only when not word-final ("bell", "glass").
    for i in 1..core.len().saturating_sub(2) {
        let (a, b) = (core[i - 1].to_ascii_lowercase(), core[i].to_ascii_lowercase());
        if a == b && matches!(a, 'l' | 's') {
            points.push(i);
        }
    }
    points.sort_unstable();
    points.dedup();
    points
}

/// Display text for the first part of a split: soft hyphens removed, visible
/// hyphen appended.
pub fn hyphenated_head(word: &str, split: usize) -> String {
    let mut head: String = word
        .chars()
        .take(split)
        .filter(|c| *c != SOFT_HYPHEN)
        .collect();
    head.push('-');
    head
}

/// Remove soft hyphens from display text.
pub fn strip_soft_hyphens(text: &str) -> String {
    if text.contains(SOFT_HYPHEN) {
        text.chars().filter(|ch| *ch != SOFT_HYPHEN).collect()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> HyphenationConfig {
        HyphenationConfig::default()
    }

    #[test]
    fn suffix_and_doubled_consonant_rules() {
        assert!(hyphenation_points("letter", &cfg()).contains(&3));
        let points = hyphenation_points("government", &cfg());
        assert!(points.contains(&6), "{points:?}");
    }

    #[test]
    fn prefix_and_suffix_rules_combine() {
        assert_eq!(hyphenation_points("understanding", &cfg()), vec![5, 10]);
        assert_eq!(hyphenation_points("international", &cfg()), vec![5]);
    }

    #[test]
    fn prefix_rule_and_side_minimum() {
        let points = hyphenation_points("rewrite", &cfg());
        assert!(points.contains(&2));
        assert!(points.iter().all(|&p| p >= 2 && 7 - p >= 2));
    }

    #[test]
    fn punctuation_is_kept_outside_the_core() {
        let points = hyphenation_points("(letter),", &cfg());
        assert!(points.contains(&4));
    }

    #[test]
    fn soft_hyphens_override_rules() {
        let word = "hy\u{00AD}phen\u{00AD}ation";
        assert_eq!(hyphenation_points(word, &cfg()), vec![3, 8]);
        assert_eq!(hyphenated_head(word, 8), "hyphen-");
        assert_eq!(strip_soft_hyphens(word), "hyphenation");
    }

    #[test]
    fn short_or_disabled_words_have_no_points() {
        assert!(hyphenation_points("cat", &cfg()).is_empty());
        let off = HyphenationConfig {
            enabled: false,
            ..HyphenationConfig::default()
        };
        assert!(hyphenation_points("letter", &off).is_empty());
        assert!(hyphenation_points("12345678", &cfg()).is_empty());
    }
}
