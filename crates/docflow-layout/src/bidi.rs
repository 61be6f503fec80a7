//! Simplified Unicode bidirectional algorithm.
//!
//! Covers the Latin/Arabic/Hebrew/number subset: weak-type resolution,
//! neutral resolution, implicit levels, whitespace reset and L2 reordering.
//! Explicit embeddings and isolates are not interpreted.

use docflow::TextDirection;
use serde::{Deserialize, Serialize};

/// Bidi character class.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BidiClass {
    /// Left-to-right letter.
    L,
    /// Right-to-left letter (Hebrew and friends).
    R,
    /// Arabic letter.
    AL,
    /// European number.
    EN,
    /// European separator.
    ES,
    /// European terminator.
    ET,
    /// Arabic number.
    AN,
    /// Common separator.
    CS,
    /// Non-spacing mark.
    NSM,
    /// Boundary neutral.
    BN,
    /// Paragraph separator.
    B,
    /// Segment separator.
    S,
    /// Whitespace.
    WS,
    /// Other neutral.
    ON,
}

/// Resolved run direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Ltr,
    Rtl,
}

impl Direction {
    /// Paragraph embedding level.
    pub fn level(self) -> u8 {
        match self {
            Self::Ltr => 0,
            Self::Rtl => 1,
        }
    }

    /// Resolve a paragraph direction, detecting `Auto` from the text.
    pub fn from_paragraph(direction: TextDirection, text: &str) -> Self {
        match direction {
            TextDirection::Ltr => Self::Ltr,
            TextDirection::Rtl => Self::Rtl,
            TextDirection::Auto => detect_base_direction(text),
        }
    }

    fn strong_class(self) -> BidiClass {
        match self {
            Self::Ltr => BidiClass::L,
            Self::Rtl => BidiClass::R,
        }
    }
}

/// A maximal run of characters sharing one level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidiRun {
    /// First character index (chars, not bytes).
    pub start: usize,
    /// One past the last character index.
    pub end: usize,
    pub level: u8,
    pub text: String,
}

impl BidiRun {
    pub fn is_rtl(&self) -> bool {
        self.level % 2 == 1
    }
}

/// Classify a character by Unicode block.
pub fn classify(ch: char) -> BidiClass {
    use BidiClass::*;
    match ch {
        '\n' | '\r' | '\u{1C}'..='\u{1E}' | '\u{85}' | '\u{2029}' => B,
        '\t' | '\u{0B}' | '\u{1F}' => S,
        '\u{200E}' => L,
        '\u{200F}' => R,
        '\u{061C}' => AL,
        '\u{00AD}'
        | '\u{200B}'..='\u{200D}'
        | '\u{2060}'..='\u{2064}'
        | '\u{FEFF}'
        | '\u{00}'..='\u{08}'
        | '\u{0E}'..='\u{1B}'
        | '\u{7F}'..='\u{84}'
        | '\u{86}'..='\u{9F}' => BN,
        ' ' | '\u{0C}' | '\u{2028}' | '\u{1680}' | '\u{2000}'..='\u{200A}' | '\u{205F}'
        | '\u{3000}' => WS,
        '0'..='9' | '\u{06F0}'..='\u{06F9}' | '\u{2070}'..='\u{2079}' | '\u{2080}'..='\u{2089}' => {
            EN
        }
        '\u{0660}'..='\u{0669}' | '\u{066B}' | '\u{066C}' => AN,
        '+' | '-' | '\u{207A}' | '\u{207B}' | '\u{2212}' | '\u{FB29}' => ES,
        '#' | '$' | '%' | '\u{00B0}' | '\u{00A2}'..='\u{00A5}' | '\u{00B1}' | '\u{066A}'
        | '\u{2030}'..='\u{2034}' | '\u{20A0}'..='\u{20CF}' => ET,
        ',' | '.' | '/' | ':' | '\u{00A0}' | '\u{060C}' | '\u{202F}' | '\u{2044}' => CS,
        '\u{0300}'..='\u{036F}'
        | '\u{0483}'..='\u{0489}'
        | '\u{0591}'..='\u{05BD}'
        | '\u{05BF}'
        | '\u{05C1}'
        | '\u{05C2}'
        | '\u{05C4}'
        | '\u{05C5}'
        | '\u{05C7}'
        | '\u{0610}'..='\u{061A}'
        | '\u{064B}'..='\u{065F}'
        | '\u{0670}'
        | '\u{06D6}'..='\u{06DC}'
        | '\u{06DF}'..='\u{06E4}'
        | '\u{06E7}'
        | '\u{06E8}'
        | '\u{06EA}'..='\u{06ED}'
        | '\u{0711}'
        | '\u{0730}'..='\u{074A}'
        | '\u{07A6}'..='\u{07B0}'
        | '\u{20D0}'..='\u{20FF}'
        | '\u{FE20}'..='\u{FE2F}' => NSM,
        // Hebrew, Thaana, NKo, Samaritan, Hebrew presentation forms.
        '\u{0590}'..='\u{05FF}'
        | '\u{0780}'..='\u{07BF}'
        | '\u{07C0}'..='\u{07FF}'
        | '\u{0800}'..='\u{083F}'
        | '\u{FB1D}'..='\u{FB4F}' => R,
        // Arabic, Syriac, Arabic supplements and presentation forms.
        '\u{0600}'..='\u{06FF}'
        | '\u{0700}'..='\u{074F}'
        | '\u{0750}'..='\u{077F}'
        | '\u{08A0}'..='\u{08FF}'
        | '\u{FB50}'..='\u{FDFF}'
        | '\u{FE70}'..='\u{FEFE}' => AL,
        c if c.is_whitespace() => WS,
        c if c.is_alphabetic() => L,
        c if c.is_numeric() => L,
        _ => ON,
    }
}

/// Whether the text holds any right-to-left letter.
pub fn contains_rtl(text: &str) -> bool {
    text.chars()
        .any(|ch| matches!(classify(ch), BidiClass::R | BidiClass::AL))
}

/// Direction of the first strong character; left-to-right when none.
pub fn detect_base_direction(text: &str) -> Direction {
    for ch in text.chars() {
        match classify(ch) {
            BidiClass::L => return Direction::Ltr,
            BidiClass::R | BidiClass::AL => return Direction::Rtl,
            _ => {}
        }
    }
    Direction::Ltr
}

/// Per-character embedding levels.
pub fn resolve_levels(text: &str, base: Direction) -> Vec<u8> {
    let original: Vec<BidiClass> = text.chars().map(classify).collect();
    let mut types = original.clone();
    let sos = base.strong_class();
    resolve_weak_types(&mut types, sos);
    resolve_neutral_types(&mut types, sos);
    let base_level = base.level();
    let mut levels: Vec<u8> = types
        .iter()
        .map(|t| implicit_level(*t, base_level))
        .collect();
    reset_whitespace_levels(&original, &mut levels, base_level);
    levels
}

fn resolve_weak_types(types: &mut [BidiClass], sos: BidiClass) {
    use BidiClass::*;
    let n = types.len();

    let mut prev = sos;
    for t in types.iter_mut() {
        if *t == NSM {
            *t = prev;
        }
        prev = *t;
    }

    let mut last_strong = sos;
    for t in types.iter_mut() {
        match *t {
            L | R | AL => last_strong = *t,
            EN if last_strong == AL => *t = AN,
            _ => {}
        }
    }

    for t in types.iter_mut() {
        if *t == AL {
            *t = R;
        }
    }

    for i in 1..n.saturating_sub(1) {
        let (before, here, after) = (types[i - 1], types[i], types[i + 1]);
        match here {
            ES if before == EN && after == EN => types[i] = EN,
            CS if before == after && matches!(before, EN | AN) => types[i] = before,
            _ => {}
        }
    }

    let mut i = 0;
    while i < n {
        if types[i] != ET {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && types[i] == ET {
            i += 1;
        }
        let touches_en = (start > 0 && types[start - 1] == EN) || (i < n && types[i] == EN);
        if touches_en {
            types[start..i].fill(EN);
        }
    }

    for t in types.iter_mut() {
        if matches!(*t, ES | ET | CS) {
            *t = ON;
        }
    }

    let mut last_strong = sos;
    for t in types.iter_mut() {
        match *t {
            L | R => last_strong = *t,
            EN if last_strong == L => *t = L,
            _ => {}
        }
    }
}

fn is_neutral(class: BidiClass) -> bool {
    matches!(
        class,
        BidiClass::ON | BidiClass::WS | BidiClass::B | BidiClass::S | BidiClass::BN
    )
}

/// Direction a resolved type imposes on neighbouring neutrals.
fn neutral_context(class: BidiClass) -> Option<BidiClass> {
    match class {
        BidiClass::L => Some(BidiClass::L),
        BidiClass::R | BidiClass::EN | BidiClass::AN => Some(BidiClass::R),
        _ => None,
    }
}

fn resolve_neutral_types(types: &mut [BidiClass], sos: BidiClass) {
    let n = types.len();
    let mut i = 0;
    while i < n {
        if !is_neutral(types[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && is_neutral(types[i]) {
            i += 1;
        }
        let before = if start == 0 {
            sos
        } else {
            neutral_context(types[start - 1]).unwrap_or(sos)
        };
        let after = if i == n {
            sos
        } else {
            neutral_context(types[i]).unwrap_or(sos)
        };
        let resolved = if before == after { before } else { sos };
        types[start..i].fill(resolved);
    }
}

fn implicit_level(class: BidiClass, base_level: u8) -> u8 {
    if base_level % 2 == 0 {
        match class {
            BidiClass::R => base_level + 1,
            BidiClass::AN | BidiClass::EN => base_level + 2,
            _ => base_level,
        }
    } else {
        match class {
            BidiClass::L | BidiClass::EN | BidiClass::AN => base_level + 1,
            _ => base_level,
        }
    }
}

fn reset_whitespace_levels(original: &[BidiClass], levels: &mut [u8], base_level: u8) {
    let mut trailing = true;
    for (class, level) in original.iter().zip(levels.iter_mut()).rev() {
        match class {
            BidiClass::S | BidiClass::B => {
                *level = base_level;
                trailing = true;
            }
            BidiClass::WS | BidiClass::BN if trailing => *level = base_level,
            _ => trailing = false,
        }
    }
}

/// Split text into maximal same-level runs, in logical order.
pub fn resolve_bidi_runs(text: &str, base: Direction) -> Vec<BidiRun> {
    let levels = resolve_levels(text, base);
    let mut runs: Vec<BidiRun> = Vec::new();
    for (idx, (ch, level)) in text.chars().zip(levels).enumerate() {
        match runs.last_mut() {
            Some(run) if run.level == level => {
                run.end = idx + 1;
                run.text.push(ch);
            }
            _ => runs.push(BidiRun {
                start: idx,
                end: idx + 1,
                level,
                text: ch.to_string(),
            }),
        }
    }
    runs
}

/// Logical indices in visual (left-to-right display) order.
///
/// From the highest level down to the lowest odd level, every maximal
/// sequence at or above the current level is reversed.
pub fn visual_order(levels: &[u8]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..levels.len()).collect();
    let Some(&highest) = levels.iter().max() else {
        return order;
    };
    let Some(lowest_odd) = levels.iter().copied().filter(|l| l % 2 == 1).min() else {
        return order;
    };
    let mut level = highest;
    while level >= lowest_odd {
        let mut i = 0;
        while i < order.len() {
            if levels[order[i]] < level {
                i += 1;
                continue;
            }
            let start = i;
            while i < order.len() && levels[order[i]] >= level {
                i += 1;
            }
            order[start..i].reverse();
        }
        if level == 0 {
            break;
        }
        level -= 1;
    }
    order
}

/// Reorder any level-carrying items into visual order.
pub fn reorder_visual<T>(items: Vec<T>, level_of: impl Fn(&T) -> u8) -> Vec<T> {
    let levels: Vec<u8> = items.iter().map(&level_of).collect();
    let order = visual_order(&levels);
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|idx| slots.get_mut(idx).and_then(Option::take))
        .collect()
}

/// Runs in visual order.
pub fn reorder_runs(runs: &[BidiRun]) -> Vec<BidiRun> {
    reorder_visual(runs.to_vec(), |run| run.level)
}
