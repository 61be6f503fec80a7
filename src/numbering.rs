//! List definitions: per-level marker format, template, indent and start.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::RunProperties;

/// Marker number format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    #[default]
    Decimal,
    DecimalZero,
    LowerLetter,
    UpperLetter,
    LowerRoman,
    UpperRoman,
    /// The level template is shown as-is.
    Bullet,
    None,
}

impl NumberFormat {
    /// Render `n` in this format. Bullets and `None` render empty.
    pub fn format(self, n: u32) -> String {
        match self {
            Self::Decimal => n.to_string(),
            Self::DecimalZero => format!("{:02}", n),
            Self::LowerLetter => letters(n, b'a'),
            Self::UpperLetter => letters(n, b'A'),
            Self::LowerRoman => roman(n).to_lowercase(),
            Self::UpperRoman => roman(n),
            Self::Bullet | Self::None => String::new(),
        }
    }
}

fn letters(n: u32, base: u8) -> String {
    let mut out = Vec::new();
    let mut n = n;
    while n > 0 {
        n -= 1;
        out.push((base + (n % 26) as u8) as char);
        n /= 26;
    }
    out.iter().rev().collect()
}

fn roman(n: u32) -> String {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    let mut n = n;
    for (value, symbol) in TABLE {
        while n >= value {
            out.push_str(symbol);
            n -= value;
        }
    }
    out
}

/// One list level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelDefinition {
    pub format: NumberFormat,
    /// Marker template; `%1`..`%9` stand for the counters of levels 0..8.
    pub text: String,
    /// First counter value.
    pub start: u32,
    /// Left indent of the paragraph body in twips.
    pub indent_left: i32,
    /// Hanging indent (marker area) in twips.
    pub hanging: i32,
    /// Marker run formatting.
    pub run: RunProperties,
}

impl Default for LevelDefinition {
    fn default() -> Self {
        Self {
            format: NumberFormat::Decimal,
            text: "%1.".to_string(),
            start: 1,
            indent_left: 720,
            hanging: 360,
            run: RunProperties::default(),
        }
    }
}

/// A multi-level list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListDefinition {
    pub levels: Vec<LevelDefinition>,
}

impl ListDefinition {
    /// Marker text for `level` given the current counters of levels `0..=level`.
    ///
    /// Missing counters for shallower levels render as their level's start.
    pub fn marker_text(&self, level: usize, counters: &[u32]) -> String {
        let Some(def) = self.levels.get(level) else {
            return String::new();
        };
        if def.format == NumberFormat::Bullet {
            return def.text.clone();
        }
        let mut out = String::with_capacity(def.text.len() + 4);
        let mut chars = def.text.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '%' {
                if let Some(digit) = chars.peek().and_then(|d| d.to_digit(10)) {
                    chars.next();
                    let lvl = digit.saturating_sub(1) as usize;
                    if lvl <= level {
                        let level_def = self.levels.get(lvl);
                        let value = counters
                            .get(lvl)
                            .copied()
                            .or_else(|| level_def.map(|d| d.start))
                            .unwrap_or(1);
                        let format = level_def.map_or(NumberFormat::Decimal, |d| d.format);
                        out.push_str(&format.format(value));
                    }
                    continue;
                }
            }
            out.push(ch);
        }
        out
    }
}

/// Numbering table of a document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberingRegistry {
    pub lists: BTreeMap<String, ListDefinition>,
}

impl NumberingRegistry {
    /// Look up a list.
    pub fn list(&self, list_id: &str) -> Option<&ListDefinition> {
        self.lists.get(list_id)
    }

    /// Look up one level of a list.
    pub fn level(&self, list_id: &str, level: u8) -> Option<&LevelDefinition> {
        self.lists
            .get(list_id)
            .and_then(|list| list.levels.get(level as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_cover_letters_and_roman() {
        assert_eq!(NumberFormat::LowerLetter.format(1), "a");
        assert_eq!(NumberFormat::UpperLetter.format(27), "AA");
        assert_eq!(NumberFormat::LowerRoman.format(14), "xiv");
        assert_eq!(NumberFormat::UpperRoman.format(1999), "MCMXCIX");
        assert_eq!(NumberFormat::DecimalZero.format(7), "07");
    }

    #[test]
    fn multi_level_template_uses_each_level_format() {
        let list = ListDefinition {
            levels: vec![
                LevelDefinition::default(),
                LevelDefinition {
                    format: NumberFormat::LowerLetter,
                    text: "%1.%2)".into(),
                    ..LevelDefinition::default()
                },
            ],
        };
        assert_eq!(list.marker_text(1, &[3, 2]), "3.b)");
        assert_eq!(list.marker_text(0, &[4]), "4.");
    }

    #[test]
    fn bullets_show_template_verbatim() {
        let list = ListDefinition {
            levels: vec![LevelDefinition {
                format: NumberFormat::Bullet,
                text: "\u{2022}".into(),
                ..LevelDefinition::default()
            }],
        };
        assert_eq!(list.marker_text(0, &[9]), "\u{2022}");
        assert_eq!(list.marker_text(3, &[1]), "");
    }
}
