//! Named style registry with `based_on` inheritance.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{ParagraphProperties, RunProperties};

/// Longest `based_on` chain followed before giving up.
pub const MAX_STYLE_DEPTH: usize = 32;

/// Document-wide property defaults, applied under every style.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocDefaults {
    pub paragraph: ParagraphProperties,
    pub run: RunProperties,
}

/// A named paragraph style. It carries run properties too, which apply to
/// every run in paragraphs using it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParagraphStyle {
    pub name: Option<String>,
    pub based_on: Option<String>,
    pub paragraph: ParagraphProperties,
    pub run: RunProperties,
}

/// A named character style.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterStyle {
    pub name: Option<String>,
    pub based_on: Option<String>,
    pub run: RunProperties,
}

/// Style table of a document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleRegistry {
    pub defaults: DocDefaults,
    /// Paragraph style used when a paragraph names none.
    pub default_paragraph_style: Option<String>,
    pub paragraph_styles: BTreeMap<String, ParagraphStyle>,
    pub character_styles: BTreeMap<String, CharacterStyle>,
}

impl StyleRegistry {
    /// Paragraph styles from the root of the `based_on` chain down to `id`.
    ///
    /// Unknown ids end the chain; cycles and overlong chains are cut with a
    /// warning.
    pub fn paragraph_chain(&self, id: &str) -> Vec<&ParagraphStyle> {
        let mut chain = Vec::new();
        let mut seen: Vec<&str> = Vec::new();
        let mut current = Some(id);
        while let Some(style_id) = current {
            if seen.contains(&style_id) || seen.len() >= MAX_STYLE_DEPTH {
                log::warn!("paragraph style chain for '{}' cut at '{}'", id, style_id);
                break;
            }
            let Some(style) = self.paragraph_styles.get(style_id) else {
                break;
            };
            seen.push(style_id);
            chain.push(style);
            current = style.based_on.as_deref();
        }
        chain.reverse();
        chain
    }

    /// Character styles from the root of the `based_on` chain down to `id`.
    pub fn character_chain(&self, id: &str) -> Vec<&CharacterStyle> {
        let mut chain = Vec::new();
        let mut seen: Vec<&str> = Vec::new();
        let mut current = Some(id);
        while let Some(style_id) = current {
            if seen.contains(&style_id) || seen.len() >= MAX_STYLE_DEPTH {
                log::warn!("character style chain for '{}' cut at '{}'", id, style_id);
                break;
            }
            let Some(style) = self.character_styles.get(style_id) else {
                break;
            };
            seen.push(style_id);
            chain.push(style);
            current = style.based_on.as_deref();
        }
        chain.reverse();
        chain
    }

    /// Merge defaults and the named (or default) paragraph style chain.
    pub fn resolve_paragraph_style(
        &self,
        style_id: Option<&str>,
    ) -> (ParagraphProperties, RunProperties) {
        let mut para = self.defaults.paragraph.clone();
        let mut run = self.defaults.run.clone();
        let id = style_id.or(self.default_paragraph_style.as_deref());
        if let Some(id) = id {
            for style in self.paragraph_chain(id) {
                para.merge_from(&style.paragraph);
                run.merge_from(&style.run);
            }
        }
        (para, run)
    }

    /// Merge the named character style chain.
    pub fn resolve_character_style(&self, style_id: &str) -> RunProperties {
        let mut run = RunProperties::default();
        for style in self.character_chain(style_id) {
            run.merge_from(&style.run);
        }
        run
    }
}
