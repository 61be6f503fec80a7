//! Property merging into pixel-based styles.

use docflow::units::{half_points_to_px, twips_to_px};
use docflow::{
    Alignment, LineSpacing, NumberingRef, NumberingRegistry, ParagraphProperties, RunProperties,
    StyleRegistry, TextDirection, UnderlineStyle, VerticalAlign,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Font family used when no layer names one.
pub const DEFAULT_FONT_FAMILY: &str = "Calibri";
/// Font size (half-points) used when no layer sets one.
pub const DEFAULT_FONT_SIZE_HALF_POINTS: u32 = 22;
/// Size factor applied to superscript and subscript text.
pub const SCRIPT_SCALE: f32 = 0.65;

/// Fully merged run style in pixels. Shared via `Arc`, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRunStyle {
    pub font_family: String,
    /// Nominal font size in px (before superscript/subscript scaling).
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: Option<UnderlineStyle>,
    pub strike: bool,
    /// `RRGGBB`.
    pub color: String,
    pub highlight: Option<String>,
    /// Extra advance after every character, in px.
    pub letter_spacing: f32,
    pub caps: bool,
    pub small_caps: bool,
    pub vertical_align: VerticalAlign,
}

impl Default for ResolvedRunStyle {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: half_points_to_px(DEFAULT_FONT_SIZE_HALF_POINTS),
            bold: false,
            italic: false,
            underline: None,
            strike: false,
            color: "000000".to_string(),
            highlight: None,
            letter_spacing: 0.0,
            caps: false,
            small_caps: false,
            vertical_align: VerticalAlign::Baseline,
        }
    }
}

impl ResolvedRunStyle {
    /// Size glyphs are drawn at.
    pub fn effective_size(&self) -> f32 {
        match self.vertical_align {
            VerticalAlign::Baseline => self.font_size,
            VerticalAlign::Superscript | VerticalAlign::Subscript => {
                self.font_size * SCRIPT_SCALE
            }
        }
    }

    /// Key identifying everything that changes glyph advances.
    pub fn font_key(&self) -> String {
        format!(
            "{}|{:.2}|{}{}{}{}|{:.2}",
            self.font_family,
            self.effective_size(),
            if self.bold { 'b' } else { '-' },
            if self.italic { 'i' } else { '-' },
            if self.caps { 'C' } else { '-' },
            if self.small_caps { 's' } else { '-' },
            self.letter_spacing
        )
    }
}

/// Line height rule in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LineHeightRule {
    /// Multiple of the font line height.
    Multiple(f32),
    Exact(f32),
    AtLeast(f32),
}

impl LineHeightRule {
    /// Apply the rule to a natural line height.
    pub fn apply(self, natural: f32) -> f32 {
        match self {
            Self::Multiple(m) => natural * m,
            Self::Exact(px) => px,
            Self::AtLeast(px) => natural.max(px),
        }
    }
}

/// Fully merged paragraph style in pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedParagraphStyle {
    pub alignment: Alignment,
    pub direction: TextDirection,
    pub indent_left: f32,
    pub indent_right: f32,
    /// First-line offset from `indent_left`; negative for hanging indents.
    pub first_line: f32,
    pub spacing_before: f32,
    pub spacing_after: f32,
    pub line_height: LineHeightRule,
    pub keep_together: bool,
    pub keep_with_next: bool,
    pub page_break_before: bool,
    pub widow_control: bool,
    pub numbering: Option<NumberingRef>,
    /// Paragraph-level run style (empty paragraphs, markers).
    pub run: Arc<ResolvedRunStyle>,
}

impl Default for ResolvedParagraphStyle {
    fn default() -> Self {
        Self {
            alignment: Alignment::Left,
            direction: TextDirection::Ltr,
            indent_left: 0.0,
            indent_right: 0.0,
            first_line: 0.0,
            spacing_before: 0.0,
            spacing_after: 0.0,
            line_height: LineHeightRule::Multiple(1.0),
            keep_together: false,
            keep_with_next: false,
            page_break_before: false,
            widow_control: true,
            numbering: None,
            run: Arc::new(ResolvedRunStyle::default()),
        }
    }
}

type RunKey = (Option<String>, RunProperties);

/// Merges registry styles with paragraph and run properties.
///
/// Resolved run styles are interned so identical formatting shares one `Arc`.
pub struct StyleResolver<'a> {
    styles: &'a StyleRegistry,
    numbering: &'a NumberingRegistry,
    runs: HashMap<RunKey, Arc<ResolvedRunStyle>>,
}

impl<'a> StyleResolver<'a> {
    pub fn new(styles: &'a StyleRegistry, numbering: &'a NumberingRegistry) -> Self {
        Self {
            styles,
            numbering,
            runs: HashMap::new(),
        }
    }

    /// Merge defaults, the paragraph style chain, the list level indent and
    /// direct properties, in that order.
    pub fn resolve_paragraph(&mut self, direct: &ParagraphProperties) -> ResolvedParagraphStyle {
        let (mut props, _) = self
            .styles
            .resolve_paragraph_style(direct.style_id.as_deref());
        let numbering = direct.numbering.as_ref().or(props.numbering.as_ref()).cloned();
        if let Some(num) = numbering.as_ref() {
            match self.numbering.level(&num.list_id, num.level) {
                Some(level) => {
                    props.indent_left = Some(level.indent_left);
                    props.hanging = Some(level.hanging);
                    props.first_line = None;
                }
                None => log::debug!(
                    "no numbering definition for list '{}' level {}",
                    num.list_id,
                    num.level
                ),
            }
        }
        props.merge_from(direct);
        if direct.first_line.is_some() && direct.hanging.is_none() {
            props.hanging = None;
        }

        let first_line = match (props.hanging, props.first_line) {
            (Some(h), _) => -twips_to_px(h),
            (None, Some(f)) => twips_to_px(f),
            (None, None) => 0.0,
        };
        let line_height = match props.line_spacing {
            Some(LineSpacing::Auto { value }) if value > 0 => {
                LineHeightRule::Multiple(value as f32 / 240.0)
            }
            Some(LineSpacing::Exact { value }) if value > 0 => {
                LineHeightRule::Exact(twips_to_px(value))
            }
            Some(LineSpacing::AtLeast { value }) => {
                LineHeightRule::AtLeast(twips_to_px(value.max(0)))
            }
            _ => LineHeightRule::Multiple(1.0),
        };
        let run = self.resolve_run(direct.style_id.as_deref(), &RunProperties::default());

        ResolvedParagraphStyle {
            alignment: props.alignment.unwrap_or_default(),
            direction: props.direction.unwrap_or_default(),
            indent_left: twips_to_px(props.indent_left.unwrap_or(0)),
            indent_right: twips_to_px(props.indent_right.unwrap_or(0)),
            first_line,
            spacing_before: twips_to_px(props.spacing_before.unwrap_or(0).max(0)),
            spacing_after: twips_to_px(props.spacing_after.unwrap_or(0).max(0)),
            line_height,
            keep_together: props.keep_together.unwrap_or(false),
            keep_with_next: props.keep_with_next.unwrap_or(false),
            page_break_before: props.page_break_before.unwrap_or(false),
            widow_control: props.widow_control.unwrap_or(true),
            numbering: props.numbering,
            run,
        }
    }

    /// Merge defaults, the paragraph style's run layer, the character style
    /// chain and direct run properties.
    pub fn resolve_run(
        &mut self,
        paragraph_style: Option<&str>,
        direct: &RunProperties,
    ) -> Arc<ResolvedRunStyle> {
        let key = (paragraph_style.map(str::to_string), direct.clone());
        if let Some(hit) = self.runs.get(&key) {
            return Arc::clone(hit);
        }
        let (_, mut props) = self.styles.resolve_paragraph_style(paragraph_style);
        if let Some(char_style) = direct.style_id.as_deref() {
            props.merge_from(&self.styles.resolve_character_style(char_style));
        }
        props.merge_from(direct);
        let resolved = Arc::new(to_resolved(&props));
        self.runs.insert(key, Arc::clone(&resolved));
        resolved
    }

    /// Style of a list marker: the paragraph's run style overlaid with the
    /// level's marker formatting.
    pub fn resolve_marker(
        &mut self,
        paragraph_style: Option<&str>,
        num: &NumberingRef,
    ) -> Arc<ResolvedRunStyle> {
        let marker_props = self
            .numbering
            .level(&num.list_id, num.level)
            .map(|level| level.run.clone())
            .unwrap_or_default();
        self.resolve_run(paragraph_style, &marker_props)
    }
}

fn to_resolved(props: &RunProperties) -> ResolvedRunStyle {
    let defaults = ResolvedRunStyle::default();
    ResolvedRunStyle {
        font_family: props.font_family.clone().unwrap_or(defaults.font_family),
        font_size: props
            .size
            .filter(|size| *size > 0)
            .map_or(defaults.font_size, half_points_to_px),
        bold: props.bold.unwrap_or(false),
        italic: props.italic.unwrap_or(false),
        underline: props.underline.filter(|u| *u != UnderlineStyle::None),
        strike: props.strike.unwrap_or(false),
        color: props.color.clone().unwrap_or(defaults.color),
        highlight: props.highlight.clone(),
        letter_spacing: props.letter_spacing.map_or(0.0, twips_to_px),
        caps: props.caps.unwrap_or(false),
        small_caps: props.small_caps.unwrap_or(false),
        vertical_align: props.vertical_align.unwrap_or_default(),
    }
}
