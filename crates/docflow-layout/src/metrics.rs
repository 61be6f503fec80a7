//! Glyph measurement.

use crate::cache::LayoutCache;
use crate::style::ResolvedRunStyle;

/// Measured text box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextSize {
    pub width: f32,
    pub height: f32,
}

/// Vertical font metrics in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FontMetrics {
    pub ascent: f32,
    pub descent: f32,
    /// Natural single-spaced line height.
    pub line_height: f32,
    pub em_size: f32,
}

/// Text measurement service shared by layout passes.
pub trait GlyphMetrics: Send + Sync {
    /// Measure rendered text for the provided style.
    fn measure_text(&self, text: &str, style: &ResolvedRunStyle) -> TextSize;

    /// Width of a single word.
    ///
    /// Default delegates to `measure_text`.
    fn measure_word(&self, word: &str, style: &ResolvedRunStyle) -> f32 {
        self.measure_text(word, style).width
    }

    /// Ascent, descent and line height for the style.
    fn font_metrics(&self, style: &ResolvedRunStyle) -> FontMetrics;
}

/// Deterministic character-class width estimate.
///
/// Used when no real font is available, and as the test double everywhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct EstimatedMetrics;

impl GlyphMetrics for EstimatedMetrics {
    fn measure_text(&self, text: &str, style: &ResolvedRunStyle) -> TextSize {
        TextSize {
            width: estimate_width(text, style),
            height: self.font_metrics(style).line_height,
        }
    }

    fn font_metrics(&self, style: &ResolvedRunStyle) -> FontMetrics {
        let size = style.effective_size();
        FontMetrics {
            ascent: size * 0.8,
            descent: size * 0.2,
            line_height: size * 1.2,
            em_size: size,
        }
    }
}

fn estimate_width(text: &str, style: &ResolvedRunStyle) -> f32 {
    let family = style.font_family.to_ascii_lowercase();
    let proportional = !(family.contains("mono") || family.contains("courier"));
    let size = style.effective_size();
    let mut width = 0.0f32;
    let mut chars = 0usize;
    for ch in text.chars() {
        chars += 1;
        let (ch, scale) = cased(ch, style);
        let em = if proportional {
            glyph_em_width(ch)
        } else if ch == '\t' {
            1.28
        } else {
            0.6
        };
        width += em * size * scale;
    }
    let mut family_scale = if family.contains("serif") && !family.contains("sans") {
        1.03
    } else {
        1.0
    };
    if style.bold {
        family_scale += 0.03;
    }
    if style.italic {
        family_scale += 0.01;
    }
    width * family_scale + chars as f32 * style.letter_spacing
}

fn cased(ch: char, style: &ResolvedRunStyle) -> (char, f32) {
    if style.caps && ch.is_lowercase() {
        (ch.to_uppercase().next().unwrap_or(ch), 1.0)
    } else if style.small_caps && ch.is_lowercase() {
        (ch.to_uppercase().next().unwrap_or(ch), 0.8)
    } else {
        (ch, 1.0)
    }
}

fn glyph_em_width(ch: char) -> f32 {
    match ch {
        ' ' | '\u{00A0}' => 0.32,
        '\t' => 1.28,
        '\u{00AD}' | '\u{200B}'..='\u{200F}' | '\u{FEFF}' => 0.0,
        'i' | 'l' | 'I' | '|' | '!' => 0.24,
        '.' | ',' | ':' | ';' | '\'' | '"' | '`' => 0.23,
        '-' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' => 0.34,
        '(' | ')' | '[' | ']' | '{' | '}' => 0.30,
        'f' | 't' | 'j' | 'r' => 0.34,
        'm' | 'w' | 'M' | 'W' | '@' | '%' | '&' | '#' => 0.74,
        c if c.is_ascii_digit() => 0.52,
        c if c.is_ascii_uppercase() => 0.64,
        c if c.is_ascii_lowercase() => 0.52,
        c if c.is_whitespace() => 0.32,
        c if c.is_ascii_punctuation() => 0.42,
        '\u{0300}'..='\u{036F}' | '\u{0591}'..='\u{05C7}' | '\u{064B}'..='\u{065F}' => 0.0,
        '\u{3000}'..='\u{9FFF}' | '\u{AC00}'..='\u{D7AF}' | '\u{FF00}'..='\u{FFEF}' => 1.0,
        _ => 0.56,
    }
}

/// Pass-scoped measuring front end: routes widths through the text-width
/// cache keyed by `font_key|text`.
pub struct Measurer<'a> {
    metrics: &'a dyn GlyphMetrics,
    cache: &'a mut LayoutCache,
}

impl<'a> Measurer<'a> {
    pub fn new(metrics: &'a dyn GlyphMetrics, cache: &'a mut LayoutCache) -> Self {
        Self { metrics, cache }
    }

    /// Width of `text`, cached.
    pub fn width(&mut self, text: &str, style: &ResolvedRunStyle) -> f32 {
        if text.is_empty() {
            return 0.0;
        }
        let key = format!("{}|{}", style.font_key(), text);
        if let Some(width) = self.cache.get_cached_text_width(&key) {
            return width;
        }
        let width = self.metrics.measure_word(text, style);
        self.cache.set_cached_text_width(key, width);
        width
    }

    pub fn font_metrics(&self, style: &ResolvedRunStyle) -> FontMetrics {
        self.metrics.font_metrics(style)
    }

    pub fn cache(&mut self) -> &mut LayoutCache {
        self.cache
    }
}

#[cfg(feature = "ttf")]
pub use self::ttf::FontFaceMetrics;

#[cfg(feature = "ttf")]
mod ttf {
    use super::{EstimatedMetrics, FontMetrics, GlyphMetrics, TextSize};
    use crate::style::ResolvedRunStyle;
    use ttf_parser::Face;

    struct LoadedFace {
        family: String,
        bold: bool,
        italic: bool,
        data: Vec<u8>,
        index: u32,
    }

    /// Measures text with real font files through `ttf-parser`.
    ///
    /// Faces are matched by family (case-insensitive), then weight and style.
    /// Styles with no loaded face, and glyphs missing from the face, fall back
    /// to [`EstimatedMetrics`].
    #[derive(Default)]
    pub struct FontFaceMetrics {
        faces: Vec<LoadedFace>,
    }

    impl FontFaceMetrics {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a font file. Returns `false` when the data is not a font.
        pub fn add_face(&mut self, data: Vec<u8>, index: u32) -> bool {
            let Ok(face) = Face::parse(&data, index) else {
                return false;
            };
            let family = face
                .names()
                .into_iter()
                .find(|name| name.name_id == ttf_parser::name_id::FAMILY && name.is_unicode())
                .and_then(|name| name.to_string())
                .unwrap_or_default()
                .to_ascii_lowercase();
            let bold = face.is_bold();
            let italic = face.is_italic();
            self.faces.push(LoadedFace {
                family,
                bold,
                italic,
                data,
                index,
            });
            true
        }

        fn face_for(&self, style: &ResolvedRunStyle) -> Option<Face<'_>> {
            let family = style.font_family.to_ascii_lowercase();
            let loaded = self
                .faces
                .iter()
                .filter(|f| f.family == family)
                .max_by_key(|f| {
                    u8::from(f.bold == style.bold) * 2 + u8::from(f.italic == style.italic)
                })?;
            Face::parse(&loaded.data, loaded.index).ok()
        }
    }

    impl GlyphMetrics for FontFaceMetrics {
        fn measure_text(&self, text: &str, style: &ResolvedRunStyle) -> TextSize {
            let Some(face) = self.face_for(style) else {
                return EstimatedMetrics.measure_text(text, style);
            };
            let units = f32::from(face.units_per_em().max(1));
            let size = style.effective_size();
            let mut width = 0.0f32;
            for ch in text.chars() {
                let ch = if style.caps {
                    ch.to_uppercase().next().unwrap_or(ch)
                } else {
                    ch
                };
                let advance = face
                    .glyph_index(ch)
                    .and_then(|gid| face.glyph_hor_advance(gid))
                    .map(|adv| f32::from(adv) / units * size);
                width += match advance {
                    Some(adv) => adv,
                    None => EstimatedMetrics.measure_text(&ch.to_string(), style).width,
                };
                width += style.letter_spacing;
            }
            TextSize {
                width,
                height: self.font_metrics(style).line_height,
            }
        }

        fn font_metrics(&self, style: &ResolvedRunStyle) -> FontMetrics {
            let Some(face) = self.face_for(style) else {
                return EstimatedMetrics.font_metrics(style);
            };
            let units = f32::from(face.units_per_em().max(1));
            let size = style.effective_size();
            let ascent = f32::from(face.ascender()) / units * size;
            let descent = -f32::from(face.descender()) / units * size;
            let gap = f32::from(face.line_gap()) / units * size;
            FontMetrics {
                ascent,
                descent,
                line_height: ascent + descent + gap,
                em_size: size,
            }
        }
    }
}
