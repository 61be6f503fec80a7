/// Hyphenation policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HyphenationConfig {
    /// Hyphenate overflowing words with the rule-based finder.
    pub enabled: bool,
    /// Use soft hyphens (U+00AD) as preferred break points.
    pub soft_hyphens: bool,
    /// Words shorter than this (in chars) are never auto-hyphenated.
    pub min_word_chars: usize,
    /// Minimum chars kept on each side of a break.
    pub min_side_chars: usize,
}

impl Default for HyphenationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            soft_hyphens: true,
            min_word_chars: 5,
            min_side_chars: 2,
        }
    }
}

/// Widow/orphan control policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WidowOrphanControl {
    /// Keep at least this many lines at paragraph start/end when splitting.
    pub min_lines: u8,
    /// Enable widow/orphan controls (paragraphs may still opt out).
    pub enabled: bool,
}

impl Default for WidowOrphanControl {
    fn default() -> Self {
        Self {
            min_lines: 2,
            enabled: true,
        }
    }
}

/// Justification and optimal line-breaking policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JustificationConfig {
    /// Break justified paragraphs with Knuth–Plass instead of greedy fill.
    pub optimal: bool,
    /// Largest acceptable line badness.
    pub tolerance: f64,
    /// Added to the badness of every line before squaring.
    pub line_penalty: f64,
    /// Penalty for breaking at a hyphen.
    pub hyphen_penalty: f64,
    /// Extra demerits for two hyphenated lines in a row.
    pub flagged_demerits: f64,
    /// Extra demerits when adjacent lines jump more than one fitness class.
    pub fitness_demerits: f64,
    /// Preferred deviation from the optimal line count.
    pub looseness: i32,
    /// Inter-word stretch as a fraction of the space width.
    pub space_stretch_ratio: f32,
    /// Inter-word shrink as a fraction of the space width.
    pub space_shrink_ratio: f32,
}

impl Default for JustificationConfig {
    fn default() -> Self {
        Self {
            optimal: true,
            tolerance: 10_000.0,
            line_penalty: 10.0,
            hyphen_penalty: 50.0,
            flagged_demerits: 100.0,
            fitness_demerits: 100.0,
            looseness: 0,
            space_stretch_ratio: 0.5,
            space_shrink_ratio: 0.33,
        }
    }
}

/// Typography policy surface.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TypographyConfig {
    /// Hyphenation policy.
    pub hyphenation: HyphenationConfig,
    /// Widow/orphan control policy.
    pub widow_orphan_control: WidowOrphanControl,
    /// Justification policy.
    pub justification: JustificationConfig,
}

/// Layout configuration for a pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConfig {
    /// Typography policy surface.
    pub typography: TypographyConfig,
    /// Distance between default tab stops.
    pub default_tab_stop_px: f32,
    /// Floor for every table row.
    pub min_row_height_px: f32,
    /// Gap between body content and the footnote separator.
    pub footnote_gap_px: f32,
    /// Footnote separator length as a fraction of the content width.
    pub footnote_separator_ratio: f32,
    /// Minimum gap between the header bottom and body content.
    pub header_body_gap_px: f32,
    /// Gap between a list marker and the paragraph text.
    pub list_marker_gap_px: f32,
    /// Text width cache capacity (entries).
    pub text_width_cache_capacity: usize,
    /// Reuse laid-out paragraphs whose stamp and width are unchanged.
    pub paragraph_cache: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            typography: TypographyConfig::default(),
            default_tab_stop_px: 48.0,
            min_row_height_px: 14.0,
            footnote_gap_px: 12.0,
            footnote_separator_ratio: 0.33,
            header_body_gap_px: 0.0,
            list_marker_gap_px: 6.0,
            text_width_cache_capacity: 4096,
            paragraph_cache: true,
        }
    }
}
