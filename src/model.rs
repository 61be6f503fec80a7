//! Immutable document tree consumed by the layout engine.
//!
//! The tree mirrors a word-processing document: a body of sections, each
//! holding blocks (paragraphs, tables, shapes, page breaks), with paragraphs
//! holding inline children and runs holding text leaves. Lengths stay in the
//! source units of the format they came from (twips, EMU, half-points); see
//! [`crate::units`] for conversions.
//!
//! Identity-bearing nodes carry a [`NodeStamp`]. Editors keep the `id` stable
//! across edits and bump `generation` only when the node really changes, which
//! is what layout caches key on.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::DocumentError;
use crate::numbering::NumberingRegistry;
use crate::styles::StyleRegistry;

/// Stable identity of a document node plus a change counter.
///
/// An `id` of `0` marks an unstamped node; caches never key on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeStamp {
    /// Stable node id, unique within a document.
    pub id: u64,
    /// Bumped whenever the node (or anything below it) changes.
    pub generation: u32,
}

impl NodeStamp {
    /// Create a stamp.
    pub const fn new(id: u64, generation: u32) -> Self {
        Self { id, generation }
    }

    /// Whether this node carries a usable identity.
    pub const fn is_stamped(self) -> bool {
        self.id != 0
    }

    /// Same node, next generation.
    pub const fn bumped(self) -> Self {
        Self {
            id: self.id,
            generation: self.generation.wrapping_add(1),
        }
    }
}

/// Root of a document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    /// Main story.
    pub body: Body,
    /// Header and footer parts, addressed by reference id.
    pub headers_footers: BTreeMap<String, HeaderFooter>,
    /// Footnote bodies, addressed by note id.
    pub footnotes: BTreeMap<String, Note>,
    /// Endnote bodies, addressed by note id.
    pub endnotes: BTreeMap<String, Note>,
    /// Named paragraph/character styles and document defaults.
    pub styles: StyleRegistry,
    /// List definitions.
    pub numbering: NumberingRegistry,
}

/// Main document story.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Body {
    pub sections: Vec<Section>,
}

impl Document {
    /// Build a single-section document from blocks.
    pub fn from_blocks(properties: SectionProperties, blocks: Vec<Block>) -> Self {
        Self {
            body: Body {
                sections: vec![Section {
                    stamp: NodeStamp::default(),
                    properties,
                    blocks,
                }],
            },
            ..Self::default()
        }
    }

    /// Parse a document from JSON text, stamp unstamped nodes and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, DocumentError> {
        let mut doc: Document = serde_json::from_str(json)?;
        doc.assign_missing_stamps();
        doc.validate()?;
        Ok(doc)
    }

    /// Parse a document from JSON bytes, stamp unstamped nodes and validate it.
    pub fn from_json_slice(json: &[u8]) -> Result<Self, DocumentError> {
        let mut doc: Document = serde_json::from_slice(json)?;
        doc.assign_missing_stamps();
        doc.validate()?;
        Ok(doc)
    }

    /// Serialize the document to pretty JSON.
    pub fn to_json_string(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Give every node with an `id` of `0` a fresh id above the current maximum.
    pub fn assign_missing_stamps(&mut self) {
        let mut max_id = 0u64;
        self.visit_stamps(&mut |stamp| max_id = max_id.max(stamp.id));
        let mut next = max_id;
        self.visit_stamps(&mut |stamp| {
            if !stamp.is_stamped() {
                next += 1;
                stamp.id = next;
            }
        });
    }

    fn visit_stamps(&mut self, f: &mut dyn FnMut(&mut NodeStamp)) {
        for section in &mut self.body.sections {
            f(&mut section.stamp);
            visit_block_stamps(&mut section.blocks, f);
        }
        for part in self.headers_footers.values_mut() {
            f(&mut part.stamp);
            visit_block_stamps(&mut part.blocks, f);
        }
        for note in self.footnotes.values_mut().chain(self.endnotes.values_mut()) {
            f(&mut note.stamp);
            visit_block_stamps(&mut note.blocks, f);
        }
    }

    /// Check structural constraints the layout engine relies on.
    pub fn validate(&self) -> Result<(), DocumentError> {
        for (si, section) in self.body.sections.iter().enumerate() {
            let props = &section.properties;
            let (width, height) = props.page_size();
            if width <= 0 || height <= 0 {
                return Err(DocumentError::invalid(
                    format!("body/sections/{si}"),
                    "page size must be positive",
                ));
            }
            let m = &props.margins;
            if m.left + m.right >= width || m.top + m.bottom >= height {
                return Err(DocumentError::invalid(
                    format!("body/sections/{si}"),
                    "margins leave no content area",
                ));
            }
            if props.columns.count == 0 {
                return Err(DocumentError::invalid(
                    format!("body/sections/{si}/columns"),
                    "column count must be at least 1",
                ));
            }
            validate_blocks(&section.blocks, &format!("body/sections/{si}/blocks"))?;
        }
        Ok(())
    }
}

fn visit_block_stamps(blocks: &mut [Block], f: &mut dyn FnMut(&mut NodeStamp)) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => f(&mut p.stamp),
            Block::Table(t) => {
                f(&mut t.stamp);
                for row in &mut t.rows {
                    for cell in &mut row.cells {
                        visit_block_stamps(&mut cell.blocks, f);
                    }
                }
            }
            Block::Shape(s) => {
                f(&mut s.stamp);
                visit_block_stamps(&mut s.blocks, f);
            }
            Block::PageBreak => {}
        }
    }
}

fn validate_blocks(blocks: &[Block], path: &str) -> Result<(), DocumentError> {
    for (bi, block) in blocks.iter().enumerate() {
        if let Block::Table(table) = block {
            for (ri, row) in table.rows.iter().enumerate() {
                for (ci, cell) in row.cells.iter().enumerate() {
                    if cell.grid_span == 0 {
                        return Err(DocumentError::invalid(
                            format!("{path}/{bi}/rows/{ri}/cells/{ci}"),
                            "grid_span must be at least 1",
                        ));
                    }
                    validate_blocks(&cell.blocks, &format!("{path}/{bi}/rows/{ri}/cells/{ci}"))?;
                }
            }
        }
    }
    Ok(())
}

/// A run of pages sharing geometry, columns and header/footer references.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Section {
    pub stamp: NodeStamp,
    pub properties: SectionProperties,
    pub blocks: Vec<Block>,
}

/// Page orientation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Section page geometry (twips).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionProperties {
    /// Page width in twips.
    pub page_width: i32,
    /// Page height in twips.
    pub page_height: i32,
    pub orientation: Orientation,
    pub margins: PageMargins,
    pub columns: ColumnSettings,
    /// Default header reference.
    pub header: Option<String>,
    /// Default footer reference.
    pub footer: Option<String>,
    /// First-page header reference, used when `title_page` is set.
    pub first_header: Option<String>,
    /// First-page footer reference, used when `title_page` is set.
    pub first_footer: Option<String>,
    /// Use distinct first-page header/footer.
    pub title_page: bool,
}

impl Default for SectionProperties {
    fn default() -> Self {
        // US Letter with one-inch margins.
        Self {
            page_width: 12_240,
            page_height: 15_840,
            orientation: Orientation::Portrait,
            margins: PageMargins::default(),
            columns: ColumnSettings::default(),
            header: None,
            footer: None,
            first_header: None,
            first_footer: None,
            title_page: false,
        }
    }
}

impl SectionProperties {
    /// Effective (width, height) in twips after applying orientation.
    pub fn page_size(&self) -> (i32, i32) {
        let (short, long) = if self.page_width <= self.page_height {
            (self.page_width, self.page_height)
        } else {
            (self.page_height, self.page_width)
        };
        match self.orientation {
            Orientation::Portrait => (short, long),
            Orientation::Landscape => (long, short),
        }
    }
}

/// Page margins (twips). `header`/`footer` are distances from the page edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageMargins {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
    pub header: i32,
    pub footer: i32,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self {
            top: 1440,
            bottom: 1440,
            left: 1440,
            right: 1440,
            header: 720,
            footer: 720,
        }
    }
}

/// Newspaper-style column settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSettings {
    /// Number of equal-width columns.
    pub count: u16,
    /// Gap between columns in twips.
    pub space: i32,
    /// Draw a rule between columns.
    pub separator: bool,
}

impl Default for ColumnSettings {
    fn default() -> Self {
        Self {
            count: 1,
            space: 720,
            separator: false,
        }
    }
}

/// Block-level content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    Shape(Shape),
    PageBreak,
}

impl Block {
    /// Identity stamp of the block, if it has one.
    pub fn stamp(&self) -> Option<NodeStamp> {
        match self {
            Self::Paragraph(p) => Some(p.stamp),
            Self::Table(t) => Some(t.stamp),
            Self::Shape(s) => Some(s.stamp),
            Self::PageBreak => None,
        }
    }
}

/// A paragraph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paragraph {
    pub stamp: NodeStamp,
    pub properties: ParagraphProperties,
    pub children: Vec<Inline>,
}

impl Paragraph {
    /// Paragraph with a single plain run.
    pub fn from_text(stamp: NodeStamp, text: &str) -> Self {
        Self {
            stamp,
            properties: ParagraphProperties::default(),
            children: vec![Inline::Run(Run::plain(text))],
        }
    }

    /// Builder-style property override.
    pub fn with_properties(mut self, properties: ParagraphProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Concatenated text of runs and hyperlinks (no field results or notes).
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Inline::Run(run) => run.push_text(&mut out),
                Inline::Hyperlink(link) => {
                    for run in &link.children {
                        run.push_text(&mut out);
                    }
                }
                _ => {}
            }
        }
        out
    }
}

/// Horizontal paragraph alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    #[serde(alias = "both")]
    Justify,
}

/// Paragraph base direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextDirection {
    #[default]
    Ltr,
    Rtl,
    /// Take the direction of the first strong character.
    Auto,
}

/// Line spacing rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum LineSpacing {
    /// Multiple of the font line height, in 240ths (240 = single).
    Auto { value: i32 },
    /// Exact line height in twips.
    Exact { value: i32 },
    /// Minimum line height in twips.
    AtLeast { value: i32 },
}

/// Reference from a paragraph to a list level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingRef {
    pub list_id: String,
    #[serde(default)]
    pub level: u8,
}

/// Paragraph properties. Every field is optional so that style, direct and
/// default layers can be merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParagraphProperties {
    pub style_id: Option<String>,
    pub alignment: Option<Alignment>,
    pub direction: Option<TextDirection>,
    /// Left indent in twips.
    pub indent_left: Option<i32>,
    /// Right indent in twips.
    pub indent_right: Option<i32>,
    /// First-line indent in twips.
    pub first_line: Option<i32>,
    /// Hanging indent in twips (overrides `first_line`).
    pub hanging: Option<i32>,
    /// Space before in twips.
    pub spacing_before: Option<i32>,
    /// Space after in twips.
    pub spacing_after: Option<i32>,
    pub line_spacing: Option<LineSpacing>,
    pub keep_together: Option<bool>,
    pub keep_with_next: Option<bool>,
    pub page_break_before: Option<bool>,
    pub widow_control: Option<bool>,
    pub numbering: Option<NumberingRef>,
}

impl ParagraphProperties {
    /// Overlay every property set in `over` onto `self`.
    pub fn merge_from(&mut self, over: &ParagraphProperties) {
        fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if src.is_some() {
                dst.clone_from(src);
            }
        }
        take(&mut self.style_id, &over.style_id);
        take(&mut self.alignment, &over.alignment);
        take(&mut self.direction, &over.direction);
        take(&mut self.indent_left, &over.indent_left);
        take(&mut self.indent_right, &over.indent_right);
        take(&mut self.first_line, &over.first_line);
        take(&mut self.hanging, &over.hanging);
        take(&mut self.spacing_before, &over.spacing_before);
        take(&mut self.spacing_after, &over.spacing_after);
        take(&mut self.line_spacing, &over.line_spacing);
        take(&mut self.keep_together, &over.keep_together);
        take(&mut self.keep_with_next, &over.keep_with_next);
        take(&mut self.page_break_before, &over.page_break_before);
        take(&mut self.widow_control, &over.widow_control);
        take(&mut self.numbering, &over.numbering);
    }
}

/// Underline variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderlineStyle {
    None,
    Single,
    Double,
    Dotted,
    Wavy,
}

/// Vertical text position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlign {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

/// Run (character) properties; optional for layered merging.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RunProperties {
    pub style_id: Option<String>,
    pub font_family: Option<String>,
    /// Font size in half-points.
    pub size: Option<u32>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<UnderlineStyle>,
    pub strike: Option<bool>,
    /// `RRGGBB` hex color.
    pub color: Option<String>,
    pub highlight: Option<String>,
    /// Extra letter spacing in twips.
    pub letter_spacing: Option<i32>,
    pub caps: Option<bool>,
    pub small_caps: Option<bool>,
    pub vertical_align: Option<VerticalAlign>,
}

impl RunProperties {
    /// Overlay every property set in `over` onto `self`.
    pub fn merge_from(&mut self, over: &RunProperties) {
        fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if src.is_some() {
                dst.clone_from(src);
            }
        }
        take(&mut self.style_id, &over.style_id);
        take(&mut self.font_family, &over.font_family);
        take(&mut self.size, &over.size);
        take(&mut self.bold, &over.bold);
        take(&mut self.italic, &over.italic);
        take(&mut self.underline, &over.underline);
        take(&mut self.strike, &over.strike);
        take(&mut self.color, &over.color);
        take(&mut self.highlight, &over.highlight);
        take(&mut self.letter_spacing, &over.letter_spacing);
        take(&mut self.caps, &over.caps);
        take(&mut self.small_caps, &over.small_caps);
        take(&mut self.vertical_align, &over.vertical_align);
    }
}

/// Inline paragraph content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inline {
    Run(Run),
    Drawing(Drawing),
    Hyperlink(Hyperlink),
    LineBreak,
    Tab,
    Field(Field),
    FootnoteRef(NoteRef),
    EndnoteRef(NoteRef),
    Mention(Mention),
    Equation(Equation),
    Bookmark(Bookmark),
    ColumnBreak,
}

/// A run of uniformly formatted content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Run {
    pub properties: RunProperties,
    pub children: Vec<RunChild>,
}

impl Run {
    /// Run holding a single text leaf with no direct formatting.
    pub fn plain(text: &str) -> Self {
        Self {
            properties: RunProperties::default(),
            children: vec![RunChild::Text {
                text: text.to_string(),
            }],
        }
    }

    /// Run holding a single text leaf with direct formatting.
    pub fn styled(text: &str, properties: RunProperties) -> Self {
        Self {
            properties,
            ..Self::plain(text)
        }
    }

    /// Append the run's text (tabs as `\t`, breaks as `\n`).
    pub fn push_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                RunChild::Text { text } => out.push_str(text),
                RunChild::Tab => out.push('\t'),
                RunChild::Break => out.push('\n'),
            }
        }
    }
}

/// Leaf content of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunChild {
    Text { text: String },
    Tab,
    Break,
}

/// Hyperlink wrapping runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperlink {
    pub target: String,
    pub children: Vec<Run>,
}

/// Field kinds the engine evaluates itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Current page number.
    Page,
    /// Total page count.
    NumPages,
    /// Anything else; the cached result is shown.
    #[default]
    Other,
}

/// A field with its cached result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Field {
    pub kind: FieldKind,
    pub instruction: String,
    pub properties: RunProperties,
    /// Last computed result, shown for fields the engine does not evaluate.
    pub result: String,
}

/// Footnote/endnote reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteRef {
    pub id: String,
    pub properties: RunProperties,
}

/// A mention of a user or entity, shown as its label.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mention {
    pub label: String,
    pub properties: RunProperties,
}

/// Inline equation in linear form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Equation {
    pub text: String,
    pub properties: RunProperties,
}

/// Named position marker; takes no space.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bookmark {
    pub name: String,
}

/// Size in EMU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extent {
    pub cx: i64,
    pub cy: i64,
}

/// Picture reference carried by a drawing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRef {
    pub uri: String,
    pub description: String,
}

/// Inline or floating picture.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Drawing {
    pub extent: Extent,
    pub placement: DrawingPlacement,
    /// Picture payload; drawings without one are skipped.
    pub image: Option<ImageRef>,
}

/// Where a drawing sits.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawingPlacement {
    #[default]
    Inline,
    Anchored(Anchor),
}

/// Horizontal anchor frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalRelative {
    Page,
    #[default]
    Margin,
    Column,
    Character,
}

/// Vertical anchor frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalRelative {
    Page,
    Margin,
    #[default]
    Paragraph,
    Line,
}

/// Horizontal alignment inside the anchor frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
    Inside,
    Outside,
}

/// Vertical alignment inside the anchor frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlignment {
    Top,
    Center,
    Bottom,
    Inside,
    Outside,
}

/// Horizontal anchor: explicit offset (EMU) or alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizontalPosition {
    pub relative_from: HorizontalRelative,
    pub align: Option<HorizontalAlign>,
    pub offset: i64,
}

/// Vertical anchor: explicit offset (EMU) or alignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerticalPosition {
    pub relative_from: VerticalRelative,
    pub align: Option<VerticalAlignment>,
    pub offset: i64,
}

/// Text wrapping around a floating object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    /// In front of / behind text; no exclusion.
    None,
    #[default]
    Square,
    Tight,
    Through,
    TopAndBottom,
}

/// Which side text may flow on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapSide {
    #[default]
    Both,
    Left,
    Right,
    Largest,
}

/// Distance kept between text and the float (EMU).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapDistance {
    pub top: i64,
    pub bottom: i64,
    pub left: i64,
    pub right: i64,
}

/// Floating placement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Anchor {
    pub horizontal: HorizontalPosition,
    pub vertical: VerticalPosition,
    pub wrap: WrapMode,
    pub wrap_side: WrapSide,
    pub distance: WrapDistance,
}

/// Preferred table width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableWidth {
    #[default]
    Auto,
    /// Fixed width in twips.
    Fixed { value: i32 },
    /// Percentage of the available width in fiftieths of a percent.
    Pct { value: i32 },
}

/// Default cell padding (twips).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellMargins {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl Default for CellMargins {
    fn default() -> Self {
        Self {
            top: 0,
            bottom: 0,
            left: 108,
            right: 108,
        }
    }
}

/// Table-level properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableProperties {
    pub style_id: Option<String>,
    pub width: TableWidth,
    /// Column widths in twips.
    pub grid: Vec<i32>,
    pub cell_margins: CellMargins,
    /// Left indent of the table in twips.
    pub indent: i32,
}

/// Row height rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightRule {
    #[default]
    Auto,
    AtLeast,
    Exact,
}

/// Explicit row height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowHeight {
    pub rule: HeightRule,
    /// Height in twips.
    pub value: i32,
}

/// Vertical merge marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalMerge {
    Restart,
    Continue,
}

/// Vertical alignment of cell content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellVerticalAlignment {
    #[default]
    Top,
    Center,
    Bottom,
}

/// A table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Table {
    pub stamp: NodeStamp,
    pub properties: TableProperties,
    pub rows: Vec<TableRow>,
}

/// A table row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRow {
    pub height: Option<RowHeight>,
    /// Repeat this row at the top of each page the table continues on.
    pub header: bool,
    pub cells: Vec<TableCell>,
}

/// A table cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableCell {
    /// Number of grid columns spanned.
    pub grid_span: u32,
    pub vertical_merge: Option<VerticalMerge>,
    pub vertical_alignment: CellVerticalAlignment,
    pub blocks: Vec<Block>,
}

impl Default for TableCell {
    fn default() -> Self {
        Self {
            grid_span: 1,
            vertical_merge: None,
            vertical_alignment: CellVerticalAlignment::Top,
            blocks: Vec::new(),
        }
    }
}

impl TableCell {
    /// Cell holding one plain paragraph.
    pub fn with_text(text: &str) -> Self {
        Self {
            blocks: vec![Block::Paragraph(Paragraph::from_text(NodeStamp::default(), text))],
            ..Self::default()
        }
    }
}

/// A fixed-size text box.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shape {
    pub stamp: NodeStamp,
    pub extent: Extent,
    pub blocks: Vec<Block>,
}

/// Header or footer part.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFooter {
    pub stamp: NodeStamp,
    pub blocks: Vec<Block>,
}

/// Footnote or endnote body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Note {
    pub stamp: NodeStamp,
    pub blocks: Vec<Block>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_swaps_page_dimensions() {
        let props = SectionProperties {
            orientation: Orientation::Landscape,
            ..SectionProperties::default()
        };
        assert_eq!(props.page_size(), (15_840, 12_240));
    }

    #[test]
    fn json_document_gets_unique_stamps() {
        let json = r#"{
            "body": { "sections": [ { "blocks": [
                { "type": "paragraph", "children": [ { "type": "run", "children": [ { "type": "text", "text": "one" } ] } ] },
                { "type": "paragraph", "stamp": { "id": 7, "generation": 2 } },
                { "type": "page_break" }
            ] } ] }
        }"#;
        let doc = Document::from_json_str(json).expect("document should parse");
        let blocks = &doc.body.sections[0].blocks;
        let first = blocks[0].stamp().expect("paragraph stamp");
        let second = blocks[1].stamp().expect("paragraph stamp");
        assert!(first.is_stamped());
        assert_eq!(second, NodeStamp::new(7, 2));
        assert_ne!(first.id, second.id);
        assert_eq!(blocks[2].stamp(), None);
    }

    #[test]
    fn zero_grid_span_is_rejected() {
        let mut cell = TableCell::with_text("x");
        cell.grid_span = 0;
        let doc = Document::from_blocks(
            SectionProperties::default(),
            vec![Block::Table(Table {
                rows: vec![TableRow {
                    cells: vec![cell],
                    ..TableRow::default()
                }],
                ..Table::default()
            })],
        );
        let err = doc.validate().expect_err("zero span must be invalid");
        assert!(err.to_string().contains("grid_span"));
    }

    #[test]
    fn plain_text_includes_hyperlink_runs() {
        let para = Paragraph {
            children: vec![
                Inline::Run(Run::plain("see ")),
                Inline::Hyperlink(Hyperlink {
                    target: "https://example.com".to_string(),
                    children: vec![Run::plain("here")],
                }),
                Inline::LineBreak,
            ],
            ..Paragraph::default()
        };
        assert_eq!(para.plain_text(), "see here");
    }
}
