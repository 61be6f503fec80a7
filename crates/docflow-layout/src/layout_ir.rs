use docflow::{ImageRef, NodeStamp, WrapMode, WrapSide};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

use crate::style::ResolvedRunStyle;

/// Child indices from a region root down to a node.
///
/// Body paths start at `[section, block, ..]`; header, footer and note paths
/// start at the block index inside their part.
pub type NodePath = SmallVec<[u32; 6]>;

/// Axis-aligned rectangle in page pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Whether the point lies inside (edges inclusive).
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// Whether the two rectangles share any area.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Squared distance from the point to the nearest edge (0 inside).
    pub fn distance_sq(&self, x: f32, y: f32) -> f32 {
        let dx = (self.x - x).max(0.0).max(x - self.right());
        let dy = (self.y - y).max(0.0).max(y - self.bottom());
        dx * dx + dy * dy
    }

    pub fn translated(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

/// Which story a source reference points into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRegion {
    #[default]
    Body,
    Header,
    Footer,
    Footnote,
    Endnote,
}

/// Back-reference from a fragment to the characters it shows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub region: SourceRegion,
    /// Path to the run (or inline) the characters come from.
    pub path: NodePath,
    /// Character offset inside the run text.
    pub offset: usize,
    /// Number of source characters covered.
    pub len: usize,
}

/// What a fragment draws.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    #[default]
    Text,
    Space,
    Tab,
    /// Forced line break; zero width.
    Break,
    Image,
    /// List marker; has no source characters.
    Marker,
    /// Evaluated field result.
    Field,
    /// Footnote or endnote reference mark.
    NoteRef,
}

/// A styled substring placed on the page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutFragment {
    /// Display text (hyphen appended when a word was broken; soft hyphens removed).
    pub text: String,
    pub rect: Rect,
    pub kind: FragmentKind,
    pub style: Arc<ResolvedRunStyle>,
    pub source: SourceRef,
    /// Bidi embedding level; odd levels draw right-to-left.
    pub bidi_level: u8,
    pub hyperlink: Option<String>,
    /// Picture payload for inline images.
    pub image: Option<ImageRef>,
}

/// One line of a paragraph, fragments in visual order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutLine {
    pub rect: Rect,
    /// Baseline offset from `rect.y`.
    pub baseline: f32,
    pub fragments: Vec<LayoutFragment>,
    /// Line ended in a forced break.
    pub hard_break: bool,
    /// Footnote ids referenced from this line.
    pub footnote_refs: Vec<String>,
}

impl LayoutLine {
    /// Total source characters on the line.
    pub fn source_len(&self) -> usize {
        self.fragments.iter().map(|f| f.source.len).sum()
    }
}

/// A laid-out paragraph (or the part of it placed on one page).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutParagraph {
    pub region: SourceRegion,
    /// Header/footer/note id for non-body regions.
    pub part_id: Option<String>,
    pub path: NodePath,
    pub stamp: NodeStamp,
    pub rect: Rect,
    pub lines: Vec<LayoutLine>,
    /// Index of the first line relative to the whole paragraph.
    pub first_line: usize,
    /// More lines follow on a later page.
    pub continues: bool,
}

/// A placed table cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutTableCell {
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
    /// Border box.
    pub rect: Rect,
    /// Box inside the cell padding.
    pub content_rect: Rect,
    pub blocks: Vec<LayoutBlock>,
}

/// A placed table row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutTableRow {
    /// Row index in the source table.
    pub index: usize,
    pub rect: Rect,
    /// Cells whose top-left slot lies in this row.
    pub cells: Vec<LayoutTableCell>,
    /// Header row repeated on a continuation page.
    pub repeated: bool,
}

/// A laid-out table (or the rows of it placed on one page).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutTable {
    pub region: SourceRegion,
    pub path: NodePath,
    pub stamp: NodeStamp,
    pub rect: Rect,
    pub column_widths: Vec<f32>,
    pub rows: Vec<LayoutTableRow>,
    pub continues: bool,
}

/// A fixed-size text box.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutShape {
    pub region: SourceRegion,
    pub path: NodePath,
    pub stamp: NodeStamp,
    pub rect: Rect,
    pub blocks: Vec<LayoutBlock>,
}

/// Block-level layout output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayoutBlock {
    Paragraph(LayoutParagraph),
    Table(LayoutTable),
    Shape(LayoutShape),
}

impl LayoutBlock {
    pub fn rect(&self) -> Rect {
        match self {
            Self::Paragraph(p) => p.rect,
            Self::Table(t) => t.rect,
            Self::Shape(s) => s.rect,
        }
    }

    /// Move the block and everything inside it.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        match self {
            Self::Paragraph(p) => {
                p.rect = p.rect.translated(dx, dy);
                for line in &mut p.lines {
                    translate_line(line, dx, dy);
                }
            }
            Self::Table(t) => {
                t.rect = t.rect.translated(dx, dy);
                for row in &mut t.rows {
                    row.rect = row.rect.translated(dx, dy);
                    for cell in &mut row.cells {
                        cell.rect = cell.rect.translated(dx, dy);
                        cell.content_rect = cell.content_rect.translated(dx, dy);
                        for block in &mut cell.blocks {
                            block.translate(dx, dy);
                        }
                    }
                }
            }
            Self::Shape(s) => {
                s.rect = s.rect.translated(dx, dy);
                for block in &mut s.blocks {
                    block.translate(dx, dy);
                }
            }
        }
    }

    /// Visit every paragraph in the block, depth first.
    pub fn for_each_paragraph<'a>(&'a self, f: &mut dyn FnMut(&'a LayoutParagraph)) {
        match self {
            Self::Paragraph(p) => f(p),
            Self::Table(t) => {
                for row in &t.rows {
                    for cell in &row.cells {
                        for block in &cell.blocks {
                            block.for_each_paragraph(f);
                        }
                    }
                }
            }
            Self::Shape(s) => {
                for block in &s.blocks {
                    block.for_each_paragraph(f);
                }
            }
        }
    }
}

pub(crate) fn translate_line(line: &mut LayoutLine, dx: f32, dy: f32) {
    line.rect = line.rect.translated(dx, dy);
    for frag in &mut line.fragments {
        frag.rect = frag.rect.translated(dx, dy);
    }
}

/// A floating picture after anchor resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionedFloat {
    /// Path of the drawing inline.
    pub path: NodePath,
    pub rect: Rect,
    pub wrap: WrapMode,
    pub wrap_side: WrapSide,
    /// Text distance (left, top, right, bottom) in pixels.
    pub distance: [f32; 4],
    pub image: ImageRef,
}

impl PositionedFloat {
    /// Rectangle grown by the wrap distance.
    pub fn exclusion_rect(&self) -> Rect {
        let [l, t, r, b] = self.distance;
        Rect::new(
            self.rect.x - l,
            self.rect.y - t,
            self.rect.width + l + r,
            self.rect.height + t + b,
        )
    }
}

/// Header or footer placed on a page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutRegion {
    pub part_id: String,
    pub rect: Rect,
    pub blocks: Vec<LayoutBlock>,
}

/// One footnote body on a page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutNote {
    pub note_id: String,
    /// Displayed reference mark.
    pub label: String,
    pub rect: Rect,
    pub blocks: Vec<LayoutBlock>,
}

/// Footnote area at the bottom of the page content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutFootnoteArea {
    pub rect: Rect,
    /// Separator rule above the notes.
    pub separator: Rect,
    pub notes: Vec<LayoutNote>,
}

/// One output page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutPage {
    /// 0-based page index.
    pub index: usize,
    /// Section that produced this page.
    pub section: usize,
    pub page_rect: Rect,
    /// Body content box (below the header, above the footer).
    pub content_area: Rect,
    pub blocks: Vec<LayoutBlock>,
    pub floats: Vec<PositionedFloat>,
    pub header: Option<LayoutRegion>,
    pub footer: Option<LayoutRegion>,
    pub footnotes: Option<LayoutFootnoteArea>,
    /// Column rectangles for multi-column sections; empty for one column.
    pub columns: Vec<Rect>,
    /// Draw rules between columns.
    pub column_separator: bool,
}

impl LayoutPage {
    /// 1-based page number shown by `PAGE` fields.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// Every body paragraph on the page, tables and shapes included.
    pub fn paragraphs(&self) -> Vec<&LayoutParagraph> {
        let mut out = Vec::new();
        for block in &self.blocks {
            block.for_each_paragraph(&mut |p| out.push(p));
        }
        out
    }
}

/// Output of one layout pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutResult {
    pub pages: Vec<LayoutPage>,
    /// Increases with every pass of the producing engine.
    pub version: u64,
}

impl LayoutResult {
    /// Serialize the page model as JSON.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_zero_inside_and_grows_outside() {
        let r = Rect::new(10.0, 10.0, 20.0, 10.0);
        assert_eq!(r.distance_sq(15.0, 15.0), 0.0);
        assert_eq!(r.distance_sq(33.0, 24.0), 9.0 + 16.0);
        assert!(r.contains(30.0, 20.0));
        assert!(!r.intersects(&Rect::new(30.0, 10.0, 5.0, 5.0)));
    }

    #[test]
    fn exclusion_rect_adds_wrap_distance() {
        let float = PositionedFloat {
            path: NodePath::new(),
            rect: Rect::new(100.0, 50.0, 40.0, 40.0),
            wrap: WrapMode::Square,
            wrap_side: WrapSide::Both,
            distance: [4.0, 2.0, 6.0, 8.0],
            image: ImageRef::default(),
        };
        assert_eq!(
            float.exclusion_rect(),
            Rect::new(96.0, 48.0, 50.0, 50.0)
        );
    }
}
