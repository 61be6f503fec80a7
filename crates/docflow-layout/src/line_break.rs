//! Paragraph line breaking.
//!
//! Inline children are expanded into [`MeasuredWord`]s, filled into lines
//! (greedy with hyphenation, or Knuth–Plass for justified text), reordered
//! for bidi and placed horizontally per alignment.

use docflow::units::emu_to_px;
use docflow::{
    Alignment, DrawingPlacement, FieldKind, ImageRef, Inline, Paragraph, Run, RunChild,
    RunProperties, VerticalAlign,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::bidi::{self, Direction};
use crate::config::LayoutConfig;
use crate::float_layout::line_exclusion;
use crate::hyphenation::{hyphenated_head, hyphenation_points, strip_soft_hyphens};
use crate::knuth_plass::{knuth_plass_break, Item, KnuthPlassParams};
use crate::layout_ir::{
    FragmentKind, LayoutFragment, LayoutLine, NodePath, PositionedFloat, Rect, SourceRef,
    SourceRegion,
};
use crate::metrics::Measurer;
use crate::style::{ResolvedParagraphStyle, ResolvedRunStyle, StyleResolver};

const FIT_EPSILON: f32 = 0.01;
const MAX_BLOCKED_STEPS: usize = 256;
/// Lines narrower than this beside a float move below it.
const MIN_LINE_WIDTH_PX: f32 = 24.0;
const SUPERSCRIPT_RISE: f32 = 0.33;
const SUBSCRIPT_DROP: f32 = 0.15;

/// A word, whitespace run, tab, atom or forced break with its measured width.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasuredWord {
    /// Source text; soft hyphens included.
    pub text: String,
    pub width: f32,
    pub kind: FragmentKind,
    pub style: Arc<ResolvedRunStyle>,
    pub source: SourceRef,
    pub hyperlink: Option<String>,
    /// Words expanded from the same run share this id.
    pub run_id: u32,
    pub image: Option<ImageRef>,
    /// Height of an inline image; zero otherwise.
    pub height: f32,
    /// Footnote referenced by a note mark.
    pub footnote: Option<String>,
}

/// Values substituted for `PAGE` and `NUMPAGES` fields. `None` shows the
/// field's cached result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldValues {
    pub page: Option<usize>,
    pub num_pages: Option<usize>,
}

/// Display labels of note reference marks, by note id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoteLabels {
    pub footnotes: HashMap<String, String>,
    pub endnotes: HashMap<String, String>,
}

/// Where a paragraph's inline content comes from.
#[derive(Clone, Copy, Debug)]
pub struct InlineContext<'a> {
    pub region: SourceRegion,
    /// Path of the paragraph itself.
    pub path: &'a [u32],
    pub paragraph_style: Option<&'a str>,
    pub fields: FieldValues,
    pub note_labels: &'a NoteLabels,
}

/// List marker drawn in the first line's hanging indent.
#[derive(Clone, Debug, PartialEq)]
pub struct ListMarker {
    pub text: String,
    pub style: Arc<ResolvedRunStyle>,
}

/// Horizontal band and start position a paragraph is laid out into.
#[derive(Clone, Copy, Debug)]
pub struct ParagraphFrame<'a> {
    pub x: f32,
    /// Top of the first line.
    pub y: f32,
    pub width: f32,
    /// Floats whose exclusions narrow lines.
    pub floats: &'a [PositionedFloat],
}

struct RunContext {
    style: Arc<ResolvedRunStyle>,
    path: NodePath,
    hyperlink: Option<String>,
    run_id: u32,
}

/// Expand a paragraph's inline children into measured words.
///
/// Anchored drawings are skipped; floats are positioned separately.
pub fn collect_words(
    paragraph: &Paragraph,
    ctx: &InlineContext<'_>,
    resolver: &mut StyleResolver<'_>,
    measurer: &mut Measurer<'_>,
) -> Vec<MeasuredWord> {
    let mut out = Vec::new();
    let mut run_id = 0u32;
    for (idx, inline) in paragraph.children.iter().enumerate() {
        let mut path: NodePath = ctx.path.iter().copied().collect();
        path.push(idx as u32);
        run_id += 1;
        match inline {
            Inline::Run(run) => {
                let rc = RunContext {
                    style: resolver.resolve_run(ctx.paragraph_style, &run.properties),
                    path,
                    hyperlink: None,
                    run_id,
                };
                expand_run(run, &rc, ctx.region, measurer, &mut out);
            }
            Inline::Hyperlink(link) => {
                for (ri, run) in link.children.iter().enumerate() {
                    let mut run_path = path.clone();
                    run_path.push(ri as u32);
                    run_id += 1;
                    let rc = RunContext {
                        style: resolver.resolve_run(ctx.paragraph_style, &run.properties),
                        path: run_path,
                        hyperlink: Some(link.target.clone()),
                        run_id,
                    };
                    expand_run(run, &rc, ctx.region, measurer, &mut out);
                }
            }
            Inline::Drawing(drawing) => {
                if !matches!(drawing.placement, DrawingPlacement::Inline) {
                    continue;
                }
                let Some(image) = drawing.image.clone() else {
                    log::debug!("inline drawing at {:?} has no picture; skipped", path);
                    continue;
                };
                out.push(MeasuredWord {
                    text: String::new(),
                    width: emu_to_px(drawing.extent.cx).max(0.0),
                    kind: FragmentKind::Image,
                    style: resolver.resolve_run(ctx.paragraph_style, &RunProperties::default()),
                    source: SourceRef {
                        region: ctx.region,
                        path,
                        offset: 0,
                        len: 0,
                    },
                    hyperlink: None,
                    run_id,
                    image: Some(image),
                    height: emu_to_px(drawing.extent.cy).max(0.0),
                    footnote: None,
                });
            }
            Inline::LineBreak | Inline::ColumnBreak | Inline::Tab => {
                let (kind, text) = if matches!(inline, Inline::Tab) {
                    (FragmentKind::Tab, "\t")
                } else {
                    (FragmentKind::Break, "\n")
                };
                let rc = RunContext {
                    style: resolver.resolve_run(ctx.paragraph_style, &RunProperties::default()),
                    path,
                    hyperlink: None,
                    run_id,
                };
                push_word(&mut out, measurer, &rc, ctx.region, kind, text, 0, 0);
            }
            Inline::Field(field) => {
                let value = match field.kind {
                    FieldKind::Page => ctx.fields.page,
                    FieldKind::NumPages => ctx.fields.num_pages,
                    FieldKind::Other => None,
                };
                let text = value.map_or_else(|| field.result.clone(), |v| v.to_string());
                if text.is_empty() {
                    continue;
                }
                let rc = RunContext {
                    style: resolver.resolve_run(ctx.paragraph_style, &field.properties),
                    path,
                    hyperlink: None,
                    run_id,
                };
                push_word(&mut out, measurer, &rc, ctx.region, FragmentKind::Field, &text, 0, 0);
            }
            Inline::FootnoteRef(note) | Inline::EndnoteRef(note) => {
                let footnote = matches!(inline, Inline::FootnoteRef(_));
                let labels = if footnote {
                    &ctx.note_labels.footnotes
                } else {
                    &ctx.note_labels.endnotes
                };
                let label = labels.get(&note.id).cloned().unwrap_or_else(|| note.id.clone());
                let mut props = note.properties.clone();
                if props.vertical_align.is_none() {
                    props.vertical_align = Some(VerticalAlign::Superscript);
                }
                let rc = RunContext {
                    style: resolver.resolve_run(ctx.paragraph_style, &props),
                    path,
                    hyperlink: None,
                    run_id,
                };
                push_word(&mut out, measurer, &rc, ctx.region, FragmentKind::NoteRef, &label, 0, 0);
                if footnote {
                    if let Some(word) = out.last_mut() {
                        word.footnote = Some(note.id.clone());
                    }
                }
            }
            Inline::Mention(mention) => {
                let rc = RunContext {
                    style: resolver.resolve_run(ctx.paragraph_style, &mention.properties),
                    path,
                    hyperlink: None,
                    run_id,
                };
                push_word(&mut out, measurer, &rc, ctx.region, FragmentKind::Text, &mention.label, 0, 0);
            }
            Inline::Equation(equation) => {
                let rc = RunContext {
                    style: resolver.resolve_run(ctx.paragraph_style, &equation.properties),
                    path,
                    hyperlink: None,
                    run_id,
                };
                push_word(&mut out, measurer, &rc, ctx.region, FragmentKind::Text, &equation.text, 0, 0);
            }
            Inline::Bookmark(_) => {}
        }
    }
    out
}

fn expand_run(
    run: &Run,
    rc: &RunContext,
    region: SourceRegion,
    measurer: &mut Measurer<'_>,
    out: &mut Vec<MeasuredWord>,
) {
    let mut offset = 0usize;
    for child in &run.children {
        match child {
            RunChild::Text { text } => {
                split_text(text, offset, rc, region, measurer, out);
                offset += text.chars().count();
            }
            RunChild::Tab => {
                push_word(out, measurer, rc, region, FragmentKind::Tab, "\t", offset, 1);
                offset += 1;
            }
            RunChild::Break => {
                push_word(out, measurer, rc, region, FragmentKind::Break, "\n", offset, 1);
                offset += 1;
            }
        }
    }
}

fn is_breaking_space(ch: char) -> bool {
    ch.is_whitespace() && !matches!(ch, '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\n' | '\t')
}

fn char_kind(ch: char) -> FragmentKind {
    match ch {
        '\n' => FragmentKind::Break,
        '\t' => FragmentKind::Tab,
        c if is_breaking_space(c) => FragmentKind::Space,
        _ => FragmentKind::Text,
    }
}

fn split_text(
    text: &str,
    base: usize,
    rc: &RunContext,
    region: SourceRegion,
    measurer: &mut Measurer<'_>,
    out: &mut Vec<MeasuredWord>,
) {
    let mut current = String::new();
    let mut current_kind = FragmentKind::Text;
    let mut start = 0usize;
    for (idx, ch) in text.chars().enumerate() {
        let kind = char_kind(ch);
        let groups = matches!(kind, FragmentKind::Text | FragmentKind::Space);
        if !current.is_empty() && (kind != current_kind || !groups) {
            let len = current.chars().count();
            push_word(out, measurer, rc, region, current_kind, &current, base + start, len);
            current.clear();
        }
        if current.is_empty() {
            start = idx;
            current_kind = kind;
        }
        current.push(ch);
        if !groups {
            push_word(out, measurer, rc, region, kind, &current, base + start, 1);
            current.clear();
        }
    }
    if !current.is_empty() {
        let len = current.chars().count();
        push_word(out, measurer, rc, region, current_kind, &current, base + start, len);
    }
}

#[allow(clippy::too_many_arguments)]
fn push_word(
    out: &mut Vec<MeasuredWord>,
    measurer: &mut Measurer<'_>,
    rc: &RunContext,
    region: SourceRegion,
    kind: FragmentKind,
    text: &str,
    offset: usize,
    len: usize,
) {
    let width = match kind {
        FragmentKind::Break | FragmentKind::Tab => 0.0,
        _ => measurer.width(&strip_soft_hyphens(text), &rc.style),
    };
    out.push(MeasuredWord {
        text: text.to_string(),
        width,
        kind,
        style: Arc::clone(&rc.style),
        source: SourceRef {
            region,
            path: rc.path.clone(),
            offset,
            len,
        },
        hyperlink: rc.hyperlink.clone(),
        run_id: rc.run_id,
        image: None,
        height: 0.0,
        footnote: None,
    });
}

/// Position inside the word list: word index plus char offset of an
/// unplaced remainder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
struct WordCursor {
    word: usize,
    offset: usize,
}

impl WordCursor {
    fn next_word(self) -> Self {
        Self {
            word: self.word + 1,
            offset: 0,
        }
    }
}

#[derive(Clone, Debug)]
struct Piece {
    word: usize,
    /// Char range inside the word's text.
    start: usize,
    end: usize,
    text: String,
    width: f32,
}

/// Horizontal geometry of one line.
#[derive(Clone, Copy, Debug)]
struct LineBox {
    y: f32,
    left: f32,
    right: f32,
    /// Where text starts (after a list marker).
    text_x: f32,
}

struct Unit {
    kind: FragmentKind,
    text: String,
    width: f32,
    style: Arc<ResolvedRunStyle>,
    source: SourceRef,
    hyperlink: Option<String>,
    run_id: u32,
    image: Option<ImageRef>,
    height: f32,
    footnote: Option<String>,
    level: u8,
    trailing: bool,
    /// Display text maps one-to-one onto source chars.
    plain: bool,
}

fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let mut indices = text.char_indices().map(|(i, _)| i).chain(core::iter::once(text.len()));
    let from = indices.clone().nth(start).unwrap_or(text.len());
    let to = indices.nth(end).unwrap_or(text.len());
    &text[from..to.max(from)]
}

/// Break measured words into positioned lines.
pub fn break_lines(
    words: &[MeasuredWord],
    style: &ResolvedParagraphStyle,
    marker: Option<&ListMarker>,
    frame: &ParagraphFrame<'_>,
    cfg: &LayoutConfig,
    measurer: &mut Measurer<'_>,
) -> Vec<LayoutLine> {
    let text: String = words.iter().map(|w| w.text.as_str()).collect();
    let mut builder = LineBuilder {
        words,
        style,
        marker,
        frame,
        cfg,
        measurer,
        base: Direction::from_paragraph(style.direction, &text),
    };
    let optimal = style.alignment == Alignment::Justify
        && cfg.typography.justification.optimal
        && frame.floats.is_empty()
        && !words
            .iter()
            .any(|w| matches!(w.kind, FragmentKind::Break | FragmentKind::Tab));
    if optimal {
        if let Some(lines) = builder.optimal_lines() {
            return lines;
        }
        log::debug!("no feasible optimal breaks; falling back to greedy fill");
    }
    builder.greedy_lines()
}

struct LineBuilder<'w, 'm, 'c> {
    words: &'w [MeasuredWord],
    style: &'w ResolvedParagraphStyle,
    marker: Option<&'w ListMarker>,
    frame: &'w ParagraphFrame<'w>,
    cfg: &'w LayoutConfig,
    measurer: &'m mut Measurer<'c>,
    base: Direction,
}

impl LineBuilder<'_, '_, '_> {
    fn content_right(&self) -> f32 {
        self.frame.x + self.frame.width - self.style.indent_right
    }

    fn line_start(&self, first: bool) -> f32 {
        let first_line = if first { self.style.first_line } else { 0.0 };
        self.frame.x + self.style.indent_left + first_line
    }

    fn default_line_height(&self) -> f32 {
        let natural = self.measurer.font_metrics(&self.style.run).line_height;
        self.style.line_height.apply(natural)
    }

    /// Text start on the first line once the marker has been placed at `left`.
    fn text_start(&mut self, left: f32, first: bool) -> f32 {
        let Some(marker) = self.marker.filter(|_| first) else {
            return left;
        };
        let marker_end = left + self.measurer.width(&marker.text, &marker.style);
        let after_marker = marker_end + self.cfg.list_marker_gap_px;
        if self.style.first_line < 0.0 {
            after_marker.max(self.frame.x + self.style.indent_left)
        } else {
            after_marker
        }
    }

    /// Narrow the line for floats, moving it down while it is blocked.
    fn line_box(&mut self, y: f32, first: bool) -> LineBox {
        let base_left = self.line_start(first);
        let right = self.content_right();
        let height = self.default_line_height();
        let mut y = y;
        if !self.frame.floats.is_empty() {
            for _ in 0..MAX_BLOCKED_STEPS {
                let ex = line_exclusion(self.frame.floats, y, height, base_left, right);
                if let Some(bottom) = ex.blocked_until.filter(|b| *b > y) {
                    y = bottom;
                    continue;
                }
                if ex.right - ex.left >= MIN_LINE_WIDTH_PX.min(right - base_left) {
                    let text_x = self.text_start(ex.left, first);
                    return LineBox {
                        y,
                        left: ex.left,
                        right: ex.right,
                        text_x,
                    };
                }
                y += height.max(1.0);
            }
        }
        let text_x = self.text_start(base_left, first);
        LineBox {
            y,
            left: base_left,
            right,
            text_x,
        }
    }

    fn greedy_lines(&mut self) -> Vec<LayoutLine> {
        let words = self.words;
        let mut lines = Vec::new();
        let mut cursor = WordCursor::default();
        let mut y = self.frame.y;
        loop {
            let first = lines.is_empty();
            let line_box = self.line_box(y, first);
            let (mut pieces, mut next, hard_break) = self.fill_line(cursor, &line_box);
            if pieces.is_empty() && next == cursor && cursor.word < words.len() {
                // Nothing fit; place the word whole.
                pieces.push(self.whole_piece(cursor));
                next = cursor.next_word();
            }
            let last = next.word >= words.len();
            let line = self.assemble_line(pieces, &line_box, first, last, hard_break);
            y = line.rect.bottom();
            lines.push(line);
            cursor = next;
            if last {
                break;
            }
        }
        lines
    }

    fn whole_piece(&mut self, cursor: WordCursor) -> Piece {
        let word = &self.words[cursor.word];
        let len = word.source.len.max(word.text.chars().count());
        let (text, width) = if cursor.offset == 0 {
            let text = match word.kind {
                FragmentKind::Text => strip_soft_hyphens(&word.text),
                _ => word.text.clone(),
            };
            (text, word.width)
        } else {
            let text = strip_soft_hyphens(char_slice(&word.text, cursor.offset, len));
            let width = self.measurer.width(&text, &word.style);
            (text, width)
        };
        Piece {
            word: cursor.word,
            start: cursor.offset,
            end: len,
            text,
            width,
        }
    }

    fn tab_width(&self, x: f32) -> f32 {
        let stop = self.cfg.default_tab_stop_px.max(1.0);
        let rel = x - self.frame.x;
        ((rel / stop).floor() + 1.0) * stop - rel
    }

    /// Fill one line from `cursor`; returns the pieces, the remainder cursor
    /// and whether the line ended in a forced break.
    fn fill_line(&mut self, cursor: WordCursor, line_box: &LineBox) -> (Vec<Piece>, WordCursor, bool) {
        let words = self.words;
        let available = line_box.right - line_box.text_x;
        let mut pieces: Vec<Piece> = Vec::new();
        let mut width = 0.0f32;
        let mut has_content = false;
        let mut cur = cursor;
        while cur.word < words.len() {
            let word = &words[cur.word];
            match word.kind {
                FragmentKind::Break => {
                    pieces.push(self.whole_piece(cur));
                    return (pieces, cur.next_word(), true);
                }
                FragmentKind::Space => {
                    let piece = self.whole_piece(cur);
                    width += piece.width;
                    pieces.push(piece);
                    cur = cur.next_word();
                }
                FragmentKind::Tab => {
                    let w = self.tab_width(line_box.text_x + width);
                    if has_content && width + w > available + FIT_EPSILON {
                        break;
                    }
                    let mut piece = self.whole_piece(cur);
                    piece.width = w;
                    width += w;
                    has_content = true;
                    pieces.push(piece);
                    cur = cur.next_word();
                }
                _ => {
                    let piece = self.whole_piece(cur);
                    if width + piece.width <= available + FIT_EPSILON {
                        width += piece.width;
                        has_content = true;
                        pieces.push(piece);
                        cur = cur.next_word();
                        continue;
                    }
                    if word.kind == FragmentKind::Text {
                        if let Some(head) = self.hyphenate(cur, available - width) {
                            let split = WordCursor {
                                word: cur.word,
                                offset: head.end,
                            };
                            pieces.push(head);
                            return (pieces, split, false);
                        }
                    }
                    if !has_content {
                        pieces.push(piece);
                        cur = cur.next_word();
                    }
                    break;
                }
            }
        }
        (pieces, cur, false)
    }

    /// Longest hyphenated head of the word at `cursor` fitting in `room`.
    fn hyphenate(&mut self, cursor: WordCursor, room: f32) -> Option<Piece> {
        let word = &self.words[cursor.word];
        let len = word.source.len.max(word.text.chars().count());
        let rest = char_slice(&word.text, cursor.offset, len);
        let points = hyphenation_points(rest, &self.cfg.typography.hyphenation);
        for &point in points.iter().rev() {
            let head = hyphenated_head(rest, point);
            let width = self.measurer.width(&head, &word.style);
            if width <= room + FIT_EPSILON {
                return Some(Piece {
                    word: cursor.word,
                    start: cursor.offset,
                    end: cursor.offset + point,
                    text: head,
                    width,
                });
            }
        }
        None
    }

    fn optimal_lines(&mut self) -> Option<Vec<LayoutLine>> {
        #[derive(Clone, Copy)]
        enum Origin {
            Word(usize),
            Split(usize, usize),
            End,
        }
        let words = self.words;
        let just = self.cfg.typography.justification;
        let mut items = Vec::with_capacity(words.len() + 2);
        let mut origins = Vec::with_capacity(words.len() + 2);
        for (i, word) in words.iter().enumerate() {
            match word.kind {
                FragmentKind::Space => {
                    let w = f64::from(word.width);
                    items.push(Item::glue(
                        w,
                        w * f64::from(just.space_stretch_ratio),
                        w * f64::from(just.space_shrink_ratio),
                    ));
                    origins.push(Origin::Word(i));
                }
                FragmentKind::Text => {
                    let points = hyphenation_points(&word.text, &self.cfg.typography.hyphenation);
                    if points.is_empty() {
                        items.push(Item::boxed(f64::from(word.width)));
                        origins.push(Origin::Word(i));
                        continue;
                    }
                    let hyphen = self.measurer.width("-", &word.style);
                    let mut prev = 0;
                    for &point in &points {
                        let seg = strip_soft_hyphens(char_slice(&word.text, prev, point));
                        items.push(Item::boxed(f64::from(self.measurer.width(&seg, &word.style))));
                        origins.push(Origin::Word(i));
                        items.push(Item::penalty(f64::from(hyphen), just.hyphen_penalty, true));
                        origins.push(Origin::Split(i, point));
                        prev = point;
                    }
                    let len = word.text.chars().count();
                    let seg = strip_soft_hyphens(char_slice(&word.text, prev, len));
                    items.push(Item::boxed(f64::from(self.measurer.width(&seg, &word.style))));
                    origins.push(Origin::Word(i));
                }
                _ => {
                    items.push(Item::boxed(f64::from(word.width)));
                    origins.push(Origin::Word(i));
                }
            }
        }
        items.push(Item::fill());
        origins.push(Origin::End);
        items.push(Item::forced_break());
        origins.push(Origin::End);

        let first_box = self.line_box(self.frame.y, true);
        let rest_left = self.line_start(false);
        let right = self.content_right();
        let widths = [
            f64::from(first_box.right - first_box.text_x),
            f64::from(right - rest_left),
        ];
        let params = KnuthPlassParams::from(&just);
        let breaks = knuth_plass_break(&items, &widths, &params)?;

        let mut lines = Vec::with_capacity(breaks.len());
        let mut from = WordCursor::default();
        let mut y = self.frame.y;
        let count = breaks.len();
        for (n, bp) in breaks.iter().enumerate() {
            let (to, split) = match origins.get(bp.position).copied().unwrap_or(Origin::End) {
                Origin::Word(i) => (WordCursor { word: i + 1, offset: 0 }, false),
                Origin::Split(i, offset) => (WordCursor { word: i, offset }, true),
                Origin::End => (
                    WordCursor {
                        word: words.len(),
                        offset: 0,
                    },
                    false,
                ),
            };
            let pieces = self.pieces_between(from, to, split);
            let first = n == 0;
            let line_box = if first {
                LineBox { y, ..first_box }
            } else {
                LineBox {
                    y,
                    left: rest_left,
                    right,
                    text_x: rest_left,
                }
            };
            let last = n + 1 == count || to.word >= words.len();
            let line = self.assemble_line(pieces, &line_box, first, last, false);
            y = line.rect.bottom();
            lines.push(line);
            from = to;
            if from.word >= words.len() {
                break;
            }
        }
        if lines.is_empty() {
            return None;
        }
        Some(lines)
    }

    fn pieces_between(&mut self, from: WordCursor, to: WordCursor, split: bool) -> Vec<Piece> {
        let mut pieces = Vec::new();
        let mut cur = from;
        while cur.word < to.word && cur.word < self.words.len() {
            pieces.push(self.whole_piece(cur));
            cur = cur.next_word();
        }
        if split && to.word < self.words.len() {
            let word = &self.words[to.word];
            let start = if from.word == to.word { from.offset } else { 0 };
            let len = word.text.chars().count();
            let head = hyphenated_head(char_slice(&word.text, start, len), to.offset - start);
            let width = self.measurer.width(&head, &word.style);
            pieces.push(Piece {
                word: to.word,
                start,
                end: to.offset,
                text: head,
                width,
            });
        }
        pieces
    }

    fn units(&mut self, pieces: Vec<Piece>) -> Vec<Unit> {
        let words = self.words;
        let mut units: Vec<Unit> = pieces
            .into_iter()
            .map(|p| {
                let word = &words[p.word];
                let plain = p.text.chars().count() == p.end - p.start;
                Unit {
                    kind: word.kind,
                    width: p.width,
                    style: Arc::clone(&word.style),
                    source: SourceRef {
                        offset: word.source.offset + p.start,
                        len: if word.source.len == 0 { 0 } else { p.end - p.start },
                        ..word.source.clone()
                    },
                    hyperlink: word.hyperlink.clone(),
                    run_id: word.run_id,
                    image: word.image.clone(),
                    height: word.height,
                    footnote: word.footnote.clone(),
                    level: self.base.level(),
                    trailing: false,
                    plain: plain && word.source.len > 0,
                    text: p.text,
                }
            })
            .collect();
        for unit in units.iter_mut().rev() {
            if !matches!(unit.kind, FragmentKind::Space | FragmentKind::Break) {
                break;
            }
            unit.trailing = true;
            unit.width = 0.0;
        }
        units
    }

    /// Assign bidi levels, splitting plain text units at level changes.
    fn apply_bidi(&mut self, units: Vec<Unit>) -> Vec<Unit> {
        let needs = self.base == Direction::Rtl || units.iter().any(|u| bidi::contains_rtl(&u.text));
        if !needs {
            return units;
        }
        let mut line_text = String::new();
        let mut spans = Vec::with_capacity(units.len());
        for unit in &units {
            let start = line_text.chars().count();
            if unit.text.is_empty() {
                line_text.push('\u{FFFC}');
            } else {
                line_text.push_str(&unit.text);
            }
            spans.push((start, line_text.chars().count()));
        }
        let levels = bidi::resolve_levels(&line_text, self.base);
        let mut out = Vec::with_capacity(units.len());
        for (mut unit, (start, end)) in units.into_iter().zip(spans) {
            let unit_levels = levels.get(start..end).unwrap_or(&[]);
            let first = unit_levels.first().copied().unwrap_or(self.base.level());
            let mixed = unit_levels.iter().any(|l| *l != first);
            if !mixed || !unit.plain || unit.kind != FragmentKind::Text {
                unit.level = first;
                out.push(unit);
                continue;
            }
            let mut seg_start = 0;
            for i in 1..=unit_levels.len() {
                if i < unit_levels.len() && unit_levels[i] == unit_levels[seg_start] {
                    continue;
                }
                let text = char_slice(&unit.text, seg_start, i).to_string();
                let width = self.measurer.width(&text, &unit.style);
                out.push(Unit {
                    kind: unit.kind,
                    width,
                    style: Arc::clone(&unit.style),
                    source: SourceRef {
                        offset: unit.source.offset + seg_start,
                        len: i - seg_start,
                        ..unit.source.clone()
                    },
                    hyperlink: unit.hyperlink.clone(),
                    run_id: unit.run_id,
                    image: None,
                    height: 0.0,
                    footnote: None,
                    level: unit_levels[seg_start],
                    trailing: unit.trailing,
                    plain: true,
                    text,
                });
                seg_start = i;
            }
        }
        out
    }

    fn merge(units: Vec<Unit>, keep_spaces: bool) -> Vec<Unit> {
        let mut out: Vec<Unit> = Vec::with_capacity(units.len());
        for unit in units {
            if let Some(prev) = out.last_mut() {
                let mergeable = |k: FragmentKind| {
                    k == FragmentKind::Text || (!keep_spaces && k == FragmentKind::Space)
                };
                if mergeable(prev.kind)
                    && mergeable(unit.kind)
                    && prev.run_id == unit.run_id
                    && prev.level == unit.level
                    && prev.trailing == unit.trailing
                    && prev.plain
                    && prev.hyperlink == unit.hyperlink
                    && (Arc::ptr_eq(&prev.style, &unit.style) || prev.style == unit.style)
                    && prev.source.path == unit.source.path
                    && prev.source.offset + prev.source.len == unit.source.offset
                {
                    prev.text.push_str(&unit.text);
                    prev.width += unit.width;
                    prev.source.len += unit.source.len;
                    prev.plain = unit.plain;
                    if unit.kind == FragmentKind::Text {
                        prev.kind = FragmentKind::Text;
                    }
                    continue;
                }
            }
            out.push(unit);
        }
        out
    }

    fn assemble_line(
        &mut self,
        pieces: Vec<Piece>,
        line_box: &LineBox,
        first: bool,
        last: bool,
        hard_break: bool,
    ) -> LayoutLine {
        let units = self.units(pieces);
        let inner_spaces = units
            .iter()
            .filter(|u| u.kind == FragmentKind::Space && !u.trailing)
            .count();
        let available = line_box.right - line_box.text_x;
        let natural_width: f32 = units.iter().map(|u| u.width).sum();
        let space_width: f32 = units
            .iter()
            .filter(|u| u.kind == FragmentKind::Space && !u.trailing)
            .map(|u| u.width)
            .sum();
        let overflow = natural_width - available;
        // A last line that was broken with shrunk spaces is compressed the same way.
        let compress = overflow > FIT_EPSILON && overflow <= space_width;
        let justify = self.style.alignment == Alignment::Justify
            && !hard_break
            && inner_spaces > 0
            && (!last || compress);
        let units = self.apply_bidi(units);
        let units = Self::merge(units, justify);
        let units = if units.iter().any(|u| u.level % 2 == 1) {
            bidi::reorder_visual(units, |u| u.level)
        } else {
            units
        };

        // Vertical metrics.
        let marker = self.marker.filter(|_| first);
        let mut above = 0.0f32;
        let mut below = 0.0f32;
        let mut measure = |style: &ResolvedRunStyle, image_height: Option<f32>, m: &Measurer<'_>| {
            match image_height {
                Some(h) => above = above.max(h),
                None => {
                    let fm = m.font_metrics(style);
                    let half_leading = ((fm.line_height - fm.ascent - fm.descent) / 2.0).max(0.0);
                    above = above.max(fm.ascent + half_leading);
                    below = below.max(fm.descent + half_leading);
                }
            }
        };
        for unit in &units {
            let image = (unit.kind == FragmentKind::Image).then_some(unit.height);
            measure(&unit.style, image, &*self.measurer);
        }
        if let Some(marker) = marker {
            measure(&marker.style, None, &*self.measurer);
        }
        if units.is_empty() && marker.is_none() {
            measure(&self.style.run, None, &*self.measurer);
        }
        let natural = above + below;
        let height = self.style.line_height.apply(natural);
        let baseline = if height < natural && natural > 0.0 {
            above * height / natural
        } else {
            above
        };

        // Horizontal placement.
        let total: f32 = units.iter().map(|u| u.width).sum();
        // Justified lines may shrink spaces; other lines never shift left.
        let slack = available - total;
        let rtl = self.base == Direction::Rtl;
        let (offset, extra) = match (self.style.alignment, rtl) {
            (Alignment::Justify, _) if justify => (0.0, slack / inner_spaces as f32),
            (Alignment::Center, _) => (slack.max(0.0) / 2.0, 0.0),
            (Alignment::Right, false) | (Alignment::Left, true) | (Alignment::Justify, true) => {
                (slack.max(0.0), 0.0)
            }
            _ => (0.0, 0.0),
        };

        let mut fragments = Vec::with_capacity(units.len() + 1);
        if let Some(marker) = marker {
            let width = self.measurer.width(&marker.text, &marker.style);
            let fm = self.measurer.font_metrics(&marker.style);
            fragments.push(LayoutFragment {
                text: marker.text.clone(),
                rect: Rect::new(
                    line_box.left,
                    line_box.y + baseline - fm.ascent,
                    width,
                    fm.ascent + fm.descent,
                ),
                kind: FragmentKind::Marker,
                style: Arc::clone(&marker.style),
                source: SourceRef {
                    region: self.words.first().map(|w| w.source.region).unwrap_or_default(),
                    ..SourceRef::default()
                },
                bidi_level: self.base.level(),
                hyperlink: None,
                image: None,
            });
        }
        let mut footnote_refs = Vec::new();
        let mut x = line_box.text_x + offset;
        for unit in units {
            let mut width = unit.width;
            if justify && unit.kind == FragmentKind::Space && !unit.trailing {
                width += extra;
            }
            let (top, frag_height) = if unit.kind == FragmentKind::Image {
                (baseline - unit.height, unit.height)
            } else {
                let fm = self.measurer.font_metrics(&unit.style);
                let shift = match unit.style.vertical_align {
                    VerticalAlign::Baseline => 0.0,
                    VerticalAlign::Superscript => -unit.style.font_size * SUPERSCRIPT_RISE,
                    VerticalAlign::Subscript => unit.style.font_size * SUBSCRIPT_DROP,
                };
                (baseline - fm.ascent + shift, fm.ascent + fm.descent)
            };
            if let Some(id) = unit.footnote {
                footnote_refs.push(id);
            }
            fragments.push(LayoutFragment {
                text: unit.text,
                rect: Rect::new(x, line_box.y + top, width, frag_height),
                kind: unit.kind,
                style: unit.style,
                source: unit.source,
                bidi_level: unit.level,
                hyperlink: unit.hyperlink,
                image: unit.image,
            });
            x += width;
        }

        LayoutLine {
            rect: Rect::new(line_box.left, line_box.y, line_box.right - line_box.left, height),
            baseline,
            fragments,
            hard_break,
            footnote_refs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LayoutCache;
    use crate::metrics::EstimatedMetrics;
    use docflow::{
        Hyperlink, NodeStamp, NoteRef, NumberingRegistry, ParagraphProperties, StyleRegistry,
        TextDirection, WrapMode, WrapSide,
    };

    struct Fixture {
        styles: StyleRegistry,
        numbering: NumberingRegistry,
        labels: NoteLabels,
        cache: LayoutCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                styles: StyleRegistry::default(),
                numbering: NumberingRegistry::default(),
                labels: NoteLabels::default(),
                cache: LayoutCache::default(),
            }
        }

        fn layout_with(
            &mut self,
            paragraph: &Paragraph,
            width: f32,
            cfg: &LayoutConfig,
            floats: &[PositionedFloat],
            marker: Option<&ListMarker>,
        ) -> Vec<LayoutLine> {
            let mut resolver = StyleResolver::new(&self.styles, &self.numbering);
            let style = resolver.resolve_paragraph(&paragraph.properties);
            let mut measurer = Measurer::new(&EstimatedMetrics, &mut self.cache);
            let ctx = InlineContext {
                region: SourceRegion::Body,
                path: &[0, 0],
                paragraph_style: None,
                fields: FieldValues::default(),
                note_labels: &self.labels,
            };
            let words = collect_words(paragraph, &ctx, &mut resolver, &mut measurer);
            let frame = ParagraphFrame {
                x: 0.0,
                y: 0.0,
                width,
                floats,
            };
            break_lines(&words, &style, marker, &frame, cfg, &mut measurer)
        }

        fn layout(&mut self, paragraph: &Paragraph, width: f32) -> Vec<LayoutLine> {
            self.layout_with(paragraph, width, &LayoutConfig::default(), &[], None)
        }
    }

    const SAMPLE: &str = "The quick brown fox jumps over the lazy dog while typesetting \
        engines measure every word and hyphenation keeps the paragraph tidy and readable.";

    fn paragraph(text: &str, alignment: Alignment) -> Paragraph {
        Paragraph::from_text(NodeStamp::new(1, 0), text).with_properties(ParagraphProperties {
            alignment: Some(alignment),
            ..ParagraphProperties::default()
        })
    }

    fn reconstruct(lines: &[LayoutLine], source: &str) -> String {
        let mut frags: Vec<&LayoutFragment> = lines
            .iter()
            .flat_map(|l| l.fragments.iter())
            .filter(|f| f.source.len > 0)
            .collect();
        frags.sort_by_key(|f| f.source.offset);
        frags
            .iter()
            .map(|f| char_slice(source, f.source.offset, f.source.offset + f.source.len))
            .collect()
    }

    #[test]
    fn greedy_fragments_conserve_source_text() {
        let mut fx = Fixture::new();
        let lines = fx.layout(&paragraph(SAMPLE, Alignment::Left), 160.0);
        assert!(lines.len() > 3);
        assert_eq!(reconstruct(&lines, SAMPLE), SAMPLE);
    }

    #[test]
    fn optimal_fragments_conserve_source_text() {
        let mut fx = Fixture::new();
        let lines = fx.layout(&paragraph(SAMPLE, Alignment::Justify), 200.0);
        assert!(lines.len() > 2);
        assert_eq!(reconstruct(&lines, SAMPLE), SAMPLE);
    }

    #[test]
    fn optimal_flag_does_not_change_left_aligned_text() {
        let mut fx = Fixture::new();
        let para = paragraph(SAMPLE, Alignment::Left);
        let with = fx.layout(&para, 180.0);
        let mut cfg = LayoutConfig::default();
        cfg.typography.justification.optimal = false;
        let without = fx.layout_with(&para, 180.0, &cfg, &[], None);
        assert_eq!(with, without);
    }

    #[test]
    fn justified_lines_fill_width_except_the_last() {
        let mut fx = Fixture::new();
        let lines = fx.layout(&paragraph(SAMPLE, Alignment::Justify), 220.0);
        for line in &lines[..lines.len() - 1] {
            let right = line
                .fragments
                .iter()
                .filter(|f| f.kind != FragmentKind::Space || f.rect.width > 0.0)
                .map(|f| f.rect.right())
                .fold(0.0f32, f32::max);
            assert!((right - 220.0).abs() < 0.5, "line ends at {right}");
        }
        let last = lines.last().expect("lines");
        let right = last.fragments.iter().map(|f| f.rect.right()).fold(0.0f32, f32::max);
        assert!(last.fragments[0].rect.x.abs() < 1e-3);
        assert!(right <= 220.5, "last line ends at {right}");
    }

    #[test]
    fn narrow_line_hyphenates_long_word() {
        let mut fx = Fixture::new();
        let mut cfg = LayoutConfig::default();
        cfg.typography.justification.optimal = false;
        let para = paragraph("aa understanding", Alignment::Left);
        let lines = fx.layout_with(&para, 100.0, &cfg, &[], None);
        assert_eq!(lines.len(), 2);
        let first_line_text: String = lines[0].fragments.iter().map(|f| f.text.as_str()).collect();
        assert!(first_line_text.ends_with("understand-"), "{first_line_text:?}");
        assert_eq!(reconstruct(&lines, "aa understanding"), "aa understanding");
    }

    const MIXED: &str = "The characteristically extraordinary internationalization of \
        typesetting פסקה עברית ארוכה מאוד and more words 123 456 here.";

    fn assert_inside_line_box(lines: &[LayoutLine], context: &str) {
        for line in lines {
            let text: String = line.fragments.iter().map(|f| f.text.as_str()).collect();
            // A lone unbreakable word may overflow.
            if !text.trim().contains(' ') {
                continue;
            }
            for frag in &line.fragments {
                assert!(
                    frag.rect.x >= line.rect.x - 0.5 && frag.rect.right() <= line.rect.right() + 0.5,
                    "{context}: {:?} at {}..{} outside {}..{}",
                    frag.text,
                    frag.rect.x,
                    frag.rect.right(),
                    line.rect.x,
                    line.rect.right(),
                );
            }
        }
    }

    fn assert_covers_each_char_once(lines: &[LayoutLine], source: &str, context: &str) {
        let chars: Vec<char> = source.chars().collect();
        let mut seen = vec![0usize; chars.len()];
        for frag in lines.iter().flat_map(|l| l.fragments.iter()) {
            for slot in &mut seen[frag.source.offset..frag.source.offset + frag.source.len] {
                *slot += 1;
            }
        }
        for (ch, count) in chars.iter().zip(&seen) {
            if ch.is_whitespace() {
                assert!(*count <= 1, "{context}: space placed {count} times");
            } else {
                assert_eq!(*count, 1, "{context}: {ch:?} placed {count} times");
            }
        }
    }

    #[test]
    fn justified_lines_stay_inside_the_line_box() {
        let mut fx = Fixture::new();
        // 4000 and 3220 twips of content width.
        let mut widths = vec![4000.0 / 15.0, 3220.0 / 15.0];
        widths.extend((12..=40).map(|w| w as f32 * 10.0));
        for direction in [TextDirection::Ltr, TextDirection::Rtl] {
            let para = Paragraph::from_text(NodeStamp::new(5, 0), MIXED).with_properties(
                ParagraphProperties {
                    alignment: Some(Alignment::Justify),
                    direction: Some(direction),
                    ..ParagraphProperties::default()
                },
            );
            for &width in &widths {
                let context = format!("{direction:?} at {width}");
                let lines = fx.layout(&para, width);
                assert_inside_line_box(&lines, &context);
                assert_covers_each_char_once(&lines, MIXED, &context);
            }
        }
    }

    #[test]
    fn compressed_last_line_ends_at_the_margin() {
        let mut fx = Fixture::new();
        let width = 4000.0 / 15.0;
        let lines = fx.layout(&paragraph(MIXED, Alignment::Justify), width);
        let last = lines.last().expect("lines");
        let right = last.fragments.iter().map(|f| f.rect.right()).fold(0.0f32, f32::max);
        assert!(right <= width + 0.5, "last line ends at {right}");
    }

    #[test]
    fn forced_break_starts_new_line() {
        let mut fx = Fixture::new();
        let para = paragraph("one\ntwo", Alignment::Justify);
        let lines = fx.layout(&para, 400.0);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].hard_break);
        assert!(lines[1].rect.y >= lines[0].rect.bottom() - 1e-3);
    }

    #[test]
    fn rtl_paragraph_is_right_aligned_with_odd_levels() {
        let mut fx = Fixture::new();
        let para = Paragraph::from_text(NodeStamp::new(2, 0), "שלום עולם").with_properties(
            ParagraphProperties {
                direction: Some(TextDirection::Rtl),
                ..ParagraphProperties::default()
            },
        );
        let lines = fx.layout(&para, 300.0);
        assert_eq!(lines.len(), 1);
        let frags = &lines[0].fragments;
        assert!(frags.iter().filter(|f| f.kind == FragmentKind::Text).all(|f| f.bidi_level == 1));
        let right = frags.iter().map(|f| f.rect.right()).fold(0.0f32, f32::max);
        assert!((right - 300.0).abs() < 0.5);
    }

    #[test]
    fn mixed_line_splits_runs_by_level() {
        let mut fx = Fixture::new();
        let lines = fx.layout(&paragraph("abc אבג def", Alignment::Left), 400.0);
        let levels: Vec<u8> = lines[0]
            .fragments
            .iter()
            .filter(|f| f.kind == FragmentKind::Text)
            .map(|f| f.bidi_level)
            .collect();
        assert!(levels.contains(&0) && levels.contains(&1), "{levels:?}");
    }

    #[test]
    fn tab_advances_to_next_stop() {
        let mut fx = Fixture::new();
        let para = paragraph("a\tb", Alignment::Left);
        let lines = fx.layout(&para, 400.0);
        let b = lines[0]
            .fragments
            .iter()
            .find(|f| f.text == "b")
            .expect("b fragment");
        assert!((b.rect.x - 48.0).abs() < 1e-3);
    }

    #[test]
    fn marker_sits_in_hanging_indent() {
        let mut fx = Fixture::new();
        let para = Paragraph::from_text(NodeStamp::new(3, 0), "item").with_properties(
            ParagraphProperties {
                indent_left: Some(720),
                hanging: Some(360),
                ..ParagraphProperties::default()
            },
        );
        let marker = ListMarker {
            text: "1.".into(),
            style: Arc::new(ResolvedRunStyle::default()),
        };
        let lines = fx.layout_with(&para, 400.0, &LayoutConfig::default(), &[], Some(&marker));
        let frags = &lines[0].fragments;
        assert_eq!(frags[0].kind, FragmentKind::Marker);
        assert!((frags[0].rect.x - 24.0).abs() < 1e-3);
        assert!((frags[1].rect.x - 48.0).abs() < 1e-3);
    }

    #[test]
    fn float_narrows_the_lines_beside_it() {
        let mut fx = Fixture::new();
        let float = PositionedFloat {
            path: NodePath::new(),
            rect: Rect::new(0.0, 0.0, 100.0, 30.0),
            wrap: WrapMode::Square,
            wrap_side: WrapSide::Right,
            distance: [0.0; 4],
            image: ImageRef::default(),
        };
        let lines = fx.layout_with(
            &paragraph(SAMPLE, Alignment::Left),
            300.0,
            &LayoutConfig::default(),
            &[float],
            None,
        );
        assert!(lines[0].rect.x >= 100.0);
        let below = lines.iter().find(|l| l.rect.y >= 30.0).expect("line below float");
        assert_eq!(below.rect.x, 0.0);
        assert_eq!(reconstruct(&lines, SAMPLE), SAMPLE);
    }

    #[test]
    fn footnote_refs_are_recorded_on_their_line() {
        let mut fx = Fixture::new();
        fx.labels.footnotes.insert("n1".into(), "1".into());
        let para = Paragraph {
            stamp: NodeStamp::new(4, 0),
            properties: ParagraphProperties::default(),
            children: vec![
                Inline::Run(Run::plain("see ")),
                Inline::Hyperlink(Hyperlink {
                    target: "https://example.com".into(),
                    children: vec![Run::plain("link")],
                }),
                Inline::FootnoteRef(NoteRef {
                    id: "n1".into(),
                    properties: RunProperties::default(),
                }),
            ],
        };
        let lines = fx.layout(&para, 400.0);
        assert_eq!(lines[0].footnote_refs, vec!["n1".to_string()]);
        let mark = lines[0]
            .fragments
            .iter()
            .find(|f| f.kind == FragmentKind::NoteRef)
            .expect("note mark");
        assert_eq!(mark.text, "1");
        assert!(lines[0]
            .fragments
            .iter()
            .any(|f| f.hyperlink.as_deref() == Some("https://example.com")));
    }

    #[test]
    fn empty_paragraph_has_one_line_of_default_height() {
        let mut fx = Fixture::new();
        let lines = fx.layout(&Paragraph::default(), 300.0);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].rect.height > 0.0);
        assert!(lines[0].fragments.is_empty());
    }
}
