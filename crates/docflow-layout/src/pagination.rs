//! Page flow: sections, page breaks, paragraph splitting and page chrome.
//!
//! [`LayoutEngine::layout`] walks the body section by section and keeps a
//! vertical cursor on the open page. Paragraphs are broken into lines once
//! and then split across pages at line boundaries under the widow/orphan
//! rules; tables split at row boundaries; everything else moves whole.
//! Headers and footers shrink the body box of each page, footnote bodies are
//! reserved while lines are fitted, and `PAGE`/`NUMPAGES` fields in page
//! chrome are laid out again once the page count is known.

use std::collections::HashMap;
use std::sync::Arc;

use docflow::units::{emu_to_px, twips_to_px};
use docflow::{
    Block, Document, FieldKind, Inline, NumberFormat, Paragraph, SectionProperties, Shape, Table,
};

use crate::cache::{CachedParagraph, LayoutCache};
use crate::column_layout::{compute_columns, distribute_blocks, plan_columns, ColumnItem};
use crate::config::LayoutConfig;
use crate::float_layout::{collect_floats, position_floats, AnchorFrame};
use crate::layout_ir::{
    translate_line, LayoutBlock, LayoutFootnoteArea, LayoutLine, LayoutNote, LayoutPage,
    LayoutParagraph, LayoutRegion, LayoutResult, LayoutShape, NodePath, PositionedFloat, Rect,
    SourceRegion,
};
use crate::line_break::{
    break_lines, collect_words, FieldValues, InlineContext, ListMarker, NoteLabels,
    ParagraphFrame,
};
use crate::list_numbering::NumberingState;
use crate::metrics::{EstimatedMetrics, GlyphMetrics, Measurer};
use crate::style::{ResolvedParagraphStyle, StyleResolver};
use crate::table_layout::{layout_table, CellContentLayouter, TableFrame, TableSplit};

const FIT_EPSILON: f32 = 0.01;
const SEPARATOR_THICKNESS: f32 = 1.0;

/// Lays out documents into pages.
///
/// The engine owns the [`LayoutCache`], so unchanged paragraphs skip line
/// breaking on later passes. It is not re-entrant: `layout` takes `&mut self`.
pub struct LayoutEngine {
    cfg: LayoutConfig,
    metrics: Arc<dyn GlyphMetrics>,
    cache: LayoutCache,
    version: u64,
}

impl LayoutEngine {
    pub fn new(cfg: LayoutConfig, metrics: Arc<dyn GlyphMetrics>) -> Self {
        Self {
            cache: LayoutCache::new(cfg.text_width_cache_capacity),
            cfg,
            metrics,
            version: 0,
        }
    }

    /// Engine measuring with [`EstimatedMetrics`].
    pub fn with_estimated_metrics(cfg: LayoutConfig) -> Self {
        Self::new(cfg, Arc::new(EstimatedMetrics))
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.cfg
    }

    /// Replace the configuration. Cached layouts were produced under the
    /// old one and are dropped.
    pub fn set_config(&mut self, cfg: LayoutConfig) {
        if cfg != self.cfg {
            self.cache.clear();
        }
        self.cfg = cfg;
    }

    pub fn cache(&self) -> &LayoutCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut LayoutCache {
        &mut self.cache
    }

    /// Version of the most recent result; 0 before the first pass.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Run one layout pass.
    pub fn layout(&mut self, doc: &Document) -> LayoutResult {
        self.version += 1;
        let metrics = Arc::clone(&self.metrics);
        let cfg = self.cfg;
        let measurer = Measurer::new(metrics.as_ref(), &mut self.cache);
        let ctx = LayoutContext::new(doc, &cfg, measurer);
        let pages = Paginator::new(ctx).run();
        log::debug!(
            "layout pass {} produced {} pages",
            self.version,
            pages.len()
        );
        LayoutResult {
            pages,
            version: self.version,
        }
    }
}

/// Pass-scoped state: resolvers, list counters, note labels and the story
/// currently being laid out.
struct LayoutContext<'a> {
    doc: &'a Document,
    cfg: &'a LayoutConfig,
    resolver: StyleResolver<'a>,
    measurer: Measurer<'a>,
    numbering: NumberingState,
    note_labels: NoteLabels,
    region: SourceRegion,
    part_id: Option<String>,
    fields: FieldValues,
}

impl<'a> LayoutContext<'a> {
    fn new(doc: &'a Document, cfg: &'a LayoutConfig, measurer: Measurer<'a>) -> Self {
        let mut footnotes = Vec::new();
        let mut endnotes = Vec::new();
        for section in &doc.body.sections {
            collect_note_refs(&section.blocks, &mut footnotes, &mut endnotes);
        }
        let note_labels = NoteLabels {
            footnotes: footnotes
                .into_iter()
                .enumerate()
                .map(|(i, id)| (id, (i + 1).to_string()))
                .collect(),
            endnotes: endnotes
                .into_iter()
                .enumerate()
                .map(|(i, id)| (id, NumberFormat::LowerRoman.format(i as u32 + 1)))
                .collect(),
        };
        Self {
            doc,
            cfg,
            resolver: StyleResolver::new(&doc.styles, &doc.numbering),
            measurer,
            numbering: NumberingState::new(),
            note_labels,
            region: SourceRegion::Body,
            part_id: None,
            fields: FieldValues::default(),
        }
    }

    /// Run `f` inside another story. List counters of the current story are
    /// set aside and restored afterwards.
    fn with_region<R>(
        &mut self,
        region: SourceRegion,
        part_id: Option<String>,
        fields: FieldValues,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let numbering = std::mem::take(&mut self.numbering);
        let prev_region = std::mem::replace(&mut self.region, region);
        let prev_part = std::mem::replace(&mut self.part_id, part_id);
        let prev_fields = std::mem::replace(&mut self.fields, fields);
        let out = f(self);
        self.numbering = numbering;
        self.region = prev_region;
        self.part_id = prev_part;
        self.fields = prev_fields;
        out
    }

    /// Advance list counters for `p` and build its marker.
    fn marker_for(&mut self, p: &Paragraph, style: &ResolvedParagraphStyle) -> Option<ListMarker> {
        let num = style.numbering.as_ref();
        let text = self
            .numbering
            .next_marker(num, &self.doc.numbering)
            .filter(|text| !text.is_empty())?;
        let num = num?;
        let style = self
            .resolver
            .resolve_marker(p.properties.style_id.as_deref(), num);
        Some(ListMarker { text, style })
    }

    /// Lines of `p` in `frame`, from the paragraph cache when the result
    /// cannot depend on page position.
    fn paragraph_lines(
        &mut self,
        p: &Paragraph,
        path: &[u32],
        style: &ResolvedParagraphStyle,
        marker: Option<&ListMarker>,
        frame: &ParagraphFrame<'_>,
    ) -> Vec<LayoutLine> {
        let cacheable = self.cfg.paragraph_cache
            && self.region == SourceRegion::Body
            && p.stamp.is_stamped()
            && frame.floats.is_empty()
            && !has_volatile_inlines(p);
        let marker_text = marker.map(|m| m.text.as_str());
        if cacheable {
            if let Some(hit) = self
                .measurer
                .cache()
                .get_cached_paragraph(p.stamp, frame.width, marker_text)
            {
                let mut lines = (*hit.lines).clone();
                rebase_lines(&mut lines, &hit.path, path);
                for line in &mut lines {
                    translate_line(line, frame.x, frame.y);
                }
                return lines;
            }
        }

        let ctx = InlineContext {
            region: self.region,
            path,
            paragraph_style: p.properties.style_id.as_deref(),
            fields: self.fields,
            note_labels: &self.note_labels,
        };
        let words = collect_words(p, &ctx, &mut self.resolver, &mut self.measurer);
        let lines = break_lines(&words, style, marker, frame, self.cfg, &mut self.measurer);

        if cacheable {
            let mut relative = lines.clone();
            for line in &mut relative {
                translate_line(line, -frame.x, -frame.y);
            }
            let height = lines.last().map_or(0.0, |l| l.rect.bottom() - frame.y);
            self.measurer.cache().set_cached_paragraph(
                p.stamp,
                frame.width,
                CachedParagraph {
                    path: path.iter().copied().collect(),
                    marker: marker.map(|m| m.text.clone()),
                    lines: Arc::new(relative),
                    height,
                },
            );
        }
        lines
    }

    #[allow(clippy::too_many_arguments)]
    fn make_paragraph(
        &self,
        path: &[u32],
        p: &Paragraph,
        lines: Vec<LayoutLine>,
        first_line: usize,
        continues: bool,
        x: f32,
        width: f32,
    ) -> LayoutParagraph {
        let top = lines.first().map_or(0.0, |l| l.rect.y);
        let bottom = lines.last().map_or(top, |l| l.rect.bottom());
        LayoutParagraph {
            region: self.region,
            part_id: self.part_id.clone(),
            path: path.iter().copied().collect(),
            stamp: p.stamp,
            rect: Rect::new(x, top, width, bottom - top),
            lines,
            first_line,
            continues,
        }
    }

    fn layout_shape(&mut self, shape: &Shape, path: &[u32], x: f32, y: f32) -> LayoutShape {
        let width = emu_to_px(shape.extent.cx).max(0.0);
        let height = emu_to_px(shape.extent.cy).max(0.0);
        let (mut blocks, _) = self.layout_cell(&shape.blocks, path, width);
        for block in &mut blocks {
            block.translate(x, y);
        }
        LayoutShape {
            region: self.region,
            path: path.iter().copied().collect(),
            stamp: shape.stamp,
            rect: Rect::new(x, y, width, height),
            blocks,
        }
    }

    /// Stack blocks from (0, 0) without pagination.
    fn flow_blocks(&mut self, blocks: &[Block], path: &[u32], width: f32) -> (Vec<LayoutBlock>, f32) {
        let mut out = Vec::with_capacity(blocks.len());
        let mut y = 0.0f32;
        for (idx, block) in blocks.iter().enumerate() {
            let mut block_path: NodePath = path.iter().copied().collect();
            block_path.push(idx as u32);
            match block {
                Block::Paragraph(p) => {
                    let style = self.resolver.resolve_paragraph(&p.properties);
                    let marker = self.marker_for(p, &style);
                    let frame = ParagraphFrame {
                        x: 0.0,
                        y: y + style.spacing_before,
                        width,
                        floats: &[],
                    };
                    let lines =
                        self.paragraph_lines(p, &block_path, &style, marker.as_ref(), &frame);
                    let para = self.make_paragraph(&block_path, p, lines, 0, false, 0.0, width);
                    y = para.rect.bottom() + style.spacing_after;
                    out.push(LayoutBlock::Paragraph(para));
                }
                Block::Table(table) => {
                    let frame = TableFrame {
                        region: self.region,
                        path: &block_path,
                        x: 0.0,
                        y,
                        width,
                    };
                    let cfg = self.cfg;
                    let placed = layout_table(table, &frame, cfg, self);
                    y = placed.table.rect.bottom();
                    out.push(LayoutBlock::Table(placed.table));
                }
                Block::Shape(shape) => {
                    let shape = self.layout_shape(shape, &block_path, 0.0, y);
                    y = shape.rect.bottom();
                    out.push(LayoutBlock::Shape(shape));
                }
                Block::PageBreak => {}
            }
        }
        (out, y)
    }
}

impl CellContentLayouter for LayoutContext<'_> {
    fn layout_cell(&mut self, blocks: &[Block], path: &[u32], width: f32) -> (Vec<LayoutBlock>, f32) {
        self.flow_blocks(blocks, path, width)
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|known| known == id) {
        list.push(id.to_string());
    }
}

/// Note references in document order.
fn collect_note_refs(blocks: &[Block], footnotes: &mut Vec<String>, endnotes: &mut Vec<String>) {
    for block in blocks {
        match block {
            Block::Paragraph(p) => {
                for inline in &p.children {
                    match inline {
                        Inline::FootnoteRef(note) => push_unique(footnotes, &note.id),
                        Inline::EndnoteRef(note) => push_unique(endnotes, &note.id),
                        _ => {}
                    }
                }
            }
            Block::Table(table) => {
                for row in &table.rows {
                    for cell in &row.cells {
                        collect_note_refs(&cell.blocks, footnotes, endnotes);
                    }
                }
            }
            Block::Shape(shape) => collect_note_refs(&shape.blocks, footnotes, endnotes),
            Block::PageBreak => {}
        }
    }
}

fn is_page_field(inline: &Inline) -> bool {
    matches!(
        inline,
        Inline::Field(field) if matches!(field.kind, FieldKind::Page | FieldKind::NumPages)
    )
}

/// Content whose layout depends on the pass: page fields and note marks.
fn has_volatile_inlines(p: &Paragraph) -> bool {
    p.children.iter().any(|inline| {
        is_page_field(inline) || matches!(inline, Inline::FootnoteRef(_) | Inline::EndnoteRef(_))
    })
}

fn blocks_have_page_fields(blocks: &[Block]) -> bool {
    blocks.iter().any(|block| match block {
        Block::Paragraph(p) => p.children.iter().any(is_page_field),
        Block::Table(table) => table
            .rows
            .iter()
            .flat_map(|row| row.cells.iter())
            .any(|cell| blocks_have_page_fields(&cell.blocks)),
        Block::Shape(shape) => blocks_have_page_fields(&shape.blocks),
        Block::PageBreak => false,
    })
}

fn rebase_lines(lines: &mut [LayoutLine], from: &[u32], to: &[u32]) {
    if from == to {
        return;
    }
    for line in lines {
        for frag in &mut line.fragments {
            if frag.source.path.starts_with(from) {
                let mut path: NodePath = to.iter().copied().collect();
                path.extend_from_slice(&frag.source.path[from.len()..]);
                frag.source.path = path;
            }
        }
    }
}

fn shift_lines(lines: &mut [LayoutLine], top: f32) {
    let Some(first) = lines.first() else {
        return;
    };
    let dy = top - first.rect.y;
    for line in lines {
        translate_line(line, 0.0, dy);
    }
}

/// Lines to keep on the current page when only `fit` of `total` lines fit.
///
/// Both parts keep at least `min_lines`; a too-short tail pulls the split
/// back, and `None` moves the whole paragraph.
pub fn split_point(total: usize, fit: usize, min_lines: usize, keep_together: bool) -> Option<usize> {
    if keep_together || fit == 0 || fit >= total {
        return None;
    }
    let min_lines = min_lines.max(1);
    if fit < min_lines {
        return None;
    }
    let keep = if total - fit < min_lines {
        total.saturating_sub(min_lines)
    } else {
        fit
    };
    (keep >= min_lines).then_some(keep)
}

/// Page geometry and chrome references of a section.
#[derive(Clone, Debug, Default)]
struct SectionGeometry {
    index: usize,
    page: Rect,
    /// Box inside the page margins.
    margin: Rect,
    header_top: f32,
    footer_bottom: f32,
    columns: usize,
    column_gap: f32,
    column_separator: bool,
    header: Option<String>,
    footer: Option<String>,
    first_header: Option<String>,
    first_footer: Option<String>,
    title_page: bool,
}

impl SectionGeometry {
    fn new(index: usize, props: &SectionProperties) -> Self {
        let (width, height) = props.page_size();
        let page = Rect::new(0.0, 0.0, twips_to_px(width), twips_to_px(height));
        let m = props.margins;
        let (left, right) = (twips_to_px(m.left), twips_to_px(m.right));
        let (top, bottom) = (twips_to_px(m.top), twips_to_px(m.bottom));
        let columns = usize::from(props.columns.count.max(1));
        Self {
            index,
            page,
            margin: Rect::new(
                left,
                top,
                (page.width - left - right).max(0.0),
                (page.height - top - bottom).max(0.0),
            ),
            header_top: twips_to_px(m.header),
            footer_bottom: page.height - twips_to_px(m.footer),
            columns,
            column_gap: twips_to_px(props.columns.space),
            column_separator: props.columns.separator && columns > 1,
            header: props.header.clone(),
            footer: props.footer.clone(),
            first_header: props.first_header.clone(),
            first_footer: props.first_footer.clone(),
            title_page: props.title_page,
        }
    }
}

#[derive(Default)]
struct PageState {
    page: LayoutPage,
    cursor: f32,
    /// Bottom of the body box.
    bottom: f32,
    /// Footnotes referenced from the page, in order.
    notes: Vec<String>,
    open: bool,
}

impl PageState {
    fn is_empty(&self) -> bool {
        self.page.blocks.is_empty()
    }
}

/// Lines of a paragraph broken at the cursor, plus the pictures it anchors.
struct LaidParagraph {
    lines: Vec<LayoutLine>,
    floats: Vec<PositionedFloat>,
}

struct Paginator<'a> {
    ctx: LayoutContext<'a>,
    pages: Vec<LayoutPage>,
    page: PageState,
    geometry: SectionGeometry,
    section_pages: usize,
    column_batch: Vec<ColumnItem>,
    notes: HashMap<String, Option<LayoutNote>>,
}

impl<'a> Paginator<'a> {
    fn new(ctx: LayoutContext<'a>) -> Self {
        Self {
            ctx,
            pages: Vec::new(),
            page: PageState::default(),
            geometry: SectionGeometry::default(),
            section_pages: 0,
            column_batch: Vec::new(),
            notes: HashMap::new(),
        }
    }

    fn run(mut self) -> Vec<LayoutPage> {
        let doc = self.ctx.doc;
        let sections = &doc.body.sections;
        for (si, section) in sections.iter().enumerate() {
            self.begin_section(si, &section.properties);
            self.place_blocks(&section.blocks, &[si as u32]);
            if si + 1 == sections.len() {
                self.place_endnotes();
            }
            self.drain_columns(true);
        }
        self.flush_page();
        self.resolve_page_counts();
        self.pages
    }

    fn place_blocks(&mut self, blocks: &[Block], prefix: &[u32]) {
        for (idx, block) in blocks.iter().enumerate() {
            let mut path: NodePath = prefix.iter().copied().collect();
            path.push(idx as u32);
            let next = blocks.get(idx + 1).map(|next| {
                let mut next_path: NodePath = prefix.iter().copied().collect();
                next_path.push(idx as u32 + 1);
                (next, next_path)
            });
            self.place_block(block, &path, next);
        }
    }

    fn place_block(&mut self, block: &Block, path: &[u32], next: Option<(&Block, NodePath)>) {
        match block {
            Block::PageBreak => {
                self.drain_columns(true);
                self.new_page();
            }
            _ if self.geometry.columns > 1 => self.push_column_block(block, path),
            Block::Paragraph(p) => self.place_paragraph(p, path, next),
            Block::Table(table) => self.place_table(table, path),
            Block::Shape(shape) => self.place_shape(shape, path),
        }
    }

    /// Endnote bodies follow the last section in reference order.
    fn place_endnotes(&mut self) {
        let doc = self.ctx.doc;
        let mut footnotes = Vec::new();
        let mut endnotes = Vec::new();
        for section in &doc.body.sections {
            collect_note_refs(&section.blocks, &mut footnotes, &mut endnotes);
        }
        for id in endnotes {
            let Some(note) = doc.endnotes.get(&id) else {
                log::debug!("endnote '{}' is referenced but missing", id);
                continue;
            };
            self.ctx.region = SourceRegion::Endnote;
            self.ctx.part_id = Some(id);
            self.place_blocks(&note.blocks, &[]);
        }
        self.ctx.region = SourceRegion::Body;
        self.ctx.part_id = None;
    }

    fn begin_section(&mut self, index: usize, props: &SectionProperties) {
        self.drain_columns(true);
        self.flush_page();
        self.geometry = SectionGeometry::new(index, props);
        self.section_pages = 0;
        self.notes.clear();
        self.start_page();
    }

    fn new_page(&mut self) {
        self.flush_page();
        self.start_page();
    }

    fn start_page(&mut self) {
        let g = self.geometry.clone();
        let number = self.pages.len() + 1;
        let first = self.section_pages == 0;
        self.section_pages += 1;
        let (header_id, footer_id) = if g.title_page && first {
            (g.first_header.clone(), g.first_footer.clone())
        } else {
            (g.header.clone(), g.footer.clone())
        };
        let fields = FieldValues {
            page: Some(number),
            num_pages: None,
        };

        let header = header_id.and_then(|id| {
            let (mut blocks, height) =
                self.layout_part(&id, SourceRegion::Header, g.margin.width, fields)?;
            for block in &mut blocks {
                block.translate(g.margin.x, g.header_top);
            }
            Some(LayoutRegion {
                part_id: id,
                rect: Rect::new(g.margin.x, g.header_top, g.margin.width, height),
                blocks,
            })
        });
        let footer = footer_id.and_then(|id| {
            let (mut blocks, height) =
                self.layout_part(&id, SourceRegion::Footer, g.margin.width, fields)?;
            let top = g.footer_bottom - height;
            for block in &mut blocks {
                block.translate(g.margin.x, top);
            }
            Some(LayoutRegion {
                part_id: id,
                rect: Rect::new(g.margin.x, top, g.margin.width, height),
                blocks,
            })
        });

        let mut top = g.margin.y;
        if let Some(header) = &header {
            top = top.max(header.rect.bottom() + self.ctx.cfg.header_body_gap_px);
        }
        let mut bottom = g.margin.bottom();
        if let Some(footer) = &footer {
            bottom = bottom.min(footer.rect.y);
        }
        let content = Rect::new(g.margin.x, top, g.margin.width, (bottom - top).max(0.0));
        let columns = if g.columns > 1 {
            compute_columns(content, g.columns, g.column_gap)
        } else {
            Vec::new()
        };

        self.ctx.fields = fields;
        self.page = PageState {
            page: LayoutPage {
                index: number - 1,
                section: g.index,
                page_rect: g.page,
                content_area: content,
                header,
                footer,
                columns,
                column_separator: g.column_separator,
                ..LayoutPage::default()
            },
            cursor: content.y,
            bottom: content.bottom(),
            notes: Vec::new(),
            open: true,
        };
        log::trace!("started page {} (section {})", number, g.index);
    }

    fn flush_page(&mut self) {
        if !self.page.open {
            return;
        }
        let mut state = std::mem::take(&mut self.page);
        let content = state.page.content_area;
        let notes: Vec<LayoutNote> = state.notes.iter().filter_map(|id| self.note(id)).collect();
        if !notes.is_empty() {
            let top = state.cursor + self.ctx.cfg.footnote_gap_px;
            let separator = Rect::new(
                content.x,
                top,
                content.width * self.ctx.cfg.footnote_separator_ratio,
                SEPARATOR_THICKNESS,
            );
            let mut y = top + SEPARATOR_THICKNESS;
            let mut placed = Vec::with_capacity(notes.len());
            for mut note in notes {
                let height = note.rect.height;
                for block in &mut note.blocks {
                    block.translate(content.x, y);
                }
                note.rect = Rect::new(content.x, y, content.width, height);
                y += height;
                placed.push(note);
            }
            state.page.footnotes = Some(LayoutFootnoteArea {
                rect: Rect::new(content.x, top, content.width, y - top),
                separator,
                notes: placed,
            });
        }
        log::trace!(
            "flushed page {} with {} blocks",
            state.page.number(),
            state.page.blocks.len()
        );
        self.pages.push(state.page);
    }

    /// Lay out a header or footer part at (0, 0).
    fn layout_part(
        &mut self,
        id: &str,
        region: SourceRegion,
        width: f32,
        fields: FieldValues,
    ) -> Option<(Vec<LayoutBlock>, f32)> {
        let doc = self.ctx.doc;
        let Some(part) = doc.headers_footers.get(id) else {
            log::debug!("section references missing header/footer '{}'", id);
            return None;
        };
        Some(
            self.ctx
                .with_region(region, Some(id.to_string()), fields, |ctx| {
                    ctx.flow_blocks(&part.blocks, &[], width)
                }),
        )
    }

    /// Lay out chrome holding page fields again with the final page count.
    fn resolve_page_counts(&mut self) {
        let total = self.pages.len();
        let mut pages = std::mem::take(&mut self.pages);
        for page in &mut pages {
            let fields = FieldValues {
                page: Some(page.number()),
                num_pages: Some(total),
            };
            if let Some(region) = page.header.as_mut() {
                self.refresh_region(region, SourceRegion::Header, fields);
            }
            if let Some(region) = page.footer.as_mut() {
                self.refresh_region(region, SourceRegion::Footer, fields);
            }
        }
        self.pages = pages;
    }

    fn refresh_region(&mut self, region: &mut LayoutRegion, kind: SourceRegion, fields: FieldValues) {
        let doc = self.ctx.doc;
        let Some(part) = doc.headers_footers.get(&region.part_id) else {
            return;
        };
        if !blocks_have_page_fields(&part.blocks) {
            return;
        }
        let Some((mut blocks, height)) =
            self.layout_part(&region.part_id, kind, region.rect.width, fields)
        else {
            return;
        };
        // Footers stay anchored to their bottom edge.
        let y = match kind {
            SourceRegion::Footer => region.rect.bottom() - height,
            _ => region.rect.y,
        };
        for block in &mut blocks {
            block.translate(region.rect.x, y);
        }
        region.blocks = blocks;
        region.rect = Rect::new(region.rect.x, y, region.rect.width, height);
    }

    fn layout_note(&mut self, id: &str) -> Option<LayoutNote> {
        let doc = self.ctx.doc;
        let Some(note) = doc.footnotes.get(id) else {
            log::debug!("footnote '{}' is referenced but missing", id);
            return None;
        };
        let width = self.geometry.margin.width;
        let fields = self.ctx.fields;
        let (blocks, height) = self
            .ctx
            .with_region(SourceRegion::Footnote, Some(id.to_string()), fields, |ctx| {
                ctx.flow_blocks(&note.blocks, &[], width)
            });
        let label = self
            .ctx
            .note_labels
            .footnotes
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string());
        Some(LayoutNote {
            note_id: id.to_string(),
            label,
            rect: Rect::new(0.0, 0.0, width, height),
            blocks,
        })
    }

    fn ensure_note(&mut self, id: &str) {
        if !self.notes.contains_key(id) {
            let note = self.layout_note(id);
            self.notes.insert(id.to_string(), note);
        }
    }

    fn note(&mut self, id: &str) -> Option<LayoutNote> {
        self.ensure_note(id);
        self.notes.get(id).cloned().flatten()
    }

    /// Space the footnote area takes for `ids`, gap and separator included.
    fn notes_area_height(&mut self, ids: &[String]) -> f32 {
        let mut total = 0.0f32;
        let mut any = false;
        for id in ids {
            self.ensure_note(id);
            if let Some(Some(note)) = self.notes.get(id) {
                total += note.rect.height;
                any = true;
            }
        }
        if any {
            self.ctx.cfg.footnote_gap_px + SEPARATOR_THICKNESS + total
        } else {
            0.0
        }
    }

    fn push_block(&mut self, block: LayoutBlock) {
        let mut refs: Vec<String> = Vec::new();
        block.for_each_paragraph(&mut |p| {
            for line in &p.lines {
                refs.extend(line.footnote_refs.iter().cloned());
            }
        });
        for id in refs {
            push_unique(&mut self.page.notes, &id);
        }
        self.page.page.blocks.push(block);
    }

    fn min_lines(&self, style: &ResolvedParagraphStyle) -> usize {
        let control = self.ctx.cfg.typography.widow_orphan_control;
        if control.enabled && style.widow_control {
            usize::from(control.min_lines).max(1)
        } else {
            1
        }
    }

    fn place_paragraph(&mut self, p: &Paragraph, path: &[u32], next: Option<(&Block, NodePath)>) {
        let style = self.ctx.resolver.resolve_paragraph(&p.properties);
        if style.page_break_before && !self.page.is_empty() {
            self.new_page();
        }
        let marker = self.ctx.marker_for(p, &style);
        let mut laid = self.lay_out_here(p, path, &style, marker.as_ref());

        if style.keep_with_next && !self.page.is_empty() {
            if let Some((next_block, next_path)) = next {
                let bottom = laid
                    .lines
                    .last()
                    .map_or(self.page.cursor, |l| l.rect.bottom())
                    + style.spacing_after;
                let mut notes = self.page.notes.clone();
                for line in &laid.lines {
                    for id in &line.footnote_refs {
                        push_unique(&mut notes, id);
                    }
                }
                let limit = self.page.bottom - self.notes_area_height(&notes);
                let lead = self.leading_height(next_block, &next_path);
                if bottom + lead > limit + FIT_EPSILON {
                    log::debug!("moving {:?} to the next page with its successor", path);
                    self.new_page();
                    laid = self.lay_out_here(p, path, &style, marker.as_ref());
                }
            }
        }
        self.flow_lines(p, path, &style, marker.as_ref(), laid);
    }

    /// Break `p` into lines at the cursor, positioning its anchored pictures
    /// on the current page.
    fn lay_out_here(
        &mut self,
        p: &Paragraph,
        path: &[u32],
        style: &ResolvedParagraphStyle,
        marker: Option<&ListMarker>,
    ) -> LaidParagraph {
        let content = self.page.page.content_area;
        let y = self.page.cursor + style.spacing_before;
        let anchors = collect_floats(p, path);
        let floats = if anchors.is_empty() {
            Vec::new()
        } else {
            let frame = AnchorFrame {
                page: self.geometry.page,
                margin: self.geometry.margin,
                paragraph_y: y,
                page_number: self.page.page.number(),
            };
            position_floats(&anchors, &frame)
        };
        let mut exclusions = self.page.page.floats.clone();
        exclusions.extend(floats.iter().cloned());
        let frame = ParagraphFrame {
            x: content.x,
            y,
            width: content.width,
            floats: &exclusions,
        };
        let lines = self.ctx.paragraph_lines(p, path, style, marker, &frame);
        LaidParagraph { lines, floats }
    }

    /// Lines that fit above the page bottom with their footnotes.
    fn fitting_lines(&mut self, lines: &[LayoutLine]) -> usize {
        let mut notes = self.page.notes.clone();
        let mut fit = 0;
        for line in lines {
            for id in &line.footnote_refs {
                push_unique(&mut notes, id);
            }
            let limit = self.page.bottom - self.notes_area_height(&notes);
            if line.rect.bottom() > limit + FIT_EPSILON {
                break;
            }
            fit += 1;
        }
        fit
    }

    fn flow_lines(
        &mut self,
        p: &Paragraph,
        path: &[u32],
        style: &ResolvedParagraphStyle,
        marker: Option<&ListMarker>,
        laid: LaidParagraph,
    ) {
        let LaidParagraph {
            mut lines,
            mut floats,
        } = laid;
        let min_lines = self.min_lines(style);
        let mut first_line = 0usize;
        loop {
            let total = lines.len();
            let fit = self.fitting_lines(&lines);
            let keep = if fit >= total {
                total
            } else {
                match split_point(total, fit, min_lines, style.keep_together) {
                    Some(keep) => keep,
                    None if self.page.is_empty() => {
                        let keep = fit.clamp(1, total);
                        log::debug!(
                            "{:?} does not fit an empty page; splitting after {} lines",
                            path,
                            keep
                        );
                        keep
                    }
                    None => {
                        self.new_page();
                        if first_line == 0 {
                            let laid = self.lay_out_here(p, path, style, marker);
                            lines = laid.lines;
                            floats = laid.floats;
                        } else {
                            let top = self.page.cursor;
                            shift_lines(&mut lines, top);
                        }
                        continue;
                    }
                }
            };

            let rest = lines.split_off(keep);
            let continues = !rest.is_empty();
            let content = self.page.page.content_area;
            self.page.page.floats.append(&mut floats);
            let para = self
                .ctx
                .make_paragraph(path, p, lines, first_line, continues, content.x, content.width);
            if first_line == 0 && !continues && self.ctx.region == SourceRegion::Body {
                let height = style.spacing_before + para.rect.height + style.spacing_after;
                self.ctx
                    .measurer
                    .cache()
                    .set_cached_block_height(p.stamp, content.width, height);
            }
            self.page.cursor = para.rect.bottom() + if continues { 0.0 } else { style.spacing_after };
            self.push_block(LayoutBlock::Paragraph(para));
            if !continues {
                return;
            }
            first_line += keep;
            self.new_page();
            lines = rest;
            let top = self.page.cursor;
            shift_lines(&mut lines, top);
        }
    }

    /// Height the start of `block` needs on a page: the lines a split would
    /// keep together, the header and first row group of a table, or the whole
    /// block otherwise. List counters are left untouched.
    fn leading_height(&mut self, block: &Block, path: &[u32]) -> f32 {
        let content = self.page.page.content_area;
        let saved = self.ctx.numbering.clone();
        let height = match block {
            Block::Paragraph(p) => {
                let style = self.ctx.resolver.resolve_paragraph(&p.properties);
                let cached = if style.keep_together {
                    self.ctx
                        .measurer
                        .cache()
                        .get_cached_block_height(p.stamp, content.width)
                } else {
                    None
                };
                match cached {
                    Some(height) => height,
                    None => {
                        let marker = self.ctx.marker_for(p, &style);
                        let frame = ParagraphFrame {
                            x: content.x,
                            y: 0.0,
                            width: content.width,
                            floats: &[],
                        };
                        let lines =
                            self.ctx
                                .paragraph_lines(p, path, &style, marker.as_ref(), &frame);
                        let take = if style.keep_together {
                            lines.len()
                        } else {
                            self.min_lines(&style).min(lines.len())
                        };
                        style.spacing_before
                            + lines
                                .get(..take)
                                .map_or(0.0, |l| l.iter().map(|line| line.rect.height).sum::<f32>())
                    }
                }
            }
            Block::Table(table) => {
                let frame = TableFrame {
                    region: self.ctx.region,
                    path,
                    x: content.x,
                    y: 0.0,
                    width: content.width,
                };
                let cfg = self.ctx.cfg;
                let placed = layout_table(table, &frame, cfg, &mut self.ctx);
                let rows = &placed.table.rows;
                let first_break = (placed.header_rows..rows.len())
                    .find(|&r| placed.break_after.get(r).copied().unwrap_or(true));
                match first_break.and_then(|r| rows.get(r)) {
                    Some(row) => row.rect.bottom() - placed.table.rect.y,
                    None => placed.table.rect.height,
                }
            }
            Block::Shape(shape) => emu_to_px(shape.extent.cy).max(0.0),
            Block::PageBreak => 0.0,
        };
        self.ctx.numbering = saved;
        height
    }

    fn place_table(&mut self, table: &Table, path: &[u32]) {
        let content = self.page.page.content_area;
        let frame = TableFrame {
            region: self.ctx.region,
            path,
            x: content.x,
            y: self.page.cursor,
            width: content.width,
        };
        let cfg = self.ctx.cfg;
        let mut placed = layout_table(table, &frame, cfg, &mut self.ctx);
        if self.ctx.region == SourceRegion::Body {
            self.ctx.measurer.cache().set_cached_block_height(
                table.stamp,
                content.width,
                placed.table.rect.height,
            );
        }
        loop {
            let notes = self.page.notes.clone();
            let bottom = self.page.bottom - self.notes_area_height(&notes);
            let force = self.page.is_empty();
            match placed.split(bottom, force) {
                TableSplit::Whole(table) => {
                    self.page.cursor = table.rect.bottom();
                    self.push_block(LayoutBlock::Table(table));
                    return;
                }
                TableSplit::Split { head, rest } => {
                    self.push_block(LayoutBlock::Table(head));
                    self.new_page();
                    placed = rest;
                }
                TableSplit::NoFit(rest) => {
                    self.new_page();
                    placed = rest;
                }
            }
            let dy = self.page.cursor - placed.table.rect.y;
            placed.translate(0.0, dy);
        }
    }

    fn place_shape(&mut self, shape: &Shape, path: &[u32]) {
        let height = emu_to_px(shape.extent.cy).max(0.0);
        if self.page.cursor + height > self.page.bottom + FIT_EPSILON && !self.page.is_empty() {
            self.new_page();
        }
        let content = self.page.page.content_area;
        let shape = self
            .ctx
            .layout_shape(shape, path, content.x, self.page.cursor);
        self.page.cursor = shape.rect.bottom();
        self.push_block(LayoutBlock::Shape(shape));
    }

    /// Measure a block at column width and queue it for distribution.
    fn push_column_block(&mut self, block: &Block, path: &[u32]) {
        let Some(column) = self.page.page.columns.first().copied() else {
            return;
        };
        match block {
            Block::Paragraph(p) => {
                let style = self.ctx.resolver.resolve_paragraph(&p.properties);
                if style.page_break_before
                    && (!self.page.is_empty() || !self.column_batch.is_empty())
                {
                    self.drain_columns(true);
                    self.new_page();
                }
                let marker = self.ctx.marker_for(p, &style);
                let frame = ParagraphFrame {
                    x: 0.0,
                    y: style.spacing_before,
                    width: column.width,
                    floats: &[],
                };
                let mut lines = self
                    .ctx
                    .paragraph_lines(p, path, &style, marker.as_ref(), &frame);
                let mut anchors = collect_floats(p, path);
                let min_lines = self.min_lines(&style);
                let mut first_line = 0usize;
                loop {
                    // Paragraphs taller than a column are cut into column-sized pieces.
                    let fit = lines
                        .iter()
                        .position(|l| l.rect.bottom() > column.height + FIT_EPSILON)
                        .unwrap_or(lines.len())
                        .max(1)
                        .min(lines.len());
                    let keep = split_point(lines.len(), fit, min_lines, false).unwrap_or(fit);
                    let rest = lines.split_off(keep);
                    let last = rest.is_empty();
                    let bottom = lines.last().map_or(style.spacing_before, |l| l.rect.bottom());
                    let height = bottom + if last { style.spacing_after } else { 0.0 };
                    let para = self
                        .ctx
                        .make_paragraph(path, p, lines, first_line, !last, 0.0, column.width);
                    self.column_batch.push(ColumnItem {
                        block: LayoutBlock::Paragraph(para),
                        height,
                        anchors: std::mem::take(&mut anchors),
                    });
                    self.drain_columns(false);
                    if last {
                        return;
                    }
                    first_line += keep;
                    lines = rest;
                    shift_lines(&mut lines, 0.0);
                }
            }
            Block::Table(table) => {
                let frame = TableFrame {
                    region: self.ctx.region,
                    path,
                    x: 0.0,
                    y: 0.0,
                    width: column.width,
                };
                let cfg = self.ctx.cfg;
                let placed = layout_table(table, &frame, cfg, &mut self.ctx);
                let height = placed.table.rect.height;
                self.column_batch
                    .push(ColumnItem::new(LayoutBlock::Table(placed.table), height));
                self.drain_columns(false);
            }
            Block::Shape(shape) => {
                let shape = self.ctx.layout_shape(shape, path, 0.0, 0.0);
                let height = shape.rect.height;
                self.column_batch
                    .push(ColumnItem::new(LayoutBlock::Shape(shape), height));
                self.drain_columns(false);
            }
            Block::PageBreak => {
                self.drain_columns(true);
                self.new_page();
            }
        }
    }

    /// Distribute queued column items once they overflow the page's columns,
    /// or unconditionally when `finish` is set. Overflow seeds the next page.
    fn drain_columns(&mut self, finish: bool) {
        loop {
            if self.column_batch.is_empty() {
                return;
            }
            let columns = self.page.page.columns.clone();
            if !finish {
                let heights: Vec<f32> = self.column_batch.iter().map(|i| i.height).collect();
                if plan_columns(&heights, &columns).len() == heights.len() {
                    return;
                }
            }
            let batch = std::mem::take(&mut self.column_batch);
            let dist = distribute_blocks(batch, &columns);
            let page_number = self.page.page.number();
            for item in dist.placed {
                if !item.anchors.is_empty() {
                    let frame = AnchorFrame {
                        page: self.geometry.page,
                        margin: self.geometry.margin,
                        paragraph_y: item.block.rect().y,
                        page_number,
                    };
                    let floats = position_floats(&item.anchors, &frame);
                    self.page.page.floats.extend(floats);
                }
                self.push_block(item.block);
            }
            if let Some(bottom) = dist.column_bottoms.iter().copied().reduce(f32::max) {
                self.page.cursor = self.page.cursor.max(bottom);
            }
            if dist.overflow.is_empty() {
                return;
            }
            self.column_batch = dist.overflow;
            self.new_page();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_two_lines_on_each_side() {
        assert_eq!(split_point(10, 6, 2, false), Some(6));
        assert_eq!(split_point(10, 9, 2, false), Some(8));
        assert_eq!(split_point(10, 1, 2, false), None);
        assert_eq!(split_point(3, 2, 2, false), None);
        assert_eq!(split_point(4, 3, 2, false), Some(2));
    }

    #[test]
    fn split_respects_keep_together_and_disabled_control() {
        assert_eq!(split_point(10, 6, 2, true), None);
        assert_eq!(split_point(10, 1, 1, false), Some(1));
        assert_eq!(split_point(10, 9, 1, false), Some(9));
        assert_eq!(split_point(5, 0, 1, false), None);
    }

    #[test]
    fn rebase_rewrites_path_prefix_only() {
        use crate::layout_ir::{LayoutFragment, SourceRef};
        use crate::style::ResolvedRunStyle;
        let mut lines = vec![LayoutLine {
            fragments: vec![LayoutFragment {
                text: "a".into(),
                rect: Rect::default(),
                kind: Default::default(),
                style: Arc::new(ResolvedRunStyle::default()),
                source: SourceRef {
                    region: SourceRegion::Body,
                    path: NodePath::from_slice(&[0, 3, 1]),
                    offset: 0,
                    len: 1,
                },
                bidi_level: 0,
                hyperlink: None,
                image: None,
            }],
            ..LayoutLine::default()
        }];
        rebase_lines(&mut lines, &[0, 3], &[1, 7]);
        assert_eq!(lines[0].fragments[0].source.path.as_slice(), &[1, 7, 1]);
    }
}
