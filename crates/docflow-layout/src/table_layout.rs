//! Table grids, column widths, row heights and cell placement.

use docflow::units::twips_to_px;
use docflow::{Block, CellVerticalAlignment, HeightRule, Table, TableProperties, TableWidth, VerticalMerge};

use crate::config::LayoutConfig;
use crate::layout_ir::{LayoutBlock, LayoutTable, LayoutTableCell, LayoutTableRow, NodePath, Rect, SourceRegion};

const FIT_EPSILON: f32 = 0.01;

/// A resolved cell: its top-left grid slot and spans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellGridEntry {
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
    /// Source row and cell index of the cell that started the entry.
    pub source_row: usize,
    pub source_cell: usize,
}

/// Dense slot grid; every slot an entry covers holds the same entry index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellGrid {
    pub rows: usize,
    pub cols: usize,
    pub entries: Vec<CellGridEntry>,
    slots: Vec<Vec<Option<usize>>>,
}

impl CellGrid {
    pub fn entry_index_at(&self, row: usize, col: usize) -> Option<usize> {
        self.slots.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    pub fn entry_at(&self, row: usize, col: usize) -> Option<&CellGridEntry> {
        self.entry_index_at(row, col).and_then(|idx| self.entries.get(idx))
    }

    /// Number of slots referring to `entry`.
    pub fn slot_count(&self, entry: usize) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| **slot == Some(entry))
            .count()
    }
}

/// Resolve spans and vertical merges into a slot grid.
///
/// Each cell takes the first unfilled column of its row. A `continue` cell
/// extends the entry above it; one with nothing to continue starts a new
/// entry.
pub fn build_cell_grid(table: &Table) -> CellGrid {
    let mut slots: Vec<Vec<Option<usize>>> = Vec::with_capacity(table.rows.len());
    let mut entries: Vec<CellGridEntry> = Vec::new();
    for (ri, row) in table.rows.iter().enumerate() {
        let mut line: Vec<Option<usize>> = Vec::new();
        let mut col = 0usize;
        for (ci, cell) in row.cells.iter().enumerate() {
            while line.get(col).copied().flatten().is_some() {
                col += 1;
            }
            let above = match (cell.vertical_merge, ri.checked_sub(1)) {
                (Some(VerticalMerge::Continue), Some(prev)) => {
                    slots[prev].get(col).copied().flatten().filter(|&idx| {
                        let e = &entries[idx];
                        e.col == col && e.row + e.row_span == ri
                    })
                }
                _ => None,
            };
            let idx = match above {
                Some(idx) => {
                    entries[idx].row_span += 1;
                    idx
                }
                None => {
                    entries.push(CellGridEntry {
                        row: ri,
                        col,
                        row_span: 1,
                        col_span: cell.grid_span.max(1) as usize,
                        source_row: ri,
                        source_cell: ci,
                    });
                    entries.len() - 1
                }
            };
            let span = entries[idx].col_span;
            if line.len() < col + span {
                line.resize(col + span, None);
            }
            for slot in &mut line[col..col + span] {
                *slot = Some(idx);
            }
            col += span;
        }
        slots.push(line);
    }
    let cols = slots.iter().map(Vec::len).max().unwrap_or(0);
    for line in &mut slots {
        line.resize(cols, None);
    }
    CellGrid {
        rows: table.rows.len(),
        cols,
        entries,
        slots,
    }
}

/// Column widths in pixels.
///
/// An explicit grid is kept in proportion and scaled to the target width
/// when the totals disagree; without one the target is split evenly. The
/// target is the preferred table width (capped at `available`), else
/// `available`.
pub fn resolve_column_widths(props: &TableProperties, cols: usize, available: f32) -> Vec<f32> {
    if cols == 0 {
        return Vec::new();
    }
    let available = available.max(0.0);
    let preferred = match props.width {
        TableWidth::Auto => None,
        TableWidth::Fixed { value } => Some(twips_to_px(value)),
        TableWidth::Pct { value } => Some(available * value as f32 / 5000.0),
    };
    let target = preferred
        .filter(|w| *w > 0.0)
        .map_or(available, |w| w.min(available));
    if props.grid.is_empty() {
        return vec![target / cols as f32; cols];
    }
    let given: Vec<f32> = props.grid.iter().map(|w| twips_to_px(*w).max(0.0)).collect();
    let mean = given.iter().sum::<f32>() / given.len() as f32;
    let mut widths: Vec<f32> = (0..cols.max(given.len()))
        .map(|i| given.get(i).copied().unwrap_or(mean))
        .collect();
    let total: f32 = widths.iter().sum();
    if total > 0.0 && (total - target).abs() > 0.5 {
        let scale = target / total;
        for w in &mut widths {
            *w *= scale;
        }
    }
    widths
}

/// Lays out the blocks of one cell.
pub trait CellContentLayouter {
    /// Lay out `blocks` in a box `width` wide whose top-left is (0, 0).
    /// `path` addresses the cell; block indices are appended to it.
    /// Returns the blocks and their total height.
    fn layout_cell(&mut self, blocks: &[Block], path: &[u32], width: f32) -> (Vec<LayoutBlock>, f32);
}

/// Where a table is placed.
#[derive(Clone, Copy, Debug)]
pub struct TableFrame<'a> {
    pub region: SourceRegion,
    pub path: &'a [u32],
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

/// A laid-out table plus what pagination needs to split it.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedTable {
    pub table: LayoutTable,
    /// A page break may follow row `i` (no cell spans across it).
    pub break_after: Vec<bool>,
    /// Leading header rows, repeated on continuation pages.
    pub header_rows: usize,
}

/// Outcome of fitting a table above a bottom edge.
#[derive(Clone, Debug, PartialEq)]
pub enum TableSplit {
    Whole(LayoutTable),
    Split { head: LayoutTable, rest: PlacedTable },
    NoFit(PlacedTable),
}

/// Lay out a table at the frame position.
pub fn layout_table(
    table: &Table,
    frame: &TableFrame<'_>,
    cfg: &LayoutConfig,
    layouter: &mut dyn CellContentLayouter,
) -> PlacedTable {
    let props = &table.properties;
    let grid = build_cell_grid(table);
    let indent = twips_to_px(props.indent);
    let widths = resolve_column_widths(props, grid.cols, frame.width - indent);
    let mut col_x = Vec::with_capacity(widths.len() + 1);
    let mut acc = 0.0f32;
    col_x.push(acc);
    for w in &widths {
        acc += w;
        col_x.push(acc);
    }
    let span_width = |col: usize, span: usize| {
        let end = (col + span).min(widths.len());
        col_x.get(end).copied().unwrap_or(acc) - col_x.get(col).copied().unwrap_or(acc)
    };
    let m = props.cell_margins;
    let (pad_top, pad_bottom, pad_left, pad_right) = (
        twips_to_px(m.top),
        twips_to_px(m.bottom),
        twips_to_px(m.left),
        twips_to_px(m.right),
    );

    let mut contents: Vec<(Vec<LayoutBlock>, f32)> = Vec::with_capacity(grid.entries.len());
    for entry in &grid.entries {
        let width = span_width(entry.col, entry.col_span);
        let inner = (width - pad_left - pad_right).max(0.0);
        let blocks = table
            .rows
            .get(entry.source_row)
            .and_then(|row| row.cells.get(entry.source_cell))
            .map(|cell| cell.blocks.as_slice())
            .unwrap_or(&[]);
        let mut path: NodePath = frame.path.iter().copied().collect();
        path.push(entry.source_row as u32);
        path.push(entry.source_cell as u32);
        contents.push(layouter.layout_cell(blocks, &path, inner));
    }

    let mut heights = vec![0.0f32; grid.rows];
    for r in 0..grid.rows {
        let rule = table.rows[r].height;
        let mut h = cfg.min_row_height_px;
        if let Some(rh) = rule.filter(|rh| rh.rule == HeightRule::AtLeast) {
            h = h.max(twips_to_px(rh.value));
        }
        for (entry, (_, content_h)) in grid.entries.iter().zip(&contents) {
            if entry.row + entry.row_span - 1 != r {
                continue;
            }
            let earlier: f32 = heights[entry.row..r].iter().sum();
            h = h.max(content_h + pad_top + pad_bottom - earlier);
        }
        if let Some(rh) = rule.filter(|rh| rh.rule == HeightRule::Exact && rh.value > 0) {
            h = twips_to_px(rh.value);
        }
        heights[r] = h;
    }
    let mut row_y = Vec::with_capacity(grid.rows + 1);
    let mut y = frame.y;
    for h in &heights {
        row_y.push(y);
        y += h;
    }
    row_y.push(y);

    let table_x = frame.x + indent;
    let mut rows: Vec<LayoutTableRow> = (0..grid.rows)
        .map(|r| LayoutTableRow {
            index: r,
            rect: Rect::new(table_x, row_y[r], acc, heights[r]),
            cells: Vec::new(),
            repeated: false,
        })
        .collect();
    for (entry, (mut blocks, content_h)) in grid.entries.iter().zip(contents) {
        let end_row = (entry.row + entry.row_span).min(grid.rows);
        let rect = Rect::new(
            table_x + col_x.get(entry.col).copied().unwrap_or(acc),
            row_y[entry.row],
            span_width(entry.col, entry.col_span),
            row_y[end_row] - row_y[entry.row],
        );
        let content_rect = Rect::new(
            rect.x + pad_left,
            rect.y + pad_top,
            (rect.width - pad_left - pad_right).max(0.0),
            (rect.height - pad_top - pad_bottom).max(0.0),
        );
        let valign = table.rows[entry.source_row].cells[entry.source_cell].vertical_alignment;
        let free = (content_rect.height - content_h).max(0.0);
        let offset = match valign {
            CellVerticalAlignment::Top => 0.0,
            CellVerticalAlignment::Center => free / 2.0,
            CellVerticalAlignment::Bottom => free,
        };
        for block in &mut blocks {
            block.translate(content_rect.x, content_rect.y + offset);
        }
        rows[entry.row].cells.push(LayoutTableCell {
            row: entry.row,
            col: entry.col,
            row_span: entry.row_span,
            col_span: entry.col_span,
            rect,
            content_rect,
            blocks,
        });
    }

    let break_after = (0..grid.rows)
        .map(|r| {
            !grid
                .entries
                .iter()
                .any(|e| e.row <= r && e.row + e.row_span - 1 > r)
        })
        .collect();
    let header_rows = table.rows.iter().take_while(|row| row.header).count();

    PlacedTable {
        table: LayoutTable {
            region: frame.region,
            path: frame.path.iter().copied().collect(),
            stamp: table.stamp,
            rect: Rect::new(table_x, frame.y, acc, y - frame.y),
            column_widths: widths,
            rows,
            continues: false,
        },
        break_after,
        header_rows,
    }
}

fn translate_row(row: &mut LayoutTableRow, dx: f32, dy: f32) {
    row.rect = row.rect.translated(dx, dy);
    for cell in &mut row.cells {
        cell.rect = cell.rect.translated(dx, dy);
        cell.content_rect = cell.content_rect.translated(dx, dy);
        for block in &mut cell.blocks {
            block.translate(dx, dy);
        }
    }
}

impl PlacedTable {
    /// Move the whole table.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.table.rect = self.table.rect.translated(dx, dy);
        for row in &mut self.table.rows {
            translate_row(row, dx, dy);
        }
    }

    /// Keep the rows that end above `bottom`, breaking only where no cell
    /// spans the boundary and never leaving header rows alone. The rest
    /// starts at the original table top with header rows repeated.
    ///
    /// With `force`, a table that cannot fit still gives up its first
    /// breakable group of rows.
    pub fn split(self, bottom: f32, force: bool) -> TableSplit {
        if self.table.rect.bottom() <= bottom + FIT_EPSILON {
            return TableSplit::Whole(self.table);
        }
        let rows = &self.table.rows;
        let valid = |k: &usize| *k >= self.header_rows && self.break_after.get(*k).copied().unwrap_or(false);
        let fitting = (0..rows.len())
            .rev()
            .filter(valid)
            .find(|&k| rows[k].rect.bottom() <= bottom + FIT_EPSILON);
        let chosen = match fitting {
            Some(k) => k,
            None if force => match (0..rows.len()).find(valid) {
                Some(k) => k,
                None => return TableSplit::Whole(self.table),
            },
            None => return TableSplit::NoFit(self),
        };
        if chosen + 1 >= rows.len() {
            return TableSplit::Whole(self.table);
        }

        let PlacedTable {
            mut table,
            break_after,
            header_rows,
        } = self;
        let tail = table.rows.split_off(chosen + 1);
        let top = table.rect.y;
        table.rect.height = table.rows.last().map_or(0.0, |r| r.rect.bottom() - top);
        table.continues = true;

        let mut rest_rows = Vec::with_capacity(header_rows + tail.len());
        let mut rest_breaks = Vec::with_capacity(header_rows + tail.len());
        let mut y = top;
        for (i, header) in table.rows.iter().take(header_rows).enumerate() {
            let mut row = header.clone();
            row.repeated = true;
            let dy = y - row.rect.y;
            translate_row(&mut row, 0.0, dy);
            y += row.rect.height;
            rest_rows.push(row);
            rest_breaks.push(break_after.get(i).copied().unwrap_or(false));
        }
        for (i, mut row) in tail.into_iter().enumerate() {
            let dy = y - row.rect.y;
            translate_row(&mut row, 0.0, dy);
            y += row.rect.height;
            rest_rows.push(row);
            rest_breaks.push(break_after.get(chosen + 1 + i).copied().unwrap_or(true));
        }
        let rest = LayoutTable {
            region: table.region,
            path: table.path.clone(),
            stamp: table.stamp,
            rect: Rect::new(table.rect.x, top, table.rect.width, y - top),
            column_widths: table.column_widths.clone(),
            rows: rest_rows,
            continues: false,
        };
        TableSplit::Split {
            head: table,
            rest: PlacedTable {
                table: rest,
                break_after: rest_breaks,
                header_rows,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_ir::LayoutParagraph;
    use docflow::{RowHeight, TableCell, TableRow};

    /// Every paragraph is 20px tall.
    struct FixedHeight;

    impl CellContentLayouter for FixedHeight {
        fn layout_cell(&mut self, blocks: &[Block], path: &[u32], width: f32) -> (Vec<LayoutBlock>, f32) {
            let mut out = Vec::new();
            for (i, _) in blocks.iter().enumerate() {
                let mut p: NodePath = path.iter().copied().collect();
                p.push(i as u32);
                out.push(LayoutBlock::Paragraph(LayoutParagraph {
                    path: p,
                    rect: Rect::new(0.0, i as f32 * 20.0, width, 20.0),
                    ..LayoutParagraph::default()
                }));
            }
            (out, blocks.len() as f32 * 20.0)
        }
    }

    fn row(cells: Vec<TableCell>) -> TableRow {
        TableRow {
            cells,
            ..TableRow::default()
        }
    }

    fn tall_cell(paragraphs: usize) -> TableCell {
        let mut cell = TableCell::with_text("x");
        let block = cell.blocks[0].clone();
        cell.blocks = vec![block; paragraphs];
        cell
    }

    fn place(table: &Table, width: f32) -> PlacedTable {
        let frame = TableFrame {
            region: SourceRegion::Body,
            path: &[0, 1],
            x: 10.0,
            y: 100.0,
            width,
        };
        layout_table(table, &frame, &LayoutConfig::default(), &mut FixedHeight)
    }

    #[test]
    fn spanning_cell_shares_one_entry_across_slots() {
        let mut wide = TableCell::with_text("wide");
        wide.grid_span = 2;
        let table = Table {
            rows: vec![
                row(vec![wide]),
                row(vec![TableCell::with_text("a"), TableCell::with_text("b")]),
            ],
            ..Table::default()
        };
        let grid = build_cell_grid(&table);
        assert_eq!(grid.cols, 2);
        assert_eq!(grid.entry_index_at(0, 0), grid.entry_index_at(0, 1));
        assert_eq!(grid.entry_at(0, 0).map(|e| e.col_span), Some(2));
        assert_ne!(grid.entry_index_at(1, 0), grid.entry_index_at(1, 1));
    }

    #[test]
    fn vertical_merge_extends_entry_downward() {
        let mut restart = TableCell::with_text("merged");
        restart.vertical_merge = Some(VerticalMerge::Restart);
        let mut cont = TableCell::default();
        cont.vertical_merge = Some(VerticalMerge::Continue);
        let table = Table {
            rows: vec![
                row(vec![restart, TableCell::with_text("r0")]),
                row(vec![cont.clone(), TableCell::with_text("r1")]),
                row(vec![cont, TableCell::with_text("r2")]),
            ],
            ..Table::default()
        };
        let grid = build_cell_grid(&table);
        let merged = grid.entry_index_at(0, 0).expect("entry");
        assert_eq!(grid.entry_index_at(2, 0), Some(merged));
        assert_eq!(grid.entries[merged].row_span, 3);
        for (idx, e) in grid.entries.iter().enumerate() {
            assert_eq!(grid.slot_count(idx), e.row_span * e.col_span);
        }
    }

    fn assert_entries_own_their_slots(grid: &CellGrid) {
        for (idx, e) in grid.entries.iter().enumerate() {
            assert_eq!(grid.slot_count(idx), e.row_span * e.col_span, "{e:?}");
            for r in e.row..e.row + e.row_span {
                for c in e.col..e.col + e.col_span {
                    assert_eq!(grid.entry_index_at(r, c), Some(idx), "slot ({r}, {c}) of {e:?}");
                }
            }
        }
    }

    fn merged(span: u32, merge: Option<VerticalMerge>) -> TableCell {
        let mut cell = TableCell::with_text("c");
        cell.grid_span = span;
        cell.vertical_merge = merge;
        cell
    }

    #[test]
    fn irregular_rows_keep_entries_disjoint() {
        use VerticalMerge::{Continue, Restart};
        let table = Table {
            rows: vec![
                row(vec![merged(2, Some(Restart)), merged(1, None), merged(3, None)]),
                row(vec![merged(1, Some(Continue)), merged(2, Some(Continue))]),
                row(vec![merged(2, Some(Continue)), merged(1, Some(Restart)), merged(1, None)]),
                row(vec![merged(1, None)]),
                row(vec![merged(1, None), merged(1, Some(Continue)), merged(4, None)]),
            ],
            ..Table::default()
        };
        let grid = build_cell_grid(&table);
        assert_entries_own_their_slots(&grid);
        // Continue cells take the span of the entry they extend.
        let top = grid.entry_index_at(0, 0).expect("entry");
        assert_eq!(grid.entry_index_at(1, 1), Some(top));
        assert_eq!(grid.entries[top].row_span, 3);

        // Pseudo-random shapes from a fixed seed.
        let mut seed = 0x2545_f491_u32;
        let mut next = move |n: u32| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed % n
        };
        for _ in 0..200 {
            let rows = (0..1 + next(6))
                .map(|_| {
                    row((0..1 + next(5))
                        .map(|_| {
                            let merge = match next(3) {
                                0 => Some(Restart),
                                1 => Some(Continue),
                                _ => None,
                            };
                            merged(1 + next(3), merge)
                        })
                        .collect())
                })
                .collect();
            let grid = build_cell_grid(&Table {
                rows,
                ..Table::default()
            });
            assert_entries_own_their_slots(&grid);
        }
    }

    #[test]
    fn widths_split_evenly_without_grid() {
        let props = TableProperties::default();
        assert_eq!(resolve_column_widths(&props, 3, 300.0), vec![100.0, 100.0, 100.0]);
        let pct = TableProperties {
            width: TableWidth::Pct { value: 2500 },
            ..TableProperties::default()
        };
        assert_eq!(resolve_column_widths(&pct, 2, 400.0), vec![100.0, 100.0]);
    }

    #[test]
    fn explicit_grid_scales_to_available_width() {
        let props = TableProperties {
            grid: vec![1440, 2880],
            ..TableProperties::default()
        };
        let widths = resolve_column_widths(&props, 2, 144.0);
        assert!((widths[0] - 48.0).abs() < 1e-3);
        assert!((widths[1] - 96.0).abs() < 1e-3);
    }

    #[test]
    fn row_heights_follow_rules_and_content() {
        let table = Table {
            rows: vec![
                TableRow {
                    height: Some(RowHeight {
                        rule: HeightRule::Exact,
                        value: 300,
                    }),
                    ..row(vec![tall_cell(3)])
                },
                TableRow {
                    height: Some(RowHeight {
                        rule: HeightRule::AtLeast,
                        value: 1440,
                    }),
                    ..row(vec![tall_cell(1)])
                },
                row(vec![TableCell::default()]),
            ],
            ..Table::default()
        };
        let placed = place(&table, 300.0);
        let heights: Vec<f32> = placed.table.rows.iter().map(|r| r.rect.height).collect();
        assert_eq!(heights, vec![20.0, 96.0, 14.0]);
        assert_eq!(placed.table.rect.height, 130.0);
        assert_eq!(placed.table.rect.x, 10.0);
    }

    #[test]
    fn merged_cell_content_grows_its_last_row() {
        let mut restart = tall_cell(4);
        restart.vertical_merge = Some(VerticalMerge::Restart);
        let mut cont = TableCell::default();
        cont.vertical_merge = Some(VerticalMerge::Continue);
        let table = Table {
            rows: vec![
                row(vec![restart, tall_cell(1)]),
                row(vec![cont, tall_cell(1)]),
            ],
            ..Table::default()
        };
        let placed = place(&table, 300.0);
        assert_eq!(placed.table.rows[0].rect.height, 20.0);
        assert_eq!(placed.table.rows[1].rect.height, 60.0);
        assert_eq!(placed.break_after, vec![false, true]);
        let merged = &placed.table.rows[0].cells[0];
        assert_eq!(merged.rect.height, 80.0);
    }

    #[test]
    fn cell_content_is_padded_and_centered() {
        let mut cell = tall_cell(1);
        cell.vertical_alignment = CellVerticalAlignment::Center;
        let table = Table {
            rows: vec![row(vec![cell, tall_cell(3)])],
            ..Table::default()
        };
        let placed = place(&table, 300.0);
        let cell = &placed.table.rows[0].cells[0];
        assert_eq!(cell.content_rect.x, 10.0 + 7.2);
        let block = cell.blocks[0].rect();
        assert_eq!(block.y, 100.0 + 20.0);
        assert_eq!(block.x, cell.content_rect.x);
    }

    #[test]
    fn split_repeats_header_rows() {
        let mut rows = vec![TableRow {
            header: true,
            ..row(vec![tall_cell(1)])
        }];
        rows.extend((0..5).map(|_| row(vec![tall_cell(1)])));
        let table = Table {
            rows,
            ..Table::default()
        };
        let placed = place(&table, 300.0);
        assert_eq!(placed.header_rows, 1);
        let TableSplit::Split { head, rest } = placed.split(170.0, false) else {
            panic!("table should split");
        };
        assert_eq!(head.rows.len(), 3);
        assert!(head.continues);
        assert_eq!(rest.table.rows.len(), 4);
        assert!(rest.table.rows[0].repeated);
        assert_eq!(rest.table.rows[0].rect.y, 100.0);
        assert_eq!(rest.table.rows[1].index, 3);
        assert_eq!(rest.table.rect.height, 80.0);
    }

    #[test]
    fn header_alone_does_not_fit() {
        let table = Table {
            rows: vec![
                TableRow {
                    header: true,
                    ..row(vec![tall_cell(1)])
                },
                row(vec![tall_cell(1)]),
            ],
            ..Table::default()
        };
        let placed = place(&table, 300.0);
        assert!(matches!(placed.clone().split(125.0, false), TableSplit::NoFit(_)));
        assert!(matches!(placed.split(105.0, true), TableSplit::Whole(_)));
    }
}
