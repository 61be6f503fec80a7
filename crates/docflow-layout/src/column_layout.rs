//! Multi-column regions and block distribution.

use crate::float_layout::FloatingItem;
use crate::layout_ir::{LayoutBlock, Rect};

/// A block measured in a column-wide virtual stream.
///
/// The block's rectangle is relative to the item top at x = 0; `height` is
/// the vertical advance including paragraph spacing.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnItem {
    pub block: LayoutBlock,
    pub height: f32,
    /// Anchored pictures positioned once the item lands on a page.
    pub anchors: Vec<FloatingItem>,
}

impl ColumnItem {
    pub fn new(block: LayoutBlock, height: f32) -> Self {
        Self {
            block,
            height,
            anchors: Vec::new(),
        }
    }
}

/// Items placed into columns plus the items that did not fit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnDistribution {
    /// Placed items, blocks moved to page coordinates.
    pub placed: Vec<ColumnItem>,
    /// Unplaced items, still relative to y = 0.
    pub overflow: Vec<ColumnItem>,
    /// Bottom of the content in each column.
    pub column_bottoms: Vec<f32>,
}

/// Split `content` into `count` side-by-side columns separated by `gap`.
pub fn compute_columns(content: Rect, count: usize, gap: f32) -> Vec<Rect> {
    let count = count.max(1);
    let gap = gap.max(0.0);
    let width = ((content.width - gap * (count - 1) as f32) / count as f32).max(0.0);
    (0..count)
        .map(|i| {
            Rect::new(
                content.x + i as f32 * (width + gap),
                content.y,
                width,
                content.height,
            )
        })
        .collect()
}

/// Column index and top for each item that fits, in order.
///
/// Columns fill in order; every column takes at least one item even when it
/// is taller than the column. The returned prefix stops at the first item
/// that finds no column.
pub fn plan_columns(heights: &[f32], columns: &[Rect]) -> Vec<(usize, f32)> {
    let mut plan = Vec::with_capacity(heights.len());
    let Some(first) = columns.first() else {
        return plan;
    };
    let mut col = 0usize;
    let mut cursor = first.y;
    let mut in_column = 0usize;
    for &height in heights {
        let Some(rect) = columns.get(col) else {
            break;
        };
        if in_column > 0 && cursor + height > rect.bottom() {
            col += 1;
            in_column = 0;
            match columns.get(col) {
                Some(next) => cursor = next.y,
                None => break,
            }
        }
        plan.push((col, cursor));
        cursor += height;
        in_column += 1;
    }
    plan
}

/// Move items into columns per [`plan_columns`]; the rest overflows.
pub fn distribute_blocks(items: Vec<ColumnItem>, columns: &[Rect]) -> ColumnDistribution {
    let heights: Vec<f32> = items.iter().map(|item| item.height).collect();
    let plan = plan_columns(&heights, columns);
    let mut out = ColumnDistribution {
        column_bottoms: columns.iter().map(|c| c.y).collect(),
        ..ColumnDistribution::default()
    };
    let mut items = items.into_iter();
    for (&(col, top), mut item) in plan.iter().zip(items.by_ref()) {
        let x = columns.get(col).map_or(0.0, |c| c.x);
        item.block.translate(x, top);
        if let Some(bottom) = out.column_bottoms.get_mut(col) {
            *bottom = top + item.height;
        }
        out.placed.push(item);
    }
    out.overflow.extend(items);
    log::trace!(
        "distributed {} blocks into {} columns, {} overflow",
        out.placed.len(),
        columns.len(),
        out.overflow.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_ir::LayoutParagraph;

    fn item(height: f32) -> ColumnItem {
        ColumnItem::new(
            LayoutBlock::Paragraph(LayoutParagraph {
                rect: Rect::new(0.0, 0.0, 100.0, height),
                ..LayoutParagraph::default()
            }),
            height,
        )
    }

    #[test]
    fn columns_share_width_after_gaps() {
        let cols = compute_columns(Rect::new(96.0, 96.0, 624.0, 800.0), 3, 48.0);
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0].width, 176.0);
        assert_eq!(cols[1].x, 96.0 + 224.0);
        assert_eq!(cols[2].right(), 720.0);
        assert_eq!(compute_columns(Rect::new(0.0, 0.0, 100.0, 10.0), 0, 5.0).len(), 1);
    }

    #[test]
    fn blocks_fill_columns_in_order_and_overflow() {
        let cols = compute_columns(Rect::new(0.0, 10.0, 210.0, 100.0), 2, 10.0);
        let items = vec![item(60.0), item(30.0), item(50.0), item(40.0), item(70.0)];
        let dist = distribute_blocks(items, &cols);
        let rects: Vec<Rect> = dist.placed.iter().map(|i| i.block.rect()).collect();
        assert_eq!(rects.len(), 4);
        assert_eq!((rects[1].x, rects[1].y), (0.0, 70.0));
        assert_eq!((rects[2].x, rects[2].y), (110.0, 10.0));
        assert_eq!(rects[3].y, 60.0);
        assert_eq!(dist.column_bottoms, vec![100.0, 100.0]);
        assert_eq!(dist.overflow.len(), 1);
        assert_eq!(dist.overflow[0].block.rect().y, 0.0);
    }

    #[test]
    fn oversized_block_still_takes_a_column() {
        let cols = compute_columns(Rect::new(0.0, 0.0, 200.0, 50.0), 2, 0.0);
        let plan = plan_columns(&[80.0, 80.0, 10.0], &cols);
        assert_eq!(plan, vec![(0, 0.0), (1, 0.0)]);
        let dist = distribute_blocks(vec![item(80.0), item(80.0), item(10.0)], &cols);
        assert_eq!(dist.placed.len(), 2);
        assert_eq!(dist.placed[1].block.rect().x, 100.0);
        assert_eq!(dist.overflow.len(), 1);
    }

    #[test]
    fn no_columns_means_everything_overflows() {
        let dist = distribute_blocks(vec![item(10.0)], &[]);
        assert!(dist.placed.is_empty());
        assert_eq!(dist.overflow.len(), 1);
    }
}
