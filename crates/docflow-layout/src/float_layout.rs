//! Floating picture placement and text exclusion.

use docflow::units::emu_to_px;
use docflow::{
    Anchor, DrawingPlacement, HorizontalAlign, HorizontalRelative, ImageRef, Inline, Paragraph,
    VerticalAlignment, VerticalRelative, WrapMode, WrapSide,
};

use crate::layout_ir::{NodePath, PositionedFloat, Rect};

/// An anchored picture before its position is known.
#[derive(Clone, Debug, PartialEq)]
pub struct FloatingItem {
    /// Path of the drawing inline.
    pub path: NodePath,
    pub width: f32,
    pub height: f32,
    pub anchor: Anchor,
    pub image: ImageRef,
}

/// Frames an anchor can be relative to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorFrame {
    pub page: Rect,
    /// Area inside the page margins.
    pub margin: Rect,
    /// Top of the anchor paragraph.
    pub paragraph_y: f32,
    /// 1-based page number; odd pages have their inside edge on the left.
    pub page_number: usize,
}

/// Anchored pictures of a paragraph, in document order.
///
/// Drawings without a picture are skipped.
pub fn collect_floats(paragraph: &Paragraph, paragraph_path: &[u32]) -> Vec<FloatingItem> {
    let mut out = Vec::new();
    for (idx, inline) in paragraph.children.iter().enumerate() {
        let Inline::Drawing(drawing) = inline else {
            continue;
        };
        let DrawingPlacement::Anchored(anchor) = drawing.placement else {
            continue;
        };
        let mut path: NodePath = paragraph_path.iter().copied().collect();
        path.push(idx as u32);
        let Some(image) = drawing.image.clone() else {
            log::debug!("anchored drawing at {:?} has no picture; skipped", path);
            continue;
        };
        out.push(FloatingItem {
            path,
            width: emu_to_px(drawing.extent.cx).max(0.0),
            height: emu_to_px(drawing.extent.cy).max(0.0),
            anchor,
            image,
        });
    }
    out
}

/// Resolve anchors and alignment, clamping every float into the page.
pub fn position_floats(items: &[FloatingItem], frame: &AnchorFrame) -> Vec<PositionedFloat> {
    items
        .iter()
        .map(|item| {
            let x = horizontal_position(item, frame);
            let y = vertical_position(item, frame);
            let d = item.anchor.distance;
            PositionedFloat {
                path: item.path.clone(),
                rect: Rect::new(
                    clamp_start(x, item.width, frame.page.x, frame.page.right()),
                    clamp_start(y, item.height, frame.page.y, frame.page.bottom()),
                    item.width,
                    item.height,
                ),
                wrap: item.anchor.wrap,
                wrap_side: item.anchor.wrap_side,
                distance: [
                    emu_to_px(d.left),
                    emu_to_px(d.top),
                    emu_to_px(d.right),
                    emu_to_px(d.bottom),
                ],
                image: item.image.clone(),
            }
        })
        .collect()
}

fn clamp_start(start: f32, size: f32, min: f32, max: f32) -> f32 {
    start.min(max - size).max(min)
}

fn horizontal_position(item: &FloatingItem, frame: &AnchorFrame) -> f32 {
    let pos = item.anchor.horizontal;
    let base = match pos.relative_from {
        HorizontalRelative::Page => frame.page,
        HorizontalRelative::Margin | HorizontalRelative::Column | HorizontalRelative::Character => {
            frame.margin
        }
    };
    let odd_page = frame.page_number % 2 == 1;
    match pos.align {
        Some(HorizontalAlign::Left) => base.x,
        Some(HorizontalAlign::Center) => base.x + (base.width - item.width) / 2.0,
        Some(HorizontalAlign::Right) => base.right() - item.width,
        Some(HorizontalAlign::Inside) if odd_page => base.x,
        Some(HorizontalAlign::Inside) => base.right() - item.width,
        Some(HorizontalAlign::Outside) if odd_page => base.right() - item.width,
        Some(HorizontalAlign::Outside) => base.x,
        None => base.x + emu_to_px(pos.offset),
    }
}

fn vertical_position(item: &FloatingItem, frame: &AnchorFrame) -> f32 {
    let pos = item.anchor.vertical;
    let (top, height) = match pos.relative_from {
        VerticalRelative::Page => (frame.page.y, frame.page.height),
        VerticalRelative::Margin => (frame.margin.y, frame.margin.height),
        VerticalRelative::Paragraph | VerticalRelative::Line => (
            frame.paragraph_y,
            (frame.margin.bottom() - frame.paragraph_y).max(0.0),
        ),
    };
    match pos.align {
        Some(VerticalAlignment::Top | VerticalAlignment::Inside) => top,
        Some(VerticalAlignment::Center) => top + (height - item.height) / 2.0,
        Some(VerticalAlignment::Bottom | VerticalAlignment::Outside) => top + height - item.height,
        None => top + emu_to_px(pos.offset),
    }
}

/// Horizontal bounds left for a line after float exclusions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineExclusion {
    pub left: f32,
    pub right: f32,
    /// A top-and-bottom float blocks the line down to this y.
    pub blocked_until: Option<f32>,
}

/// Narrow `[left, right]` for a line spanning `top..top + height`.
///
/// Side `both` (and `largest`) keeps whichever side of the float has more
/// room, decided for this line alone.
pub fn line_exclusion(
    floats: &[PositionedFloat],
    top: f32,
    height: f32,
    left: f32,
    right: f32,
) -> LineExclusion {
    let mut ex = LineExclusion {
        left,
        right,
        blocked_until: None,
    };
    for float in floats {
        if float.wrap == WrapMode::None {
            continue;
        }
        let zone = float.exclusion_rect();
        if top >= zone.bottom() || top + height <= zone.y {
            continue;
        }
        if zone.right() <= ex.left || zone.x >= ex.right {
            continue;
        }
        if float.wrap == WrapMode::TopAndBottom {
            let bottom = ex.blocked_until.map_or(zone.bottom(), |b| b.max(zone.bottom()));
            ex.blocked_until = Some(bottom);
            continue;
        }
        match float.wrap_side {
            WrapSide::Left => ex.right = ex.right.min(zone.x),
            WrapSide::Right => ex.left = ex.left.max(zone.right()),
            WrapSide::Both | WrapSide::Largest => {
                let left_room = zone.x - ex.left;
                let right_room = ex.right - zone.right();
                if right_room > left_room {
                    ex.left = zone.right();
                } else {
                    ex.right = zone.x;
                }
            }
        }
    }
    if ex.right < ex.left {
        ex.right = ex.left;
    }
    ex
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow::{HorizontalPosition, VerticalPosition, WrapDistance};

    fn frame() -> AnchorFrame {
        AnchorFrame {
            page: Rect::new(0.0, 0.0, 816.0, 1056.0),
            margin: Rect::new(96.0, 96.0, 624.0, 864.0),
            paragraph_y: 300.0,
            page_number: 1,
        }
    }

    fn item(anchor: Anchor) -> FloatingItem {
        FloatingItem {
            path: NodePath::from_slice(&[0, 0, 1]),
            width: 100.0,
            height: 50.0,
            anchor,
            image: ImageRef::default(),
        }
    }

    fn float_at(rect: Rect, wrap: WrapMode, wrap_side: WrapSide) -> PositionedFloat {
        PositionedFloat {
            path: NodePath::new(),
            rect,
            wrap,
            wrap_side,
            distance: [0.0; 4],
            image: ImageRef::default(),
        }
    }

    #[test]
    fn margin_relative_zero_offset_lands_on_content_origin() {
        let anchor = Anchor {
            horizontal: HorizontalPosition {
                relative_from: HorizontalRelative::Margin,
                align: None,
                offset: 0,
            },
            vertical: VerticalPosition {
                relative_from: VerticalRelative::Margin,
                align: None,
                offset: 0,
            },
            ..Anchor::default()
        };
        let placed = position_floats(&[item(anchor)], &frame());
        assert_eq!(placed[0].rect.x, 96.0);
        assert_eq!(placed[0].rect.y, 96.0);
    }

    #[test]
    fn alignment_and_paragraph_anchor() {
        let anchor = Anchor {
            horizontal: HorizontalPosition {
                relative_from: HorizontalRelative::Margin,
                align: Some(HorizontalAlign::Right),
                offset: 0,
            },
            vertical: VerticalPosition {
                relative_from: VerticalRelative::Paragraph,
                align: None,
                offset: 914_400 / 4,
            },
            distance: WrapDistance {
                left: 914_400 / 8,
                ..WrapDistance::default()
            },
            ..Anchor::default()
        };
        let placed = position_floats(&[item(anchor)], &frame());
        assert_eq!(placed[0].rect.x, 720.0 - 100.0);
        assert_eq!(placed[0].rect.y, 324.0);
        assert_eq!(placed[0].distance[0], 12.0);
    }

    #[test]
    fn inside_edge_depends_on_page_parity() {
        let anchor = Anchor {
            horizontal: HorizontalPosition {
                relative_from: HorizontalRelative::Page,
                align: Some(HorizontalAlign::Inside),
                offset: 0,
            },
            ..Anchor::default()
        };
        let odd = position_floats(&[item(anchor)], &frame());
        let even = position_floats(
            &[item(anchor)],
            &AnchorFrame {
                page_number: 2,
                ..frame()
            },
        );
        assert_eq!(odd[0].rect.x, 0.0);
        assert_eq!(even[0].rect.x, 716.0);
    }

    #[test]
    fn offsets_are_clamped_into_the_page() {
        let anchor = Anchor {
            horizontal: HorizontalPosition {
                relative_from: HorizontalRelative::Page,
                align: None,
                offset: 914_400 * 20,
            },
            vertical: VerticalPosition {
                relative_from: VerticalRelative::Page,
                align: None,
                offset: -914_400,
            },
            ..Anchor::default()
        };
        let placed = position_floats(&[item(anchor)], &frame());
        assert_eq!(placed[0].rect.right(), 816.0);
        assert_eq!(placed[0].rect.y, 0.0);
    }

    #[test]
    fn both_side_keeps_the_wider_gap_per_line() {
        let floats = [float_at(
            Rect::new(150.0, 0.0, 100.0, 40.0),
            WrapMode::Square,
            WrapSide::Both,
        )];
        let ex = line_exclusion(&floats, 10.0, 16.0, 0.0, 600.0);
        assert_eq!((ex.left, ex.right), (250.0, 600.0));
        let ex = line_exclusion(&floats, 10.0, 16.0, 0.0, 300.0);
        assert_eq!((ex.left, ex.right), (0.0, 150.0));
        let clear = line_exclusion(&floats, 40.0, 16.0, 0.0, 600.0);
        assert_eq!((clear.left, clear.right), (0.0, 600.0));
    }

    #[test]
    fn top_and_bottom_blocks_and_none_is_ignored() {
        let floats = [
            float_at(Rect::new(100.0, 0.0, 50.0, 80.0), WrapMode::TopAndBottom, WrapSide::Both),
            float_at(Rect::new(0.0, 0.0, 600.0, 500.0), WrapMode::None, WrapSide::Both),
        ];
        let ex = line_exclusion(&floats, 20.0, 16.0, 0.0, 600.0);
        assert_eq!(ex.blocked_until, Some(80.0));
        assert_eq!((ex.left, ex.right), (0.0, 600.0));
    }
}
