//! Page layout for `docflow` documents.
//!
//! [`LayoutEngine`] turns a [`docflow::Document`] into positioned pages:
//! styles are resolved through the registries, runs are measured with a
//! [`GlyphMetrics`] service, paragraphs are broken into bidi-ordered lines
//! (greedy or Knuth–Plass), and lines, tables, columns, floats, headers,
//! footers and footnotes are flowed onto pages.
//!
//! ```
//! use docflow::{Block, Document, NodeStamp, Paragraph, SectionProperties};
//! use docflow_layout::{LayoutConfig, LayoutEngine};
//!
//! let doc = Document::from_blocks(
//!     SectionProperties::default(),
//!     vec![Block::Paragraph(Paragraph::from_text(NodeStamp::new(1, 0), "Hello"))],
//! );
//! let mut engine = LayoutEngine::with_estimated_metrics(LayoutConfig::default());
//! let result = engine.layout(&doc);
//! assert_eq!(result.pages.len(), 1);
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod bidi;
pub mod cache;
pub mod column_layout;
pub mod config;
pub mod float_layout;
pub mod hyphenation;
pub mod knuth_plass;
pub mod layout_ir;
pub mod line_break;
pub mod list_numbering;
pub mod metrics;
mod pagination;
pub mod style;
pub mod table_layout;

pub use cache::{CacheError, CacheStats, LayoutCache};
pub use config::{
    HyphenationConfig, JustificationConfig, LayoutConfig, TypographyConfig, WidowOrphanControl,
};
pub use hit_test::HitTestResult;
pub use layout_ir::{
    FragmentKind, LayoutBlock, LayoutFootnoteArea, LayoutFragment, LayoutLine, LayoutNote,
    LayoutPage, LayoutParagraph, LayoutRegion, LayoutResult, LayoutShape, LayoutTable,
    LayoutTableCell, LayoutTableRow, NodePath, PositionedFloat, Rect, SourceRef, SourceRegion,
};
#[cfg(feature = "ttf")]
pub use metrics::FontFaceMetrics;
pub use metrics::{EstimatedMetrics, FontMetrics, GlyphMetrics, TextSize};
pub use pagination::{split_point, LayoutEngine};
pub use style::{ResolvedParagraphStyle, ResolvedRunStyle, StyleResolver};
