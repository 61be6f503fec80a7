//! Document model for the `docflow` layout engine.
//!
//! This crate holds the input contract of layout: an immutable document tree
//! ([`Document`]), the style and numbering registries that resolve named
//! properties, and the unit conversions from source units to pixels. Layout
//! itself lives in the `docflow-layout` crate.
//!
//! ```
//! use docflow::{Block, Document, NodeStamp, Paragraph, SectionProperties};
//!
//! let doc = Document::from_blocks(
//!     SectionProperties::default(),
//!     vec![Block::Paragraph(Paragraph::from_text(NodeStamp::new(1, 0), "Hello"))],
//! );
//! assert!(doc.validate().is_ok());
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

pub mod error;
pub mod model;
pub mod numbering;
pub mod styles;
pub mod units;

pub use error::DocumentError;
pub use model::{
    Alignment, Anchor, Block, Body, Bookmark, CellMargins, CellVerticalAlignment,
    ColumnSettings, Document, Drawing, DrawingPlacement, Equation, Extent, Field, FieldKind,
    HeaderFooter, HeightRule, HorizontalAlign, HorizontalPosition, HorizontalRelative, Hyperlink,
    ImageRef, Inline, LineSpacing, Mention, NodeStamp, Note, NoteRef, NumberingRef, Orientation,
    PageMargins, Paragraph, ParagraphProperties, RowHeight, Run, RunChild, RunProperties, Section,
    SectionProperties, Shape, Table, TableCell, TableProperties, TableRow, TableWidth,
    TextDirection, UnderlineStyle, VerticalAlign, VerticalAlignment, VerticalMerge,
    VerticalPosition, VerticalRelative, WrapDistance, WrapMode, WrapSide,
};
pub use numbering::{LevelDefinition, ListDefinition, NumberFormat, NumberingRegistry};
pub use styles::{CharacterStyle, DocDefaults, ParagraphStyle, StyleRegistry};
