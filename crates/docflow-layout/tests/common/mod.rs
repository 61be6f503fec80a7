#![allow(dead_code)]

use docflow::{
    Block, Document, Field, FieldKind, HeaderFooter, Inline, NodeStamp, Note, NoteRef, Paragraph,
    ParagraphProperties, Run, Section, SectionProperties,
};
use docflow_layout::{LayoutConfig, LayoutEngine, LayoutPage, LayoutParagraph, LayoutResult};

pub fn para(id: u64, text: &str) -> Block {
    Block::Paragraph(Paragraph::from_text(NodeStamp::new(id, 0), text))
}

pub fn para_with(id: u64, text: &str, properties: ParagraphProperties) -> Block {
    Block::Paragraph(Paragraph::from_text(NodeStamp::new(id, 0), text).with_properties(properties))
}

pub fn para_inlines(id: u64, children: Vec<Inline>) -> Block {
    Block::Paragraph(Paragraph {
        stamp: NodeStamp::new(id, 0),
        properties: ParagraphProperties::default(),
        children,
    })
}

pub fn run(text: &str) -> Inline {
    Inline::Run(Run::plain(text))
}

pub fn field(kind: FieldKind, result: &str) -> Inline {
    Inline::Field(Field {
        kind,
        result: result.to_string(),
        ..Field::default()
    })
}

pub fn footnote_ref(id: &str) -> Inline {
    Inline::FootnoteRef(NoteRef {
        id: id.to_string(),
        ..NoteRef::default()
    })
}

pub fn endnote_ref(id: &str) -> Inline {
    Inline::EndnoteRef(NoteRef {
        id: id.to_string(),
        ..NoteRef::default()
    })
}

pub fn note(id: u64, text: &str) -> Note {
    Note {
        stamp: NodeStamp::new(id, 0),
        blocks: vec![para(id + 1, text)],
    }
}

pub fn part(id: u64, blocks: Vec<Block>) -> HeaderFooter {
    HeaderFooter {
        stamp: NodeStamp::new(id, 0),
        blocks,
    }
}

/// `count` short one-line paragraphs with ids starting at `first_id`.
pub fn filler(first_id: u64, count: usize) -> Vec<Block> {
    (0..count)
        .map(|i| para(first_id + i as u64, &format!("Filler line {i}")))
        .collect()
}

/// Text long enough to wrap onto roughly `words / 12` lines at body width.
pub fn words(count: usize) -> String {
    (0..count)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn doc(blocks: Vec<Block>) -> Document {
    Document::from_blocks(SectionProperties::default(), blocks)
}

pub fn doc_sections(sections: Vec<(SectionProperties, Vec<Block>)>) -> Document {
    let mut doc = Document::default();
    for (i, (properties, blocks)) in sections.into_iter().enumerate() {
        doc.body.sections.push(Section {
            stamp: NodeStamp::new(10_000 + i as u64, 0),
            properties,
            blocks,
        });
    }
    doc
}

pub fn layout(doc: &Document) -> LayoutResult {
    LayoutEngine::with_estimated_metrics(LayoutConfig::default()).layout(doc)
}

/// Paragraph parts with the given body path across all pages, as
/// `(page index, part)`.
pub fn parts_of<'a>(result: &'a LayoutResult, path: &[u32]) -> Vec<(usize, &'a LayoutParagraph)> {
    let mut out = Vec::new();
    for page in &result.pages {
        for p in page.paragraphs() {
            if p.path.as_slice() == path {
                out.push((page.index, p));
            }
        }
    }
    out
}

pub fn region_text(page: &LayoutPage, footer: bool) -> String {
    let region = if footer { &page.footer } else { &page.header };
    let mut out = String::new();
    if let Some(region) = region {
        for block in &region.blocks {
            block.for_each_paragraph(&mut |p| {
                for line in &p.lines {
                    for frag in &line.fragments {
                        out.push_str(&frag.text);
                    }
                }
            });
        }
    }
    out
}

pub fn line_text(p: &LayoutParagraph) -> String {
    p.lines
        .iter()
        .flat_map(|l| l.fragments.iter())
        .map(|f| f.text.as_str())
        .collect()
}
