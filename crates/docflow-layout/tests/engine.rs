mod common;

use common::*;
use docflow::{Block, NodeStamp, Paragraph};
use docflow_layout::{LayoutConfig, LayoutEngine, LayoutResult, SourceRegion};

/// Same paragraphs and lines at the same positions, up to float rounding.
fn assert_same_layout(a: &LayoutResult, b: &LayoutResult) {
    assert_eq!(a.pages.len(), b.pages.len());
    for (pa, pb) in a.pages.iter().zip(&b.pages) {
        let (xs, ys) = (pa.paragraphs(), pb.paragraphs());
        assert_eq!(xs.len(), ys.len());
        for (x, y) in xs.iter().zip(&ys) {
            assert_eq!(x.path, y.path);
            assert_eq!(line_text(x), line_text(y));
            assert_eq!(x.lines.len(), y.lines.len());
            for (lx, ly) in x.lines.iter().zip(&y.lines) {
                assert!((lx.rect.y - ly.rect.y).abs() < 0.01);
                assert!((lx.rect.x - ly.rect.x).abs() < 0.01);
            }
        }
    }
}

fn sample() -> docflow::Document {
    let mut blocks = filler(1, 20);
    blocks.push(para(100, &words(50)));
    doc(blocks)
}

#[test]
fn second_pass_reuses_cached_paragraphs() {
    let d = sample();
    let mut engine = LayoutEngine::with_estimated_metrics(LayoutConfig::default());
    let first = engine.layout(&d);
    let misses = engine.cache().stats().paragraph_misses;
    assert!(misses >= 21);
    let second = engine.layout(&d);
    let stats = engine.cache().stats();
    assert!(stats.paragraph_hits >= 21, "{stats:?}");
    assert_eq!(stats.paragraph_misses, misses);
    assert_same_layout(&first, &second);
    assert_eq!((first.version, second.version), (1, 2));
    assert_eq!(engine.version(), 2);
}

#[test]
fn bumped_generation_relays_only_that_paragraph() {
    let mut d = sample();
    let mut engine = LayoutEngine::with_estimated_metrics(LayoutConfig::default());
    engine.layout(&d);
    let before = engine.cache().stats();
    if let Block::Paragraph(p) = &mut d.body.sections[0].blocks[3] {
        *p = Paragraph::from_text(p.stamp.bumped(), "Edited filler line");
    }
    let result = engine.layout(&d);
    let after = engine.cache().stats();
    assert_eq!(after.paragraph_misses - before.paragraph_misses, 1);
    let edited = parts_of(&result, &[0, 3]);
    assert_eq!(line_text(edited[0].1).split_whitespace().collect::<String>(), "Editedfillerline");
}

#[test]
fn moved_paragraph_keeps_its_cached_lines_under_the_new_path() {
    let mut d = sample();
    let mut engine = LayoutEngine::with_estimated_metrics(LayoutConfig::default());
    engine.layout(&d);
    d.body.sections[0]
        .blocks
        .insert(0, Block::Paragraph(Paragraph::from_text(NodeStamp::new(999, 0), "New")));
    let result = engine.layout(&d);
    let moved = parts_of(&result, &[0, 21]);
    assert_eq!(moved.len(), 1);
    for frag in moved[0].1.lines.iter().flat_map(|l| l.fragments.iter()) {
        assert_eq!(&frag.source.path[..2], &[0, 21]);
    }
}

#[test]
fn changing_config_drops_the_cache() {
    let d = sample();
    let mut engine = LayoutEngine::with_estimated_metrics(LayoutConfig::default());
    engine.layout(&d);
    assert!(engine.cache().block_height_len() > 0);
    let mut cfg = *engine.config();
    cfg.typography.hyphenation.enabled = !cfg.typography.hyphenation.enabled;
    engine.set_config(cfg);
    assert_eq!(engine.cache().block_height_len(), 0);
    assert_eq!(engine.cache().text_width_len(), 0);
}

#[test]
fn disabled_paragraph_cache_never_hits() {
    let d = sample();
    let cfg = LayoutConfig {
        paragraph_cache: false,
        ..LayoutConfig::default()
    };
    let mut engine = LayoutEngine::with_estimated_metrics(cfg);
    let first = engine.layout(&d);
    let second = engine.layout(&d);
    assert_eq!(engine.cache().stats().paragraph_hits, 0);
    assert_eq!(first.pages, second.pages);
}

#[test]
fn block_heights_survive_export_and_import() {
    let d = sample();
    let mut engine = LayoutEngine::with_estimated_metrics(LayoutConfig::default());
    engine.layout(&d);
    let bytes = engine.cache().export_block_heights().unwrap();
    let mut fresh = LayoutEngine::with_estimated_metrics(LayoutConfig::default());
    let imported = fresh.cache_mut().import_block_heights(&bytes).unwrap();
    assert_eq!(imported, engine.cache().block_height_len());
}

#[test]
fn hit_test_maps_points_back_to_runs() {
    let d = doc(vec![para(1, "Hello world"), para(2, "Second paragraph")]);
    let result = layout(&d);
    let page = &result.pages[0];
    let second = page.paragraphs()[1];
    let frag = &second.lines[0].fragments[0];
    let hit = result
        .hit_test(0, frag.rect.x + 1.0, frag.rect.y + frag.rect.height / 2.0)
        .unwrap();
    assert_eq!(hit.region, SourceRegion::Body);
    assert_eq!(hit.path.as_slice(), &[0, 1, 0]);
    assert_eq!(hit.offset, 0);

    let end = result.hit_test(0, 2000.0, second.rect.y + 1.0).unwrap();
    assert_eq!(end.path.as_slice(), &[0, 1, 0]);
    assert_eq!(end.offset, "Second paragraph".chars().count());

    let below = result.hit_test(0, 100.0, 1000.0).unwrap();
    assert_eq!(below.path.as_slice()[..2], [0, 1]);
    assert!(result.hit_test(5, 0.0, 0.0).is_none());
}

#[test]
fn page_model_serializes_to_json() {
    let result = layout(&sample());
    let json = result.to_json_string().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["version"], 1);
    assert_eq!(value["pages"][0]["blocks"][0]["type"], "paragraph");
    let back: LayoutResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.pages.len(), result.pages.len());
}
