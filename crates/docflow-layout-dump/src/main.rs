//! Lay out a docflow JSON document and print the result.
//!
//! Usage:
//!   cargo run -p docflow-layout-dump -- [OPTIONS] <DOCUMENT.json>
//!
//! Prints one line per page (blocks, lines, header/footer, footnotes) or,
//! with `--json`, the whole page model. Set `RUST_LOG=debug` to see layout
//! decisions.

use std::path::PathBuf;
use std::time::Instant;

use docflow::Document;
use docflow_layout::{LayoutConfig, LayoutEngine, LayoutPage};

struct Options {
    path: PathBuf,
    json: bool,
    passes: usize,
    config: LayoutConfig,
}

fn print_usage() {
    eprintln!("Usage: docflow-layout-dump [OPTIONS] <DOCUMENT.json>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --json                  Print the page model as JSON");
    eprintln!("  --passes <N>            Run N layout passes (cache warm-up), default 1");
    eprintln!("  --no-hyphenation        Disable automatic hyphenation");
    eprintln!("  --no-widow-control      Allow single lines at page edges");
    eprintln!("  --greedy                Use greedy breaking for justified text");
    eprintln!("  --no-paragraph-cache    Break every paragraph on every pass");
}

fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut path = None;
    let mut json = false;
    let mut passes = 1usize;
    let mut config = LayoutConfig::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--json" => json = true,
            "--passes" => {
                i += 1;
                passes = args
                    .get(i)
                    .and_then(|v| v.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or_else(|| {
                        eprintln!("--passes needs a positive number");
                        std::process::exit(1);
                    });
            }
            "--no-hyphenation" => config.typography.hyphenation.enabled = false,
            "--no-widow-control" => config.typography.widow_orphan_control.enabled = false,
            "--greedy" => config.typography.justification.optimal = false,
            "--no-paragraph-cache" => config.paragraph_cache = false,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                std::process::exit(1);
            }
            other => path = Some(PathBuf::from(other)),
        }
        i += 1;
    }
    let Some(path) = path else {
        print_usage();
        std::process::exit(1);
    };
    Options {
        path,
        json,
        passes,
        config,
    }
}

fn summarize(page: &LayoutPage) -> String {
    let paragraphs = page.paragraphs();
    let lines: usize = paragraphs.iter().map(|p| p.lines.len()).sum();
    let notes = page.footnotes.as_ref().map_or(0, |a| a.notes.len());
    let mut out = format!(
        "page {:>3} section {} {:.0}x{:.0}: {} blocks, {} lines",
        page.number(),
        page.section,
        page.page_rect.width,
        page.page_rect.height,
        page.blocks.len(),
        lines,
    );
    if page.columns.len() > 1 {
        out.push_str(&format!(", {} columns", page.columns.len()));
    }
    if !page.floats.is_empty() {
        out.push_str(&format!(", {} floats", page.floats.len()));
    }
    if notes > 0 {
        out.push_str(&format!(", {} footnotes", notes));
    }
    if let Some(header) = &page.header {
        out.push_str(&format!(", header '{}'", header.part_id));
    }
    if let Some(footer) = &page.footer {
        out.push_str(&format!(", footer '{}'", footer.part_id));
    }
    out
}

fn main() {
    env_logger::init();
    let opts = parse_args();

    let bytes = match std::fs::read(&opts.path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("Failed to read {}: {}", opts.path.display(), err);
            std::process::exit(1);
        }
    };
    let doc = match Document::from_json_slice(&bytes) {
        Ok(doc) => doc,
        Err(err) => {
            eprintln!("Failed to load {}: {}", opts.path.display(), err);
            std::process::exit(1);
        }
    };

    let mut engine = LayoutEngine::with_estimated_metrics(opts.config);
    let mut result = None;
    for pass in 1..=opts.passes {
        let started = Instant::now();
        result = Some(engine.layout(&doc));
        log::info!("pass {} took {:?}", pass, started.elapsed());
    }
    let Some(result) = result else {
        std::process::exit(1);
    };

    if opts.json {
        match result.to_json_string() {
            Ok(json) => println!("{}", json),
            Err(err) => {
                eprintln!("Failed to encode page model: {}", err);
                std::process::exit(1);
            }
        }
        return;
    }

    for page in &result.pages {
        println!("{}", summarize(page));
    }
    let stats = engine.cache().stats();
    println!(
        "{} pages, version {}; paragraph cache {} hits / {} misses, text widths {} hits / {} misses",
        result.pages.len(),
        result.version,
        stats.paragraph_hits,
        stats.paragraph_misses,
        stats.text_hits,
        stats.text_misses,
    );
}
