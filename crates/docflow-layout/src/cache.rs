//! Identity-keyed layout cache.
//!
//! Block heights and laid-out paragraphs are keyed by node id and layout
//! width and tagged with the node generation; a generation mismatch on lookup
//! drops the entry. Text widths live in a bounded map that evicts the least
//! recently used tenth when full.

use core::fmt;
use docflow::NodeStamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::layout_ir::{LayoutLine, NodePath};

const SNAPSHOT_VERSION: u8 = 1;

/// Width quantized to 1/100 px so float noise does not split entries.
fn width_key(width: f32) -> i32 {
    (width * 100.0).round() as i32
}

/// Errors from cache snapshot import/export.
#[derive(Debug)]
pub enum CacheError {
    /// Snapshot serialization failed.
    Encode(postcard::Error),
    /// Snapshot bytes could not be decoded.
    Decode(postcard::Error),
    /// Snapshot was written by an incompatible version.
    UnsupportedVersion(u8),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(err) => write!(f, "cache snapshot encode failed: {}", err),
            Self::Decode(err) => write!(f, "cache snapshot decode failed: {}", err),
            Self::UnsupportedVersion(v) => {
                write!(f, "unsupported cache snapshot version: {}", v)
            }
        }
    }
}

impl std::error::Error for CacheError {}

#[derive(Clone, Copy, Debug)]
struct HeightEntry {
    generation: u32,
    height: f32,
}

/// A paragraph laid out at a given width, lines relative to (0, 0).
#[derive(Clone, Debug, PartialEq)]
pub struct CachedParagraph {
    pub path: NodePath,
    /// List marker text the layout was produced with.
    pub marker: Option<String>,
    pub lines: Arc<Vec<LayoutLine>>,
    pub height: f32,
}

#[derive(Clone, Debug)]
struct ParagraphEntry {
    generation: u32,
    paragraph: CachedParagraph,
}

/// Hit/miss counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub block_hits: u64,
    pub block_misses: u64,
    pub paragraph_hits: u64,
    pub paragraph_misses: u64,
    pub text_hits: u64,
    pub text_misses: u64,
    pub text_evictions: u64,
}

#[derive(Serialize, Deserialize)]
struct HeightSnapshot {
    version: u8,
    entries: Vec<HeightSnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct HeightSnapshotEntry {
    id: u64,
    generation: u32,
    width_key: i32,
    height: f32,
}

/// Cache owned by a layout engine and reused across passes.
#[derive(Debug)]
pub struct LayoutCache {
    heights: HashMap<(u64, i32), HeightEntry>,
    paragraphs: HashMap<(u64, i32), ParagraphEntry>,
    text_widths: HashMap<String, (f32, u64)>,
    text_capacity: usize,
    tick: u64,
    stats: CacheStats,
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl LayoutCache {
    /// Cache holding at most `text_capacity` text widths.
    pub fn new(text_capacity: usize) -> Self {
        Self {
            heights: HashMap::new(),
            paragraphs: HashMap::new(),
            text_widths: HashMap::new(),
            text_capacity: text_capacity.max(1),
            tick: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Height of the block laid out at `width`, if the stamp still matches.
    pub fn get_cached_block_height(&mut self, stamp: NodeStamp, width: f32) -> Option<f32> {
        if !stamp.is_stamped() {
            return None;
        }
        let key = (stamp.id, width_key(width));
        match self.heights.get(&key) {
            Some(entry) if entry.generation == stamp.generation => {
                self.stats.block_hits += 1;
                Some(entry.height)
            }
            Some(_) => {
                self.heights.remove(&key);
                self.stats.block_misses += 1;
                None
            }
            None => {
                self.stats.block_misses += 1;
                None
            }
        }
    }

    pub fn set_cached_block_height(&mut self, stamp: NodeStamp, width: f32, height: f32) {
        if !stamp.is_stamped() {
            return;
        }
        self.heights.insert(
            (stamp.id, width_key(width)),
            HeightEntry {
                generation: stamp.generation,
                height,
            },
        );
    }

    /// Laid-out paragraph, if stamp and marker text still match.
    pub fn get_cached_paragraph(
        &mut self,
        stamp: NodeStamp,
        width: f32,
        marker: Option<&str>,
    ) -> Option<CachedParagraph> {
        if !stamp.is_stamped() {
            return None;
        }
        let key = (stamp.id, width_key(width));
        let Some(entry) = self.paragraphs.get(&key) else {
            self.stats.paragraph_misses += 1;
            return None;
        };
        if entry.generation != stamp.generation {
            self.paragraphs.remove(&key);
            self.stats.paragraph_misses += 1;
            return None;
        }
        if entry.paragraph.marker.as_deref() != marker {
            self.stats.paragraph_misses += 1;
            return None;
        }
        self.stats.paragraph_hits += 1;
        Some(entry.paragraph.clone())
    }

    pub fn set_cached_paragraph(&mut self, stamp: NodeStamp, width: f32, paragraph: CachedParagraph) {
        if !stamp.is_stamped() {
            return;
        }
        self.paragraphs.insert(
            (stamp.id, width_key(width)),
            ParagraphEntry {
                generation: stamp.generation,
                paragraph,
            },
        );
    }

    /// Cached text width; refreshes the entry's recency.
    pub fn get_cached_text_width(&mut self, key: &str) -> Option<f32> {
        self.tick += 1;
        let tick = self.tick;
        match self.text_widths.get_mut(key) {
            Some(entry) => {
                entry.1 = tick;
                self.stats.text_hits += 1;
                Some(entry.0)
            }
            None => {
                self.stats.text_misses += 1;
                None
            }
        }
    }

    pub fn set_cached_text_width(&mut self, key: String, width: f32) {
        if self.text_widths.len() >= self.text_capacity && !self.text_widths.contains_key(&key) {
            self.evict_oldest_text_widths();
        }
        self.tick += 1;
        self.text_widths.insert(key, (width, self.tick));
    }

    fn evict_oldest_text_widths(&mut self) {
        let evict = (self.text_widths.len() / 10).max(1);
        let mut ticks: Vec<u64> = self.text_widths.values().map(|(_, t)| *t).collect();
        ticks.sort_unstable();
        let Some(&cutoff) = ticks.get(evict - 1) else {
            return;
        };
        let before = self.text_widths.len();
        self.text_widths.retain(|_, (_, t)| *t > cutoff);
        self.stats.text_evictions += (before - self.text_widths.len()) as u64;
    }

    pub fn text_width_len(&self) -> usize {
        self.text_widths.len()
    }

    pub fn block_height_len(&self) -> usize {
        self.heights.len()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.heights.clear();
        self.paragraphs.clear();
        self.text_widths.clear();
        self.tick = 0;
    }

    /// Encode the block height table as a compact snapshot.
    pub fn export_block_heights(&self) -> Result<Vec<u8>, CacheError> {
        let mut entries: Vec<HeightSnapshotEntry> = self
            .heights
            .iter()
            .map(|(&(id, width_key), entry)| HeightSnapshotEntry {
                id,
                generation: entry.generation,
                width_key,
                height: entry.height,
            })
            .collect();
        entries.sort_by_key(|e| (e.id, e.width_key));
        postcard::to_allocvec(&HeightSnapshot {
            version: SNAPSHOT_VERSION,
            entries,
        })
        .map_err(CacheError::Encode)
    }

    /// Merge a snapshot into the height table; returns the entry count.
    pub fn import_block_heights(&mut self, bytes: &[u8]) -> Result<usize, CacheError> {
        let snapshot: HeightSnapshot = postcard::from_bytes(bytes).map_err(CacheError::Decode)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CacheError::UnsupportedVersion(snapshot.version));
        }
        let count = snapshot.entries.len();
        for entry in snapshot.entries {
            self.heights.insert(
                (entry.id, entry.width_key),
                HeightEntry {
                    generation: entry.generation,
                    height: entry.height,
                },
            );
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_generation_misses_and_drops_entry() {
        let mut cache = LayoutCache::default();
        let stamp = NodeStamp::new(3, 1);
        cache.set_cached_block_height(stamp, 600.0, 42.0);
        assert_eq!(cache.get_cached_block_height(stamp, 600.0), Some(42.0));
        assert_eq!(cache.get_cached_block_height(stamp.bumped(), 600.0), None);
        assert_eq!(cache.block_height_len(), 0);
        assert_eq!(cache.get_cached_block_height(stamp, 600.0), None);
    }

    #[test]
    fn width_is_part_of_the_key() {
        let mut cache = LayoutCache::default();
        let stamp = NodeStamp::new(9, 0);
        cache.set_cached_block_height(stamp, 300.0, 80.0);
        assert_eq!(cache.get_cached_block_height(stamp, 624.0), None);
        assert_eq!(cache.get_cached_block_height(stamp, 300.0), Some(80.0));
    }

    #[test]
    fn unstamped_nodes_are_never_cached() {
        let mut cache = LayoutCache::default();
        cache.set_cached_block_height(NodeStamp::default(), 100.0, 10.0);
        assert_eq!(cache.block_height_len(), 0);
    }

    #[test]
    fn full_text_cache_evicts_least_recent_tenth() {
        let mut cache = LayoutCache::new(20);
        for i in 0..20 {
            cache.set_cached_text_width(format!("k{i}"), i as f32);
        }
        // Touch the two oldest so they survive.
        assert_eq!(cache.get_cached_text_width("k0"), Some(0.0));
        assert_eq!(cache.get_cached_text_width("k1"), Some(1.0));
        cache.set_cached_text_width("new".into(), 1.0);
        assert_eq!(cache.text_width_len(), 19);
        assert_eq!(cache.get_cached_text_width("k2"), None);
        assert_eq!(cache.get_cached_text_width("k3"), None);
        assert_eq!(cache.get_cached_text_width("k0"), Some(0.0));
        assert_eq!(cache.stats().text_evictions, 2);
    }

    #[test]
    fn snapshot_restores_heights_into_fresh_cache() {
        let mut cache = LayoutCache::default();
        cache.set_cached_block_height(NodeStamp::new(1, 2), 500.0, 33.5);
        cache.set_cached_block_height(NodeStamp::new(2, 0), 250.0, 12.0);
        let bytes = cache.export_block_heights().expect("export");

        let mut restored = LayoutCache::default();
        assert_eq!(restored.import_block_heights(&bytes).expect("import"), 2);
        assert_eq!(
            restored.get_cached_block_height(NodeStamp::new(1, 2), 500.0),
            Some(33.5)
        );
        assert!(restored.import_block_heights(&[0xff, 0xff]).is_err());
    }

    #[test]
    fn paragraph_entry_requires_matching_marker() {
        let mut cache = LayoutCache::default();
        let stamp = NodeStamp::new(5, 0);
        cache.set_cached_paragraph(
            stamp,
            400.0,
            CachedParagraph {
                path: NodePath::from_slice(&[0, 1]),
                marker: Some("1.".into()),
                lines: Arc::new(Vec::new()),
                height: 20.0,
            },
        );
        assert!(cache.get_cached_paragraph(stamp, 400.0, Some("2.")).is_none());
        assert!(cache.get_cached_paragraph(stamp, 400.0, Some("1.")).is_some());
    }
}
