//! Ring-buffer spool metadata resolution.

use std::fs;
use std::path::Path;

/// One `HitSpool-<n>.dat` slice and the inclusive tick range it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceMeta {
    pub n: u32,
    pub start_tick: i64,
    pub stop_tick: i64,
}

/// Parsed `HsInfo.txt` sidecar for one spool directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolIndex {
    pub write_head: u32,
    pub slices: Vec<SliceMeta>,
}

impl SpoolIndex {
    /// Load the index for `dir`. Metadata that cannot be parsed is treated
    /// as empty rather than as a distinct error — an empty index naturally
    /// fails resolution with "data not in spool".
    pub fn load(dir: &Path) -> SpoolIndex {
        let path = dir.join("HsInfo.txt");
        match fs::read_to_string(&path) {
            Ok(text) => parse(&text).unwrap_or_else(SpoolIndex::empty),
            Err(_) => SpoolIndex::empty(),
        }
    }

    pub fn empty() -> SpoolIndex {
        SpoolIndex {
            write_head: 0,
            slices: Vec::new(),
        }
    }

    /// Resolve a requested `[start_tick, stop_tick]` window against this
    /// index. Slices are
    /// matched by tick-range overlap, not file number, so ring wrap-around
    /// is transparent: the metadata already carries each slice's current
    /// tick range regardless of how many times its file number has been
    /// recycled.
    pub fn resolve(&self, start_tick: i64, stop_tick: i64, max_span: Option<i64>) -> Resolution {
        let (eff_start, eff_stop, clamped) = match max_span {
            Some(max_span) if stop_tick - start_tick > max_span => {
                (start_tick, start_tick + max_span, true)
            }
            _ => (start_tick, stop_tick, false),
        };

        let mut matched: Vec<SliceMeta> = self
            .slices
            .iter()
            .copied()
            .filter(|s| s.stop_tick >= eff_start && s.start_tick <= eff_stop)
            .collect();
        matched.sort_by_key(|s| s.start_tick);

        Resolution {
            slices: matched,
            clamped,
            effective_start: eff_start,
            effective_stop: eff_stop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub slices: Vec<SliceMeta>,
    /// Set when `max_span` clamped the requested window. The truncation is
    /// reported in the DONE message's metadata; callers are not silently
    /// given less data than they asked for.
    pub clamped: bool,
    pub effective_start: i64,
    pub effective_stop: i64,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

fn parse(text: &str) -> Option<SpoolIndex> {
    let mut write_head = None;
    let mut slices = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(value) = line.strip_prefix("write_head=") {
            write_head = value.parse::<u32>().ok();
            continue;
        }
        let mut parts = line.split_whitespace();
        let n: u32 = parts.next()?.parse().ok()?;
        let start_tick: i64 = parts.next()?.parse().ok()?;
        let stop_tick: i64 = parts.next()?.parse().ok()?;
        slices.push(SliceMeta {
            n,
            start_tick,
            stop_tick,
        });
    }
    Some(SpoolIndex {
        write_head: write_head?,
        slices,
    })
}
