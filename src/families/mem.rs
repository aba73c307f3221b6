//! Memory family: system memory counters in kilobytes.
//!
//! ## Platform Support
//!
//! - **Linux**: parses `/proc/meminfo`
//! - Other platforms: no descriptors are listed
//!
//! Unlike the CPU family, updates here report `Updated`/`Unchanged`
//! directly instead of leaving change detection to the scheduler.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::descriptor::Descriptor;
use crate::family::{Family, Status, Tick};
use crate::value::{Change, Value, ValueKind};
use crate::watch::WatchSample;

const PROC_MEMINFO: &str = "/proc/meminfo";

/// Counters exposed as descriptors, in (meminfo key, label, family key)
/// order.
const COUNTERS: [(&str, &str, u64); 5] = [
    ("MemTotal", "total kb", 0),
    ("MemFree", "free kb", 1),
    ("MemAvailable", "available kb", 2),
    ("Buffers", "buffers kb", 3),
    ("Cached", "cached kb", 4),
];

/// Parse `/proc/meminfo` content into key -> kilobytes.
pub fn parse_meminfo(content: &str) -> HashMap<String, u64> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let kb = rest
            .split_whitespace()
            .next()
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(kb) = kb {
            out.insert(key.trim().to_string(), kb);
        }
    }
    out
}

enum MemSource {
    Path(PathBuf),
    Content(String),
}

/// Family exposing `mem/total kb`, `mem/free kb`, and friends.
pub struct MemFamily {
    source: Mutex<MemSource>,
}

impl MemFamily {
    pub fn new() -> Self {
        Self::from_path(PROC_MEMINFO)
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Mutex::new(MemSource::Path(path.into())),
        }
    }

    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            source: Mutex::new(MemSource::Content(content.into())),
        }
    }

    pub fn set_content(&self, content: impl Into<String>) {
        let mut source = self.source.lock();
        if matches!(*source, MemSource::Content(_)) {
            *source = MemSource::Content(content.into());
        }
    }

    fn read(&self) -> Option<HashMap<String, u64>> {
        let source = self.source.lock();
        let content = match &*source {
            MemSource::Path(p) => std::fs::read_to_string(p).ok()?,
            MemSource::Content(c) => c.clone(),
        };
        Some(parse_meminfo(&content))
    }
}

impl Default for MemFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl Family for MemFamily {
    fn name(&self) -> &str {
        "mem"
    }

    fn list(&self) -> Vec<Descriptor> {
        let counters = self.read().unwrap_or_default();
        COUNTERS
            .iter()
            .filter(|(meminfo_key, _, _)| counters.contains_key(*meminfo_key))
            .map(|(_, label, key)| {
                Descriptor::new("mem", *label, ValueKind::U64)
                    .with_key(*key)
                    .with_property("units", Value::Text("kB".into()))
                    .with_property("source", Value::Text(PROC_MEMINFO.into()))
            })
            .collect()
    }

    fn update(&self, sample: &WatchSample, _tick: Tick) -> Status {
        let counters = match self.read() {
            Some(c) => c,
            None => return Status::Error,
        };
        let key = sample.descriptor().key();
        let meminfo_key = match COUNTERS.iter().find(|(_, _, k)| *k == key) {
            Some((mk, _, _)) => *mk,
            None => return Status::Error,
        };
        let kb = match counters.get(meminfo_key) {
            Some(kb) => *kb,
            // Counter disappeared from the kernel's view.
            None => return Status::ReloadFamily,
        };
        match sample.set_value(&Value::U64(kb)) {
            Ok(Change::Updated) => Status::Updated,
            Ok(Change::Unchanged) => Status::Unchanged,
            Err(e) => {
                log::warn!("mem sample '{}' rejected value: {e}", sample.path());
                Status::Error
            }
        }
    }
}
