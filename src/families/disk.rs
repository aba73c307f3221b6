//! Disk family: per-device I/O completion counters, enumerated
//! asynchronously.
//!
//! ## Platform Support
//!
//! - **Linux**: parses `/proc/diskstats`
//! - Other platforms: enumeration completes with no devices
//!
//! Device discovery may take a while (spinning up media, remote block
//! devices), so `list()` returns a loading anchor until a background
//! job finishes. Watches placed in the meantime land on transient
//! placeholders; once enumeration completes, exactly one subsequent
//! update answers `ReloadFamily` and the registry resubscribes the
//! stored request patterns against the real device list.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::family::{Family, Status, Tick};
use crate::value::{Change, Value, ValueKind};
use crate::watch::WatchSample;

const PROC_DISKSTATS: &str = "/proc/diskstats";

const WHICH_READS: u64 = 0;
const WHICH_WRITES: u64 = 1;

/// Completion counters for one block device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCounters {
    pub device: String,
    pub reads: u64,
    pub writes: u64,
}

/// Parse `/proc/diskstats` content.
pub fn parse_diskstats(content: &str) -> Vec<DiskCounters> {
    let mut out = Vec::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 {
            continue;
        }
        let reads = parts[3].parse().unwrap_or(0);
        let writes = parts[7].parse().unwrap_or(0);
        out.push(DiskCounters {
            device: parts[2].to_string(),
            reads,
            writes,
        });
    }
    out
}

struct DiskState {
    /// `None` while enumeration is still running.
    devices: Option<Vec<DiskCounters>>,
    /// Set once the pending `ReloadFamily` answer has been given.
    reload_sent: bool,
}

/// Family exposing `disk/<dev> reads` and `disk/<dev> writes`.
pub struct DiskFamily {
    state: Mutex<DiskState>,
}

impl DiskFamily {
    /// Start in the loading phase; call [`DiskFamily::finish_load`] (or
    /// [`DiskFamily::spawn_load`]) to complete enumeration.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DiskState {
                devices: None,
                reload_sent: false,
            }),
        }
    }

    /// Complete enumeration with parsed `/proc/diskstats` content.
    pub fn finish_load(&self, content: &str) {
        let mut state = self.state.lock();
        state.devices = Some(parse_diskstats(content));
        state.reload_sent = false;
    }

    /// Refresh counters after enumeration has completed.
    pub fn refresh(&self, content: &str) {
        let mut state = self.state.lock();
        if state.devices.is_some() {
            state.devices = Some(parse_diskstats(content));
        }
    }

    /// Finish enumeration on a background thread by reading `path`,
    /// then wake the poller through the registry rendezvous.
    pub fn spawn_load(self: &Arc<Self>, registry: Arc<crate::registry::Registry>) {
        self.spawn_load_from(registry, PROC_DISKSTATS)
    }

    pub fn spawn_load_from(
        self: &Arc<Self>,
        registry: Arc<crate::registry::Registry>,
        path: impl Into<PathBuf>,
    ) {
        let family = Arc::clone(self);
        let path = path.into();
        std::thread::spawn(move || {
            let content = std::fs::read_to_string(&path).unwrap_or_default();
            family.finish_load(&content);
            registry.signal_poller();
        });
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().devices.is_some()
    }
}

impl Default for DiskFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl Family for DiskFamily {
    fn name(&self) -> &str {
        "disk"
    }

    fn list(&self) -> Vec<Descriptor> {
        let state = self.state.lock();
        let devices = match &state.devices {
            None => return vec![Descriptor::loading_anchor("disk")],
            Some(d) => d,
        };
        let mut out = Vec::new();
        for (idx, dev) in devices.iter().enumerate() {
            for (which, suffix) in [(WHICH_READS, "reads"), (WHICH_WRITES, "writes")] {
                out.push(
                    Descriptor::new("disk", format!("{} {}", dev.device, suffix), ValueKind::U64)
                        .with_key(((idx as u64) << 1) | which)
                        .with_property("device", Value::Text(dev.device.clone()))
                        .with_property("source", Value::Text(PROC_DISKSTATS.into())),
                );
            }
        }
        out
    }

    fn update(&self, sample: &WatchSample, _tick: Tick) -> Status {
        let mut state = self.state.lock();
        if sample.descriptor().is_loading() {
            return if state.devices.is_none() {
                Status::Loading
            } else if !state.reload_sent {
                state.reload_sent = true;
                Status::ReloadFamily
            } else {
                // Another placeholder already triggered the reload.
                Status::Loading
            };
        }

        let devices = match &state.devices {
            Some(d) => d,
            None => return Status::Error,
        };
        let key = sample.descriptor().key();
        let (idx, which) = ((key >> 1) as usize, key & 1);
        let count = match devices.get(idx) {
            Some(dev) if which == WHICH_READS => dev.reads,
            Some(dev) => dev.writes,
            None => return Status::ReloadFamily,
        };
        drop(state);

        match sample.set_value(&Value::U64(count)) {
            Ok(Change::Updated) => Status::Updated,
            Ok(Change::Unchanged) => Status::Unchanged,
            Err(e) => {
                log::warn!("disk sample '{}' rejected value: {e}", sample.path());
                Status::Error
            }
        }
    }
}
