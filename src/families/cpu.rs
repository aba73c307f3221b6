//! CPU usage family: per-core user/system usage percentages.
//!
//! ## Platform Support
//!
//! - **Linux**: parses `/proc/stat` per-CPU jiffy counters
//! - Other platforms: no descriptors are listed
//!
//! Usage percentages are computed from jiffy deltas between consecutive
//! updates; the first update after registration reports 0. A core that
//! vanishes from `/proc/stat` (offline hotplug) makes the next update
//! request a family reload.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::family::{Family, Status, Tick};
use crate::value::{Value, ValueKind};
use crate::watch::WatchSample;

const PROC_STAT: &str = "/proc/stat";

/// Which slice of CPU time a descriptor tracks.
const MODE_USER: u64 = 0;
const MODE_SYS: u64 = 1;

/// Jiffy counters for one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreTimes {
    pub cpu: u32,
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
}

impl CoreTimes {
    pub fn user_jiffies(&self) -> u64 {
        self.user + self.nice
    }

    pub fn sys_jiffies(&self) -> u64 {
        self.system + self.irq + self.softirq
    }

    pub fn total_jiffies(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq
    }
}

/// Parse per-core lines of `/proc/stat` content.
pub fn parse_stat(content: &str) -> Vec<CoreTimes> {
    let mut cores = Vec::new();
    for line in content.lines() {
        if !line.starts_with("cpu") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        // Skip the aggregate "cpu" line; keep "cpu0", "cpu1", ...
        let cpu: u32 = match parts[0].strip_prefix("cpu").and_then(|s| s.parse().ok()) {
            Some(n) => n,
            None => continue,
        };
        if parts.len() < 8 {
            continue;
        }
        let field = |i: usize| parts.get(i).and_then(|s| s.parse().ok()).unwrap_or(0u64);
        cores.push(CoreTimes {
            cpu,
            user: field(1),
            nice: field(2),
            system: field(3),
            idle: field(4),
            iowait: field(5),
            irq: field(6),
            softirq: field(7),
        });
    }
    cores
}

enum StatSource {
    Path(PathBuf),
    Content(String),
}

struct CpuState {
    source: StatSource,
    /// Previous (slice, total) jiffies per descriptor key.
    prev: HashMap<u64, (u64, u64)>,
}

/// Family exposing `cpu/cpuN user usage` and `cpu/cpuN sys usage`.
pub struct CpuFamily {
    state: Mutex<CpuState>,
}

impl CpuFamily {
    pub fn new() -> Self {
        Self::from_path(PROC_STAT)
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(CpuState {
                source: StatSource::Path(path.into()),
                prev: HashMap::new(),
            }),
        }
    }

    /// Construct with fixed content instead of a file, for tests and
    /// replay.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(CpuState {
                source: StatSource::Content(content.into()),
                prev: HashMap::new(),
            }),
        }
    }

    /// Replace injected content (no-op for path-backed sources).
    pub fn set_content(&self, content: impl Into<String>) {
        let mut state = self.state.lock();
        if matches!(state.source, StatSource::Content(_)) {
            state.source = StatSource::Content(content.into());
        }
    }

    fn read_cores(state: &CpuState) -> Option<Vec<CoreTimes>> {
        let content = match &state.source {
            StatSource::Path(p) => std::fs::read_to_string(p).ok()?,
            StatSource::Content(c) => c.clone(),
        };
        Some(parse_stat(&content))
    }

    fn key_for(cpu: u32, mode: u64) -> u64 {
        ((cpu as u64) << 1) | mode
    }
}

impl Default for CpuFamily {
    fn default() -> Self {
        Self::new()
    }
}

impl Family for CpuFamily {
    fn name(&self) -> &str {
        "cpu"
    }

    fn list(&self) -> Vec<Descriptor> {
        let state = self.state.lock();
        let cores = Self::read_cores(&state).unwrap_or_default();
        let mut out = Vec::new();
        for core in cores {
            for (mode, slice) in [(MODE_USER, "user"), (MODE_SYS, "sys")] {
                out.push(
                    Descriptor::new(
                        "cpu",
                        format!("cpu{} {} usage", core.cpu, slice),
                        ValueKind::F32,
                    )
                    .with_key(Self::key_for(core.cpu, mode))
                    .with_property("units", Value::Text("percent".into()))
                    .with_property("source", Value::Text(PROC_STAT.into())),
                );
            }
        }
        out
    }

    fn update(&self, sample: &WatchSample, _tick: Tick) -> Status {
        let key = sample.descriptor().key();
        let cpu = (key >> 1) as u32;
        let mode = key & 1;

        let mut state = self.state.lock();
        let cores = match Self::read_cores(&state) {
            Some(c) => c,
            None => return Status::Error,
        };
        let core = match cores.iter().find(|c| c.cpu == cpu) {
            Some(c) => *c,
            // Core went away; the descriptor list is stale.
            None => return Status::ReloadFamily,
        };

        let slice = if mode == MODE_USER {
            core.user_jiffies()
        } else {
            core.sys_jiffies()
        };
        let total = core.total_jiffies();
        let percent = match state.prev.insert(key, (slice, total)) {
            Some((prev_slice, prev_total)) if total > prev_total => {
                let dt = (total - prev_total) as f32;
                100.0 * (slice.saturating_sub(prev_slice)) as f32 / dt
            }
            _ => 0.0,
        };
        drop(state);

        match sample.set_value(&Value::F32(percent)) {
            // Change state is synthesized by the scheduler.
            Ok(_) => Status::Success,
            Err(e) => {
                log::warn!("cpu sample '{}' rejected value: {e}", sample.path());
                Status::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_A: &str = "\
cpu  1000 0 500 8000 100 10 20 0 0 0
cpu0 600 0 300 4000 50 5 10 0 0 0
cpu1 400 0 200 4000 50 5 10 0 0 0
";

    const STAT_B: &str = "\
cpu  1200 0 600 8800 100 10 20 0 0 0
cpu0 700 0 350 4400 50 5 10 0 0 0
cpu1 500 0 250 4400 50 5 10 0 0 0
";

    #[test]
    fn test_parse_stat_skips_aggregate_line() {
        let cores = parse_stat(STAT_A);
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0].cpu, 0);
        assert_eq!(cores[0].user, 600);
        assert_eq!(cores[1].system, 200);
    }

    #[test]
    fn test_jiffy_helpers() {
        let core = parse_stat(STAT_A)[0];
        assert_eq!(core.user_jiffies(), 600);
        assert_eq!(core.sys_jiffies(), 315);
        assert_eq!(core.total_jiffies(), 600 + 300 + 4000 + 50 + 5 + 10);
    }

    #[test]
    fn test_list_two_descriptors_per_core() {
        let family = CpuFamily::with_content(STAT_A);
        let listed = family.list();
        assert_eq!(listed.len(), 4);
        let labels: Vec<&str> = listed.iter().map(|d| d.label()).collect();
        assert!(labels.contains(&"cpu0 user usage"));
        assert!(labels.contains(&"cpu1 sys usage"));
        assert!(listed.iter().all(|d| d.kind() == ValueKind::F32));
        assert!(listed.iter().all(|d| d.property("units").is_some()));
    }

    #[test]
    fn test_usage_from_deltas() {
        use crate::watchspec::{callback, WatchSpec};
        use std::sync::Arc;
        use std::time::Duration;

        let family = CpuFamily::with_content(STAT_A);
        let mut desc = family
            .list()
            .into_iter()
            .find(|d| d.label() == "cpu0 user usage")
            .unwrap();
        desc.assign_serial(1);
        let spec = Arc::new(WatchSpec::new(Duration::from_secs(1), callback(|_, _| {})));
        let sample = WatchSample::new(Arc::new(desc), spec, 2);

        // First update has no previous snapshot: 0%.
        assert_eq!(family.update(&sample, Tick::Force), Status::Success);
        assert!(sample.value().value_equal(&Value::F32(0.0)));

        // cpu0: user 600->700 of total 4965->5515 is 100/550.
        family.set_content(STAT_B);
        assert_eq!(family.update(&sample, Tick::Force), Status::Success);
        let got = sample.value().to_f64().unwrap();
        assert!((got - 100.0 * 100.0 / 550.0).abs() < 0.01, "got {got}");
    }

    #[test]
    fn test_vanished_core_requests_reload() {
        use crate::watchspec::{callback, WatchSpec};
        use std::sync::Arc;
        use std::time::Duration;

        let family = CpuFamily::with_content(STAT_A);
        let mut desc = family
            .list()
            .into_iter()
            .find(|d| d.label() == "cpu1 user usage")
            .unwrap();
        desc.assign_serial(1);
        let spec = Arc::new(WatchSpec::new(Duration::from_secs(1), callback(|_, _| {})));
        let sample = WatchSample::new(Arc::new(desc), spec, 2);

        family.set_content("cpu0 700 0 350 4400 50 5 10 0 0 0\n");
        assert_eq!(family.update(&sample, Tick::Force), Status::ReloadFamily);
    }
}
