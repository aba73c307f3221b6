//! Family plugin contract.
//!
//! A family groups related counters (all CPU counters, all disk
//! counters, ...) behind one implementation of [`Family`]. The registry
//! owns the descriptors a family lists; the family owns only the opaque
//! `key` payload it stamped on them.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::value::Value;
use crate::watch::WatchSample;

/// Result code for family callbacks and scheduler outcomes.
///
/// Only `Error` is a failure. `WaitTimer` and `Loading` defer
/// scheduling; `ReloadFamily` demands that the caller restart any
/// in-progress index traversal; the remaining variants are success codes
/// differing in change-detection strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Succeeded; change state not reported, the scheduler compares
    /// value snapshots itself.
    Success,
    /// Succeeded and the value changed.
    Updated,
    /// Succeeded and the value did not change.
    Unchanged,
    /// Operation aborted; no structural corruption.
    Error,
    /// Capability absent; treat the result as inert.
    NotSupported,
    /// Not due yet; no callback was invoked.
    WaitTimer,
    /// The family's descriptor list is stale and must be rebuilt.
    ReloadFamily,
    /// Data not ready; like `Success` but the timer does not advance so
    /// polling continues tightly.
    Loading,
}

/// Scheduler tick: either a timestamp checked against each watch's
/// next-due time, or a forced update that ignores timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    At(Instant),
    Force,
}

impl Tick {
    pub fn time(self) -> Option<Instant> {
        match self {
            Tick::At(t) => Some(t),
            Tick::Force => None,
        }
    }
}

/// Lifecycle notification delivered to families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyEvent {
    /// A watch was created on one of the family's descriptors.
    WatchAdded,
    /// An existing watch had its configuration replaced in place.
    WatchReplaced,
    /// A watch is about to be removed.
    WatchDeleting,
    /// A watch's value changed during an update.
    WatchUpdated,
    /// Some family's descriptor list was rebuilt. Broadcast to every
    /// registered family, not just the reloaded one.
    FamilyReloaded,
    /// A caller is blocking until this family finishes loading.
    WaitLoaded,
}

/// Event delivered to a watch's subscriber callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The watched value changed.
    Updated,
    /// The owning family was reloaded; the sample the watch pointed at
    /// may have been replaced by a fresh one.
    FamilyReloaded,
}

/// A registered plugin supplying descriptors and readings.
///
/// `update` runs on the scheduler's thread under the registry read lock;
/// implementations must not call mutating registry APIs from it. A
/// family whose backing data changed asks for resynchronization by
/// returning [`Status::ReloadFamily`] instead.
pub trait Family: Send + Sync {
    /// Unique family name, the first segment of every watch pattern.
    fn name(&self) -> &str;

    /// One-time setup when the family is registered.
    fn init(&self) -> Status {
        Status::Success
    }

    /// Teardown when the family is unregistered.
    fn shutdown(&self) -> Status {
        Status::Success
    }

    /// Enumerate current descriptors. Ownership transfers to the
    /// registry. A family whose enumeration is still running returns a
    /// single loading anchor instead of real descriptors.
    fn list(&self) -> Vec<Descriptor>;

    /// Refresh one watched sample.
    fn update(&self, sample: &WatchSample, tick: Tick) -> Status;

    /// Write a value to a writable counter.
    fn write(&self, _descriptor: &Descriptor, _value: &Value) -> Status {
        Status::NotSupported
    }

    /// Lifecycle notification. `sample` is present for watch events.
    fn notify(&self, _event: FamilyEvent, _sample: Option<&WatchSample>) -> Status {
        Status::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_time() {
        assert!(Tick::Force.time().is_none());
        let now = Instant::now();
        assert_eq!(Tick::At(now).time(), Some(now));
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&Status::ReloadFamily).unwrap();
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Status::ReloadFamily);
    }
}
