//! hwwatch — pattern-addressed watch registry for hardware/OS counters.
//!
//! Counters are grouped into *families* (all CPU counters, all disk
//! counters, ...), each described by a [`Descriptor`] keyed by
//! `"family/label"`. Applications subscribe with glob patterns; every
//! matching descriptor gets a [`WatchSample`] backed by an interned,
//! refcounted [`WatchSpec`]. A periodic [`Registry::sweep`] drives
//! family updates, fires subscriber callbacks on change, and
//! resynchronizes a family whose counter list changed at runtime.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//! use hwwatch::{callback, PatternFlags, Registry, Tick, WatchSpec};
//! use hwwatch::families::CpuFamily;
//!
//! let registry = Registry::new();
//! registry.register_family(Arc::new(CpuFamily::new())).unwrap();
//!
//! let spec = WatchSpec::new(
//!     Duration::from_secs(1),
//!     callback(|event, sample| {
//!         println!("{:?}: {} = {}", event, sample.path(), sample.value());
//!     }),
//! );
//! registry.watch_add("cpu/*", PatternFlags::folded(), &spec).unwrap();
//!
//! loop {
//!     registry.sweep(Tick::At(Instant::now()));
//!     let step = registry.interval_gcd().unwrap_or(Duration::from_secs(1));
//!     registry.wait_for_signal(step);
//! }
//! ```

pub mod descriptor;
pub mod error;
pub mod families;
pub mod family;
pub mod index;
pub mod lock;
pub mod pattern;
pub mod registry;
pub mod value;
pub mod watch;
pub mod watchspec;

pub use descriptor::{Descriptor, LoadingState, Property, LOADING_LABEL};
pub use error::{Result, WatchError};
pub use family::{Family, FamilyEvent, Status, Tick, WatchEvent};
pub use lock::{ReentrantRwLock, Rendezvous};
pub use pattern::{Pattern, PatternFlags};
pub use registry::Registry;
pub use value::{Change, Value, ValueKind};
pub use watch::WatchSample;
pub use watchspec::{callback, SpecInterner, WatchCallback, WatchSpec};
