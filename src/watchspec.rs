//! Watch configurations and their interner.
//!
//! A [`WatchSpec`] is the subscriber-supplied configuration of a watch:
//! update interval, three warning-level values, and the callback.
//! Identical specs are interned so any number of watches with the same
//! settings share one refcounted entry; callback identity (not callback
//! behavior) is part of equality.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::family::WatchEvent;
use crate::value::{Value, ValueKind};
use crate::watch::WatchSample;

/// Subscriber callback invoked for watch events.
pub trait WatchCallback: Send + Sync {
    fn on_event(&self, event: WatchEvent, sample: &WatchSample);
}

struct FnCallback<F>(F);

impl<F> WatchCallback for FnCallback<F>
where
    F: Fn(WatchEvent, &WatchSample) + Send + Sync,
{
    fn on_event(&self, event: WatchEvent, sample: &WatchSample) {
        (self.0)(event, sample)
    }
}

/// Wrap a closure as a [`WatchCallback`].
pub fn callback<F>(f: F) -> Arc<dyn WatchCallback>
where
    F: Fn(WatchEvent, &WatchSample) + Send + Sync + 'static,
{
    Arc::new(FnCallback(f))
}

/// Configuration shared by watches with identical settings.
#[derive(Clone)]
pub struct WatchSpec {
    pub interval: Duration,
    /// Warning levels, lowest severity first. `Value::None` disables a
    /// level.
    pub levels: [Value; 3],
    pub callback: Arc<dyn WatchCallback>,
}

impl WatchSpec {
    pub fn new(interval: Duration, callback: Arc<dyn WatchCallback>) -> Self {
        Self {
            interval,
            levels: [Value::None, Value::None, Value::None],
            callback,
        }
    }

    pub fn with_levels(mut self, levels: [Value; 3]) -> Self {
        self.levels = levels;
        self
    }

    fn callback_identity(&self) -> usize {
        Arc::as_ptr(&self.callback) as *const () as usize
    }

    fn token(&self) -> SpecToken {
        SpecToken {
            interval: self.interval,
            levels: [
                ValueToken::of(&self.levels[0]),
                ValueToken::of(&self.levels[1]),
                ValueToken::of(&self.levels[2]),
            ],
            callback: self.callback_identity(),
        }
    }

    /// Exact-configuration equality: interval, levels, and callback
    /// identity.
    pub fn same_config(&self, other: &WatchSpec) -> bool {
        self.token() == other.token()
    }
}

impl fmt::Debug for WatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSpec")
            .field("interval", &self.interval)
            .field("levels", &self.levels)
            .field("callback", &format_args!("{:#x}", self.callback_identity()))
            .finish()
    }
}

/// Hashable fingerprint of a spec. Scalar levels fingerprint by raw
/// bits, buffer levels by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SpecToken {
    interval: Duration,
    levels: [ValueToken; 3],
    callback: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueToken {
    None,
    Scalar(ValueKind, u64),
    Buffer(ValueKind, Vec<u8>),
}

impl ValueToken {
    fn of(v: &Value) -> Self {
        match v {
            Value::None => ValueToken::None,
            Value::Text(s) => ValueToken::Buffer(ValueKind::Text, s.as_bytes().to_vec()),
            Value::Bytes(b) => ValueToken::Buffer(ValueKind::Bytes, b.clone()),
            other => ValueToken::Scalar(
                other.kind(),
                other.bits().unwrap_or_default(),
            ),
        }
    }
}

struct InternEntry {
    spec: Arc<WatchSpec>,
    uses: usize,
}

/// Refcounted dedup cache for watch configurations.
#[derive(Default)]
pub struct SpecInterner {
    entries: HashMap<SpecToken, InternEntry>,
}

impl SpecInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared entry for `spec`, bumping its use count;
    /// allocates on first use.
    pub fn intern(&mut self, spec: &WatchSpec) -> Arc<WatchSpec> {
        let entry = self
            .entries
            .entry(spec.token())
            .or_insert_with(|| InternEntry {
                spec: Arc::new(spec.clone()),
                uses: 0,
            });
        entry.uses += 1;
        Arc::clone(&entry.spec)
    }

    /// Drop one use; the entry is freed when its count reaches zero.
    pub fn release(&mut self, spec: &WatchSpec) {
        let token = spec.token();
        let remove = match self.entries.get_mut(&token) {
            Some(entry) => {
                entry.uses -= 1;
                entry.uses == 0
            }
            None => {
                log::warn!("release of un-interned watch spec {spec:?}");
                false
            }
        };
        if remove {
            self.entries.remove(&token);
        }
    }

    pub fn use_count(&self, spec: &WatchSpec) -> usize {
        self.entries.get(&spec.token()).map_or(0, |e| e.uses)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn WatchCallback> {
        callback(|_, _| {})
    }

    #[test]
    fn test_identical_specs_collapse() {
        let cb = noop();
        let spec = WatchSpec::new(Duration::from_millis(1000), Arc::clone(&cb));
        let mut interner = SpecInterner::new();
        let a = interner.intern(&spec);
        let b = interner.intern(&spec.clone());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
        assert_eq!(interner.use_count(&spec), 2);
    }

    #[test]
    fn test_callback_identity_splits_entries() {
        let spec_a = WatchSpec::new(Duration::from_millis(1000), noop());
        let spec_b = WatchSpec::new(Duration::from_millis(1000), noop());
        let mut interner = SpecInterner::new();
        interner.intern(&spec_a);
        interner.intern(&spec_b);
        assert_eq!(interner.len(), 2);
        assert!(!spec_a.same_config(&spec_b));
    }

    #[test]
    fn test_levels_are_part_of_identity() {
        let cb = noop();
        let plain = WatchSpec::new(Duration::from_secs(1), Arc::clone(&cb));
        let leveled = WatchSpec::new(Duration::from_secs(1), Arc::clone(&cb))
            .with_levels([Value::U32(80), Value::U32(90), Value::U32(95)]);
        let mut interner = SpecInterner::new();
        interner.intern(&plain);
        interner.intern(&leveled);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_release_unwinds_fully() {
        let spec = WatchSpec::new(Duration::from_secs(2), noop());
        let mut interner = SpecInterner::new();
        interner.intern(&spec);
        interner.intern(&spec);
        interner.release(&spec);
        assert_eq!(interner.use_count(&spec), 1);
        interner.release(&spec);
        assert!(interner.is_empty());
    }

    #[test]
    fn test_release_unknown_spec_is_harmless() {
        let mut interner = SpecInterner::new();
        interner.release(&WatchSpec::new(Duration::from_secs(1), noop()));
        assert!(interner.is_empty());
    }
}
