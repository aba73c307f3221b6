//! Live subscriptions: one [`WatchSample`] per watched descriptor.

use std::any::Any;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::descriptor::Descriptor;
use crate::error::Result;
use crate::index::{fold, IndexKey};
use crate::pattern::PatternFlags;
use crate::value::{Change, Value};
use crate::watchspec::WatchSpec;

struct SampleState {
    spec: Arc<WatchSpec>,
    value: Value,
    next_due: Option<Instant>,
    payload: Option<Box<dyn Any + Send + Sync>>,
}

/// One active subscription: a descriptor reference, the shared interned
/// spec, the current value, and the next-due timestamp.
///
/// Mutable fields sit behind a small mutex so a family `update` running
/// under the registry read lock can write the value in place.
pub struct WatchSample {
    descriptor: Arc<Descriptor>,
    serial: u64,
    state: Mutex<SampleState>,
}

impl WatchSample {
    pub(crate) fn new(descriptor: Arc<Descriptor>, spec: Arc<WatchSpec>, serial: u64) -> Self {
        let value = Value::default_for(descriptor.kind());
        Self {
            descriptor,
            serial,
            state: Mutex::new(SampleState {
                spec,
                value,
                next_due: None,
                payload: None,
            }),
        }
    }

    pub fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    /// Index identity tie-break, distinct from the descriptor's serial.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn spec(&self) -> Arc<WatchSpec> {
        Arc::clone(&self.state.lock().spec)
    }

    /// Snapshot of the current value.
    pub fn value(&self) -> Value {
        self.state.lock().value.clone()
    }

    /// Assign a new reading; kind-checked, change-detected.
    pub fn set_value(&self, v: &Value) -> Result<Change> {
        self.state.lock().value.set_from(v)
    }

    /// Assign raw buffer content for `Text`/`Bytes` samples.
    pub fn set_buffer(&self, bytes: &[u8]) -> Result<Change> {
        self.state.lock().value.set_buffer(bytes)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.state.lock().next_due
    }

    pub(crate) fn set_next_due(&self, due: Instant) {
        self.state.lock().next_due = Some(due);
    }

    /// Forget the timer so the next tick treats this sample as due.
    pub(crate) fn clear_next_due(&self) {
        self.state.lock().next_due = None;
    }

    /// Swap in a new interned spec on a repeat add, resetting the timer.
    /// Returns the spec that was replaced.
    pub(crate) fn replace_spec(&self, spec: Arc<WatchSpec>) -> Arc<WatchSpec> {
        let mut s = self.state.lock();
        s.next_due = None;
        std::mem::replace(&mut s.spec, spec)
    }

    /// Stash an opaque per-sample payload for the owning family.
    pub fn set_payload(&self, payload: Box<dyn Any + Send + Sync>) {
        self.state.lock().payload = Some(payload);
    }

    /// Borrow the payload, downcast to `T`, inside `f`.
    pub fn with_payload<T: 'static, R>(&self, f: impl FnOnce(Option<&mut T>) -> R) -> R {
        let mut s = self.state.lock();
        f(s.payload.as_mut().and_then(|p| p.downcast_mut::<T>()))
    }

    pub fn path(&self) -> String {
        self.descriptor.path()
    }

    /// Request identifying this watch across a reload: the placeholder's
    /// stored pattern and flags, or the literal `family/label` path
    /// compiled verbatim so metacharacters in labels survive the round
    /// trip.
    pub fn restore_request(&self) -> (String, PatternFlags) {
        match self.descriptor.loading() {
            Some(state) => (state.pattern.clone(), state.flags),
            None => (self.descriptor.path(), PatternFlags::folded_literal()),
        }
    }
}

impl std::fmt::Debug for WatchSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSample")
            .field("path", &self.path())
            .field("serial", &self.serial)
            .field("value", &self.value())
            .finish()
    }
}

/// Ordered index of active watches, keyed like the descriptor index but
/// tie-broken on the sample serial.
#[derive(Debug, Default)]
pub struct WatchIndex {
    map: BTreeMap<IndexKey, Arc<WatchSample>>,
}

impl WatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(s: &WatchSample) -> IndexKey {
        IndexKey::stored(s.descriptor().family(), s.descriptor().label(), s.serial())
    }

    pub fn insert(&mut self, s: Arc<WatchSample>) {
        self.map.insert(Self::key_of(&s), s);
    }

    pub fn remove(&mut self, s: &WatchSample) -> Option<Arc<WatchSample>> {
        self.map.remove(&Self::key_of(s))
    }

    pub fn range<'a>(
        &'a self,
        lo: &IndexKey,
        hi: &IndexKey,
    ) -> impl Iterator<Item = &'a Arc<WatchSample>> {
        self.map
            .range((Bound::Included(lo.clone()), Bound::Included(hi.clone())))
            .map(|(_, s)| s)
    }

    pub fn exact<'a>(
        &'a self,
        family: &str,
        label: &str,
    ) -> impl Iterator<Item = &'a Arc<WatchSample>> {
        let lo = IndexKey::probe_lower(fold(family), fold(label));
        let hi = IndexKey::probe_upper(fold(family), fold(label));
        self.range(&lo, &hi)
    }

    /// The single live watch on a specific descriptor, if any.
    pub fn for_descriptor(&self, d: &Descriptor) -> Option<&Arc<WatchSample>> {
        self.exact(d.family(), d.label())
            .find(|s| s.descriptor().serial() == d.serial())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WatchSample>> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[cfg(debug_assertions)]
    pub fn debug_validate(&self) {
        for (key, s) in &self.map {
            debug_assert_eq!(key.family, fold(s.descriptor().family()));
            debug_assert_eq!(key.label, fold(s.descriptor().label()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;
    use crate::watchspec::{callback, WatchSpec};
    use std::time::Duration;

    fn desc(family: &str, label: &str, serial: u64) -> Arc<Descriptor> {
        let mut d = Descriptor::new(family, label, ValueKind::U64);
        d.assign_serial(serial);
        Arc::new(d)
    }

    fn spec(ms: u64) -> Arc<WatchSpec> {
        Arc::new(WatchSpec::new(Duration::from_millis(ms), callback(|_, _| {})))
    }

    #[test]
    fn test_sample_seeds_default_value() {
        let s = WatchSample::new(desc("cpu", "cpu0 user usage", 1), spec(1000), 10);
        assert_eq!(s.value(), Value::U64(0));
        assert!(s.next_due().is_none());
    }

    #[test]
    fn test_set_value_change_detection() {
        let s = WatchSample::new(desc("cpu", "cpu0 user usage", 1), spec(1000), 10);
        assert_eq!(s.set_value(&Value::U64(5)).unwrap(), Change::Updated);
        assert_eq!(s.set_value(&Value::U64(5)).unwrap(), Change::Unchanged);
        assert!(s.set_value(&Value::I32(5)).is_err());
    }

    #[test]
    fn test_replace_spec_resets_timer() {
        let s = WatchSample::new(desc("cpu", "cpu0 user usage", 1), spec(1000), 10);
        s.set_next_due(Instant::now());
        let old = s.replace_spec(spec(2000));
        assert_eq!(old.interval, Duration::from_millis(1000));
        assert!(s.next_due().is_none());
        assert_eq!(s.spec().interval, Duration::from_millis(2000));
    }

    #[test]
    fn test_payload_round_trip() {
        let s = WatchSample::new(desc("disk", "sda reads", 1), spec(1000), 10);
        s.set_payload(Box::new(42u32));
        let doubled = s.with_payload::<u32, _>(|p| {
            let v = p.unwrap();
            *v *= 2;
            *v
        });
        assert_eq!(doubled, 84);
        // Wrong type downcasts to None rather than panicking.
        s.with_payload::<String, _>(|p| assert!(p.is_none()));
    }

    #[test]
    fn test_index_for_descriptor_uses_identity() {
        let d1 = desc("disk", "...", 1);
        let d2 = desc("disk", "...", 2);
        let mut idx = WatchIndex::new();
        idx.insert(Arc::new(WatchSample::new(Arc::clone(&d1), spec(1000), 10)));
        idx.insert(Arc::new(WatchSample::new(Arc::clone(&d2), spec(1000), 11)));
        assert_eq!(idx.len(), 2);
        let hit = idx.for_descriptor(&d2).unwrap();
        assert_eq!(hit.descriptor().serial(), 2);
    }

    #[test]
    fn test_restore_request_prefers_stored_pattern() {
        let mut d =
            Descriptor::loading_placeholder("disk", "disk/sd*", PatternFlags::folded(), 7);
        d.assign_serial(3);
        let s = WatchSample::new(Arc::new(d), spec(1000), 10);
        let (pattern, flags) = s.restore_request();
        assert_eq!(pattern, "disk/sd*");
        assert!(!flags.literal);

        // A live watch restores through its verbatim path.
        let s2 = WatchSample::new(desc("cpu", "cpu0 user usage", 1), spec(1000), 11);
        let (pattern, flags) = s2.restore_request();
        assert_eq!(pattern, "cpu/cpu0 user usage");
        assert!(flags.literal);
        assert!(flags.case_fold);
    }
}
