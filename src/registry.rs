//! The watch registry: families, descriptor/watch indexes, the spec
//! interner, the update scheduler, and the family reload protocol.
//!
//! All structural state lives in one place and is guarded by a single
//! [`ReentrantRwLock`]; update cadence is seconds-scale so there is no
//! finer-grained locking. Family callbacks (`list`, `update`, `notify`)
//! are always invoked without the internal state mutex held, so they may
//! freely read samples and call query APIs, but they must not call
//! mutating registry APIs from `update` — a family asks for structural
//! changes by returning [`Status::ReloadFamily`], which the scheduler
//! escalates itself via a lock upgrade.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::descriptor::{Descriptor, Property, LOADING_LABEL};
use crate::error::{Result, WatchError};
use crate::family::{Family, FamilyEvent, Status, Tick, WatchEvent};
use crate::index::{fold, DescriptorIndex, IndexKey, PropertyIndex};
use crate::lock::{ReentrantRwLock, Rendezvous};
use crate::pattern::{loading_matches, Pattern, PatternFlags};
use crate::value::Value;
use crate::watch::{WatchIndex, WatchSample};
use crate::watchspec::{SpecInterner, WatchSpec};

/// A sweep gives up after this many traversal restarts; a family stuck
/// returning `ReloadFamily` would otherwise spin the tick forever.
const MAX_SWEEP_RESTARTS: usize = 32;

/// Poll step for [`Registry::wait_until_loaded`].
const WAIT_LOADED_STEP: Duration = Duration::from_millis(10);

struct Inner {
    families: Vec<Arc<dyn Family>>,
    descriptors: DescriptorIndex,
    properties: PropertyIndex,
    watches: WatchIndex,
    interner: SpecInterner,
    next_serial: u64,
    next_placeholder: u64,
}

impl Inner {
    fn alloc_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    fn family_named(&self, name: &str) -> Option<Arc<dyn Family>> {
        let folded = fold(name);
        self.families
            .iter()
            .find(|f| fold(f.name()) == folded)
            .cloned()
    }

    fn insert_descriptor(&mut self, mut d: Descriptor) -> Arc<Descriptor> {
        d.assign_serial(self.next_serial + 1);
        self.next_serial += 1;
        let d = Arc::new(d);
        self.descriptors.insert(Arc::clone(&d));
        self.properties.insert_descriptor(&d);
        d
    }

    fn remove_descriptor(&mut self, d: &Descriptor) {
        self.descriptors.remove(d);
        self.properties.remove_descriptor(d);
    }

    #[cfg(debug_assertions)]
    fn validate(&self) {
        self.descriptors.debug_validate();
        self.watches.debug_validate();
    }

    #[cfg(not(debug_assertions))]
    fn validate(&self) {}
}

/// Deferred family notification, fired after the state mutex is dropped.
type Notification = (Arc<dyn Family>, FamilyEvent, Option<Arc<WatchSample>>);

/// The sensor watch registry.
pub struct Registry {
    lock: ReentrantRwLock,
    rendezvous: Rendezvous,
    inner: Mutex<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            lock: ReentrantRwLock::new(),
            rendezvous: Rendezvous::new(),
            inner: Mutex::new(Inner {
                families: Vec::new(),
                descriptors: DescriptorIndex::new(),
                properties: PropertyIndex::new(),
                watches: WatchIndex::new(),
                interner: SpecInterner::new(),
                next_serial: 0,
                next_placeholder: 0,
            }),
        }
    }

    /// The registry-wide lock, for callers that need to span several
    /// operations with one consistent view.
    pub fn lock(&self) -> &ReentrantRwLock {
        &self.lock
    }

    // === families ===

    /// Register a family: run `init`, enumerate its descriptors, and
    /// index them.
    pub fn register_family(&self, family: Arc<dyn Family>) -> Result<()> {
        let _w = self.lock.write();
        if self.inner.lock().family_named(family.name()).is_some() {
            return Err(WatchError::DuplicateFamily(family.name().to_string()));
        }
        if family.init() == Status::Error {
            return Err(WatchError::Family {
                family: family.name().to_string(),
                reason: "init failed".into(),
            });
        }
        let listed = family.list();
        let mut inner = self.inner.lock();
        inner.families.push(Arc::clone(&family));
        let folded = fold(family.name());
        for d in listed {
            if fold(d.family()) != folded {
                log::warn!(
                    "family '{}' listed descriptor for '{}'; skipping",
                    family.name(),
                    d.family()
                );
                continue;
            }
            inner.insert_descriptor(d);
        }
        inner.validate();
        Ok(())
    }

    /// Unregister a family, deleting its watches and descriptors.
    pub fn unregister_family(&self, name: &str) -> Result<()> {
        let _w = self.lock.write();
        let family = self
            .inner
            .lock()
            .family_named(name)
            .ok_or_else(|| WatchError::UnknownFamily(name.to_string()))?;

        let doomed = self.family_samples(name);
        for s in &doomed {
            family.notify(FamilyEvent::WatchDeleting, Some(s));
        }
        {
            let mut inner = self.inner.lock();
            for s in &doomed {
                Self::drop_watch(&mut inner, s);
            }
            for d in inner.descriptors.remove_family(name) {
                inner.properties.remove_descriptor(&d);
            }
            let folded = fold(name);
            inner.families.retain(|f| fold(f.name()) != folded);
            inner.validate();
        }
        family.shutdown();
        Ok(())
    }

    /// Look up a registered family by name (case-insensitive).
    pub fn family(&self, name: &str) -> Option<Arc<dyn Family>> {
        self.inner.lock().family_named(name)
    }

    /// Snapshot of all registered families.
    pub fn families(&self) -> Vec<Arc<dyn Family>> {
        self.inner.lock().families.clone()
    }

    // === descriptor queries ===

    /// Descriptors matching `pattern`, found through a bounded range
    /// query.
    pub fn descriptors(&self, pattern: &str, flags: PatternFlags) -> Result<Vec<Arc<Descriptor>>> {
        let p = Pattern::compile(pattern, flags)?;
        let _r = self.lock.read();
        Ok(self.collect_descriptors(&p))
    }

    /// Visit matching descriptors under the read lock.
    pub fn visit_descriptors(
        &self,
        pattern: &str,
        flags: PatternFlags,
        mut f: impl FnMut(&Arc<Descriptor>),
    ) -> Result<()> {
        for d in self.descriptors(pattern, flags)? {
            f(&d);
        }
        Ok(())
    }

    /// Same result set as [`Registry::descriptors`], computed by a full
    /// scan instead of the bounded range query.
    pub fn scan_descriptors(
        &self,
        pattern: &str,
        flags: PatternFlags,
    ) -> Result<Vec<Arc<Descriptor>>> {
        let p = Pattern::compile(pattern, flags)?;
        let _r = self.lock.read();
        let inner = self.inner.lock();
        Ok(inner
            .descriptors
            .iter()
            .filter(|d| Self::descriptor_matches(&p, d))
            .cloned()
            .collect())
    }

    /// All descriptor paths in index order.
    pub fn descriptor_names(&self) -> Vec<String> {
        let _r = self.lock.read();
        self.inner.lock().descriptors.iter().map(|d| d.path()).collect()
    }

    /// Properties named `name` on descriptors matching `pattern`.
    pub fn properties(
        &self,
        pattern: &str,
        flags: PatternFlags,
        name: &str,
    ) -> Result<Vec<(Arc<Descriptor>, Property)>> {
        let p = Pattern::compile(pattern, flags)?;
        let _r = self.lock.read();
        let matched = self.collect_descriptors(&p);
        let inner = self.inner.lock();
        let mut out = Vec::new();
        for d in matched {
            for entry in inner.properties.exact(d.family(), d.label(), name) {
                if entry.descriptor.serial() == d.serial() {
                    out.push((
                        Arc::clone(&entry.descriptor),
                        entry.descriptor.properties()[entry.slot].clone(),
                    ));
                }
            }
        }
        Ok(out)
    }

    fn descriptor_matches(p: &Pattern, d: &Descriptor) -> bool {
        if p.matches(d.family(), d.label()) {
            return true;
        }
        match d.loading() {
            Some(state) => {
                loading_matches(&state.pattern, state.flags.literal, p.raw(), p.flags().case_fold)
            }
            None => false,
        }
    }

    fn collect_descriptors(&self, p: &Pattern) -> Vec<Arc<Descriptor>> {
        let inner = self.inner.lock();
        let (lo, hi) = p.bounds();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut out = Vec::new();
        for d in inner.descriptors.range(&lo, &hi) {
            if Self::descriptor_matches(p, d) && seen.insert(d.serial()) {
                out.push(Arc::clone(d));
            }
        }
        if p.label_bounded() {
            // The label bound excludes "..." entries; sweep them with a
            // family-only bound so pending requests stay findable.
            let ph_lo = IndexKey::probe_lower(lo.family.clone(), String::new());
            let ph_hi = IndexKey::probe_upper(hi.family.clone(), LOADING_LABEL.to_string());
            for d in inner.descriptors.range(&ph_lo, &ph_hi) {
                if d.is_loading() && Self::descriptor_matches(p, d) && seen.insert(d.serial()) {
                    out.push(Arc::clone(d));
                }
            }
        }
        out
    }

    // === watch management ===

    /// Subscribe to every descriptor matching `pattern`.
    ///
    /// Creates one sample per newly-watched descriptor; a repeat add on
    /// an already-watched descriptor swaps its interned spec in place and
    /// resets its timer. Against a family still enumerating, a transient
    /// loading placeholder is created instead, to be resolved by the
    /// reload protocol. Returns the affected samples.
    pub fn watch_add(
        &self,
        pattern: &str,
        flags: PatternFlags,
        spec: &WatchSpec,
    ) -> Result<Vec<Arc<WatchSample>>> {
        let p = Pattern::compile(pattern, flags)?;
        let _w = self.lock.write();
        let mut notifications: Vec<Notification> = Vec::new();
        let mut touched = Vec::new();
        {
            let matched = self.collect_descriptors(&p);
            let mut inner = self.inner.lock();
            for d in matched {
                let family = match inner.family_named(d.family()) {
                    Some(f) => f,
                    None => {
                        log::warn!("descriptor '{}' has no registered family", d.path());
                        continue;
                    }
                };
                if let Some(existing) = inner.watches.for_descriptor(&d).cloned() {
                    let interned = inner.interner.intern(spec);
                    let old = existing.replace_spec(interned);
                    inner.interner.release(&old);
                    notifications.push((family, FamilyEvent::WatchReplaced, Some(Arc::clone(&existing))));
                    touched.push(existing);
                    continue;
                }
                let target = if d.loading().is_some_and(|l| l.anchor) {
                    if Self::pending_request_exists(&inner, d.family(), p.raw()) {
                        // The request already has a placeholder; it was
                        // handled through the reverse match above.
                        continue;
                    }
                    let seq = inner.next_placeholder;
                    inner.next_placeholder += 1;
                    let placeholder =
                        Descriptor::loading_placeholder(d.family(), p.raw(), p.flags(), seq);
                    inner.insert_descriptor(placeholder)
                } else {
                    d
                };
                let interned = inner.interner.intern(spec);
                let serial = inner.alloc_serial();
                let sample = Arc::new(WatchSample::new(target, interned, serial));
                inner.watches.insert(Arc::clone(&sample));
                notifications.push((family, FamilyEvent::WatchAdded, Some(Arc::clone(&sample))));
                touched.push(sample);
            }
            inner.validate();
        }
        for (family, event, sample) in notifications {
            family.notify(event, sample.as_deref());
        }
        Ok(touched)
    }

    fn pending_request_exists(inner: &Inner, family: &str, raw_pattern: &str) -> bool {
        inner
            .descriptors
            .exact(family, LOADING_LABEL)
            .any(|d| d.loading().is_some_and(|l| !l.anchor && l.pattern == raw_pattern))
    }

    /// Unsubscribe every watch matching `pattern`. Returns how many
    /// watches were removed.
    pub fn watch_del(&self, pattern: &str, flags: PatternFlags) -> Result<usize> {
        let p = Pattern::compile(pattern, flags)?;
        let _w = self.lock.write();
        let doomed = self.collect_watches(&p);
        for s in &doomed {
            let family = self.inner.lock().family_named(s.descriptor().family());
            if let Some(family) = family {
                family.notify(FamilyEvent::WatchDeleting, Some(s));
            }
        }
        let mut inner = self.inner.lock();
        for s in &doomed {
            Self::drop_watch(&mut inner, s);
        }
        inner.validate();
        Ok(doomed.len())
    }

    /// Delete every active watch.
    pub fn watch_free_all(&self) -> usize {
        let _w = self.lock.write();
        let doomed: Vec<Arc<WatchSample>> = {
            let inner = self.inner.lock();
            inner.watches.iter().cloned().collect()
        };
        for s in &doomed {
            let family = self.inner.lock().family_named(s.descriptor().family());
            if let Some(family) = family {
                family.notify(FamilyEvent::WatchDeleting, Some(s));
            }
        }
        let mut inner = self.inner.lock();
        for s in &doomed {
            Self::drop_watch(&mut inner, s);
        }
        inner.validate();
        doomed.len()
    }

    /// Remove a watch and everything only it kept alive.
    fn drop_watch(inner: &mut Inner, s: &Arc<WatchSample>) {
        inner.watches.remove(s);
        inner.interner.release(&s.spec());
        let d = s.descriptor();
        if d.loading().is_some_and(|l| !l.anchor) {
            inner.remove_descriptor(d);
        }
    }

    /// Watches matching `pattern`.
    pub fn watches(&self, pattern: &str, flags: PatternFlags) -> Result<Vec<Arc<WatchSample>>> {
        let p = Pattern::compile(pattern, flags)?;
        let _r = self.lock.read();
        Ok(self.collect_watches(&p))
    }

    /// Visit matching watches under the read lock.
    pub fn visit_watches(
        &self,
        pattern: &str,
        flags: PatternFlags,
        mut f: impl FnMut(&Arc<WatchSample>),
    ) -> Result<()> {
        for s in self.watches(pattern, flags)? {
            f(&s);
        }
        Ok(())
    }

    /// All watch paths in index order.
    pub fn watch_names(&self) -> Vec<String> {
        let _r = self.lock.read();
        self.inner.lock().watches.iter().map(|s| s.path()).collect()
    }

    /// Number of active watches.
    pub fn watch_count(&self) -> usize {
        let _r = self.lock.read();
        self.inner.lock().watches.len()
    }

    /// Number of distinct interned watch configurations.
    pub fn spec_count(&self) -> usize {
        let _r = self.lock.read();
        self.inner.lock().interner.len()
    }

    /// Interner use count for a configuration.
    pub fn spec_use_count(&self, spec: &WatchSpec) -> usize {
        let _r = self.lock.read();
        self.inner.lock().interner.use_count(spec)
    }

    fn sample_matches(p: &Pattern, s: &WatchSample) -> bool {
        Self::descriptor_matches(p, s.descriptor())
    }

    fn collect_watches(&self, p: &Pattern) -> Vec<Arc<WatchSample>> {
        let inner = self.inner.lock();
        let (lo, hi) = p.bounds();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut out = Vec::new();
        for s in inner.watches.range(&lo, &hi) {
            if Self::sample_matches(p, s) && seen.insert(s.serial()) {
                out.push(Arc::clone(s));
            }
        }
        if p.label_bounded() {
            let ph_lo = IndexKey::probe_lower(lo.family.clone(), String::new());
            let ph_hi = IndexKey::probe_upper(hi.family.clone(), LOADING_LABEL.to_string());
            for s in inner.watches.range(&ph_lo, &ph_hi) {
                if s.descriptor().is_loading()
                    && Self::sample_matches(p, s)
                    && seen.insert(s.serial())
                {
                    out.push(Arc::clone(s));
                }
            }
        }
        out
    }

    fn family_samples(&self, name: &str) -> Vec<Arc<WatchSample>> {
        let folded = fold(name);
        self.inner
            .lock()
            .watches
            .iter()
            .filter(|s| fold(s.descriptor().family()) == folded)
            .cloned()
            .collect()
    }

    // === scheduler ===

    /// Run the per-watch update state machine for one sample.
    ///
    /// With `Tick::At(now)`, a sample whose next-due time lies in the
    /// future returns [`Status::WaitTimer`] without invoking the family.
    /// [`Status::ReloadFamily`] means the reload protocol ran and any
    /// in-progress traversal of the watch index must restart from a
    /// fresh snapshot.
    pub fn update(&self, sample: &Arc<WatchSample>, tick: Tick) -> Status {
        let _r = self.lock.read();
        self.run_update(sample, tick)
    }

    fn run_update(&self, sample: &Arc<WatchSample>, tick: Tick) -> Status {
        let spec = sample.spec();
        if let Tick::At(now) = tick {
            if let Some(due) = sample.next_due() {
                if now < due {
                    return Status::WaitTimer;
                }
            }
        }

        let family = match self.inner.lock().family_named(sample.descriptor().family()) {
            Some(f) => f,
            None => {
                log::warn!("watch '{}' has no registered family", sample.path());
                return Status::Error;
            }
        };

        let before = sample.value();
        let mut status = family.update(sample, tick);

        if matches!(status, Status::Success | Status::Loading) {
            // The family did not report change state; synthesize it.
            let changed = !before.value_equal(&sample.value());
            if status == Status::Loading {
                sample.clear_next_due();
                if changed {
                    spec.callback.on_event(WatchEvent::Updated, sample);
                    family.notify(FamilyEvent::WatchUpdated, Some(sample));
                }
                return Status::Loading;
            }
            status = if changed {
                Status::Updated
            } else {
                Status::Unchanged
            };
        }

        match status {
            Status::Updated => {
                spec.callback.on_event(WatchEvent::Updated, sample);
                family.notify(FamilyEvent::WatchUpdated, Some(sample));
            }
            Status::Unchanged | Status::NotSupported => {}
            Status::WaitTimer => return Status::WaitTimer,
            Status::ReloadFamily => {
                let name = family.name().to_string();
                {
                    let _up = self.lock.upgrade();
                    if let Err(e) = self.reload_family_impl(&name) {
                        log::warn!("reload of family '{name}' failed: {e}");
                    }
                }
                spec.callback.on_event(WatchEvent::FamilyReloaded, sample);
                return Status::ReloadFamily;
            }
            Status::Error => {
                log::warn!("update of watch '{}' reported an error", sample.path());
            }
            Status::Success | Status::Loading => unreachable!(),
        }

        if let Tick::At(now) = tick {
            sample.set_next_due(now + spec.interval);
        }
        status
    }

    /// Drive every watch once: the bulk "give me all due updates" call.
    ///
    /// Skips samples returning `WaitTimer`; restarts the traversal from a
    /// fresh snapshot whenever a reload mutated the index; logs and keeps
    /// going past per-sample errors.
    pub fn sweep(&self, tick: Tick) -> Vec<(Arc<WatchSample>, Status)> {
        let _r = self.lock.read();
        let mut done: HashSet<u64> = HashSet::new();
        let mut out = Vec::new();
        let mut restarts = 0;
        'outer: loop {
            let snapshot: Vec<Arc<WatchSample>> =
                self.inner.lock().watches.iter().cloned().collect();
            for s in snapshot {
                if !done.insert(s.serial()) {
                    continue;
                }
                let status = self.run_update(&s, tick);
                match status {
                    Status::WaitTimer => {}
                    Status::ReloadFamily => {
                        out.push((s, status));
                        restarts += 1;
                        if restarts >= MAX_SWEEP_RESTARTS {
                            log::warn!("sweep exceeded {MAX_SWEEP_RESTARTS} reload restarts; giving up");
                            break 'outer;
                        }
                        continue 'outer;
                    }
                    _ => out.push((s, status)),
                }
            }
            break;
        }
        out
    }

    // === reload protocol ===

    /// Rebuild a family's descriptors and resubscribe its watches.
    pub fn reload_family(&self, name: &str) -> Result<()> {
        let _w = self.lock.write();
        self.reload_family_impl(name)
    }

    /// Requires the write lock.
    fn reload_family_impl(&self, name: &str) -> Result<()> {
        let family = self
            .inner
            .lock()
            .family_named(name)
            .ok_or_else(|| WatchError::UnknownFamily(name.to_string()))?;

        // 1. Snapshot every watched sample of the family: its spec, an
        //    identifying request (pattern + flags), and the placeholder
        //    id for ordering.
        struct RestoreEntry {
            spec: Arc<WatchSpec>,
            pattern: String,
            flags: PatternFlags,
            order: u64,
        }
        let doomed = self.family_samples(name);
        let mut restore: Vec<RestoreEntry> = doomed
            .iter()
            .map(|s| {
                let (pattern, flags) = s.restore_request();
                RestoreEntry {
                    spec: s.spec(),
                    pattern,
                    flags,
                    order: s.descriptor().loading().map_or(0, |l| l.seq),
                }
            })
            .collect();
        restore.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.pattern.cmp(&b.pattern)));

        // 2. Delete those watches.
        for s in &doomed {
            family.notify(FamilyEvent::WatchDeleting, Some(s));
        }
        {
            let mut inner = self.inner.lock();
            for s in &doomed {
                Self::drop_watch(&mut inner, s);
            }
        }

        // 3. Invalidate the old descriptors and enumerate afresh.
        let fresh = family.list();
        {
            let mut inner = self.inner.lock();
            for d in inner.descriptors.remove_family(name) {
                inner.properties.remove_descriptor(&d);
            }
            let folded = fold(name);
            for d in fresh {
                if fold(d.family()) != folded {
                    log::warn!(
                        "family '{}' listed descriptor for '{}'; skipping",
                        name,
                        d.family()
                    );
                    continue;
                }
                inner.insert_descriptor(d);
            }
            inner.validate();
        }

        // 4. Re-run each preserved request against the new descriptor
        //    set. Requests that no longer match anything are dropped.
        for entry in restore {
            let spec = (*entry.spec).clone();
            match self.watch_add(&entry.pattern, entry.flags, &spec) {
                Ok(samples) if samples.is_empty() => {
                    log::debug!("watch '{}' did not survive reload of '{name}'", entry.pattern);
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("restoring watch '{}' failed: {e}", entry.pattern);
                }
            }
        }

        // 5. Tell every family, not just the reloaded one.
        for f in self.families() {
            f.notify(FamilyEvent::FamilyReloaded, None);
        }
        Ok(())
    }

    // === value writes ===

    /// Write `value` to every writable descriptor matching `pattern`.
    /// Returns how many writes the owning families accepted.
    pub fn write_value(&self, pattern: &str, flags: PatternFlags, value: &Value) -> Result<usize> {
        let p = Pattern::compile(pattern, flags)?;
        let _w = self.lock.write();
        let matched = self.collect_descriptors(&p);
        let mut accepted = 0;
        for d in matched {
            if d.is_loading() {
                continue;
            }
            let family = match self.inner.lock().family_named(d.family()) {
                Some(f) => f,
                None => continue,
            };
            match family.write(&d, value) {
                Status::Success | Status::Updated | Status::Unchanged => accepted += 1,
                Status::NotSupported => {}
                other => {
                    log::warn!("write to '{}' returned {:?}", d.path(), other);
                }
            }
        }
        Ok(accepted)
    }

    // === timing helpers ===

    /// Greatest common divisor of all active watch intervals, for
    /// driving a single external timer efficiently. `None` without
    /// watches.
    pub fn interval_gcd(&self) -> Option<Duration> {
        let _r = self.lock.read();
        let inner = self.inner.lock();
        let mut acc: Option<u128> = None;
        for s in inner.watches.iter() {
            let ms = s.spec().interval.as_millis().max(1);
            acc = Some(match acc {
                Some(a) => gcd(a, ms),
                None => ms,
            });
        }
        acc.map(|ms| Duration::from_millis(ms as u64))
    }

    /// Block until `family` has finished loading, polling its pending
    /// placeholder watches, for at most `timeout`. Returns `true` once
    /// no loading descriptors remain.
    pub fn wait_until_loaded(&self, family: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let f = match self.family(family) {
            Some(f) => f,
            None => return false,
        };
        f.notify(FamilyEvent::WaitLoaded, None);
        loop {
            let pending: Vec<Arc<WatchSample>> = {
                let _r = self.lock.read();
                self.family_samples(family)
                    .into_iter()
                    .filter(|s| s.descriptor().is_loading())
                    .collect()
            };
            let still_loading = {
                let _r = self.lock.read();
                let folded = fold(family);
                self.inner
                    .lock()
                    .descriptors
                    .iter()
                    .any(|d| fold(d.family()) == folded && d.is_loading())
            };
            if !still_loading {
                return true;
            }
            {
                let _r = self.lock.read();
                for s in &pending {
                    if self.run_update(s, Tick::Force) == Status::ReloadFamily {
                        break;
                    }
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(WAIT_LOADED_STEP);
        }
    }

    // === rendezvous ===

    /// Wake a poll loop blocked in [`Registry::wait_for_signal`]. Meant
    /// for family background jobs that finished producing data.
    pub fn signal_poller(&self) {
        self.rendezvous.signal();
    }

    /// Block until the next poller signal or `timeout`; `true` if
    /// signalled.
    pub fn wait_for_signal(&self, timeout: Duration) -> bool {
        self.rendezvous.wait(timeout)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Convenience for scheduler results: did the sweep change anything.
pub fn any_updated(results: &[(Arc<WatchSample>, Status)]) -> bool {
    results.iter().any(|(_, st)| matches!(st, Status::Updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(1000, 1500), 500);
        assert_eq!(gcd(7, 13), 1);
        assert_eq!(gcd(42, 42), 42);
    }
}
