//! Registry-wide concurrency primitives.
//!
//! [`ReentrantRwLock`] is an owner-tracked upgradeable read/write lock:
//! arbitrary reader threads share the lock, one writer excludes them, and
//! a thread already holding Write may re-acquire Read or Write again
//! without blocking. Re-acquisitions are counted and the real lock is
//! released only after the matching number of drops. The whole registry
//! is one critical section; update cadence is seconds-scale, so there is
//! no finer-grained locking.
//!
//! [`Rendezvous`] is a separate signal/wait pair letting family
//! background jobs wake an external poll loop without touching the
//! rwlock.

use std::collections::HashMap;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct LockState {
    /// Read hold count per owning thread, for non-writer threads.
    readers: HashMap<ThreadId, usize>,
    /// Thread currently holding Write, if any.
    writer: Option<ThreadId>,
    /// Nested hold count of the writer (Read and Write re-acquires both).
    write_depth: usize,
    /// Thread occupying the single upgrade slot.
    upgrader: Option<ThreadId>,
}

/// Reentrant, upgradeable read/write lock.
#[derive(Debug, Default)]
pub struct ReentrantRwLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl ReentrantRwLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a shared read hold. A thread already holding Write gets a
    /// counted re-acquire instead and does not block.
    pub fn read(&self) -> ReadGuard<'_> {
        let me = thread::current().id();
        let mut s = self.state.lock();
        if s.writer == Some(me) {
            s.write_depth += 1;
            return ReadGuard {
                lock: self,
                nested_write: true,
            };
        }
        while s.writer.is_some() {
            self.cond.wait(&mut s);
        }
        *s.readers.entry(me).or_insert(0) += 1;
        ReadGuard {
            lock: self,
            nested_write: false,
        }
    }

    /// Acquire the exclusive write hold, reentrant for the owner.
    pub fn write(&self) -> WriteGuard<'_> {
        let me = thread::current().id();
        let mut s = self.state.lock();
        if s.writer == Some(me) {
            s.write_depth += 1;
            return WriteGuard { lock: self };
        }
        while s.writer.is_some() || !s.readers.is_empty() {
            self.cond.wait(&mut s);
        }
        s.writer = Some(me);
        s.write_depth = 1;
        WriteGuard { lock: self }
    }

    /// Promote the calling thread's read holds to Write.
    ///
    /// If the caller already holds Write this is a counted no-op. If
    /// another thread occupies the upgrade slot, this degrades to a plain
    /// write acquisition. Either way every read hold the caller owns is
    /// surrendered while waiting and restored when the guard drops, so a
    /// thread spanning several operations under nested read guards can
    /// still promote.
    pub fn upgrade(&self) -> UpgradeGuard<'_> {
        let me = thread::current().id();
        let mut s = self.state.lock();
        if s.writer == Some(me) {
            s.write_depth += 1;
            return UpgradeGuard {
                lock: self,
                mode: UpgradeMode::Nested,
            };
        }
        let took_slot = if s.upgrader.is_none() {
            s.upgrader = Some(me);
            true
        } else {
            false
        };
        let surrendered = s.readers.remove(&me).unwrap_or(0);
        debug_assert!(surrendered > 0, "upgrade without a read hold");
        self.cond.notify_all();
        while s.writer.is_some() || !s.readers.is_empty() {
            self.cond.wait(&mut s);
        }
        s.writer = Some(me);
        s.write_depth = 1;
        UpgradeGuard {
            lock: self,
            mode: UpgradeMode::Promoted {
                took_slot,
                surrendered,
            },
        }
    }

    /// Whether the calling thread currently holds Write.
    pub fn holds_write(&self) -> bool {
        let s = self.state.lock();
        s.writer == Some(thread::current().id())
    }
}

/// Shared read hold; see [`ReentrantRwLock::read`].
pub struct ReadGuard<'a> {
    lock: &'a ReentrantRwLock,
    nested_write: bool,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let me = thread::current().id();
        let mut s = self.lock.state.lock();
        if self.nested_write {
            s.write_depth -= 1;
            if s.write_depth == 0 {
                s.writer = None;
                self.lock.cond.notify_all();
            }
        } else {
            let count = s.readers.get_mut(&me).expect("read hold bookkeeping");
            *count -= 1;
            if *count == 0 {
                s.readers.remove(&me);
            }
            if s.readers.is_empty() {
                self.lock.cond.notify_all();
            }
        }
    }
}

/// Exclusive write hold; see [`ReentrantRwLock::write`].
pub struct WriteGuard<'a> {
    lock: &'a ReentrantRwLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let mut s = self.lock.state.lock();
        s.write_depth -= 1;
        if s.write_depth == 0 {
            s.writer = None;
            self.lock.cond.notify_all();
        }
    }
}

enum UpgradeMode {
    /// Caller already held Write; plain counted re-acquire.
    Nested,
    /// Read holds were promoted; restored on drop.
    Promoted { took_slot: bool, surrendered: usize },
}

/// Temporary Write promotion; see [`ReentrantRwLock::upgrade`].
pub struct UpgradeGuard<'a> {
    lock: &'a ReentrantRwLock,
    mode: UpgradeMode,
}

impl Drop for UpgradeGuard<'_> {
    fn drop(&mut self) {
        let mut s = self.lock.state.lock();
        match self.mode {
            UpgradeMode::Nested => {
                s.write_depth -= 1;
                if s.write_depth == 0 {
                    s.writer = None;
                    self.lock.cond.notify_all();
                }
            }
            UpgradeMode::Promoted {
                took_slot,
                surrendered,
            } => {
                s.write_depth -= 1;
                debug_assert_eq!(s.write_depth, 0);
                s.writer = None;
                if surrendered > 0 {
                    s.readers.insert(thread::current().id(), surrendered);
                }
                if took_slot {
                    s.upgrader = None;
                }
                self.lock.cond.notify_all();
            }
        }
    }
}

/// Signal/wait pair independent of the rwlock.
#[derive(Debug, Default)]
pub struct Rendezvous {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every thread blocked in [`Rendezvous::wait`].
    pub fn signal(&self) {
        let mut g = self.generation.lock();
        *g += 1;
        self.cond.notify_all();
    }

    /// Block until the next signal or `timeout`. Returns `true` if a
    /// signal arrived.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.generation.lock();
        let start = *g;
        while *g == start {
            if self.cond.wait_until(&mut g, deadline).timed_out() {
                return *g != start;
            }
        }
        true
    }
}
