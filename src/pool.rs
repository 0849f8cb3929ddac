use std::sync::atomic::Ordering::*;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::entry::Slot;
use crate::{Entry, Reservation};

/// A concurrent pool of reusable entries.
///
/// Entries are created through [`reserve`](Pool::reserve) and published
/// through the returned [`Reservation`]. [`acquire`](Pool::acquire) hands out
/// up to [`max_multiplex`](Pool::set_max_multiplex) concurrent acquisitions
/// per entry and never blocks: when nothing is acquirable it returns `None`.
/// An entry is retired once it has been acquired
/// [`max_usage_count`](Pool::set_max_usage_count) times.
///
/// Released entries are remembered in a per-thread cache of up to
/// `cache_size` entries. The cache is a hint, not a guarantee: it may hold
/// entries that are meanwhile in use or removed, and every cached entry is
/// revalidated on acquisition. When the cache misses, the shared entry list
/// is scanned in insertion order.
pub struct Pool<T> {
    /// Hard bound on the shared entry list, fixed at construction.
    max_entries: usize,
    /// Per-thread cache capacity, fixed at construction. 0 disables caching.
    cache_size: usize,
    max_multiplex: AtomicI32,
    max_usage_count: AtomicI32,
    /// The write half doubles as the reservation lock: it serializes the
    /// capacity check in `reserve` against concurrent reservations, and the
    /// close-time snapshot against everything else.
    slots: RwLock<Vec<Arc<Slot<T>>>>,
    /// Entries reserved but not yet enabled. Incremented only under the
    /// `slots` write lock; decremented anywhere.
    pending: AtomicUsize,
    closed: AtomicBool,
    cache: Option<DashMap<ThreadId, Vec<Arc<Slot<T>>>>>,
}

impl<T> Pool<T> {
    /// Create a pool holding at most `max_entries` entries, with a per-thread
    /// cache of `cache_size` released entries (0 disables the cache).
    ///
    /// # Panics
    ///
    /// Panics if `max_entries` is 0.
    pub fn new(max_entries: usize, cache_size: usize) -> Self {
        assert!(max_entries > 0, "max entries must be > 0");
        Self {
            max_entries,
            cache_size,
            max_multiplex: AtomicI32::new(1),
            max_usage_count: AtomicI32::new(-1),
            slots: RwLock::new(Vec::new()),
            pending: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            cache: (cache_size > 0).then(DashMap::new),
        }
    }

    /// Maximum number of entries the pool accepts.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Per-thread cache capacity.
    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Cap on concurrent acquisitions per entry.
    pub fn max_multiplex(&self) -> i32 {
        self.max_multiplex.load(Relaxed)
    }

    /// Set the cap on concurrent acquisitions per entry.
    ///
    /// Takes effect on subsequent acquisitions; an acquisition racing the
    /// update may still be admitted under the old cap.
    ///
    /// # Panics
    ///
    /// Panics if `max_multiplex < 1`.
    pub fn set_max_multiplex(&self, max_multiplex: i32) {
        assert!(max_multiplex >= 1, "max multiplex must be >= 1");
        self.max_multiplex.store(max_multiplex, Relaxed);
    }

    /// Cap on lifetime acquisitions per entry; negative means unbounded.
    pub fn max_usage_count(&self) -> i32 {
        self.max_usage_count.load(Relaxed)
    }

    /// Set the cap on lifetime acquisitions per entry. Negative means
    /// unbounded.
    ///
    /// Takes effect on subsequent acquisitions and releases; an entry already
    /// past a newly lowered cap may be acquired once more before retirement
    /// engages.
    ///
    /// # Panics
    ///
    /// Panics if `max_usage_count == 0`.
    pub fn set_max_usage_count(&self, max_usage_count: i32) {
        assert!(max_usage_count != 0, "max usage count must be != 0");
        self.max_usage_count.store(max_usage_count, Relaxed);
    }

    /// Number of entries reserved but not yet enabled.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Relaxed)
    }

    /// Number of enabled entries with no outstanding acquisition.
    pub fn idle_count(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|slot| !slot.is_closed() && slot.is_idle())
            .count()
    }

    /// Number of entries with at least one outstanding acquisition.
    pub fn in_use_count(&self) -> usize {
        self.slots.read().iter().filter(|s| s.is_in_use()).count()
    }

    /// Number of entries in the pool, pending ones included.
    pub fn size(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Acquire)
    }

    /// Snapshot of the pool's entries, in insertion order.
    pub fn values(&self) -> Vec<Entry<'_, T>> {
        self.slots
            .read()
            .iter()
            .map(|slot| Entry {
                slot: Arc::clone(slot),
                pool: self,
            })
            .collect()
    }

    /// Reserve a new slot in the pool.
    ///
    /// The returned reservation holds an entry that cannot be acquired until
    /// it is enabled with a value. Returns `None` when the pool is closed,
    /// full, or already has `max_pending` unresolved reservations
    /// (`None` for no such cap).
    pub fn reserve(&self, max_pending: Option<usize>) -> Option<Reservation<'_, T>> {
        let mut slots = self.slots.write();

        if self.is_closed() {
            return None;
        }
        if slots.len() >= self.max_entries {
            return None;
        }
        // Only this path increments `pending`, and only under the lock, so
        // the cap below cannot be overshot by a concurrent reservation.
        if let Some(cap) = max_pending {
            if self.pending.load(Relaxed) >= cap {
                return None;
            }
        }
        self.pending.fetch_add(1, Relaxed);

        let slot = Arc::new(Slot::new());
        slots.push(Arc::clone(&slot));
        Some(Reservation::new(slot, self))
    }

    /// Acquire an entry from the pool.
    ///
    /// Returns `None` when the pool is closed or no entry is acquirable.
    pub fn acquire(&self) -> Option<Entry<'_, T>> {
        if self.is_closed() {
            return None;
        }

        let max_multiplex = self.max_multiplex();
        let max_usage_count = self.max_usage_count();

        // First drain the calling thread's cache of release hints.
        if let Some(cache) = &self.cache {
            if let Some(mut cached) = cache.get_mut(&thread::current().id()) {
                while let Some(slot) = cached.pop() {
                    if slot.try_acquire(max_multiplex, max_usage_count) {
                        drop(cached);
                        return Some(Entry { slot, pool: self });
                    }
                }
            }
        }

        // Then scan the shared list in insertion order.
        for slot in self.slots.read().iter() {
            if slot.try_acquire(max_multiplex, max_usage_count) {
                return Some(Entry {
                    slot: Arc::clone(slot),
                    pool: self,
                });
            }
        }
        None
    }

    /// Acquire the entry at `index` in the shared list, bypassing the cache.
    ///
    /// Returns `None` when the pool is closed, the index is out of bounds, or
    /// the entry is not acquirable.
    pub fn acquire_at(&self, index: usize) -> Option<Entry<'_, T>> {
        if self.is_closed() {
            return None;
        }

        let slot = Arc::clone(self.slots.read().get(index)?);
        if slot.try_acquire(self.max_multiplex(), self.max_usage_count()) {
            return Some(Entry { slot, pool: self });
        }
        None
    }

    /// Return one acquisition of `entry` to the pool.
    ///
    /// Returns `true` when the entry can be acquired again. A `false` return
    /// means the entry is retired or was closed underneath its holders; the
    /// caller should pass it to [`remove`](Pool::remove).
    ///
    /// # Panics
    ///
    /// Panics if `entry` has no outstanding acquisition.
    pub fn release(&self, entry: &Entry<'_, T>) -> bool {
        if self.is_closed() {
            return false;
        }

        let reusable = entry.slot.try_release(self.max_usage_count());

        if reusable {
            if let Some(cache) = &self.cache {
                let mut cached = cache.entry(thread::current().id()).or_default();
                if cached.len() < self.cache_size {
                    cached.push(Arc::clone(&entry.slot));
                }
            }
        }
        reusable
    }

    /// Remove `entry` from the pool.
    ///
    /// Returns `true` when this call evicted the entry. A `false` return
    /// means the pool is closed, or other holders still multiplex the entry;
    /// in the latter case the last holder's release/remove performs the
    /// eviction.
    pub fn remove(&self, entry: &Entry<'_, T>) -> bool {
        self.remove_slot(&entry.slot)
    }

    /// Close the pool and drain its entries.
    ///
    /// Every subsequent operation fail-returns. Values without outstanding
    /// acquisitions are dropped before this returns; values still held are
    /// dropped when their last handle goes away.
    pub fn close(&self) {
        let drained = {
            let mut slots = self.slots.write();
            self.closed.store(true, Release);
            std::mem::take(&mut *slots)
        };

        if let Some(cache) = &self.cache {
            cache.clear();
        }

        for slot in &drained {
            let removal = slot.try_remove();
            if removal.was_pending {
                self.reservation_resolved();
            }
        }
        tracing::debug!(drained = drained.len(), "pool closed");
    }

    pub(crate) fn remove_slot(&self, slot: &Arc<Slot<T>>) -> bool {
        if self.is_closed() {
            return false;
        }

        let removal = slot.try_remove();
        if removal.was_pending {
            self.reservation_resolved();
        }
        if !removal.token {
            tracing::debug!(
                entry = ?slot,
                "entry still multiplexed, deferring removal to its last holder"
            );
            return false;
        }

        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|other| !Arc::ptr_eq(other, slot));
        if slots.len() == before {
            tracing::debug!(entry = ?slot, "removed entry was no longer linked");
        }
        true
    }

    pub(crate) fn reservation_resolved(&self) {
        self.pending.fetch_sub(1, Relaxed);
    }
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size())
            .field("max_entries", &self.max_entries)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
