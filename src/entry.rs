use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::state::AtomicI32Pair;
use crate::sync::{AtomicBool, Ordering, UnsafeCell};
use crate::Pool;

/// Outcome of a terminal state transition.
pub(crate) struct Removal {
    /// The slot is now closed and idle; exactly one caller per slot observes
    /// this, and that caller unlinks the slot from the pool.
    pub(crate) token: bool,
    /// The slot was still pending, so the pool's pending count must drop.
    pub(crate) was_pending: bool,
}

/// One pooled slot: the user value plus the packed state word driving the
/// reserved -> enabled -> acquired <-> idle -> closed lifecycle.
///
/// State encoding, `(hi, lo)`:
/// - `hi == i32::MIN`: pending, reserved but not yet enabled.
/// - `hi >= 0`: open; the number of acquisitions since enablement.
/// - `hi < 0` otherwise: closed; `-1` is the terminal value.
/// - `lo`: outstanding acquisitions, `0 <= lo <= max_multiplex`.
pub(crate) struct Slot<T> {
    state: CachePadded<AtomicI32Pair>,
    // Written by the enabling thread before the publish CAS and never again;
    // that CAS is the release barrier acquirers read through.
    value: UnsafeCell<Option<T>>,
    // Set once after a successful publish CAS. Gates value reads on closed
    // slots: a slot removed before it was ever enabled must not be read.
    published: AtomicBool,
}

// The value cell is written once before publication and only read afterwards,
// so sharing a Slot across threads needs exactly the bounds of sharing T.
unsafe impl<T: Send + Sync> Send for Slot<T> {}
unsafe impl<T: Send + Sync> Sync for Slot<T> {}

impl<T> Slot<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicI32Pair::new(i32::MIN, 0)),
            value: UnsafeCell::new(None),
            published: AtomicBool::new(false),
        }
    }

    /// Attempt to acquire one multiplex slot, incrementing both counters.
    ///
    /// Fails definitively when the slot is pending or closed, fully
    /// multiplexed, or out of usage budget, each judged on a single state
    /// snapshot.
    pub(crate) fn try_acquire(&self, max_multiplex: i32, max_usage_count: i32) -> bool {
        loop {
            let (hi, lo) = self.state.get();
            // hi saturates; a slot that ever reached i32::MAX usages would
            // otherwise wrap back into the pending encoding.
            if hi < 0 || hi == i32::MAX {
                return false;
            }
            if lo >= max_multiplex {
                return false;
            }
            if max_usage_count > 0 && hi >= max_usage_count {
                return false;
            }
            if self.state.compare_and_set(hi, lo, hi + 1, lo + 1) {
                return true;
            }
        }
    }

    /// Release one multiplex slot.
    ///
    /// Returns `false` when the caller must follow up with a removal: either
    /// the slot was closed underneath its holders, or this release just made
    /// a usage-exhausted slot idle.
    ///
    /// # Panics
    ///
    /// Panics if the slot has no outstanding acquisition to release.
    pub(crate) fn try_release(&self, max_usage_count: i32) -> bool {
        loop {
            let (hi, lo) = self.state.get();
            if hi < 0 {
                return false;
            }
            let new_lo = lo - 1;
            assert!(new_lo >= 0, "released an entry that is not in use");
            if self.state.compare_and_set(hi, lo, hi, new_lo) {
                // hi already counts the acquisition being released, hence >=.
                let over_used = max_usage_count > 0 && hi >= max_usage_count;
                return !(over_used && new_lo == 0);
            }
        }
    }

    /// Force the slot into the terminal closed state, giving up one multiplex
    /// slot if the caller held one.
    ///
    /// `token` is returned to exactly one caller over the slot's lifetime:
    /// the one whose transition left it both closed and idle. That caller
    /// unlinks the slot.
    pub(crate) fn try_remove(&self) -> Removal {
        loop {
            let (hi, lo) = self.state.get();
            if hi < 0 && lo <= 0 {
                // Already terminal and idle; the token was handed out before.
                return Removal {
                    token: false,
                    was_pending: false,
                };
            }
            let new_lo = (lo - 1).max(0);
            if self.state.compare_and_set(hi, lo, -1, new_lo) {
                return Removal {
                    token: new_lo == 0,
                    was_pending: hi == i32::MIN,
                };
            }
        }
    }

    /// Publish `value` and open the slot, optionally claiming the first
    /// acquisition in the same transition.
    ///
    /// On failure (the slot is no longer pending) the value is handed back
    /// untouched by the pool.
    pub(crate) fn try_enable(&self, value: T, acquire: bool) -> Result<(), T> {
        // SAFETY: the slot is pending and reservations are consumed on use,
        // so this thread is the only one that ever writes the cell; readers
        // are gated out until the CAS below succeeds.
        self.value.with_mut(|cell| unsafe { *cell = Some(value) });

        let usage = if acquire { 1 } else { 0 };
        if self.state.compare_and_set(i32::MIN, 0, usage, usage) {
            self.published.store(true, Ordering::Release);
            Ok(())
        } else {
            // The slot was closed in the meantime; `published` was never set,
            // so no reader can be looking at the cell.
            let value = self.value.with_mut(|cell| unsafe { (*cell).take() });
            Err(value.expect("pending slot lost its value"))
        }
    }

    /// The pooled value, if this slot has been enabled.
    pub(crate) fn value(&self) -> Option<&T> {
        let hi = self.state.hi();
        if hi == i32::MIN {
            return None;
        }
        if hi < 0 && !self.published.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the checks above prove the enabling write happened-before
        // this read (through the publish CAS for open slots, through the
        // `published` flag for closed ones), and the cell is never written
        // after publication.
        self.value.with(|cell| unsafe { (*cell).as_ref() })
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.state.lo() <= 0
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.hi() < 0
    }

    pub(crate) fn is_in_use(&self) -> bool {
        self.state.lo() > 0
    }

    pub(crate) fn usage_count(&self) -> u32 {
        self.state.hi().max(0) as u32
    }
}

impl<T> std::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (hi, lo) = self.state.get();
        f.debug_struct("Slot")
            .field("hi", &hi)
            .field("lo", &lo)
            .finish()
    }
}

/// A handle to an entry in a [`Pool`].
///
/// `Entry` is cheap to clone and does not track acquisition by itself: an
/// entry obtained from [`Pool::acquire`] stands for one multiplex slot, and
/// the caller pairs it with exactly one [`Entry::release`] (or a removal when
/// release reports the entry is retired).
pub struct Entry<'a, T> {
    pub(crate) slot: Arc<Slot<T>>,
    pub(crate) pool: &'a Pool<T>,
}

impl<'a, T> Clone for Entry<'a, T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            pool: self.pool,
        }
    }
}

impl<'a, T> Entry<'a, T> {
    /// The pooled value, or `None` while the entry is still pending.
    pub fn pooled(&self) -> Option<&T> {
        self.slot.value()
    }

    /// Release one acquisition of this entry.
    ///
    /// Equivalent to calling [`Pool::release`] with this entry. A `false`
    /// return means the entry is retired and the caller should remove it.
    pub fn release(&self) -> bool {
        self.pool.release(self)
    }

    /// Number of acquisitions performed since the entry was enabled.
    pub fn usage_count(&self) -> u32 {
        self.slot.usage_count()
    }

    /// Whether the entry has no outstanding acquisitions.
    pub fn is_idle(&self) -> bool {
        self.slot.is_idle()
    }

    /// Whether the entry has been removed or the pool closed over it.
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}

impl<'a, T> std::fmt::Debug for Entry<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Entry").field(&*self.slot).finish()
    }
}
