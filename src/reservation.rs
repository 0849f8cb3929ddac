use std::sync::Arc;

use crate::entry::Slot;
use crate::{Entry, Pool};

/// A reserved slot in a [`Pool`], not yet holding a value.
///
/// The slot already counts towards the pool's capacity but cannot be acquired
/// until it is enabled. Construct the pooled value, then call
/// [`enable`](Reservation::enable) to publish it, or
/// [`acquire`](Reservation::acquire) to publish and claim the first
/// acquisition in one step. If the value cannot be constructed, drop the
/// reservation (or call [`remove`](Reservation::remove)) to free the slot.
pub struct Reservation<'a, T> {
    // Taken by whichever consuming operation resolves the reservation, so
    // that `Drop` only aborts the unresolved case.
    slot: Option<Arc<Slot<T>>>,
    pool: &'a Pool<T>,
}

impl<'a, T> Reservation<'a, T> {
    pub(crate) fn new(slot: Arc<Slot<T>>, pool: &'a Pool<T>) -> Self {
        Self {
            slot: Some(slot),
            pool,
        }
    }

    /// A handle to the reserved entry, which stays closed until enabled.
    pub fn entry(&self) -> Entry<'a, T> {
        Entry {
            slot: Arc::clone(self.slot.as_ref().expect("reservation already resolved")),
            pool: self.pool,
        }
    }

    /// Publish `value` and open the entry for acquisition.
    ///
    /// Once this returns, any thread may acquire the entry; use
    /// [`acquire`](Reservation::acquire) instead when the caller wants the
    /// first acquisition for itself.
    ///
    /// # Panics
    ///
    /// Panics if the slot is no longer pending, which happens when the pool
    /// was closed underneath the reservation. The value is dropped.
    pub fn enable(mut self, value: T) {
        let slot = self.slot.take().expect("reservation already resolved");
        if slot.try_enable(value, false).is_err() {
            panic!("entry cannot be enabled: {:?}", &*slot);
        }
        self.pool.reservation_resolved();
    }

    /// Atomically publish `value` and acquire the entry.
    ///
    /// No other thread can acquire the entry between enablement and the
    /// returned acquisition.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`enable`](Reservation::enable).
    pub fn acquire(mut self, value: T) -> Entry<'a, T> {
        let slot = self.slot.take().expect("reservation already resolved");
        if slot.try_enable(value, true).is_err() {
            panic!("entry cannot be enabled: {:?}", &*slot);
        }
        self.pool.reservation_resolved();
        Entry {
            slot,
            pool: self.pool,
        }
    }

    /// Abort the reservation, freeing its slot without enabling.
    pub fn remove(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.remove_slot(&slot);
        }
    }
}

impl<'a, T> Drop for Reservation<'a, T> {
    fn drop(&mut self) {
        // An unresolved reservation would otherwise pin a pool slot and the
        // pending count forever.
        if let Some(slot) = self.slot.take() {
            self.pool.remove_slot(&slot);
        }
    }
}

impl<'a, T> std::fmt::Debug for Reservation<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.slot {
            Some(slot) => f.debug_tuple("Reservation").field(&**slot).finish(),
            None => f.write_str("Reservation(resolved)"),
        }
    }
}
