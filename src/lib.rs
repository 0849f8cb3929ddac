//! Concurrent object pool with multiplexed entries.
//!
//! Each pooled entry may be acquired up to a configurable number of times
//! concurrently, and is retired after a configurable number of lifetime
//! acquisitions. Acquisition is non-blocking: it either returns an entry or
//! `None`, and callers layer any waiting policy on top.
//!
//! Entries enter the pool through a two-step reservation protocol: `reserve`
//! carves out a slot, the caller constructs the value (for example by opening
//! a connection), and `enable` publishes it. Released entries are remembered
//! in a small per-thread cache so that acquire/release cycles running on one
//! thread avoid scanning the shared entry list.

mod builder;
mod entry;
mod pool;
mod reservation;
mod state;
mod sync;

pub use builder::Builder;
pub use entry::Entry;
pub use pool::Pool;
pub use reservation::Reservation;
