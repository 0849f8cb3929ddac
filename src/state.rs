use crate::sync::{AtomicU64, Ordering};

/// Two signed 32-bit counters packed into a single atomic word.
///
/// Both halves are read and written together: `compare_and_set` succeeds only
/// if the high and the low half simultaneously match their expected values,
/// so a transition over the pair is a single compare-and-swap.
pub(crate) struct AtomicI32Pair {
    encoded: AtomicU64,
}

impl AtomicI32Pair {
    pub(crate) fn new(hi: i32, lo: i32) -> Self {
        Self {
            encoded: AtomicU64::new(encode(hi, lo)),
        }
    }

    /// Load both halves in one snapshot.
    pub(crate) fn get(&self) -> (i32, i32) {
        let encoded = self.encoded.load(Ordering::Acquire);
        (hi_of(encoded), lo_of(encoded))
    }

    pub(crate) fn hi(&self) -> i32 {
        hi_of(self.encoded.load(Ordering::Acquire))
    }

    pub(crate) fn lo(&self) -> i32 {
        lo_of(self.encoded.load(Ordering::Acquire))
    }

    /// Set both halves iff both currently hold the expected values.
    ///
    /// A successful exchange is a release operation, pairing with the acquire
    /// loads above; this is what publishes a slot's value to later acquirers.
    pub(crate) fn compare_and_set(
        &self,
        expected_hi: i32,
        expected_lo: i32,
        new_hi: i32,
        new_lo: i32,
    ) -> bool {
        self.encoded
            .compare_exchange(
                encode(expected_hi, expected_lo),
                encode(new_hi, new_lo),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl std::fmt::Debug for AtomicI32Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (hi, lo) = self.get();
        write!(f, "({hi}, {lo})")
    }
}

fn encode(hi: i32, lo: i32) -> u64 {
    ((hi as u32 as u64) << 32) | (lo as u32 as u64)
}

fn hi_of(encoded: u64) -> i32 {
    (encoded >> 32) as u32 as i32
}

fn lo_of(encoded: u64) -> i32 {
    encoded as u32 as i32
}
