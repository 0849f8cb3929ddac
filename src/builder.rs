use crate::Pool;

/// A builder for creating a [`Pool`] with custom configuration.
///
/// # Example
///
/// ```rust
/// use multiplex_pool::Builder;
///
/// let pool = Builder::new()
///     .max_entries(10)
///     .cache_size(4)
///     .max_multiplex(2)
///     .build::<String>();
/// assert_eq!(pool.max_entries(), 10);
/// assert_eq!(pool.max_multiplex(), 2);
/// ```
pub struct Builder {
    max_entries: usize,
    cache_size: usize,
    max_multiplex: i32,
    max_usage_count: i32,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            max_entries: 1024,
            cache_size: 0,
            max_multiplex: 1,
            max_usage_count: -1,
        }
    }

    /// Set the maximum number of entries in the pool.
    pub fn max_entries(&mut self, max_entries: usize) -> &mut Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the per-thread cache capacity. 0 disables the cache.
    pub fn cache_size(&mut self, cache_size: usize) -> &mut Self {
        self.cache_size = cache_size;
        self
    }

    /// Set the cap on concurrent acquisitions per entry.
    pub fn max_multiplex(&mut self, max_multiplex: i32) -> &mut Self {
        self.max_multiplex = max_multiplex;
        self
    }

    /// Set the cap on lifetime acquisitions per entry. Negative means
    /// unbounded.
    pub fn max_usage_count(&mut self, max_usage_count: i32) -> &mut Self {
        self.max_usage_count = max_usage_count;
        self
    }

    /// Build a pool with the current configuration.
    ///
    /// # Panics
    ///
    /// Panics on an invalid configuration: `max_entries == 0`,
    /// `max_multiplex < 1`, or `max_usage_count == 0`.
    pub fn build<T>(&self) -> Pool<T> {
        let pool = Pool::new(self.max_entries, self.cache_size);
        pool.set_max_multiplex(self.max_multiplex);
        pool.set_max_usage_count(self.max_usage_count);
        pool
    }
}
