//! Shared progress counter.
//!
//! The value is `x` iff the writer has seen the completion of its write of
//! `x` into the checker's exposed memory. It is owned by whoever runs the two
//! roles and lent to both; there is exactly one writer of it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic count of writes whose completion the writer has observed.
///
/// Cache-line aligned so the checker's spinning load does not share a line
/// with unrelated data.
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct ProgressCounter {
    value: AtomicU64,
}

impl ProgressCounter {
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Current value.
    #[inline]
    pub fn load(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Increment by one and return the new value.
    ///
    /// Only the writer calls this.
    #[inline]
    pub fn advance(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }
}
