//! The exposed memory cell, as seen by the checker.
//!
//! The cell is mutated only by remote writes the transport lands on the
//! writer's behalf. The checker never asks the transport about it; it loads
//! the raw memory and trusts nothing else.

use std::sync::atomic::{AtomicU64, Ordering};

/// Read side of the exposed memory cell.
pub trait CellView {
    /// Load whatever the remote writes have deposited so far.
    fn load(&self) -> u64;
}

impl<V: CellView + ?Sized> CellView for &V {
    #[inline]
    fn load(&self) -> u64 {
        (**self).load()
    }
}

impl CellView for AtomicU64 {
    #[inline]
    fn load(&self) -> u64 {
        AtomicU64::load(self, Ordering::Relaxed)
    }
}

/// View of one 8-byte slot of registered memory.
///
/// The slot belongs to a buffer owned by a transport handle; this view only
/// borrows it.
#[derive(Debug, Clone, Copy)]
pub struct RemoteCell<'a> {
    slot: &'a AtomicU64,
}

impl<'a> RemoteCell<'a> {
    pub fn new(slot: &'a AtomicU64) -> Self {
        Self { slot }
    }
}

impl CellView for RemoteCell<'_> {
    #[inline]
    fn load(&self) -> u64 {
        self.slot.load(Ordering::Relaxed)
    }
}
