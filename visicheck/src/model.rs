//! Deterministic weak-memory model of the checker's loads.
//!
//! Real x86 hardware does not reorder a load ahead of an earlier load, so the
//! effect of a missing checker barrier cannot be reproduced on demand. This
//! model can: a [`PrefetchingView`] may satisfy a cell load with a value it
//! fetched at the previous load, the way a weakly ordered CPU may satisfy a
//! later load early. An [`InvalidatingFence`] discards that value, so loads
//! after the fence see current memory.
//!
//! The writer side has the mirror image. A [`BufferedTransport`] confirms a
//! write while its payload still sits in a buffer, the way a completion may be
//! observed ahead of the data it stands for. Only a [`DrainingFence`] (or the
//! next submit) pushes the payload out to target memory.
//!
//! All of these are single-threaded (`Rc`) and only meant to be interleaved by
//! hand with the other role in tests.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::barrier::Fence;
use crate::cell::CellView;
use crate::error::{CompletionFailure, Error, Result};
use crate::transport::{Completion, CompletionStatus, RemoteRegion, Transport, WriteRequest};

/// A cell view whose loads may be hoisted one poll earlier.
#[derive(Debug)]
pub struct PrefetchingView<V> {
    inner: V,
    prefetched: Rc<Cell<Option<u64>>>,
}

impl<V: CellView> PrefetchingView<V> {
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            prefetched: Rc::new(Cell::new(None)),
        }
    }

    /// A fence that drops whatever this view has prefetched.
    pub fn invalidating_fence(&self) -> InvalidatingFence {
        InvalidatingFence {
            prefetched: Rc::clone(&self.prefetched),
        }
    }
}

impl<V: CellView> CellView for PrefetchingView<V> {
    fn load(&self) -> u64 {
        let current = self.inner.load();
        // Serve the value fetched at the previous load, if any survives, and
        // keep the current one for the next load.
        self.prefetched.replace(Some(current)).unwrap_or(current)
    }
}

/// Fence paired with a [`PrefetchingView`].
#[derive(Debug, Clone)]
pub struct InvalidatingFence {
    prefetched: Rc<Cell<Option<u64>>>,
}

impl Fence for InvalidatingFence {
    fn full(&self) {
        self.prefetched.set(None);
    }
}

/// A transport whose completions run ahead of the data.
///
/// `submit_write` parks the payload; `poll_completion` reports success at
/// once. The payload reaches `target` on the paired [`DrainingFence`] or at
/// the next submit.
#[derive(Debug)]
pub struct BufferedTransport<'a> {
    local: [AtomicU64; 1],
    region: RemoteRegion,
    target: &'a AtomicU64,
    buffered: Rc<Cell<Option<u64>>>,
    pending: Option<u64>,
}

impl<'a> BufferedTransport<'a> {
    pub fn new(target: &'a AtomicU64, region: RemoteRegion) -> Self {
        Self {
            local: [AtomicU64::new(0)],
            region,
            target,
            buffered: Rc::new(Cell::new(None)),
            pending: None,
        }
    }

    /// A fence that pushes any parked payload out to target memory.
    pub fn draining_fence(&self) -> DrainingFence<'a> {
        DrainingFence {
            target: self.target,
            buffered: Rc::clone(&self.buffered),
        }
    }
}

impl Transport for BufferedTransport<'_> {
    type Endpoint = RemoteRegion;

    fn endpoint(&self) -> RemoteRegion {
        self.region
    }

    fn connect(&mut self, _peer: &RemoteRegion) -> Result<()> {
        Ok(())
    }

    fn local_slots(&self) -> &[AtomicU64] {
        &self.local
    }

    fn submit_write(&mut self, req: &WriteRequest) -> Result<()> {
        if let Some(prev) = self.buffered.take() {
            self.target.store(prev, Ordering::Relaxed);
        }
        self.buffered.set(Some(self.local[0].load(Ordering::Relaxed)));
        self.pending = Some(req.wr_id);
        Ok(())
    }

    fn poll_completion(&mut self) -> Result<Completion> {
        let wr_id = self.pending.take().ok_or(Error::CompletionFailed {
            wr_id: 0,
            reason: CompletionFailure::NothingOutstanding,
        })?;
        Ok(Completion {
            wr_id,
            status: CompletionStatus::Success,
        })
    }
}

/// Fence paired with a [`BufferedTransport`].
#[derive(Debug, Clone)]
pub struct DrainingFence<'a> {
    target: &'a AtomicU64,
    buffered: Rc<Cell<Option<u64>>>,
}

impl Fence for DrainingFence<'_> {
    fn full(&self) {
        if let Some(value) = self.buffered.take() {
            self.target.store(value, Ordering::Relaxed);
        }
    }
}
