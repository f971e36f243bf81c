//! In-memory transport and tracing fence for unit tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::barrier::Fence;
use crate::counter::ProgressCounter;
use crate::error::{CompletionFailure, Error, Result};
use crate::transport::{Completion, CompletionStatus, RemoteRegion, Transport, WriteRequest};

pub(crate) const REGION: RemoteRegion = RemoteRegion {
    addr: 0x1000,
    len: 8,
    rkey: 0x42,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Submit { wr_id: u64, payload: u64 },
    Complete { wr_id: u64 },
    Fence { counter: u64 },
}

/// Shared, ordered log of transport and fence operations.
#[derive(Debug, Clone, Default)]
pub(crate) struct Trace(Rc<RefCell<Vec<Op>>>);

impl Trace {
    fn push(&self, op: Op) {
        self.0.borrow_mut().push(op);
    }

    pub(crate) fn take(&self) -> Vec<Op> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Complete with someone else's wr_id.
    WrongWrId,
    /// Complete with an error syndrome and never land the write.
    Syndrome(u8),
    /// Refuse every submission.
    RejectSubmit,
}

/// Lands every write at submit time, so a completion always implies
/// visibility.
pub(crate) struct ImmediateTransport {
    local: [AtomicU64; 1],
    target: Arc<AtomicU64>,
    pending: Option<u64>,
    fault: Option<Fault>,
    trace: Trace,
}

impl ImmediateTransport {
    pub(crate) fn new(target: Arc<AtomicU64>) -> Self {
        Self {
            local: [AtomicU64::new(0)],
            target,
            pending: None,
            fault: None,
            trace: Trace::default(),
        }
    }

    pub(crate) fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub(crate) fn trace(&self) -> Trace {
        self.trace.clone()
    }
}

impl Transport for ImmediateTransport {
    type Endpoint = RemoteRegion;

    fn endpoint(&self) -> RemoteRegion {
        REGION
    }

    fn connect(&mut self, _peer: &RemoteRegion) -> Result<()> {
        Ok(())
    }

    fn local_slots(&self) -> &[AtomicU64] {
        &self.local
    }

    fn submit_write(&mut self, req: &WriteRequest) -> Result<()> {
        if let Some(Fault::RejectSubmit) = self.fault {
            return Err(Error::submit(req.wr_id, "rejected by test transport"));
        }
        let payload = self.local[0].load(Ordering::Relaxed);
        self.trace.push(Op::Submit {
            wr_id: req.wr_id,
            payload,
        });
        if !matches!(self.fault, Some(Fault::Syndrome(_))) {
            self.target.store(payload, Ordering::Relaxed);
        }
        self.pending = Some(req.wr_id);
        Ok(())
    }

    fn poll_completion(&mut self) -> Result<Completion> {
        let wr_id = self.pending.take().ok_or(Error::CompletionFailed {
            wr_id: 0,
            reason: CompletionFailure::NothingOutstanding,
        })?;
        self.trace.push(Op::Complete { wr_id });
        Ok(match self.fault {
            Some(Fault::WrongWrId) => Completion {
                wr_id: 1000,
                status: CompletionStatus::Success,
            },
            Some(Fault::Syndrome(s)) => Completion {
                wr_id,
                status: CompletionStatus::Failed(s),
            },
            _ => Completion {
                wr_id,
                status: CompletionStatus::Success,
            },
        })
    }
}

/// Records each fence together with the counter value at that moment.
pub(crate) struct TracingFence<'a> {
    trace: Trace,
    counter: &'a ProgressCounter,
}

impl<'a> TracingFence<'a> {
    pub(crate) fn new(trace: Trace, counter: &'a ProgressCounter) -> Self {
        Self { trace, counter }
    }
}

impl Fence for TracingFence<'_> {
    fn full(&self) {
        self.trace.push(Op::Fence {
            counter: self.counter.load(),
        });
    }
}
