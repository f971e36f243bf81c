//! Completion Queue (CQ).
//!
//! The simulated device produces one CQE per signaled write. Entries carry
//! the same fields a hardware requester CQE does, and convert into the
//! transport-neutral [`visicheck::Completion`].

use std::collections::VecDeque;
use std::io;

use visicheck::{Completion, CompletionStatus};

// =============================================================================
// CQE Types
// =============================================================================

/// CQE opcode values.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqeOpcode {
    /// Requester completion (SQ)
    Req = 0x00,
    /// Requester error
    ReqErr = 0x0d,
}

/// Error syndromes reported in [`Cqe::syndrome`].
pub mod syndrome {
    /// Local gather entry outside the registered buffer.
    pub const LOCAL_LENGTH_ERR: u8 = 0x01;
    /// Work request flushed because the QP is in the error state.
    pub const WR_FLUSH_ERR: u8 = 0x05;
    /// Unknown rkey, missing remote write permission, or out-of-bounds target.
    pub const REMOTE_ACCESS_ERR: u8 = 0x13;
}

/// Completion Queue Entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cqe {
    /// Operation code
    pub opcode: CqeOpcode,
    /// Work request id of the completed write
    pub wr_id: u64,
    /// QP number
    pub qp_num: u32,
    /// Bytes transferred
    pub byte_cnt: u32,
    /// Error syndrome (0 = success)
    pub syndrome: u8,
}

impl Cqe {
    pub(crate) fn success(wr_id: u64, qp_num: u32, byte_cnt: u32) -> Self {
        Self {
            opcode: CqeOpcode::Req,
            wr_id,
            qp_num,
            byte_cnt,
            syndrome: 0,
        }
    }

    pub(crate) fn error(wr_id: u64, qp_num: u32, syndrome: u8) -> Self {
        Self {
            opcode: CqeOpcode::ReqErr,
            wr_id,
            qp_num,
            byte_cnt: 0,
            syndrome,
        }
    }

    pub fn is_error(&self) -> bool {
        self.opcode == CqeOpcode::ReqErr
    }
}

impl From<Cqe> for Completion {
    fn from(cqe: Cqe) -> Self {
        let status = if cqe.is_error() {
            CompletionStatus::Failed(cqe.syndrome)
        } else {
            CompletionStatus::Success
        };
        Completion {
            wr_id: cqe.wr_id,
            status,
        }
    }
}

// =============================================================================
// Completion Queue
// =============================================================================

/// Bounded FIFO of CQEs.
#[derive(Debug)]
pub struct CompletionQueue {
    entries: VecDeque<Cqe>,
    depth: usize,
}

impl CompletionQueue {
    pub fn new(depth: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Append a CQE. Fails when the queue is full (CQ overrun).
    pub fn push(&mut self, cqe: Cqe) -> io::Result<()> {
        if self.entries.len() >= self.depth {
            return Err(io::Error::other(format!(
                "CQ overrun: {} entries outstanding",
                self.depth
            )));
        }
        self.entries.push_back(cqe);
        Ok(())
    }

    /// Take the oldest CQE, if any.
    pub fn poll_one(&mut self) -> Option<Cqe> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
