//! Writer loop.
//!
//! Produces an unbounded sequence of strictly increasing one-sided writes and
//! records each one as done only after the transport confirms it.

use std::sync::atomic::Ordering;

use crate::barrier::{Fence, FullFence};
use crate::counter::ProgressCounter;
use crate::error::{CompletionFailure, Error, Result};
use crate::run::RunContext;
use crate::transport::{Completion, CompletionStatus, RemoteRegion, Transport, WriteRequest};

/// Size of the counter value carried by every write.
const PAYLOAD_LEN: u32 = std::mem::size_of::<u64>() as u32;

/// A single write of `target` into the peer's exposed cell.
///
/// Lives from staging until its completion is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAttempt {
    pub wr_id: u64,
    pub target: u64,
    pub remote: RemoteRegion,
}

impl WriteAttempt {
    pub fn request(&self) -> WriteRequest {
        WriteRequest {
            wr_id: self.wr_id,
            local_offset: 0,
            len: PAYLOAD_LEN,
            remote_addr: self.remote.addr,
            rkey: self.remote.rkey,
        }
    }

    /// Accept `completion` only if it is a successful completion of this
    /// attempt.
    pub fn confirm(&self, completion: &Completion) -> Result<()> {
        if completion.wr_id != self.wr_id {
            return Err(Error::CompletionFailed {
                wr_id: self.wr_id,
                reason: CompletionFailure::Mismatch {
                    got: completion.wr_id,
                },
            });
        }
        match completion.status {
            CompletionStatus::Success => Ok(()),
            CompletionStatus::Failed(syndrome) => Err(Error::CompletionFailed {
                wr_id: self.wr_id,
                reason: CompletionFailure::Syndrome(syndrome),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    /// Writes whose completion was confirmed.
    pub writes: u64,
    /// Value carried by the last confirmed write.
    pub last_target: u64,
}

/// Client role: write, wait for completion, fence, advance.
pub struct Writer<'a, T: Transport, F: Fence = FullFence> {
    transport: T,
    peer: RemoteRegion,
    progress: &'a ProgressCounter,
    fence: F,
    next_wr_id: u64,
}

impl<'a, T: Transport, F: Fence> Writer<'a, T, F> {
    /// `peer` must be large enough for one counter value.
    pub fn new(
        transport: T,
        peer: RemoteRegion,
        progress: &'a ProgressCounter,
        fence: F,
    ) -> Result<Self> {
        if peer.len < PAYLOAD_LEN {
            return Err(Error::setup(
                "writer",
                format!("peer region of {} bytes cannot hold a counter", peer.len),
            ));
        }
        if transport.local_slots().is_empty() {
            return Err(Error::setup("writer", "no local staging buffer"));
        }
        Ok(Self {
            transport,
            peer,
            progress,
            fence,
            next_wr_id: 0,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Perform one write attempt. Returns the value written.
    ///
    /// The counter is advanced only if the completion is confirmed.
    pub fn write_once(&mut self) -> Result<u64> {
        // Single producer: nobody else advances the counter between this
        // load and our own advance.
        let target = self.progress.load() + 1;

        let attempt = WriteAttempt {
            wr_id: self.next_wr_id,
            target,
            remote: self.peer,
        };
        self.next_wr_id = self.next_wr_id.wrapping_add(1);

        self.transport.local_slots()[0].store(target, Ordering::Relaxed);
        self.transport.submit_write(&attempt.request())?;

        let completion = self.transport.poll_completion()?;
        attempt.confirm(&completion)?;

        // The completion must be final before the advance is observable.
        self.fence.full();

        self.progress.advance();
        tracing::debug!(wr_id = attempt.wr_id, target, "write confirmed");
        Ok(target)
    }

    /// Write until `ctx` says stop. Any transport error ends the run.
    pub fn run(&mut self, ctx: &RunContext) -> Result<WriterReport> {
        let mut report = WriterReport::default();
        while ctx.should_continue(report.writes) {
            report.last_target = self.write_once()?;
            report.writes += 1;
        }
        Ok(report)
    }
}
