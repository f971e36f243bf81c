//! Contracts the roles consume from the transport layer.
//!
//! A [`Transport`] handle owns one registered local buffer and one queue pair.
//! A [`Rendezvous`] is the side channel peers use to find each other before
//! the queue pairs are connected.

use std::sync::atomic::AtomicU64;
use std::thread;
use std::time::Duration;

use crate::cell::RemoteCell;
use crate::error::{Error, Result};
use crate::run::RunContext;

/// A peer's registered buffer, as addressed by one-sided writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteRegion {
    /// Virtual address of the first byte.
    pub addr: u64,
    /// Length in bytes.
    pub len: u32,
    /// Key authorising remote access.
    pub rkey: u32,
}

/// One signaled one-sided write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    /// Returned unchanged in the matching [`Completion`].
    pub wr_id: u64,
    /// Byte offset of the payload in the local registered buffer.
    pub local_offset: usize,
    /// Payload length in bytes.
    pub len: u32,
    pub remote_addr: u64,
    pub rkey: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    /// Error syndrome reported by the transport.
    Failed(u8),
}

/// Local notification that a submitted write is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub wr_id: u64,
    pub status: CompletionStatus,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.status == CompletionStatus::Success
    }
}

/// Connection parameters a peer publishes.
pub trait ConnectionParams {
    /// Where the peer's exposed buffer lives.
    fn exposed_region(&self) -> RemoteRegion;
}

impl ConnectionParams for RemoteRegion {
    fn exposed_region(&self) -> RemoteRegion {
        *self
    }
}

/// One endpoint of a reliable connection with one registered buffer.
///
/// Slot 0 of the local buffer doubles as the exposed memory cell on the
/// checker side and as the staging area on the writer side.
pub trait Transport {
    type Endpoint: ConnectionParams + Clone + Send + Sync;

    /// Parameters the peer needs to connect to this handle.
    fn endpoint(&self) -> Self::Endpoint;

    /// Transition the queue pair to ready-to-send/receive against `peer`.
    fn connect(&mut self, peer: &Self::Endpoint) -> Result<()>;

    /// The local registered buffer as 8-byte slots.
    fn local_slots(&self) -> &[AtomicU64];

    /// Enqueue a signaled one-sided write. At most one may be in flight.
    fn submit_write(&mut self, req: &WriteRequest) -> Result<()>;

    /// Block until the previously submitted write completes.
    fn poll_completion(&mut self) -> Result<Completion>;

    /// The exposed memory cell: slot 0 of the local buffer.
    fn exposed_cell(&self) -> RemoteCell<'_> {
        RemoteCell::new(&self.local_slots()[0])
    }
}

/// Side channel for publishing and discovering connection parameters.
pub trait Rendezvous<E> {
    fn publish(&self, label: &str, endpoint: E) -> Result<()>;

    /// `None` until a peer has published under `label`.
    fn discover(&self, label: &str) -> Result<Option<E>>;

    /// One-shot marker that the peer under `label` is connected and looping.
    fn publish_ready(&self, label: &str) -> Result<()>;

    fn is_ready(&self, label: &str) -> Result<bool>;
}

/// Poll `discover(label)` every `interval` until a peer shows up.
///
/// A missing peer is expected while it starts; only cancellation of `ctx`
/// ends the wait early.
pub fn discover_blocking<E, R>(
    rendezvous: &R,
    label: &str,
    interval: Duration,
    ctx: &RunContext,
) -> Result<E>
where
    R: Rendezvous<E> + ?Sized,
{
    loop {
        if let Some(endpoint) = rendezvous.discover(label)? {
            return Ok(endpoint);
        }
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        thread::sleep(interval);
    }
}

/// Poll until the peer under `label` has published its ready marker.
pub fn wait_ready<E, R>(
    rendezvous: &R,
    label: &str,
    interval: Duration,
    ctx: &RunContext,
) -> Result<()>
where
    R: Rendezvous<E> + ?Sized,
{
    while !rendezvous.is_ready(label)? {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        thread::sleep(interval);
    }
    Ok(())
}
