//! # visicheck - completion-then-visible checker for one-sided writes
//!
//! A writer pushes an increasing counter into a peer's exposed memory with a
//! one-sided remote write. Only after its transport signals completion does
//! it advance a [`ProgressCounter`] shared with the peer's checker. The checker
//! spins on two loads: the progress counter (a lower bound) and the exposed
//! memory cell (what the remote write actually deposited). Whenever the cell
//! is behind the bound, the completion the writer trusted was not yet backed
//! by a visible write, and a [`Violation`] is reported.
//!
//! ## Roles
//!
//! - [`Writer`]: stage `counter + 1`, submit a signaled write, block on its
//!   completion, fence, advance the counter.
//! - [`Checker`]: load the counter, fence, load the cell, compare.
//!
//! Both are driven by a [`RunContext`], which carries an optional iteration
//! bound and a cancellation flag. Production runs are unbounded.
//!
//! ## Ordering
//!
//! The two fences are the point of the exercise. Without the checker's fence
//! the cell load may be satisfied before the counter load and report a
//! violation that never happened; without the writer's fence the counter
//! advance may become visible before the completion it depends on. See
//! [`barrier`] and the weak-memory [`model`].
//!
//! ## Transport
//!
//! Connection setup, memory registration and the write/completion path are
//! consumed through the [`Transport`] and [`Rendezvous`] traits. The
//! `simnic` crate provides an in-process implementation.

#[macro_use]
pub mod barrier;

pub mod affinity;
pub mod cell;
pub mod checker;
pub mod counter;
pub mod error;
pub mod harness;
pub mod model;
pub mod run;
pub mod transport;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_utils;

pub use barrier::{Fence, FullFence};
pub use cell::{CellView, RemoteCell};
pub use checker::{Checker, CheckerReport, Poll, Violation};
pub use counter::ProgressCounter;
pub use error::{CompletionFailure, Error, Result};
pub use harness::{HarnessConfig, RunSummary};
pub use run::RunContext;
pub use transport::{
    Completion, CompletionStatus, ConnectionParams, RemoteRegion, Rendezvous, Transport,
    WriteRequest,
};
pub use writer::{WriteAttempt, Writer, WriterReport};
