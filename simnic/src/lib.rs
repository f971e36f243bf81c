//! # simnic - in-process simulated RDMA NIC
//!
//! Just enough of a reliable-connected RDMA device to run the visicheck
//! roles without hardware, with the one knob the checker exists to measure:
//! whether a write is visible in target memory by the time its completion is
//! reported.
//!
//! ## Model
//!
//! - [`Nic`]: the fabric. Owns the memory region table (rkey -> buffer) and
//!   hands out QP numbers. Ports on the same `Nic` can reach each other.
//! - [`Port`]: one initialized endpoint: a registered [`AlignedBuffer`], a
//!   [`QueuePair`] and a [`CompletionQueue`]. Implements
//!   [`visicheck::Transport`].
//! - [`Directory`]: in-process rendezvous implementing
//!   [`visicheck::Rendezvous`].
//!
//! ## Delivery
//!
//! A write's DMA and its CQE are two separate events. [`Delivery::Ordered`]
//! lands the DMA before generating the CQE, the way a correct RC transport
//! behaves. [`Delivery::EarlyCompletion`] generates the CQE first and lands
//! the DMA later: no earlier than `lag` after the CQE, and in any case before
//! the next write on the same queue pair starts.
//!
//! There is no engine thread. The DMA engine advances when the initiating
//! port is driven (`submit_write` or [`Port::progress`]).

pub mod buffer;
pub mod cq;
pub mod directory;
pub mod mr;
pub mod nic;
pub mod port;
pub mod qp;

pub use buffer::AlignedBuffer;
pub use cq::{CompletionQueue, Cqe, CqeOpcode};
pub use directory::Directory;
pub use mr::{AccessFlags, MemoryRegion};
pub use nic::Nic;
pub use port::{Delivery, Endpoint, Port, PortConfig};
pub use qp::{QpState, QueuePair};
