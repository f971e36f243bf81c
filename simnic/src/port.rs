//! A connected endpoint on the simulated NIC.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use visicheck::{
    Completion, CompletionFailure, ConnectionParams, Error, RemoteRegion, Result, Transport,
    WriteRequest,
};

use crate::buffer::AlignedBuffer;
use crate::cq::{CompletionQueue, Cqe, syndrome};
use crate::mr::{AccessFlags, MemoryRegion};
use crate::nic::{DmaTarget, Nic};
use crate::qp::{QpState, QueuePair};

const CQ_DEPTH: usize = 16;

/// When a write's DMA lands relative to its CQE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// DMA lands, then the CQE is generated.
    #[default]
    Ordered,
    /// The CQE is generated first. The DMA lands no earlier than `lag` after
    /// it, and before the next write on the queue pair starts.
    EarlyCompletion { lag: Duration },
}

#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Process-local device index, carried in the endpoint for logging.
    pub id: usize,
    /// Physical port number.
    pub port: u8,
    /// Size of the registered buffer. Must be a non-zero multiple of 8.
    pub buf_size: usize,
    pub delivery: Delivery,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            id: 0,
            port: 1,
            buf_size: 8,
            delivery: Delivery::Ordered,
        }
    }
}

/// What one side publishes so the other can connect and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub id: usize,
    pub port: u8,
    pub qp_num: u32,
    pub region: RemoteRegion,
}

impl ConnectionParams for Endpoint {
    fn exposed_region(&self) -> RemoteRegion {
        self.region
    }
}

#[derive(Debug)]
struct PendingDma {
    target: DmaTarget,
    payload: Vec<u64>,
    due: Instant,
}

/// An initialized port: registered buffer, queue pair and completion queue.
///
/// At most one signaled write is outstanding at a time.
#[derive(Debug)]
pub struct Port {
    nic: Nic,
    config: PortConfig,
    mr: MemoryRegion,
    qp: QueuePair,
    cq: CompletionQueue,
    outstanding: Option<u64>,
    pending_dma: Option<PendingDma>,
}

impl Port {
    /// Initialize a port: allocate and register the buffer, create the QP and
    /// move it to INIT.
    pub fn open(nic: &Nic, config: PortConfig) -> Result<Self> {
        if config.port >= nic.ports() {
            return Err(Error::setup(
                "initialize",
                format!("no port {} (device has {})", config.port, nic.ports()),
            ));
        }
        if config.buf_size > u32::MAX as usize {
            return Err(Error::setup(
                "initialize",
                format!("buffer of {} bytes exceeds region limit", config.buf_size),
            ));
        }
        let buffer = AlignedBuffer::new(config.buf_size)
            .map_err(|e| Error::setup("initialize", e.to_string()))?;

        let access = AccessFlags::LOCAL_WRITE | AccessFlags::REMOTE_WRITE | AccessFlags::REMOTE_READ;
        let mr = MemoryRegion::register(nic, Arc::new(buffer), access);

        let mut qp = QueuePair::new(nic.alloc_qpn());
        qp.modify_to_init(config.port)
            .map_err(|e| Error::setup("initialize", e.to_string()))?;

        tracing::debug!(
            "port {}:{} initialized, QP {:#x}, {} bytes at {:#x} rkey {:#x}",
            config.id,
            config.port,
            qp.qpn(),
            mr.len(),
            mr.addr(),
            mr.rkey()
        );

        Ok(Self {
            nic: nic.clone(),
            config,
            mr,
            qp,
            cq: CompletionQueue::new(CQ_DEPTH),
            outstanding: None,
            pending_dma: None,
        })
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn qp_state(&self) -> QpState {
        self.qp.state()
    }

    pub fn memory_region(&self) -> &MemoryRegion {
        &self.mr
    }

    /// Whether a completed write has not landed in target memory yet.
    pub fn has_pending_dma(&self) -> bool {
        self.pending_dma.is_some()
    }

    /// Advance the DMA engine: land a deferred write whose lag has elapsed.
    ///
    /// Returns true if a write landed.
    pub fn progress(&mut self) -> bool {
        match &self.pending_dma {
            Some(dma) if Instant::now() >= dma.due => {}
            _ => return false,
        }
        match self.pending_dma.take() {
            Some(dma) => {
                dma.target.land(&dma.payload);
                true
            }
            None => false,
        }
    }

    /// Writes on one QP land in order, so drain the engine before the next one.
    fn drain(&mut self) {
        while self.has_pending_dma() {
            if !self.progress() {
                thread::yield_now();
            }
        }
    }

    /// Gather the payload from the local buffer.
    fn gather(&self, req: &WriteRequest) -> std::result::Result<Vec<u64>, u8> {
        let len = req.len as usize;
        let end = req.local_offset.checked_add(len);
        if len == 0
            || len % 8 != 0
            || req.local_offset % 8 != 0
            || end.is_none_or(|end| end > self.mr.len())
        {
            return Err(syndrome::LOCAL_LENGTH_ERR);
        }
        let first = req.local_offset / 8;
        let slots = &self.local_slots()[first..first + len / 8];
        Ok(slots.iter().map(|s| s.load(Ordering::Relaxed)).collect())
    }

    fn complete(&mut self, cqe: Cqe) -> Result<()> {
        if cqe.is_error() {
            tracing::debug!(
                "QP {:#x}: wr_id {} failed with syndrome {:#04x}",
                self.qp.qpn(),
                cqe.wr_id,
                cqe.syndrome
            );
            self.qp.set_error();
        }
        self.cq
            .push(cqe)
            .map_err(|e| Error::submit(cqe.wr_id, e.to_string()))
    }
}

impl Drop for Port {
    /// A write whose completion was already reported still lands.
    fn drop(&mut self) {
        self.drain();
    }
}

impl Transport for Port {
    type Endpoint = Endpoint;

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            id: self.config.id,
            port: self.config.port,
            qp_num: self.qp.qpn(),
            region: RemoteRegion {
                addr: self.mr.addr(),
                len: self.mr.len() as u32,
                rkey: self.mr.rkey(),
            },
        }
    }

    fn connect(&mut self, peer: &Endpoint) -> Result<()> {
        self.qp
            .connect(peer.qp_num)
            .map_err(|e| Error::setup("connect", e.to_string()))?;
        tracing::debug!(
            "QP {:#x} connected to QP {:#x} on port {}:{}",
            self.qp.qpn(),
            peer.qp_num,
            peer.id,
            peer.port
        );
        Ok(())
    }

    fn local_slots(&self) -> &[AtomicU64] {
        self.mr.buffer().slots()
    }

    fn submit_write(&mut self, req: &WriteRequest) -> Result<()> {
        self.drain();

        if let Some(prev) = self.outstanding {
            return Err(Error::submit(
                req.wr_id,
                format!("wr_id {} is still outstanding", prev),
            ));
        }
        match self.qp.state() {
            QpState::Rts => {}
            QpState::Error => {
                // Posted after a failure: flushed, not executed.
                self.outstanding = Some(req.wr_id);
                let flushed = Cqe::error(req.wr_id, self.qp.qpn(), syndrome::WR_FLUSH_ERR);
                return self.complete(flushed);
            }
            state => {
                return Err(Error::submit(
                    req.wr_id,
                    format!("QP {:#x} is in state {:?}", self.qp.qpn(), state),
                ));
            }
        }
        self.outstanding = Some(req.wr_id);

        let resolved = self.gather(req).and_then(|payload| {
            self.nic
                .resolve(req.rkey, req.remote_addr, req.len as usize)
                .map(|target| (target, payload))
        });
        let (target, payload) = match resolved {
            Ok(resolved) => resolved,
            Err(code) => return self.complete(Cqe::error(req.wr_id, self.qp.qpn(), code)),
        };

        let cqe = Cqe::success(req.wr_id, self.qp.qpn(), req.len);
        match self.config.delivery {
            Delivery::Ordered => {
                target.land(&payload);
                self.complete(cqe)
            }
            Delivery::EarlyCompletion { lag } => {
                self.complete(cqe)?;
                self.pending_dma = Some(PendingDma {
                    target,
                    payload,
                    due: Instant::now() + lag,
                });
                Ok(())
            }
        }
    }

    fn poll_completion(&mut self) -> Result<Completion> {
        let Some(wr_id) = self.outstanding else {
            return Err(Error::CompletionFailed {
                wr_id: 0,
                reason: CompletionFailure::NothingOutstanding,
            });
        };
        // Every accepted submit generated its CQE, so this never spins.
        let cqe = self.cq.poll_one().ok_or(Error::CompletionFailed {
            wr_id,
            reason: CompletionFailure::NothingOutstanding,
        })?;
        self.outstanding = None;
        Ok(cqe.into())
    }
}
