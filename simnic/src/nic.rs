//! The simulated fabric: region table, QP numbering and DMA.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::buffer::AlignedBuffer;
use crate::cq::syndrome;
use crate::mr::AccessFlags;

/// Ports on a NIC built with [`Nic::new`].
pub const DEFAULT_PORTS: u8 = 2;

const FIRST_QPN: u32 = 0x100;
const FIRST_KEY: u32 = 0x1000;

#[derive(Debug)]
struct Region {
    buffer: Arc<AlignedBuffer>,
    access: AccessFlags,
}

#[derive(Debug)]
struct Fabric {
    ports: u8,
    regions: Mutex<HashMap<u32, Region>>,
    next_qpn: AtomicU32,
    next_key: AtomicU32,
}

/// Handle to a simulated NIC. Clones share the same fabric.
#[derive(Debug, Clone)]
pub struct Nic {
    inner: Arc<Fabric>,
}

impl Default for Nic {
    fn default() -> Self {
        Self::new()
    }
}

impl Nic {
    pub fn new() -> Self {
        Self::with_ports(DEFAULT_PORTS)
    }

    pub fn with_ports(ports: u8) -> Self {
        Self {
            inner: Arc::new(Fabric {
                ports,
                regions: Mutex::new(HashMap::new()),
                next_qpn: AtomicU32::new(FIRST_QPN),
                next_key: AtomicU32::new(FIRST_KEY),
            }),
        }
    }

    pub fn ports(&self) -> u8 {
        self.inner.ports
    }

    /// Number of currently registered memory regions.
    pub fn registered_regions(&self) -> usize {
        self.regions().len()
    }

    pub(crate) fn alloc_qpn(&self) -> u32 {
        self.inner.next_qpn.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns `(lkey, rkey)`.
    pub(crate) fn register(&self, buffer: Arc<AlignedBuffer>, access: AccessFlags) -> (u32, u32) {
        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "register MR key={:#x} addr={:#x} len={} access={:?}",
            key,
            buffer.addr(),
            buffer.len(),
            access
        );
        self.regions().insert(key, Region { buffer, access });
        (key, key)
    }

    pub(crate) fn deregister(&self, rkey: u32) {
        self.regions().remove(&rkey);
    }

    /// Resolve the target of a remote write of `len` bytes at `remote_addr`.
    ///
    /// Fails with a CQE syndrome if the rkey is unknown, the region forbids
    /// remote writes, or the range is misaligned or out of bounds.
    pub(crate) fn resolve(&self, rkey: u32, remote_addr: u64, len: usize) -> Result<DmaTarget, u8> {
        let regions = self.regions();
        let region = regions.get(&rkey).ok_or(syndrome::REMOTE_ACCESS_ERR)?;
        if !region.access.contains(AccessFlags::REMOTE_WRITE) {
            return Err(syndrome::REMOTE_ACCESS_ERR);
        }

        let offset = remote_addr
            .checked_sub(region.buffer.addr())
            .and_then(|o| usize::try_from(o).ok())
            .ok_or(syndrome::REMOTE_ACCESS_ERR)?;
        let end = offset.checked_add(len).ok_or(syndrome::REMOTE_ACCESS_ERR)?;
        if offset % 8 != 0 || end > region.buffer.len() {
            return Err(syndrome::REMOTE_ACCESS_ERR);
        }

        Ok(DmaTarget {
            buffer: Arc::clone(&region.buffer),
            first_slot: offset / 8,
        })
    }

    fn regions(&self) -> MutexGuard<'_, HashMap<u32, Region>> {
        self.inner
            .regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A resolved remote write destination.
///
/// Holds its own reference to the target buffer, so a write already in
/// flight lands even if the region is deregistered meanwhile.
#[derive(Debug)]
pub(crate) struct DmaTarget {
    buffer: Arc<AlignedBuffer>,
    first_slot: usize,
}

impl DmaTarget {
    /// Store `payload` into target memory, one slot at a time.
    pub(crate) fn land(&self, payload: &[u64]) {
        let slots = &self.buffer.slots()[self.first_slot..];
        for (slot, &value) in slots.iter().zip(payload) {
            slot.store(value, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(len: usize) -> Arc<AlignedBuffer> {
        Arc::new(AlignedBuffer::new(len).unwrap())
    }

    #[test]
    fn resolves_and_lands_within_bounds() {
        let nic = Nic::new();
        let buf = buffer(16);
        let (_, rkey) = nic.register(Arc::clone(&buf), AccessFlags::REMOTE_WRITE);

        let target = nic.resolve(rkey, buf.addr() + 8, 8).unwrap();
        target.land(&[42]);
        assert_eq!(buf.slots()[0].load(Ordering::Relaxed), 0);
        assert_eq!(buf.slots()[1].load(Ordering::Relaxed), 42);
    }

    #[test]
    fn rejects_bad_remote_access() {
        let nic = Nic::new();
        let buf = buffer(8);
        let (_, rkey) = nic.register(Arc::clone(&buf), AccessFlags::REMOTE_WRITE);
        let (_, read_only) = nic.register(Arc::clone(&buf), AccessFlags::REMOTE_READ);

        let err = |r: Result<DmaTarget, u8>| r.unwrap_err();
        assert_eq!(err(nic.resolve(rkey + 100, buf.addr(), 8)), syndrome::REMOTE_ACCESS_ERR);
        assert_eq!(err(nic.resolve(read_only, buf.addr(), 8)), syndrome::REMOTE_ACCESS_ERR);
        assert_eq!(err(nic.resolve(rkey, buf.addr() + 8, 8)), syndrome::REMOTE_ACCESS_ERR);
        assert_eq!(err(nic.resolve(rkey, buf.addr() + 4, 4)), syndrome::REMOTE_ACCESS_ERR);
        assert_eq!(err(nic.resolve(rkey, buf.addr() - 8, 8)), syndrome::REMOTE_ACCESS_ERR);
    }

    #[test]
    fn deregistered_key_is_unknown() {
        let nic = Nic::new();
        let buf = buffer(8);
        let (_, rkey) = nic.register(Arc::clone(&buf), AccessFlags::REMOTE_WRITE);
        assert_eq!(nic.registered_regions(), 1);
        nic.deregister(rkey);
        assert_eq!(nic.registered_regions(), 0);
        assert!(nic.resolve(rkey, buf.addr(), 8).is_err());
    }
}
