//! Memory Region registration.

use std::sync::Arc;

use bitflags::bitflags;

use crate::buffer::AlignedBuffer;
use crate::nic::Nic;

bitflags! {
    /// Memory access flags for Memory Region registration.
    ///
    /// Local read access is always enabled. A simulated remote write to a
    /// region without `REMOTE_WRITE` completes with a remote access error.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        /// Enable local write access.
        const LOCAL_WRITE = 1 << 0;
        /// Enable remote write access.
        const REMOTE_WRITE = 1 << 1;
        /// Enable remote read access.
        const REMOTE_READ = 1 << 2;
    }
}

/// A registered buffer. Deregistered from its [`Nic`] on drop.
#[derive(Debug)]
pub struct MemoryRegion {
    nic: Nic,
    buffer: Arc<AlignedBuffer>,
    lkey: u32,
    rkey: u32,
    access: AccessFlags,
}

impl MemoryRegion {
    /// Register `buffer` on `nic` with the given access rights.
    pub fn register(nic: &Nic, buffer: Arc<AlignedBuffer>, access: AccessFlags) -> Self {
        let (lkey, rkey) = nic.register(Arc::clone(&buffer), access);
        Self {
            nic: nic.clone(),
            buffer,
            lkey,
            rkey,
            access,
        }
    }

    /// Returns the local key (L_Key) for this memory region.
    pub fn lkey(&self) -> u32 {
        self.lkey
    }

    /// Returns the remote key (R_Key) for this memory region.
    pub fn rkey(&self) -> u32 {
        self.rkey
    }

    pub fn addr(&self) -> u64 {
        self.buffer.addr()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn access(&self) -> AccessFlags {
        self.access
    }

    pub fn buffer(&self) -> &AlignedBuffer {
        &self.buffer
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        self.nic.deregister(self.rkey);
    }
}
