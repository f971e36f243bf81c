//! Page-aligned registrable memory.

use std::io;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU64;

/// Page size for aligned allocations.
pub const PAGE_SIZE: usize = 4096;

/// Zeroed, page-aligned buffer addressed as 8-byte slots.
///
/// All access after construction goes through [`AlignedBuffer::slots`], so
/// the simulated DMA engine and local readers never race on plain memory.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    capacity: usize,
}

// Safety: the memory is only ever accessed through `&[AtomicU64]`.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocate `len` usable bytes, rounded up to whole pages.
    ///
    /// `len` must be a non-zero multiple of 8.
    pub fn new(len: usize) -> io::Result<Self> {
        if len == 0 || len % 8 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer length {} is not a non-zero multiple of 8", len),
            ));
        }
        let capacity = len
            .checked_next_multiple_of(PAGE_SIZE)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "buffer too large"))?;

        let mut raw: *mut libc::c_void = std::ptr::null_mut();
        let ret = unsafe { libc::posix_memalign(&mut raw, PAGE_SIZE, capacity) };
        if ret != 0 {
            return Err(io::Error::from_raw_os_error(ret));
        }
        let ptr = NonNull::new(raw as *mut u8)
            .ok_or_else(|| io::Error::other("posix_memalign returned null"))?;
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, capacity);
        }

        Ok(Self { ptr, len, capacity })
    }

    /// Buffer address as u64.
    pub fn addr(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    /// Usable length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated bytes (whole pages).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The usable bytes as 8-byte atomic slots.
    pub fn slots(&self) -> &[AtomicU64] {
        // Safety: page alignment satisfies AtomicU64 alignment, the memory is
        // initialized and lives as long as `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const AtomicU64, self.len / 8) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::free(self.ptr.as_ptr() as *mut libc::c_void);
        }
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len)
            .finish()
    }
}
