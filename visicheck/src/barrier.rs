//! Memory barriers for the write/observe protocol.
//!
//! Two orderings carry the whole check:
//!
//! - checker: the progress counter load happens before the exposed cell load
//! - writer: the counter advance happens after the transport completion
//!
//! Each is enforced by a compiler barrier followed by a hardware barrier.

/// Compiler-only barrier.
///
/// Keeps the compiler from moving memory accesses across this point.
/// Emits no instruction.
macro_rules! compiler_barrier {
    () => {
        ::std::sync::atomic::compiler_fence(::std::sync::atomic::Ordering::SeqCst)
    };
}

/// Full hardware barrier.
///
/// On x86/x86_64, issues `mfence`: all prior loads and stores are globally
/// performed before any later one. On ARM64, uses `dmb ish`.
/// Other targets fall back to a sequentially consistent fence.
macro_rules! hardware_barrier {
    () => {
        #[cfg(target_arch = "x86_64")]
        #[allow(unused_unsafe)]
        unsafe {
            ::std::arch::x86_64::_mm_mfence();
        }
        #[cfg(target_arch = "x86")]
        #[allow(unused_unsafe)]
        unsafe {
            ::std::arch::x86::_mm_mfence();
        }
        #[cfg(target_arch = "aarch64")]
        unsafe {
            ::std::arch::asm!("dmb ish", options(nostack, preserves_flags));
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
        {
            ::std::sync::atomic::fence(::std::sync::atomic::Ordering::SeqCst);
        }
    };
}

/// An ordering point between two memory operations of one role.
///
/// The writer and checker call [`Fence::full`] at the single place their
/// protocol needs ordering. Implementations other than [`FullFence`] exist
/// to show what happens when that ordering is missing.
pub trait Fence {
    fn full(&self);
}

impl<F: Fence + ?Sized> Fence for &F {
    #[inline(always)]
    fn full(&self) {
        (**self).full()
    }
}

/// Compiler barrier followed by a hardware barrier.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullFence;

impl Fence for FullFence {
    #[inline(always)]
    fn full(&self) {
        compiler_barrier!();
        hardware_barrier!();
    }
}

/// No ordering at all.
///
/// Only for demonstrating that the barriers are load-bearing.
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFence;

#[cfg(test)]
impl Fence for NoFence {
    #[inline(always)]
    fn full(&self) {}
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[test]
    fn full_fence_orders_store_before_load() {
        let flag = AtomicU64::new(0);
        flag.store(7, Ordering::Relaxed);
        FullFence.full();
        assert_eq!(flag.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn fence_by_reference() {
        fn issue<F: Fence>(f: F) {
            f.full();
        }
        let fence = FullFence;
        issue(&fence);
        issue(&NoFence);
    }
}
