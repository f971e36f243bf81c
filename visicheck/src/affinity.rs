//! CPU pinning for the two spinning roles.

use std::io;

#[cfg(target_os = "linux")]
fn num_online_cores() -> usize {
    unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) as usize }
}

/// Pin the calling thread to `core_id`.
#[cfg(target_os = "linux")]
pub fn pin_to_core(core_id: usize) -> io::Result<()> {
    let online = num_online_cores();
    if core_id >= online {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("core {} out of range ({} online)", core_id, online),
        ));
    }
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core_id, &mut set);
        let ret = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if ret == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_core(_core_id: usize) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "thread pinning is only supported on Linux",
    ))
}

/// Pin the current thread if a core is configured. Does nothing if None.
///
/// A failure to pin is logged; the role still runs, just unpinned.
pub fn pin_thread_if_configured(role: &str, core: Option<usize>) {
    let Some(core_id) = core else {
        return;
    };

    match pin_to_core(core_id) {
        Ok(()) => tracing::info!("{} pinned to core {}", role, core_id),
        Err(e) => tracing::warn!("{}: failed to pin to core {} ({})", role, core_id, e),
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_core_is_rejected() {
        let err = pin_to_core(usize::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn unconfigured_is_a_no_op() {
        pin_thread_if_configured("test", None);
    }
}
