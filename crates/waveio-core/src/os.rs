//! Platform-portable OS primitives.
//!
//! Everything above this module — the ring buffer, the context, the backends —
//! is written against this narrow surface rather than against `std::sync`,
//! `libc`, or `windows` directly, so that porting a backend only ever touches
//! this file and the backend itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use thiserror::Error;

/// Errors raised by the OS-primitives layer.
///
/// Per the propagation policy, callers above this module fold every variant
/// into either `Error::NoMem` or `Error::SystemResources`.
#[derive(Debug, Error)]
pub enum OsError {
    /// The mirrored-memory allocator could not reserve or map pages.
    #[error("failed to allocate mirrored memory: {0}")]
    MirroredMemory(String),

    /// A thread, pipe, or other OS handle could not be created.
    #[error("system resource unavailable: {0}")]
    SystemResources(String),
}

/// Returns the system's virtual memory page size in bytes.
#[cfg(unix)]
pub fn page_size() -> usize {
    // SAFETY: sysconf(_SC_PAGESIZE) has no preconditions and always returns
    // a positive value on the platforms this crate supports.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

/// Returns the system's virtual memory page size in bytes.
#[cfg(windows)]
pub fn page_size() -> usize {
    use windows::Win32::System::SystemInformation::GetSystemInfo;
    let mut info = Default::default();
    // SAFETY: `info` is a valid, zero-initialized SYSTEM_INFO out-param.
    unsafe { GetSystemInfo(&mut info) };
    info.dwPageSize as usize
}

/// Monotonic clock reading, in seconds, suitable for latency accounting.
///
/// Mirrors `soundio_os_get_time`: a monotonic source immune to wall-clock
/// adjustments, backed by `std::time::Instant`.
pub fn monotonic_time() -> f64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    Instant::now().saturating_duration_since(start).as_secs_f64()
}

/// A region of memory mapped twice consecutively: reading or writing
/// `capacity` contiguous bytes starting anywhere in `[0, capacity)` never
/// needs to wrap, because the second half mirrors the first.
pub struct MirroredMemory {
    address: *mut u8,
    capacity: usize,
    #[cfg(unix)]
    raw_fd: std::os::unix::io::RawFd,
    #[cfg(windows)]
    file_mapping: windows::Win32::Foundation::HANDLE,
}

// SAFETY: the mapped pages are exclusively owned by the `MirroredMemory` that
// created them; callers coordinate access through the SPSC ring buffer
// protocol, not through aliasing of this handle itself.
unsafe impl Send for MirroredMemory {}
unsafe impl Sync for MirroredMemory {}

impl MirroredMemory {
    /// Allocates a mirrored region of at least `requested_capacity` bytes,
    /// rounded up to the next page-size multiple.
    #[cfg(unix)]
    pub fn new(requested_capacity: usize) -> Result<Self, OsError> {
        let page = page_size();
        let capacity = requested_capacity.div_ceil(page) * page;

        // SAFETY: memfd_create with no flags returns an owned fd or -1; we
        // check for -1 before using the fd further.
        let fd = unsafe { libc::memfd_create(c"waveio-ring-buffer".as_ptr(), 0) };
        if fd < 0 {
            return Err(OsError::MirroredMemory("memfd_create failed".into()));
        }
        // SAFETY: fd is a valid, just-created file descriptor.
        if unsafe { libc::ftruncate(fd, capacity as libc::off_t) } != 0 {
            unsafe { libc::close(fd) };
            return Err(OsError::MirroredMemory("ftruncate failed".into()));
        }

        // Reserve address space for two copies back to back, then map the
        // same file twice over the reservation: first half read-write,
        // second half read-write, both backed by the same pages.
        // SAFETY: PROT_NONE reservation of `2 * capacity` anonymous bytes.
        let reservation = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                capacity * 2,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if reservation == libc::MAP_FAILED {
            unsafe { libc::close(fd) };
            return Err(OsError::MirroredMemory("mmap reservation failed".into()));
        }

        // SAFETY: `reservation` is a valid address we just reserved with
        // enough room for `capacity` bytes at offset 0.
        let first = unsafe {
            libc::mmap(
                reservation,
                capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_FIXED | libc::MAP_SHARED,
                fd,
                0,
            )
        };
        // SAFETY: same file, second half of the reservation.
        let second = unsafe {
            libc::mmap(
                reservation.byte_add(capacity),
                capacity,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_FIXED | libc::MAP_SHARED,
                fd,
                0,
            )
        };

        if first != reservation || second != reservation.wrapping_byte_add(capacity) {
            // SAFETY: tearing down exactly what we just mapped.
            unsafe {
                libc::munmap(reservation, capacity * 2);
                libc::close(fd);
            }
            return Err(OsError::MirroredMemory(
                "failed to mirror pages at a contiguous address".into(),
            ));
        }

        Ok(Self {
            address: reservation.cast(),
            capacity,
            raw_fd: fd,
        })
    }

    /// Allocates a mirrored region of at least `requested_capacity` bytes,
    /// rounded up to the next page-size multiple.
    #[cfg(windows)]
    pub fn new(requested_capacity: usize) -> Result<Self, OsError> {
        use windows::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
        use windows::Win32::System::Memory::{
            CreateFileMappingW, MapViewOfFile3, PAGE_READWRITE, PAGE_NOACCESS, UnmapViewOfFile,
            VirtualAlloc2, VirtualFree, MEM_RESERVE, MEM_RESERVE_PLACEHOLDER,
            MEM_REPLACE_PLACEHOLDER,
        };

        let page = page_size();
        let capacity = requested_capacity.div_ceil(page) * page;

        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                0,
                capacity as u32 * 2,
                None,
            )
        }
        .map_err(|e| OsError::MirroredMemory(e.to_string()))?;

        let placeholder = unsafe {
            VirtualAlloc2(
                None,
                None,
                capacity * 2,
                MEM_RESERVE | MEM_RESERVE_PLACEHOLDER,
                PAGE_NOACCESS.0,
                None,
            )
        };
        if placeholder.is_null() {
            unsafe { let _ = CloseHandle(mapping); }
            return Err(OsError::MirroredMemory("VirtualAlloc2 failed".into()));
        }

        unsafe {
            let _ = VirtualFree(placeholder, capacity, MEM_REPLACE_PLACEHOLDER);
        }
        let view1 = unsafe {
            MapViewOfFile3(
                mapping,
                None,
                Some(placeholder),
                0,
                capacity,
                MEM_REPLACE_PLACEHOLDER,
                PAGE_READWRITE.0,
                None,
            )
        };
        let second_half = unsafe { placeholder.byte_add(capacity) };
        unsafe {
            let _ = VirtualFree(second_half, capacity, MEM_REPLACE_PLACEHOLDER);
        }
        let view2 = unsafe {
            MapViewOfFile3(
                mapping,
                None,
                Some(second_half),
                0,
                capacity,
                MEM_REPLACE_PLACEHOLDER,
                PAGE_READWRITE.0,
                None,
            )
        };

        if view1.Value.is_null() || view2.Value.is_null() {
            if !view1.Value.is_null() {
                let _ = unsafe { UnmapViewOfFile(view1) };
            }
            unsafe { let _ = CloseHandle(mapping); }
            return Err(OsError::MirroredMemory(
                "failed to mirror pages at a contiguous address".into(),
            ));
        }

        Ok(Self {
            address: placeholder.cast(),
            capacity,
            file_mapping: mapping,
        })
    }

    /// Base address of the mirrored region. The first `capacity` bytes are
    /// aliased at `address + capacity`.
    #[must_use]
    pub fn address(&self) -> *mut u8 {
        self.address
    }

    /// Size in bytes of one copy of the mirrored region (page-aligned).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for MirroredMemory {
    #[cfg(unix)]
    fn drop(&mut self) {
        // SAFETY: tearing down exactly the mapping and fd created in `new`.
        unsafe {
            libc::munmap(self.address.cast(), self.capacity * 2);
            libc::close(self.raw_fd);
        }
    }

    #[cfg(windows)]
    fn drop(&mut self) {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Memory::{MEM_RELEASE, VirtualFree};
        unsafe {
            let _ = VirtualFree(self.address.cast(), 0, MEM_RELEASE);
            let _ = CloseHandle(self.file_mapping);
        }
    }
}

/// Process-wide one-shot latch used by [`warn_rt_priority_once`] so a
/// real-time-priority failure is reported to the caller's hook exactly once
/// per process, not once per stream.
static RT_PRIORITY_WARNING_EMITTED: AtomicBool = AtomicBool::new(false);

/// Calls `emit` the first time this function is invoked in the process and
/// is a no-op on every subsequent call. Used to report that a worker thread
/// fell back to default scheduling priority.
pub fn warn_rt_priority_once(emit: impl FnOnce()) {
    if RT_PRIORITY_WARNING_EMITTED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        emit();
    }
}

/// Requests real-time scheduling priority for the calling thread. Returns
/// `true` if the request succeeded, `false` if the OS declined it (the
/// caller should fall back to default priority and report through
/// [`warn_rt_priority_once`]).
#[cfg(unix)]
pub fn try_set_realtime_priority() -> bool {
    // SAFETY: sched_get_priority_max/sched_setscheduler take no pointers
    // besides the stack-local `param`, which we fully initialize.
    unsafe {
        let max_priority = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if max_priority < 0 {
            return false;
        }
        let param = libc::sched_param {
            sched_priority: max_priority,
        };
        libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) == 0
    }
}

/// Requests real-time scheduling priority for the calling thread. Returns
/// `true` if the request succeeded, `false` if the OS declined it.
#[cfg(windows)]
pub fn try_set_realtime_priority() -> bool {
    use windows::Win32::System::Threading::{
        GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_TIME_CRITICAL,
    };
    unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_TIME_CRITICAL) }.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_positive_power_of_two() {
        let size = page_size();
        assert!(size > 0);
        assert_eq!(size & (size - 1), 0, "page size {size} is not a power of two");
    }

    #[test]
    fn mirrored_memory_rounds_up_to_page_size() {
        let mem = MirroredMemory::new(10).expect("allocate mirrored memory");
        assert_eq!(mem.capacity(), page_size());
    }

    #[test]
    fn mirrored_memory_aliases_second_half() {
        let mem = MirroredMemory::new(64).expect("allocate mirrored memory");
        let cap = mem.capacity();
        // SAFETY: writing within the first copy, reading the mirrored alias.
        unsafe {
            std::ptr::write(mem.address(), 0xAB);
            let mirrored = std::ptr::read(mem.address().byte_add(cap));
            assert_eq!(mirrored, 0xAB);
        }
    }

    #[test]
    fn rt_priority_warning_fires_once() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        // This test shares the process-global latch with other tests, so it
        // only asserts monotonicity, not that it starts at zero.
        let before = RT_PRIORITY_WARNING_EMITTED.load(Ordering::SeqCst);
        warn_rt_priority_once(|| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        assert!(RT_PRIORITY_WARNING_EMITTED.load(Ordering::SeqCst));
        warn_rt_priority_once(|| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        let fired = calls.load(Ordering::SeqCst);
        assert!(fired <= 1);
        let _ = before;
    }

    #[test]
    fn monotonic_time_is_nondecreasing() {
        let a = monotonic_time();
        let b = monotonic_time();
        assert!(b >= a);
    }
}
