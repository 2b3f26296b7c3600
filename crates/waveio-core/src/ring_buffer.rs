//! Lock-free single-producer/single-consumer ring buffer on mirrored memory.
//!
//! This is the only structure in the library shared between a real-time
//! audio thread and a non-real-time caller thread without a mutex. See
//! `os::MirroredMemory` for why reads and writes never need to branch on
//! wraparound.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::os::{MirroredMemory, OsError};

/// SPSC FIFO of raw bytes backed by a mirrored memory region.
///
/// `write_offset` and `read_offset` are monotonically increasing counters,
/// not positions modulo capacity; the modulo is taken only when computing a
/// pointer. `fill_count` is always `write_offset - read_offset`, so it can
/// never be observed negative as long as the writer never advances past the
/// free space it was given.
pub struct RingBuffer {
    memory: MirroredMemory,
    write_offset: AtomicUsize,
    read_offset: AtomicUsize,
}

impl RingBuffer {
    /// Creates a ring buffer with at least `requested_capacity` bytes of
    /// storage, rounded up to the system page size.
    pub fn new(requested_capacity: usize) -> Result<Self, OsError> {
        Ok(Self {
            memory: MirroredMemory::new(requested_capacity)?,
            write_offset: AtomicUsize::new(0),
            read_offset: AtomicUsize::new(0),
        })
    }

    /// Total capacity in bytes. Always a multiple of the page size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.memory.capacity()
    }

    /// Address at which the next `capacity - fill_count` bytes may be
    /// written contiguously.
    #[must_use]
    pub fn write_ptr(&self) -> *mut u8 {
        let offset = self.write_offset.load(Ordering::Acquire);
        // SAFETY: offset % capacity is always in [0, capacity), and the
        // mirrored mapping guarantees `capacity` contiguous bytes are valid
        // starting anywhere in that range.
        unsafe { self.memory.address().add(offset % self.capacity()) }
    }

    /// Address at which the next `fill_count` bytes may be read
    /// contiguously.
    #[must_use]
    pub fn read_ptr(&self) -> *mut u8 {
        let offset = self.read_offset.load(Ordering::Acquire);
        // SAFETY: see `write_ptr`.
        unsafe { self.memory.address().add(offset % self.capacity()) }
    }

    /// Commits `count` bytes just written starting at the address returned
    /// by the most recent [`RingBuffer::write_ptr`] call. Writer-only.
    pub fn advance_write_ptr(&self, count: usize) {
        self.write_offset.fetch_add(count, Ordering::Release);
        debug_assert!(self.fill_count() <= self.capacity());
    }

    /// Commits `count` bytes just consumed starting at the address returned
    /// by the most recent [`RingBuffer::read_ptr`] call. Reader-only.
    pub fn advance_read_ptr(&self, count: usize) {
        self.read_offset.fetch_add(count, Ordering::Release);
        debug_assert!(self.fill_count() <= self.capacity());
    }

    /// Bytes currently queued for the reader.
    ///
    /// The read offset is loaded first: since only the writer advances
    /// `write_offset` and only the reader advances `read_offset`, loading
    /// `read_offset` first can only ever under-count `write_offset - read_offset`
    /// relative to the true instant, never produce a negative value.
    #[must_use]
    pub fn fill_count(&self) -> usize {
        let read = self.read_offset.load(Ordering::Acquire);
        let write = self.write_offset.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Bytes currently available to the writer without overrunning the
    /// reader.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.capacity() - self.fill_count()
    }

    /// Drops all queued bytes by snapping the write offset back to the read
    /// offset. Writer-only; safe to call only when the writer holds no
    /// outstanding unwritten region.
    pub fn clear(&self) {
        let read = self.read_offset.load(Ordering::Acquire);
        self.write_offset.store(read, Ordering::Release);
    }
}

// SAFETY: all mutable access goes through atomic offsets and the mirrored
// memory's own Send/Sync impl; the SPSC contract (one writer thread, one
// reader thread) is enforced by callers, not by this type.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    fn write_bytes(rb: &RingBuffer, bytes: &[u8]) {
        assert!(bytes.len() <= rb.free_count());
        let ptr = rb.write_ptr();
        // SAFETY: mirrored region guarantees `bytes.len()` contiguous bytes
        // are writable at `ptr` since we just checked free_count.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len()) };
        rb.advance_write_ptr(bytes.len());
    }

    fn read_bytes(rb: &RingBuffer, len: usize) -> Vec<u8> {
        assert!(len <= rb.fill_count());
        let ptr = rb.read_ptr();
        let mut out = vec![0u8; len];
        // SAFETY: mirrored region guarantees `len` contiguous bytes are
        // readable at `ptr` since we just checked fill_count.
        unsafe { std::ptr::copy_nonoverlapping(ptr, out.as_mut_ptr(), len) };
        rb.advance_read_ptr(len);
        out
    }

    #[test]
    fn basic_write_then_read() {
        let rb = RingBuffer::new(10).unwrap();
        let page = rb.capacity();
        assert_eq!(page, crate::os::page_size());

        write_bytes(&rb, b"hello\0");
        assert_eq!(rb.fill_count(), 6);
        assert_eq!(rb.free_count(), page - 6);

        let out = read_bytes(&rb, 6);
        assert_eq!(out, b"hello\0");
        assert_eq!(rb.fill_count(), 0);
    }

    #[test]
    fn wraps_through_the_mirror() {
        let rb = RingBuffer::new(10).unwrap();
        let cap = rb.capacity();

        rb.advance_write_ptr(cap - 2);
        rb.advance_read_ptr(cap - 2);
        assert_eq!(rb.fill_count(), 0);

        let payload = b"writing past the end\0";
        write_bytes(&rb, payload);
        assert_eq!(rb.fill_count(), payload.len());

        let ptr = rb.read_ptr();
        // SAFETY: payload.len() contiguous bytes are valid starting at
        // read_ptr() by the mirrored-memory guarantee, even though the
        // logical offset wraps past `cap`.
        let region = unsafe { std::slice::from_raw_parts(ptr, payload.len()) };
        assert_eq!(region, payload);
        rb.advance_read_ptr(payload.len());
    }

    #[test]
    fn capacity_rounds_up_to_page_size() {
        let rb = RingBuffer::new(1).unwrap();
        assert_eq!(rb.capacity(), crate::os::page_size());
        let rb2 = RingBuffer::new(crate::os::page_size() + 1).unwrap();
        assert_eq!(rb2.capacity(), crate::os::page_size() * 2);
    }

    #[test]
    fn free_and_fill_sum_to_capacity() {
        let rb = RingBuffer::new(4096).unwrap();
        write_bytes(&rb, &[0u8; 100]);
        assert_eq!(rb.fill_count() + rb.free_count(), rb.capacity());
        read_bytes(&rb, 40);
        assert_eq!(rb.fill_count() + rb.free_count(), rb.capacity());
    }

    #[test]
    fn clear_drops_queued_bytes() {
        let rb = RingBuffer::new(4096).unwrap();
        write_bytes(&rb, &[1u8; 200]);
        assert_eq!(rb.fill_count(), 200);
        rb.clear();
        assert_eq!(rb.fill_count(), 0);
    }

    #[test]
    fn advance_then_advance_back_restores_fill_count() {
        let rb = RingBuffer::new(4096).unwrap();
        write_bytes(&rb, &[1u8; 500]);
        let before = rb.fill_count();
        rb.advance_write_ptr(100);
        rb.advance_read_ptr(100);
        assert_eq!(rb.fill_count(), before);
    }

    #[test]
    fn spsc_threaded_random_advances_stay_in_bounds() {
        let rb = Arc::new(RingBuffer::new(3528).unwrap());
        let cap = rb.capacity();
        let stop = Arc::new(AtomicBool::new(false));

        let writer_rb = Arc::clone(&rb);
        let writer_stop = Arc::clone(&stop);
        let writer = std::thread::spawn(move || {
            let mut written: u64 = 0;
            let mut rng: u64 = 0x1234_5678;
            let mut iterations = 0u64;
            while iterations < 100_000 {
                rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
                let free = writer_rb.free_count();
                if free == 0 {
                    std::thread::yield_now();
                    continue;
                }
                let chunk = 1 + (rng as usize % free.min(64));
                writer_rb.advance_write_ptr(chunk);
                written += chunk as u64;
                iterations += 1;
            }
            writer_stop.store(true, Ordering::SeqCst);
            written
        });

        let reader_rb = Arc::clone(&rb);
        let reader = std::thread::spawn(move || {
            let mut read: u64 = 0;
            loop {
                let fill = reader_rb.fill_count();
                if fill > 0 {
                    let chunk = 1 + (read as usize % fill.min(64));
                    let chunk = chunk.min(fill);
                    reader_rb.advance_read_ptr(chunk);
                    read += chunk as u64;
                } else if stop.load(Ordering::SeqCst) {
                    // Drain any remainder left after the writer stopped.
                    let remaining = reader_rb.fill_count();
                    reader_rb.advance_read_ptr(remaining);
                    read += remaining as u64;
                    break;
                } else {
                    std::thread::yield_now();
                }
            }
            read
        });

        let written = writer.join().unwrap();
        let read = reader.join().unwrap();
        assert_eq!(written, read);
        assert!(rb.fill_count() <= cap);
    }
}
