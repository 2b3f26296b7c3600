//! Shared plumbing for backends that talk to their sound API through a
//! single blocking read/write call per period (ALSA, PulseAudio's simple
//! API, WASAPI's shared-mode `IAudioClient`).
//!
//! Each such backend hands the caller's audio through the same
//! [`waveio_core::RingBuffer`] the dummy backend uses, then runs a
//! dedicated thread that blocks in the real API's write (or read) call.
//! This keeps `begin_write`/`end_write` non-blocking for the caller
//! regardless of how the underlying API behaves, and means every backend's
//! `BackendOutstream`/`BackendInstream` implementation is this same
//! generic type instantiated with a different [`PcmSink`]/[`PcmSource`].
//!
//! JACK and CoreAudio don't use this: both hand control of the audio
//! thread to the application via their own callback registration, so they
//! implement the traits directly instead of blocking in a thread we own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use waveio_core::RingBuffer;

use crate::error::Result;
use crate::stream::{BackendInstream, BackendOutstream, ChannelArea};

/// A blocking audio sink: one call per period, given exactly the bytes
/// that period wants written.
pub trait PcmSink: Send + 'static {
    fn write_blocking(&mut self, bytes: &[u8]) -> Result<()>;
}

/// A blocking audio source: one call per period, filling the given buffer
/// with captured bytes.
pub trait PcmSource: Send + 'static {
    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<()>;
}

pub struct SoftwareRingOutstream<S: PcmSink> {
    ring: Arc<RingBuffer>,
    frame_bytes: usize,
    channel_count: usize,
    period_bytes: usize,
    software_latency: f64,
    pending_write_frames: usize,
    sink: Option<S>,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<S: PcmSink> SoftwareRingOutstream<S> {
    pub fn new(
        sink: S,
        frame_bytes: usize,
        channel_count: usize,
        sample_rate: u32,
        software_latency: f64,
    ) -> Result<Self> {
        let capacity_frames = ((software_latency * f64::from(sample_rate)).ceil() as usize).max(1);
        let period_frames = (capacity_frames / 4).max(1);
        let ring = RingBuffer::new(capacity_frames * frame_bytes)
            .map_err(|e| crate::error::Error::OpeningDevice(e.to_string()))?;
        Ok(Self {
            ring: Arc::new(ring),
            frame_bytes,
            channel_count,
            period_bytes: period_frames * frame_bytes,
            software_latency,
            pending_write_frames: 0,
            sink: Some(sink),
            paused: Arc::new(AtomicBool::new(true)),
            stop: Arc::new(AtomicBool::new(true)),
            worker: None,
        })
    }
}

impl<S: PcmSink> BackendOutstream for SoftwareRingOutstream<S> {
    fn start(&mut self) -> Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Err(crate::error::Error::Invalid("outstream already started".into()));
        };
        self.stop.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        let ring = Arc::clone(&self.ring);
        let stop = Arc::clone(&self.stop);
        let paused = Arc::clone(&self.paused);
        let period_bytes = self.period_bytes;
        self.worker = Some(std::thread::spawn(move || {
            let mut scratch = vec![0u8; period_bytes];
            while !stop.load(Ordering::Acquire) {
                if paused.load(Ordering::Acquire) {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    continue;
                }
                let available = ring.fill_count().min(period_bytes);
                if available == 0 {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                    continue;
                }
                let ptr = ring.read_ptr();
                // SAFETY: mirrored ring buffer guarantees `available`
                // contiguous readable bytes at `read_ptr` since we just
                // checked `fill_count`.
                unsafe { std::ptr::copy_nonoverlapping(ptr, scratch.as_mut_ptr(), available) };
                ring.advance_read_ptr(available);
                if sink.write_blocking(&scratch[..available]).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    fn pause(&mut self, pause: bool) -> Result<()> {
        self.paused.store(pause, Ordering::Release);
        Ok(())
    }

    fn clear_buffer(&mut self) -> Result<()> {
        self.ring.clear();
        Ok(())
    }

    fn begin_write(&mut self, frame_count: u32) -> Result<(Vec<ChannelArea>, u32)> {
        let available_frames = self.ring.free_count() / self.frame_bytes;
        let granted = (frame_count as usize).min(available_frames);
        self.pending_write_frames = granted;
        let base = self.ring.write_ptr();
        let sample_bytes = self.frame_bytes / self.channel_count;
        let areas = (0..self.channel_count)
            .map(|ch| {
                // SAFETY: `base` is valid for `frame_bytes` contiguous
                // bytes; `ch * sample_bytes` is less than `frame_bytes`.
                let pointer = unsafe { base.add(ch * sample_bytes) };
                ChannelArea::new(pointer, self.frame_bytes)
            })
            .collect();
        Ok((areas, granted as u32))
    }

    fn end_write(&mut self) -> Result<()> {
        self.ring.advance_write_ptr(self.pending_write_frames * self.frame_bytes);
        self.pending_write_frames = 0;
        Ok(())
    }

    fn software_latency(&self) -> f64 {
        self.software_latency
    }
}

impl<S: PcmSink> Drop for SoftwareRingOutstream<S> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

pub struct SoftwareRingInstream<S: PcmSource> {
    ring: Arc<RingBuffer>,
    frame_bytes: usize,
    channel_count: usize,
    period_bytes: usize,
    software_latency: f64,
    pending_read_frames: usize,
    source: Option<S>,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<S: PcmSource> SoftwareRingInstream<S> {
    pub fn new(
        source: S,
        frame_bytes: usize,
        channel_count: usize,
        sample_rate: u32,
        software_latency: f64,
    ) -> Result<Self> {
        let capacity_frames = ((software_latency * f64::from(sample_rate)).ceil() as usize).max(1);
        let period_frames = (capacity_frames / 4).max(1);
        let ring = RingBuffer::new(capacity_frames * frame_bytes)
            .map_err(|e| crate::error::Error::OpeningDevice(e.to_string()))?;
        Ok(Self {
            ring: Arc::new(ring),
            frame_bytes,
            channel_count,
            period_bytes: period_frames * frame_bytes,
            software_latency,
            pending_read_frames: 0,
            source: Some(source),
            paused: Arc::new(AtomicBool::new(true)),
            stop: Arc::new(AtomicBool::new(true)),
            worker: None,
        })
    }
}

impl<S: PcmSource> BackendInstream for SoftwareRingInstream<S> {
    fn start(&mut self) -> Result<()> {
        let Some(mut source) = self.source.take() else {
            return Err(crate::error::Error::Invalid("instream already started".into()));
        };
        self.stop.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        let ring = Arc::clone(&self.ring);
        let stop = Arc::clone(&self.stop);
        let paused = Arc::clone(&self.paused);
        let period_bytes = self.period_bytes;
        self.worker = Some(std::thread::spawn(move || {
            let mut scratch = vec![0u8; period_bytes];
            while !stop.load(Ordering::Acquire) {
                if paused.load(Ordering::Acquire) {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    continue;
                }
                if source.read_blocking(&mut scratch).is_err() {
                    break;
                }
                let room = ring.free_count().min(scratch.len());
                if room == 0 {
                    continue;
                }
                let ptr = ring.write_ptr();
                // SAFETY: mirrored ring buffer guarantees `room` contiguous
                // writable bytes at `write_ptr` since we just checked
                // `free_count`.
                unsafe { std::ptr::copy_nonoverlapping(scratch.as_ptr(), ptr, room) };
                ring.advance_write_ptr(room);
            }
        }));
        Ok(())
    }

    fn pause(&mut self, pause: bool) -> Result<()> {
        self.paused.store(pause, Ordering::Release);
        Ok(())
    }

    fn begin_read(&mut self, frame_count: u32) -> Result<(Vec<ChannelArea>, u32)> {
        let available_frames = self.ring.fill_count() / self.frame_bytes;
        let granted = (frame_count as usize).min(available_frames);
        self.pending_read_frames = granted;
        let base = self.ring.read_ptr();
        let sample_bytes = self.frame_bytes / self.channel_count;
        let areas = (0..self.channel_count)
            .map(|ch| {
                // SAFETY: see SoftwareRingOutstream::begin_write.
                let pointer = unsafe { base.add(ch * sample_bytes) };
                ChannelArea::new(pointer, self.frame_bytes)
            })
            .collect();
        Ok((areas, granted as u32))
    }

    fn end_read(&mut self) -> Result<()> {
        self.ring.advance_read_ptr(self.pending_read_frames * self.frame_bytes);
        self.pending_read_frames = 0;
        Ok(())
    }

    fn software_latency(&self) -> f64 {
        self.software_latency
    }
}

impl<S: PcmSource> Drop for SoftwareRingInstream<S> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
