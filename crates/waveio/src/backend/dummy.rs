//! Software-only reference backend.
//!
//! Does not touch any real hardware or sound server: it exists so the rest
//! of the library, and every example and test that doesn't specifically
//! exercise a native backend, has something real to open streams against.
//! Playback is simulated by a thread draining the outstream's ring buffer
//! at the stream's nominal sample rate; capture is simulated by a thread
//! filling the instream's ring buffer with silence at the same rate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use waveio_core::{ChannelLayout, Format, RingBuffer};

use crate::backend::{Backend, BackendOps};
use crate::device::{Device, DeviceAim, DevicesInfo, SampleRateRange};
use crate::error::{Error, Result};
use crate::stream::{BackendInstream, BackendOutstream, ChannelArea, InstreamParams, OutstreamParams};

const DUMMY_SAMPLE_RATES: SampleRateRange = SampleRateRange { min: 8_000, max: 192_000 };

fn synthetic_devices() -> DevicesInfo {
    let stereo = ChannelLayout::new(vec![waveio_core::ChannelId::FrontLeft, waveio_core::ChannelId::FrontRight]);
    let formats = vec![Format::float32_ne(), Format::s16_ne()];

    let output = Device::new(
        "dummy-output",
        "Dummy Output Device",
        DeviceAim::Output,
        false,
        vec![stereo.clone()],
        Some(stereo.clone()),
        formats.clone(),
        Some(Format::float32_ne()),
        vec![DUMMY_SAMPLE_RATES],
        Some(48_000),
    );
    let input = Device::new(
        "dummy-input",
        "Dummy Input Device",
        DeviceAim::Input,
        false,
        vec![stereo.clone()],
        Some(stereo),
        formats.clone(),
        Some(Format::float32_ne()),
        vec![DUMMY_SAMPLE_RATES],
        Some(48_000),
    );
    DevicesInfo::new(vec![input], vec![output], Some(0), Some(0))
}

pub struct DummyBackend;

impl DummyBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendOps for DummyBackend {
    fn backend(&self) -> Backend {
        Backend::Dummy
    }

    fn connect(&mut self) -> Result<DevicesInfo> {
        Ok(synthetic_devices())
    }

    fn disconnect(&mut self) {}

    fn refresh_devices(&mut self) -> Result<DevicesInfo> {
        Ok(synthetic_devices())
    }

    fn open_outstream(&mut self, params: OutstreamParams) -> Result<Box<dyn BackendOutstream>> {
        let channel_count = params.layout.channel_count();
        if channel_count == 0 {
            return Err(Error::Invalid("outstream layout has no channels".into()));
        }
        let frame_bytes = params.format.bytes_per_sample() * channel_count;
        let capacity_frames = ((params.software_latency * f64::from(params.sample_rate)).ceil() as usize).max(1);
        let ring = RingBuffer::new(capacity_frames * frame_bytes).map_err(|e| Error::OpeningDevice(e.to_string()))?;
        Ok(Box::new(DummyOutstream {
            ring: Arc::new(ring),
            frame_bytes,
            channel_count,
            sample_rate: params.sample_rate,
            software_latency: params.software_latency,
            pending_write_frames: 0,
            paused: Arc::new(AtomicBool::new(true)),
            stop: Arc::new(AtomicBool::new(true)),
            underflow: Arc::new(AtomicBool::new(false)),
            consumer: None,
        }))
    }

    fn open_instream(&mut self, params: InstreamParams) -> Result<Box<dyn BackendInstream>> {
        let channel_count = params.layout.channel_count();
        if channel_count == 0 {
            return Err(Error::Invalid("instream layout has no channels".into()));
        }
        let frame_bytes = params.format.bytes_per_sample() * channel_count;
        let capacity_frames = ((params.software_latency * f64::from(params.sample_rate)).ceil() as usize).max(1);
        let ring = RingBuffer::new(capacity_frames * frame_bytes).map_err(|e| Error::OpeningDevice(e.to_string()))?;
        Ok(Box::new(DummyInstream {
            ring: Arc::new(ring),
            frame_bytes,
            channel_count,
            sample_rate: params.sample_rate,
            software_latency: params.software_latency,
            pending_read_frames: 0,
            paused: Arc::new(AtomicBool::new(true)),
            stop: Arc::new(AtomicBool::new(true)),
            overflow: Arc::new(AtomicBool::new(false)),
            producer: None,
        }))
    }
}

struct DummyOutstream {
    ring: Arc<RingBuffer>,
    frame_bytes: usize,
    channel_count: usize,
    sample_rate: u32,
    software_latency: f64,
    pending_write_frames: usize,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    underflow: Arc<AtomicBool>,
    consumer: Option<JoinHandle<()>>,
}

impl BackendOutstream for DummyOutstream {
    fn start(&mut self) -> Result<()> {
        self.stop.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        let ring = Arc::clone(&self.ring);
        let stop = Arc::clone(&self.stop);
        let paused = Arc::clone(&self.paused);
        let underflow = Arc::clone(&self.underflow);
        let frame_bytes = self.frame_bytes;
        let sample_rate = self.sample_rate.max(1);
        self.consumer = Some(std::thread::spawn(move || {
            let tick = Duration::from_millis(5);
            let bytes_per_tick = ((f64::from(sample_rate) * tick.as_secs_f64()) as usize * frame_bytes).max(frame_bytes);
            while !stop.load(Ordering::Acquire) {
                std::thread::sleep(tick);
                if paused.load(Ordering::Acquire) {
                    continue;
                }
                let fill = ring.fill_count();
                let drain = fill.min(bytes_per_tick);
                if drain < bytes_per_tick {
                    underflow.store(true, Ordering::Release);
                }
                if drain > 0 {
                    ring.advance_read_ptr(drain);
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
                // SAFETY: `base` is valid for `frame_bytes` contiguous bytes
                // by the mirrored ring buffer's guarantee; each channel's
                // offset within one frame is `ch * sample_bytes`, which is
                // less than `frame_bytes`.
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

    fn take_underflow(&mut self) -> bool {
        self.underflow.swap(false, Ordering::AcqRel)
    }
}

impl Drop for DummyOutstream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.consumer.take() {
            let _ = handle.join();
        }
    }
}

struct DummyInstream {
    ring: Arc<RingBuffer>,
    frame_bytes: usize,
    channel_count: usize,
    sample_rate: u32,
    software_latency: f64,
    pending_read_frames: usize,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    overflow: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl BackendInstream for DummyInstream {
    fn start(&mut self) -> Result<()> {
        self.stop.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        let ring = Arc::clone(&self.ring);
        let stop = Arc::clone(&self.stop);
        let paused = Arc::clone(&self.paused);
        let overflow = Arc::clone(&self.overflow);
        let frame_bytes = self.frame_bytes;
        let sample_rate = self.sample_rate.max(1);
        self.producer = Some(std::thread::spawn(move || {
            let tick = Duration::from_millis(5);
            let bytes_per_tick = ((f64::from(sample_rate) * tick.as_secs_f64()) as usize * frame_bytes).max(frame_bytes);
            while !stop.load(Ordering::Acquire) {
                std::thread::sleep(tick);
                if paused.load(Ordering::Acquire) {
                    continue;
                }
                let free = ring.free_count();
                let fill_amount = free.min(bytes_per_tick);
                if fill_amount == 0 {
                    // The application isn't draining fast enough; the
                    // frames that would have been captured this tick are
                    // dropped on the floor.
                    overflow.store(true, Ordering::Release);
                    continue;
                }
                let ptr = ring.write_ptr();
                // SAFETY: mirrored ring buffer guarantees `fill_amount`
                // contiguous writable bytes at `write_ptr` since we just
                // checked `free_count`.
                unsafe { std::ptr::write_bytes(ptr, 0, fill_amount) };
                ring.advance_write_ptr(fill_amount);
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
                // SAFETY: see DummyOutstream::begin_write.
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

    fn take_overflow(&mut self) -> bool {
        self.overflow.swap(false, Ordering::AcqRel)
    }
}

impl Drop for DummyInstream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waveio_core::ChannelId;

    fn stereo_params_out(sample_rate: u32) -> OutstreamParams {
        let layout = ChannelLayout::new(vec![ChannelId::FrontLeft, ChannelId::FrontRight]);
        OutstreamParams {
            device: synthetic_devices().output_devices()[0].clone(),
            format: Format::float32_ne(),
            sample_rate,
            layout,
            software_latency: 0.1,
            name: "test".into(),
        }
    }

    #[test]
    fn connect_reports_one_input_and_one_output() {
        let mut backend = DummyBackend::new();
        let devices = backend.connect().unwrap();
        assert_eq!(devices.output_devices().len(), 1);
        assert_eq!(devices.input_devices().len(), 1);
    }

    #[test]
    fn outstream_begin_write_is_capped_by_free_space() {
        let mut backend = DummyBackend::new();
        let mut stream = backend.open_outstream(stereo_params_out(48_000)).unwrap();
        let (areas, frames) = stream.begin_write(1_000_000_000).unwrap();
        assert_eq!(areas.len(), 2);
        assert!(frames > 0);
        stream.end_write().unwrap();
    }

    #[test]
    fn outstream_clear_buffer_resets_fill() {
        let mut backend = DummyBackend::new();
        let mut stream = backend.open_outstream(stereo_params_out(48_000)).unwrap();
        let (_areas, frames) = stream.begin_write(64).unwrap();
        assert!(frames > 0);
        stream.end_write().unwrap();
        stream.clear_buffer().unwrap();
    }
}
