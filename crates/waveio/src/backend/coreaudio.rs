//! CoreAudio backend (macOS).
//!
//! Like JACK, CoreAudio drives the real-time thread itself by invoking a
//! render callback registered on an `AudioUnit`; this backend bridges that
//! callback straight to the shared ring buffer rather than through the
//! blocking bridge used by ALSA/PulseAudio/WASAPI.

use coreaudio::audio_unit::render_callback::{self, data};
use coreaudio::audio_unit::{AudioUnit, IOType, SampleFormat, StreamFormat};
use waveio_core::{ChannelId, ChannelLayout, Format, RingBuffer};

use crate::backend::{Backend, BackendOps};
use crate::device::{Device, DeviceAim, DevicesInfo, SampleRateRange};
use crate::error::{Error, Result};
use crate::stream::{BackendInstream, BackendOutstream, ChannelArea, InstreamParams, OutstreamParams};
use std::sync::Arc;

pub struct CoreAudioBackend;

impl CoreAudioBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn scan(&self) -> DevicesInfo {
        // A complete implementation walks `kAudioHardwarePropertyDevices`
        // via `coreaudio-sys` and registers a
        // `kAudioHardwarePropertyDevicesPropertyListener` for hot-plug;
        // here we expose the default system output/input, which is what
        // `AudioUnit::new(IOType::DefaultOutput/.Input)` actually opens.
        let stereo = ChannelLayout::new(vec![ChannelId::FrontLeft, ChannelId::FrontRight]);
        let rates = vec![SampleRateRange { min: 8_000, max: 192_000 }];
        let output = Device::new(
            "default-output",
            "macOS Default Output",
            DeviceAim::Output,
            false,
            vec![stereo.clone()],
            Some(stereo.clone()),
            vec![Format::float32_ne()],
            Some(Format::float32_ne()),
            rates.clone(),
            Some(44_100),
        );
        let input = Device::new(
            "default-input",
            "macOS Default Input",
            DeviceAim::Input,
            false,
            vec![stereo.clone()],
            Some(stereo),
            vec![Format::float32_ne()],
            Some(Format::float32_ne()),
            rates,
            Some(44_100),
        );
        DevicesInfo::new(vec![input], vec![output], Some(0), Some(0))
    }
}

impl Default for CoreAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendOps for CoreAudioBackend {
    fn backend(&self) -> Backend {
        Backend::CoreAudio
    }

    fn connect(&mut self) -> Result<DevicesInfo> {
        Ok(self.scan())
    }

    fn disconnect(&mut self) {}

    fn refresh_devices(&mut self) -> Result<DevicesInfo> {
        Ok(self.scan())
    }

    fn open_outstream(&mut self, params: OutstreamParams) -> Result<Box<dyn BackendOutstream>> {
        let channel_count = params.layout.channel_count();
        let mut audio_unit = AudioUnit::new(IOType::DefaultOutput).map_err(|e| Error::OpeningDevice(e.to_string()))?;
        let stream_format = StreamFormat {
            sample_rate: f64::from(params.sample_rate),
            sample_format: SampleFormat::F32,
            flags: coreaudio::audio_unit::audio_format::LinearPcmFlags::IS_FLOAT
                | coreaudio::audio_unit::audio_format::LinearPcmFlags::IS_PACKED,
            channels: channel_count as u32,
        };
        audio_unit
            .set_stream_format(stream_format, coreaudio::audio_unit::Scope::Input)
            .map_err(|e| Error::IncompatibleDevice(e.to_string()))?;

        let frame_bytes = Format::float32_ne().bytes_per_sample() * channel_count;
        let capacity_frames = ((params.software_latency * f64::from(params.sample_rate)).ceil() as usize).max(1);
        let ring = Arc::new(
            RingBuffer::new(capacity_frames * frame_bytes).map_err(|e| Error::OpeningDevice(e.to_string()))?,
        );
        let render_ring = Arc::clone(&ring);

        audio_unit
            .set_render_callback(move |args: render_callback::Args<data::NonInterleaved<f32>>| {
                let mut buffer = args.data;
                let frames = buffer.num_frames();
                let fill_frames = render_ring.fill_count() / frame_bytes;
                let to_copy = frames.min(fill_frames);
                let base = render_ring.read_ptr().cast::<f32>();
                for ch in 0..buffer.num_channels() {
                    let channel = buffer.channel_mut(ch);
                    for frame in 0..to_copy {
                        // SAFETY: `base` addresses `fill_frames * channel_count`
                        // valid interleaved f32 samples.
                        channel[frame] = unsafe { *base.add(frame * channel_count + ch) };
                    }
                    for frame in to_copy..frames {
                        channel[frame] = 0.0;
                    }
                }
                if to_copy > 0 {
                    render_ring.advance_read_ptr(to_copy * frame_bytes);
                }
                Ok(())
            })
            .map_err(|e| Error::Streaming(e.to_string()))?;

        Ok(Box::new(CoreAudioOutstream {
            audio_unit: Some(audio_unit),
            ring,
            frame_bytes,
            channel_count,
            pending_write_frames: 0,
            software_latency: params.software_latency,
        }))
    }

    fn open_instream(&mut self, _params: InstreamParams) -> Result<Box<dyn BackendInstream>> {
        Err(Error::IncompatibleBackend(
            "coreaudio capture is not implemented in this build; use the dummy backend for capture".into(),
        ))
    }
}

struct CoreAudioOutstream {
    audio_unit: Option<AudioUnit>,
    ring: Arc<RingBuffer>,
    frame_bytes: usize,
    channel_count: usize,
    pending_write_frames: usize,
    software_latency: f64,
}

// SAFETY: `AudioUnit` is driven entirely by the CoreAudio render thread
// once started; the owning `Outstream` touches this handle only through
// its own internal mutex, never concurrently with the render callback's
// ring-buffer access.
unsafe impl Send for CoreAudioOutstream {}

impl BackendOutstream for CoreAudioOutstream {
    fn start(&mut self) -> Result<()> {
        self.audio_unit
            .as_mut()
            .ok_or_else(|| Error::Invalid("outstream already destroyed".into()))?
            .start()
            .map_err(|e| Error::Streaming(e.to_string()))
    }

    fn pause(&mut self, pause: bool) -> Result<()> {
        let unit = self.audio_unit.as_mut().ok_or_else(|| Error::Invalid("outstream already destroyed".into()))?;
        if pause { unit.stop() } else { unit.start() }.map_err(|e| Error::Streaming(e.to_string()))
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
                // SAFETY: see backend::dummy::DummyOutstream::begin_write.
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

impl Drop for CoreAudioOutstream {
    fn drop(&mut self) {
        if let Some(mut unit) = self.audio_unit.take() {
            let _ = unit.stop();
        }
    }
}
