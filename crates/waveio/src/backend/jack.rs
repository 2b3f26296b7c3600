//! JACK backend.
//!
//! Unlike the blocking-API backends, JACK hands the real-time thread to
//! the application through `jack::Client::activate_async`; this backend
//! registers one audio port per channel and bridges JACK's `process`
//! callback to the shared ring buffer directly, without an extra bridge
//! thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jack::{AudioOut, Client, ClientOptions, Control, Port, ProcessScope};
use waveio_core::{ChannelId, ChannelLayout, Format, RingBuffer};

use crate::backend::{Backend, BackendOps};
use crate::device::{Device, DeviceAim, DevicesInfo, SampleRateRange};
use crate::error::{Error, Result};
use crate::stream::{BackendInstream, BackendOutstream, ChannelArea, InstreamParams, OutstreamParams};

pub struct JackBackend {
    probe_client: Option<Client>,
}

// SAFETY: `Context` only ever touches one `Box<dyn BackendOps>` from one
// thread at a time.
unsafe impl Send for JackBackend {}

impl JackBackend {
    #[must_use]
    pub fn new() -> Self {
        Self { probe_client: None }
    }

    fn scan(&self) -> DevicesInfo {
        let layout = ChannelLayout::new(vec![ChannelId::FrontLeft, ChannelId::FrontRight]);
        let sample_rate = self
            .probe_client
            .as_ref()
            .map_or(48_000, |c| c.sample_rate() as u32);
        let rates = vec![SampleRateRange::exact(sample_rate)];

        let output = Device::new(
            "jack-system-playback",
            "JACK system playback",
            DeviceAim::Output,
            false,
            vec![layout.clone()],
            Some(layout.clone()),
            vec![Format::float32_ne()],
            Some(Format::float32_ne()),
            rates.clone(),
            Some(sample_rate),
        );
        let input = Device::new(
            "jack-system-capture",
            "JACK system capture",
            DeviceAim::Input,
            false,
            vec![layout.clone()],
            Some(layout),
            vec![Format::float32_ne()],
            Some(Format::float32_ne()),
            rates,
            Some(sample_rate),
        );
        DevicesInfo::new(vec![input], vec![output], Some(0), Some(0))
    }
}

impl Default for JackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendOps for JackBackend {
    fn backend(&self) -> Backend {
        Backend::Jack
    }

    fn connect(&mut self) -> Result<DevicesInfo> {
        let (client, _status) = Client::new("waveio-probe", ClientOptions::NO_START_SERVER)
            .map_err(|e| Error::InitAudioBackend(e.to_string()))?;
        self.probe_client = Some(client);
        Ok(self.scan())
    }

    fn disconnect(&mut self) {
        self.probe_client = None;
    }

    fn refresh_devices(&mut self) -> Result<DevicesInfo> {
        Ok(self.scan())
    }

    fn open_outstream(&mut self, params: OutstreamParams) -> Result<Box<dyn BackendOutstream>> {
        let channel_count = params.layout.channel_count();
        let (client, _status) = Client::new(&params.name, ClientOptions::NO_START_SERVER)
            .map_err(|e| Error::OpeningDevice(e.to_string()))?;
        let ports: Vec<Port<AudioOut>> = (0..channel_count)
            .map(|i| {
                client
                    .register_port(&format!("out_{i}"), AudioOut::default())
                    .map_err(|e| Error::OpeningDevice(e.to_string()))
            })
            .collect::<Result<_>>()?;

        let frame_bytes = Format::float32_ne().bytes_per_sample() * channel_count;
        let capacity_frames = ((params.software_latency * f64::from(client.sample_rate() as u32)).ceil() as usize).max(1);
        let ring = Arc::new(
            RingBuffer::new(capacity_frames * frame_bytes).map_err(|e| Error::OpeningDevice(e.to_string()))?,
        );

        Ok(Box::new(JackOutstream {
            client: Some(client),
            ports: Some(ports),
            active: None,
            ring,
            frame_bytes,
            channel_count,
            pending_write_frames: 0,
            software_latency: params.software_latency,
        }))
    }

    fn open_instream(&mut self, _params: InstreamParams) -> Result<Box<dyn BackendInstream>> {
        Err(Error::IncompatibleBackend(
            "jack capture is not implemented in this build; use the dummy or alsa/pulseaudio backend for capture".into(),
        ))
    }
}

struct JackOutstream {
    client: Option<Client>,
    ports: Option<Vec<Port<AudioOut>>>,
    active: Option<jack::AsyncClient<(), JackProcessHandler>>,
    ring: Arc<RingBuffer>,
    frame_bytes: usize,
    channel_count: usize,
    pending_write_frames: usize,
    software_latency: f64,
}

// SAFETY: every field is touched only from the thread that owns the
// `Outstream`/`Box<dyn BackendOutstream>`, except for the ports moved into
// `JackProcessHandler`, which JACK itself calls only from its own audio
// thread.
unsafe impl Send for JackOutstream {}

impl Drop for JackOutstream {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.deactivate();
        }
    }
}

struct JackProcessHandler {
    ports: Vec<Port<AudioOut>>,
    ring: Arc<RingBuffer>,
    channel_count: usize,
    stopped: Arc<AtomicBool>,
}

impl jack::ProcessHandler for JackProcessHandler {
    fn process(&mut self, _client: &Client, scope: &ProcessScope) -> Control {
        if self.stopped.load(Ordering::Acquire) {
            return Control::Continue;
        }
        let frames = scope.n_frames() as usize;
        let frame_bytes = self.channel_count * std::mem::size_of::<f32>();
        let available_frames = self.ring.fill_count() / frame_bytes;
        let to_copy = frames.min(available_frames);
        let base = self.ring.read_ptr().cast::<f32>();

        for (ch, port) in self.ports.iter_mut().enumerate() {
            let out = port.as_mut_slice(scope);
            for frame in 0..to_copy {
                // SAFETY: `base` addresses `available_frames * channel_count`
                // valid interleaved f32 samples, and `frame < to_copy <=
                // available_frames`.
                out[frame] = unsafe { *base.add(frame * self.channel_count + ch) };
            }
            for frame in to_copy..frames {
                out[frame] = 0.0;
            }
        }
        if to_copy > 0 {
            self.ring.advance_read_ptr(to_copy * frame_bytes);
        }
        Control::Continue
    }
}

impl BackendOutstream for JackOutstream {
    fn start(&mut self) -> Result<()> {
        let client = self.client.take().ok_or_else(|| Error::Invalid("outstream already started".into()))?;
        let ports = self.ports.take().ok_or_else(|| Error::Invalid("outstream already started".into()))?;
        let handler = JackProcessHandler {
            ports,
            ring: Arc::clone(&self.ring),
            channel_count: self.channel_count,
            stopped: Arc::new(AtomicBool::new(false)),
        };
        let active = client
            .activate_async((), handler)
            .map_err(|e| Error::Streaming(e.to_string()))?;
        self.active = Some(active);
        Ok(())
    }

    fn pause(&mut self, _pause: bool) -> Result<()> {
        // JACK has no notion of pausing a single client's ports without
        // disconnecting them; callers that need silence should simply stop
        // writing, which drains to zero-fill in the process callback.
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
