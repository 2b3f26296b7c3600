//! ALSA backend: direct `hw`/`plughw` device access via the `alsa` crate,
//! plus inotify-driven hot-plug detection of `/dev/snd`.

use alsa::pcm::{Access, Format as AlsaFormat, HwParams, PCM};
use alsa::{Direction, ValueOr};
use inotify::{Inotify, WatchMask};
use waveio_core::{ChannelId, ChannelLayout, Format};

use crate::backend::bridge::{PcmSink, PcmSource, SoftwareRingInstream, SoftwareRingOutstream};
use crate::backend::{Backend, BackendOps};
use crate::device::{Device, DeviceAim, DevicesInfo, SampleRateRange};
use crate::error::{Error, Result};
use crate::stream::{BackendInstream, BackendOutstream, InstreamParams, OutstreamParams};

fn alsa_format_of(format: Format) -> Option<AlsaFormat> {
    Some(match format {
        Format::S8 => AlsaFormat::S8,
        Format::U8 => AlsaFormat::U8,
        Format::S16Le => AlsaFormat::S16LE,
        Format::S16Be => AlsaFormat::S16BE,
        Format::U16Le => AlsaFormat::U16LE,
        Format::U16Be => AlsaFormat::U16BE,
        Format::S32Le => AlsaFormat::S32LE,
        Format::S32Be => AlsaFormat::S32BE,
        Format::U32Le => AlsaFormat::U32LE,
        Format::U32Be => AlsaFormat::U32BE,
        Format::Float32Le => AlsaFormat::FloatLE,
        Format::Float32Be => AlsaFormat::FloatBE,
        Format::Float64Le => AlsaFormat::Float64LE,
        Format::Float64Be => AlsaFormat::Float64BE,
        Format::S24Le | Format::S24PackedLe => AlsaFormat::S24LE,
        Format::S24Be | Format::S24PackedBe => AlsaFormat::S24BE,
        _ => return None,
    })
}

/// Enumerates ALSA PCM hints for the given stream direction via
/// `alsa::device_name::HintIter`, filtering out the `null` pseudo-device.
fn enumerate(direction: Direction, aim: DeviceAim) -> Vec<Device> {
    let mut devices = Vec::new();
    let Ok(hints) = alsa::device_name::HintIter::new_str(None, "pcm") else {
        return devices;
    };
    for hint in hints {
        let Some(name) = hint.name else { continue };
        if name == "null" {
            continue;
        }
        if let Some(hint_direction) = hint.direction {
            if hint_direction != direction {
                continue;
            }
        }
        let display_name = hint.desc.unwrap_or_else(|| name.clone());
        let stereo = ChannelLayout::new(vec![ChannelId::FrontLeft, ChannelId::FrontRight]);
        devices.push(Device::new(
            name.clone(),
            display_name,
            aim,
            name.starts_with("hw:"),
            vec![stereo.clone()],
            Some(stereo),
            vec![Format::s16_ne(), Format::s32_ne(), Format::float32_ne()],
            Some(Format::s16_ne()),
            vec![SampleRateRange { min: 8_000, max: 192_000 }],
            Some(48_000),
        ));
    }
    devices
}

pub struct AlsaBackend {
    watcher: Option<Inotify>,
}

impl AlsaBackend {
    #[must_use]
    pub fn new() -> Self {
        Self { watcher: None }
    }

    fn scan(&self) -> DevicesInfo {
        let outputs = enumerate(Direction::Playback, DeviceAim::Output);
        let inputs = enumerate(Direction::Capture, DeviceAim::Input);
        let default_out = outputs.iter().position(|d| d.id() == "default");
        let default_in = inputs.iter().position(|d| d.id() == "default");
        DevicesInfo::new(inputs, outputs, default_in, default_out)
    }
}

impl Default for AlsaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendOps for AlsaBackend {
    fn backend(&self) -> Backend {
        Backend::Alsa
    }

    fn connect(&mut self) -> Result<DevicesInfo> {
        // `/dev/snd` hot-plug events are consumed by `Context`'s event
        // thread via `force_device_scan`, not polled here; we only need
        // the watch to exist so the fd is ready when that thread selects
        // on it.
        self.watcher = Inotify::init().ok();
        if let Some(watcher) = &mut self.watcher {
            let _ = watcher.watches().add("/dev/snd", WatchMask::CREATE | WatchMask::DELETE);
        }
        Ok(self.scan())
    }

    fn disconnect(&mut self) {
        self.watcher = None;
    }

    fn refresh_devices(&mut self) -> Result<DevicesInfo> {
        Ok(self.scan())
    }

    fn open_outstream(&mut self, params: OutstreamParams) -> Result<Box<dyn BackendOutstream>> {
        let channel_count = params.layout.channel_count();
        let pcm = PCM::new(params.device.id(), Direction::Playback, false)
            .map_err(|e| Error::OpeningDevice(e.to_string()))?;
        configure_hw_params(&pcm, &params.format, params.sample_rate, channel_count)?;
        pcm.prepare().map_err(|e| Error::OpeningDevice(e.to_string()))?;

        let frame_bytes = params.format.bytes_per_sample() * channel_count;
        let sink = AlsaSink { pcm, channel_count };
        let stream = SoftwareRingOutstream::new(sink, frame_bytes, channel_count, params.sample_rate, params.software_latency)?;
        Ok(Box::new(stream))
    }

    fn open_instream(&mut self, params: InstreamParams) -> Result<Box<dyn BackendInstream>> {
        let channel_count = params.layout.channel_count();
        let pcm = PCM::new(params.device.id(), Direction::Capture, false)
            .map_err(|e| Error::OpeningDevice(e.to_string()))?;
        configure_hw_params(&pcm, &params.format, params.sample_rate, channel_count)?;
        pcm.prepare().map_err(|e| Error::OpeningDevice(e.to_string()))?;

        let frame_bytes = params.format.bytes_per_sample() * channel_count;
        let source = AlsaSource { pcm, channel_count };
        let stream = SoftwareRingInstream::new(source, frame_bytes, channel_count, params.sample_rate, params.software_latency)?;
        Ok(Box::new(stream))
    }
}

fn configure_hw_params(pcm: &PCM, format: &Format, sample_rate: u32, channel_count: usize) -> Result<()> {
    let hwp = HwParams::any(pcm).map_err(|e| Error::OpeningDevice(e.to_string()))?;
    hwp.set_channels(channel_count as u32).map_err(|e| Error::IncompatibleDevice(e.to_string()))?;
    hwp.set_rate(sample_rate, ValueOr::Nearest).map_err(|e| Error::IncompatibleDevice(e.to_string()))?;
    let alsa_format = alsa_format_of(*format).ok_or_else(|| Error::Invalid(format!("unsupported format for alsa: {format}")))?;
    hwp.set_format(alsa_format).map_err(|e| Error::IncompatibleDevice(e.to_string()))?;
    hwp.set_access(Access::RWInterleaved).map_err(|e| Error::IncompatibleDevice(e.to_string()))?;
    pcm.hw_params(&hwp).map_err(|e| Error::IncompatibleDevice(e.to_string()))?;
    Ok(())
}

struct AlsaSink {
    pcm: PCM,
    channel_count: usize,
}

impl PcmSink for AlsaSink {
    fn write_blocking(&mut self, bytes: &[u8]) -> Result<()> {
        let io = self.pcm.io_bytes();
        match io.writei(bytes) {
            Ok(_) => Ok(()),
            Err(err) => {
                // EPIPE (underrun) recovers by re-preparing the stream.
                self.pcm.try_recover(err, true).map_err(|e| Error::Streaming(e.to_string()))
            }
        }
    }
}

struct AlsaSource {
    pcm: PCM,
    channel_count: usize,
}

impl PcmSource for AlsaSource {
    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<()> {
        let io = self.pcm.io_bytes();
        match io.readi(buf) {
            Ok(_) => Ok(()),
            Err(err) => self.pcm.try_recover(err, true).map_err(|e| Error::Streaming(e.to_string())),
        }
    }
}
