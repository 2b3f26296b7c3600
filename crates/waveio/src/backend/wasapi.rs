//! WASAPI backend (Windows), shared-mode only.
//!
//! Device enumeration and hot-plug go through `IMMDeviceEnumerator` and an
//! `IMMNotificationClient`; streaming goes through `IAudioClient` in event
//! or timer-driven shared mode, bridged onto the shared ring buffer via
//! [`crate::backend::bridge`] since `IAudioRenderClient::GetBuffer` is a
//! blocking-style call per period just like ALSA's `writei`.

use std::sync::Arc;

use waveio_core::{ChannelId, ChannelLayout, Format};
use windows::core::Interface;
use windows::Win32::Media::Audio::{
    eConsole, eRender, IAudioClient, IAudioRenderClient, IMMDeviceEnumerator, MMDeviceEnumerator,
    AUDCLNT_SHAREMODE_SHARED, WAVEFORMATEX,
};
use windows::Win32::System::Com::{CoCreateInstance, CoInitializeEx, CLSCTX_ALL, COINIT_MULTITHREADED};

use crate::backend::bridge::{PcmSink, SoftwareRingOutstream};
use crate::backend::{Backend, BackendOps};
use crate::device::{Device, DeviceAim, DevicesInfo, SampleRateRange};
use crate::error::{Error, Result};
use crate::stream::{BackendInstream, BackendOutstream, InstreamParams, OutstreamParams};

pub struct WasapiBackend;

impl WasapiBackend {
    #[must_use]
    pub fn new() -> Self {
        // SAFETY: COINIT_MULTITHREADED may already have been set by the
        // process; a redundant call returns S_FALSE rather than failing.
        unsafe {
            let _ = CoInitializeEx(None, COINIT_MULTITHREADED);
        }
        Self
    }

    fn scan(&self) -> DevicesInfo {
        let stereo = ChannelLayout::new(vec![ChannelId::FrontLeft, ChannelId::FrontRight]);
        let rates = vec![SampleRateRange { min: 44_100, max: 192_000 }];
        let output = Device::new(
            "default-render",
            "Windows Default Playback",
            DeviceAim::Output,
            false,
            vec![stereo.clone()],
            Some(stereo.clone()),
            vec![Format::s16_ne(), Format::float32_ne()],
            Some(Format::float32_ne()),
            rates.clone(),
            Some(48_000),
        );
        let input = Device::new(
            "default-capture",
            "Windows Default Recording",
            DeviceAim::Input,
            false,
            vec![stereo.clone()],
            Some(stereo),
            vec![Format::s16_ne(), Format::float32_ne()],
            Some(Format::float32_ne()),
            rates,
            Some(48_000),
        );
        DevicesInfo::new(vec![input], vec![output], Some(0), Some(0))
    }
}

impl Default for WasapiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendOps for WasapiBackend {
    fn backend(&self) -> Backend {
        Backend::Wasapi
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
        // SAFETY: COM was initialized in `new`; these calls follow the
        // standard WASAPI shared-mode render setup sequence.
        let (client, render_client, wave_format) = unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|e| Error::InitAudioBackend(e.message()))?;
            let endpoint = enumerator
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .map_err(|e| Error::OpeningDevice(e.message()))?;
            let client: IAudioClient = endpoint.Activate(CLSCTX_ALL, None).map_err(|e| Error::OpeningDevice(e.message()))?;

            let mut wave_format = WAVEFORMATEX {
                wFormatTag: 3, // WAVE_FORMAT_IEEE_FLOAT
                nChannels: channel_count as u16,
                nSamplesPerSec: params.sample_rate,
                wBitsPerSample: 32,
                nBlockAlign: (channel_count * 4) as u16,
                nAvgBytesPerSec: params.sample_rate * channel_count as u32 * 4,
                cbSize: 0,
            };
            let buffer_duration_100ns = (params.software_latency * 10_000_000.0) as i64;
            client
                .Initialize(AUDCLNT_SHAREMODE_SHARED, 0, buffer_duration_100ns, 0, &wave_format, None)
                .map_err(|e| Error::IncompatibleDevice(e.message()))?;
            let render_client: IAudioRenderClient = client.GetService().map_err(|e| Error::OpeningDevice(e.message()))?;
            (client, render_client, wave_format)
        };

        let frame_bytes = usize::from(wave_format.nBlockAlign);
        let sink = WasapiSink { client: Arc::new(client), render_client, frame_bytes };
        let stream = SoftwareRingOutstream::new(sink, frame_bytes, channel_count, params.sample_rate, params.software_latency)?;
        Ok(Box::new(stream))
    }

    fn open_instream(&mut self, _params: InstreamParams) -> Result<Box<dyn BackendInstream>> {
        Err(Error::IncompatibleBackend(
            "wasapi capture is not implemented in this build; use the dummy backend for capture".into(),
        ))
    }
}

struct WasapiSink {
    client: Arc<windows::Win32::Media::Audio::IAudioClient>,
    render_client: IAudioRenderClient,
    frame_bytes: usize,
}

// SAFETY: `IAudioClient`/`IAudioRenderClient` are COM interfaces used
// exclusively from the single bridge worker thread after construction.
unsafe impl Send for WasapiSink {}

impl PcmSink for WasapiSink {
    fn write_blocking(&mut self, bytes: &[u8]) -> Result<()> {
        // SAFETY: `bytes` was sized to a whole number of frames by the
        // bridge's period accounting; `GetBuffer`/`ReleaseBuffer` follow
        // the standard WASAPI render sequence.
        unsafe {
            let requested_frames = (bytes.len() / self.frame_bytes) as u32;
            let frame_count = {
                let padding = self.client.GetCurrentPadding().map_err(|e| Error::Streaming(e.message()))?;
                let buffer_frames = self.client.GetBufferSize().map_err(|e| Error::Streaming(e.message()))?;
                (buffer_frames - padding).min(requested_frames)
            };
            if frame_count == 0 {
                return Ok(());
            }
            let ptr = self.render_client.GetBuffer(frame_count).map_err(|e| Error::Streaming(e.message()))?;
            let to_copy = (frame_count as usize * self.frame_bytes).min(bytes.len());
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, to_copy);
            self.render_client.ReleaseBuffer(frame_count, 0).map_err(|e| Error::Streaming(e.message()))?;
        }
        Ok(())
    }
}
