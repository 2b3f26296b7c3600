//! The top-level handle: backend selection, the published device snapshot,
//! and the event-notification protocol streams and callers wait on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};
use waveio_core::{ChannelLayout, Format};

use crate::backend::{Backend, BackendOps};
use crate::device::{Device, DeviceAim, DevicesInfo};
use crate::error::{Error, Result};
use crate::stream::{
    BackendInstream, BackendOutstream, Instream, InstreamParams, Outstream, OutstreamParams,
    ReadCallback, WriteCallback,
};

/// Callback invoked (on the event thread) when the published device
/// snapshot changes.
pub type DevicesChangeCallback = Box<dyn FnMut() + Send>;
/// Callback invoked when the connected backend's connection is lost.
pub type BackendDisconnectCallback = Box<dyn FnMut(Error) + Send>;

/// Entry point: owns the connected backend, the current device snapshot,
/// and the background thread that polls for hardware changes.
///
/// A `Context` is connected to at most one backend at a time. Device and
/// stream handles ([`Device`], [`Outstream`], [`Instream`]) keep the
/// `Context` alive through their own `Arc` so a caller can drop the
/// `Context` handle while streams it opened are still running; the
/// background thread and backend connection are torn down only once every
/// such handle is also dropped... in practice, call [`Context::disconnect`]
/// or drop the `Context` explicitly once streams are done.
pub struct Context {
    app_name: String,
    ops: Mutex<Option<Box<dyn BackendOps>>>,
    devices: RwLock<Arc<DevicesInfo>>,
    on_devices_change: Mutex<Option<DevicesChangeCallback>>,
    on_backend_disconnect: Mutex<Option<BackendDisconnectCallback>>,
    /// Set once a backend reports it lost its connection; delivered to
    /// `on_backend_disconnect` (at most once) the next time events are
    /// flushed, rather than from inside the watcher thread directly.
    pending_disconnect: Mutex<Option<Error>>,
    event_pending: Mutex<bool>,
    event_condvar: Condvar,
    watcher_stop: Arc<AtomicBool>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Context {
    /// Creates a disconnected context. `app_name` is passed to backends
    /// that surface a client name to the user (JACK, PulseAudio).
    #[must_use]
    pub fn new(app_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            app_name: app_name.into(),
            ops: Mutex::new(None),
            devices: RwLock::new(Arc::new(DevicesInfo::default())),
            on_devices_change: Mutex::new(None),
            on_backend_disconnect: Mutex::new(None),
            pending_disconnect: Mutex::new(None),
            event_pending: Mutex::new(false),
            event_condvar: Condvar::new(),
            watcher_stop: Arc::new(AtomicBool::new(true)),
            watcher: Mutex::new(None),
        })
    }

    pub fn set_on_devices_change(&self, callback: DevicesChangeCallback) {
        *self.on_devices_change.lock().expect("mutex poisoned") = Some(callback);
    }

    pub fn set_on_backend_disconnect(&self, callback: BackendDisconnectCallback) {
        *self.on_backend_disconnect.lock().expect("mutex poisoned") = Some(callback);
    }

    /// Connects using the first available backend, in
    /// [`Backend::priority_order`], or the backend named by the
    /// `WAVEIO_BACKEND` environment variable if it is set and available.
    pub fn connect(self: &Arc<Self>) -> Result<()> {
        if let Ok(name) = std::env::var("WAVEIO_BACKEND") {
            let backend = Backend::parse_name(&name)
                .ok_or_else(|| Error::BackendUnavailable(format!("unknown backend name {name}")))?;
            return self.connect_backend(backend);
        }
        let mut last_error = None;
        for backend in Backend::priority_order() {
            if !backend.is_available() {
                continue;
            }
            match self.connect_backend(*backend) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(backend = %backend, error = %e, "backend unavailable");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(Error::BackendUnavailable("no backend compiled in".into())))
    }

    /// Connects to a specific backend, bypassing the priority search.
    pub fn connect_backend(self: &Arc<Self>, backend: Backend) -> Result<()> {
        if !backend.is_available() {
            return Err(Error::BackendUnavailable(format!("{backend} is not available on this platform")));
        }
        let mut ops = make_backend(backend);
        let devices = ops.connect()?;
        info!(%backend, app_name = %self.app_name, "connected");
        *self.devices.write().expect("mutex poisoned") = Arc::new(devices);
        *self.ops.lock().expect("mutex poisoned") = Some(ops);

        self.watcher_stop.store(false, Ordering::Release);
        let this = Arc::clone(self);
        let stop = Arc::clone(&self.watcher_stop);
        let handle = std::thread::Builder::new()
            .name("waveio-watcher".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(500));
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(e) = this.force_device_scan() {
                        warn!(error = %e, "device rescan failed");
                        if matches!(e, Error::BackendDisconnected(_)) {
                            break;
                        }
                    }
                }
            })
            .map_err(|e| Error::SystemResources(e.to_string()))?;
        *self.watcher.lock().expect("mutex poisoned") = Some(handle);
        Ok(())
    }

    /// Tears down the backend connection and stops the watcher thread.
    pub fn disconnect(&self) {
        self.watcher_stop.store(true, Ordering::Release);
        if let Some(handle) = self.watcher.lock().expect("mutex poisoned").take() {
            let _ = handle.join();
        }
        if let Some(mut ops) = self.ops.lock().expect("mutex poisoned").take() {
            ops.disconnect();
        }
    }

    #[must_use]
    pub fn current_backend(&self) -> Option<Backend> {
        self.ops.lock().expect("mutex poisoned").as_ref().map(|o| o.backend())
    }

    #[must_use]
    pub fn devices_snapshot(&self) -> Arc<DevicesInfo> {
        Arc::clone(&self.devices.read().expect("mutex poisoned"))
    }

    #[must_use]
    pub fn input_devices(&self) -> Vec<Device> {
        self.devices_snapshot().input_devices().to_vec()
    }

    #[must_use]
    pub fn output_devices(&self) -> Vec<Device> {
        self.devices_snapshot().output_devices().to_vec()
    }

    #[must_use]
    pub fn default_output_device(&self) -> Option<Device> {
        self.devices_snapshot().default_output_device().cloned()
    }

    #[must_use]
    pub fn default_input_device(&self) -> Option<Device> {
        self.devices_snapshot().default_input_device().cloned()
    }

    /// Re-enumerates devices immediately, publishing a new snapshot if it
    /// differs from the last one and waking anyone blocked in
    /// [`Context::wait_events`].
    pub fn force_device_scan(&self) -> Result<()> {
        let mut guard = self.ops.lock().expect("mutex poisoned");
        let Some(ops) = guard.as_mut() else {
            return Err(Error::Invalid("context is not connected".into()));
        };
        let fresh = match ops.refresh_devices() {
            Ok(fresh) => fresh,
            Err(Error::BackendDisconnected(reason)) => {
                drop(guard);
                self.set_pending_disconnect(Error::BackendDisconnected(reason.clone()));
                return Err(Error::BackendDisconnected(reason));
            }
            Err(e) => return Err(e),
        };
        drop(guard);

        let changed = {
            let current = self.devices.read().expect("mutex poisoned");
            current.output_devices().len() != fresh.output_devices().len()
                || current.input_devices().len() != fresh.input_devices().len()
        };
        *self.devices.write().expect("mutex poisoned") = Arc::new(fresh);
        if changed {
            self.post_event();
            if let Some(cb) = self.on_devices_change.lock().expect("mutex poisoned").as_mut() {
                cb();
            }
        }
        Ok(())
    }

    fn post_event(&self) {
        *self.event_pending.lock().expect("mutex poisoned") = true;
        self.event_condvar.notify_all();
    }

    /// Records a backend disconnect to be delivered through
    /// `on_backend_disconnect` on the next `flush_events`/`wait_events`, and
    /// wakes anyone already blocked in `wait_events`.
    fn set_pending_disconnect(&self, error: Error) {
        *self.pending_disconnect.lock().expect("mutex poisoned") = Some(error);
        self.post_event();
    }

    /// Blocks until an event (a device change, a stream error) has been
    /// posted since the last call, or until `timeout` elapses if given.
    pub fn wait_events(&self, timeout: Option<Duration>) {
        let guard = self.event_pending.lock().expect("mutex poisoned");
        let result = match timeout {
            Some(t) => self
                .event_condvar
                .wait_timeout_while(guard, t, |pending| !*pending)
                .expect("mutex poisoned")
                .0,
            None => self.event_condvar.wait_while(guard, |pending| !*pending).expect("mutex poisoned"),
        };
        drop(result);
        self.flush_events();
    }

    /// Unblocks any thread currently in [`Context::wait_events`] without a
    /// real event having occurred.
    pub fn wakeup(&self) {
        self.post_event();
    }

    /// Delivers any events already posted, without blocking. Applications
    /// that drive their own event loop call this instead of
    /// [`Context::wait_events`]. A backend disconnect recorded since the
    /// last flush is delivered here, exactly once, through
    /// `on_backend_disconnect`.
    pub fn flush_events(&self) {
        *self.event_pending.lock().expect("mutex poisoned") = false;
        let pending = self.pending_disconnect.lock().expect("mutex poisoned").take();
        if let Some(error) = pending {
            if let Some(cb) = self.on_backend_disconnect.lock().expect("mutex poisoned").as_mut() {
                cb(error);
            }
        }
    }

    /// Opens an outstream against `device`, transitioning it to
    /// [`crate::stream::OutstreamState::Opened`].
    ///
    /// Negotiates `format`/`sample_rate`/`layout` against the device's
    /// capabilities per the reference project's `soundio_outstream_open`: a
    /// zero/unset value is resolved to a sensible default, but a value the
    /// caller explicitly supplied that the device does not support is
    /// rejected with [`Error::IncompatibleDevice`] rather than silently
    /// substituted.
    #[allow(clippy::too_many_arguments)]
    pub fn open_outstream(
        &self,
        device: Device,
        format: Format,
        sample_rate: u32,
        layout: ChannelLayout,
        software_latency: f64,
        name: impl Into<String>,
        write_callback: WriteCallback,
    ) -> Result<Arc<Outstream>> {
        if device.aim() != DeviceAim::Output {
            return Err(Error::Invalid(format!("device '{}' is not an output device", device.name())));
        }
        if let Some(reason) = device.probe_error() {
            return Err(Error::OpeningDevice(reason.to_string()));
        }
        let format = negotiate_format(&device, format)?;
        let layout = negotiate_layout(&device, layout)?;
        let sample_rate = negotiate_sample_rate(&device, sample_rate)?;
        let software_latency = clamp_software_latency(&device, software_latency);

        let name = name.into();
        let params = OutstreamParams {
            device: device.clone(),
            format,
            sample_rate,
            layout: layout.clone(),
            software_latency,
            name: name.clone(),
        };
        let backend_stream = self.open_backend_outstream(params)?;
        Ok(Outstream::new(device, format, sample_rate, layout, name, backend_stream, write_callback))
    }

    fn open_backend_outstream(&self, params: OutstreamParams) -> Result<Box<dyn BackendOutstream>> {
        let mut guard = self.ops.lock().expect("mutex poisoned");
        let ops = guard.as_mut().ok_or_else(|| Error::Invalid("context is not connected".into()))?;
        ops.open_outstream(params)
    }

    /// Opens an instream against `device`, transitioning it to
    /// [`crate::stream::InstreamState::Opened`]. Same negotiation rules as
    /// [`Context::open_outstream`], mirroring `soundio_instream_open`.
    #[allow(clippy::too_many_arguments)]
    pub fn open_instream(
        &self,
        device: Device,
        format: Format,
        sample_rate: u32,
        layout: ChannelLayout,
        software_latency: f64,
        name: impl Into<String>,
        read_callback: ReadCallback,
    ) -> Result<Arc<Instream>> {
        if device.aim() != DeviceAim::Input {
            return Err(Error::Invalid(format!("device '{}' is not an input device", device.name())));
        }
        if let Some(reason) = device.probe_error() {
            return Err(Error::OpeningDevice(reason.to_string()));
        }
        let format = negotiate_format(&device, format)?;
        let layout = negotiate_layout(&device, layout)?;
        let sample_rate = negotiate_sample_rate(&device, sample_rate)?;
        let software_latency = clamp_software_latency(&device, software_latency);

        let name = name.into();
        let params = InstreamParams {
            device: device.clone(),
            format,
            sample_rate,
            layout: layout.clone(),
            software_latency,
            name: name.clone(),
        };
        let backend_stream = self.open_backend_instream(params)?;
        Ok(Instream::new(device, format, sample_rate, layout, name, backend_stream, read_callback))
    }

    fn open_backend_instream(&self, params: InstreamParams) -> Result<Box<dyn BackendInstream>> {
        let mut guard = self.ops.lock().expect("mutex poisoned");
        let ops = guard.as_mut().ok_or_else(|| Error::Invalid("context is not connected".into()))?;
        ops.open_instream(params)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Resolves the stream format against `device`'s capabilities: an
/// explicitly unsupported format is an error, but [`Format::Invalid`] (the
/// caller didn't care) falls back to native float, then to whatever the
/// device lists first.
fn negotiate_format(device: &Device, requested: Format) -> Result<Format> {
    if requested == Format::Invalid {
        if device.supports_format(Format::float32_ne()) {
            return Ok(Format::float32_ne());
        }
        return device.formats().first().copied().ok_or_else(|| {
            Error::IncompatibleDevice(format!("device '{}' exposes no sample format", device.name()))
        });
    }
    if device.supports_format(requested) {
        Ok(requested)
    } else {
        Err(Error::IncompatibleDevice(format!(
            "device '{}' does not support format {requested}",
            device.name()
        )))
    }
}

/// An empty layout (`channel_count == 0`) falls back to Stereo; anything
/// else must be one of the device's listed layouts.
fn negotiate_layout(device: &Device, requested: ChannelLayout) -> Result<ChannelLayout> {
    let layout = if requested.channel_count() == 0 {
        ChannelLayout::new(vec![waveio_core::ChannelId::FrontLeft, waveio_core::ChannelId::FrontRight])
    } else {
        requested
    };
    if layout.channel_count() > waveio_core::MAX_CHANNELS {
        return Err(Error::Invalid(format!(
            "layout has {} channels, more than the {} supported",
            layout.channel_count(),
            waveio_core::MAX_CHANNELS
        )));
    }
    if device.supports_layout(&layout) {
        Ok(layout)
    } else {
        Err(Error::IncompatibleDevice(format!(
            "device '{}' does not support the requested channel layout",
            device.name()
        )))
    }
}

/// `0` falls back to the rate nearest 48 kHz; anything else must be one the
/// device actually supports.
fn negotiate_sample_rate(device: &Device, requested: u32) -> Result<u32> {
    let rate = if requested == 0 {
        device
            .nearest_sample_rate(48_000)
            .ok_or_else(|| Error::IncompatibleDevice(format!("device '{}' exposes no sample rate", device.name())))?
    } else {
        requested
    };
    if device.supports_sample_rate(rate) {
        Ok(rate)
    } else {
        Err(Error::IncompatibleDevice(format!(
            "device '{}' does not support sample rate {rate}",
            device.name()
        )))
    }
}

fn clamp_software_latency(device: &Device, requested: f64) -> f64 {
    requested.clamp(device.software_latency_min(), device.software_latency_max())
}

fn make_backend(backend: Backend) -> Box<dyn BackendOps> {
    match backend {
        Backend::Dummy => Box::new(crate::backend::dummy::DummyBackend::new()),
        #[cfg(target_os = "linux")]
        Backend::Alsa => Box::new(crate::backend::alsa::AlsaBackend::new()),
        #[cfg(target_os = "linux")]
        Backend::PulseAudio => Box::new(crate::backend::pulseaudio::PulseAudioBackend::new()),
        #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
        Backend::Jack => Box::new(crate::backend::jack::JackBackend::new()),
        #[cfg(target_os = "macos")]
        Backend::CoreAudio => Box::new(crate::backend::coreaudio::CoreAudioBackend::new()),
        #[cfg(target_os = "windows")]
        Backend::Wasapi => Box::new(crate::backend::wasapi::WasapiBackend::new()),
        #[allow(unreachable_patterns)]
        _ => Box::new(crate::backend::dummy::DummyBackend::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_backend_dummy_populates_devices() {
        let ctx = Context::new("waveio-tests");
        ctx.connect_backend(Backend::Dummy).unwrap();
        assert_eq!(ctx.current_backend(), Some(Backend::Dummy));
        assert_eq!(ctx.output_devices().len(), 1);
        assert_eq!(ctx.input_devices().len(), 1);
        ctx.disconnect();
    }

    #[test]
    fn wakeup_unblocks_wait_events() {
        let ctx = Context::new("waveio-tests");
        ctx.connect_backend(Backend::Dummy).unwrap();
        let waiter = Arc::clone(&ctx);
        let handle = std::thread::spawn(move || waiter.wait_events(Some(Duration::from_secs(5))));
        std::thread::sleep(Duration::from_millis(20));
        ctx.wakeup();
        handle.join().unwrap();
        ctx.disconnect();
    }

    #[test]
    fn open_outstream_rejects_input_device() {
        let ctx = Context::new("waveio-tests");
        ctx.connect_backend(Backend::Dummy).unwrap();
        let device = ctx.default_input_device().unwrap();
        let layout = device.current_layout().cloned().unwrap();
        let result = ctx.open_outstream(
            device,
            Format::float32_ne(),
            48_000,
            layout,
            0.1,
            "test",
            Box::new(|_out, _min, _max| {}),
        );
        assert!(matches!(result, Err(Error::Invalid(_))));
        ctx.disconnect();
    }

    #[test]
    fn open_outstream_rejects_unsupported_sample_rate() {
        let ctx = Context::new("waveio-tests");
        ctx.connect_backend(Backend::Dummy).unwrap();
        let device = ctx.default_output_device().unwrap();
        let layout = device.current_layout().cloned().unwrap();
        let result = ctx.open_outstream(
            device,
            Format::float32_ne(),
            1, // below the dummy device's supported range
            layout,
            0.1,
            "test",
            Box::new(|_out, _min, _max| {}),
        );
        assert!(matches!(result, Err(Error::IncompatibleDevice(_))));
        ctx.disconnect();
    }

    #[test]
    fn open_outstream_negotiates_zero_rate_to_nearest_48k() {
        let ctx = Context::new("waveio-tests");
        ctx.connect_backend(Backend::Dummy).unwrap();
        let device = ctx.default_output_device().unwrap();
        let layout = device.current_layout().cloned().unwrap();
        let outstream = ctx
            .open_outstream(device, Format::float32_ne(), 0, layout, 0.1, "test", Box::new(|_out, _min, _max| {}))
            .unwrap();
        assert_eq!(outstream.sample_rate(), 48_000);
        ctx.disconnect();
    }

    /// A `BackendOps` stub whose rescans always report its connection lost.
    struct DisconnectingOps;

    impl BackendOps for DisconnectingOps {
        fn backend(&self) -> Backend {
            Backend::Dummy
        }
        fn connect(&mut self) -> Result<DevicesInfo> {
            Ok(DevicesInfo::default())
        }
        fn disconnect(&mut self) {}
        fn refresh_devices(&mut self) -> Result<DevicesInfo> {
            Err(Error::BackendDisconnected("sound server went away".into()))
        }
        fn open_outstream(&mut self, _params: OutstreamParams) -> Result<Box<dyn BackendOutstream>> {
            unreachable!("not exercised by this test")
        }
        fn open_instream(&mut self, _params: InstreamParams) -> Result<Box<dyn BackendInstream>> {
            unreachable!("not exercised by this test")
        }
    }

    #[test]
    fn backend_disconnect_is_delivered_once_through_flush_events() {
        let ctx = Context::new("waveio-tests");
        *ctx.ops.lock().expect("mutex poisoned") = Some(Box::new(DisconnectingOps));

        let delivered = Arc::new(AtomicBool::new(false));
        let delivered_cb = Arc::clone(&delivered);
        ctx.set_on_backend_disconnect(Box::new(move |_err| {
            delivered_cb.store(true, Ordering::Release);
        }));

        let scan_result = ctx.force_device_scan();
        assert!(matches!(scan_result, Err(Error::BackendDisconnected(_))));
        assert!(!delivered.load(Ordering::Acquire), "not delivered before flush_events");

        ctx.flush_events();
        assert!(delivered.load(Ordering::Acquire));

        delivered.store(false, Ordering::Release);
        ctx.flush_events();
        assert!(!delivered.load(Ordering::Acquire), "delivered at most once");
    }

    #[test]
    fn open_outstream_requires_connection() {
        let ctx = Context::new("waveio-tests");
        let stereo = ChannelLayout::new(vec![waveio_core::ChannelId::FrontLeft, waveio_core::ChannelId::FrontRight]);
        let fake_device = Device::new(
            "id",
            "name",
            crate::device::DeviceAim::Output,
            false,
            vec![stereo.clone()],
            Some(stereo.clone()),
            vec![Format::float32_ne()],
            Some(Format::float32_ne()),
            vec![],
            None,
        );
        let result = ctx.open_outstream(
            fake_device,
            Format::float32_ne(),
            48_000,
            stereo,
            0.1,
            "test",
            Box::new(|_out, _min, _max| {}),
        );
        assert!(result.is_err());
    }
}
