//! Outstream state machine: `Unopened -> Opened -> Started -> Running <-> Paused -> Destroyed`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, warn};
use waveio_core::{ChannelLayout, Format};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::stream::area::ChannelArea;
use crate::stream::{BackendOutstream, OverflowCallback, StreamErrorCallback, UnderflowCallback, WriteCallback};

/// Lifecycle state of an [`Outstream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutstreamState {
    Opened = 0,
    Started = 1,
    Running = 2,
    Paused = 3,
    Destroyed = 4,
}

impl OutstreamState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Opened,
            1 => Self::Started,
            2 => Self::Running,
            3 => Self::Paused,
            _ => Self::Destroyed,
        }
    }
}

/// An open, backend-bound playback stream.
///
/// Construction (`Context::open_outstream`) leaves the stream in
/// [`OutstreamState::Opened`]. Calling [`Outstream::start`] transitions it
/// to `Started`, then `Running` once the backend's worker thread begins
/// invoking the write callback. [`Outstream::pause`] toggles between
/// `Running` and `Paused`; dropping the stream tears it down from any
/// state.
pub struct Outstream {
    device: Device,
    format: Format,
    sample_rate: u32,
    layout: ChannelLayout,
    name: String,
    state: AtomicU8,
    backend: Mutex<Box<dyn BackendOutstream>>,
    write_callback: Mutex<WriteCallback>,
    underflow_callback: Mutex<Option<UnderflowCallback>>,
    overflow_callback: Mutex<Option<OverflowCallback>>,
    error_callback: Mutex<Option<StreamErrorCallback>>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Outstream {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        device: Device,
        format: Format,
        sample_rate: u32,
        layout: ChannelLayout,
        name: String,
        backend: Box<dyn BackendOutstream>,
        write_callback: WriteCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            device,
            format,
            sample_rate,
            layout,
            name,
            state: AtomicU8::new(OutstreamState::Opened as u8),
            backend: Mutex::new(backend),
            write_callback: Mutex::new(write_callback),
            underflow_callback: Mutex::new(None),
            overflow_callback: Mutex::new(None),
            error_callback: Mutex::new(None),
            stop: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    #[must_use]
    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn state(&self) -> OutstreamState {
        OutstreamState::from_u8(self.state.load(Ordering::Acquire))
    }
    #[must_use]
    pub fn software_latency(&self) -> f64 {
        self.backend.lock().expect("outstream backend mutex poisoned").software_latency()
    }

    pub fn set_underflow_callback(&self, callback: UnderflowCallback) {
        *self.underflow_callback.lock().expect("mutex poisoned") = Some(callback);
    }
    pub fn set_overflow_callback(&self, callback: OverflowCallback) {
        *self.overflow_callback.lock().expect("mutex poisoned") = Some(callback);
    }
    pub fn set_error_callback(&self, callback: StreamErrorCallback) {
        *self.error_callback.lock().expect("mutex poisoned") = Some(callback);
    }

    /// Reports an underflow to the registered callback, if any, and to the
    /// tracing span at `warn` level regardless.
    pub(crate) fn notify_underflow(&self) {
        warn!(stream = %self.name, "outstream underflow");
        if let Some(cb) = self.underflow_callback.lock().expect("mutex poisoned").as_mut() {
            cb();
        }
    }

    pub(crate) fn notify_overflow(&self) {
        warn!(stream = %self.name, "outstream overflow");
        if let Some(cb) = self.overflow_callback.lock().expect("mutex poisoned").as_mut() {
            cb();
        }
    }

    pub(crate) fn notify_error(&self, error: Error) {
        warn!(stream = %self.name, %error, "outstream error");
        self.state.store(OutstreamState::Paused as u8, Ordering::Release);
        if let Some(cb) = self.error_callback.lock().expect("mutex poisoned").as_mut() {
            cb(error);
        }
    }

    /// Begins a write transaction; must be called from within the write
    /// callback (or, for application-driven backends, from the thread
    /// driving the stream).
    pub fn begin_write(&self, frame_count: u32) -> Result<(Vec<ChannelArea>, u32)> {
        if frame_count == 0 {
            return Err(Error::Invalid("begin_write: frame_count must be nonzero".into()));
        }
        self.backend.lock().expect("outstream backend mutex poisoned").begin_write(frame_count)
    }

    /// Commits the most recent [`Outstream::begin_write`] transaction.
    pub fn end_write(&self) -> Result<()> {
        self.backend.lock().expect("outstream backend mutex poisoned").end_write()
    }

    /// Drops all buffered-but-unwritten audio. Valid only while paused or
    /// before the first `start`.
    pub fn clear_buffer(&self) -> Result<()> {
        self.backend.lock().expect("outstream backend mutex poisoned").clear_buffer()
    }

    /// Starts the backend's worker thread, transitioning
    /// `Opened -> Started -> Running`.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.state() != OutstreamState::Opened {
            return Err(Error::Invalid("outstream already started".into()));
        }
        self.state.store(OutstreamState::Started as u8, Ordering::Release);
        self.backend.lock().expect("outstream backend mutex poisoned").start()?;

        let this = Arc::clone(self);
        self.stop.store(false, Ordering::Release);
        let handle = std::thread::Builder::new()
            .name(format!("waveio-out-{}", self.name))
            .spawn(move || this.run_worker())
            .map_err(|e| Error::SystemResources(e.to_string()))?;
        *self.worker.lock().expect("mutex poisoned") = Some(handle);
        self.state.store(OutstreamState::Running as u8, Ordering::Release);
        Ok(())
    }

    fn run_worker(self: Arc<Self>) {
        let period_frames = (self.sample_rate as f64 * 0.02).round() as u32;
        while !self.stop.load(Ordering::Acquire) {
            if self.state() == OutstreamState::Paused {
                std::thread::sleep(std::time::Duration::from_millis(10));
                continue;
            }
            let frame_time = std::time::Duration::from_secs_f64(
                f64::from(period_frames) / f64::from(self.sample_rate.max(1)),
            );
            std::thread::sleep(frame_time);

            if self.backend.lock().expect("outstream backend mutex poisoned").take_underflow() {
                self.notify_underflow();
            }

            let mut callback = self.write_callback.lock().expect("mutex poisoned");
            // SAFETY net, not memory safety: a panicking user callback must
            // not unwind across this worker's entry point (it would abort
            // the process via the default panic hook running on a detached
            // thread); convert it into a Streaming error instead.
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                callback(self.as_ref(), 0, period_frames);
            }));
            drop(callback);
            if let Err(panic_payload) = result {
                let message = super::panic_message(&panic_payload);
                drop(panic_payload);
                self.notify_error(Error::Streaming(message));
                break;
            }
        }
        debug!(stream = %self.name, "outstream worker exiting");
    }

    /// Toggles between `Running` and `Paused`.
    pub fn pause(&self, pause: bool) -> Result<()> {
        let current = self.state();
        if current != OutstreamState::Running && current != OutstreamState::Paused {
            return Err(Error::Invalid("outstream is not started".into()));
        }
        self.backend.lock().expect("outstream backend mutex poisoned").pause(pause)?;
        self.state.store(
            (if pause { OutstreamState::Paused } else { OutstreamState::Running }) as u8,
            Ordering::Release,
        );
        Ok(())
    }
}

impl Drop for Outstream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().expect("mutex poisoned").take() {
            let _ = handle.join();
        }
        self.state.store(OutstreamState::Destroyed as u8, Ordering::Release);
    }
}
