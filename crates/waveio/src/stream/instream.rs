//! Instream state machine, mirroring [`crate::stream::outstream::Outstream`]
//! for capture devices.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, warn};
use waveio_core::{ChannelLayout, Format};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::stream::area::ChannelArea;
use crate::stream::{BackendInstream, OverflowCallback, ReadCallback, StreamErrorCallback};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InstreamState {
    Opened = 0,
    Started = 1,
    Running = 2,
    Paused = 3,
    Destroyed = 4,
}

impl InstreamState {
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

/// An open, backend-bound capture stream.
pub struct Instream {
    device: Device,
    format: Format,
    sample_rate: u32,
    layout: ChannelLayout,
    name: String,
    state: AtomicU8,
    backend: Mutex<Box<dyn BackendInstream>>,
    read_callback: Mutex<ReadCallback>,
    overflow_callback: Mutex<Option<OverflowCallback>>,
    error_callback: Mutex<Option<StreamErrorCallback>>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Instream {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        device: Device,
        format: Format,
        sample_rate: u32,
        layout: ChannelLayout,
        name: String,
        backend: Box<dyn BackendInstream>,
        read_callback: ReadCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            device,
            format,
            sample_rate,
            layout,
            name,
            state: AtomicU8::new(InstreamState::Opened as u8),
            backend: Mutex::new(backend),
            read_callback: Mutex::new(read_callback),
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
    pub fn state(&self) -> InstreamState {
        InstreamState::from_u8(self.state.load(Ordering::Acquire))
    }
    #[must_use]
    pub fn software_latency(&self) -> f64 {
        self.backend.lock().expect("instream backend mutex poisoned").software_latency()
    }

    pub fn set_overflow_callback(&self, callback: OverflowCallback) {
        *self.overflow_callback.lock().expect("mutex poisoned") = Some(callback);
    }
    pub fn set_error_callback(&self, callback: StreamErrorCallback) {
        *self.error_callback.lock().expect("mutex poisoned") = Some(callback);
    }

    pub(crate) fn notify_overflow(&self) {
        warn!(stream = %self.name, "instream overflow");
        if let Some(cb) = self.overflow_callback.lock().expect("mutex poisoned").as_mut() {
            cb();
        }
    }

    pub(crate) fn notify_error(&self, error: Error) {
        warn!(stream = %self.name, %error, "instream error");
        self.state.store(InstreamState::Paused as u8, Ordering::Release);
        if let Some(cb) = self.error_callback.lock().expect("mutex poisoned").as_mut() {
            cb(error);
        }
    }

    pub fn begin_read(&self, frame_count: u32) -> Result<(Vec<ChannelArea>, u32)> {
        if frame_count == 0 {
            return Err(Error::Invalid("begin_read: frame_count must be nonzero".into()));
        }
        self.backend.lock().expect("instream backend mutex poisoned").begin_read(frame_count)
    }

    pub fn end_read(&self) -> Result<()> {
        self.backend.lock().expect("instream backend mutex poisoned").end_read()
    }

    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.state() != InstreamState::Opened {
            return Err(Error::Invalid("instream already started".into()));
        }
        self.state.store(InstreamState::Started as u8, Ordering::Release);
        self.backend.lock().expect("instream backend mutex poisoned").start()?;

        let this = Arc::clone(self);
        self.stop.store(false, Ordering::Release);
        let handle = std::thread::Builder::new()
            .name(format!("waveio-in-{}", self.name))
            .spawn(move || this.run_worker())
            .map_err(|e| Error::SystemResources(e.to_string()))?;
        *self.worker.lock().expect("mutex poisoned") = Some(handle);
        self.state.store(InstreamState::Running as u8, Ordering::Release);
        Ok(())
    }

    fn run_worker(self: Arc<Self>) {
        let period_frames = (self.sample_rate as f64 * 0.02).round() as u32;
        while !self.stop.load(Ordering::Acquire) {
            if self.state() == InstreamState::Paused {
                std::thread::sleep(std::time::Duration::from_millis(10));
                continue;
            }
            let frame_time = std::time::Duration::from_secs_f64(
                f64::from(period_frames) / f64::from(self.sample_rate.max(1)),
            );
            std::thread::sleep(frame_time);

            if self.backend.lock().expect("instream backend mutex poisoned").take_overflow() {
                self.notify_overflow();
            }

            let mut callback = self.read_callback.lock().expect("mutex poisoned");
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
        debug!(stream = %self.name, "instream worker exiting");
    }

    pub fn pause(&self, pause: bool) -> Result<()> {
        let current = self.state();
        if current != InstreamState::Running && current != InstreamState::Paused {
            return Err(Error::Invalid("instream is not started".into()));
        }
        self.backend.lock().expect("instream backend mutex poisoned").pause(pause)?;
        self.state.store(
            (if pause { InstreamState::Paused } else { InstreamState::Running }) as u8,
            Ordering::Release,
        );
        Ok(())
    }
}

impl Drop for Instream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().expect("mutex poisoned").take() {
            let _ = handle.join();
        }
        self.state.store(InstreamState::Destroyed as u8, Ordering::Release);
    }
}
