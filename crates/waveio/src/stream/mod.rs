//! Stream lifecycle: the outstream/instream state machines and the
//! parameters backends need to open one.

pub mod area;
pub mod instream;
pub mod outstream;

pub use area::ChannelArea;
pub use instream::{Instream, InstreamState};
pub use outstream::{Outstream, OutstreamState};

use waveio_core::{ChannelLayout, Format};

use crate::device::Device;
use crate::error::Result;

/// Parameters a caller supplies when opening an outstream, independent of
/// backend.
pub struct OutstreamParams {
    pub device: Device,
    pub format: Format,
    pub sample_rate: u32,
    pub layout: ChannelLayout,
    pub software_latency: f64,
    pub name: String,
}

/// Parameters a caller supplies when opening an instream, independent of
/// backend.
pub struct InstreamParams {
    pub device: Device,
    pub format: Format,
    pub sample_rate: u32,
    pub layout: ChannelLayout,
    pub software_latency: f64,
    pub name: String,
}

/// The subset of outstream behavior a backend must implement; `Outstream`
/// wraps one of these and adds the state machine, panic containment, and
/// callback dispatch common to every backend.
pub trait BackendOutstream: Send {
    fn start(&mut self) -> Result<()>;
    fn pause(&mut self, pause: bool) -> Result<()>;
    fn clear_buffer(&mut self) -> Result<()>;
    /// Begins a write transaction for up to `frame_count` frames, returning
    /// one [`ChannelArea`] per channel and the frame count actually granted
    /// (which may be smaller).
    fn begin_write(&mut self, frame_count: u32) -> Result<(Vec<ChannelArea>, u32)>;
    /// Commits the most recently granted write transaction.
    fn end_write(&mut self) -> Result<()>;
    fn software_latency(&self) -> f64;
    /// Reports, and clears, whether this stream has underrun (the backend's
    /// playback clock consumed frames faster than the application supplied
    /// them) since the last call. Backends that cannot detect underflow
    /// leave this at the default `false`.
    fn take_underflow(&mut self) -> bool {
        false
    }
}

/// The subset of instream behavior a backend must implement.
pub trait BackendInstream: Send {
    fn start(&mut self) -> Result<()>;
    fn pause(&mut self, pause: bool) -> Result<()>;
    fn begin_read(&mut self, frame_count: u32) -> Result<(Vec<ChannelArea>, u32)>;
    fn end_read(&mut self) -> Result<()>;
    fn software_latency(&self) -> f64;
    /// Reports, and clears, whether captured audio has been dropped because
    /// the application was not reading fast enough since the last call.
    fn take_overflow(&mut self) -> bool {
        false
    }
}

/// Invoked by a backend worker thread once per period with the number of
/// frames ready to be written, and, on overflow/underflow, via the
/// companion `*_callback` methods.
///
/// Takes `&Outstream` rather than `&mut Outstream`: the stream's backend
/// handle is behind an internal mutex so that [`Outstream::begin_write`]
/// can be called from inside this callback (as the reference protocol
/// expects) without the caller needing unique access to the stream.
pub type WriteCallback = Box<dyn FnMut(&Outstream, u32, u32) + Send>;
pub type ReadCallback = Box<dyn FnMut(&Instream, u32, u32) + Send>;
pub type UnderflowCallback = Box<dyn FnMut() + Send>;
pub type OverflowCallback = Box<dyn FnMut() + Send>;
pub type StreamErrorCallback = Box<dyn FnMut(crate::error::Error) + Send>;

/// Extracts a human-readable message from a `catch_unwind` panic payload.
pub(crate) fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "stream callback panicked".to_string()
    }
}
