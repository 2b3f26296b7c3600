//! Cross-platform, low-level audio input/output.
//!
//! waveio talks to whatever native sound system is available (PulseAudio
//! or ALSA on Linux, CoreAudio on macOS, WASAPI on Windows, JACK
//! everywhere it runs, and a software-only dummy backend when none of
//! those are usable) through one API: connect a [`Context`], enumerate its
//! [`Device`]s, and open an [`Outstream`] or [`Instream`] against one.
//!
//! ```no_run
//! use waveio::{Context, Format};
//!
//! # fn main() -> waveio::Result<()> {
//! let ctx = Context::new("my-app");
//! ctx.connect()?;
//! let device = ctx.default_output_device().ok_or(waveio::Error::NoSuchDevice)?;
//! let layout = device.current_layout().cloned().unwrap();
//! let outstream = ctx.open_outstream(
//!     device,
//!     Format::float32_ne(),
//!     48_000,
//!     layout,
//!     0.1,
//!     "my-app",
//!     Box::new(|stream, _min, max| {
//!         let (areas, frames) = stream.begin_write(max).unwrap();
//!         for area in &areas {
//!             // SAFETY: `frames` is within the transaction just granted.
//!             let slice = unsafe {
//!                 std::slice::from_raw_parts_mut(area.pointer().cast::<f32>(), frames as usize)
//!             };
//!             slice.fill(0.0);
//!         }
//!         stream.end_write().unwrap();
//!     }),
//! )?;
//! outstream.start()?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod context;
pub mod device;
pub mod error;
pub mod stream;

pub use backend::Backend;
pub use context::Context;
pub use device::{Device, DeviceAim, DevicesInfo, SampleRateRange};
pub use error::{Error, Result};
pub use stream::{
    BackendInstream, BackendOutstream, ChannelArea, Instream, InstreamState, Outstream,
    OutstreamState,
};
pub use waveio_core::{ChannelId, ChannelLayout, Format};
