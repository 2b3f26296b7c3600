//! Backend abstraction: one implementation per sound system, selected at
//! [`crate::Context::connect`] time.

pub mod bridge;
pub mod dummy;

#[cfg(target_os = "linux")]
pub mod alsa;
#[cfg(target_os = "linux")]
pub mod pulseaudio;
#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
pub mod jack;
#[cfg(target_os = "macos")]
pub mod coreaudio;
#[cfg(target_os = "windows")]
pub mod wasapi;

use std::fmt;

use crate::device::DevicesInfo;
use crate::error::Result;
use crate::stream::{BackendInstream, BackendOutstream, InstreamParams, OutstreamParams};

/// The set of backends waveio knows how to speak to.
///
/// Not every variant is usable on every platform; [`Backend::is_available`]
/// reflects what was compiled in for the current target, and
/// [`Backend::parse_name`] is how the `WAVEIO_BACKEND` environment variable
/// and `--backend` CLI flag resolve a name to a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Dummy,
    Alsa,
    PulseAudio,
    Jack,
    CoreAudio,
    Wasapi,
}

impl Backend {
    /// Backends to try, in order, when the caller does not name one.
    #[must_use]
    pub fn priority_order() -> &'static [Backend] {
        &[
            Backend::Jack,
            Backend::PulseAudio,
            Backend::Alsa,
            Backend::CoreAudio,
            Backend::Wasapi,
            Backend::Dummy,
        ]
    }

    #[must_use]
    pub fn is_available(self) -> bool {
        match self {
            Backend::Dummy => true,
            Backend::Alsa | Backend::PulseAudio => cfg!(target_os = "linux"),
            Backend::Jack => {
                cfg!(target_os = "linux") || cfg!(target_os = "macos") || cfg!(target_os = "windows")
            }
            Backend::CoreAudio => cfg!(target_os = "macos"),
            Backend::Wasapi => cfg!(target_os = "windows"),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Backend::Dummy => "dummy",
            Backend::Alsa => "alsa",
            Backend::PulseAudio => "pulseaudio",
            Backend::Jack => "jack",
            Backend::CoreAudio => "coreaudio",
            Backend::Wasapi => "wasapi",
        }
    }

    /// Parses the value of `WAVEIO_BACKEND` or `--backend`, case-insensitive.
    #[must_use]
    pub fn parse_name(name: &str) -> Option<Backend> {
        [
            Backend::Dummy,
            Backend::Alsa,
            Backend::PulseAudio,
            Backend::Jack,
            Backend::CoreAudio,
            Backend::Wasapi,
        ]
        .into_iter()
        .find(|b| b.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Object-safe per-backend operations, implemented once per sound system.
///
/// A `Context` holds at most one connected `Box<dyn BackendOps>` at a time;
/// boxed trait objects and boxed callbacks keep every platform-specific
/// type (an ALSA `snd_pcm_t`, a PulseAudio mainloop, a JACK client) out of
/// `Context`'s own fields.
pub trait BackendOps: Send {
    fn backend(&self) -> Backend;

    /// Performs whatever one-time handshake the backend needs (opening a
    /// socket, loading a shared library, registering a client) and
    /// produces the first device snapshot.
    fn connect(&mut self) -> Result<DevicesInfo>;

    /// Tears down the connection. Called from `Context::disconnect` and
    /// from `Drop`.
    fn disconnect(&mut self);

    /// Re-enumerates devices, for backends that don't push change events
    /// and must be polled (`Context::force_device_scan`).
    fn refresh_devices(&mut self) -> Result<DevicesInfo>;

    fn open_outstream(&mut self, params: OutstreamParams) -> Result<Box<dyn BackendOutstream>>;
    fn open_instream(&mut self, params: InstreamParams) -> Result<Box<dyn BackendInstream>>;
}
