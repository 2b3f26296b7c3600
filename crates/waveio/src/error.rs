//! Error taxonomy shared by every public operation.

use thiserror::Error;

/// Every way a waveio operation can fail.
///
/// Backend-internal errors (an OS call failing, a sound-server RPC timing
/// out) are folded into the closest matching variant here rather than
/// exposed as backend-specific types, so application code can match on one
/// enum regardless of which backend is connected.
#[derive(Debug, Error)]
pub enum Error {
    /// Ran out of memory.
    #[error("out of memory")]
    NoMem,

    /// The backend could not be initialized (sound server unreachable,
    /// library not installed, permission denied).
    #[error("unable to initialize backend: {0}")]
    InitAudioBackend(String),

    /// A required OS resource (thread, pipe, file descriptor) could not be
    /// created.
    #[error("system resource not available: {0}")]
    SystemResources(String),

    /// Opening the device failed in a way specific to that device.
    #[error("error opening device: {0}")]
    OpeningDevice(String),

    /// The device id named no currently known device.
    #[error("no such device")]
    NoSuchDevice,

    /// An argument combination is invalid (e.g. zero channels, an
    /// unsupported format/rate/layout for the chosen device).
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// The requested backend is not compiled in or not usable on this
    /// platform.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An error occurred while the stream was running, delivered through
    /// the stream's `error_callback` rather than returned from a call.
    #[error("streaming error: {0}")]
    Streaming(String),

    /// The device does not support the combination of format, sample rate,
    /// and layout that was requested.
    #[error("incompatible device: {0}")]
    IncompatibleDevice(String),

    /// No client with that name is registered (JACK).
    #[error("no such client")]
    NoSuchClient,

    /// This backend cannot be used for the requested operation (e.g.
    /// raw mode requested from a backend that doesn't support it).
    #[error("incompatible backend: {0}")]
    IncompatibleBackend(String),

    /// The backend's connection to its sound server was lost.
    #[error("backend disconnected: {0}")]
    BackendDisconnected(String),

    /// A blocking call was interrupted and should be retried.
    #[error("interrupted")]
    Interrupted,

    /// The ring buffer underran: the outstream's write callback did not
    /// keep up with playback.
    #[error("underflow")]
    Underflow,

    /// A device or client name could not be represented in the backend's
    /// expected string encoding.
    #[error("unable to convert string encoding: {0}")]
    EncodingString(String),
}

/// Convenience alias for every fallible waveio operation.
pub type Result<T> = std::result::Result<T, Error>;
