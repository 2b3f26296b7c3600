//! Low-level primitives shared by every waveio backend: OS abstractions, the
//! lock-free ring buffer used to move audio between a real-time thread and
//! its caller, and the channel-layout and sample-format catalogs used to
//! describe a stream's shape.
//!
//! Nothing in this crate talks to a sound server. It exists so that
//! `waveio`'s backends, and any future backend, share one audited
//! implementation of the parts that are easy to get subtly wrong: mirrored
//! memory mapping, atomic ring buffer bookkeeping, and the channel/format
//! catalogs a spec like this one is built around.

pub mod channel_layout;
pub mod format;
pub mod os;
pub mod ring_buffer;

pub use channel_layout::{ChannelId, ChannelLayout, MAX_CHANNELS};
pub use format::Format;
pub use os::{MirroredMemory, OsError};
pub use ring_buffer::RingBuffer;
