//! Output sinks for emitted encoded images
//!
//! Supports multiple output targets:
//! - Broadcast channel (fan-out to async consumers)
//! - In-memory collection (tests and verification)
//! - Elementary stream / IVF file recording

mod channel;
mod collect;
mod file;

pub use channel::{ChannelSink, EmittedImage};
pub use collect::CollectingSink;
pub use file::{record_from_channel, ContainerFormat, FileRecorder};

/// Default broadcast channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
