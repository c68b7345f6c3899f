//! Passthru Core Library
//!
//! Encoded-frame passthrough for pull-based media send pipelines.
//!
//! This library provides:
//! - Encoded sources that queue pre-encoded frames from any thread
//! - A placeholder raw-frame pump that makes the host pipeline pull
//! - A passthrough encoder that swaps the real payload in on each pull
//! - Simulcast layer groups with per-layer encoder factories
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ push  ┌──────────────┐ placeholder ┌───────────────┐
//! │ Application  │──────▶│ EncodedSource│────────────▶│ Host pipeline │
//! │ (encoded     │       │ FIFO + pump  │             │ (pull-based)  │
//! │  bitstream)  │       └──────┬───────┘             └───────┬───────┘
//! └──────────────┘              │ take_next_frame        pull │
//!                               │     ┌─────────────────────┐ │
//!                               └────▶│ PassthroughEncoder  │◀┘
//!                                     │ emits real payload  │
//!                                     └─────────────────────┘
//! ```

pub mod config;
pub mod encode;
pub mod error;
pub mod frame;
pub mod host;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod simulcast;
pub mod source;
pub mod types;

pub use config::{ConfigFile, EncoderConfig, PumpConfig, SourceConfig};
pub use encode::{LazyEncoder, PassthroughEncoder, PassthroughEncoderFactory};
pub use error::{PassthruError, Result, SinkError};
pub use frame::{EncodedFrame, RawFrame};
pub use pipeline::{LoopbackPipeline, PipelineStats};
pub use registry::SourceRegistry;
pub use simulcast::SimulcastSource;
pub use source::{EncodedSource, FrameProvider, KeyframeRequestObserver};
pub use types::{Codec, FrameType, Resolution, RoutingId};
