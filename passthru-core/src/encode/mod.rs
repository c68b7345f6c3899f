//! Passthrough encoding
//!
//! This module provides:
//! - The passthrough encoder that emits pre-encoded frames on pull
//! - Factories binding encoders to one source or routing through the registry
//! - A lazy encoder that picks passthrough or a real encoder on first use

mod factory;
mod lazy;
mod passthrough;

pub use factory::PassthroughEncoderFactory;
pub use lazy::{EncoderCreator, LazyEncoder, LazyEncoderFactory, LazyMode};
pub use passthrough::PassthroughEncoder;
