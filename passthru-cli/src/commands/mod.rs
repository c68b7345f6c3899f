//! CLI command implementations

mod config;
mod info;
mod replay;
mod simulate;

pub use config::{config, ConfigArgs};
pub use info::info;
pub use replay::{replay, ReplayArgs};
pub use simulate::{simulate, SimulateArgs};
