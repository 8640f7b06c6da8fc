//! Process configuration, sourced from the environment at startup.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};
