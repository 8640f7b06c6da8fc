//! Command-line interface: argument parsing for the node binary.

pub mod commands;

pub use commands::{Command, Opt};
