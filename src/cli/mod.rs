//! CLI module for ragline
//!
//! Argument parsing lives in `args`; configuration is shared with the
//! library (`crate::config`).

pub mod args;

pub use args::{Args, Commands, Verbosity};
