//! Configuration for the disclosure engine and its admin binary.
//!
//! Settings persist to disk as `config.ron`, tolerate missing and unknown
//! fields, can be hot-reloaded, and accept CLI overrides via clap.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, Command};
pub use config::{
    Config, DebugConfig, MessagesConfig, ProtectionConfig, translate_color_codes,
};
pub use error::ConfigError;
