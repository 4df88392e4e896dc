//! Admin surface and host glue for the disclosure engine: platform
//! directories, config-to-engine translation, reload, and a scripted demo.

pub mod demo;
pub mod platform;
pub mod settings;

pub use demo::{DemoError, DemoReport, LoggingSink, run_demo};
pub use platform::{PlatformDirs, PlatformError};
pub use settings::{engine_settings, reload_engine};
