//! Configuration parsing for mpx-input
//!
//! This crate parses KDL device configurations into a [`Config`], builds
//! the devices and screens it declares, and reads replay scripts of driver
//! samples.

mod build;
mod error;
mod model;
mod parser;
mod script;

pub use build::{build_context, build_devices, build_screens};
pub use error::ConfigError;
pub use model::*;
pub use parser::{parse_config, parse_config_str};
pub use script::{parse_script, parse_script_str, Sample};
