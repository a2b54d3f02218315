//! Configuration for PMREM baking.
//!
//! Settings persist to disk as RON, accept command-line overrides via clap,
//! and report which fields changed between two loads.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AtlasEncoding, AtlasFormat, Backend, Config, DebugConfig, GeneratorConfig, OutputConfig,
};
pub use error::ConfigError;
