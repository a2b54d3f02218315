//! Command-line argument parsing for the PMREM baker.

use std::path::PathBuf;

use clap::Parser;

use crate::{AtlasEncoding, AtlasFormat, Backend, Config};

/// PMREM baker command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "pmrem-bake", about = "Bake prefiltered radiance environment atlases")]
pub struct CliArgs {
    /// Equirectangular environment image (HDR, PNG or JPEG).
    pub input: PathBuf,

    /// Output PNG path (defaults to the configured output directory).
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// log2 of the LOD 0 face size.
    #[arg(long)]
    pub lod_max: Option<u32>,

    /// log2 of the smallest face size.
    #[arg(long)]
    pub lod_min: Option<u32>,

    /// Device to bake on.
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Atlas storage format.
    #[arg(long, value_enum)]
    pub format: Option<AtlasFormat>,

    /// Atlas colour encoding.
    #[arg(long, value_enum)]
    pub encoding: Option<AtlasEncoding>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(lod_max) = args.lod_max {
            self.generator.lod_max = lod_max;
        }
        if let Some(lod_min) = args.lod_min {
            self.generator.lod_min = lod_min;
        }
        if let Some(backend) = args.backend {
            self.generator.backend = backend;
        }
        if let Some(format) = args.format {
            self.output.format = format;
        }
        if let Some(encoding) = args.encoding {
            self.output.encoding = encoding;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
