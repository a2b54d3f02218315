//! Command-line baker: filters an equirectangular environment image into a
//! cube-UV PMREM atlas and writes it as PNG.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p pmrem-bake -- sky.hdr --backend cpu` to bake on the CPU.

mod bake;

use std::process::ExitCode;

use clap::Parser;
use pmrem_config::{CliArgs, Config};
use tracing::{error, info};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(Config::default_dir);

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    let from_file = config.clone();
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    pmrem_log::init_logging(Some(&log_dir), config.debug.log_to_file, Some(&config));

    let overridden = from_file.changed_fields(&config);
    if !overridden.is_empty() {
        info!("Command line overrides: {}", overridden.join(", "));
    }

    match bake::run(&args.input, args.output.as_deref(), &config) {
        Ok(path) => {
            info!("Wrote {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Bake failed: {e}");
            ExitCode::FAILURE
        }
    }
}
