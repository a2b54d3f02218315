//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use pmrem::{EXTRA_LOD_ROUGHNESS, LOD_MAX, LOD_MIN, LodSettings};
use pmrem_render::{ColorEncoding, TexelFormat};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level baking configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Level plan and device selection.
    pub generator: GeneratorConfig,
    /// Atlas storage and output location.
    pub output: OutputConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Device the generator runs on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// wgpu when an adapter is available, the software device otherwise.
    #[default]
    Auto,
    /// Software device only.
    Cpu,
    /// wgpu only; fails without an adapter.
    Wgpu,
}

/// Storage format of the atlas.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum AtlasFormat {
    Rgba8,
    #[default]
    Rgba16Float,
    Rgba32Float,
}

impl AtlasFormat {
    pub fn texel_format(self) -> TexelFormat {
        match self {
            AtlasFormat::Rgba8 => TexelFormat::Rgba8Unorm,
            AtlasFormat::Rgba16Float => TexelFormat::Rgba16Float,
            AtlasFormat::Rgba32Float => TexelFormat::Rgba32Float,
        }
    }
}

/// Colour encoding of the atlas.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum AtlasEncoding {
    #[default]
    Linear,
    Srgb,
    Rgbe,
}

impl AtlasEncoding {
    pub fn color_encoding(self) -> ColorEncoding {
        match self {
            AtlasEncoding::Linear => ColorEncoding::Linear,
            AtlasEncoding::Srgb => ColorEncoding::Srgb,
            AtlasEncoding::Rgbe => ColorEncoding::Rgbe,
        }
    }
}

/// Level plan and device configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// log2 of the LOD 0 face size.
    pub lod_max: u32,
    /// log2 of the smallest face size.
    pub lod_min: u32,
    /// Roughness of the fixed levels after the halving chain, ascending.
    pub extra_roughness: Vec<f32>,
    /// Device selection.
    pub backend: Backend,
}

/// Atlas output configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory baked atlases are written to.
    pub directory: PathBuf,
    /// Storage format of the source upload, inherited by the atlas.
    pub format: AtlasFormat,
    /// Colour encoding of the source upload, inherited by the atlas.
    pub encoding: AtlasEncoding,
    /// Anisotropy recorded on the atlas for consumers.
    pub anisotropy: u16,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to the log directory.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            lod_max: LOD_MAX,
            lod_min: LOD_MIN,
            extra_roughness: EXTRA_LOD_ROUGHNESS.to_vec(),
            backend: Backend::Auto,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("pmrem-out"),
            format: AtlasFormat::Rgba16Float,
            encoding: AtlasEncoding::Linear,
            anisotropy: 1,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

impl GeneratorConfig {
    /// Validated level settings.
    pub fn lod_settings(&self) -> Result<LodSettings, ConfigError> {
        Ok(LodSettings::new(
            self.lod_max,
            self.lod_min,
            &self.extra_roughness,
        )?)
    }
}

// --- Load / Save ---

impl Config {
    /// Default directory for `config.ron` and logs.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pmrem")
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Dotted names of the fields whose values differ between `self` and `other`.
    pub fn changed_fields(&self, other: &Config) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let mut check = |name: &'static str, differs: bool| {
            if differs {
                changed.push(name);
            }
        };

        let (a, b) = (&self.generator, &other.generator);
        check("generator.lod_max", a.lod_max != b.lod_max);
        check("generator.lod_min", a.lod_min != b.lod_min);
        check("generator.extra_roughness", a.extra_roughness != b.extra_roughness);
        check("generator.backend", a.backend != b.backend);

        let (a, b) = (&self.output, &other.output);
        check("output.directory", a.directory != b.directory);
        check("output.format", a.format != b.format);
        check("output.encoding", a.encoding != b.encoding);
        check("output.anisotropy", a.anisotropy != b.anisotropy);

        let (a, b) = (&self.debug, &other.debug);
        check("debug.log_level", a.log_level != b.log_level);
        check("debug.log_to_file", a.log_to_file != b.log_to_file);

        changed
    }
}
