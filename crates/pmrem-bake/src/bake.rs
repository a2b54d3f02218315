//! Load, filter and write one environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::Vec4;
use image::{ColorType, RgbaImage};
use pmrem::{AtlasImage, LodPlan, PmremError, PmremGenerator};
use pmrem_config::{Backend, Config, ConfigError, OutputConfig};
use pmrem_render::{
    ColorEncoding, CpuDevice, DeviceError, RenderDevice, TextureDescriptor, WgpuDevice,
};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load '{path}': {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write '{path}': {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to create output directory: {0}")]
    OutputDir(#[source] std::io::Error),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Pmrem(#[from] PmremError),
}

/// Linear radiance of an equirectangular image, row 0 at the north pole.
#[derive(Clone, Debug)]
pub struct Environment {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub texels: Vec<Vec4>,
}

/// Bake `input` and write the atlas PNG, returning its path.
pub fn run(input: &Path, output: Option<&Path>, config: &Config) -> Result<PathBuf, BakeError> {
    let settings = config.generator.lod_settings()?;
    let generator = PmremGenerator::with_plan(Arc::new(LodPlan::new(&settings)));

    let environment = load_environment(input)?;
    let mut device = open_device(config.generator.backend)?;
    let png = bake_atlas(device.as_mut(), &generator, &environment, &config.output)?;

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input, &config.output.directory));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(BakeError::OutputDir)?;
    }
    png.save(&path).map_err(|source| BakeError::Save {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Read an image as linear radiance. Float images are taken as linear,
/// integer images as sRGB.
pub fn load_environment(path: &Path) -> Result<Environment, BakeError> {
    let image = image::open(path).map_err(|source| BakeError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let is_float = matches!(image.color(), ColorType::Rgb32F | ColorType::Rgba32F);
    let rgba = image.into_rgba32f();
    let (width, height) = rgba.dimensions();

    let texels = rgba
        .pixels()
        .map(|p| {
            let value = Vec4::from_array(p.0);
            if is_float {
                value
            } else {
                ColorEncoding::Srgb.decode(value)
            }
        })
        .collect();

    info!(
        "Loaded {} ({width}x{height}, {})",
        path.display(),
        if is_float { "linear" } else { "sRGB" }
    );
    Ok(Environment {
        label: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "environment".to_string()),
        width,
        height,
        texels,
    })
}

/// Open the device `backend` asks for.
pub fn open_device(backend: Backend) -> Result<Box<dyn RenderDevice>, BakeError> {
    match backend {
        Backend::Cpu => Ok(Box::new(CpuDevice::new())),
        Backend::Wgpu => Ok(Box::new(WgpuDevice::new_headless_blocking()?)),
        Backend::Auto => match WgpuDevice::new_headless_blocking() {
            Ok(device) => Ok(Box::new(device)),
            Err(e) => {
                warn!("wgpu unavailable ({e}), baking on the CPU");
                Ok(Box::new(CpuDevice::new()))
            }
        },
    }
}

/// Upload `environment`, filter it, and convert the atlas to an 8-bit image.
///
/// Source and atlas are released before returning.
pub fn bake_atlas(
    device: &mut dyn RenderDevice,
    generator: &PmremGenerator,
    environment: &Environment,
    output: &OutputConfig,
) -> Result<RgbaImage, BakeError> {
    let format = output.format.texel_format();
    let encoding = output.encoding.color_encoding();
    let (width, height) = (environment.width, environment.height);
    let desc = TextureDescriptor::equirect(&environment.label, width, height)
        .with_format(format)
        .with_encoding(encoding)
        .with_anisotropy(output.anisotropy);
    let stored: Vec<Vec4> = environment.texels.iter().map(|&t| encoding.encode(t)).collect();

    generator.compile_equirectangular_program(device, format)?;
    let source = device.create_texture(&desc, &stored)?;
    let result = generator.from_equirectangular(device, source);
    device.dispose(source);

    let atlas = result?;
    let image = atlas.read_back(device);
    atlas.dispose(device);
    Ok(atlas_to_png(&image?, encoding))
}

/// 8-bit rendition of an atlas.
///
/// sRGB and RGBE atlases keep their stored values; linear atlases are
/// clamped and written with the sRGB transfer so the PNG views correctly.
pub fn atlas_to_png(atlas: &AtlasImage, encoding: ColorEncoding) -> RgbaImage {
    let texels: Vec<Vec4> = match encoding {
        ColorEncoding::Linear => atlas
            .texels()
            .iter()
            .map(|&t| ColorEncoding::Srgb.encode(t.clamp(Vec4::ZERO, Vec4::ONE)))
            .collect(),
        ColorEncoding::Srgb | ColorEncoding::Rgbe => atlas.texels().to_vec(),
    };
    let bytes = texels
        .iter()
        .flat_map(|t| {
            (t.clamp(Vec4::ZERO, Vec4::ONE) * 255.0)
                .round()
                .to_array()
                .map(|c| c as u8)
        })
        .collect();
    RgbaImage::from_raw(atlas.width(), atlas.height(), bytes)
        .unwrap_or_else(|| RgbaImage::new(atlas.width(), atlas.height()))
}

/// `<directory>/<input stem>-pmrem.png`.
pub fn default_output_path(input: &Path, directory: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "environment".to_string());
    directory.join(format!("{stem}-pmrem.png"))
}
