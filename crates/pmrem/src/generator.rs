//! Convolution engine: projects a source environment into LOD 0 of a cube-UV
//! atlas, then blurs each following level out of the one before it.

use std::sync::Arc;

use pmrem_render::{
    BlurAxis, DeviceError, DrawCommand, FilterMode, Program, ProgramKind, RenderDevice,
    TexelFormat, TextureDescriptor, TextureHandle,
};

use crate::kernel::{BlurKernel, incremental_sigma};
use crate::{CubeUvTexture, LodPlan};

/// Errors from a generation call.
#[derive(Debug, thiserror::Error)]
pub enum PmremError {
    /// The rendering device failed.
    #[error("render device error: {0}")]
    Device(#[from] DeviceError),

    /// The source handle is not live on the device.
    #[error("source texture {0:?} is unknown to the device")]
    UnknownSource(TextureHandle),

    /// The source has the wrong number of layers for the requested projection.
    #[error("source '{label}' has {layers} layers, expected {expected}")]
    SourceLayers {
        label: String,
        layers: u32,
        expected: u32,
    },
}

/// Source projection used for LOD 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Projection {
    Equirect,
    Cubemap,
}

impl Projection {
    fn program(self, source: TextureHandle) -> Program {
        match self {
            Projection::Equirect => Program::EquirectToCubeUv { source },
            Projection::Cubemap => Program::CubemapToCubeUv { source },
        }
    }

    fn kind(self) -> ProgramKind {
        match self {
            Projection::Equirect => ProgramKind::EquirectToCubeUv,
            Projection::Cubemap => ProgramKind::CubemapToCubeUv,
        }
    }

    fn layers(self) -> u32 {
        match self {
            Projection::Equirect => 1,
            Projection::Cubemap => 6,
        }
    }
}

/// Builds prefiltered radiance atlases on a [`RenderDevice`].
///
/// The generator only holds the shared read-only [`LodPlan`]. Render targets
/// live for the duration of one call, and the device is borrowed mutably for
/// that call, so one device never runs two generations at once.
#[derive(Clone, Debug, Default)]
pub struct PmremGenerator {
    plan: Arc<LodPlan>,
}

impl PmremGenerator {
    /// Generator with the default level plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator sharing an existing plan.
    pub fn with_plan(plan: Arc<LodPlan>) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &Arc<LodPlan> {
        &self.plan
    }

    /// Filter an equirectangular environment into a new atlas.
    pub fn from_equirectangular<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        source: TextureHandle,
    ) -> Result<CubeUvTexture, PmremError> {
        self.generate(device, source, Projection::Equirect)
    }

    /// Filter a six-layer cube environment into a new atlas.
    pub fn from_cubemap<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        source: TextureHandle,
    ) -> Result<CubeUvTexture, PmremError> {
        self.generate(device, source, Projection::Cubemap)
    }

    /// Build the equirect projection and blur programs for atlases of `format`.
    pub fn compile_equirectangular_program<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        format: TexelFormat,
    ) -> Result<(), PmremError> {
        device.prepare(Projection::Equirect.kind(), format)?;
        device.prepare(ProgramKind::Blur, format)?;
        Ok(())
    }

    /// Build the cube projection and blur programs for atlases of `format`.
    pub fn compile_cubemap_program<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        format: TexelFormat,
    ) -> Result<(), PmremError> {
        device.prepare(Projection::Cubemap.kind(), format)?;
        device.prepare(ProgramKind::Blur, format)?;
        Ok(())
    }

    /// Descriptor of an atlas target filtered from `source`.
    pub fn atlas_descriptor(&self, source: &TextureDescriptor, label: &str) -> TextureDescriptor {
        let size = self.plan.layout().atlas_size();
        TextureDescriptor {
            label: label.to_string(),
            width: size,
            height: size,
            layers: 1,
            format: source.format,
            encoding: source.encoding,
            anisotropy: source.anisotropy,
            filter: FilterMode::Nearest,
            mipmaps: false,
            render_target: true,
        }
    }

    fn generate<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        source: TextureHandle,
        projection: Projection,
    ) -> Result<CubeUvTexture, PmremError> {
        let source_desc = device
            .descriptor(source)
            .cloned()
            .ok_or(PmremError::UnknownSource(source))?;
        if source_desc.layers != projection.layers() {
            return Err(PmremError::SourceLayers {
                label: source_desc.label,
                layers: source_desc.layers,
                expected: projection.layers(),
            });
        }

        let descriptor = self.atlas_descriptor(&source_desc, "pmrem-atlas");
        let primary = device.create_render_target(&descriptor)?;
        log::info!(
            "Generating PMREM from '{}' ({}x{}, {:?}) into a {}x{} atlas with {} LODs",
            source_desc.label,
            source_desc.width,
            source_desc.height,
            projection,
            descriptor.width,
            descriptor.height,
            self.plan.lod_count()
        );

        match self.render_levels(device, source, primary, &descriptor, projection) {
            Ok(()) => Ok(CubeUvTexture::new(primary, descriptor, Arc::clone(&self.plan))),
            Err(err) => {
                device.dispose(primary);
                Err(err)
            }
        }
    }

    fn render_levels<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        source: TextureHandle,
        primary: TextureHandle,
        descriptor: &TextureDescriptor,
        projection: Projection,
    ) -> Result<(), PmremError> {
        let base = self.plan.level(0);
        device.submit_draw(&DrawCommand {
            label: "pmrem-project",
            target: primary,
            viewport: self.plan.layout().region(0),
            vertices: &base.mesh,
            program: projection.program(source),
        })?;

        let scratch_desc = TextureDescriptor {
            label: "pmrem-pingpong".to_string(),
            ..descriptor.clone()
        };
        let scratch = device.create_render_target(&scratch_desc)?;
        let result = self.blur_levels(device, primary, scratch);
        device.dispose(scratch);
        result
    }

    fn blur_levels<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        primary: TextureHandle,
        scratch: TextureHandle,
    ) -> Result<(), PmremError> {
        for lod_out in 1..self.plan.lod_count() {
            let sigma = incremental_sigma(
                self.plan.level(lod_out - 1).sigma,
                self.plan.level(lod_out).sigma,
            );
            self.blur(device, primary, scratch, lod_out - 1, lod_out, sigma)?;
        }
        Ok(())
    }

    /// Blur level `lod_in` of `primary` into level `lod_out` of `primary`,
    /// going through the same region of `scratch`.
    pub fn blur<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        primary: TextureHandle,
        scratch: TextureHandle,
        lod_in: u32,
        lod_out: u32,
        sigma: f32,
    ) -> Result<(), PmremError> {
        log::debug!("Blurring LOD {lod_in} -> {lod_out} with sigma {sigma:.5}");
        self.half_blur(device, primary, scratch, lod_in, lod_out, sigma, BlurAxis::Longitudinal)?;
        self.half_blur(device, scratch, primary, lod_out, lod_out, sigma, BlurAxis::Latitudinal)
    }

    /// One directional pass from level `lod_in` of `source` into level
    /// `lod_out` of `target`.
    #[allow(clippy::too_many_arguments)]
    pub fn half_blur<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        source: TextureHandle,
        target: TextureHandle,
        lod_in: u32,
        lod_out: u32,
        sigma: f32,
        axis: BlurAxis,
    ) -> Result<(), PmremError> {
        let kernel = BlurKernel::new(sigma, self.plan.level(lod_in).size);
        let uniforms = kernel.uniforms(axis, lod_in, *self.plan.layout());
        let label = match axis {
            BlurAxis::Longitudinal => "pmrem-blur-longitudinal",
            BlurAxis::Latitudinal => "pmrem-blur-latitudinal",
        };
        device.submit_draw(&DrawCommand {
            label,
            target,
            viewport: self.plan.layout().region(lod_out),
            vertices: &self.plan.level(lod_out).mesh,
            program: Program::Blur { source, uniforms },
        })?;
        Ok(())
    }
}
