//! Per-pixel programs the PMREM pipeline runs, and their explicit uniforms.
//!
//! Every draw carries its program and uniforms by value in a
//! [`DrawCommand`](crate::DrawCommand); devices never keep uniform state
//! between draws that callers could forget to update.

use bytemuck::{Pod, Zeroable};
use pmrem_cubeuv::CubeUvLayout;

use crate::{ColorEncoding, TextureHandle};

/// Length of the blur weight array. Kernels needing more taps are clipped.
pub const MAX_SAMPLES: usize = 20;

/// Which rotation a half-blur applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlurAxis {
    /// Rotate along the meridian through the up axis.
    Longitudinal,
    /// Rotate around the up axis, scaled by distance from it.
    Latitudinal,
}

/// Uniforms of one half-blur draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurUniforms {
    /// Active taps on each side, centre included.
    pub samples: u32,
    /// Tap weights; only the first `samples` are read.
    pub weights: [f32; MAX_SAMPLES],
    /// Rotation applied per tap.
    pub axis: BlurAxis,
    /// Angle between neighbouring taps in radians.
    pub d_theta: f32,
    /// LOD region read from the source atlas.
    pub source_lod: u32,
    /// Atlas layout shared by source and target.
    pub layout: CubeUvLayout,
}

/// Program and inputs of a draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Program {
    /// Resample a 2D equirectangular image into cube-UV faces.
    EquirectToCubeUv { source: TextureHandle },
    /// Resample a six-layer cube image into cube-UV faces.
    CubemapToCubeUv { source: TextureHandle },
    /// One pass of the separable directional Gaussian.
    Blur {
        source: TextureHandle,
        uniforms: BlurUniforms,
    },
}

/// Program identity without inputs, for ahead-of-time preparation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    EquirectToCubeUv,
    CubemapToCubeUv,
    Blur,
}

impl Program {
    /// The program's kind.
    pub fn kind(&self) -> ProgramKind {
        match self {
            Program::EquirectToCubeUv { .. } => ProgramKind::EquirectToCubeUv,
            Program::CubemapToCubeUv { .. } => ProgramKind::CubemapToCubeUv,
            Program::Blur { .. } => ProgramKind::Blur,
        }
    }

    /// Texture the program samples.
    pub fn source(&self) -> TextureHandle {
        match *self {
            Program::EquirectToCubeUv { source }
            | Program::CubemapToCubeUv { source }
            | Program::Blur { source, .. } => source,
        }
    }
}

impl ProgramKind {
    /// Fragment entry point in the WGSL module.
    pub fn fragment_entry(self) -> &'static str {
        match self {
            ProgramKind::EquirectToCubeUv => "fs_equirect",
            ProgramKind::CubemapToCubeUv => "fs_cubemap",
            ProgramKind::Blur => "fs_blur",
        }
    }
}

/// GPU uniform block shared by all PMREM programs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct PmremParams {
    pub weights: [[f32; 4]; MAX_SAMPLES / 4],
    pub d_theta: f32,
    pub samples: u32,
    pub latitudinal: u32,
    pub source_lod: u32,
    pub input_encoding: u32,
    pub output_encoding: u32,
    pub lod_max: u32,
    pub lod_min: u32,
}

impl PmremParams {
    /// Flatten a draw's program into the uniform block.
    pub fn new(program: &Program, input: ColorEncoding, output: ColorEncoding) -> Self {
        let mut params = Self::zeroed();
        params.input_encoding = input.shader_id();
        params.output_encoding = output.shader_id();

        if let Program::Blur { uniforms, .. } = program {
            for (i, w) in uniforms.weights.iter().enumerate() {
                params.weights[i / 4][i % 4] = *w;
            }
            params.d_theta = uniforms.d_theta;
            params.samples = uniforms.samples;
            params.latitudinal = u32::from(uniforms.axis == BlurAxis::Latitudinal);
            params.source_lod = uniforms.source_lod;
            params.lod_max = uniforms.layout.lod_max();
            params.lod_min = uniforms.layout.lod_min();
        }
        params
    }
}
