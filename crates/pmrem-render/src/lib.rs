//! Rendering devices for the PMREM pipeline: texture descriptors and colour
//! encodings, the explicit draw-command contract, a software rasteriser and
//! a wgpu backend running the same programs in WGSL.

pub mod cpu;
pub mod device;
pub mod gpu;
pub mod mesh;
pub mod program;
pub mod shading;
pub mod texture;

pub use cpu::{CpuDevice, CpuTextureView};
pub use device::{DeviceError, DrawCommand, RenderDevice};
pub use gpu::{PMREM_SHADER_SOURCE, WgpuDevice};
pub use mesh::QuadVertex;
pub use program::{BlurAxis, BlurUniforms, MAX_SAMPLES, Program, ProgramKind};
pub use texture::{ColorEncoding, FilterMode, TexelFormat, TextureDescriptor, TextureHandle};
