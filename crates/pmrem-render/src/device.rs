//! The rendering-device contract the PMREM pipeline drives.

use glam::Vec4;
use pmrem_cubeuv::AtlasRect;

use crate::{Program, ProgramKind, QuadVertex, TexelFormat, TextureDescriptor, TextureHandle};

/// Errors reported by a rendering device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Width or height is zero.
    #[error("texture dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    /// Texel data length doesn't match the descriptor.
    #[error("texel data size ({actual}) does not match expected ({expected}) for '{label}'")]
    DataSizeMismatch {
        actual: usize,
        expected: usize,
        label: String,
    },

    /// The handle does not name a live texture on this device.
    #[error("unknown texture handle {0:?}")]
    UnknownTexture(TextureHandle),

    /// The texture cannot be used the way the draw asks.
    #[error("texture '{label}' cannot be used as {usage}")]
    InvalidUsage { label: String, usage: &'static str },

    /// The viewport reaches outside the target.
    #[error("viewport {viewport:?} exceeds target bounds {width}x{height}")]
    ViewportOutOfBounds {
        viewport: AtlasRect,
        width: u32,
        height: u32,
    },

    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Mapping a readback buffer failed.
    #[error("texture readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    /// The readback callback never reported back.
    #[error("readback of '{0}' was dropped before completing")]
    ReadbackDropped(String),

    /// The device stopped responding while waiting for work.
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
}

/// One draw: a triangle list of face quads, rasterised into `viewport` of
/// `target` with `program`.
#[derive(Clone, Copy, Debug)]
pub struct DrawCommand<'a> {
    /// Debug label.
    pub label: &'a str,
    /// Render target written by the draw.
    pub target: TextureHandle,
    /// Sub-rectangle of the target that clip space maps onto.
    pub viewport: AtlasRect,
    /// Triangle list, three vertices per triangle.
    pub vertices: &'a [QuadVertex],
    /// Program with its inputs and uniforms.
    pub program: Program,
}

/// A device that runs per-pixel programs over quads and writes off-screen targets.
///
/// Draws are executed in submission order. Implementations may pipeline the
/// work internally; [`RenderDevice::read_texels`] observes every prior draw.
pub trait RenderDevice {
    /// Upload a source texture. `texels` holds stored values, layer after layer.
    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
        texels: &[Vec4],
    ) -> Result<TextureHandle, DeviceError>;

    /// Allocate a zero-initialised render target.
    fn create_render_target(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, DeviceError>;

    /// Execute one draw.
    fn submit_draw(&mut self, draw: &DrawCommand<'_>) -> Result<(), DeviceError>;

    /// Build a program ahead of its first draw into a target of `format`.
    fn prepare(&mut self, _kind: ProgramKind, _format: TexelFormat) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Descriptor of a live texture.
    fn descriptor(&self, handle: TextureHandle) -> Option<&TextureDescriptor>;

    /// Read back stored texel values, layer after layer.
    fn read_texels(&mut self, handle: TextureHandle) -> Result<Vec<Vec4>, DeviceError>;

    /// Release a texture. Unknown handles are ignored.
    fn dispose(&mut self, handle: TextureHandle);
}

/// Check a descriptor and its upload data against each other.
pub(crate) fn validate_upload(
    descriptor: &TextureDescriptor,
    texels: Option<&[Vec4]>,
) -> Result<(), DeviceError> {
    if descriptor.width == 0 || descriptor.height == 0 || descriptor.layers == 0 {
        return Err(DeviceError::ZeroDimensions {
            width: descriptor.width,
            height: descriptor.height,
        });
    }
    if let Some(texels) = texels
        && texels.len() != descriptor.texel_count()
    {
        return Err(DeviceError::DataSizeMismatch {
            actual: texels.len(),
            expected: descriptor.texel_count(),
            label: descriptor.label.clone(),
        });
    }
    Ok(())
}

/// Check that a draw's viewport lies inside its target.
pub(crate) fn validate_viewport(
    viewport: &AtlasRect,
    target: &TextureDescriptor,
) -> Result<(), DeviceError> {
    if viewport.right() > target.width || viewport.bottom() > target.height {
        return Err(DeviceError::ViewportOutOfBounds {
            viewport: *viewport,
            width: target.width,
            height: target.height,
        });
    }
    Ok(())
}
