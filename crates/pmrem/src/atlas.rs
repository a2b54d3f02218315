//! The generated cube-UV atlas and CPU-side reads of it.

use std::sync::Arc;

use glam::{Vec3, Vec4};
use pmrem_cubeuv::{CubeUvLayout, TexelFetch, sample_cube_uv};
use pmrem_render::{ColorEncoding, RenderDevice, TextureDescriptor, TextureHandle};

use crate::{LodPlan, PmremError};

/// Atlas produced by a [`PmremGenerator`](crate::PmremGenerator).
///
/// The caller owns the device texture and releases it with
/// [`CubeUvTexture::dispose`] once it is no longer sampled.
#[derive(Clone, Debug)]
pub struct CubeUvTexture {
    handle: TextureHandle,
    descriptor: TextureDescriptor,
    plan: Arc<LodPlan>,
}

impl CubeUvTexture {
    pub(crate) fn new(handle: TextureHandle, descriptor: TextureDescriptor, plan: Arc<LodPlan>) -> Self {
        Self {
            handle,
            descriptor,
            plan,
        }
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn plan(&self) -> &Arc<LodPlan> {
        &self.plan
    }

    pub fn layout(&self) -> &CubeUvLayout {
        self.plan.layout()
    }

    /// Copy the atlas back from the device.
    pub fn read_back<D: RenderDevice + ?Sized>(&self, device: &mut D) -> Result<AtlasImage, PmremError> {
        let texels = device.read_texels(self.handle)?;
        Ok(AtlasImage {
            width: self.descriptor.width,
            height: self.descriptor.height,
            encoding: self.descriptor.encoding,
            texels,
        })
    }

    /// Bilinear lookup of level `lod` in direction `dir`.
    pub fn sample<T: TexelFetch + ?Sized>(&self, texels: &T, dir: Vec3, lod: u32) -> Vec4 {
        let lod = lod.min(self.plan.lod_count() - 1);
        sample_cube_uv(texels, self.plan.layout(), dir, lod)
    }

    /// Lookup for a surface `roughness`, blending the two nearest levels.
    pub fn sample_roughness<T: TexelFetch + ?Sized>(&self, texels: &T, dir: Vec3, roughness: f32) -> Vec4 {
        let lod = self.plan.lod_for_roughness(roughness);
        let lower = lod.floor();
        let blend = lod - lower;
        let lower = lower as u32;
        let near = self.sample(texels, dir, lower);
        if blend <= 0.0 {
            return near;
        }
        near.lerp(self.sample(texels, dir, lower + 1), blend)
    }

    /// Release the device texture.
    pub fn dispose<D: RenderDevice + ?Sized>(self, device: &mut D) {
        device.dispose(self.handle);
    }
}

/// Atlas texels copied to host memory.
#[derive(Clone, Debug, PartialEq)]
pub struct AtlasImage {
    width: u32,
    height: u32,
    encoding: ColorEncoding,
    texels: Vec<Vec4>,
}

impl AtlasImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Stored (encoded) texel values, row-major from the top row.
    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    /// Linear colour of every texel.
    pub fn decoded(&self) -> Vec<Vec4> {
        self.texels.iter().map(|&t| self.encoding.decode(t)).collect()
    }
}

impl TexelFetch for AtlasImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn fetch(&self, x: u32, y: u32) -> Vec4 {
        self.encoding
            .decode(self.texels[(y * self.width + x) as usize])
    }
}
