//! Software reference device.
//!
//! Rasterises face quads with pixel-centre coverage and runs the PMREM
//! programs texel by texel. It is the device used by tests and by headless
//! baking on machines without a GPU.

use std::collections::HashMap;

use glam::{Vec2, Vec4};
use pmrem_cubeuv::{AtlasRect, TexelFetch};

use crate::device::{validate_upload, validate_viewport};
use crate::shading::{blur_fragment, cubemap_fragment, equirect_fragment, fragment_direction};
use crate::{
    DeviceError, DrawCommand, Program, QuadVertex, RenderDevice, TextureDescriptor, TextureHandle,
};

/// Barycentric slack so pixel centres on a shared quad diagonal are never dropped.
const COVERAGE_EPSILON: f32 = 1e-5;

struct CpuTexture {
    descriptor: TextureDescriptor,
    texels: Vec<Vec4>,
}

impl CpuTexture {
    fn view(&self, layer: u32) -> CpuTextureView<'_> {
        CpuTextureView {
            texture: self,
            layer,
        }
    }
}

/// Decoded read access to one layer of a [`CpuDevice`] texture.
pub struct CpuTextureView<'a> {
    texture: &'a CpuTexture,
    layer: u32,
}

impl TexelFetch for CpuTextureView<'_> {
    fn dimensions(&self) -> (u32, u32) {
        (self.texture.descriptor.width, self.texture.descriptor.height)
    }

    fn fetch(&self, x: u32, y: u32) -> Vec4 {
        let desc = &self.texture.descriptor;
        let index = ((self.layer * desc.height + y) * desc.width + x) as usize;
        desc.encoding.decode(self.texture.texels[index])
    }
}

/// A rasterised pixel with its interpolated attributes.
#[derive(Clone, Copy, Debug)]
struct Fragment {
    x: u32,
    y: u32,
    uv: Vec2,
    face_index: f32,
}

/// CPU implementation of [`RenderDevice`].
#[derive(Default)]
pub struct CpuDevice {
    textures: HashMap<u32, CpuTexture>,
    next_id: u32,
    draws_submitted: u64,
}

impl CpuDevice {
    /// Create an empty device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded view of one layer of a texture.
    pub fn view(&self, handle: TextureHandle, layer: u32) -> Result<CpuTextureView<'_>, DeviceError> {
        let texture = self.texture(handle)?;
        if layer >= texture.descriptor.layers {
            return Err(DeviceError::InvalidUsage {
                label: texture.descriptor.label.clone(),
                usage: "a view of a missing layer",
            });
        }
        Ok(texture.view(layer))
    }

    /// Number of textures currently allocated.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Number of draws executed since creation.
    pub fn draws_submitted(&self) -> u64 {
        self.draws_submitted
    }

    fn texture(&self, handle: TextureHandle) -> Result<&CpuTexture, DeviceError> {
        self.textures
            .get(&handle.0)
            .ok_or(DeviceError::UnknownTexture(handle))
    }

    fn allocate(&mut self, descriptor: TextureDescriptor, texels: Vec<Vec4>) -> TextureHandle {
        let handle = TextureHandle(self.next_id);
        self.next_id += 1;
        log::debug!(
            "Allocated '{}' ({}x{}x{}, {:?}, {:?}) as {handle:?}",
            descriptor.label,
            descriptor.width,
            descriptor.height,
            descriptor.layers,
            descriptor.format,
            descriptor.encoding
        );
        self.textures.insert(handle.0, CpuTexture { descriptor, texels });
        handle
    }
}

impl RenderDevice for CpuDevice {
    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
        texels: &[Vec4],
    ) -> Result<TextureHandle, DeviceError> {
        validate_upload(descriptor, Some(texels))?;
        let stored = texels
            .iter()
            .map(|&t| descriptor.format.quantize(t))
            .collect();
        Ok(self.allocate(descriptor.clone(), stored))
    }

    fn create_render_target(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, DeviceError> {
        validate_upload(descriptor, None)?;
        let descriptor = TextureDescriptor {
            render_target: true,
            ..descriptor.clone()
        };
        let texels = vec![Vec4::ZERO; descriptor.texel_count()];
        Ok(self.allocate(descriptor, texels))
    }

    fn submit_draw(&mut self, draw: &DrawCommand<'_>) -> Result<(), DeviceError> {
        let target = self.texture(draw.target)?;
        if !target.descriptor.render_target || target.descriptor.layers != 1 {
            return Err(DeviceError::InvalidUsage {
                label: target.descriptor.label.clone(),
                usage: "a render target",
            });
        }
        validate_viewport(&draw.viewport, &target.descriptor)?;
        let target_width = target.descriptor.width;
        let encoding = target.descriptor.encoding;
        let format = target.descriptor.format;

        let source = self.texture(draw.program.source())?;
        let expected_layers = match draw.program {
            Program::CubemapToCubeUv { .. } => 6,
            _ => 1,
        };
        if source.descriptor.layers != expected_layers {
            return Err(DeviceError::InvalidUsage {
                label: source.descriptor.label.clone(),
                usage: if expected_layers == 6 {
                    "a cube source"
                } else {
                    "a 2D source"
                },
            });
        }

        let fragments = rasterize(draw.vertices, &draw.viewport);
        let direction = |f: &Fragment| fragment_direction(f.face_index, f.uv.x, f.uv.y);
        let shaded: Vec<(usize, Vec4)> = match &draw.program {
            Program::EquirectToCubeUv { .. } => {
                let view = source.view(0);
                fragments
                    .iter()
                    .map(|f| (f, equirect_fragment(&view, direction(f))))
                    .map(|(f, c)| (texel_index(f, target_width), c))
                    .collect()
            }
            Program::CubemapToCubeUv { .. } => {
                let faces: Vec<CpuTextureView<'_>> = (0..6).map(|l| source.view(l)).collect();
                fragments
                    .iter()
                    .map(|f| (texel_index(f, target_width), cubemap_fragment(&faces, direction(f))))
                    .collect()
            }
            Program::Blur { uniforms, .. } => {
                let view = source.view(0);
                fragments
                    .iter()
                    .map(|f| {
                        let colour = blur_fragment(&view, uniforms, direction(f));
                        (texel_index(f, target_width), colour)
                    })
                    .collect()
            }
        };

        let target = self
            .textures
            .get_mut(&draw.target.0)
            .ok_or(DeviceError::UnknownTexture(draw.target))?;
        for (index, linear) in &shaded {
            target.texels[*index] = format.quantize(encoding.encode(*linear));
        }

        self.draws_submitted += 1;
        log::trace!(
            "Draw '{}' shaded {} fragments in {:?}",
            draw.label,
            shaded.len(),
            draw.viewport
        );
        Ok(())
    }

    fn descriptor(&self, handle: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&handle.0).map(|t| &t.descriptor)
    }

    fn read_texels(&mut self, handle: TextureHandle) -> Result<Vec<Vec4>, DeviceError> {
        Ok(self.texture(handle)?.texels.clone())
    }

    fn dispose(&mut self, handle: TextureHandle) {
        if let Some(texture) = self.textures.remove(&handle.0) {
            log::debug!("Disposed '{}' ({handle:?})", texture.descriptor.label);
        }
    }
}

fn texel_index(fragment: &Fragment, width: u32) -> usize {
    (fragment.y * width + fragment.x) as usize
}

/// Clip space of the viewport → target pixel space, `y` downward.
fn to_pixel(position: [f32; 2], viewport: &AtlasRect) -> Vec2 {
    Vec2::new(
        viewport.x as f32 + (position[0] + 1.0) * 0.5 * viewport.width as f32,
        viewport.y as f32 + (1.0 - position[1]) * 0.5 * viewport.height as f32,
    )
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Pixel-centre coverage of a triangle list, clipped to the viewport.
fn rasterize(vertices: &[QuadVertex], viewport: &AtlasRect) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let clip_min = Vec2::new(viewport.x as f32, viewport.y as f32);
    let clip_max = Vec2::new(viewport.right() as f32, viewport.bottom() as f32);

    for triangle in vertices.chunks_exact(3) {
        let p: [Vec2; 3] = std::array::from_fn(|i| to_pixel(triangle[i].position, viewport));
        let area = edge(p[0], p[1], p[2]);
        if area.abs() <= f32::EPSILON {
            continue;
        }

        let min = p[0].min(p[1]).min(p[2]).max(clip_min);
        let max = p[0].max(p[1]).max(p[2]).min(clip_max);
        let (x0, x1) = (min.x.floor() as u32, max.x.ceil() as u32);
        let (y0, y1) = (min.y.floor() as u32, max.y.ceil() as u32);

        for y in y0..y1 {
            for x in x0..x1 {
                let centre = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w = [
                    edge(p[1], p[2], centre) / area,
                    edge(p[2], p[0], centre) / area,
                    edge(p[0], p[1], centre) / area,
                ];
                if w.iter().any(|&wi| wi < -COVERAGE_EPSILON) {
                    continue;
                }
                let uv = Vec2::from(triangle[0].uv) * w[0]
                    + Vec2::from(triangle[1].uv) * w[1]
                    + Vec2::from(triangle[2].uv) * w[2];
                fragments.push(Fragment {
                    x,
                    y,
                    uv,
                    face_index: triangle[0].face_index,
                });
            }
        }
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColorEncoding, TexelFormat};
    use glam::Vec3;

    /// Two triangles covering the whole viewport with UVs (0,0)..(1,1).
    fn full_quad(face: f32) -> Vec<QuadVertex> {
        let v = |x: f32, y: f32, u: f32, w: f32| QuadVertex {
            position: [x, y],
            uv: [u, w],
            face_index: face,
        };
        vec![
            v(-1.0, -1.0, 0.0, 0.0),
            v(1.0, -1.0, 1.0, 0.0),
            v(1.0, 1.0, 1.0, 1.0),
            v(-1.0, -1.0, 0.0, 0.0),
            v(1.0, 1.0, 1.0, 1.0),
            v(-1.0, 1.0, 0.0, 1.0),
        ]
    }

    fn solid_equirect(device: &mut CpuDevice, colour: Vec4) -> TextureHandle {
        let desc = TextureDescriptor::equirect("solid", 8, 4).with_format(TexelFormat::Rgba32Float);
        device.create_texture(&desc, &vec![colour; 32]).unwrap()
    }

    fn target(device: &mut CpuDevice, size: u32) -> TextureHandle {
        let desc = TextureDescriptor::equirect("target", size, size).with_format(TexelFormat::Rgba32Float);
        device.create_render_target(&desc).unwrap()
    }

    #[test]
    fn test_quad_covers_viewport_exactly() {
        let fragments = rasterize(
            &full_quad(0.0),
            &AtlasRect {
                x: 2,
                y: 3,
                width: 4,
                height: 5,
            },
        );
        let mut covered: Vec<(u32, u32)> = fragments.iter().map(|f| (f.x, f.y)).collect();
        covered.sort_unstable();
        covered.dedup();
        assert_eq!(covered.len(), 20);
        assert!(covered.iter().all(|&(x, y)| (2..6).contains(&x) && (3..8).contains(&y)));
    }

    #[test]
    fn test_uv_interpolates_top_row_to_high_v() {
        let fragments = rasterize(
            &full_quad(0.0),
            &AtlasRect {
                x: 0,
                y: 0,
                width: 2,
                height: 2,
            },
        );
        let top_left = fragments.iter().find(|f| f.x == 0 && f.y == 0).unwrap();
        assert!((top_left.uv - Vec2::new(0.25, 0.75)).length() < 1e-5);
    }

    #[test]
    fn test_draw_writes_only_inside_viewport() {
        let mut device = CpuDevice::new();
        let colour = Vec4::new(0.1, 0.2, 0.3, 1.0);
        let source = solid_equirect(&mut device, colour);
        let target = target(&mut device, 8);
        let viewport = AtlasRect {
            x: 4,
            y: 0,
            width: 4,
            height: 4,
        };
        device
            .submit_draw(&DrawCommand {
                label: "test",
                target,
                viewport,
                vertices: &full_quad(4.0),
                program: Program::EquirectToCubeUv { source },
            })
            .unwrap();

        let texels = device.read_texels(target).unwrap();
        for y in 0..8 {
            for x in 0..8 {
                let texel = texels[(y * 8 + x) as usize];
                if viewport.contains(x, y) {
                    assert!((texel - colour).abs().max_element() < 1e-6);
                } else {
                    assert_eq!(texel, Vec4::ZERO);
                }
            }
        }
        assert_eq!(device.draws_submitted(), 1);
    }

    #[test]
    fn test_target_encoding_applied_on_write() {
        let mut device = CpuDevice::new();
        let source = solid_equirect(&mut device, Vec4::new(4.0, 2.0, 1.0, 1.0));
        let desc = TextureDescriptor::equirect("rgbe", 2, 2)
            .with_format(TexelFormat::Rgba8Unorm)
            .with_encoding(ColorEncoding::Rgbe);
        let target = device.create_render_target(&desc).unwrap();
        device
            .submit_draw(&DrawCommand {
                label: "rgbe",
                target,
                viewport: AtlasRect {
                    x: 0,
                    y: 0,
                    width: 2,
                    height: 2,
                },
                vertices: &full_quad(0.0),
                program: Program::EquirectToCubeUv { source },
            })
            .unwrap();
        let decoded = device.view(target, 0).unwrap().fetch(1, 1);
        assert!((decoded.truncate() - Vec3::new(4.0, 2.0, 1.0)).abs().max_element() < 0.05);
    }

    #[test]
    fn test_viewport_out_of_bounds_is_rejected() {
        let mut device = CpuDevice::new();
        let source = solid_equirect(&mut device, Vec4::ONE);
        let target = target(&mut device, 4);
        let result = device.submit_draw(&DrawCommand {
            label: "oob",
            target,
            viewport: AtlasRect {
                x: 2,
                y: 0,
                width: 4,
                height: 4,
            },
            vertices: &full_quad(0.0),
            program: Program::EquirectToCubeUv { source },
        });
        assert!(matches!(result, Err(DeviceError::ViewportOutOfBounds { .. })));
    }

    #[test]
    fn test_drawing_into_source_texture_is_rejected() {
        let mut device = CpuDevice::new();
        let source = solid_equirect(&mut device, Vec4::ONE);
        let result = device.submit_draw(&DrawCommand {
            label: "bad",
            target: source,
            viewport: AtlasRect {
                x: 0,
                y: 0,
                width: 2,
                height: 2,
            },
            vertices: &full_quad(0.0),
            program: Program::EquirectToCubeUv { source },
        });
        assert!(matches!(result, Err(DeviceError::InvalidUsage { .. })));
    }

    #[test]
    fn test_zero_dimensions_returns_error() {
        let mut device = CpuDevice::new();
        let desc = TextureDescriptor::equirect("zero", 0, 0);
        let result = device.create_texture(&desc, &[]);
        assert!(matches!(result, Err(DeviceError::ZeroDimensions { .. })));
    }

    #[test]
    fn test_data_size_mismatch_returns_error() {
        let mut device = CpuDevice::new();
        let desc = TextureDescriptor::equirect("short", 4, 4);
        let result = device.create_texture(&desc, &[Vec4::ONE; 3]);
        assert!(matches!(result, Err(DeviceError::DataSizeMismatch { .. })));
    }

    #[test]
    fn test_dispose_releases_texture() {
        let mut device = CpuDevice::new();
        let handle = target(&mut device, 2);
        assert_eq!(device.live_textures(), 1);
        device.dispose(handle);
        assert_eq!(device.live_textures(), 0);
        assert!(device.descriptor(handle).is_none());
        assert!(matches!(
            device.read_texels(handle),
            Err(DeviceError::UnknownTexture(_))
        ));
    }
}
