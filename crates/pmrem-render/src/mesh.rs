//! Vertex format for the screen-aligned face quads drawn into atlas regions.

use bytemuck::{Pod, Zeroable};

/// One vertex of a face quad.
///
/// `position` is in clip space of the draw's viewport, `uv` addresses the
/// (padded) face coordinate and `face_index` selects the cube face. The face
/// index is constant across a quad.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub face_index: f32,
}

impl QuadVertex {
    /// Get the vertex buffer layout for this vertex type.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{VertexAttribute, VertexFormat};

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x2,
                },
                VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: VertexFormat::Float32x2,
                },
                VertexAttribute {
                    offset: (std::mem::size_of::<[f32; 2]>() * 2) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: VertexFormat::Float32,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_vertex_layout() {
        let layout = QuadVertex::layout();
        // position (f32×2) + uv (f32×2) + face (f32) = 20 bytes stride
        assert_eq!(layout.array_stride, 20);
        assert_eq!(layout.attributes.len(), 3);
    }

    #[test]
    fn test_quad_vertex_casts_to_bytes() {
        let vertices = [QuadVertex {
            position: [-1.0, 1.0],
            uv: [0.0, 1.0],
            face_index: 4.0,
        }; 6];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 120);
    }
}
