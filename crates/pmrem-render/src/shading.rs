//! Fragment semantics of the PMREM programs, shared by the software device
//! and mirrored by the WGSL module in [`crate::gpu`].

use glam::{Quat, Vec3, Vec4};
use pmrem_cubeuv::{CubeFace, FaceCoord, TexelFetch, sample_cube_faces, sample_cube_uv, sample_equirect};

use crate::{BlurAxis, BlurUniforms, MAX_SAMPLES};

/// Below this distance from the up axis a direction counts as polar.
const POLE_EPSILON: f32 = 1e-4;

/// Direction a fragment stands for, from its interpolated UV and face.
pub fn fragment_direction(face_index: f32, u: f32, v: f32) -> Vec3 {
    let face = CubeFace::from_index(face_index.round().max(0.0) as u32);
    FaceCoord::unclamped(face, u, v).to_direction()
}

/// Equirectangular source → linear colour in `dir`.
pub fn equirect_fragment<T: TexelFetch + ?Sized>(source: &T, dir: Vec3) -> Vec4 {
    sample_equirect(source, dir).truncate().extend(1.0)
}

/// Six face images → linear colour in `dir`.
pub fn cubemap_fragment<T: TexelFetch>(faces: &[T], dir: Vec3) -> Vec4 {
    sample_cube_faces(faces, dir).truncate().extend(1.0)
}

/// Weighted sum of rotated cube-UV samples around `dir`. The centre tap is
/// taken once, every other tap on both sides.
pub fn blur_fragment<T: TexelFetch + ?Sized>(source: &T, uniforms: &BlurUniforms, dir: Vec3) -> Vec4 {
    let taps = (uniforms.samples as usize).clamp(1, MAX_SAMPLES);
    let sample = |theta: f32| {
        let rotated = rotate_for_blur(dir, uniforms.axis, theta);
        sample_cube_uv(source, &uniforms.layout, rotated, uniforms.source_lod).truncate()
    };

    let mut colour = uniforms.weights[0] * sample(0.0);
    for i in 1..taps {
        let theta = uniforms.d_theta * i as f32;
        colour += uniforms.weights[i] * (sample(-theta) + sample(theta));
    }
    colour.extend(1.0)
}

/// Rotate `dir` by a geodesic step of `theta` radians along `axis`.
pub fn rotate_for_blur(dir: Vec3, axis: BlurAxis, theta: f32) -> Vec3 {
    if theta == 0.0 {
        return dir;
    }
    match axis {
        BlurAxis::Longitudinal => {
            let pivot = Vec3::Y.cross(dir).try_normalize().unwrap_or(Vec3::X);
            Quat::from_axis_angle(pivot, theta) * dir
        }
        BlurAxis::Latitudinal => {
            let xz = Vec3::new(dir.x, 0.0, dir.z).length().max(POLE_EPSILON);
            Quat::from_rotation_y(theta / xz) * dir
        }
    }
}
