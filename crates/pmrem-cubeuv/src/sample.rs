//! Bilinear lookups into equirectangular images, cube faces and the cube-UV atlas.

use glam::{Vec2, Vec3, Vec4};

use crate::{AtlasRect, CubeUvLayout, direction_to_equirect_uv, direction_to_face_coord};

/// Read access to decoded (linear) texels of a 2D image.
pub trait TexelFetch {
    /// Width and height in texels.
    fn dimensions(&self) -> (u32, u32);

    /// Linear value of texel `(x, y)`. Callers keep coordinates in range.
    fn fetch(&self, x: u32, y: u32) -> Vec4;
}

impl<T: TexelFetch + ?Sized> TexelFetch for &T {
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn fetch(&self, x: u32, y: u32) -> Vec4 {
        (**self).fetch(x, y)
    }
}

/// Sample the cube-UV atlas region of `lod` in direction `dir`.
pub fn sample_cube_uv<T: TexelFetch + ?Sized>(
    tex: &T,
    layout: &CubeUvLayout,
    dir: Vec3,
    lod: u32,
) -> Vec4 {
    let fc = direction_to_face_coord(dir);
    let p = layout.texel_coord(lod, &fc);
    bilinear_in_rect(tex, layout.face_rect(lod, fc.face), p)
}

/// Sample an equirectangular image in direction `dir`.
///
/// Wraps horizontally across the ±X seam and clamps at the poles.
pub fn sample_equirect<T: TexelFetch + ?Sized>(tex: &T, dir: Vec3) -> Vec4 {
    let (width, height) = tex.dimensions();
    let uv = direction_to_equirect_uv(dir);
    let p = Vec2::new(uv.x * width as f32, uv.y * height as f32) - 0.5;

    let x0 = p.x.floor();
    let y0 = p.y.floor();
    let fx = p.x - x0;
    let fy = p.y - y0;

    let wrap = |x: f32| (x as i64).rem_euclid(width as i64) as u32;
    let clamp = |y: f32| (y.max(0.0) as u32).min(height - 1);

    let (xa, xb) = (wrap(x0), wrap(x0 + 1.0));
    let (ya, yb) = (clamp(y0), clamp(y0 + 1.0));

    let top = tex.fetch(xa, ya).lerp(tex.fetch(xb, ya), fx);
    let bottom = tex.fetch(xa, yb).lerp(tex.fetch(xb, yb), fx);
    top.lerp(bottom, fy)
}

/// Sample six separate cube face images (indexed by [`CubeFace`](crate::CubeFace)
/// discriminant) in direction `dir`.
///
/// Each image spans its face edge to edge with row 0 at `v = 1`.
pub fn sample_cube_faces<T: TexelFetch>(faces: &[T], dir: Vec3) -> Vec4 {
    let fc = direction_to_face_coord(dir);
    let Some(tex) = faces.get(fc.face.index() as usize) else {
        return Vec4::ZERO;
    };
    let (width, height) = tex.dimensions();
    let p = Vec2::new(fc.u * width as f32, (1.0 - fc.v) * height as f32);
    bilinear_in_rect(
        tex,
        AtlasRect {
            x: 0,
            y: 0,
            width,
            height,
        },
        p,
    )
}

/// Bilinear filter at continuous coordinate `p` (texel centres at `.5`),
/// clamping every tap to `rect`.
fn bilinear_in_rect<T: TexelFetch + ?Sized>(tex: &T, rect: AtlasRect, p: Vec2) -> Vec4 {
    let p = p - 0.5;
    let x0 = p.x.floor();
    let y0 = p.y.floor();
    let fx = p.x - x0;
    let fy = p.y - y0;

    let clamp_x = |x: f32| (x.max(rect.x as f32) as u32).min(rect.right() - 1);
    let clamp_y = |y: f32| (y.max(rect.y as f32) as u32).min(rect.bottom() - 1);

    let (xa, xb) = (clamp_x(x0), clamp_x(x0 + 1.0));
    let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));

    let top = tex.fetch(xa, ya).lerp(tex.fetch(xb, ya), fx);
    let bottom = tex.fetch(xa, yb).lerp(tex.fetch(xb, yb), fx);
    top.lerp(bottom, fy)
}
