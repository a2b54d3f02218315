//! Equirectangular (latitude/longitude) mapping.
//!
//! `u` wraps around the vertical axis starting at −X; `v = 0` is the top row
//! (the +Y pole) and `v = 1` the bottom row.

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

/// Spherical UV of a direction. The direction does not need to be unit length.
#[inline]
#[must_use]
pub fn direction_to_equirect_uv(dir: Vec3) -> Vec2 {
    let dir = dir.try_normalize().unwrap_or(Vec3::Y);
    let u = dir.z.atan2(dir.x) / TAU + 0.5;
    let v = 0.5 - dir.y.clamp(-1.0, 1.0).asin() / PI;
    Vec2::new(u, v)
}

/// Unit direction for a spherical UV.
#[inline]
#[must_use]
pub fn equirect_uv_to_direction(uv: Vec2) -> Vec3 {
    let phi = (uv.x - 0.5) * TAU;
    let lat = (0.5 - uv.y) * PI;
    Vec3::new(lat.cos() * phi.cos(), lat.sin(), lat.cos() * phi.sin())
}
