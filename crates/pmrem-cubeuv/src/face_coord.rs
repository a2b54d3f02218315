//! 2D local coordinates on a cube face.

use glam::Vec3;

use crate::CubeFace;

/// A 2D coordinate on a cube face. `u` and `v` are nominally in \[0, 1\].
///
/// `(u=0, v=0)` is the "bottom-left" corner of the face when viewed from
/// outside the cube looking inward. `(u=1, v=1)` is the "top-right" corner.
/// In the atlas, `v` grows upward while texel rows grow downward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceCoord {
    /// Which cube face this coordinate lies on.
    pub face: CubeFace,
    /// Horizontal parameter.
    pub u: f32,
    /// Vertical parameter.
    pub v: f32,
}

impl FaceCoord {
    /// Construct a `FaceCoord`, clamping `u` and `v` to \[0, 1\].
    #[must_use]
    pub fn new(face: CubeFace, u: f32, v: f32) -> Self {
        Self {
            face,
            u: u.clamp(0.0, 1.0),
            v: v.clamp(0.0, 1.0),
        }
    }

    /// Construct without clamping.
    ///
    /// Quad UVs are padded half a texel past the face edge, so values slightly
    /// outside \[0, 1\] are expected here and extrapolate across the edge.
    #[must_use]
    pub fn unclamped(face: CubeFace, u: f32, v: f32) -> Self {
        Self { face, u, v }
    }

    /// Point on the `[-1, 1]` cube for this coordinate.
    #[inline]
    #[must_use]
    pub fn to_cube_point(&self) -> Vec3 {
        let s = 2.0 * self.u - 1.0;
        let t = 2.0 * self.v - 1.0;
        self.face.normal() + s * self.face.tangent() + t * self.face.bitangent()
    }

    /// Unit direction through this coordinate.
    #[inline]
    #[must_use]
    pub fn to_direction(&self) -> Vec3 {
        self.to_cube_point().normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_coord_clamping() {
        let fc = FaceCoord::new(CubeFace::PosX, -0.5, 1.5);
        assert_eq!(fc.u, 0.0);
        assert_eq!(fc.v, 1.0);
    }

    #[test]
    fn test_unclamped_keeps_padding() {
        let fc = FaceCoord::unclamped(CubeFace::NegZ, -0.01, 1.01);
        assert_eq!(fc.u, -0.01);
        assert_eq!(fc.v, 1.01);
    }

    #[test]
    fn test_face_center_maps_to_normal() {
        for face in CubeFace::ALL {
            let dir = FaceCoord::new(face, 0.5, 0.5).to_direction();
            assert!(
                (dir - face.normal()).length() < 1e-6,
                "Face center of {face:?} did not map to its normal: {dir:?}"
            );
        }
    }

    #[test]
    fn test_corners_are_unit_length() {
        for face in CubeFace::ALL {
            for &(u, v) in &[(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)] {
                let dir = FaceCoord::new(face, u, v).to_direction();
                assert!((dir.length() - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_shared_edge_is_continuous() {
        // +X face's u=0 edge (towards +Z) meets +Z face's u=1 edge.
        for i in 0..=10 {
            let v = i as f32 / 10.0;
            let a = FaceCoord::new(CubeFace::PosX, 0.0, v).to_direction();
            let b = FaceCoord::new(CubeFace::PosZ, 1.0, v).to_direction();
            assert!((a - b).length() < 1e-6, "edge mismatch at v={v}: {a:?} vs {b:?}");
        }
    }
}
