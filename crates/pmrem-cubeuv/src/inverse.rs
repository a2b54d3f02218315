//! Direction-to-cube inverse projection: recover face and UV from a direction.

use glam::Vec3;

use crate::{CubeFace, FaceCoord};

/// Determine which cube face a direction vector belongs to.
///
/// The face is determined by the axis with the largest absolute component.
/// Ties are broken by a fixed priority: X > Y > Z, positive > negative.
/// A zero vector maps to [`CubeFace::PosX`].
#[must_use]
pub fn direction_to_face(dir: Vec3) -> CubeFace {
    let ax = dir.x.abs();
    let ay = dir.y.abs();
    let az = dir.z.abs();

    if ax >= ay && ax >= az {
        if dir.x >= 0.0 {
            CubeFace::PosX
        } else {
            CubeFace::NegX
        }
    } else if ay >= az {
        if dir.y >= 0.0 {
            CubeFace::PosY
        } else {
            CubeFace::NegY
        }
    } else if dir.z >= 0.0 {
        CubeFace::PosZ
    } else {
        CubeFace::NegZ
    }
}

/// Convert a direction vector to a [`FaceCoord`] by central projection.
///
/// This is the exact inverse of [`FaceCoord::to_direction`]. The direction does
/// not need to be unit length.
#[must_use]
pub fn direction_to_face_coord(dir: Vec3) -> FaceCoord {
    let face = direction_to_face(dir);

    let d = dir.dot(face.normal());
    if d.abs() < 1e-30 {
        return FaceCoord::new(face, 0.5, 0.5);
    }
    let projected = dir / d;

    let s = projected.dot(face.tangent());
    let t = projected.dot(face.bitangent());

    FaceCoord::new(face, (s + 1.0) * 0.5, (t + 1.0) * 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_directions_pick_their_face() {
        for face in CubeFace::ALL {
            assert_eq!(direction_to_face(face.normal()), face);
        }
    }

    #[test]
    fn test_zero_vector_maps_to_pos_x() {
        assert_eq!(direction_to_face(Vec3::ZERO), CubeFace::PosX);
    }

    #[test]
    fn test_roundtrip_through_face_coord() {
        for face in CubeFace::ALL {
            for i in 0..=8 {
                for j in 0..=8 {
                    let fc = FaceCoord::new(face, 0.05 + i as f32 * 0.1125, 0.05 + j as f32 * 0.1125);
                    let back = direction_to_face_coord(fc.to_direction());
                    assert_eq!(back.face, face);
                    assert!((back.u - fc.u).abs() < 1e-5, "{face:?} u {} vs {}", back.u, fc.u);
                    assert!((back.v - fc.v).abs() < 1e-5, "{face:?} v {} vs {}", back.v, fc.v);
                }
            }
        }
    }

    #[test]
    fn test_non_unit_direction_is_accepted() {
        let fc = direction_to_face_coord(Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(fc.face, CubeFace::PosZ);
        assert!((fc.u - 0.5).abs() < 1e-6);
        assert!((fc.v - 0.5).abs() < 1e-6);
    }
}
