//! The six faces of the environment cube and their basis vectors.

use glam::Vec3;

/// The six faces of the cube the environment is projected onto.
///
/// Each variant corresponds to a face whose outward normal points
/// along the named axis direction. The discriminant is the face index
/// used by the atlas layout and carried in quad vertices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CubeFace {
    /// +X face
    PosX = 0,
    /// −X face
    NegX = 1,
    /// +Y face
    PosY = 2,
    /// −Y face
    NegY = 3,
    /// +Z face
    PosZ = 4,
    /// −Z face
    NegZ = 5,
}

impl CubeFace {
    /// All six faces in canonical order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    /// Face for an index in `0..6`. Out-of-range indices wrap.
    #[must_use]
    pub fn from_index(index: u32) -> CubeFace {
        Self::ALL[(index % 6) as usize]
    }

    /// Face index in `0..6`.
    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Column of this face inside a LOD region (`index mod 3`).
    #[inline]
    #[must_use]
    pub fn atlas_column(self) -> u32 {
        self.index() % 3
    }

    /// Row of this face inside a LOD region (0 for the first three faces, 1 otherwise).
    #[inline]
    #[must_use]
    pub fn atlas_row(self) -> u32 {
        self.index() / 3
    }

    /// Outward-pointing unit normal for this face.
    #[must_use]
    pub fn normal(self) -> Vec3 {
        match self {
            CubeFace::PosX => Vec3::X,
            CubeFace::NegX => Vec3::NEG_X,
            CubeFace::PosY => Vec3::Y,
            CubeFace::NegY => Vec3::NEG_Y,
            CubeFace::PosZ => Vec3::Z,
            CubeFace::NegZ => Vec3::NEG_Z,
        }
    }

    /// Tangent vector: direction of increasing `u` on this face.
    #[must_use]
    pub fn tangent(self) -> Vec3 {
        match self {
            CubeFace::PosX => Vec3::NEG_Z,
            CubeFace::NegX => Vec3::Z,
            CubeFace::PosY => Vec3::X,
            CubeFace::NegY => Vec3::X,
            CubeFace::PosZ => Vec3::X,
            CubeFace::NegZ => Vec3::NEG_X,
        }
    }

    /// Bitangent vector: direction of increasing `v` on this face.
    #[must_use]
    pub fn bitangent(self) -> Vec3 {
        match self {
            CubeFace::PosX => Vec3::Y,
            CubeFace::NegX => Vec3::Y,
            CubeFace::PosY => Vec3::NEG_Z,
            CubeFace::NegY => Vec3::Z,
            CubeFace::PosZ => Vec3::Y,
            CubeFace::NegZ => Vec3::Y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        for face in CubeFace::ALL {
            assert_eq!(CubeFace::from_index(face.index()), face);
        }
    }

    #[test]
    fn test_atlas_grid_cells() {
        let cells: Vec<(u32, u32)> = CubeFace::ALL
            .iter()
            .map(|f| (f.atlas_column(), f.atlas_row()))
            .collect();
        assert_eq!(cells, vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]);
    }

    #[test]
    fn test_tangent_cross_bitangent_equals_normal() {
        for face in CubeFace::ALL {
            let t = face.tangent();
            let b = face.bitangent();
            let n = face.normal();
            let cross = t.cross(b);
            assert!(
                (cross - n).length() < 1e-6,
                "tangent x bitangent != normal for {face:?}: got {cross:?}, expected {n:?}"
            );
        }
    }

    #[test]
    fn test_basis_is_orthogonal() {
        for face in CubeFace::ALL {
            let n = face.normal();
            assert!(face.tangent().dot(n).abs() < 1e-6, "{face:?}");
            assert!(face.bitangent().dot(n).abs() < 1e-6, "{face:?}");
        }
    }
}
