//! Packed cube-UV atlas layout.
//!
//! Every LOD occupies a `3s × 2s` region of a `3·SIZE_MAX` square atlas, where
//! `s` is the LOD's face size. Inside a region the six faces sit on a 3×2 grid
//! in [`CubeFace`] index order: +X −X +Y on the first row, −Y +Z −Z on the
//! second. This matches the layer order of cube textures. Atlases that put
//! the positive faces on the first row (+X +Y +Z / −X −Y −Z) are laid out
//! differently and are not readable through this layout. Region origins are
//! pure arithmetic on the LOD index, so consumers can reproduce them without
//! any lookup table:
//!
//! ```text
//! x = 3 · max(0, SIZE_MAX − 2s)
//! y = (lod == 0 ? 0 : 2·SIZE_MAX) + 2s · (lod > LOD_MAX − LOD_MIN ? lod − (LOD_MAX − LOD_MIN) : 0)
//! ```

use glam::{Vec2, Vec3};

use crate::{CubeFace, FaceCoord};

/// Exponent of the smallest face size.
pub const LOD_MIN: u32 = 4;

/// Exponent of the largest face size (`SIZE_MAX = 2^LOD_MAX`).
pub const LOD_MAX: u32 = 8;

/// Axis-aligned texel rectangle inside the atlas. `y` grows downward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AtlasRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AtlasRect {
    /// One past the right-most column.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the bottom-most row.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Whether texel `(x, y)` lies inside the rectangle.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Whether the two rectangles share at least one texel.
    pub fn overlaps(&self, other: &AtlasRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Region arithmetic for a cube-UV atlas with a given LOD range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CubeUvLayout {
    lod_max: u32,
    lod_min: u32,
    lod_count: u32,
}

impl Default for CubeUvLayout {
    fn default() -> Self {
        Self::new(LOD_MAX, LOD_MIN, 3)
    }
}

impl CubeUvLayout {
    /// Layout for faces from `2^lod_max` down to `2^lod_min`, followed by
    /// `extra_lods` levels held at `2^lod_min`.
    ///
    /// Region fit is not checked here; callers validate their LOD range before
    /// building a layout (see `LodSettings` in the `pmrem` crate).
    #[must_use]
    pub const fn new(lod_max: u32, lod_min: u32, extra_lods: u32) -> Self {
        Self {
            lod_max,
            lod_min,
            lod_count: lod_max - lod_min + 1 + extra_lods,
        }
    }

    pub fn lod_max(&self) -> u32 {
        self.lod_max
    }

    pub fn lod_min(&self) -> u32 {
        self.lod_min
    }

    /// Total number of LODs, halving and extra levels included.
    pub fn lod_count(&self) -> u32 {
        self.lod_count
    }

    /// Index of the last halving LOD; higher indices are extra levels.
    pub fn last_halving_lod(&self) -> u32 {
        self.lod_max - self.lod_min
    }

    /// Face size of LOD 0.
    pub fn size_max(&self) -> u32 {
        1 << self.lod_max
    }

    /// Side length of the square atlas texture.
    pub fn atlas_size(&self) -> u32 {
        3 * self.size_max()
    }

    /// Face size of `lod`.
    pub fn lod_size(&self, lod: u32) -> u32 {
        let exponent = self.lod_max.saturating_sub(lod).max(self.lod_min);
        1 << exponent
    }

    /// Region holding all six faces of `lod`.
    pub fn region(&self, lod: u32) -> AtlasRect {
        let size = self.lod_size(lod);
        let size_max = self.size_max();

        let x = 3 * size_max.saturating_sub(2 * size);
        let base_y = if lod == 0 { 0 } else { 2 * size_max };
        let extra_index = lod.saturating_sub(self.last_halving_lod());
        let y = base_y + 2 * size * extra_index;

        AtlasRect {
            x,
            y,
            width: 3 * size,
            height: 2 * size,
        }
    }

    /// Rectangle of a single face of `lod`.
    pub fn face_rect(&self, lod: u32, face: CubeFace) -> AtlasRect {
        let region = self.region(lod);
        let size = self.lod_size(lod);
        AtlasRect {
            x: region.x + face.atlas_column() * size,
            y: region.y + face.atlas_row() * size,
            width: size,
            height: size,
        }
    }

    /// Continuous atlas texel coordinate (texel centres at `.5`) of a face coordinate.
    ///
    /// Face edges map onto the centres of the border texels, so a bilinear
    /// lookup at any `u, v` in \[0, 1\] never reads outside the face.
    pub fn texel_coord(&self, lod: u32, fc: &FaceCoord) -> Vec2 {
        let rect = self.face_rect(lod, fc.face);
        let span = (self.lod_size(lod) - 1) as f32;
        Vec2::new(
            rect.x as f32 + 0.5 + fc.u * span,
            rect.y as f32 + 0.5 + (1.0 - fc.v) * span,
        )
    }

    /// Face coordinate of the texel at `(column, row)` within a face of `lod`.
    pub fn texel_face_coord(&self, lod: u32, face: CubeFace, column: u32, row: u32) -> FaceCoord {
        let span = (self.lod_size(lod) - 1) as f32;
        FaceCoord::unclamped(face, column as f32 / span, 1.0 - row as f32 / span)
    }

    /// Direction sampled by the texel at `(column, row)` within a face of `lod`.
    pub fn texel_direction(&self, lod: u32, face: CubeFace, column: u32, row: u32) -> Vec3 {
        self.texel_face_coord(lod, face, column, row).to_direction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction_to_face_coord;

    #[test]
    fn test_default_dimensions() {
        let layout = CubeUvLayout::default();
        assert_eq!(layout.size_max(), 256);
        assert_eq!(layout.atlas_size(), 768);
        assert_eq!(layout.lod_count(), 8);
        assert_eq!(layout.last_halving_lod(), 4);
    }

    #[test]
    fn test_lod_sizes_halve_then_hold() {
        let layout = CubeUvLayout::default();
        let sizes: Vec<u32> = (0..layout.lod_count()).map(|l| layout.lod_size(l)).collect();
        assert_eq!(sizes, vec![256, 128, 64, 32, 16, 16, 16, 16]);
    }

    #[test]
    fn test_region_offsets_match_formula() {
        let layout = CubeUvLayout::default();
        // LOD 0 fills the first two face rows.
        assert_eq!(
            layout.region(0),
            AtlasRect { x: 0, y: 0, width: 768, height: 512 }
        );
        // LOD 2: size 64, x = 3 * (256 - 128).
        assert_eq!(
            layout.region(2),
            AtlasRect { x: 384, y: 512, width: 192, height: 128 }
        );
        // LOD 4 is the last halving level.
        assert_eq!(
            layout.region(4),
            AtlasRect { x: 672, y: 512, width: 48, height: 32 }
        );
        // LOD 5 is the first extra level: y = 2 * 256 + 2 * 16 * 1.
        assert_eq!(
            layout.region(5),
            AtlasRect { x: 672, y: 544, width: 48, height: 32 }
        );
        assert_eq!(
            layout.region(7),
            AtlasRect { x: 672, y: 608, width: 48, height: 32 }
        );
    }

    #[test]
    fn test_regions_fit_and_do_not_overlap() {
        let layout = CubeUvLayout::default();
        let regions: Vec<AtlasRect> = (0..layout.lod_count()).map(|l| layout.region(l)).collect();
        for (i, a) in regions.iter().enumerate() {
            assert!(a.right() <= layout.atlas_size() && a.bottom() <= layout.atlas_size());
            for b in &regions[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn test_face_rects_tile_the_region() {
        let layout = CubeUvLayout::default();
        let region = layout.region(3);
        let covered: u32 = CubeFace::ALL
            .iter()
            .map(|&f| {
                let r = layout.face_rect(3, f);
                assert!(region.contains(r.x, r.y) && region.contains(r.right() - 1, r.bottom() - 1));
                r.width * r.height
            })
            .sum();
        assert_eq!(covered, region.width * region.height);
    }

    #[test]
    fn test_face_cells_follow_cube_layer_order() {
        let layout = CubeUvLayout::default();
        let expected = [
            [Vec3::X, Vec3::NEG_X, Vec3::Y],
            [Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z],
        ];
        let half = layout.lod_size(0) / 2;
        for (row, normals) in expected.iter().enumerate() {
            for (column, &normal) in normals.iter().enumerate() {
                let face = CubeFace::from_index(row as u32 * 3 + column as u32);
                let rect = layout.face_rect(0, face);
                assert_eq!((rect.x, rect.y), (column as u32 * 256, row as u32 * 256));
                let dir = layout.texel_direction(0, face, half, half);
                assert!(dir.normalize().dot(normal) > 0.99, "cell {column},{row}: {dir:?}");
            }
        }
    }

    #[test]
    fn test_texel_direction_maps_back_to_texel_centre() {
        let layout = CubeUvLayout::new(5, 2, 1);
        for face in CubeFace::ALL {
            let rect = layout.face_rect(1, face);
            // Border texels sit on cube edges and may resolve to the neighbouring face.
            for row in 1..rect.height - 1 {
                for column in 1..rect.width - 1 {
                    let dir = layout.texel_direction(1, face, column, row);
                    let coord = layout.texel_coord(1, &direction_to_face_coord(dir));
                    let expected = Vec2::new(
                        (rect.x + column) as f32 + 0.5,
                        (rect.y + row) as f32 + 0.5,
                    );
                    assert!((coord - expected).length() < 1e-3, "{face:?} {column},{row}");
                }
            }
        }
    }
}
