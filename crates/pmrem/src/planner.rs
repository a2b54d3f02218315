//! LOD planning: per-level resolution, roughness, blur sigma and the face
//! quads that address each level's region of the cube-UV atlas.

use std::f32::consts::PI;

use pmrem_cubeuv::{AtlasRect, CubeFace, CubeUvLayout, LOD_MAX, LOD_MIN};
use pmrem_render::QuadVertex;

/// Roughness of the fixed high-roughness levels appended after the halving chain.
pub const EXTRA_LOD_ROUGHNESS: [f32; 3] = [0.5, 0.7, 1.0];

/// Face size of LOD 0 with the default settings.
pub const SIZE_MAX: u32 = 1 << LOD_MAX;

/// Number of levels with the default settings.
pub const TOTAL_LODS: u32 = LOD_MAX - LOD_MIN + 1 + EXTRA_LOD_ROUGHNESS.len() as u32;

/// Largest accepted `lod_max`; keeps the atlas under 12288 texels a side.
pub const LOD_MAX_LIMIT: u32 = 12;

/// Rejected [`LodSettings`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("lod_min must be at least 1, got {0}")]
    LodMinTooSmall(u32),

    #[error("lod_min ({lod_min}) exceeds lod_max ({lod_max})")]
    InvertedRange { lod_min: u32, lod_max: u32 },

    #[error("lod_max {0} exceeds the limit of {LOD_MAX_LIMIT}")]
    LodMaxTooLarge(u32),

    #[error("extra roughness {value} at index {index} is outside (0, 1]")]
    RoughnessOutOfRange { index: usize, value: f32 },

    #[error("extra roughness must ascend, {value} follows {previous}")]
    RoughnessNotAscending { previous: f32, value: f32 },

    #[error(
        "extra roughness {roughness} (sigma {sigma}) must exceed the last halving level \
         (roughness {min_roughness}, sigma {min_sigma})"
    )]
    ExtraBelowHalving {
        roughness: f32,
        sigma: f32,
        min_roughness: f32,
        min_sigma: f32,
    },

    #[error("LOD {lod} region {region:?} leaves the {atlas}x{atlas} atlas")]
    RegionOutsideAtlas { lod: u32, region: AtlasRect, atlas: u32 },

    #[error("regions of LOD {first} and LOD {second} overlap")]
    RegionOverlap { first: u32, second: u32 },
}

/// Inputs of a [`LodPlan`], validated on construction.
#[derive(Clone, Debug, PartialEq)]
pub struct LodSettings {
    lod_max: u32,
    lod_min: u32,
    extra_roughness: Vec<f32>,
}

impl Default for LodSettings {
    fn default() -> Self {
        Self {
            lod_max: LOD_MAX,
            lod_min: LOD_MIN,
            extra_roughness: EXTRA_LOD_ROUGHNESS.to_vec(),
        }
    }
}

impl LodSettings {
    /// Validate a level configuration.
    ///
    /// Fails unless `1 <= lod_min <= lod_max <= LOD_MAX_LIMIT`, the extra
    /// roughness list ascends strictly inside `(0, 1]` starting above the
    /// roughness and sigma of the `2^lod_min` level, and every LOD region
    /// fits the atlas without overlapping another.
    pub fn new(lod_max: u32, lod_min: u32, extra_roughness: &[f32]) -> Result<Self, PlanError> {
        if lod_min < 1 {
            return Err(PlanError::LodMinTooSmall(lod_min));
        }
        if lod_min > lod_max {
            return Err(PlanError::InvertedRange { lod_min, lod_max });
        }
        if lod_max > LOD_MAX_LIMIT {
            return Err(PlanError::LodMaxTooLarge(lod_max));
        }
        for (index, &value) in extra_roughness.iter().enumerate() {
            if !(value > 0.0 && value <= 1.0) {
                return Err(PlanError::RoughnessOutOfRange { index, value });
            }
            if index > 0 && value <= extra_roughness[index - 1] {
                return Err(PlanError::RoughnessNotAscending {
                    previous: extra_roughness[index - 1],
                    value,
                });
            }
        }
        if let Some(&roughness) = extra_roughness.first() {
            let last_size = (1u32 << lod_min) as f32;
            let (min_roughness, min_sigma) = (halving_roughness(last_size), 1.0 / last_size);
            let sigma = extra_sigma(roughness);
            if roughness <= min_roughness || sigma < min_sigma {
                return Err(PlanError::ExtraBelowHalving {
                    roughness,
                    sigma,
                    min_roughness,
                    min_sigma,
                });
            }
        }

        let layout = CubeUvLayout::new(lod_max, lod_min, extra_roughness.len() as u32);
        let atlas = layout.atlas_size();
        let regions: Vec<AtlasRect> = (0..layout.lod_count()).map(|l| layout.region(l)).collect();
        for (lod, region) in regions.iter().enumerate() {
            if region.right() > atlas || region.bottom() > atlas {
                return Err(PlanError::RegionOutsideAtlas {
                    lod: lod as u32,
                    region: *region,
                    atlas,
                });
            }
            if let Some(other) = regions[..lod].iter().position(|r| r.overlaps(region)) {
                return Err(PlanError::RegionOverlap {
                    first: other as u32,
                    second: lod as u32,
                });
            }
        }

        Ok(Self {
            lod_max,
            lod_min,
            extra_roughness: extra_roughness.to_vec(),
        })
    }

    pub fn lod_max(&self) -> u32 {
        self.lod_max
    }

    pub fn lod_min(&self) -> u32 {
        self.lod_min
    }

    pub fn extra_roughness(&self) -> &[f32] {
        &self.extra_roughness
    }
}

/// One planned level.
#[derive(Clone, Debug, PartialEq)]
pub struct LodLevel {
    /// Face edge length in texels.
    pub size: u32,
    /// Roughness this level represents.
    pub roughness: f32,
    /// Total angular blur of the level in radians.
    pub sigma: f32,
    /// Six face quads as a triangle list, in the clip space of the level's region.
    pub mesh: Vec<QuadVertex>,
}

/// Read-only per-level parameters shared by every generation.
#[derive(Clone, Debug, PartialEq)]
pub struct LodPlan {
    layout: CubeUvLayout,
    levels: Vec<LodLevel>,
}

impl Default for LodPlan {
    fn default() -> Self {
        Self::new(&LodSettings::default())
    }
}

impl LodPlan {
    /// Plan every level of `settings`.
    pub fn new(settings: &LodSettings) -> Self {
        let layout = CubeUvLayout::new(
            settings.lod_max,
            settings.lod_min,
            settings.extra_roughness.len() as u32,
        );
        let last_halving = layout.last_halving_lod();

        let levels = (0..layout.lod_count())
            .map(|lod| {
                let size = layout.lod_size(lod);
                let (roughness, sigma) = if lod <= last_halving {
                    let s = size as f32;
                    (halving_roughness(s), 1.0 / s)
                } else {
                    let r = settings.extra_roughness[(lod - last_halving - 1) as usize];
                    (r, extra_sigma(r))
                };
                LodLevel {
                    size,
                    roughness,
                    sigma,
                    mesh: face_quads(size),
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Planned {} LODs: sizes {:?}",
            levels.len(),
            levels.iter().map(|l| l.size).collect::<Vec<_>>()
        );
        Self { layout, levels }
    }

    pub fn layout(&self) -> &CubeUvLayout {
        &self.layout
    }

    pub fn lod_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Level `lod`.
    ///
    /// # Panics
    ///
    /// Panics if `lod >= lod_count()`.
    pub fn level(&self, lod: u32) -> &LodLevel {
        &self.levels[lod as usize]
    }

    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    pub fn sizes(&self) -> Vec<u32> {
        self.levels.iter().map(|l| l.size).collect()
    }

    pub fn sigmas(&self) -> Vec<f32> {
        self.levels.iter().map(|l| l.sigma).collect()
    }

    pub fn roughness(&self) -> Vec<f32> {
        self.levels.iter().map(|l| l.roughness).collect()
    }

    /// Fractional LOD whose roughness matches `roughness`, interpolating
    /// linearly between neighbouring levels and clamping to the plan's range.
    pub fn lod_for_roughness(&self, roughness: f32) -> f32 {
        let last = self.levels.len() - 1;
        if roughness.is_nan() || roughness <= self.levels[0].roughness {
            return 0.0;
        }
        for (i, pair) in self.levels.windows(2).enumerate() {
            let (lo, hi) = (pair[0].roughness, pair[1].roughness);
            if roughness <= hi {
                return i as f32 + (roughness - lo) / (hi - lo);
            }
        }
        last as f32
    }
}

/// Roughness whose lobe matches one texel of a face `size` texels wide.
fn halving_roughness(size: f32) -> f32 {
    (1.0 + (1.0 + 4.0 * PI * size).sqrt()) / (2.0 * PI * size)
}

/// Angular sigma of a fixed-roughness level.
fn extra_sigma(roughness: f32) -> f32 {
    PI * roughness * roughness / (1.0 + roughness)
}

/// Six face quads on the 3×2 face grid, UVs padded by half a texel so the
/// border texel centres land exactly on the cube edges.
fn face_quads(size: u32) -> Vec<QuadVertex> {
    let half_texel = 0.5 / (size.max(2) - 1) as f32;
    let (uv_min, uv_max) = (-half_texel, 1.0 + half_texel);
    let cell_width = 2.0 / 3.0;

    let mut vertices = Vec::with_capacity(36);
    for face in CubeFace::ALL {
        let left = face.atlas_column() as f32 * cell_width - 1.0;
        let right = left + cell_width;
        let top = 1.0 - face.atlas_row() as f32;
        let bottom = top - 1.0;
        let face_index = face.index() as f32;
        let vertex = |x: f32, y: f32, u: f32, v: f32| QuadVertex {
            position: [x, y],
            uv: [u, v],
            face_index,
        };

        let bottom_left = vertex(left, bottom, uv_min, uv_min);
        let bottom_right = vertex(right, bottom, uv_max, uv_min);
        let top_right = vertex(right, top, uv_max, uv_max);
        let top_left = vertex(left, top, uv_min, uv_max);
        vertices.extend([bottom_left, bottom_right, top_right, bottom_left, top_right, top_left]);
    }
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sizes_halve_then_hold() {
        let plan = LodPlan::default();
        assert_eq!(plan.lod_count(), TOTAL_LODS);
        assert_eq!(plan.sizes(), vec![256, 128, 64, 32, 16, 16, 16, 16]);
        for lod in 0..=(LOD_MAX - LOD_MIN) {
            assert_eq!(plan.level(lod).size, 1 << (LOD_MAX - lod));
        }
    }

    #[test]
    fn test_sigma_is_non_decreasing() {
        let sigmas = LodPlan::default().sigmas();
        assert!((sigmas[0] - 1.0 / 256.0).abs() < 1e-9);
        for pair in sigmas.windows(2) {
            assert!(pair[1] >= pair[0], "sigma decreased: {sigmas:?}");
        }
    }

    #[test]
    fn test_extra_levels_use_fixed_roughness() {
        let plan = LodPlan::default();
        let roughness = plan.roughness();
        assert_eq!(&roughness[5..], &EXTRA_LOD_ROUGHNESS);
        let expected = [0.523_599, 0.905_526, 1.570_796];
        for (level, e) in plan.levels()[5..].iter().zip(expected) {
            assert!((level.sigma - e).abs() < 1e-4, "{} vs {e}", level.sigma);
        }
    }

    #[test]
    fn test_halving_roughness_formula() {
        let plan = LodPlan::default();
        let s = 256.0_f32;
        let expected = (1.0 + (1.0 + 4.0 * PI * s).sqrt()) / (2.0 * PI * s);
        assert!((plan.level(0).roughness - expected).abs() < 1e-7);
        assert!((plan.level(0).roughness - 0.035_9).abs() < 1e-3);
    }

    #[test]
    fn test_mesh_has_six_quads_with_face_indices() {
        let plan = LodPlan::default();
        for level in plan.levels() {
            assert_eq!(level.mesh.len(), 36);
            for (i, vertex) in level.mesh.iter().enumerate() {
                assert_eq!(vertex.face_index, (i / 6) as f32);
            }
        }
    }

    #[test]
    fn test_mesh_uv_padding_is_half_texel() {
        let plan = LodPlan::default();
        let level = plan.level(3);
        let t = 1.0 / (level.size - 1) as f32;
        let min = level.mesh.iter().map(|v| v.uv[0]).fold(f32::MAX, f32::min);
        let max = level.mesh.iter().map(|v| v.uv[0]).fold(f32::MIN, f32::max);
        assert!((min + t / 2.0).abs() < 1e-6);
        assert!((max - 1.0 - t / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_mesh_positions_follow_face_grid() {
        let plan = LodPlan::default();
        for (face, quad) in plan.level(0).mesh.chunks_exact(6).enumerate() {
            let xs: Vec<f32> = quad.iter().map(|v| v.position[0]).collect();
            let ys: Vec<f32> = quad.iter().map(|v| v.position[1]).collect();
            let left = xs.iter().copied().fold(f32::MAX, f32::min);
            let top = ys.iter().copied().fold(f32::MIN, f32::max);
            assert!((left - ((face % 3) as f32 * 2.0 / 3.0 - 1.0)).abs() < 1e-6);
            assert!((top - (1.0 - (face / 3) as f32)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_lod_for_roughness_inverts_table() {
        let plan = LodPlan::default();
        for (lod, level) in plan.levels().iter().enumerate() {
            assert!((plan.lod_for_roughness(level.roughness) - lod as f32).abs() < 1e-4);
        }
        assert_eq!(plan.lod_for_roughness(0.0), 0.0);
        assert_eq!(plan.lod_for_roughness(5.0), (TOTAL_LODS - 1) as f32);
        assert_eq!(plan.lod_for_roughness(f32::NAN), 0.0);
        let midway = plan.lod_for_roughness(0.6);
        assert!((midway - 5.5).abs() < 1e-4);
    }

    #[test]
    fn test_settings_reject_inverted_range() {
        assert_eq!(
            LodSettings::new(3, 5, &[]),
            Err(PlanError::InvertedRange {
                lod_min: 5,
                lod_max: 3
            })
        );
        assert_eq!(LodSettings::new(4, 0, &[]), Err(PlanError::LodMinTooSmall(0)));
        assert_eq!(LodSettings::new(13, 4, &[]), Err(PlanError::LodMaxTooLarge(13)));
    }

    #[test]
    fn test_settings_reject_bad_roughness() {
        assert!(matches!(
            LodSettings::new(8, 4, &[0.5, 1.5]),
            Err(PlanError::RoughnessOutOfRange { index: 1, .. })
        ));
        assert!(matches!(
            LodSettings::new(8, 4, &[0.7, 0.5]),
            Err(PlanError::RoughnessNotAscending { .. })
        ));
    }

    #[test]
    fn test_settings_reject_extra_level_below_halving_chain() {
        // 0.1 gives sigma 0.0286, under the 1/16 of the 16-texel level.
        let err = LodSettings::new(8, 4, &[0.1]).unwrap_err();
        let PlanError::ExtraBelowHalving { sigma, min_sigma, .. } = err.clone() else {
            panic!("unexpected error {err:?}");
        };
        assert!(sigma < min_sigma);
        assert!((min_sigma - 1.0 / 16.0).abs() < 1e-7);

        // The halving roughness maps back to exactly its sigma, so the first
        // extra level must sit strictly above about 0.1513.
        assert!(matches!(
            LodSettings::new(8, 4, &[0.15, 0.5]),
            Err(PlanError::ExtraBelowHalving { .. })
        ));
        assert!(LodSettings::new(8, 4, &[0.16, 0.5]).is_ok());
    }

    #[test]
    fn test_accepted_settings_keep_sigma_and_roughness_ascending() {
        for extra in [&[0.2_f32][..], &[0.16, 0.3], &EXTRA_LOD_ROUGHNESS] {
            let plan = LodPlan::new(&LodSettings::new(8, 4, extra).unwrap());
            for pair in plan.levels().windows(2) {
                assert!(pair[1].sigma > pair[0].sigma, "sigma {:?}", plan.sigmas());
                assert!(pair[1].roughness > pair[0].roughness, "{:?}", plan.roughness());
            }
        }
    }

    #[test]
    fn test_settings_reject_regions_outside_atlas() {
        // Equal bounds leave no room below LOD 0 for extra levels.
        assert!(matches!(
            LodSettings::new(4, 4, &[0.5]),
            Err(PlanError::RegionOutsideAtlas { lod: 1, .. })
        ));
        // Eight extra levels of 16 texels need 2·16·9 rows below a 256 LOD 0.
        let many: Vec<f32> = (3..=10).map(|i| i as f32 / 10.0).collect();
        assert!(matches!(
            LodSettings::new(8, 4, &many),
            Err(PlanError::RegionOutsideAtlas { .. })
        ));
    }

    #[test]
    fn test_default_settings_validate() {
        let settings = LodSettings::new(LOD_MAX, LOD_MIN, &EXTRA_LOD_ROUGHNESS).unwrap();
        assert_eq!(settings, LodSettings::default());
        assert!(LodSettings::new(6, 3, &EXTRA_LOD_ROUGHNESS).is_ok());
    }
}
