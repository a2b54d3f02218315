//! Prefiltered mipmapped radiance environment maps.
//!
//! [`PmremGenerator`] turns an equirectangular or cube environment into a
//! cube-UV atlas holding progressively blurrier levels indexed by surface
//! roughness. Level parameters come from a shared [`LodPlan`]; the filtering
//! runs as explicit draws on any [`RenderDevice`](pmrem_render::RenderDevice).

mod atlas;
mod generator;
pub mod kernel;
pub mod planner;

pub use atlas::{AtlasImage, CubeUvTexture};
pub use generator::{PmremError, PmremGenerator};
pub use kernel::{BlurKernel, STANDARD_DEVIATIONS};
pub use planner::{
    EXTRA_LOD_ROUGHNESS, LOD_MAX_LIMIT, LodLevel, LodPlan, LodSettings, PlanError, SIZE_MAX,
    TOTAL_LODS,
};
pub use pmrem_cubeuv::{CubeUvLayout, LOD_MAX, LOD_MIN};
pub use pmrem_render::MAX_SAMPLES;
