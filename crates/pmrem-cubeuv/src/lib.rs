//! Cube-UV atlas geometry: cube faces, face coordinates, equirectangular mapping,
//! the packed atlas layout, and bilinear lookups into all of them.

mod cube_face;
mod equirect;
mod face_coord;
mod inverse;
mod layout;
mod sample;

pub use cube_face::CubeFace;
pub use equirect::{direction_to_equirect_uv, equirect_uv_to_direction};
pub use face_coord::FaceCoord;
pub use inverse::{direction_to_face, direction_to_face_coord};
pub use layout::{AtlasRect, CubeUvLayout, LOD_MAX, LOD_MIN};
pub use sample::{TexelFetch, sample_cube_faces, sample_cube_uv, sample_equirect};
