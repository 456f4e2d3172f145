// SPDX-License-Identifier: CEPL-1.0
//! Matrix helpers and uniform block layouts shared by every step.
//!
//! All matrices are column-major `f32`, matching GLSL's default `mat4`
//! layout, so a `Mat4` can be copied into a uniform buffer verbatim.

pub mod scene;
pub mod transform;
pub mod uniforms;

pub use glam::{Mat3, Mat4, Vec3, Vec4};
pub use scene::{FrameTransforms, SceneParams};
pub use transform::{
    identity, look_at, mat3_from_mat4, multiply, normal_matrix, perspective, rotate_y, transpose3,
    transpose4,
};
pub use uniforms::{LightingUniforms, TransformUniforms};
