// SPDX-License-Identifier: CEPL-1.0
//! CPU mirrors of the uniform blocks declared in the step shaders.
//!
//! Layouts are std140-compatible as written: only `mat4` and `vec4` members.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// `layout(set = 0, binding = 0) uniform Camera { mat4 mvp; }`
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformUniforms {
    pub mvp: [f32; 16],
}

impl TransformUniforms {
    pub fn new(mvp: Mat4) -> Self {
        TransformUniforms {
            mvp: mvp.to_cols_array(),
        }
    }
}

/// Uniform block of the lighting step. `light_dir` is in view space; its
/// `w` is padding and always zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightingUniforms {
    pub mvp: [f32; 16],
    pub model_view: [f32; 16],
    pub normal_matrix: [f32; 16],
    pub light_dir: [f32; 4],
}

impl LightingUniforms {
    pub fn new(mvp: Mat4, model_view: Mat4, normal_matrix: Mat4, light_dir: Vec3) -> Self {
        LightingUniforms {
            mvp: mvp.to_cols_array(),
            model_view: model_view.to_cols_array(),
            normal_matrix: normal_matrix.to_cols_array(),
            light_dir: light_dir.extend(0.0).to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes_match_the_shaders() {
        assert_eq!(std::mem::size_of::<TransformUniforms>(), 64);
        assert_eq!(std::mem::size_of::<LightingUniforms>(), 3 * 64 + 16);
        assert_eq!(std::mem::align_of::<LightingUniforms>(), 4);
    }

    #[test]
    fn matrices_are_stored_column_major() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let u = TransformUniforms::new(m);
        assert_eq!(&u.mvp[12..15], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn light_direction_is_padded_with_zero() {
        let u = LightingUniforms::new(
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            Vec3::new(0.5, -0.5, -1.0),
        );
        assert_eq!(u.light_dir, [0.5, -0.5, -1.0, 0.0]);

        let bytes = bytemuck::bytes_of(&u);
        assert_eq!(bytes.len(), std::mem::size_of::<LightingUniforms>());
        let tail: &[f32] = bytemuck::cast_slice(&bytes[192..]);
        assert_eq!(tail, &u.light_dir);
    }
}
