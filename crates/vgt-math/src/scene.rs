// SPDX-License-Identifier: CEPL-1.0
//! Per-frame matrix pipeline: spin the model, view it from a fixed camera,
//! project it, and derive the normal matrix for lighting.

use glam::{Mat4, Vec3};

use crate::transform::{look_at, multiply, normal_matrix, perspective, rotate_y};
use crate::uniforms::{LightingUniforms, TransformUniforms};

/// Camera, projection and light inputs that stay fixed for a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneParams {
    pub eye: Vec3,
    pub center: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// Model rotation speed about +Y, radians per second.
    pub spin_speed: f32,
    /// Light direction in view space (points from the light into the scene).
    pub light_dir: Vec3,
}

impl Default for SceneParams {
    fn default() -> Self {
        SceneParams {
            eye: Vec3::new(0.0, 0.0, 2.0),
            center: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: std::f32::consts::FRAC_PI_4,
            z_near: 0.1,
            z_far: 10.0,
            spin_speed: 1.0,
            light_dir: Vec3::new(0.5, -0.5, -1.0),
        }
    }
}

/// Matrices for one frame. Built fresh every frame, consumed once when
/// copied into the frame's uniform region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTransforms {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
    pub model_view: Mat4,
    pub mvp: Mat4,
    pub normal: Mat4,
    pub light_dir: Vec3,
}

impl FrameTransforms {
    pub fn compute(params: &SceneParams, elapsed_secs: f32, aspect: f32) -> Self {
        let model = rotate_y(elapsed_secs * params.spin_speed);
        let view = look_at(params.eye, params.center, params.up);
        let proj = perspective(params.fov_y, aspect, params.z_near, params.z_far);

        let model_view = multiply(view, model);
        let mvp = multiply(proj, model_view);

        FrameTransforms {
            model,
            view,
            proj,
            model_view,
            mvp,
            normal: normal_matrix(model_view),
            light_dir: params.light_dir,
        }
    }

    pub fn to_transform_uniforms(&self) -> TransformUniforms {
        TransformUniforms::new(self.mvp)
    }

    pub fn to_lighting_uniforms(&self) -> LightingUniforms {
        LightingUniforms::new(self.mvp, self.model_view, self.normal, self.light_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{identity, mat3_from_mat4};
    use approx::assert_abs_diff_eq;
    use glam::Vec4;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn at_time_zero_model_is_identity() {
        let t = FrameTransforms::compute(&SceneParams::default(), 0.0, 16.0 / 9.0);
        assert_abs_diff_eq!(t.model, identity(), epsilon = EPSILON);
        assert_abs_diff_eq!(t.model_view, t.view, epsilon = EPSILON);
    }

    #[test]
    fn mvp_is_proj_view_model() {
        let params = SceneParams::default();
        let t = FrameTransforms::compute(&params, 1.7, 1.5);
        let expected = t.proj * t.view * t.model;
        assert_abs_diff_eq!(t.mvp, expected, epsilon = EPSILON);
    }

    #[test]
    fn origin_lands_in_front_of_the_camera() {
        let t = FrameTransforms::compute(&SceneParams::default(), 0.4, 1.0);
        let clip = t.mvp * Vec4::W;
        let ndc = clip.truncate() / clip.w;
        assert_abs_diff_eq!(ndc.x, 0.0, epsilon = EPSILON);
        assert_abs_diff_eq!(ndc.y, 0.0, epsilon = EPSILON);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn spin_speed_scales_rotation() {
        let slow = SceneParams {
            spin_speed: 0.5,
            ..SceneParams::default()
        };
        let a = FrameTransforms::compute(&slow, 2.0, 1.0);
        let b = FrameTransforms::compute(&SceneParams::default(), 1.0, 1.0);
        assert_abs_diff_eq!(a.model, b.model, epsilon = EPSILON);
    }

    #[test]
    fn normal_matrix_undoes_model_view_rotation() {
        let t = FrameTransforms::compute(&SceneParams::default(), 0.8, 1.0);
        let product = mat3_from_mat4(t.normal) * mat3_from_mat4(t.model_view);
        assert_abs_diff_eq!(product, glam::Mat3::IDENTITY, epsilon = EPSILON);
    }

    #[test]
    fn lighting_uniforms_carry_every_matrix() {
        let t = FrameTransforms::compute(&SceneParams::default(), 0.3, 1.25);
        let u = t.to_lighting_uniforms();
        assert_eq!(u.mvp, t.mvp.to_cols_array());
        assert_eq!(u.model_view, t.model_view.to_cols_array());
        assert_eq!(u.normal_matrix, t.normal.to_cols_array());
        assert_eq!(u.light_dir, [0.5, -0.5, -1.0, 0.0]);
        assert_eq!(t.to_transform_uniforms().mvp, u.mvp);
    }
}
