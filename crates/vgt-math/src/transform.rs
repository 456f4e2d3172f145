// SPDX-License-Identifier: CEPL-1.0
//! Transform builders used once per frame to place the spinning mesh.
//!
//! Conventions: right-handed world, camera looks down −Z, clip space is
//! Vulkan's (Y down, depth in `[0, 1]`).

use glam::{Mat3, Mat4, Vec3, Vec4};

pub fn identity() -> Mat4 {
    Mat4::IDENTITY
}

/// Rotation about +Y by `angle` radians. Any angle is accepted; the result
/// repeats every `2π`.
pub fn rotate_y(angle: f32) -> Mat4 {
    let (s, c) = angle.sin_cos();
    Mat4::from_cols(
        Vec4::new(c, 0.0, -s, 0.0),
        Vec4::Y,
        Vec4::new(s, 0.0, c, 0.0),
        Vec4::W,
    )
}

/// Right-handed view matrix.
///
/// `eye` must differ from `center` and `up` must not be parallel to the view
/// direction; otherwise the basis degenerates and the result is NaN. No
/// check is made.
pub fn look_at(eye: Vec3, center: Vec3, up: Vec3) -> Mat4 {
    let f = (center - eye).normalize();
    let s = f.cross(up).normalize();
    let u = s.cross(f);

    Mat4::from_cols(
        Vec4::new(s.x, u.x, -f.x, 0.0),
        Vec4::new(s.y, u.y, -f.y, 0.0),
        Vec4::new(s.z, u.z, -f.z, 0.0),
        Vec4::new(-s.dot(eye), -u.dot(eye), f.dot(eye), 1.0),
    )
}

/// Right-handed perspective projection with depth mapped to `[0, 1]`.
///
/// The Y scale is negated: Vulkan's framebuffer Y grows downward, and
/// dropping the flip renders everything upside down.
pub fn perspective(fov_y: f32, aspect: f32, z_near: f32, z_far: f32) -> Mat4 {
    debug_assert!(aspect > 0.0, "aspect must be positive");
    debug_assert!(z_near > 0.0 && z_far > z_near, "need 0 < z_near < z_far");

    let focal = 1.0 / (0.5 * fov_y).tan();
    let depth = z_far / (z_near - z_far);

    Mat4::from_cols(
        Vec4::new(focal / aspect, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -focal, 0.0, 0.0),
        Vec4::new(0.0, 0.0, depth, -1.0),
        Vec4::new(0.0, 0.0, depth * z_near, 0.0),
    )
}

/// `a · b`: `b` is applied first. `multiply(proj, multiply(view, model))`
/// takes object space to clip space.
pub fn multiply(a: Mat4, b: Mat4) -> Mat4 {
    a * b
}

pub fn transpose4(m: Mat4) -> Mat4 {
    m.transpose()
}

pub fn transpose3(m: Mat3) -> Mat3 {
    m.transpose()
}

/// Upper-left 3x3 block; translation is dropped.
pub fn mat3_from_mat4(m: Mat4) -> Mat3 {
    Mat3::from_mat4(m)
}

/// Normal matrix for the lighting step, padded to a 4x4 with identity.
///
/// Computed as `transpose(mat3(model_view))`, which equals
/// `inverse(mat3(model_view))` only while the block is a pure rotation. A
/// model with non-uniform scale needs a real inverse here.
pub fn normal_matrix(model_view: Mat4) -> Mat4 {
    Mat4::from_mat3(transpose3(mat3_from_mat4(model_view)))
}
