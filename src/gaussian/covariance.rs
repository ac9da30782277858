use bevy_math::{
    Mat3,
    Vec3,
    Vec4,
};


/// world space covariance `R·S·Sᵗ·Rᵗ` of a splat, rotation given as (r, x, y, z)
#[allow(non_snake_case)]
pub fn compute_covariance_3d(rotation: Vec4, scale: Vec3) -> Mat3 {
    let S = Mat3::from_diagonal(scale);

    let r = rotation.x;
    let x = rotation.y;
    let y = rotation.z;
    let z = rotation.w;

    // columns hold the rows of the rotation, so this is Rᵗ
    let R = Mat3::from_cols(
        Vec3::new(
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - r * z),
            2.0 * (x * z + r * y),
        ),
        Vec3::new(
            2.0 * (x * y + r * z),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - r * x),
        ),
        Vec3::new(
            2.0 * (x * z - r * y),
            2.0 * (y * z + r * x),
            1.0 - 2.0 * (x * x + y * y),
        ),
    );

    let M = S * R;
    M.transpose() * M
}

/// view space point with its projected x/y clamped to 1.3x the frustum bounds,
/// keeps the EWA jacobian finite for splats far outside the view
pub fn clamp_to_frustum(p_view: Vec3, tan_fov_x: f32, tan_fov_y: f32) -> Vec3 {
    let lim_x = 1.3 * tan_fov_x;
    let lim_y = 1.3 * tan_fov_y;

    Vec3::new(
        (p_view.x / p_view.z).clamp(-lim_x, lim_x) * p_view.z,
        (p_view.y / p_view.z).clamp(-lim_y, lim_y) * p_view.z,
        p_view.z,
    )
}

/// EWA splatting: project a world covariance through the view rotation and the
/// local affine approximation of the perspective divide at `t`
///
/// `focal` scales the jacobian rows, ones gives tangent space units. returns the
/// upper triangle (c00, c01, c11) of the 2D covariance.
#[allow(non_snake_case)]
pub fn compute_covariance_2d(cov_3d: Mat3, t: Vec3, view_rotation: Mat3, focal: (f32, f32)) -> [f32; 3] {
    let (fx, fy) = focal;
    let inv_z = 1.0 / t.z;
    let inv_z2 = inv_z * inv_z;

    let J = Mat3::from_cols(
        Vec3::new(fx * inv_z, 0.0, 0.0),
        Vec3::new(0.0, fy * inv_z, 0.0),
        Vec3::new(-fx * t.x * inv_z2, -fy * t.y * inv_z2, 0.0),
    );

    let T = J * view_rotation;
    let cov = T * cov_3d * T.transpose();

    [cov.x_axis.x, cov.x_axis.y, cov.y_axis.y]
}
