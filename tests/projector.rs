use bevy_math::{
    Vec3,
    Vec4,
};

use gaussian_tile_splatter::{
    Camera,
    GaussianProjector,
    ProjectionMode,
    ScreenSplats,
    SplatBuffers,
    SplatError,
    gaussian::rand::seeded_splats,
    projector::{
        CovarianceSpace,
        ProjectionParams,
        project_splat,
    },
};

use _harness::{
    assert_close,
    front_camera,
    test_device,
};



const IDENTITY: Vec4 = Vec4::new(1.0, 0.0, 0.0, 0.0);


fn params(camera: &Camera, mode: ProjectionMode) -> ProjectionParams {
    ProjectionParams::new(camera, 1.0, mode).expect("camera has a resolution")
}


#[test]
fn test_centered_splat() {
    let camera = front_camera(5.0, 64, 48);
    let params = params(&camera, ProjectionMode::TangentFov);
    let tan = camera.tan_fov();

    let projected = project_splat(&params, Vec3::ZERO, Vec3::splat(0.1), IDENTITY);

    assert_close(projected.depth, 5.0, 1e-5);
    assert_close(projected.mean.x, 0.0, 1e-6);
    assert_close(projected.mean.y, 0.0, 1e-6);

    let tangent_variance = 0.01 / 25.0;
    assert_close(projected.covariance[0], tangent_variance / (tan.x * tan.x), 1e-7);
    assert_close(projected.covariance[1], 0.0, 1e-9);
    assert_close(projected.covariance[2], tangent_variance / (tan.y * tan.y), 1e-7);
}

#[test]
fn test_offset_splat_mean() {
    let camera = front_camera(5.0, 64, 48);
    let params = params(&camera, ProjectionMode::TangentFov);
    let tan = camera.tan_fov();

    let projected = project_splat(&params, Vec3::new(0.0, 1.0, 0.0), Vec3::splat(0.1), IDENTITY);

    assert_close(projected.mean.x, 0.0, 1e-6);
    assert_close(projected.mean.y, 1.0 / (5.0 * tan.y), 1e-4);
}

#[test]
fn test_near_plane_culling() {
    let camera = front_camera(5.0, 64, 48);
    let params = params(&camera, ProjectionMode::TangentFov);

    let behind = project_splat(&params, Vec3::new(0.0, 0.0, -10.0), Vec3::splat(0.1), IDENTITY);
    assert_close(behind.depth, -5.0, 1e-5);
    assert_eq!(behind.covariance, [0.0; 3]);
    assert_eq!(behind.mean.to_array(), [0.0; 2]);

    let too_close = project_splat(&params, Vec3::new(0.0, 0.0, -4.9), Vec3::splat(0.1), IDENTITY);
    assert!(too_close.depth < 0.2);
    assert_eq!(too_close.covariance, [0.0; 3]);

    let nan = project_splat(&params, Vec3::new(f32::NAN, 0.0, 0.0), Vec3::splat(0.1), IDENTITY);
    assert_eq!(nan.covariance, [0.0; 3]);
}

#[test]
fn test_projection_modes_agree() {
    let (width, height) = (64, 48);
    let camera = front_camera(5.0, width, height);
    let tangent = params(&camera, ProjectionMode::TangentFov);
    let focal = params(&camera, ProjectionMode::FocalLength);

    let (w, h) = (width as f32, height as f32);
    let scale = [0.25 * w * w, 0.25 * w * h, 0.25 * h * h];

    let cloud = seeded_splats(64, 3);
    for index in 0..cloud.len() {
        let splat = cloud.splat(index).expect("index in range");
        let position = Vec3::from_array(splat.position);
        let scales = Vec3::from_array(splat.scale);
        let rotation = Vec4::from_array(splat.rotation);

        let a = project_splat(&tangent, position, scales, rotation);
        let b = project_splat(&focal, position, scales, rotation);

        assert_eq!(a.depth, b.depth);
        assert_eq!(a.mean, b.mean);
        for k in 0..3 {
            let expected = b.covariance[k];
            let tolerance = 1e-4 * expected.abs().max(1.0);
            assert_close(a.covariance[k] * scale[k], expected, tolerance);
        }
    }
}

#[test]
fn test_scale_modifier() {
    let camera = front_camera(5.0, 64, 64);
    let unit = ProjectionParams::new(&camera, 1.0, ProjectionMode::FocalLength).expect("resolution");
    let doubled = ProjectionParams::new(&camera, 2.0, ProjectionMode::FocalLength).expect("resolution");

    let a = project_splat(&unit, Vec3::ZERO, Vec3::new(0.1, 0.2, 0.05), IDENTITY);
    let b = project_splat(&doubled, Vec3::ZERO, Vec3::new(0.1, 0.2, 0.05), IDENTITY);

    assert_close(b.covariance[0], 4.0 * a.covariance[0], 1e-4);
    assert_close(b.covariance[2], 4.0 * a.covariance[2], 1e-4);
}

#[test]
fn test_focal_mode_requires_resolution() {
    let camera = Camera::look_at(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::Y);

    let result = ProjectionParams::new(&camera, 1.0, ProjectionMode::FocalLength);
    assert!(matches!(result, Err(SplatError::MissingResolution)));

    assert!(ProjectionParams::new(&camera, 1.0, ProjectionMode::TangentFov).is_ok());
}

#[test]
fn test_device_forward_matches_host() {
    let device = test_device();
    let camera = front_camera(6.0, 80, 60);
    let cloud = seeded_splats(300, 9);
    let splats = SplatBuffers::upload(&cloud).expect("valid cloud");

    let projector = GaussianProjector::new();
    let mut screen = ScreenSplats::default();
    projector
        .forward(&device, &splats, &camera, 1.0, ProjectionMode::FocalLength, &mut screen)
        .expect("projection");

    assert_eq!(screen.count, cloud.len());
    assert_eq!(screen.space, CovarianceSpace::Pixel);

    let params = params(&camera, ProjectionMode::FocalLength);
    let means = screen.means_2d.to_vec();
    let depths = screen.depths.to_vec();
    let conics = screen.conics.to_vec();

    for index in 0..cloud.len() {
        let splat = cloud.splat(index).expect("index in range");
        let expected = project_splat(
            &params,
            Vec3::from_array(splat.position),
            Vec3::from_array(splat.scale),
            Vec4::from_array(splat.rotation),
        );

        assert_eq!(depths[index], expected.depth);
        assert_eq!([means[2 * index], means[2 * index + 1]], expected.mean.to_array());
        assert_eq!(&conics[3 * index..3 * index + 3], &expected.covariance);
    }
}

#[test]
fn test_device_forward_missing_resolution() {
    let device = test_device();
    let camera = Camera::default();
    let splats = SplatBuffers::upload(&seeded_splats(4, 1)).expect("valid cloud");

    let result = GaussianProjector::new().forward(
        &device,
        &splats,
        &camera,
        1.0,
        ProjectionMode::FocalLength,
        &mut ScreenSplats::default(),
    );

    assert!(matches!(result, Err(SplatError::MissingResolution)));
}
