use bevy_math::Vec3;
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};

use gaussian_tile_splatter::{
    ColorFeatures,
    Renderer,
    SplatBuffers,
    SplatCloud,
    SplatError,
    gaussian::rand::seeded_splats,
    material::spherical_harmonics::{
        MAX_SH_DEGREE,
        SH_CHANNELS,
        ShEvaluator,
        evaluate_sh,
        num_sh_coefficients,
    },
};

use _harness::{
    assert_all_close,
    assert_close,
    front_camera,
    isotropic_splat,
    raster_settings,
    test_device,
};



const SH_C0: f32 = 0.282_094_8;


fn with_sh(mut cloud: SplatCloud, degree: usize, seed: u64) -> SplatCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let count = cloud.len() * num_sh_coefficients(degree) * SH_CHANNELS;

    cloud.colors = ColorFeatures::SphericalHarmonics {
        degree,
        coefficients: (0..count).map(|_| rng.gen_range(-1.0..1.0)).collect(),
    };
    cloud
}


#[test]
fn test_coefficient_counts() {
    assert_eq!(num_sh_coefficients(0), 1);
    assert_eq!(num_sh_coefficients(1), 4);
    assert_eq!(num_sh_coefficients(2), 9);
    assert_eq!(num_sh_coefficients(3), 16);
    assert_eq!(MAX_SH_DEGREE, 3);
}

#[test]
fn test_degree_zero() {
    let rgb = evaluate_sh(0, Vec3::Z, &[Vec3::new(1.0, -1.0, 0.5)]);

    assert_close(rgb.x, SH_C0 + 0.5, 1e-6);
    assert_close(rgb.y, 0.5 - SH_C0, 1e-6);
    assert_close(rgb.z, 0.5 * SH_C0 + 0.5, 1e-6);
}

#[test]
fn test_negative_radiance_is_clamped() {
    let rgb = evaluate_sh(0, Vec3::X, &[Vec3::splat(-10.0)]);

    assert_eq!(rgb, Vec3::ZERO);
}

#[test]
fn test_zero_higher_bands_match_degree_zero() {
    let dc = Vec3::new(0.3, -0.2, 0.9);
    let mut coefficients = [Vec3::ZERO; 16];
    coefficients[0] = dc;

    for dir in [Vec3::X, Vec3::Y, Vec3::NEG_Z, Vec3::new(0.3, -0.4, 0.5).normalize()] {
        let base = evaluate_sh(0, dir, &coefficients);
        for degree in 1..=MAX_SH_DEGREE {
            assert_eq!(evaluate_sh(degree, dir, &coefficients), base);
        }
    }
}

#[test]
fn test_degree_one_depends_on_direction() {
    let mut coefficients = [Vec3::ZERO; 4];
    coefficients[2] = Vec3::ONE;

    let toward = evaluate_sh(1, Vec3::Z, &coefficients);
    let away = evaluate_sh(1, Vec3::NEG_Z, &coefficients);

    assert!(toward.x > 0.5);
    assert!(away.x < 0.5);
    assert_close(toward.x + away.x, 1.0, 1e-6);
}

#[test]
fn test_device_evaluation_matches_host() {
    let device = test_device();
    let camera_position = Vec3::new(0.5, -1.0, -6.0);

    for degree in 0..=MAX_SH_DEGREE {
        let cloud = with_sh(seeded_splats(257, degree as u64), degree, 99);
        let splats = SplatBuffers::upload(&cloud).expect("valid cloud");

        ShEvaluator::new()
            .evaluate(&device, &splats, camera_position)
            .expect("evaluate");

        let ColorFeatures::SphericalHarmonics { coefficients, .. } = &cloud.colors else {
            unreachable!();
        };

        let per_splat = num_sh_coefficients(degree);
        let mut expected = Vec::with_capacity(3 * cloud.len());
        for index in 0..cloud.len() {
            let position = Vec3::from_slice(&cloud.positions[3 * index..]);
            let dir = (position - camera_position).normalize_or_zero();
            let splat_coefficients: Vec<Vec3> = (0..per_splat)
                .map(|k| Vec3::from_slice(&coefficients[(index * per_splat + k) * 3..]))
                .collect();

            expected.extend(evaluate_sh(degree, dir, &splat_coefficients).to_array());
        }

        assert_all_close(&splats.colors.to_vec(), &expected, 1e-6);
    }
}

#[test]
fn test_unsupported_degree() {
    let mut cloud = seeded_splats(2, 0);
    cloud.colors = ColorFeatures::SphericalHarmonics {
        degree: 4,
        coefficients: vec![0.0; 2 * num_sh_coefficients(4) * SH_CHANNELS],
    };

    assert!(matches!(cloud.validate(), Err(SplatError::UnsupportedShDegree(4))));
    assert!(matches!(SplatBuffers::upload(&cloud), Err(SplatError::UnsupportedShDegree(4))));
}

#[test]
fn test_mismatched_coefficients() {
    let mut cloud = seeded_splats(2, 0);
    cloud.colors = ColorFeatures::SphericalHarmonics {
        degree: 1,
        coefficients: vec![0.0; 5],
    };

    assert!(matches!(cloud.validate(), Err(SplatError::BufferSize { name: "colors", .. })));
}

#[test]
fn test_renderer_evaluates_sh_colors() {
    let camera = front_camera(5.0, 32, 32);
    let splat = isotropic_splat([0.0; 3], 0.2, 0.9, [1.0, 0.5, 0.5]);

    let rgb_cloud = SplatCloud::from_splats([splat]);
    let mut sh_cloud = rgb_cloud.clone();
    sh_cloud.colors = ColorFeatures::SphericalHarmonics {
        degree: 0,
        coefficients: vec![0.5 / SH_C0, 0.0, 0.0],
    };

    let mut renderer = Renderer::new(raster_settings(32, 32)).expect("renderer");
    let from_rgb = renderer.render(&rgb_cloud, &camera).expect("render");
    let from_sh = renderer.render(&sh_cloud, &camera).expect("render");

    assert_all_close(&from_sh.image, &from_rgb.image, 1e-5);
}
