#![cfg(feature = "io_ply")]

use std::io::Cursor;

use gaussian_tile_splatter::{
    ColorFeatures,
    SplatError,
    io::ply::{
        parse_ply,
        sh_degree_from_rest,
    },
    math::sigmoid,
};

use _harness::{
    assert_all_close,
    assert_close,
};



const BASE_PROPERTIES: [&str; 14] = [
    "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "scale_0", "scale_1", "scale_2", "opacity",
    "rot_0", "rot_1", "rot_2", "rot_3",
];

fn ascii_ply(properties: &[String], rows: &[Vec<f32>]) -> String {
    let mut ply = format!("ply\nformat ascii 1.0\nelement vertex {}\n", rows.len());
    for property in properties {
        ply.push_str(&format!("property float {property}\n"));
    }
    ply.push_str("end_header\n");

    for row in rows {
        let values: Vec<String> = row.iter().map(|value| value.to_string()).collect();
        ply.push_str(&values.join(" "));
        ply.push('\n');
    }

    ply
}

fn properties(rest: usize) -> Vec<String> {
    BASE_PROPERTIES
        .iter()
        .map(|property| property.to_string())
        .chain((0..rest).map(|i| format!("f_rest_{i}")))
        .collect()
}


#[test]
fn test_parse_activates_attributes() {
    let row = vec![
        1.0, 2.0, 3.0,
        0.1, 0.2, 0.3,
        0.0, (2.0f32).ln(), (0.5f32).ln(),
        0.0,
        2.0, 0.0, 0.0, 0.0,
    ];
    let ply = ascii_ply(&properties(0), &[row]);

    let cloud = parse_ply(&mut Cursor::new(ply.into_bytes())).expect("valid ply");

    assert_eq!(cloud.len(), 1);
    assert_eq!(cloud.positions, vec![1.0, 2.0, 3.0]);
    assert_all_close(&cloud.scales, &[1.0, 2.0, 0.5], 1e-5);
    assert_close(cloud.opacities[0], 0.5, 1e-6);
    assert_all_close(&cloud.rotations, &[1.0, 0.0, 0.0, 0.0], 1e-6);

    match &cloud.colors {
        ColorFeatures::SphericalHarmonics { degree, coefficients } => {
            assert_eq!(*degree, 0);
            assert_all_close(coefficients, &[0.1, 0.2, 0.3], 1e-6);
        }
        ColorFeatures::Rgb(_) => panic!("ply colors are spherical harmonics"),
    }
}

#[test]
fn test_scale_is_clamped_around_mean() {
    let row = vec![
        0.0, 0.0, 0.0,
        0.0, 0.0, 0.0,
        -12.0, 0.0, 0.0,
        3.0,
        0.0, 0.0, 0.0, 1.0,
    ];
    let ply = ascii_ply(&properties(0), &[row]);

    let cloud = parse_ply(&mut Cursor::new(ply.into_bytes())).expect("valid ply");

    // log mean is -4, so -12 is raised to -8 and 0 stays
    assert_all_close(&cloud.scales, &[(-8.0f32).exp(), 1.0, 1.0], 1e-6);
    assert_close(cloud.opacities[0], sigmoid(3.0), 1e-6);
}

#[test]
fn test_f_rest_planar_to_interleaved() {
    let mut row = vec![
        0.0, 0.0, 0.0,
        10.0, 20.0, 30.0,
        0.0, 0.0, 0.0,
        0.0,
        1.0, 0.0, 0.0, 0.0,
    ];
    row.extend((0..9).map(|i| i as f32));

    let ply = ascii_ply(&properties(9), &[row.clone(), row]);
    let cloud = parse_ply(&mut Cursor::new(ply.into_bytes())).expect("valid ply");

    let ColorFeatures::SphericalHarmonics { degree, coefficients } = &cloud.colors else {
        panic!("ply colors are spherical harmonics");
    };

    assert_eq!(*degree, 1);
    let expected = [10.0, 20.0, 30.0, 0.0, 3.0, 6.0, 1.0, 4.0, 7.0, 2.0, 5.0, 8.0];
    assert_eq!(coefficients.len(), 2 * expected.len());
    assert_all_close(&coefficients[..12], &expected, 0.0);
    assert_all_close(&coefficients[12..], &expected, 0.0);

    assert!(cloud.validate().is_ok());
}

#[test]
fn test_missing_properties() {
    let properties: Vec<String> = BASE_PROPERTIES
        .iter()
        .filter(|property| **property != "scale_2")
        .map(|property| property.to_string())
        .collect();
    let ply = ascii_ply(&properties, &[vec![0.0; 13]]);

    let result = parse_ply(&mut Cursor::new(ply.into_bytes()));
    assert!(matches!(result, Err(SplatError::Ply(_))));
}

#[test]
fn test_sh_degree_from_rest() {
    assert_eq!(sh_degree_from_rest(0).ok(), Some(0));
    assert_eq!(sh_degree_from_rest(9).ok(), Some(1));
    assert_eq!(sh_degree_from_rest(24).ok(), Some(2));
    assert_eq!(sh_degree_from_rest(45).ok(), Some(3));

    assert!(sh_degree_from_rest(10).is_err());
    assert!(sh_degree_from_rest(12).is_err());
    assert!(sh_degree_from_rest(72).is_err());
}
