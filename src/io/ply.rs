use std::io::BufRead;

use ply_rs::{
    parser::Parser,
    ply::{
        Property,
        PropertyAccess,
    },
};

use crate::{
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::{
        ColorFeatures,
        SplatCloud,
    },
    material::spherical_harmonics::{
        MAX_SH_DEGREE,
        SH_CHANNELS,
        num_sh_coefficients,
    },
    math::sigmoid,
};

pub const MAX_SIZE_VARIANCE: f32 = 4.0;

const REQUIRED_PROPERTIES: [&str; 14] = [
    "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "scale_0", "scale_1", "scale_2", "opacity",
    "rot_0", "rot_1", "rot_2", "rot_3",
];


/// one vertex as stored by 3D gaussian splatting training: log scales, logit
/// opacity, unnormalized rotation and planar `f_rest` coefficients
#[derive(Debug, Clone, Default)]
pub struct PlyVertex {
    pub position: [f32; 3],
    pub scale: [f32; 3],
    pub opacity: f32,
    pub rotation: [f32; 4],
    pub f_dc: [f32; 3],
    pub f_rest: Vec<f32>,
}

impl PropertyAccess for PlyVertex {
    fn new() -> Self {
        PlyVertex::default()
    }

    fn set_property(&mut self, key: String, property: Property) {
        match (key.as_ref(), property) {
            ("x", Property::Float(v)) => self.position[0] = v,
            ("y", Property::Float(v)) => self.position[1] = v,
            ("z", Property::Float(v)) => self.position[2] = v,
            ("f_dc_0", Property::Float(v)) => self.f_dc[0] = v,
            ("f_dc_1", Property::Float(v)) => self.f_dc[1] = v,
            ("f_dc_2", Property::Float(v)) => self.f_dc[2] = v,
            ("scale_0", Property::Float(v)) => self.scale[0] = v,
            ("scale_1", Property::Float(v)) => self.scale[1] = v,
            ("scale_2", Property::Float(v)) => self.scale[2] = v,
            ("opacity", Property::Float(v)) => self.opacity = v,
            ("rot_0", Property::Float(v)) => self.rotation[0] = v,
            ("rot_1", Property::Float(v)) => self.rotation[1] = v,
            ("rot_2", Property::Float(v)) => self.rotation[2] = v,
            ("rot_3", Property::Float(v)) => self.rotation[3] = v,
            (_, Property::Float(v)) if key.starts_with("f_rest_") => {
                if let Ok(i) = key["f_rest_".len()..].parse::<usize>() {
                    if self.f_rest.len() <= i {
                        self.f_rest.resize(i + 1, 0.0);
                    }
                    self.f_rest[i] = v;
                }
            }
            (_, _) => {}
        }
    }
}


/// sh degree implied by the number of `f_rest_*` properties
pub fn sh_degree_from_rest(rest_count: usize) -> SplatResult<usize> {
    if rest_count % SH_CHANNELS != 0 {
        return Err(SplatError::Ply(format!(
            "{rest_count} f_rest properties do not split into {SH_CHANNELS} channels",
        )));
    }

    let per_channel = rest_count / SH_CHANNELS + 1;
    (0..=MAX_SH_DEGREE)
        .find(|&degree| num_sh_coefficients(degree) == per_channel)
        .ok_or_else(|| {
            SplatError::Ply(format!("{per_channel} coefficients per channel is not a supported sh degree"))
        })
}

/// append the vertex's coefficients in (coefficient, channel) order
///
/// `f_rest` is planar: all coefficients of red, then green, then blue.
fn interleave_coefficients(vertex: &PlyVertex, per_channel: usize, out: &mut Vec<f32>) {
    let base = out.len();
    out.resize(base + per_channel * SH_CHANNELS, 0.0);
    out[base..base + SH_CHANNELS].copy_from_slice(&vertex.f_dc);

    let rest_per_channel = per_channel - 1;
    if rest_per_channel == 0 {
        return;
    }

    for (i, &value) in vertex.f_rest.iter().enumerate().take(rest_per_channel * SH_CHANNELS) {
        let channel = i / rest_per_channel;
        let coefficient = i % rest_per_channel + 1;
        out[base + coefficient * SH_CHANNELS + channel] = value;
    }
}

/// activate the raw training attributes: exponentiated scales clamped around their
/// log mean, sigmoid opacity and unit rotation
pub fn activate(vertex: &mut PlyVertex) {
    let mean_scale = vertex.scale.iter().sum::<f32>() / 3.0;
    for scale in &mut vertex.scale {
        *scale = scale
            .max(mean_scale - MAX_SIZE_VARIANCE)
            .min(mean_scale + MAX_SIZE_VARIANCE)
            .exp();
    }

    vertex.opacity = sigmoid(vertex.opacity);

    let norm = vertex
        .rotation
        .iter()
        .map(|v| v.powi(2))
        .sum::<f32>()
        .sqrt();
    if norm > 0.0 {
        for v in &mut vertex.rotation {
            *v /= norm;
        }
    }
}

pub fn parse_ply(mut reader: &mut dyn BufRead) -> SplatResult<SplatCloud> {
    let vertex_parser = Parser::<PlyVertex>::new();
    let header = vertex_parser.read_header(&mut reader)?;

    let mut vertices = Vec::new();
    let mut rest_count = 0;

    for (_key, element) in &header.elements {
        if element.name == "vertex" {
            let missing = REQUIRED_PROPERTIES
                .iter()
                .filter(|property| !element.properties.contains_key(**property))
                .collect::<Vec<_>>();

            if !missing.is_empty() {
                return Err(SplatError::Ply(format!("missing required properties: {missing:?}")));
            }

            rest_count = element
                .properties
                .keys()
                .filter(|key| key.starts_with("f_rest_"))
                .count();

            vertices = vertex_parser.read_payload_for_element(&mut reader, element, &header)?;
        }
    }

    let degree = sh_degree_from_rest(rest_count)?;
    let per_channel = num_sh_coefficients(degree);

    let mut cloud = SplatCloud::default();
    let mut coefficients = Vec::with_capacity(vertices.len() * per_channel * SH_CHANNELS);

    for mut vertex in vertices {
        activate(&mut vertex);

        cloud.positions.extend_from_slice(&vertex.position);
        cloud.scales.extend_from_slice(&vertex.scale);
        cloud.rotations.extend_from_slice(&vertex.rotation);
        cloud.opacities.push(vertex.opacity);
        interleave_coefficients(&vertex, per_channel, &mut coefficients);
    }

    cloud.colors = ColorFeatures::SphericalHarmonics {
        degree,
        coefficients,
    };

    Ok(cloud)
}
