use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    device::DeviceBuffer,
    error::{
        SplatError,
        SplatResult,
    },
    material::spherical_harmonics::{
        MAX_SH_DEGREE,
        SH_CHANNELS,
        num_sh_coefficients,
    },
};

pub mod covariance;
pub mod rand;


/// per-splat color input: final rgb, or spherical harmonic coefficients laid out
/// as (splat, coefficient, channel) that are evaluated against the camera
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub enum ColorFeatures {
    Rgb(Vec<f32>),
    SphericalHarmonics {
        degree: usize,
        coefficients: Vec<f32>,
    },
}

impl ColorFeatures {
    pub fn stride(&self) -> usize {
        match self {
            ColorFeatures::Rgb(_) => SH_CHANNELS,
            ColorFeatures::SphericalHarmonics { degree, .. } => num_sh_coefficients(*degree) * SH_CHANNELS,
        }
    }

    pub fn data(&self) -> &[f32] {
        match self {
            ColorFeatures::Rgb(rgb) => rgb,
            ColorFeatures::SphericalHarmonics { coefficients, .. } => coefficients,
        }
    }
}


/// one splat, scale already exponentiated, opacity already activated and the
/// rotation a unit quaternion in (r, x, y, z) order
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct Splat {
    pub position: [f32; 3],
    pub scale: [f32; 3],
    pub rotation: [f32; 4],
    pub opacity: f32,
    pub color: [f32; 3],
}


/// host-owned struct of arrays, immutable for the duration of a frame
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct SplatCloud {
    pub positions: Vec<f32>,
    pub scales: Vec<f32>,
    pub rotations: Vec<f32>,
    pub opacities: Vec<f32>,
    pub colors: ColorFeatures,
}

impl Default for SplatCloud {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            scales: Vec::new(),
            rotations: Vec::new(),
            opacities: Vec::new(),
            colors: ColorFeatures::Rgb(Vec::new()),
        }
    }
}

impl SplatCloud {
    pub fn len(&self) -> usize {
        self.opacities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opacities.is_empty()
    }

    pub fn from_splats(splats: impl IntoIterator<Item = Splat>) -> Self {
        let mut cloud = SplatCloud::default();
        let mut colors = Vec::new();

        for splat in splats {
            cloud.positions.extend_from_slice(&splat.position);
            cloud.scales.extend_from_slice(&splat.scale);
            cloud.rotations.extend_from_slice(&splat.rotation);
            cloud.opacities.push(splat.opacity);
            colors.extend_from_slice(&splat.color);
        }

        cloud.colors = ColorFeatures::Rgb(colors);
        cloud
    }

    /// lattice of `count_per_axis`³ small grey splats filling an axis aligned box
    pub fn cube(origin: [f32; 3], side: [f32; 3], count_per_axis: usize) -> Self {
        let n = count_per_axis.max(1);
        let spacing = side
            .iter()
            .map(|s| s / n as f32)
            .fold(f32::INFINITY, f32::min);

        let splats = (0..n * n * n).map(|index| {
            let i = index / (n * n);
            let j = (index / n) % n;
            let k = index % n;
            let lattice = [i, j, k].map(|v| v as f32 / n as f32);

            Splat {
                position: [
                    origin[0] + side[0] * lattice[0],
                    origin[1] + side[1] * lattice[1],
                    origin[2] + side[2] * lattice[2],
                ],
                scale: [spacing * 0.25; 3],
                rotation: [1.0, 0.0, 0.0, 0.0],
                opacity: 0.8,
                color: lattice,
            }
        });

        SplatCloud::from_splats(splats)
    }

    pub fn splat(&self, index: usize) -> Option<Splat> {
        if index >= self.len() {
            return None;
        }

        let color = match &self.colors {
            ColorFeatures::Rgb(rgb) => [rgb[3 * index], rgb[3 * index + 1], rgb[3 * index + 2]],
            ColorFeatures::SphericalHarmonics { .. } => [0.0; 3],
        };

        Some(Splat {
            position: [
                self.positions[3 * index],
                self.positions[3 * index + 1],
                self.positions[3 * index + 2],
            ],
            scale: [
                self.scales[3 * index],
                self.scales[3 * index + 1],
                self.scales[3 * index + 2],
            ],
            rotation: [
                self.rotations[4 * index],
                self.rotations[4 * index + 1],
                self.rotations[4 * index + 2],
                self.rotations[4 * index + 3],
            ],
            opacity: self.opacities[index],
            color,
        })
    }

    pub fn validate(&self) -> SplatResult<()> {
        let count = self.len();

        SplatError::check_len("positions", 3 * count, self.positions.len())?;
        SplatError::check_len("scales", 3 * count, self.scales.len())?;
        SplatError::check_len("rotations", 4 * count, self.rotations.len())?;
        SplatError::check_len("colors", self.colors.stride() * count, self.colors.data().len())?;

        if let ColorFeatures::SphericalHarmonics { degree, .. } = &self.colors {
            if *degree > MAX_SH_DEGREE {
                return Err(SplatError::UnsupportedShDegree(*degree));
            }
        }

        Ok(())
    }
}


/// device copy of a splat cloud's geometric attributes
#[derive(Debug)]
pub struct SplatBuffers {
    pub count: usize,
    pub positions: DeviceBuffer<f32>,
    pub scales: DeviceBuffer<f32>,
    pub rotations: DeviceBuffer<f32>,
    pub opacities: DeviceBuffer<f32>,
    pub features: DeviceBuffer<f32>,

    /// degree of `features`, none when the cloud carries plain rgb
    pub sh_degree: Option<usize>,

    /// evaluated rgb feature per splat
    pub colors: DeviceBuffer<f32>,
}

impl SplatBuffers {
    pub fn upload(cloud: &SplatCloud) -> SplatResult<Self> {
        cloud.validate()?;

        let count = cloud.len();
        let (features, sh_degree, colors) = match &cloud.colors {
            ColorFeatures::Rgb(rgb) => (DeviceBuffer::new(0), None, DeviceBuffer::from_slice(rgb)),
            ColorFeatures::SphericalHarmonics { degree, coefficients } => (
                DeviceBuffer::from_slice(coefficients),
                Some(*degree),
                DeviceBuffer::new(3 * count),
            ),
        };

        Ok(Self {
            count,
            positions: DeviceBuffer::from_slice(&cloud.positions),
            scales: DeviceBuffer::from_slice(&cloud.scales),
            rotations: DeviceBuffer::from_slice(&cloud.rotations),
            opacities: DeviceBuffer::from_slice(&cloud.opacities),
            features,
            sh_degree,
            colors,
        })
    }

    pub fn size_in_bytes(&self) -> usize {
        self.positions.size_in_bytes()
            + self.scales.size_in_bytes()
            + self.rotations.size_in_bytes()
            + self.opacities.size_in_bytes()
            + self.features.size_in_bytes()
            + self.colors.size_in_bytes()
    }
}
