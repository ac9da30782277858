use std::sync::Arc;

use bevy_math::Vec3;
use tracing::debug;

use crate::{
    device::{
        Device,
        Kernel,
        registry::kernel_set,
    },
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::SplatBuffers,
};


pub const fn num_sh_coefficients(degree: usize) -> usize {
    if degree == 0 {
        1
    } else {
        2 * degree + 1 + num_sh_coefficients(degree - 1)
    }
}

pub const MAX_SH_DEGREE: usize = 3;
pub const SH_CHANNELS: usize = 3;
pub const MAX_SH_COEFF_COUNT: usize = num_sh_coefficients(MAX_SH_DEGREE);

const SH_C0: f32 = 0.282_094_8;
const SH_C1: f32 = 0.488_602_5;
const SH_C2: [f32; 5] = [
    1.092_548_4,
    -1.092_548_4,
    0.315_391_57,
    -1.092_548_4,
    0.546_274_2,
];
const SH_C3: [f32; 7] = [
    -0.590_043_6,
    2.890_611_4,
    -0.457_045_8,
    0.373_176_33,
    -0.457_045_8,
    1.445_305_7,
    -0.590_043_6,
];


/// radiance seen from `dir` (unit length, splat minus camera) for one splat's
/// coefficients, shifted by one half and clamped to be non-negative
pub fn evaluate_sh(degree: usize, dir: Vec3, coefficients: &[Vec3]) -> Vec3 {
    let mut result = SH_C0 * coefficients[0];

    if degree > 0 {
        let Vec3 { x, y, z } = dir;

        result += -SH_C1 * y * coefficients[1]
            + SH_C1 * z * coefficients[2]
            - SH_C1 * x * coefficients[3];

        if degree > 1 {
            let (xx, yy, zz) = (x * x, y * y, z * z);
            let (xy, yz, xz) = (x * y, y * z, x * z);

            result += SH_C2[0] * xy * coefficients[4]
                + SH_C2[1] * yz * coefficients[5]
                + SH_C2[2] * (2.0 * zz - xx - yy) * coefficients[6]
                + SH_C2[3] * xz * coefficients[7]
                + SH_C2[4] * (xx - yy) * coefficients[8];

            if degree > 2 {
                result += SH_C3[0] * y * (3.0 * xx - yy) * coefficients[9]
                    + SH_C3[1] * xy * z * coefficients[10]
                    + SH_C3[2] * y * (4.0 * zz - xx - yy) * coefficients[11]
                    + SH_C3[3] * z * (2.0 * zz - 3.0 * xx - 3.0 * yy) * coefficients[12]
                    + SH_C3[4] * x * (4.0 * zz - xx - yy) * coefficients[13]
                    + SH_C3[5] * z * (xx - yy) * coefficients[14]
                    + SH_C3[6] * x * (xx - 3.0 * yy) * coefficients[15];
            }
        }
    }

    (result + 0.5).max(Vec3::ZERO)
}


struct ShKernels {
    evaluate: Kernel,
}


/// fills `SplatBuffers::colors` from the spherical harmonic features, one work
/// item per splat
pub struct ShEvaluator {
    kernels: Arc<ShKernels>,
}

impl Default for ShEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShEvaluator {
    pub fn new() -> Self {
        Self {
            kernels: kernel_set(|| ShKernels {
                evaluate: Kernel::linear("evaluate_sh"),
            }),
        }
    }

    /// no-op for clouds that already carry rgb
    pub fn evaluate(
        &self,
        device: &Device,
        splats: &SplatBuffers,
        camera_position: Vec3,
    ) -> SplatResult<()> {
        let Some(degree) = splats.sh_degree else {
            return Ok(());
        };

        if degree > MAX_SH_DEGREE {
            return Err(SplatError::UnsupportedShDegree(degree));
        }

        let count = splats.count;
        let stride = num_sh_coefficients(degree) * SH_CHANNELS;
        SplatError::check_len("features", stride * count, splats.features.len())?;
        SplatError::check_len("colors", SH_CHANNELS * count, splats.colors.len())?;

        debug!(count, degree, "evaluating spherical harmonics");

        let positions = splats.positions.view();
        let features = splats.features.view();
        let colors = splats.colors.view();

        device.dispatch(&self.kernels.evaluate, count, |index| {
            let position = Vec3::new(
                positions.read(3 * index),
                positions.read(3 * index + 1),
                positions.read(3 * index + 2),
            );
            let dir = (position - camera_position).normalize_or_zero();

            let base = index * stride;
            let mut coefficients = [Vec3::ZERO; MAX_SH_COEFF_COUNT];
            for (k, coefficient) in coefficients
                .iter_mut()
                .take(stride / SH_CHANNELS)
                .enumerate()
            {
                let offset = base + k * SH_CHANNELS;
                *coefficient = Vec3::new(
                    features.read(offset),
                    features.read(offset + 1),
                    features.read(offset + 2),
                );
            }

            let rgb = evaluate_sh(degree, dir, &coefficients);
            colors.write(3 * index, rgb.x);
            colors.write(3 * index + 1, rgb.y);
            colors.write(3 * index + 2, rgb.z);
        });

        Ok(())
    }
}
