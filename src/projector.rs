use std::sync::Arc;

use bevy_math::{
    Mat3,
    Mat4,
    Vec2,
    Vec3,
    Vec4,
};
use clap::ValueEnum;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::{
    camera::{
        Camera,
        Z_FAR,
        Z_NEAR,
    },
    device::{
        Device,
        DeviceBuffer,
        Kernel,
        registry::kernel_set,
    },
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::{
        SplatBuffers,
        covariance::{
            clamp_to_frustum,
            compute_covariance_2d,
            compute_covariance_3d,
        },
    },
};


/// view depth below which a splat contributes nothing
pub const NEAR_PLANE: f32 = 0.2;


#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ValueEnum,
)]
pub enum ProjectionMode {
    /// covariance in NDC² units, scaled to pixels by the rasterizer
    #[default]
    TangentFov,

    /// covariance in pixel² units, needs the camera resolution
    FocalLength,
}

impl ProjectionMode {
    pub fn space(self) -> CovarianceSpace {
        match self {
            ProjectionMode::TangentFov => CovarianceSpace::Ndc,
            ProjectionMode::FocalLength => CovarianceSpace::Pixel,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
)]
pub enum CovarianceSpace {
    #[default]
    Ndc,
    Pixel,
}


/// per-splat screen space attributes, recomputed every frame
///
/// the projector writes NDC means and the 2D covariance upper triangle; the
/// rasterizer's allocate phase overwrites them in place with pixel means and conics.
#[derive(Debug)]
pub struct ScreenSplats {
    pub count: usize,
    pub means_2d: DeviceBuffer<f32>,
    pub depths: DeviceBuffer<f32>,
    pub conics: DeviceBuffer<f32>,
    pub space: CovarianceSpace,
}

impl Default for ScreenSplats {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScreenSplats {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            means_2d: DeviceBuffer::new(2 * count),
            depths: DeviceBuffer::new(count),
            conics: DeviceBuffer::new(3 * count),
            space: CovarianceSpace::Ndc,
        }
    }

    /// grows the buffers to hold `count` splats and makes `count` current
    pub fn ensure(&mut self, count: usize) {
        let grown = self.means_2d.ensure_len(2 * count)
            | self.depths.ensure_len(count)
            | self.conics.ensure_len(3 * count);

        if grown {
            debug!(count, "grew screen splat buffers");
        }

        self.count = count;
    }

    pub fn size_in_bytes(&self) -> usize {
        self.means_2d.size_in_bytes() + self.depths.size_in_bytes() + self.conics.size_in_bytes()
    }
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedSplat {
    pub mean: Vec2,
    pub depth: f32,
    pub covariance: [f32; 3],
}

/// camera derived constants shared by every work item of a projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub tan_fov: Vec2,
    pub focal: Vec2,
    pub scale_modifier: f32,
    pub mode: ProjectionMode,
}

impl ProjectionParams {
    pub fn new(camera: &Camera, scale_modifier: f32, mode: ProjectionMode) -> SplatResult<Self> {
        let focal = match mode {
            ProjectionMode::TangentFov => Vec2::ONE,
            ProjectionMode::FocalLength => camera.focal().ok_or(SplatError::MissingResolution)?,
        };

        Ok(Self {
            view: camera.world_to_view(),
            projection: camera.projection(Z_NEAR, Z_FAR),
            tan_fov: camera.tan_fov(),
            focal,
            scale_modifier,
            mode,
        })
    }
}

/// EWA projection of one splat
///
/// the depth is always reported; splats in front of the near plane (or with a NaN
/// depth) get a zero mean and covariance.
pub fn project_splat(
    params: &ProjectionParams,
    position: Vec3,
    scale: Vec3,
    rotation: Vec4,
) -> ProjectedSplat {
    let p_view = params.view.transform_point3(position);
    let depth = p_view.z;

    if depth.is_nan() || depth < NEAR_PLANE {
        return ProjectedSplat {
            mean: Vec2::ZERO,
            depth,
            covariance: [0.0; 3],
        };
    }

    let p_hom = params.projection * p_view.extend(1.0);
    let p_w = 1.0 / (p_hom.w + 1e-6);
    let mean = Vec2::new(p_hom.x * p_w, p_hom.y * p_w);

    let cov_3d = compute_covariance_3d(rotation, scale * params.scale_modifier);
    let tan = params.tan_fov;
    let t = clamp_to_frustum(p_view, tan.x, tan.y);
    let [c00, c01, c11] = compute_covariance_2d(
        cov_3d,
        t,
        Mat3::from_mat4(params.view),
        (params.focal.x, params.focal.y),
    );

    let covariance = match params.mode {
        ProjectionMode::TangentFov => [
            c00 / (tan.x * tan.x),
            c01 / (tan.x * tan.y),
            c11 / (tan.y * tan.y),
        ],
        ProjectionMode::FocalLength => [c00, c01, c11],
    };

    ProjectedSplat {
        mean,
        depth,
        covariance,
    }
}


struct ProjectorKernels {
    forward: Kernel,
}


/// maps each 3D splat to a screen mean, 2D covariance and view depth
pub struct GaussianProjector {
    kernels: Arc<ProjectorKernels>,
}

impl Default for GaussianProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianProjector {
    pub fn new() -> Self {
        Self {
            kernels: kernel_set(|| ProjectorKernels {
                forward: Kernel::linear("project_gaussians"),
            }),
        }
    }

    pub fn forward(
        &self,
        device: &Device,
        splats: &SplatBuffers,
        camera: &Camera,
        scale_modifier: f32,
        mode: ProjectionMode,
        out: &mut ScreenSplats,
    ) -> SplatResult<()> {
        let params = ProjectionParams::new(camera, scale_modifier, mode)?;
        let count = splats.count;

        SplatError::check_len("positions", 3 * count, splats.positions.len())?;
        SplatError::check_len("scales", 3 * count, splats.scales.len())?;
        SplatError::check_len("rotations", 4 * count, splats.rotations.len())?;

        out.ensure(count);
        out.space = mode.space();

        debug!(count, mode = ?mode, "projecting splats");

        let positions = splats.positions.view();
        let scales = splats.scales.view();
        let rotations = splats.rotations.view();
        let means_2d = out.means_2d.view();
        let depths = out.depths.view();
        let conics = out.conics.view();

        device.dispatch(&self.kernels.forward, count, |index| {
            let position = Vec3::new(
                positions.read(3 * index),
                positions.read(3 * index + 1),
                positions.read(3 * index + 2),
            );
            let scale = Vec3::new(
                scales.read(3 * index),
                scales.read(3 * index + 1),
                scales.read(3 * index + 2),
            );
            let rotation = Vec4::new(
                rotations.read(4 * index),
                rotations.read(4 * index + 1),
                rotations.read(4 * index + 2),
                rotations.read(4 * index + 3),
            );

            let projected = project_splat(&params, position, scale, rotation);

            depths.write(index, projected.depth);
            means_2d.write(2 * index, projected.mean.x);
            means_2d.write(2 * index + 1, projected.mean.y);
            for (k, value) in projected.covariance.into_iter().enumerate() {
                conics.write(3 * index + k, value);
            }
        });

        Ok(())
    }
}
