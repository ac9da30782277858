use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    info,
};

use crate::{
    camera::Camera,
    device::Device,
    error::{
        SplatError,
        SplatResult,
    },
    gaussian::{
        SplatBuffers,
        SplatCloud,
    },
    material::spherical_harmonics::ShEvaluator,
    projector::{
        GaussianProjector,
        ProjectionMode,
        ScreenSplats,
    },
    render::{
        RenderTarget,
        TileBuffers,
        TileRasterizer,
        rasterizer::MAX_INSTANCES,
    },
    settings::RasterSettings,
};


/// host copy of a rendered frame
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct RenderOutput {
    pub width: u32,
    pub height: u32,

    /// planar rgb, `image[c * H * W + y * W + x]`, row 0 at NDC y = -1
    pub image: Vec<f32>,
    pub radii: Vec<i32>,
    pub num_rendered: usize,
    pub transmittance: Vec<f32>,
    pub n_contrib: Vec<u32>,
}

impl RenderOutput {
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let plane = self.pixels();
        let index = y as usize * self.width as usize + x as usize;
        [0, 1, 2].map(|channel| self.image[channel * plane + index])
    }

    /// interleaved 8-bit rgb with the top row first
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(3 * self.pixels());

        for y in (0..self.height).rev() {
            for x in 0..self.width {
                rgb.extend(
                    self.pixel(x, y).map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8),
                );
            }
        }

        rgb
    }
}


/// frame orchestration over a single device
///
/// owns the per-frame buffers and reuses them across frames. a frame that
/// overflows the instance capacity is rendered again from projection onward
/// after growing the capacity, when the settings allow it.
pub struct Renderer {
    device: Device,
    settings: RasterSettings,
    sh: ShEvaluator,
    projector: GaussianProjector,
    rasterizer: TileRasterizer,
    screen: ScreenSplats,
    buffers: TileBuffers,
}

impl Renderer {
    pub fn new(settings: RasterSettings) -> SplatResult<Self> {
        let device = Device::new(settings.device())?;

        Ok(Self {
            device,
            buffers: TileBuffers::new(settings.instance_capacity),
            settings,
            sh: ShEvaluator::new(),
            projector: GaussianProjector::new(),
            rasterizer: TileRasterizer::new(),
            screen: ScreenSplats::default(),
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn settings(&self) -> &RasterSettings {
        &self.settings
    }

    pub fn buffers(&self) -> &TileBuffers {
        &self.buffers
    }

    pub fn render(&mut self, cloud: &SplatCloud, camera: &Camera) -> SplatResult<RenderOutput> {
        let splats = SplatBuffers::upload(cloud)?;
        self.render_buffers(&splats, camera)
    }

    pub fn render_buffers(&mut self, splats: &SplatBuffers, camera: &Camera) -> SplatResult<RenderOutput> {
        let target = self.settings.target();
        self.check_resolution(camera, &target)?;

        self.sh.evaluate(&self.device, splats, camera.position)?;

        let num_rendered = loop {
            match self.render_frame(splats, camera, &target) {
                Ok(num_rendered) => break num_rendered,
                Err(SplatError::InstanceCapacity { required, capacity })
                    if self.settings.grow_capacity && required <= MAX_INSTANCES =>
                {
                    let grown = required.next_power_of_two().min(MAX_INSTANCES);
                    info!(required, capacity, grown, "growing tile instance capacity");
                    self.buffers.reserve_instances(grown);
                }
                Err(err) => return Err(err),
            }
        };

        info!(
            splats = splats.count,
            num_rendered,
            width = target.width,
            height = target.height,
            "rendered frame",
        );

        Ok(self.read_output(splats.count, num_rendered, &target))
    }

    /// focal lengths are derived from the camera resolution while the rasterizer
    /// maps to target pixels, the two must agree
    fn check_resolution(&self, camera: &Camera, target: &RenderTarget) -> SplatResult<()> {
        if self.settings.projection != ProjectionMode::FocalLength {
            return Ok(());
        }

        match camera.resolution {
            Some(resolution) if resolution.x != target.width || resolution.y != target.height => {
                Err(SplatError::ResolutionMismatch {
                    camera_width: resolution.x,
                    camera_height: resolution.y,
                    target_width: target.width,
                    target_height: target.height,
                })
            }
            _ => Ok(()),
        }
    }

    fn render_frame(&mut self, splats: &SplatBuffers, camera: &Camera, target: &RenderTarget) -> SplatResult<usize> {
        self.projector.forward(
            &self.device,
            splats,
            camera,
            self.settings.scale_modifier,
            self.settings.projection,
            &mut self.screen,
        )?;

        self.rasterizer.forward(
            &self.device,
            &mut self.buffers,
            &self.screen,
            splats.colors.view(),
            splats.opacities.view(),
            target,
        )
    }

    fn read_output(&self, num_splats: usize, num_rendered: usize, target: &RenderTarget) -> RenderOutput {
        let pixels = target.pixels();
        debug!(stats = ?self.device.stats(), "reading back frame");

        RenderOutput {
            width: target.width,
            height: target.height,
            image: self.buffers.image.slice(0..3 * pixels).to_vec(),
            radii: self.buffers.radii.slice(0..num_splats).to_vec(),
            num_rendered,
            transmittance: self.buffers.transmittance.slice(0..pixels).to_vec(),
            n_contrib: self.buffers.n_contrib.slice(0..pixels).to_vec(),
        }
    }
}
