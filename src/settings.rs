use std::path::Path;

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    device::DeviceSettings,
    error::SplatResult,
    projector::ProjectionMode,
    render::RenderTarget,
};


#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[serde(default)]
pub struct RasterSettings {
    pub width: u32,
    pub height: u32,
    pub background: [f32; 3],

    /// tile instances the rasterizer can hold before a frame reports a capacity error
    pub instance_capacity: usize,
    pub scale_modifier: f32,
    pub projection: ProjectionMode,

    /// on a capacity error, grow to the next power of two and render the frame again
    pub grow_capacity: bool,

    /// device worker threads, zero selects the rayon default
    pub threads: usize,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            background: [0.0; 3],
            instance_capacity: 1 << 20,
            scale_modifier: 1.0,
            projection: ProjectionMode::TangentFov,
            grow_capacity: true,
            threads: 0,
        }
    }
}

impl RasterSettings {
    pub fn from_json(json: &str) -> SplatResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> SplatResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn target(&self) -> RenderTarget {
        RenderTarget::new(self.width, self.height).with_background(self.background)
    }

    pub fn device(&self) -> DeviceSettings {
        DeviceSettings {
            threads: self.threads,
        }
    }
}
