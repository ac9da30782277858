use serde::{
    Deserialize,
    Serialize,
};

pub mod buffers;
pub mod rasterizer;
pub mod renderer;
pub mod tiles;

pub use buffers::TileBuffers;
pub use rasterizer::TileRasterizer;
pub use renderer::{
    RenderOutput,
    Renderer,
};
pub use tiles::TileRange;


#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub background: [f32; 3],
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: [0.0; 3],
        }
    }

    pub fn with_background(mut self, background: [f32; 3]) -> Self {
        self.background = background;
        self
    }

    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
