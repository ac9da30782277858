pub use camera::Camera;
pub use error::{
    SplatError,
    SplatResult,
};
pub use gaussian::{
    ColorFeatures,
    Splat,
    SplatBuffers,
    SplatCloud,
};
pub use projector::{
    GaussianProjector,
    ProjectionMode,
    ScreenSplats,
};
pub use render::{
    RenderOutput,
    RenderTarget,
    Renderer,
    TileBuffers,
    TileRasterizer,
};
pub use settings::RasterSettings;

pub mod camera;
pub mod device;
pub mod error;
pub mod gaussian;
pub mod io;
pub mod material;
pub mod math;
pub mod parallel;
pub mod projector;
pub mod render;
pub mod settings;
pub mod utils;
