use clap::Parser;
use serde::{
    Deserialize,
    Serialize,
};

use crate::projector::ProjectionMode;


#[derive(
    Debug,
    Clone,
    Serialize,
    Deserialize,
    Parser,
)]
#[command(about = "gaussian_tile_splatter offline renderer", version, long_about = None)]
pub struct SplatRenderArgs {
    /// ply file to render, a synthetic cloud is generated when empty
    #[arg(long, default_value = "")]
    pub input_file: String,

    #[arg(long, default_value = "splat_render.png")]
    pub output_file: String,

    /// json `RasterSettings`, overrides the size and projection flags
    #[arg(long, default_value = "")]
    pub settings_file: String,

    /// json `Camera`, overrides the look-at flags
    #[arg(long, default_value = "")]
    pub camera_file: String,

    #[arg(long, default_value = "800")]
    pub width: u32,

    #[arg(long, default_value = "600")]
    pub height: u32,

    #[arg(long, value_delimiter = ',', default_value = "0,0,-5")]
    pub camera_position: Vec<f32>,

    #[arg(long, value_delimiter = ',', default_value = "0,0,0")]
    pub camera_target: Vec<f32>,

    #[arg(long, default_value = "60.0")]
    pub fov: f32,

    #[arg(long, value_enum, default_value_t = ProjectionMode::TangentFov)]
    pub projection: ProjectionMode,

    /// synthetic splats when no input file is given
    #[arg(long, default_value = "10000")]
    pub gaussian_count: usize,

    /// splats per axis of a lattice cube instead of a random cloud
    #[arg(long, default_value = "0")]
    pub cube: usize,

    #[arg(long, default_value = "0")]
    pub seed: u64,

    #[arg(long, default_value = "info")]
    pub log_filter: String,
}

impl Default for SplatRenderArgs {
    fn default() -> SplatRenderArgs {
        SplatRenderArgs {
            input_file: "".to_string(),
            output_file: "splat_render.png".to_string(),
            settings_file: "".to_string(),
            camera_file: "".to_string(),
            width: 800,
            height: 600,
            camera_position: vec![0.0, 0.0, -5.0],
            camera_target: vec![0.0, 0.0, 0.0],
            fov: 60.0,
            projection: ProjectionMode::TangentFov,
            gaussian_count: 10000,
            cube: 0,
            seed: 0,
            log_filter: "info".to_string(),
        }
    }
}


/// installs the fmt subscriber, `RUST_LOG` takes precedence over `default_filter`
#[cfg(feature = "tooling")]
pub fn setup_hooks(default_filter: &str) {
    use tracing_subscriber::{
        EnvFilter,
        fmt,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
