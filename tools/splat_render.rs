use std::{
    fs::File,
    io::BufReader,
    time::Instant,
};

use anyhow::{
    Context,
    bail,
};
use bevy_math::Vec3;
use byte_unit::{
    Byte,
    UnitType,
};
use clap::Parser;
use tracing::info;

use gaussian_tile_splatter::{
    Camera,
    RasterSettings,
    Renderer,
    SplatCloud,
    gaussian::rand::seeded_splats,
    io::ply::parse_ply,
    utils::{
        SplatRenderArgs,
        setup_hooks,
    },
};


fn vec3_arg(name: &str, values: &[f32]) -> anyhow::Result<Vec3> {
    match values {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => bail!("--{name} expects three comma separated values, got {values:?}"),
    }
}

fn load_cloud(args: &SplatRenderArgs) -> anyhow::Result<SplatCloud> {
    if !args.input_file.is_empty() {
        let file = File::open(&args.input_file)
            .with_context(|| format!("failed to open `{}`", args.input_file))?;
        let mut reader = BufReader::new(file);

        return parse_ply(&mut reader).with_context(|| format!("failed to parse `{}`", args.input_file));
    }

    if args.cube > 0 {
        return Ok(SplatCloud::cube([-1.0; 3], [2.0; 3], args.cube));
    }

    Ok(seeded_splats(args.gaussian_count, args.seed))
}

fn load_settings(args: &SplatRenderArgs) -> anyhow::Result<RasterSettings> {
    if !args.settings_file.is_empty() {
        return RasterSettings::load(&args.settings_file)
            .with_context(|| format!("failed to load settings `{}`", args.settings_file));
    }

    Ok(RasterSettings {
        width: args.width,
        height: args.height,
        projection: args.projection,
        ..Default::default()
    })
}

fn load_camera(args: &SplatRenderArgs, settings: &RasterSettings) -> anyhow::Result<Camera> {
    let camera = if !args.camera_file.is_empty() {
        let json = std::fs::read_to_string(&args.camera_file)
            .with_context(|| format!("failed to read camera `{}`", args.camera_file))?;
        serde_json::from_str::<Camera>(&json)?
    } else {
        Camera::look_at(
            vec3_arg("camera-position", &args.camera_position)?,
            vec3_arg("camera-target", &args.camera_target)?,
            Vec3::Y,
        )
        .with_fov(args.fov)
    };

    Ok(match camera.resolution {
        Some(_) => camera,
        None => camera.with_resolution(settings.width, settings.height),
    })
}

fn main() -> anyhow::Result<()> {
    let args = SplatRenderArgs::parse();
    setup_hooks(&args.log_filter);

    let cloud = load_cloud(&args)?;
    let settings = load_settings(&args)?;
    let camera = load_camera(&args, &settings)?;

    info!(splats = cloud.len(), width = settings.width, height = settings.height, "loaded scene");

    let mut renderer = Renderer::new(settings)?;

    let start = Instant::now();
    let output = renderer.render(&cloud, &camera)?;
    let elapsed = start.elapsed();

    let buffer_bytes = Byte::from_u64(renderer.buffers().size_in_bytes() as u64);
    info!(
        elapsed = ?elapsed,
        num_rendered = output.num_rendered,
        stats = ?renderer.device().stats(),
        buffers = %buffer_bytes.get_appropriate_unit(UnitType::Binary),
        "rendered",
    );

    let image = image::RgbImage::from_raw(output.width, output.height, output.to_rgb8())
        .context("rendered image does not match its dimensions")?;
    image
        .save(&args.output_file)
        .with_context(|| format!("failed to write `{}`", args.output_file))?;

    let file_bytes = Byte::from_u64(std::fs::metadata(&args.output_file)?.len());
    info!(
        path = %args.output_file,
        size = %file_bytes.get_appropriate_unit(UnitType::Decimal),
        "wrote image",
    );

    Ok(())
}
