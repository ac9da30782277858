use std::sync::Arc;

use bevy_math::{
    UVec2,
    Vec2,
    Vec3,
    Vec4,
};
use tracing::debug;

use crate::{
    device::{
        BLOCK_SIZE,
        BufferView,
        Device,
        Kernel,
        Workgroup,
        registry::kernel_set,
    },
    error::{
        SplatError,
        SplatResult,
    },
    parallel::{
        PrefixScan,
        RadixSort,
    },
    projector::{
        CovarianceSpace,
        NEAR_PLANE,
        ScreenSplats,
    },
    render::{
        RenderTarget,
        TileBuffers,
        tiles::{
            get_rect,
            instance_key,
            key_tile,
            ndc2pix,
        },
    },
};


/// added to the 2D covariance diagonal so every splat covers at least a pixel
pub const LOW_PASS: f32 = 0.3;

/// lower bound of the eigenvalue discriminant
pub const MIN_DISCRIMINANT: f32 = 0.1;

pub const MAX_ALPHA: f32 = 0.99;
pub const MIN_ALPHA: f32 = 1.0 / 255.0;
pub const MIN_TRANSMITTANCE: f32 = 1e-4;

const KEY_BITS: u32 = u64::BITS;

/// instance offsets and splat ids are stored as `u32`
pub const MAX_INSTANCES: usize = u32::MAX as usize;


/// conic (inverse covariance upper triangle) and screen radius of a pixel space
/// covariance, after the low-pass filter
pub fn conic_and_radius(covariance: [f32; 3]) -> ([f32; 3], i32) {
    let c00 = covariance[0] + LOW_PASS;
    let c01 = covariance[1];
    let c11 = covariance[2] + LOW_PASS;

    let det = c00 * c11 - c01 * c01;
    let det_inv = 1.0 / (det + 1e-6);
    let conic = [c11 * det_inv, -c01 * det_inv, c00 * det_inv];

    let mid = 0.5 * (c00 + c11);
    let discriminant = (mid * mid - det).max(MIN_DISCRIMINANT).sqrt();
    let lambda = (mid + discriminant).max(mid - discriminant);
    let radius = (3.0 * lambda.sqrt()).ceil() as i32;

    (conic, radius)
}


#[derive(Clone, Copy, Debug)]
struct PixelState {
    transmittance: f32,
    color: Vec3,
    inside: bool,
    done: bool,
    contributor: u32,
    last_contributor: u32,
}

impl Default for PixelState {
    fn default() -> Self {
        Self {
            transmittance: 1.0,
            color: Vec3::ZERO,
            inside: false,
            done: true,
            contributor: 0,
            last_contributor: 0,
        }
    }
}

/// instances of one chunk staged into workgroup shared memory
struct SharedChunk {
    ids: [u32; BLOCK_SIZE],
    means: [Vec2; BLOCK_SIZE],
    conic_opacity: [Vec4; BLOCK_SIZE],
}

impl PixelState {
    fn blend(&mut self, pixel: Vec2, chunk: &SharedChunk, count: usize, colors: BufferView<'_, f32>) {
        for j in 0..count {
            if self.done {
                break;
            }

            self.contributor += 1;

            let d = chunk.means[j] - pixel;
            let con_o = chunk.conic_opacity[j];
            let power = -0.5 * (con_o.x * d.x * d.x + con_o.z * d.y * d.y) - con_o.y * d.x * d.y;
            if power > 0.0 {
                continue;
            }

            let alpha = (con_o.w * power.exp()).min(MAX_ALPHA);
            if alpha < MIN_ALPHA {
                continue;
            }

            let test_t = self.transmittance * (1.0 - alpha);
            if test_t < MIN_TRANSMITTANCE {
                self.done = true;
                continue;
            }

            let id = chunk.ids[j] as usize;
            let feature = Vec3::new(
                colors.read(3 * id),
                colors.read(3 * id + 1),
                colors.read(3 * id + 2),
            );

            self.color += feature * alpha * self.transmittance;
            self.transmittance = test_t;
            self.last_contributor = self.contributor;
        }
    }
}


struct RasterKernels {
    allocate: Kernel,
    duplicate: Kernel,
    ranges: Kernel,
    render: Kernel,
    clear: Kernel,
    offset_wraps: Kernel,
}

impl RasterKernels {
    fn compile() -> Self {
        Self {
            allocate: Kernel::linear("allocate_tiles"),
            duplicate: Kernel::linear("duplicate_with_keys"),
            ranges: Kernel::linear("identify_tile_ranges"),
            render: Kernel::tiled("render_tiles"),
            clear: Kernel::linear("clear_image"),
            offset_wraps: Kernel::linear("count_offset_wraps"),
        }
    }
}


/// sort-based tile rasterizer
///
/// a frame is a fixed sequence of dispatches: allocate tile footprints, scan
/// them into instance offsets, read back the instance count, duplicate one keyed
/// instance per (splat, tile) overlap, sort by (tile, depth), extract per-tile
/// ranges and composite each tile front to back.
pub struct TileRasterizer {
    scan: PrefixScan<u32>,
    sort: RadixSort<u64, u32>,
    kernels: Arc<RasterKernels>,
}

impl Default for TileRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TileRasterizer {
    pub fn new() -> Self {
        Self {
            scan: PrefixScan::new(),
            sort: RadixSort::new(),
            kernels: kernel_set(RasterKernels::compile),
        }
    }

    /// rasterize projected splats into `buffers.image`, returning the number of
    /// tile instances rendered
    ///
    /// an instance list larger than the buffers' capacity is reported before any
    /// instance is written; the caller may reserve more and retry the frame.
    pub fn forward(
        &self,
        device: &Device,
        buffers: &mut TileBuffers,
        screen: &ScreenSplats,
        colors: BufferView<'_, f32>,
        opacities: BufferView<'_, f32>,
        target: &RenderTarget,
    ) -> SplatResult<usize> {
        let count = screen.count;
        SplatError::check_len("colors", 3 * count, colors.len())?;
        SplatError::check_len("opacities", count, opacities.len())?;

        buffers.prepare(count, target);
        let buffers = &*buffers;
        let grid = buffers.grid;

        let num_rendered = if count == 0 {
            0
        } else {
            self.allocate(device, screen, target, grid, buffers);

            let offsets = buffers.offsets.view();
            self.scan.inclusive_sum(
                device,
                buffers.scratch.view(),
                buffers.tiles_touched.view(),
                offsets,
                0,
                count,
            );

            let total = device.read_scalar(offsets, count - 1);

            let tiles = grid.x as usize * grid.y as usize;
            if count.saturating_mul(tiles) > MAX_INSTANCES {
                self.unwrapped_total(device, offsets, count, buffers.scratch.view(), total)
            } else {
                total as usize
            }
        };

        debug!(count, num_rendered, grid = ?grid, "allocated tile instances");

        let capacity = buffers.instance_capacity();
        if num_rendered > capacity.min(MAX_INSTANCES) {
            return Err(SplatError::InstanceCapacity {
                required: num_rendered,
                capacity,
            });
        }

        if num_rendered == 0 {
            self.clear(device, target, buffers);
            return Ok(0);
        }

        self.duplicate_with_keys(
            device,
            screen,
            grid,
            buffers.radii.view(),
            buffers.offsets.view(),
            buffers.keys_unsorted.view(),
            buffers.values_unsorted.view(),
            num_rendered,
        );

        self.sort.sort_pairs(
            device,
            buffers.scratch.view(),
            buffers.keys_unsorted.view(),
            buffers.values_unsorted.view(),
            buffers.keys.view(),
            buffers.values.view(),
            num_rendered,
            KEY_BITS,
        );

        self.identify_tile_ranges(
            device,
            buffers.keys.view(),
            num_rendered,
            buffers.ranges.view(),
        );

        self.render_tiles(device, screen, colors, opacities, target, buffers);

        Ok(num_rendered)
    }

    /// per splat radius, touched tile count, pixel mean and conic
    fn allocate(
        &self,
        device: &Device,
        screen: &ScreenSplats,
        target: &RenderTarget,
        grid: UVec2,
        buffers: &TileBuffers,
    ) {
        let means = screen.means_2d.view();
        let depths = screen.depths.view();
        let conics = screen.conics.view();
        let radii = buffers.radii.view();
        let touched = buffers.tiles_touched.view();

        let (width, height) = (target.width, target.height);
        let ndc_scale = match screen.space {
            CovarianceSpace::Ndc => {
                let (w, h) = (width as f32, height as f32);
                [0.25 * w * w, 0.25 * w * h, 0.25 * h * h]
            }
            CovarianceSpace::Pixel => [1.0; 3],
        };

        device.dispatch(&self.kernels.allocate, screen.count, |index| {
            radii.write(index, 0);
            touched.write(index, 0);

            let depth = depths.read(index);
            if depth.is_nan() || depth < NEAR_PLANE {
                return;
            }

            let covariance = [0, 1, 2].map(|k| conics.read(3 * index + k) * ndc_scale[k]);
            let (conic, radius) = conic_and_radius(covariance);

            let pixel = Vec2::new(
                ndc2pix(means.read(2 * index), width),
                ndc2pix(means.read(2 * index + 1), height),
            );
            let (rect_min, rect_max) = get_rect(pixel, radius, grid);
            let tiles = (rect_max.x - rect_min.x) * (rect_max.y - rect_min.y);

            if radius <= 0 || tiles == 0 {
                return;
            }

            means.write(2 * index, pixel.x);
            means.write(2 * index + 1, pixel.y);
            for (k, value) in conic.into_iter().enumerate() {
                conics.write(3 * index + k, value);
            }
            radii.write(index, radius);
            touched.write(index, tiles);
        });
    }

    /// exact instance count of a frame whose `u32` offsets may have wrapped
    ///
    /// a splat touches fewer than 2^32 tiles, so every wrap of the inclusive scan
    /// shows up as an offset smaller than its predecessor.
    fn unwrapped_total(
        &self,
        device: &Device,
        offsets: BufferView<'_, u32>,
        count: usize,
        scratch: BufferView<'_, u32>,
        wrapped_total: u32,
    ) -> usize {
        let wraps = scratch.subview(0, 1);
        device.fill(wraps, 0);

        device.dispatch(&self.kernels.offset_wraps, count, |index| {
            if index > 0 && offsets.read(index) < offsets.read(index - 1) {
                wraps.atomic_add(0, 1);
            }
        });

        let wraps = device.read_scalar(wraps, 0) as u64;
        let total = (wraps << u32::BITS) | wrapped_total as u64;
        debug!(wraps, total, "instance offsets wrapped");

        usize::try_from(total).unwrap_or(usize::MAX)
    }

    /// write one (tile | depth) keyed instance per tile a splat overlaps, starting
    /// at the splat's exclusive offset
    #[allow(clippy::too_many_arguments)]
    pub fn duplicate_with_keys(
        &self,
        device: &Device,
        screen: &ScreenSplats,
        grid: UVec2,
        radii: BufferView<'_, i32>,
        offsets: BufferView<'_, u32>,
        keys: BufferView<'_, u64>,
        values: BufferView<'_, u32>,
        num_rendered: usize,
    ) {
        device.fill(keys.subview(0, num_rendered), 0);
        device.fill(values.subview(0, num_rendered), 0);

        let means = screen.means_2d.view();
        let depths = screen.depths.view();

        device.dispatch(&self.kernels.duplicate, screen.count, |index| {
            let radius = radii.read(index);
            if radius <= 0 {
                return;
            }

            let mut offset = if index == 0 { 0 } else { offsets.read(index - 1) as usize };
            let depth = depths.read(index);
            let pixel = Vec2::new(means.read(2 * index), means.read(2 * index + 1));
            let (rect_min, rect_max) = get_rect(pixel, radius, grid);

            for y in rect_min.y..rect_max.y {
                for x in rect_min.x..rect_max.x {
                    keys.write(offset, instance_key(y * grid.x + x, depth));
                    values.write(offset, index as u32);
                    offset += 1;
                }
            }
        });
    }

    /// `ranges[2 * tile..2 * tile + 2]` becomes the tile's `[start, end)` in the
    /// sorted keys, untouched tiles stay `[0, 0)`
    pub fn identify_tile_ranges(
        &self,
        device: &Device,
        keys: BufferView<'_, u64>,
        num_rendered: usize,
        ranges: BufferView<'_, u32>,
    ) {
        device.fill(ranges, 0);

        device.dispatch(&self.kernels.ranges, num_rendered, |index| {
            let tile = key_tile(keys.read(index)) as usize;

            if index == 0 {
                ranges.write(2 * tile, 0);
            } else {
                let previous = key_tile(keys.read(index - 1)) as usize;
                if tile != previous {
                    ranges.write(2 * previous + 1, index as u32);
                    ranges.write(2 * tile, index as u32);
                }
            }

            if index == num_rendered - 1 {
                ranges.write(2 * tile + 1, num_rendered as u32);
            }
        });
    }

    fn render_tiles(
        &self,
        device: &Device,
        screen: &ScreenSplats,
        colors: BufferView<'_, f32>,
        opacities: BufferView<'_, f32>,
        target: &RenderTarget,
        buffers: &TileBuffers,
    ) {
        let grid = buffers.grid;
        let ranges = buffers.ranges.view();
        let values = buffers.values.view();
        let means = screen.means_2d.view();
        let conics = screen.conics.view();
        let image = buffers.image.view();
        let final_t = buffers.transmittance.view();
        let n_contrib = buffers.n_contrib.view();

        let (width, height) = (target.width, target.height);
        let plane = target.pixels();
        let background = Vec3::from_array(target.background);

        device.dispatch_groups(&self.kernels.render, [grid.x, grid.y], |group: &Workgroup| {
            let [tile_x, tile_y] = group.id();
            let tile = (tile_y * grid.x + tile_x) as usize;
            let start = ranges.read(2 * tile) as usize;
            let end = (ranges.read(2 * tile + 1) as usize).max(start);

            let mut pixels = [PixelState::default(); BLOCK_SIZE];
            let mut chunk = SharedChunk {
                ids: [0; BLOCK_SIZE],
                means: [Vec2::ZERO; BLOCK_SIZE],
                conic_opacity: [Vec4::ZERO; BLOCK_SIZE],
            };

            group.phase(|thread| {
                let [x, y] = group.global_xy(thread);
                let inside = x < width && y < height;
                pixels[thread].inside = inside;
                pixels[thread].done = !inside;
            });

            let mut to_do = end - start;
            for round in 0..(end - start).div_ceil(BLOCK_SIZE) {
                if pixels.iter().all(|pixel| pixel.done) {
                    break;
                }

                group.phase(|thread| {
                    let progress = start + round * BLOCK_SIZE + thread;
                    if progress < end {
                        let id = values.read(progress) as usize;
                        chunk.ids[thread] = id as u32;
                        chunk.means[thread] = Vec2::new(means.read(2 * id), means.read(2 * id + 1));
                        chunk.conic_opacity[thread] = Vec4::new(
                            conics.read(3 * id),
                            conics.read(3 * id + 1),
                            conics.read(3 * id + 2),
                            opacities.read(id),
                        );
                    }
                });

                let batch = to_do.min(BLOCK_SIZE);
                group.phase(|thread| {
                    let [x, y] = group.global_xy(thread);
                    let pixel = Vec2::new(x as f32, y as f32);
                    pixels[thread].blend(pixel, &chunk, batch, colors);
                });
                to_do -= batch;
            }

            group.phase(|thread| {
                let state = &pixels[thread];
                if !state.inside {
                    return;
                }

                let [x, y] = group.global_xy(thread);
                let pixel = y as usize * width as usize + x as usize;
                let rgb = state.color + state.transmittance * background;

                for (channel, value) in rgb.to_array().into_iter().enumerate() {
                    image.write(channel * plane + pixel, value);
                }
                final_t.write(pixel, state.transmittance);
                n_contrib.write(pixel, state.last_contributor);
            });
        });
    }

    /// background fill for frames without instances
    fn clear(&self, device: &Device, target: &RenderTarget, buffers: &TileBuffers) {
        let image = buffers.image.view();
        let final_t = buffers.transmittance.view();
        let n_contrib = buffers.n_contrib.view();
        let plane = target.pixels();
        let background = target.background;

        device.dispatch(&self.kernels.clear, plane, |pixel| {
            for (channel, value) in background.into_iter().enumerate() {
                image.write(channel * plane + pixel, value);
            }
            final_t.write(pixel, 1.0);
            n_contrib.write(pixel, 0);
        });
    }
}
