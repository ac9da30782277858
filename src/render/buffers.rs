use bevy_math::UVec2;
use tracing::debug;

use crate::{
    device::DeviceBuffer,
    parallel::{
        radix::sort_temp_size,
        scan::inclusive_scan_temp_size,
    },
    render::{
        RenderTarget,
        tiles::tile_grid,
    },
};


/// device memory of the tile rasterizer, owned by the caller and reused across frames
///
/// per-splat, per-tile and per-pixel buffers grow on demand. the instance list
/// capacity only changes through `reserve_instances`.
#[derive(Debug)]
pub struct TileBuffers {
    pub grid: UVec2,

    pub radii: DeviceBuffer<i32>,
    pub tiles_touched: DeviceBuffer<u32>,

    /// inclusive scan of `tiles_touched`
    pub offsets: DeviceBuffer<u32>,

    pub keys_unsorted: DeviceBuffer<u64>,
    pub values_unsorted: DeviceBuffer<u32>,
    pub keys: DeviceBuffer<u64>,
    pub values: DeviceBuffer<u32>,

    /// flat `[start, end]` pair per tile
    pub ranges: DeviceBuffer<u32>,

    pub scratch: DeviceBuffer<u32>,

    /// planar rgb, `image[c * H * W + y * W + x]`
    pub image: DeviceBuffer<f32>,
    pub transmittance: DeviceBuffer<f32>,
    pub n_contrib: DeviceBuffer<u32>,

    instance_capacity: usize,
    num_splats: usize,
}

impl TileBuffers {
    pub fn new(instance_capacity: usize) -> Self {
        let mut buffers = Self {
            grid: UVec2::ZERO,
            radii: DeviceBuffer::new(0),
            tiles_touched: DeviceBuffer::new(0),
            offsets: DeviceBuffer::new(0),
            keys_unsorted: DeviceBuffer::new(0),
            values_unsorted: DeviceBuffer::new(0),
            keys: DeviceBuffer::new(0),
            values: DeviceBuffer::new(0),
            ranges: DeviceBuffer::new(0),
            scratch: DeviceBuffer::new(0),
            image: DeviceBuffer::new(0),
            transmittance: DeviceBuffer::new(0),
            n_contrib: DeviceBuffer::new(0),
            instance_capacity: 0,
            num_splats: 0,
        };

        buffers.reserve_instances(instance_capacity);
        buffers
    }

    pub fn instance_capacity(&self) -> usize {
        self.instance_capacity
    }

    /// grow the instance lists to hold at least `capacity` tile instances
    pub fn reserve_instances(&mut self, capacity: usize) {
        if capacity <= self.instance_capacity {
            return;
        }

        self.keys_unsorted.ensure_len(capacity);
        self.values_unsorted.ensure_len(capacity);
        self.keys.ensure_len(capacity);
        self.values.ensure_len(capacity);
        self.instance_capacity = capacity;

        debug!(capacity, "reserved tile instances");
        self.ensure_scratch();
    }

    /// size per-splat, per-tile and per-pixel storage for a frame
    pub fn prepare(&mut self, num_splats: usize, target: &RenderTarget) {
        self.grid = tile_grid(target.width, target.height);
        self.num_splats = num_splats;

        let tiles = (self.grid.x * self.grid.y) as usize;
        let pixels = target.pixels();

        let grown = self.radii.ensure_len(num_splats)
            | self.tiles_touched.ensure_len(num_splats)
            | self.offsets.ensure_len(num_splats)
            | self.ranges.ensure_len(2 * tiles)
            | self.image.ensure_len(3 * pixels)
            | self.transmittance.ensure_len(pixels)
            | self.n_contrib.ensure_len(pixels);

        if grown {
            debug!(num_splats, tiles, pixels, "grew tile buffers");
        }

        self.ensure_scratch();
    }

    pub fn scratch_size(&self) -> usize {
        inclusive_scan_temp_size(self.num_splats).max(sort_temp_size(self.instance_capacity))
    }

    fn ensure_scratch(&mut self) {
        let size = self.scratch_size();
        if self.scratch.ensure_len(size) {
            debug!(size, "grew scratch buffer");
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        self.radii.size_in_bytes()
            + self.tiles_touched.size_in_bytes()
            + self.offsets.size_in_bytes()
            + self.keys_unsorted.size_in_bytes()
            + self.values_unsorted.size_in_bytes()
            + self.keys.size_in_bytes()
            + self.values.size_in_bytes()
            + self.ranges.size_in_bytes()
            + self.scratch.size_in_bytes()
            + self.image.size_in_bytes()
            + self.transmittance.size_in_bytes()
            + self.n_contrib.size_in_bytes()
    }
}
