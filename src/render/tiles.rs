use bevy_math::{
    UVec2,
    Vec2,
};
use bytemuck::{
    Pod,
    Zeroable,
};
use static_assertions::assert_eq_size;

use crate::device::{
    TILE_HEIGHT,
    TILE_WIDTH,
};


/// half-open range `[start, end)` into the sorted instance list owned by one tile
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Pod,
    Zeroable,
)]
#[repr(C)]
pub struct TileRange {
    pub start: u32,
    pub end: u32,
}

assert_eq_size!(TileRange, [u32; 2]);

impl TileRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// view a flat `[start, end, start, end, ..]` buffer as tile ranges
pub fn as_tile_ranges(flat: &[u32]) -> &[TileRange] {
    bytemuck::cast_slice(&flat[..flat.len() / 2 * 2])
}


/// tiles needed to cover a `width` x `height` image
pub fn tile_grid(width: u32, height: u32) -> UVec2 {
    UVec2::new(width.div_ceil(TILE_WIDTH), height.div_ceil(TILE_HEIGHT))
}

/// NDC coordinate to pixel coordinate along an axis of `size` pixels
#[inline]
pub fn ndc2pix(v: f32, size: u32) -> f32 {
    ((v + 1.0) * size as f32 - 1.0) * 0.5
}

/// tile rectangle `[min, max)` covered by the square of half side `radius`
/// around `center`, clamped to the grid
pub fn get_rect(center: Vec2, radius: i32, grid: UVec2) -> (UVec2, UVec2) {
    let radius = radius as f32;
    let tile = Vec2::new(TILE_WIDTH as f32, TILE_HEIGHT as f32);

    let clamp = |v: f32, bound: u32| (v as i32).clamp(0, bound as i32) as u32;

    let min = UVec2::new(
        clamp((center.x - radius) / tile.x, grid.x),
        clamp((center.y - radius) / tile.y, grid.y),
    );
    let max = UVec2::new(
        clamp((center.x + radius + tile.x - 1.0) / tile.x, grid.x),
        clamp((center.y + radius + tile.y - 1.0) / tile.y, grid.y),
    );

    (min, max)
}

/// 64-bit sort key: tile id in the high word, depth bits in the low word
///
/// depths are non-negative after near culling, where the IEEE-754 bit pattern
/// orders like the value.
#[inline]
pub fn instance_key(tile_id: u32, depth: f32) -> u64 {
    ((tile_id as u64) << 32) | depth.to_bits() as u64
}

#[inline]
pub fn key_tile(key: u64) -> u32 {
    (key >> 32) as u32
}

