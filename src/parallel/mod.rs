use std::{
    ops::Add,
    sync::atomic::{
        AtomicU32,
        Ordering,
    },
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::device::{
    BLOCK_SIZE,
    BufferView,
    DeviceElement,
};

pub mod radix;
pub mod scan;

pub use radix::{
    RadixKey,
    RadixSort,
};
pub use scan::PrefixScan;


/// elements per scan block, each work item owns two
pub const ELEMENTS_PER_BLOCK: usize = 2 * BLOCK_SIZE;

pub const LOG_NUM_BANKS: usize = 5;

/// shared memory slots of a scan block, including bank padding
pub const SHARED_MEM_SIZE: usize = ELEMENTS_PER_BLOCK + (ELEMENTS_PER_BLOCK >> LOG_NUM_BANKS);

#[inline]
pub(crate) const fn bank_offset(index: usize) -> usize {
    index >> LOG_NUM_BANKS
}

#[inline]
pub(crate) fn block_count(num_elements: usize) -> usize {
    num_elements.div_ceil(ELEMENTS_PER_BLOCK).max(1)
}


/// 4-byte numeric element the scan and reduce kernels operate on, stored in the
/// same cells as the `u32` scratch buffer
pub trait ScanElement: DeviceElement<Cell = AtomicU32> + PartialOrd + Add<Output = Self> {
    const ZERO: Self;
    const LOWEST: Self;
    const HIGHEST: Self;

    fn atomic_add(cell: &AtomicU32, value: Self);
}

impl ScanElement for u32 {
    const ZERO: Self = 0;
    const LOWEST: Self = u32::MIN;
    const HIGHEST: Self = u32::MAX;

    fn atomic_add(cell: &AtomicU32, value: Self) {
        cell.fetch_add(value, Ordering::Relaxed);
    }
}

impl ScanElement for i32 {
    const ZERO: Self = 0;
    const LOWEST: Self = i32::MIN;
    const HIGHEST: Self = i32::MAX;

    fn atomic_add(cell: &AtomicU32, value: Self) {
        // two's complement addition is the same on the bit pattern
        cell.fetch_add(value as u32, Ordering::Relaxed);
    }
}

impl ScanElement for f32 {
    const ZERO: Self = 0.0;
    const LOWEST: Self = f32::NEG_INFINITY;
    const HIGHEST: Self = f32::INFINITY;

    fn atomic_add(cell: &AtomicU32, value: Self) {
        // the update closure never declines, both arms carry the previous bits
        cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f32::from_bits(bits) + value).to_bits())
        })
        .unwrap_or_else(|bits| bits);
    }
}

impl<T: ScanElement> BufferView<'_, T> {
    #[inline]
    pub fn atomic_add(&self, index: usize, value: T) {
        T::atomic_add(self.cell(index), value);
    }
}


#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    pub fn identity<T: ScanElement>(self) -> T {
        match self {
            ReduceOp::Sum => T::ZERO,
            ReduceOp::Max => T::LOWEST,
            ReduceOp::Min => T::HIGHEST,
        }
    }

    #[inline]
    pub fn combine<T: ScanElement>(self, a: T, b: T) -> T {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Max => if b > a { b } else { a },
            ReduceOp::Min => if b < a { b } else { a },
        }
    }
}
