use std::{
    marker::PhantomData,
    sync::Arc,
};

use tracing::trace;

use crate::{
    device::{
        BufferView,
        Device,
        DeviceElement,
        Kernel,
        registry::kernel_set,
    },
    parallel::{
        PrefixScan,
        scan::scan_temp_size,
    },
};


pub trait RadixKey: DeviceElement {
    const BITS: u32;

    /// 0 or 1
    fn bit(self, bit: u32) -> u32;
}

impl RadixKey for u32 {
    const BITS: u32 = u32::BITS;

    #[inline]
    fn bit(self, bit: u32) -> u32 {
        (self >> bit) & 1
    }
}

impl RadixKey for u64 {
    const BITS: u32 = u64::BITS;

    #[inline]
    fn bit(self, bit: u32) -> u32 {
        ((self >> bit) & 1) as u32
    }
}


/// scratch elements a sort of `num_items` pairs needs: the scan scratch followed
/// by one flag per item and a sentinel holding the last flag
pub fn sort_temp_size(num_items: usize) -> usize {
    scan_temp_size(num_items) + num_items + 1
}


pub struct RadixKernels<K, V> {
    count: Kernel,
    assign: Kernel,
    copy_back: Kernel,
    _pair: PhantomData<fn() -> (K, V)>,
}

impl<K: RadixKey, V: DeviceElement> RadixKernels<K, V> {
    fn compile() -> Self {
        let pair = format!("{}+{}", std::any::type_name::<K>(), std::any::type_name::<V>());

        Self {
            count: Kernel::linear(format!("radix_count<{pair}>")),
            assign: Kernel::linear(format!("radix_assign<{pair}>")),
            copy_back: Kernel::linear(format!("radix_copy_back<{pair}>")),
            _pair: PhantomData,
        }
    }
}


/// stable least significant bit first radix sort of (key, value) pairs
///
/// one bit per pass: flag the zero bits, exclusive scan the flags to rank them,
/// scatter zeros to their rank and ones behind all zeros in input order. both the
/// input and output buffers hold the sorted pairs afterwards.
pub struct RadixSort<K: RadixKey, V: DeviceElement> {
    scan: PrefixScan<u32>,
    kernels: Arc<RadixKernels<K, V>>,
}

impl<K: RadixKey, V: DeviceElement> Default for RadixSort<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RadixKey, V: DeviceElement> RadixSort<K, V> {
    pub fn new() -> Self {
        Self {
            scan: PrefixScan::new(),
            kernels: kernel_set(RadixKernels::<K, V>::compile),
        }
    }

    pub fn query_temp_size(&self, num_items: usize) -> usize {
        sort_temp_size(num_items)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sort_pairs(
        &self,
        device: &Device,
        temp: BufferView<'_, u32>,
        keys_in: BufferView<'_, K>,
        values_in: BufferView<'_, V>,
        keys_out: BufferView<'_, K>,
        values_out: BufferView<'_, V>,
        num_items: usize,
        bits: u32,
    ) {
        let temp_size = sort_temp_size(num_items);
        assert!(
            temp.len() >= temp_size,
            "radix sort scratch buffer has {} elements, {} required",
            temp.len(),
            temp_size,
        );
        assert!(bits <= K::BITS, "cannot sort {bits} bits of a {} bit key", K::BITS);
        assert!(
            keys_in.len() >= num_items
                && values_in.len() >= num_items
                && keys_out.len() >= num_items
                && values_out.len() >= num_items,
            "radix sort buffers shorter than {num_items}",
        );

        if num_items == 0 {
            return;
        }

        trace!(num_items, bits, "radix sort");

        let scan_size = scan_temp_size(num_items);
        let scan_temp = temp.subview(0, scan_size);
        let flags = temp.subview(scan_size, num_items + 1);
        let last = num_items - 1;

        for bit in 0..bits {
            device.dispatch(&self.kernels.count, num_items, |index| {
                let flag = 1 - keys_in.read(index).bit(bit);
                flags.write(index, flag);
                if index == last {
                    flags.write(num_items, flag);
                }
            });

            self.scan.exclusive_sum(device, scan_temp, flags, flags, 0, num_items);

            device.dispatch(&self.kernels.assign, num_items, |index| {
                let total_zeros = flags.read(num_items) + flags.read(last);
                let key = keys_in.read(index);
                let rank = flags.read(index) as usize;

                let target = if key.bit(bit) == 0 {
                    rank
                } else {
                    total_zeros as usize + index - rank
                };

                keys_out.write(target, key);
                values_out.write(target, values_in.read(index));
            });

            device.dispatch(&self.kernels.copy_back, num_items, |index| {
                keys_in.write(index, keys_out.read(index));
                values_in.write(index, values_out.read(index));
            });
        }
    }
}
