use std::{
    marker::PhantomData,
    sync::Arc,
};

use tracing::trace;

use crate::{
    device::{
        BLOCK_SIZE,
        BufferView,
        Device,
        Kernel,
        Workgroup,
        registry::kernel_set,
    },
    math::pad_4,
    parallel::{
        ELEMENTS_PER_BLOCK,
        ReduceOp,
        SHARED_MEM_SIZE,
        ScanElement,
        bank_offset,
        block_count,
    },
};


/// scratch elements an exclusive scan or reduce of `num_items` needs
///
/// one block-sum slot per block for every level that has more than one block,
/// one final slot, rounded up to 16 bytes so subviews stay aligned.
pub fn scan_temp_size(num_items: usize) -> usize {
    let mut size = 0;
    let mut num_elements = num_items;

    loop {
        let num_blocks = block_count(num_elements);
        if num_blocks > 1 {
            size += num_blocks;
        }

        num_elements = num_blocks;
        if num_elements <= 1 {
            break;
        }
    }

    pad_4(size + 1)
}

/// the inclusive scan stages the last input element in one extra slot
pub fn inclusive_scan_temp_size(num_items: usize) -> usize {
    scan_temp_size(num_items) + 1
}


pub struct ScanKernels<T> {
    prescan: Kernel,
    uniform_add: Kernel,
    add: Kernel,
    stage_last: Kernel,
    stage_heads: Kernel,
    shift_left: Kernel,
    reduce: Kernel,
    finish_reduce: Kernel,
    _element: PhantomData<fn() -> T>,
}

impl<T: ScanElement> ScanKernels<T> {
    fn compile() -> Self {
        let element = std::any::type_name::<T>();
        let name = |kernel: &str| format!("{kernel}<{element}>");

        Self {
            prescan: Kernel::linear(name("prescan")),
            uniform_add: Kernel::linear(name("uniform_add")),
            add: Kernel::linear(name("add")),
            stage_last: Kernel::linear(name("stage_last")),
            stage_heads: Kernel::linear(name("stage_heads")),
            shift_left: Kernel::linear(name("shift_left")),
            reduce: Kernel::linear(name("reduce")),
            finish_reduce: Kernel::linear(name("finish_reduce")),
            _element: PhantomData,
        }
    }
}


/// work-efficient (Blelloch) prefix scan and tree reduction
///
/// callers query the scratch size, allocate a `u32` scratch buffer of at least that
/// many elements, then execute. A scratch buffer that is too small is a contract
/// violation and panics.
pub struct PrefixScan<T: ScanElement> {
    kernels: Arc<ScanKernels<T>>,
}

impl<T: ScanElement> Default for PrefixScan<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ScanElement> Clone for PrefixScan<T> {
    fn clone(&self) -> Self {
        Self {
            kernels: self.kernels.clone(),
        }
    }
}

impl<T: ScanElement> PrefixScan<T> {
    pub fn new() -> Self {
        Self {
            kernels: kernel_set(ScanKernels::<T>::compile),
        }
    }

    pub fn kernels(&self) -> &Arc<ScanKernels<T>> {
        &self.kernels
    }

    pub fn query_temp_size(&self, num_items: usize) -> usize {
        scan_temp_size(num_items)
    }

    pub fn query_inclusive_temp_size(&self, num_items: usize) -> usize {
        inclusive_scan_temp_size(num_items)
    }

    pub fn query_reduce_temp_size(&self, num_items: usize) -> usize {
        scan_temp_size(num_items)
    }

    /// `output[i] = init + sum(input[..i])`, input and output may alias
    pub fn exclusive_sum(
        &self,
        device: &Device,
        temp: BufferView<'_, u32>,
        input: BufferView<'_, T>,
        output: BufferView<'_, T>,
        init: T,
        num_items: usize,
    ) {
        let temp_size = scan_temp_size(num_items);
        assert!(
            temp.len() >= temp_size,
            "scan scratch buffer has {} elements, {} required",
            temp.len(),
            temp_size,
        );
        check_io(input, output, num_items);

        if num_items == 0 {
            return;
        }

        trace!(num_items, "exclusive sum");

        self.prescan_recursive(device, temp.subview(0, temp_size).cast(), input, output, num_items);
        self.add_uniform(device, output, init, num_items);
    }

    /// `output[i] = init + sum(input[..=i])`, input and output may alias
    pub fn inclusive_sum(
        &self,
        device: &Device,
        temp: BufferView<'_, u32>,
        input: BufferView<'_, T>,
        output: BufferView<'_, T>,
        init: T,
        num_items: usize,
    ) {
        let temp_size = inclusive_scan_temp_size(num_items);
        assert!(
            temp.len() >= temp_size,
            "inclusive scan scratch buffer has {} elements, {} required",
            temp.len(),
            temp_size,
        );
        check_io(input, output, num_items);

        if num_items == 0 {
            return;
        }

        trace!(num_items, "inclusive sum");

        let last = temp.subview(temp_size - 1, 1).cast::<T>();
        let scratch = temp.subview(0, temp_size - 1).cast::<T>();

        device.dispatch(&self.kernels.stage_last, 1, |_| {
            last.write(0, input.read(num_items - 1));
        });

        self.prescan_recursive(device, scratch, input, output, num_items);
        self.shift_left(device, scratch, output, last, num_items);
        self.add_uniform(device, output, init, num_items);
    }

    /// combine `input[..num_items]` into `output[0]`
    pub fn reduce(
        &self,
        device: &Device,
        temp: BufferView<'_, u32>,
        input: BufferView<'_, T>,
        output: BufferView<'_, T>,
        num_items: usize,
        op: ReduceOp,
    ) {
        let temp_size = scan_temp_size(num_items);
        assert!(
            temp.len() >= temp_size,
            "reduce scratch buffer has {} elements, {} required",
            temp.len(),
            temp_size,
        );
        assert!(input.len() >= num_items, "reduce input shorter than {num_items}");
        assert!(!output.is_empty(), "reduce output is empty");

        if num_items == 0 {
            output.write(0, op.identity());
            return;
        }

        self.reduce_recursive(device, temp.subview(0, temp_size).cast(), input, output, num_items, op);
    }

    fn prescan_recursive(
        &self,
        device: &Device,
        temp: BufferView<'_, T>,
        input: BufferView<'_, T>,
        output: BufferView<'_, T>,
        num_elements: usize,
    ) {
        let num_blocks = block_count(num_elements);

        if num_blocks == 1 {
            device.dispatch_groups(&self.kernels.prescan, [1, 1], |workgroup| {
                prescan_block(workgroup, input, output, None, num_elements);
            });
            return;
        }

        let block_sums = temp.subview(0, num_blocks);
        let rest = temp.subview(num_blocks, temp.len() - num_blocks);

        device.dispatch_groups(&self.kernels.prescan, [num_blocks as u32, 1], |workgroup| {
            prescan_block(workgroup, input, output, Some(block_sums), num_elements);
        });

        self.prescan_recursive(device, rest, block_sums, block_sums, num_blocks);

        device.dispatch_groups(&self.kernels.uniform_add, [num_blocks as u32, 1], |workgroup| {
            uniform_add_block(workgroup, output, block_sums, num_elements);
        });
    }

    /// turn an exclusive scan into an inclusive one in place
    ///
    /// every block reads the element after its own; the head of the following block
    /// is staged into the level-0 block sum slots first, those are dead once the
    /// uniform add has completed.
    fn shift_left(
        &self,
        device: &Device,
        temp: BufferView<'_, T>,
        output: BufferView<'_, T>,
        last: BufferView<'_, T>,
        num_elements: usize,
    ) {
        let num_blocks = block_count(num_elements);
        let heads = temp.subview(0, num_blocks);

        if num_blocks > 1 {
            device.dispatch(&self.kernels.stage_heads, num_blocks, |block| {
                heads.write(block, output.read(block * ELEMENTS_PER_BLOCK));
            });
        }

        device.dispatch_groups(&self.kernels.shift_left, [num_blocks as u32, 1], |workgroup| {
            let block = workgroup.id()[0] as usize;
            let base = block * ELEMENTS_PER_BLOCK;
            let mut staged = [T::ZERO; ELEMENTS_PER_BLOCK];

            workgroup.phase(|thread| {
                for local in [thread, thread + BLOCK_SIZE] {
                    let index = base + local;
                    if index >= num_elements {
                        continue;
                    }

                    staged[local] = if index + 1 == num_elements {
                        output.read(index) + last.read(0)
                    } else if local + 1 == ELEMENTS_PER_BLOCK {
                        heads.read(block + 1)
                    } else {
                        output.read(index + 1)
                    };
                }
            });

            workgroup.phase(|thread| {
                for local in [thread, thread + BLOCK_SIZE] {
                    let index = base + local;
                    if index < num_elements {
                        output.write(index, staged[local]);
                    }
                }
            });
        });
    }

    fn add_uniform(&self, device: &Device, output: BufferView<'_, T>, value: T, num_elements: usize) {
        device.dispatch(&self.kernels.add, num_elements, |index| {
            output.write(index, output.read(index) + value);
        });
    }

    fn reduce_recursive(
        &self,
        device: &Device,
        temp: BufferView<'_, T>,
        input: BufferView<'_, T>,
        output: BufferView<'_, T>,
        num_elements: usize,
        op: ReduceOp,
    ) {
        let num_blocks = block_count(num_elements);
        let block_sums = temp.subview(0, num_blocks);

        device.dispatch_groups(&self.kernels.reduce, [num_blocks as u32, 1], |workgroup| {
            reduce_block(workgroup, input, block_sums, num_elements, op);
        });

        if num_blocks > 1 {
            let rest = temp.subview(num_blocks, temp.len() - num_blocks);
            self.reduce_recursive(device, rest, block_sums, output, num_blocks, op);
        } else {
            device.dispatch(&self.kernels.finish_reduce, 1, |_| {
                output.write(0, block_sums.read(0));
            });
        }
    }
}


fn check_io<T: ScanElement>(input: BufferView<'_, T>, output: BufferView<'_, T>, num_items: usize) {
    assert!(input.len() >= num_items, "scan input has {} elements, {num_items} requested", input.len());
    assert!(output.len() >= num_items, "scan output has {} elements, {num_items} requested", output.len());
}

#[inline]
fn padded(index: usize) -> usize {
    index + bank_offset(index)
}

/// in-block exclusive scan of up to 512 elements in shared memory
///
/// up-sweep builds partial sums in place, the root is cleared (after recording the
/// block total) and the down-sweep distributes prefixes back to the leaves.
fn prescan_block<T: ScanElement>(
    workgroup: &Workgroup,
    input: BufferView<'_, T>,
    output: BufferView<'_, T>,
    block_sums: Option<BufferView<'_, T>>,
    num_elements: usize,
) {
    let block = workgroup.id()[0] as usize;
    let base = block * ELEMENTS_PER_BLOCK;
    let count = (num_elements - base).min(ELEMENTS_PER_BLOCK);
    let mut shared = [T::ZERO; SHARED_MEM_SIZE];

    workgroup.phase(|thread| {
        for local in [thread, thread + BLOCK_SIZE] {
            shared[padded(local)] = if local < count {
                input.read(base + local)
            } else {
                T::ZERO
            };
        }
    });

    let mut stride = 1;
    let mut active = BLOCK_SIZE;
    while active > 0 {
        workgroup.phase(|thread| {
            if thread < active {
                let ai = stride * (2 * thread + 1) - 1;
                let bi = ai + stride;
                shared[padded(bi)] = shared[padded(bi)] + shared[padded(ai)];
            }
        });
        stride *= 2;
        active >>= 1;
    }

    let root = padded(ELEMENTS_PER_BLOCK - 1);
    workgroup.phase(|thread| {
        if thread == 0 {
            if let Some(block_sums) = block_sums {
                block_sums.write(block, shared[root]);
            }
            shared[root] = T::ZERO;
        }
    });

    let mut active = 1;
    while active <= BLOCK_SIZE {
        stride >>= 1;
        workgroup.phase(|thread| {
            if thread < active {
                let ai = padded(stride * (2 * thread + 1) - 1);
                let bi = padded(stride * (2 * thread + 2) - 1);
                let left = shared[ai];
                shared[ai] = shared[bi];
                shared[bi] = shared[bi] + left;
            }
        });
        active <<= 1;
    }

    workgroup.phase(|thread| {
        for local in [thread, thread + BLOCK_SIZE] {
            if local < count {
                output.write(base + local, shared[padded(local)]);
            }
        }
    });
}

/// add each block's scanned sum to its elements, output addresses may alias
fn uniform_add_block<T: ScanElement>(
    workgroup: &Workgroup,
    output: BufferView<'_, T>,
    block_sums: BufferView<'_, T>,
    num_elements: usize,
) {
    let block = workgroup.id()[0] as usize;
    let base = block * ELEMENTS_PER_BLOCK;
    let mut uniform = T::ZERO;

    workgroup.phase(|thread| {
        if thread == 0 {
            uniform = block_sums.read(block);
        }
    });

    workgroup.phase(|thread| {
        for local in [thread, thread + BLOCK_SIZE] {
            let index = base + local;
            if index < num_elements {
                output.atomic_add(index, uniform);
            }
        }
    });
}

fn reduce_block<T: ScanElement>(
    workgroup: &Workgroup,
    input: BufferView<'_, T>,
    block_sums: BufferView<'_, T>,
    num_elements: usize,
    op: ReduceOp,
) {
    let block = workgroup.id()[0] as usize;
    let base = block * ELEMENTS_PER_BLOCK;
    let count = (num_elements - base).min(ELEMENTS_PER_BLOCK);
    let identity = op.identity::<T>();
    let mut shared = [identity; SHARED_MEM_SIZE];

    workgroup.phase(|thread| {
        for local in [thread, thread + BLOCK_SIZE] {
            shared[padded(local)] = if local < count {
                input.read(base + local)
            } else {
                identity
            };
        }
    });

    let mut stride = 1;
    let mut active = BLOCK_SIZE;
    while active > 0 {
        workgroup.phase(|thread| {
            if thread < active {
                let ai = padded(stride * (2 * thread + 1) - 1);
                let bi = padded(stride * (2 * thread + 2) - 1);
                shared[bi] = op.combine(shared[bi], shared[ai]);
            }
        });
        stride *= 2;
        active >>= 1;
    }

    workgroup.phase(|thread| {
        if thread == 0 {
            block_sums.write(block, shared[padded(ELEMENTS_PER_BLOCK - 1)]);
        }
    });
}
