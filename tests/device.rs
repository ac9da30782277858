use std::sync::Arc;

use gaussian_tile_splatter::{
    TileRasterizer,
    device::{
        BLOCK_SIZE,
        DeviceBuffer,
        Kernel,
        registry::{
            kernel_set,
            registered_kernel_sets,
        },
    },
    parallel::PrefixScan,
};

use _harness::test_device;



#[test]
fn test_dispatch_visits_every_index_once() {
    let device = test_device();
    let kernel = Kernel::linear("count_visits");
    let n = 10 * BLOCK_SIZE + 3;

    let visits = DeviceBuffer::<u32>::new(n);
    let view = visits.view();
    device.dispatch(&kernel, n, |index| view.atomic_add(index, 1));

    assert!(visits.to_vec().iter().all(|&count| count == 1));
}

#[test]
fn test_concurrent_float_atomic_add() {
    let device = test_device();
    let kernel = Kernel::linear("accumulate_floats");
    let n = 4 * BLOCK_SIZE;

    let sums = DeviceBuffer::<f32>::filled(2, 0.5);
    let view = sums.view();
    device.dispatch(&kernel, n, |index| {
        view.atomic_add(0, 1.0);
        view.atomic_add(1, (index % 4) as f32);
    });

    // small integers add exactly in any order
    assert_eq!(sums.to_vec(), vec![0.5 + n as f32, 0.5 + 1.5 * n as f32]);
}

#[test]
fn test_workgroup_phases_are_barriers() {
    let device = test_device();
    let kernel = Kernel::linear("reverse_blocks");
    let groups = 3;
    let n = groups * BLOCK_SIZE;

    let input: Vec<u32> = (0..n as u32).collect();
    let input = DeviceBuffer::from_slice(&input);
    let output = DeviceBuffer::<u32>::new(n);
    let (input_view, output_view) = (input.view(), output.view());

    device.dispatch_groups(&kernel, [groups as u32, 1], |group| {
        let base = group.id()[0] as usize * BLOCK_SIZE;
        let mut shared = [0u32; BLOCK_SIZE];

        group.phase(|thread| shared[thread] = input_view.read(base + thread));
        group.phase(|thread| output_view.write(base + thread, shared[BLOCK_SIZE - 1 - thread]));
    });

    let output = output.to_vec();
    for block in 0..groups {
        for thread in 0..BLOCK_SIZE {
            let expected = (block * BLOCK_SIZE + BLOCK_SIZE - 1 - thread) as u32;
            assert_eq!(output[block * BLOCK_SIZE + thread], expected);
        }
    }
}

#[test]
fn test_tiled_workgroup_coordinates() {
    let device = test_device();
    let kernel = Kernel::tiled("coordinates");
    let (width, height) = (48usize, 32usize);

    let ids = DeviceBuffer::<u32>::filled(width * height, u32::MAX);
    let view = ids.view();

    device.dispatch_groups(&kernel, [3, 2], |group| {
        group.phase(|thread| {
            let [x, y] = group.global_xy(thread);
            view.write(y as usize * width + x as usize, y * width as u32 + x);
        });
    });

    let ids = ids.to_vec();
    assert!(ids.iter().enumerate().all(|(i, &id)| id == i as u32));
}

#[test]
fn test_readbacks_are_counted() {
    let device = test_device();
    let buffer = DeviceBuffer::from_slice(&[4u32, 8, 15]);

    let before = device.stats();
    assert_eq!(device.read_scalar(buffer.view(), 2), 15);
    let after = device.stats();

    assert_eq!(after.readbacks, before.readbacks + 1);
    assert_eq!(after.dispatches, before.dispatches);
}

#[test]
fn test_fill_and_copy() {
    let device = test_device();
    let src = DeviceBuffer::<f32>::new(700);
    let dst = DeviceBuffer::<f32>::new(1000);

    device.fill(src.view(), 2.5);
    device.copy(src.view(), dst.view());

    let dst = dst.to_vec();
    assert!(dst[..700].iter().all(|&value| value == 2.5));
    assert!(dst[700..].iter().all(|&value| value == 0.0));
}

#[test]
fn test_cast_reinterprets_bits() {
    let buffer = DeviceBuffer::from_slice(&[1.0f32, -2.0]);
    let bits = buffer.view().cast::<u32>();

    assert_eq!(bits.read(0), 1.0f32.to_bits());
    assert_eq!(bits.read(1), (-2.0f32).to_bits());

    let sub = buffer.view().subview(1, 1);
    assert_eq!(sub.len(), 1);
    assert_eq!(sub.read(0), -2.0);
}

#[test]
fn test_buffer_upload_and_growth() {
    let mut buffer = DeviceBuffer::<u32>::new(4);
    buffer.upload(&[1, 2]);
    assert_eq!(buffer.to_vec(), vec![1, 2, 0, 0]);

    assert!(!buffer.ensure_len(3));
    assert!(buffer.ensure_len(8));
    assert_eq!(buffer.len(), 8);
    assert_eq!(buffer.size_in_bytes(), 32);
}

#[test]
fn test_kernel_registry_is_process_wide() {
    let a = PrefixScan::<u32>::new();
    let b = PrefixScan::<u32>::new();
    let c = a.clone();

    assert!(Arc::ptr_eq(a.kernels(), b.kernels()));
    assert!(Arc::ptr_eq(a.kernels(), c.kernels()));

    let _ = TileRasterizer::new();
    assert!(registered_kernel_sets() >= 2);

    struct Marker(u32);
    let first = kernel_set(|| Marker(1));
    let second = kernel_set(|| Marker(2));
    assert_eq!(first.0, 1);
    assert_eq!(second.0, 1);
}

#[test]
fn test_kernel_sets_per_element_type() {
    let unsigned = PrefixScan::<u32>::new();
    let float = PrefixScan::<f32>::new();

    let unsigned_ptr = Arc::as_ptr(unsigned.kernels()) as *const u8;
    let float_ptr = Arc::as_ptr(float.kernels()) as *const u8;
    assert_ne!(unsigned_ptr, float_ptr);
}
