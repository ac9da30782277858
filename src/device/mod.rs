use std::sync::atomic::{
    AtomicU64,
    Ordering,
};

use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use static_assertions::const_assert;
use tracing::{
    debug,
    trace,
};

use crate::{
    error::SplatResult,
    math::is_power_of_two,
};

pub mod buffer;
pub mod registry;

pub use buffer::{
    BufferView,
    DeviceBuffer,
    DeviceElement,
};


/// work items per 1D workgroup
pub const BLOCK_SIZE: usize = 256;

pub const TILE_WIDTH: u32 = 16;
pub const TILE_HEIGHT: u32 = 16;

const_assert!(is_power_of_two(BLOCK_SIZE));
const_assert!(TILE_WIDTH as usize * TILE_HEIGHT as usize == BLOCK_SIZE);


/// compiled kernel: a name for diagnostics and the workgroup shape it was built for
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
)]
pub struct Kernel {
    pub name: String,
    pub workgroup_size: [u32; 2],
}

impl Kernel {
    pub fn linear(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workgroup_size: [BLOCK_SIZE as u32, 1],
        }
    }

    pub fn tiled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workgroup_size: [TILE_WIDTH, TILE_HEIGHT],
        }
    }

    pub fn threads(&self) -> usize {
        self.workgroup_size[0] as usize * self.workgroup_size[1] as usize
    }
}


/// one cooperative workgroup of a `dispatch_groups` call
///
/// kernel bodies are written as a sequence of phases; every local thread finishes
/// a phase before any thread starts the next, which is the barrier between them.
/// state that outlives a phase (shared memory, per-thread registers) is owned by
/// the kernel body.
#[derive(Debug)]
pub struct Workgroup {
    id: [u32; 2],
    size: [u32; 2],
}

impl Workgroup {
    pub fn id(&self) -> [u32; 2] {
        self.id
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn threads(&self) -> usize {
        self.size[0] as usize * self.size[1] as usize
    }

    /// local thread index to its (x, y) position in the workgroup
    pub fn local_xy(&self, thread: usize) -> [u32; 2] {
        let thread = thread as u32;
        [thread % self.size[0], thread / self.size[0]]
    }

    /// local thread index to its global dispatch position
    pub fn global_xy(&self, thread: usize) -> [u32; 2] {
        let [x, y] = self.local_xy(thread);
        [self.id[0] * self.size[0] + x, self.id[1] * self.size[1] + y]
    }

    pub fn phase(&self, mut body: impl FnMut(usize)) {
        for thread in 0..self.threads() {
            body(thread);
        }
    }
}


#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
)]
pub struct DeviceStats {
    pub dispatches: u64,
    pub readbacks: u64,
}

#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[serde(default)]
pub struct DeviceSettings {
    /// worker threads, zero selects the rayon default
    pub threads: usize,
}


/// data-parallel execution context
///
/// dispatches run to completion before returning, forming a single ordered queue.
pub struct Device {
    pool: rayon::ThreadPool,
    builtins: Builtins,
    dispatches: AtomicU64,
    readbacks: AtomicU64,
}

struct Builtins {
    fill: Kernel,
    copy: Kernel,
}

impl Device {
    pub fn new(settings: DeviceSettings) -> SplatResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.threads)
            .thread_name(|index| format!("splat-device-{index}"))
            .build()?;

        debug!(threads = pool.current_num_threads(), "created device");

        Ok(Self {
            pool,
            builtins: Builtins {
                fill: Kernel::linear("fill"),
                copy: Kernel::linear("copy"),
            },
            dispatches: AtomicU64::new(0),
            readbacks: AtomicU64::new(0),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            readbacks: self.readbacks.load(Ordering::Relaxed),
        }
    }

    /// 1D grid of `n` work items, scheduled in workgroup sized chunks
    pub fn dispatch<F>(&self, kernel: &Kernel, n: usize, body: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        trace!(kernel = %kernel.name, n, "dispatch");

        if n == 0 {
            return;
        }

        let chunk = kernel.threads().max(1);
        self.pool.install(|| {
            (0..n)
                .into_par_iter()
                .with_min_len(chunk)
                .for_each(|index| body(index));
        });
    }

    /// grid of cooperative workgroups, shaped by the kernel's workgroup size
    pub fn dispatch_groups<F>(&self, kernel: &Kernel, groups: [u32; 2], body: F)
    where
        F: Fn(&Workgroup) + Send + Sync,
    {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        trace!(kernel = %kernel.name, groups = ?groups, "dispatch groups");

        let width = groups[0] as usize;
        let count = width * groups[1] as usize;
        if count == 0 {
            return;
        }

        let size = kernel.workgroup_size;
        self.pool.install(|| {
            (0..count)
                .into_par_iter()
                .for_each(|group| {
                    let workgroup = Workgroup {
                        id: [(group % width) as u32, (group / width) as u32],
                        size,
                    };
                    body(&workgroup);
                });
        });
    }

    /// blocking device to host read of a single element
    pub fn read_scalar<T: DeviceElement>(&self, view: BufferView<'_, T>, index: usize) -> T {
        self.readbacks.fetch_add(1, Ordering::Relaxed);
        let value = view.read(index);
        trace!(index, value = ?value, "read scalar");
        value
    }

    pub fn fill<T: DeviceElement>(&self, view: BufferView<'_, T>, value: T) {
        self.dispatch(&self.builtins.fill, view.len(), |index| view.write(index, value));
    }

    pub fn copy<T: DeviceElement>(&self, src: BufferView<'_, T>, dst: BufferView<'_, T>) {
        assert!(
            src.len() <= dst.len(),
            "copy of {} elements into a view of {}",
            src.len(),
            dst.len(),
        );

        self.dispatch(&self.builtins.copy, src.len(), |index| dst.write(index, src.read(index)));
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("threads", &self.threads())
            .field("stats", &self.stats())
            .finish()
    }
}
