use std::{
    any::{
        Any,
        TypeId,
    },
    collections::HashMap,
    sync::{
        Arc,
        OnceLock,
        PoisonError,
        RwLock,
    },
};

use tracing::debug;


type KernelMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

static REGISTRY: OnceLock<RwLock<KernelMap>> = OnceLock::new();


/// process-wide cache of kernel sets keyed by their type
///
/// a kernel set is built at most once per process and is immutable afterwards,
/// so specializations such as `ScanKernels<f32>` and `ScanKernels<u32>` each
/// get their own entry.
pub fn kernel_set<K>(build: impl FnOnce() -> K) -> Arc<K>
where
    K: Any + Send + Sync,
{
    let registry = REGISTRY.get_or_init(Default::default);
    let key = TypeId::of::<K>();

    let cached = registry
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
        .cloned();

    let entry = match cached {
        Some(entry) => entry,
        None => {
            let mut map = registry.write().unwrap_or_else(PoisonError::into_inner);
            map.entry(key)
                .or_insert_with(|| {
                    debug!(kernel_set = std::any::type_name::<K>(), "compiling kernel set");
                    Arc::new(build())
                })
                .clone()
        }
    };

    match entry.downcast::<K>() {
        Ok(kernels) => kernels,
        Err(_) => unreachable!("kernel registry entries are keyed by their own type id"),
    }
}

pub fn registered_kernel_sets() -> usize {
    REGISTRY
        .get()
        .map(|registry| registry.read().unwrap_or_else(PoisonError::into_inner).len())
        .unwrap_or(0)
}
