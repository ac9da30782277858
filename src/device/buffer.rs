use std::{
    fmt,
    ops::Range,
    sync::atomic::{
        AtomicU32,
        AtomicU64,
        Ordering,
    },
};

use bytemuck::Pod;
use static_assertions::assert_eq_size;


assert_eq_size!(f32, u32);
assert_eq_size!(i32, u32);


/// element type storable in a device buffer
///
/// every element lives in an atomic cell of the same width, so kernels running on
/// many threads may scatter writes into a shared buffer without data races. all
/// accesses are relaxed; ordering between kernels comes from dispatch completion.
pub trait DeviceElement: Pod + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    type Cell: Send + Sync;

    fn cell(value: Self) -> Self::Cell;
    fn load(cell: &Self::Cell) -> Self;
    fn store(cell: &Self::Cell, value: Self);
}

macro_rules! impl_device_element {
    ($ty:ty, $atomic:ty, $bits:ty) => {
        impl DeviceElement for $ty {
            type Cell = $atomic;

            #[inline]
            fn cell(value: Self) -> Self::Cell {
                <$atomic>::new(bytemuck::cast::<$ty, $bits>(value))
            }

            #[inline]
            fn load(cell: &Self::Cell) -> Self {
                bytemuck::cast::<$bits, $ty>(cell.load(Ordering::Relaxed))
            }

            #[inline]
            fn store(cell: &Self::Cell, value: Self) {
                cell.store(bytemuck::cast::<$ty, $bits>(value), Ordering::Relaxed);
            }
        }
    };
}

impl_device_element!(u32, AtomicU32, u32);
impl_device_element!(i32, AtomicU32, u32);
impl_device_element!(f32, AtomicU32, u32);
impl_device_element!(u64, AtomicU64, u64);


pub struct DeviceBuffer<T: DeviceElement> {
    cells: Box<[T::Cell]>,
}

impl<T: DeviceElement> DeviceBuffer<T> {
    pub fn new(len: usize) -> Self {
        Self::filled(len, T::default())
    }

    pub fn filled(len: usize, value: T) -> Self {
        Self {
            cells: (0..len).map(|_| T::cell(value)).collect(),
        }
    }

    pub fn from_slice(data: &[T]) -> Self {
        Self {
            cells: data.iter().map(|&value| T::cell(value)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.cells.len() * std::mem::size_of::<T>()
    }

    pub fn view(&self) -> BufferView<'_, T> {
        BufferView { cells: &self.cells }
    }

    pub fn slice(&self, range: Range<usize>) -> BufferView<'_, T> {
        BufferView { cells: &self.cells[range] }
    }

    /// host to device copy into the front of the buffer
    pub fn upload(&mut self, data: &[T]) {
        assert!(
            data.len() <= self.cells.len(),
            "upload of {} elements into a buffer of {}",
            data.len(),
            self.cells.len(),
        );

        for (cell, &value) in self.cells.iter_mut().zip(data) {
            *cell = T::cell(value);
        }
    }

    /// reallocate when smaller than `len`, contents are not preserved
    pub fn ensure_len(&mut self, len: usize) -> bool {
        if self.cells.len() >= len {
            return false;
        }

        *self = Self::new(len);
        true
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.view().to_vec()
    }
}

impl<T: DeviceElement> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("element", &std::any::type_name::<T>())
            .field("len", &self.len())
            .finish()
    }
}


/// borrowed window into a device buffer, the argument type of every kernel
pub struct BufferView<'a, T: DeviceElement> {
    cells: &'a [T::Cell],
}

impl<T: DeviceElement> Clone for BufferView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: DeviceElement> Copy for BufferView<'_, T> {}

impl<'a, T: DeviceElement> BufferView<'a, T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn read(&self, index: usize) -> T {
        T::load(&self.cells[index])
    }

    #[inline]
    pub fn write(&self, index: usize, value: T) {
        T::store(&self.cells[index], value);
    }

    #[inline]
    pub(crate) fn cell(&self, index: usize) -> &'a T::Cell {
        &self.cells[index]
    }

    pub fn subview(&self, offset: usize, len: usize) -> BufferView<'a, T> {
        BufferView { cells: &self.cells[offset..offset + len] }
    }

    /// reinterpret the cells as another element type of the same width
    pub fn cast<U>(self) -> BufferView<'a, U>
    where
        U: DeviceElement<Cell = T::Cell>,
    {
        BufferView { cells: self.cells }
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.cells.iter().map(T::load).collect()
    }
}

impl<T: DeviceElement> fmt::Debug for BufferView<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferView")
            .field("element", &std::any::type_name::<T>())
            .field("len", &self.len())
            .finish()
    }
}
