//! Memory regions and block handles.

use alloc::alloc::{alloc_zeroed, handle_alloc_error};
use core::alloc::Layout;
use core::ops::Range;
use core::ptr::NonNull;
use core::slice;

/// Alignment of regions created with [`Region::leak`].
pub const LEAK_ALIGN: usize = 16;

/// A contiguous memory range handed to the pools.
///
/// The range is normally reserved by the linker script and passed in with
/// [`Region::from_raw_parts`]. A region is never returned to its source: pools
/// built on it live as long as the program.
#[derive(Debug)]
pub struct Region {
    start: NonNull<u8>,
    len: usize,
}

unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Creates a region from a start address and a size.
    ///
    /// # Safety
    ///
    /// * `start..start + len` must be valid for reads and writes for the rest
    ///   of the program.
    /// * The memory must not be accessed other than through pools built on this
    ///   region.
    #[inline]
    pub const unsafe fn from_raw_parts(start: NonNull<u8>, len: usize) -> Self {
        Self { start, len }
    }

    /// Creates a region from a static buffer.
    #[inline]
    pub fn from_static(buffer: &'static mut [u8]) -> Self {
        let len = buffer.len();
        Self { start: NonNull::from(buffer).cast(), len }
    }

    /// Allocates a zeroed region of `len` bytes from the global allocator and
    /// leaks it. The region is aligned to [`LEAK_ALIGN`].
    ///
    /// Useful on hosted targets and in tests.
    pub fn leak(len: usize) -> Self {
        if len == 0 {
            return Self { start: NonNull::dangling(), len: 0 };
        }
        let layout = match Layout::from_size_align(len, LEAK_ALIGN) {
            Ok(layout) => layout,
            Err(_) => panic!("region of {len} bytes is too large"),
        };
        let Some(start) = NonNull::new(unsafe { alloc_zeroed(layout) }) else {
            handle_alloc_error(layout)
        };
        Self { start, len }
    }

    /// Returns the start address.
    #[inline]
    pub const fn start(&self) -> NonNull<u8> {
        self.start
    }

    /// Returns the size in bytes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the region has zero size.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the address range.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        let start = self.start.as_ptr() as usize;
        start..start + self.len
    }

    /// Divides the region into two at `mid`.
    ///
    /// # Panics
    ///
    /// If `mid > len`.
    pub fn split_at(self, mid: usize) -> (Self, Self) {
        assert!(mid <= self.len);
        let tail = unsafe { NonNull::new_unchecked(self.start.as_ptr().add(mid)) };
        (Self { start: self.start, len: mid }, Self { start: tail, len: self.len - mid })
    }
}

/// A handle to an allocated block.
///
/// The handle is a plain address and doesn't free the block on drop. Pass it
/// back to the owning pool to free the block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    ptr: NonNull<u8>,
    len: usize,
}

unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    #[inline]
    pub(crate) const fn new(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Returns the block address.
    #[inline]
    pub const fn as_non_null(self) -> NonNull<u8> {
        self.ptr
    }

    /// Returns the block address as a raw pointer.
    #[inline]
    pub const fn as_ptr(self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Returns the usable size of the block, which is the partition size of the
    /// owning pool.
    #[inline]
    pub const fn len(self) -> usize {
        self.len
    }

    /// Always `false`: pools never hand out zero-sized blocks.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Returns the block memory as a mutable slice.
    ///
    /// # Safety
    ///
    /// * The block must be allocated for the whole lifetime `'a`.
    /// * No other reference to the block memory may exist during `'a`.
    #[inline]
    pub unsafe fn as_mut_slice<'a>(self) -> &'a mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl From<Block> for NonNull<u8> {
    #[inline]
    fn from(block: Block) -> Self {
        block.ptr
    }
}
