use alloc::vec;
use alloc::vec::Vec;
use core::mem::size_of;

const NIL: usize = usize::MAX;
const WORD_BITS: usize = usize::BITS as usize;

/// The set of free blocks of a pool.
///
/// It operates by connecting released blocks together in a linked list, using
/// the first word of each free block as the index of the next. Blocks that were
/// never allocated are not linked at all: they are taken from an index growing
/// from zero until it reaches the capacity. A bitmap records which blocks are
/// allocated.
pub(super) struct FreeList {
    /// Head of the list of previously released blocks.
    free: usize,
    /// Index of the first block never handed out.
    uninit: usize,
    capacity: usize,
    allocated: usize,
    bitmap: Vec<usize>,
}

/// Minimum partition size able to hold the free list link.
pub const MIN_PARTITION_SIZE: usize = size_of::<usize>();

impl FreeList {
    pub(super) fn new(capacity: usize) -> Self {
        Self { free: NIL, uninit: 0, capacity, allocated: 0, bitmap: vec![0; capacity.div_ceil(WORD_BITS)] }
    }

    #[inline]
    pub(super) fn allocated(&self) -> usize {
        self.allocated
    }

    #[inline]
    pub(super) fn is_allocated(&self, index: usize) -> bool {
        self.bitmap[index / WORD_BITS] & 1 << (index % WORD_BITS) != 0
    }

    /// Takes one block.
    ///
    /// This operation has *O(1)* time complexity.
    ///
    /// # Safety
    ///
    /// `base` must point to `capacity` blocks of `size` bytes each.
    pub(super) unsafe fn pop(&mut self, base: *mut u8, size: usize) -> Option<usize> {
        let index = if self.free != NIL {
            let index = self.free;
            self.free = unsafe { base.add(index * size).cast::<usize>().read_unaligned() };
            index
        } else if self.uninit < self.capacity {
            let index = self.uninit;
            self.uninit += 1;
            index
        } else {
            return None;
        };
        self.bitmap[index / WORD_BITS] |= 1 << (index % WORD_BITS);
        self.allocated += 1;
        Some(index)
    }

    /// Returns an allocated block to the list.
    ///
    /// This operation has *O(1)* time complexity.
    ///
    /// # Safety
    ///
    /// * `base` must point to `capacity` blocks of `size` bytes each.
    /// * `index` must be allocated.
    pub(super) unsafe fn push(&mut self, base: *mut u8, size: usize, index: usize) {
        debug_assert!(self.is_allocated(index));
        unsafe { base.add(index * size).cast::<usize>().write_unaligned(self.free) };
        self.free = index;
        self.bitmap[index / WORD_BITS] &= !(1 << (index % WORD_BITS));
        self.allocated -= 1;
    }
}
