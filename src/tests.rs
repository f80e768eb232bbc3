use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    ptr::NonNull,
    vec::Vec,
};

use crate::{SizeClass, Slab, SlabKind};

/// A `size`-byte, `size`-aligned memory block from the global allocator.
pub struct TestChunk {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl TestChunk {
    /// Allocate a zero-filled chunk, as if freshly mapped.
    pub fn zeroed(size: usize) -> Self {
        let layout = Layout::from_size_align(size, size).unwrap();
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).expect("out of memory");
        Self { ptr, layout }
    }

    /// Allocate a chunk that was last used for something else and whose
    /// contents are garbage, except for the chunk kind.
    pub fn dirty(size: usize, kind: SlabKind) -> Self {
        let chunk = Self::zeroed(size);
        unsafe {
            chunk.ptr.as_ptr().write_bytes(0xa5, size);
            // `Allocslab::kind` is the first byte of the chunk
            chunk.ptr.as_ptr().write(kind as u8);
        }
        chunk
    }

    pub fn as_ptr<T>(&self) -> NonNull<T> {
        self.ptr.cast()
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for TestChunk {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Keeps track of which slots of a superslab are handed out, independently
/// of the superslab.
#[derive(Debug)]
pub struct ShadowSuperslab {
    base: usize,
    slab_size: usize,
    /// The size class of each occupied slot. Slot 0 is the short slab.
    slots: Vec<Option<SizeClass>>,
}

impl ShadowSuperslab {
    pub fn new(base: NonNull<u8>, slab_size: usize, slab_count: usize) -> Self {
        Self {
            base: base.as_ptr() as usize,
            slab_size,
            slots: std::vec![None; slab_count],
        }
    }

    /// Convert `slab` to a slot index, checking that it's a slab boundary
    /// inside the chunk.
    pub fn index_of(&self, slab: NonNull<Slab>) -> usize {
        let addr = slab.as_ptr() as usize;
        assert!(addr >= self.base, "{:p} is below the chunk", slab);
        let offset = addr - self.base;
        assert_eq!(offset % self.slab_size, 0, "{:p} is misaligned", slab);
        let index = offset / self.slab_size;
        assert!(index < self.slots.len(), "{:p} is past the chunk", slab);
        index
    }

    pub fn allocate(&mut self, slab: NonNull<Slab>, sizeclass: SizeClass) -> usize {
        let index = self.index_of(slab);
        log::trace!("sa: slot {} ← size class {}", index, sizeclass);
        if let Some(old) = self.slots[index] {
            panic!(
                "slot {} was handed out again (already holding size class {})",
                index, old
            );
        }
        self.slots[index] = Some(sizeclass);
        index
    }

    pub fn deallocate(&mut self, index: usize) {
        log::trace!("sa: slot {} → free", index);
        assert!(
            self.slots[index].take().is_some(),
            "slot {} was returned but not in use",
            index
        );
    }

    pub fn sizeclass(&self, index: usize) -> Option<SizeClass> {
        self.slots[index]
    }

    pub fn short_in_use(&self) -> bool {
        self.slots[0].is_some()
    }

    /// The occupied regular slots.
    pub fn regular_in_use(&self) -> Vec<usize> {
        (1..self.slots.len())
            .filter(|&i| self.slots[i].is_some())
            .collect()
    }

    /// What the superslab's occupancy counter should read.
    pub fn expected_used(&self) -> u16 {
        (self.regular_in_use().len() * 2 + self.short_in_use() as usize) as u16
    }
}
