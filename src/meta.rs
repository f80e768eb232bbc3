//! Per-slab metadata
use core::ptr::NonNull;

use crate::Init;

/// An index into the size class table.
pub type SizeClass = u8;

/// A freed object, reused as a free list node.
#[repr(C)]
#[derive(Debug)]
pub struct FreeObject {
    next: Option<NonNull<FreeObject>>,
}

/// An intrusive LIFO of freed objects belonging to one slab.
#[repr(C)]
#[derive(Debug)]
pub struct FreeQueue {
    head: Option<NonNull<FreeObject>>,
}

impl Init for FreeQueue {
    const INIT: Self = Self { head: None };
}

impl const_default1::ConstDefault for FreeQueue {
    const DEFAULT: Self = Self::INIT;
}

impl FreeQueue {
    /// Forget every queued object.
    #[inline]
    pub fn init(&mut self) {
        self.head = None;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn peek(&self) -> Option<NonNull<FreeObject>> {
        self.head
    }

    /// Push a freed object.
    ///
    /// # Safety
    ///
    /// `obj` must be writable for `size_of::<FreeObject>()` bytes, suitably
    /// aligned, and not used by anyone else until it's popped.
    #[inline]
    pub unsafe fn push(&mut self, obj: NonNull<u8>) {
        let mut obj = obj.cast::<FreeObject>();
        obj.as_mut().next = self.head;
        self.head = Some(obj);
    }

    /// Pop the most recently pushed object.
    #[inline]
    pub fn pop(&mut self) -> Option<NonNull<u8>> {
        let obj = self.head?;
        // Safety: Every queued object was handed over by `push`
        self.head = unsafe { obj.as_ref().next };
        Some(obj.cast())
    }
}

/// The bookkeeping record of one slab slot.
///
/// The all-zero bit pattern is [`Metaslab::INIT`]: an unused slot whose
/// slab-level link points at the next slot.
#[repr(C)]
#[derive(Debug)]
pub struct Metaslab {
    /// Objects freed back to this slab.
    pub free_queue: FreeQueue,
    /// How many objects must be returned before the owning allocator has to
    /// look at this slab again. Zero iff the slot is unused.
    needed: u16,
    sizeclass: SizeClass,
    /// The slab-level free list link: `(next_index - this_index - 1) %
    /// SLAB_COUNT`. Meaningful only while the slot is unused.
    next: u8,
}

impl Init for Metaslab {
    const INIT: Self = Self {
        free_queue: FreeQueue::INIT,
        needed: 0,
        sizeclass: 0,
        next: 0,
    };
}

impl const_default1::ConstDefault for Metaslab {
    const DEFAULT: Self = Self::INIT;
}

impl Metaslab {
    #[inline]
    pub fn is_unused(&self) -> bool {
        self.needed == 0
    }

    /// Mark the slab as having no free objects.
    ///
    /// A slab handed out by a superslab is bump-allocated from until it's
    /// exhausted; treating it as full from the start means the object fast
    /// path never has to tell the two states apart.
    #[inline]
    pub fn set_full(&mut self) {
        self.needed = 1;
    }

    /// Prepare the record for a slab that is being handed out for
    /// `sizeclass`.
    #[inline]
    pub fn claim(&mut self, sizeclass: SizeClass) {
        self.free_queue.init();
        self.set_full();
        self.sizeclass = sizeclass;
    }

    #[inline]
    pub fn sizeclass(&self) -> SizeClass {
        self.sizeclass
    }

    #[inline]
    pub fn set_sizeclass(&mut self, sizeclass: SizeClass) {
        self.sizeclass = sizeclass;
    }

    #[inline]
    pub fn needed(&self) -> u16 {
        self.needed
    }

    /// Set how many objects are outstanding.
    #[inline]
    pub fn set_needed(&mut self, needed: u16) {
        self.needed = needed;
    }

    /// Count one returned object. Returns `true` if that was the last one the
    /// slab was waiting for.
    #[inline]
    pub fn return_object(&mut self) -> bool {
        debug_assert_ne!(self.needed, 0);
        self.needed -= 1;
        self.needed == 0
    }

    #[inline]
    pub(crate) fn next(&self) -> u8 {
        self.next
    }

    #[inline]
    pub(crate) fn set_next(&mut self, next: u8) {
        self.next = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    #[test]
    fn zeroed_is_init() {
        let m: Metaslab = unsafe { MaybeUninit::zeroed().assume_init() };
        assert!(m.is_unused());
        assert!(m.free_queue.is_empty());
        assert_eq!(m.sizeclass(), Metaslab::INIT.sizeclass());
        assert_eq!(m.next(), Metaslab::INIT.next());
    }

    #[test]
    fn claim_then_drain() {
        let mut m = Metaslab::INIT;
        m.claim(7);
        assert!(!m.is_unused());
        assert_eq!(m.sizeclass(), 7);
        assert_eq!(m.needed(), 1);

        m.set_needed(3);
        assert!(!m.return_object());
        assert!(!m.return_object());
        assert!(m.return_object());
        assert!(m.is_unused());
    }

    #[test]
    fn free_queue_lifo() {
        let mut objs = [[0usize; 2]; 3];
        let mut q = FreeQueue::INIT;
        assert_eq!(q.pop(), None);

        let ptrs: std::vec::Vec<NonNull<u8>> = objs
            .iter_mut()
            .map(|o| NonNull::from(o).cast::<u8>())
            .collect();
        for &p in &ptrs {
            unsafe { q.push(p) };
        }
        assert_eq!(q.peek().map(|p| p.cast::<u8>()), Some(ptrs[2]));
        assert_eq!(q.pop(), Some(ptrs[2]));
        assert_eq!(q.pop(), Some(ptrs[1]));

        // `claim` drops whatever is queued
        let mut m = Metaslab::INIT;
        m.free_queue = q;
        m.claim(1);
        assert!(m.free_queue.is_empty());
    }
}
