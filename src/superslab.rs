//! The superslab: a chunk carved into slabs
use core::{
    fmt, mem,
    ptr::{addr_of, addr_of_mut, NonNull},
};

use crate::{
    allocslab::{Allocslab, SlabKind},
    meta::{Metaslab, SizeClass},
    modular::Mod,
    utils::{pointer_align_down, pointer_diff, pointer_offset},
    Init, CACHELINE_SIZE,
};

/// A `SLAB_SIZE`-aligned slab inside a superslab.
///
/// Slabs are only ever handled by pointer. The objects they hold belong to
/// whoever requested the slab.
#[repr(C)]
pub struct Slab {
    _opaque: [u8; 0],
}

/// The occupancy of a superslab, derived from its occupancy counter.
///
/// The owning allocator keeps a superslab on the list matching this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Every slab, including the short slab, is in use.
    Full,
    /// At least one regular slab is available.
    Available,
    /// Every regular slab is in use; the short slab is not.
    OnlyShortSlabAvailable,
    /// No slab is in use.
    Empty,
}

/// Tells the owning allocator what it has to do after returning a slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// No slab was returned.
    NoSlabReturn = 0,
    /// [`Superslab::get_status`] is the same as before.
    NoStatusChange = 1,
    /// [`Superslab::get_status`] has changed; the superslab may have to move
    /// to a different list.
    StatusChange = 2,
}

/// The links used by an external doubly linked list of `T`s.
///
/// Aligned to [`CACHELINE_SIZE`] so that the fields
/// placed before it never share a cache line with it.
#[repr(C)]
#[cfg_attr(
    all(target_arch = "aarch64", target_vendor = "apple"),
    repr(align(128))
)]
#[cfg_attr(
    not(all(target_arch = "aarch64", target_vendor = "apple")),
    repr(align(64))
)]
pub struct ChainLink<T> {
    next: Option<NonNull<T>>,
    prev: Option<NonNull<T>>,
}

const _: () = assert!(mem::align_of::<ChainLink<()>>() == CACHELINE_SIZE);

impl<T> Init for ChainLink<T> {
    const INIT: Self = Self {
        next: None,
        prev: None,
    };
}

impl<T> const_default1::ConstDefault for ChainLink<T> {
    const DEFAULT: Self = Self::INIT;
}

impl<T> fmt::Debug for ChainLink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainLink")
            .field("next", &self.next)
            .field("prev", &self.prev)
            .finish()
    }
}

impl<T> ChainLink<T> {
    #[inline]
    pub fn next(&self) -> Option<NonNull<T>> {
        self.next
    }

    #[inline]
    pub fn prev(&self) -> Option<NonNull<T>> {
        self.prev
    }

    #[inline]
    pub fn set_next(&mut self, next: Option<NonNull<T>>) {
        self.next = next;
    }

    #[inline]
    pub fn set_prev(&mut self, prev: Option<NonNull<T>>) {
        self.prev = prev;
    }
}

/// Implemented by types that an external list chains through a
/// [`ChainLink`].
///
/// The links belong to the list. The implementor never inspects them.
pub trait Chained: Sized {
    fn link(&self) -> &ChainLink<Self>;
    fn link_mut(&mut self) -> &mut ChainLink<Self>;
}

/// The header of a `CHUNK_SIZE`-sized and -aligned chunk that is divided into
/// `SLAB_COUNT` slabs of `SLAB_SIZE` bytes each.
///
/// # Layout
///
#[doc = svgbobdoc::transform!(
/// <center>
/// ```svgbob
///  base                                                    base + CHUNK_SIZE
///   |<------------- SLAB_SIZE ------------>|                              |
///   +-----------+--------------------------+-----------+-----+-----------+
///   | Superslab |        short slab        |  slab 1   | ... | slab N-1  |
///   +-----------+--------------------------+-----------+-----+-----------+
///   |<-HEADER-->|<----- SHORT_SLAB_SIZE -->|
/// ```
/// </center>
)]
///
/// Slot 0 overlaps this header, so only objects fitting in
/// [`Self::SHORT_SLAB_SIZE`] bytes can be placed in it (the *short slab*).
/// Slots `1..SLAB_COUNT` are regular slabs.
///
/// The metadata of every slot lives in the header. Unused regular slots form
/// a singly linked list whose links are relative: a slot stores
/// `(next - index - 1) % SLAB_COUNT`. An all-zero header is therefore a list
/// visiting `1, 2, ..., SLAB_COUNT - 1` and ending at slot 0, which is how a
/// freshly mapped chunk comes ready to use.
///
/// # Occupancy
///
/// `used` is twice the number of occupied regular slabs, plus one if the
/// short slab is occupied:
///
/// | `used`                   | [`Status`]                         |
/// | ------------------------ | ---------------------------------- |
/// | `0`                      | [`Status::Empty`]                  |
/// | `1..2 * (N - 1)`         | [`Status::Available`]              |
/// | `2 * (N - 1)`            | [`Status::OnlyShortSlabAvailable`] |
/// | `2 * (N - 1) + 1`        | [`Status::Full`]                   |
///
/// # Threads
///
/// Only the owning thread may call the methods of this type. The exception is
/// [`Self::remote_owner`], which any thread may use to find where to send an
/// object it frees. The owner is kept a cache line apart from the fields the
/// owning thread writes.
///
/// [`Self::alloc_slab`] and [`Self::alloc_short_slab`] only touch the
/// occupancy fields, so remote reads may overlap them. The `&mut self`
/// methods ([`Self::get_meta_mut`], [`Self::dealloc_slab`],
/// [`Self::dealloc_short_slab`], [`Self::header_mut`]) borrow the whole
/// header including the owner. No byte of the owner is written while they
/// run, but under the Stacked Borrows model a remote read during that borrow
/// is still an aliasing violation; Tree Borrows accepts it.
#[repr(C)]
pub struct Superslab<A, const SLAB_BITS: u32, const SLAB_COUNT: usize> {
    header: Allocslab<A>,
    link: ChainLink<Superslab<A, SLAB_BITS, SLAB_COUNT>>,
    /// The first unused regular slot. Slot 0 terminates the list.
    head: Mod<SLAB_COUNT>,
    used: u16,
    meta: [Metaslab; SLAB_COUNT],
}

impl<A, const SLAB_BITS: u32, const SLAB_COUNT: usize> Chained
    for Superslab<A, SLAB_BITS, SLAB_COUNT>
{
    #[inline]
    fn link(&self) -> &ChainLink<Self> {
        &self.link
    }

    #[inline]
    fn link_mut(&mut self) -> &mut ChainLink<Self> {
        &mut self.link
    }
}

impl<A, const SLAB_BITS: u32, const SLAB_COUNT: usize> fmt::Debug
    for Superslab<A, SLAB_BITS, SLAB_COUNT>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Superslab")
            .field("kind", &self.header.kind())
            .field("owner", &self.header.owner())
            .field("head", &self.head)
            .field("used", &self.used)
            .field("status", &self.get_status())
            .finish()
    }
}

impl<A, const SLAB_BITS: u32, const SLAB_COUNT: usize> Superslab<A, SLAB_BITS, SLAB_COUNT> {
    /// The size of a slab.
    pub const SLAB_SIZE: usize = 1 << SLAB_BITS;

    /// The size and alignment of the whole chunk.
    pub const CHUNK_SIZE: usize = Self::SLAB_SIZE * SLAB_COUNT;

    /// The number of bytes the header takes away from slot 0.
    pub const HEADER_SIZE: usize = mem::size_of::<Self>();

    /// The usable size of the short slab.
    pub const SHORT_SLAB_SIZE: usize = Self::SLAB_SIZE.saturating_sub(Self::HEADER_SIZE);

    /// `used` when every regular slab is occupied.
    const USED_ALMOST_FULL: u16 = ((SLAB_COUNT - 1) << 1) as u16;

    /// `used` when every slab is occupied.
    const USED_FULL: u16 = Self::USED_ALMOST_FULL + 1;

    /// Evaluates successfully if the parameters are valid.
    const VALID: () = {
        if SLAB_COUNT < 2 || !SLAB_COUNT.is_power_of_two() {
            panic!("`SLAB_COUNT` must be a power of two no less than 2");
        }
        if SLAB_COUNT > 256 {
            panic!("`SLAB_COUNT` must be no greater than 256");
        }
        if SLAB_BITS >= usize::BITS {
            panic!("`SLAB_BITS` is too large");
        }
        if (1usize << SLAB_BITS).checked_mul(SLAB_COUNT).is_none() {
            panic!("`CHUNK_SIZE` overflows `usize`");
        }
        if (1usize << SLAB_BITS) <= mem::size_of::<Self>() {
            panic!("`SLAB_SIZE` must be larger than the superslab header");
        }
    };

    /// Get the superslab containing the address `p`.
    ///
    /// This only rounds `p` down to a multiple of [`Self::CHUNK_SIZE`]; the
    /// result is not dereferenced.
    #[inline]
    pub fn get(p: *const u8) -> *mut Self {
        pointer_align_down(p as *mut u8, Self::CHUNK_SIZE)
    }

    /// Find the allocator owning the object at `p`. Can be called from any
    /// thread.
    ///
    /// # Safety
    ///
    /// `p` must point into a chunk initialized by [`Self::init`].
    ///
    /// The owning thread must not hold a `&mut Self` (or `&mut` to the
    /// header) across this read if the program is to be sound under Stacked
    /// Borrows. Under Tree Borrows, and in terms of actual data races, only
    /// concurrent writes to the owner field matter, and nothing writes it
    /// after [`Self::init`]. See the "Threads" section of [`Superslab`].
    #[inline]
    pub unsafe fn remote_owner(p: *const u8) -> Option<NonNull<A>> {
        let this = Self::get(p);
        Allocslab::read_owner(addr_of!((*this).header))
    }

    /// Check if objects of `object_size` bytes can be placed in the short
    /// slab.
    ///
    /// Size classes are meant to evaluate this once, when they are defined.
    #[inline]
    pub const fn fits_short_slab(object_size: usize) -> bool {
        object_size <= Self::SHORT_SLAB_SIZE
    }

    /// Set up the chunk at `this` as a superslab owned by `owner`.
    ///
    /// If the chunk isn't [`SlabKind::Fresh`], the occupancy counter and all
    /// slot metadata are reset first. A fresh chunk is already zero-filled,
    /// and zero is the reset state.
    ///
    /// # Safety
    ///
    ///  - `this` must be aligned to [`Self::CHUNK_SIZE`] and valid for reads
    ///    and writes of `CHUNK_SIZE` bytes. It must not be aliased by any
    ///    live reference.
    ///  - The chunk must either be zero-filled or start with an
    ///    [`Allocslab`] header written by this crate. In the latter case no
    ///    slab of the chunk may be in use.
    ///
    pub unsafe fn init(this: NonNull<Self>, owner: NonNull<A>) {
        let () = Self::VALID;
        debug_assert_eq!(this.as_ptr() as usize % Self::CHUNK_SIZE, 0);

        let ss = &mut *this.as_ptr();

        if ss.header.kind() != SlabKind::Fresh {
            ss.used = 0;
            for meta in ss.meta.iter_mut() {
                *meta = Metaslab::INIT;
            }
        }

        ss.header.set_kind(SlabKind::Super);
        ss.header.set_owner(owner);

        // Point `head` at the first regular slab
        ss.head = Mod::new(1);

        log::trace!(
            "superslab {:p}: initialized for {:p} ({} slabs of {} bytes)",
            this,
            owner,
            SLAB_COUNT,
            Self::SLAB_SIZE
        );

        #[cfg(debug_assertions)]
        {
            ss.check_free_list();
            for meta in ss.meta.iter() {
                assert!(meta.is_unused());
            }
        }
    }

    /// Walk the slab free list and check that it holds exactly the unused
    /// regular slots and ends at the short slab.
    #[cfg(debug_assertions)]
    fn check_free_list(&self) {
        let num_free = SLAB_COUNT - 1 - (self.used as usize >> 1);
        let mut curr = self.head;
        for _ in 0..num_free {
            assert_ne!(curr.get(), 0, "the free slab list is too short");
            let meta = &self.meta[curr.get()];
            assert!(meta.is_unused());
            curr = curr.wrapping_add(meta.next() as usize + 1);
        }
        assert_eq!(curr.get(), 0, "the free slab list is not terminated");
    }

    #[inline]
    pub fn header(&self) -> &Allocslab<A> {
        &self.header
    }

    #[inline]
    pub fn header_mut(&mut self) -> &mut Allocslab<A> {
        &mut self.header
    }

    #[inline]
    pub fn kind(&self) -> SlabKind {
        self.header.kind()
    }

    #[inline]
    pub fn owner(&self) -> Option<NonNull<A>> {
        self.header.owner()
    }

    /// The raw occupancy counter.
    #[inline]
    pub fn used(&self) -> u16 {
        self.used
    }

    /// The slot the next [`Self::alloc_slab`] will hand out.
    #[inline]
    pub fn head(&self) -> usize {
        self.head.get()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Every slab, including the short slab, is in use.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.used == Self::USED_FULL
    }

    /// Every regular slab is in use.
    #[inline]
    pub fn is_almost_full(&self) -> bool {
        self.used >= Self::USED_ALMOST_FULL
    }

    pub fn get_status(&self) -> Status {
        if !self.is_almost_full() {
            if !self.is_empty() {
                return Status::Available;
            }

            return Status::Empty;
        }

        if !self.is_full() {
            return Status::OnlyShortSlabAvailable;
        }

        Status::Full
    }

    /// Get the slot index of `slab`.
    #[inline]
    pub fn slab_to_index(&self, slab: NonNull<Slab>) -> usize {
        let index = pointer_diff(self as *const Self, slab.as_ptr()) >> SLAB_BITS;
        debug_assert_eq!(index, index as u8 as usize);
        debug_assert!(index < SLAB_COUNT);
        index
    }

    /// Get the slab at slot `index`. The inverse of [`Self::slab_to_index`].
    ///
    /// # Safety
    ///
    /// `this` must point to a chunk of [`Self::CHUNK_SIZE`] bytes.
    #[inline]
    pub unsafe fn slab_address(this: NonNull<Self>, index: usize) -> NonNull<Slab> {
        debug_assert!(index < SLAB_COUNT);
        pointer_offset(this, index << SLAB_BITS)
    }

    #[inline]
    pub fn get_meta(&self, slab: NonNull<Slab>) -> &Metaslab {
        &self.meta[self.slab_to_index(slab)]
    }

    #[inline]
    pub fn get_meta_mut(&mut self, slab: NonNull<Slab>) -> &mut Metaslab {
        let index = self.slab_to_index(slab);
        &mut self.meta[index]
    }

    /// Iterate over the unused regular slots in the order
    /// [`Self::alloc_slab`] would hand them out.
    #[inline]
    pub fn free_slots(&self) -> FreeSlots<'_, A, SLAB_BITS, SLAB_COUNT> {
        FreeSlots {
            superslab: self,
            next: self.head,
            remaining: SLAB_COUNT - 1,
        }
    }

    /// Hand out the short slab for `sizeclass`, or a regular slab if the short
    /// slab is already in use.
    ///
    /// The short slab is `this` itself; only [`Self::SHORT_SLAB_SIZE`] bytes
    /// past the header are usable.
    ///
    /// # Safety
    ///
    ///  - `this` must point to a superslab initialized by [`Self::init`],
    ///    with provenance over the whole chunk, and must not be aliased by any
    ///    live reference.
    ///  - The superslab must not be [`Status::Full`].
    ///
    pub unsafe fn alloc_short_slab(this: NonNull<Self>, sizeclass: SizeClass) -> NonNull<Slab> {
        let p = this.as_ptr();
        if (*addr_of!((*p).used) & 1) == 1 {
            return Self::alloc_slab(this, sizeclass);
        }

        // `header` is left alone; remote threads may be reading the owner
        let metaz = &mut (*addr_of_mut!((*p).meta))[0];
        debug_assert!(metaz.is_unused());

        // Bump allocation will fill the short slab, so it starts out with no
        // free objects and can't be handed back before all of them return
        metaz.claim(sizeclass);

        *addr_of_mut!((*p).used) += 1;
        this.cast()
    }

    /// Hand out a regular slab for `sizeclass`.
    ///
    /// # Safety
    ///
    ///  - `this` must point to a superslab initialized by [`Self::init`],
    ///    with provenance over the whole chunk, and must not be aliased by any
    ///    live reference.
    ///  - A regular slab must be available, i.e., [`Self::is_almost_full`]
    ///    must be `false`.
    ///
    pub unsafe fn alloc_slab(this: NonNull<Self>, sizeclass: SizeClass) -> NonNull<Slab> {
        let p = this.as_ptr();
        // `header` is left alone; remote threads may be reading the owner
        let head = &mut *addr_of_mut!((*p).head);
        let used = &mut *addr_of_mut!((*p).used);
        let meta = &mut *addr_of_mut!((*p).meta);

        let h = *head;
        debug_assert!(
            *used < Self::USED_ALMOST_FULL,
            "no regular slab is available"
        );
        debug_assert_ne!(h.get(), 0);
        let slab = Self::slab_address(this, h.get());

        let metah = &mut meta[h.get()];
        debug_assert!(metah.is_unused());
        let n = metah.next();

        // Bump allocation will fill the slab, so it starts out with no free
        // objects and can't be handed back before all of them return
        metah.claim(sizeclass);

        *head = h.wrapping_add(n as usize + 1);
        *used += 2;

        slab
    }

    /// Take back a regular slab.
    ///
    /// Returns [`Action::StatusChange`] if [`Self::get_status`] has changed.
    ///
    /// `slab` must be a regular slab of this superslab that is currently in
    /// use, and its metadata must have returned to the unused state.
    pub fn dealloc_slab(&mut self, slab: NonNull<Slab>) -> Action {
        let index = self.slab_to_index(slab);
        debug_assert_ne!(
            index, 0,
            "the short slab must be returned by `dealloc_short_slab`"
        );
        debug_assert!(self.used >= 2);

        // Link to the current head
        let n = self.head.wrapping_sub(index + 1).get() as u8;

        let meta = &mut self.meta[index];
        meta.set_sizeclass(0);
        meta.set_next(n);
        self.head = Mod::new(index);

        let was_almost_full = self.is_almost_full();
        self.used -= 2;

        debug_assert!(self.meta[index].is_unused());
        if was_almost_full || self.is_empty() {
            return Action::StatusChange;
        }

        Action::NoStatusChange
    }

    /// Take back the short slab.
    ///
    /// Returns [`Action::StatusChange`] if [`Self::get_status`] has changed.
    ///
    /// The short slab must be in use, and its metadata must have returned to
    /// the unused state.
    pub fn dealloc_short_slab(&mut self) -> Action {
        debug_assert_eq!(self.used & 1, 1, "the short slab is not in use");

        let was_full = self.is_full();
        self.used -= 1;

        debug_assert!(self.meta[0].is_unused());
        if was_full || self.is_empty() {
            return Action::StatusChange;
        }

        Action::NoStatusChange
    }
}

/// An iterator over the unused regular slots of a [`Superslab`], created by
/// [`Superslab::free_slots`].
pub struct FreeSlots<'a, A, const SLAB_BITS: u32, const SLAB_COUNT: usize> {
    superslab: &'a Superslab<A, SLAB_BITS, SLAB_COUNT>,
    next: Mod<SLAB_COUNT>,
    /// Bounds the walk in case the list is corrupted
    remaining: usize,
}

impl<A, const SLAB_BITS: u32, const SLAB_COUNT: usize> FreeSlots<'_, A, SLAB_BITS, SLAB_COUNT> {
    /// Whether the walk has arrived at the short slab, which terminates the
    /// list.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.next.get() == 0
    }
}

impl<A, const SLAB_BITS: u32, const SLAB_COUNT: usize> Iterator
    for FreeSlots<'_, A, SLAB_BITS, SLAB_COUNT>
{
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let index = self.next.get();
        if index == 0 || self.remaining == 0 {
            return None;
        }

        self.remaining -= 1;
        let n = self.superslab.meta[index].next();
        self.next = self.next.wrapping_add(n as usize + 1);
        Some(index)
    }
}
