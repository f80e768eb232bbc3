//! The header shared by every kind of chunk
use core::ptr::NonNull;

/// What a chunk is currently used for.
///
/// `Fresh` is zero so that a freshly mapped, zero-filled chunk reads as
/// `Fresh` without being written to.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabKind {
    /// Zero-filled memory that has never been initialized.
    Fresh = 0,
    /// A [`Superslab`](crate::Superslab).
    Super,
    /// A chunk holding a single medium-sized slab.
    Medium,
    /// A chunk belonging to a large allocation.
    Large,
    /// A chunk whose pages were returned to the OS. The contents are
    /// unspecified.
    Decommitted,
}

/// The first bytes of every chunk.
///
/// `owner` is written once, by the owning thread, when the chunk is set up.
/// Afterwards any thread may read it to find where a freed object has to
/// be sent.
#[repr(C)]
#[derive(Debug)]
pub struct Allocslab<A> {
    kind: SlabKind,
    owner: Option<NonNull<A>>,
}

impl<A> Allocslab<A> {
    #[inline]
    pub fn kind(&self) -> SlabKind {
        self.kind
    }

    /// Change the chunk kind.
    ///
    /// Marking a superslab as anything other than [`SlabKind::Super`] or
    /// [`SlabKind::Fresh`] forces the next [`Superslab::init`] to rebuild its
    /// slot metadata.
    ///
    /// [`Superslab::init`]: crate::Superslab::init
    #[inline]
    pub fn set_kind(&mut self, kind: SlabKind) {
        self.kind = kind;
    }

    /// The allocator responsible for objects carved from this chunk.
    #[inline]
    pub fn owner(&self) -> Option<NonNull<A>> {
        self.owner
    }

    #[inline]
    pub(crate) fn set_owner(&mut self, owner: NonNull<A>) {
        self.owner = Some(owner);
    }

    /// Read the owner of the chunk headed by `this` without forming a
    /// reference to the header.
    ///
    /// # Safety
    ///
    /// `this` must point to an initialized chunk header. Other fields of the
    /// chunk may be concurrently written by its owning thread; `owner`
    /// itself must not be.
    ///
    /// A live `&mut Allocslab` held by the owning thread makes this read an
    /// aliasing violation under Stacked Borrows, even though no byte of
    /// `owner` changes. Tree Borrows accepts it.
    #[inline]
    pub unsafe fn read_owner(this: *const Self) -> Option<NonNull<A>> {
        core::ptr::addr_of!((*this).owner).read()
    }
}
