//! This crate implements the slab-packing core of a size-class-segregated
//! memory allocator.
//!
//!  - **A superslab is a chunk of `SLAB_SIZE * SLAB_COUNT` bytes, aligned to
//!    its size.** It is divided into `SLAB_COUNT` slabs that are handed out
//!    to, and taken back from, per-size-class object pools.
//!
//!  - **Slab acquire and release complete in constant time.** The unused
//!    slabs form a free list threaded through the per-slab metadata, and the
//!    occupancy of the whole superslab is a single counter.
//!
//!  - **Zero-filled memory is a ready superslab.** Free list links are stored
//!    relative to their own slot, so an all-zero header already lists every
//!    slab in ascending order. Initializing a freshly mapped chunk touches a
//!    handful of bytes.
//!
//!  - **The header doesn't waste a slab.** Slab 0 overlaps the header and is
//!    handed out as a *short slab* to size classes small enough to fit in
//!    what's left of it.
//!
//!  - **This crate supports `#![no_std]`.** Memory comes from the caller;
//!    size classes, page mapping and cross-thread frees are the caller's
//!    business as well.
//!
//! # Examples
//!
//! ```rust
//! use superslab::{Action, Status, Superslab};
//! use std::{alloc::{alloc_zeroed, dealloc, Layout}, ptr::NonNull};
//!
//! struct Owner;
//!
//! // 8 slabs of 16 KiB each
//! type Chunk = Superslab<Owner, 14, 8>;
//!
//! let layout = Layout::from_size_align(Chunk::CHUNK_SIZE, Chunk::CHUNK_SIZE).unwrap();
//! let mut owner = Owner;
//!
//! unsafe {
//!     let mut ss = NonNull::new(alloc_zeroed(layout)).unwrap().cast::<Chunk>();
//!     Chunk::init(ss, NonNull::from(&mut owner));
//!
//!     let slab = Chunk::alloc_slab(ss, 3);
//!     assert_eq!(ss.as_ref().slab_to_index(slab), 1);
//!     assert_eq!(ss.as_ref().get_status(), Status::Available);
//!
//!     // The slab's last object came back
//!     assert!(ss.as_mut().get_meta_mut(slab).return_object());
//!     assert_eq!(ss.as_mut().dealloc_slab(slab), Action::StatusChange);
//!     assert_eq!(ss.as_ref().get_status(), Status::Empty);
//!
//!     dealloc(ss.as_ptr().cast(), layout);
//! }
//! ```
//!
#![no_std]

mod allocslab;
mod config;
mod init;
mod meta;
mod modular;
mod superslab;
mod utils;
pub use self::{
    allocslab::{Allocslab, SlabKind},
    config::CACHELINE_SIZE,
    init::*,
    meta::{FreeObject, FreeQueue, Metaslab, SizeClass},
    modular::Mod,
    superslab::{Action, ChainLink, Chained, FreeSlots, Slab, Status, Superslab},
};

#[cfg(test)]
extern crate std;

#[cfg(test)]
mod tests;
