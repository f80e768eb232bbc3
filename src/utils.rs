use core::ptr::NonNull;

/// The distance in bytes from `base` to `p`.
///
/// Only the addresses are compared; neither pointer is dereferenced.
#[inline]
pub fn pointer_diff<T, U>(base: *const T, p: *const U) -> usize {
    debug_assert!(p as usize >= base as usize);
    (p as usize).wrapping_sub(base as usize)
}

/// Offset `base` by `offset` bytes, keeping `base`'s provenance.
///
/// # Safety
///
/// The result must not be null. This holds whenever `base + offset` stays
/// inside the allocation `base` points into.
#[inline]
pub unsafe fn pointer_offset<T, U>(base: NonNull<T>, offset: usize) -> NonNull<U> {
    NonNull::new_unchecked(base.as_ptr().cast::<u8>().wrapping_add(offset).cast())
}

/// Round `p` down to a multiple of `align`, keeping `p`'s provenance.
///
/// `align` must be a power of two.
#[rustversion::since(1.84)]
#[inline]
pub fn pointer_align_down<T, U>(p: *mut T, align: usize) -> *mut U {
    debug_assert!(align.is_power_of_two());
    p.map_addr(|addr| addr & !(align - 1)).cast()
}

/// Round `p` down to a multiple of `align`, keeping `p`'s provenance.
///
/// `align` must be a power of two.
// FIXME: Use `<*mut T>::map_addr` (stabilized in Rust 1.84)
#[rustversion::before(1.84)]
#[inline]
pub fn pointer_align_down<T, U>(p: *mut T, align: usize) -> *mut U {
    debug_assert!(align.is_power_of_two());
    p.cast::<u8>().wrapping_sub(p as usize & (align - 1)).cast()
}
