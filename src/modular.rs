//! Slot indices with arithmetic modulo the slot count
use core::fmt;

use crate::Init;

/// A `u8` that wraps around at `N`.
///
/// `N` must be a power of two no greater than `256`. This is checked by
/// `Superslab::VALID` for every instantiation that stores a `Mod`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mod<const N: usize>(u8);

impl<const N: usize> Init for Mod<N> {
    const INIT: Self = Self(0);
}

impl<const N: usize> Mod<N> {
    const MASK: usize = N - 1;

    /// Construct a `Mod` from `value % N`.
    #[inline]
    pub const fn new(value: usize) -> Self {
        Self((value & Self::MASK) as u8)
    }

    /// The representative in `0..N`.
    #[inline]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn wrapping_add(self, rhs: usize) -> Self {
        Self::new((self.0 as usize).wrapping_add(rhs))
    }

    #[inline]
    pub const fn wrapping_sub(self, rhs: usize) -> Self {
        Self::new((self.0 as usize).wrapping_sub(rhs))
    }
}

impl<const N: usize> fmt::Debug for Mod<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (mod {})", self.0, N)
    }
}
