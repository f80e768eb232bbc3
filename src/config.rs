//! Platform constants
cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "aarch64", target_vendor = "apple"))] {
        /// The size of a cache line.
        ///
        /// Must agree with the `repr(align(...))` on [`ChainLink`](crate::ChainLink).
        pub const CACHELINE_SIZE: usize = 128;
    } else {
        /// The size of a cache line.
        ///
        /// Must agree with the `repr(align(...))` on [`ChainLink`](crate::ChainLink).
        pub const CACHELINE_SIZE: usize = 64;
    }
}
