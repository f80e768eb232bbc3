/// Provides a constant default value.
///
/// For the types in this crate, `INIT` is also the value that an all-zero
/// memory block already holds, so a freshly mapped chunk needs no
/// construction pass.
pub trait Init {
    /// `Self`'s default value.
    const INIT: Self;
}
