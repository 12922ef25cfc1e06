//! # Value patch
//!
//! A single fixed-width overwrite at a raw address, remembering what it replaced

use log::trace;

use crate::patch::Patch;
use crate::width::{Width, Word};

/// Where the original value of a [`ValuePatch`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Read from the target address when the patch was created
    Captured,
    /// Handed in by the caller; the target may never have held it
    Supplied,
}

/// Patch of one `T`-sized value at `address`.
///
/// The width of every read and write is fixed by `T`, so a patch can never touch memory with a
/// different width than the one it was created with. The patch does not own the memory it points
/// at; it never allocates or frees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePatch<T: Word> {
    /// Location of the patch
    address: usize,
    /// Value to write back on [`ValuePatch::revert`]
    original: T,
    /// Value to write on [`ValuePatch::apply`]
    replaced: T,
    /// How `original` was obtained
    origin: Origin,
}

impl<T: Word> ValuePatch<T> {
    /// Creates a patch whose original value is whatever `address` holds right now.
    ///
    /// Nothing is written until [`ValuePatch::apply`].
    ///
    /// # Safety
    ///
    /// `address` must be valid for reads and writes of `T::WIDTH.bytes()` bytes, and stay valid for
    /// as long as the patch may be applied or reverted. It must already hold meaningful data.
    pub unsafe fn capture(address: usize, replaced: T) -> Self {
        // Safety: caller guarantees `address` is readable for the width of `T`
        let original = T::read(address);
        Self {
            address,
            original,
            replaced,
            origin: Origin::Captured,
        }
    }

    /// Creates a patch with a caller-chosen original value. `address` is not read.
    ///
    /// # Safety
    ///
    /// `address` must be valid for writes of `T::WIDTH.bytes()` bytes, and stay valid for as long
    /// as the patch may be applied or reverted.
    pub unsafe fn with_original(address: usize, original: T, replaced: T) -> Self {
        Self {
            address,
            original,
            replaced,
            origin: Origin::Supplied,
        }
    }

    /// Writes the replacement value
    pub fn apply(&self) {
        trace!(
            "patching {} at {:#x}: {:#x} -> {:#x}",
            T::WIDTH,
            self.address,
            self.original,
            self.replaced
        );
        // Safety: the creator guaranteed `address` stays writable for the width of `T`
        unsafe { T::write(self.address, self.replaced) }
    }

    /// Writes the original value back
    pub fn revert(&self) {
        trace!(
            "restoring {} at {:#x}: {:#x}",
            T::WIDTH,
            self.address,
            self.original
        );
        // Safety: see `apply`
        unsafe { T::write(self.address, self.original) }
    }

    /// Whether the target currently holds the replacement value.
    ///
    /// This reads memory; the patch itself does not remember whether it was applied.
    pub fn is_applied(&self) -> bool {
        // Safety: the creator guaranteed `address` is valid for the width of `T`
        unsafe { T::read(self.address) == self.replaced }
    }

    /// Location of the patch
    pub fn address(&self) -> usize {
        self.address
    }

    /// Value written by [`ValuePatch::revert`]
    pub fn original(&self) -> T {
        self.original
    }

    /// Value written by [`ValuePatch::apply`]
    pub fn replaced(&self) -> T {
        self.replaced
    }

    /// How the original value was obtained
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Width of every access this patch makes
    pub fn width(&self) -> Width {
        T::WIDTH
    }
}

unsafe impl<T: Word> Patch for ValuePatch<T> {
    fn address(&self) -> usize {
        self.address
    }

    fn width(&self) -> Width {
        T::WIDTH
    }

    fn apply(&self) {
        ValuePatch::apply(self)
    }

    fn revert(&self) {
        ValuePatch::revert(self)
    }
}
