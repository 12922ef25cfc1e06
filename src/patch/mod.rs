//! # Patch
//!
//! This module covers the uniform interface every patch exposes, whatever its width

pub mod mem;

use crate::width::Width;

/// A patch that can be written and undone on-command
///
/// # Safety
///
/// [`Patch::apply`] and [`Patch::revert`] must write nothing outside the `width().bytes()` bytes
/// starting at `address()`. [`mem`] relies on this to decide which pages to make writable.
pub unsafe trait Patch {
    /// Location of the patch
    fn address(&self) -> usize;

    /// Width of every write the patch makes
    fn width(&self) -> Width;

    /// Writes the replacement value
    fn apply(&self);

    /// Writes the original value back
    fn revert(&self);

    /// Applies the patch and returns a guard that reverts it when dropped
    fn scoped(&self) -> Applied<'_, Self>
    where
        Self: Sized,
    {
        self.apply();
        Applied { patch: self }
    }
}

/// Guard for an applied patch. When this guard is dropped, the original value is written back
#[must_use = "dropping the guard reverts the patch immediately"]
pub struct Applied<'a, P: Patch> {
    /// Patch to revert
    patch: &'a P,
}

impl<'a, P: Patch> Applied<'a, P> {
    /// Reverts the patch now rather than letting the guard go out of scope
    pub fn restore(self) {
        // handled in [`Drop::drop`]
    }

    /// Patch this guard will revert
    pub fn patch(&self) -> &'a P {
        self.patch
    }
}

impl<P: Patch> Drop for Applied<'_, P> {
    fn drop(&mut self) {
        self.patch.revert();
    }
}
