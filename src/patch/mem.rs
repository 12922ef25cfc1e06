//! This module writes patches into memory that's normally unwritable
//!
//! The pages under the patch are made writable, the patch is written, and the previous protection
//! is put back before returning.

use log::trace;
use region::Protection;

use crate::error::PatchError;

use super::Patch;

/// Applies `patch`, lifting write protection on its target for the duration of the write
///
/// # Errors
///
/// Fails if the target's protection can't be queried or changed. Nothing is written in that case.
pub fn apply_writable<P: Patch + ?Sized>(patch: &P) -> Result<(), PatchError> {
    unprotected(patch, P::apply)
}

/// Reverts `patch`, lifting write protection on its target for the duration of the write
///
/// # Errors
///
/// See [`apply_writable`].
pub fn revert_writable<P: Patch + ?Sized>(patch: &P) -> Result<(), PatchError> {
    unprotected(patch, P::revert)
}

/// Runs `write` on `patch` with its target temporarily writable
fn unprotected<P: Patch + ?Sized>(patch: &P, write: fn(&P)) -> Result<(), PatchError> {
    let start = patch.address();
    let end = start + patch.width().bytes();

    // every page keeps whatever access it already grants, executable code included
    let mut guards = Vec::new();
    let mut covered = 0;
    for mapping in region::query_range(start as *const u8, end - start)? {
        let mapping = mapping?;
        let range = mapping.as_range();
        let (from, to) = (range.start.max(start), range.end.min(end));
        trace!(
            "unprotecting {:#x}..{:#x} ({:?})",
            from,
            to,
            mapping.protection()
        );

        // Safety: `Patch` guarantees the write stays within `start..end`, and each guard restores
        // the previous protection of its pages when it drops
        let guard = unsafe {
            region::protect_with_handle(
                from as *const u8,
                to - from,
                mapping.protection() | Protection::WRITE,
            )?
        };
        guards.push(guard);
        covered += to - from;
    }

    // a gap in the mappings means part of the target isn't there to write to
    if covered != end - start {
        return Err(region::Error::UnmappedRegion.into());
    }

    write(patch);
    Ok(())
}
