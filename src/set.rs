//! # Set
//!
//! Ordered collection of handles that are applied together and unwound together

use std::mem;

use log::{debug, error};

use crate::error::PatchError;
use crate::handle::PatchHandle;
use crate::patch::mem::{apply_writable, revert_writable};

/// How a set was last applied as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Plain writes, see [`PatchSet::apply_all`]
    Plain,
    /// Writes with protection lifted, see [`PatchSet::apply_all_writable`]
    Writable,
}

/// Patches applied front to back and reverted back to front.
///
/// Reverting in reverse means overlapping patches unwind to what memory held before the first
/// one was applied. A set that was applied as a whole reverts itself when dropped; individual
/// handles inside it are not tracked. The revert on drop goes through the same path as the apply,
/// so a set applied with [`PatchSet::apply_all_writable`] lifts write protection again to unwind.
#[derive(Debug, Default)]
pub struct PatchSet {
    /// Handles in the order they were added
    handles: Vec<PatchHandle>,
    /// How the set was applied, if the last whole-set operation was an apply
    applied: Option<Mode>,
}

impl PatchSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handle to the end of the set. It is not applied
    pub fn push(&mut self, handle: PatchHandle) {
        self.handles.push(handle);
    }

    /// Number of handles in the set
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the set has no handles
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Whether the last whole-set operation was an apply
    pub fn is_applied(&self) -> bool {
        self.applied.is_some()
    }

    /// Handles in the order they were added
    pub fn iter(&self) -> std::slice::Iter<'_, PatchHandle> {
        self.handles.iter()
    }

    /// Applies every handle, first to last
    pub fn apply_all(&mut self) {
        debug!("applying {} patches", self.handles.len());
        self.handles.iter().for_each(PatchHandle::apply);
        self.applied = Some(Mode::Plain);
    }

    /// Reverts every handle, last to first
    pub fn revert_all(&mut self) {
        debug!("reverting {} patches", self.handles.len());
        self.handles.iter().rev().for_each(PatchHandle::revert);
        self.applied = None;
    }

    /// [`PatchSet::apply_all`] with write protection lifted around every write
    ///
    /// # Errors
    ///
    /// Stops at the first handle whose target protection can't be changed. The handles before it
    /// are reverted again, last to first, and the set does not count as applied.
    pub fn apply_all_writable(&mut self) -> Result<(), PatchError> {
        debug!("applying {} patches to protected memory", self.handles.len());
        for (done, handle) in self.handles.iter().enumerate() {
            if let Err(e) = apply_writable(handle) {
                error!("patch {done} at {:#x} failed, unwinding: {e}", handle.address());
                for applied in self.handles[..done].iter().rev() {
                    if let Err(e) = revert_writable(applied) {
                        error!("failed to unwind patch at {:#x}: {e}", applied.address());
                    }
                }
                self.applied = None;
                return Err(e);
            }
        }
        self.applied = Some(Mode::Writable);
        Ok(())
    }

    /// [`PatchSet::revert_all`] with write protection lifted around every write
    ///
    /// # Errors
    ///
    /// Stops at the first handle whose target protection can't be changed. The set still counts as
    /// applied, so dropping it tries the whole revert again.
    pub fn revert_all_writable(&mut self) -> Result<(), PatchError> {
        debug!("reverting {} patches in protected memory", self.handles.len());
        self.handles.iter().rev().try_for_each(revert_writable)?;
        self.applied = None;
        Ok(())
    }

    /// Hands back the handles without reverting anything
    pub fn into_handles(mut self) -> Vec<PatchHandle> {
        self.applied = None;
        mem::take(&mut self.handles)
    }
}

impl Extend<PatchHandle> for PatchSet {
    fn extend<I: IntoIterator<Item = PatchHandle>>(&mut self, iter: I) {
        self.handles.extend(iter);
    }
}

impl FromIterator<PatchHandle> for PatchSet {
    fn from_iter<I: IntoIterator<Item = PatchHandle>>(iter: I) -> Self {
        Self {
            handles: iter.into_iter().collect(),
            applied: None,
        }
    }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a PatchHandle;
    type IntoIter = std::slice::Iter<'a, PatchHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Drop for PatchSet {
    fn drop(&mut self) {
        match self.applied {
            Some(Mode::Plain) => self.revert_all(),
            Some(Mode::Writable) => {
                if let Err(e) = self.revert_all_writable() {
                    error!("failed to revert {} patches on drop: {e}", self.handles.len());
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{hint, slice};

    use region::Protection;

    use crate::error::PatchError;
    use crate::handle::PatchHandle;
    use crate::set::PatchSet;
    use crate::value::tests::{protect_lock, Scratch};
    use crate::width::Width;

    #[test]
    /// Applying and reverting a mixed set restores the buffer exactly
    fn test_apply_revert() {
        let scratch = Scratch::new(0x5a);
        let before = scratch.bytes().to_vec();

        let mut set = PatchSet::new();
        unsafe {
            set.push(PatchHandle::capture::<u8>(scratch.at(1), 0));
            set.push(PatchHandle::capture::<u32>(scratch.at(4), 0x0102_0304));
            set.push(PatchHandle::capture::<u64>(scratch.at(8), 0));
        }
        assert_eq!(set.len(), 3);
        assert!(!set.is_applied());

        set.apply_all();
        assert!(set.is_applied());
        assert_eq!(scratch.bytes()[0], 0x5a);
        assert_eq!(scratch.bytes()[1], 0);
        assert_eq!(&scratch.bytes()[4..8], 0x0102_0304u32.to_ne_bytes());
        assert_eq!(&scratch.bytes()[8..16], [0; 8]);

        set.revert_all();
        assert!(!set.is_applied());
        assert_eq!(scratch.bytes(), &before[..]);
    }

    #[test]
    /// Overlapping patches unwind to the state before the first apply
    fn test_overlapping() {
        let scratch = Scratch::new(0);

        let wide = unsafe { PatchHandle::capture::<u32>(scratch.at(0), u32::MAX) };
        wide.apply();
        // captured while `wide` is applied
        let narrow = unsafe { PatchHandle::capture::<u8>(scratch.at(0), 0x10) };
        wide.revert();

        let mut set: PatchSet = vec![wide, narrow].into_iter().collect();
        set.apply_all();
        assert_eq!(&scratch.bytes()[..4], [0x10, 0xff, 0xff, 0xff]);

        set.revert_all();
        assert!(scratch.bytes().iter().all(|b| *b == 0));
    }

    #[test]
    /// Dropping an applied set reverts it
    fn test_drop_reverts() {
        let scratch = Scratch::new(0);
        {
            let mut set = PatchSet::new();
            unsafe { set.push(PatchHandle::capture::<u16>(scratch.at(2), 0xffff)) };
            set.apply_all();
            assert_eq!(&scratch.bytes()[2..4], [0xff, 0xff]);
        }
        assert!(scratch.bytes().iter().all(|b| *b == 0));
    }

    #[test]
    /// Handing the handles back leaves memory patched
    fn test_into_handles() {
        let scratch = Scratch::new(0);
        let mut set = PatchSet::new();
        unsafe { set.push(PatchHandle::capture::<u8>(scratch.at(0), 9)) };
        set.apply_all();

        let handles = set.into_handles();
        assert_eq!(scratch.bytes()[0], 9);
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].width(), Width::W8);

        handles[0].revert();
        assert_eq!(scratch.bytes()[0], 0);
    }

    #[test]
    /// The writable variants patch ordinary memory too
    fn test_writable() {
        let scratch = Scratch::new(0);
        let mut set = PatchSet::new();
        unsafe {
            set.extend([
                PatchHandle::capture::<u32>(scratch.at(0), 0xaaaa_aaaa),
                PatchHandle::capture::<u32>(scratch.at(4), 0xbbbb_bbbb),
            ]);
        }

        set.apply_all_writable().unwrap();
        assert!(set.is_applied());
        assert_eq!(&scratch.bytes()[..8], [0xaa, 0xaa, 0xaa, 0xaa, 0xbb, 0xbb, 0xbb, 0xbb]);

        set.revert_all_writable().unwrap();
        assert!(!set.is_applied());
        assert!(scratch.bytes().iter().all(|b| *b == 0));
    }

    #[test]
    /// Every handle is visited in insertion order
    fn test_iter() {
        let scratch = Scratch::new(0);
        let set: PatchSet = unsafe {
            vec![
                PatchHandle::capture::<u64>(scratch.at(8), 1),
                PatchHandle::capture::<u8>(scratch.at(0), 1),
            ]
        }
        .into_iter()
        .collect();

        let widths: Vec<_> = (&set).into_iter().map(PatchHandle::width).collect();
        assert_eq!(widths, [Width::W64, Width::W8]);
        assert!(!set.is_empty());
    }

    /// Read-only bytes for the writable set tests
    static DATA: [u8; 8] = *b"12345678";

    #[test]
    /// A set applied to read-only memory lifts the protection again when dropped
    fn test_drop_writable() {
        let _lock = protect_lock();
        // hide where the pointer came from so reads aren't folded into the constant
        let ptr = hint::black_box(DATA.as_ptr());
        let size = DATA.len();
        let read = || unsafe { slice::from_raw_parts(ptr, size) };

        {
            let mut set = PatchSet::new();
            unsafe {
                set.push(PatchHandle::capture::<u32>(ptr as usize, 0x3132_3334));
                set.push(PatchHandle::capture::<u16>(ptr as usize + 4, 0x4242));
            }
            set.apply_all_writable().unwrap();
            assert_eq!(&read()[4..6], [0x42, 0x42]);
            assert_eq!(&read()[..4], 0x3132_3334u32.to_ne_bytes());
        }

        assert_eq!(read(), [b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8']);
        for region in region::query_range(ptr, size).unwrap() {
            let region = region.unwrap();
            assert!(!region.protection().contains(Protection::WRITE));
        }
    }

    #[test]
    /// A failed writable apply unwinds what it wrote and leaves the rest untouched
    fn test_apply_writable_failure() {
        let scratch = Scratch::new(0);
        let mut set = PatchSet::new();
        unsafe {
            set.push(PatchHandle::capture::<u32>(scratch.at(0), u32::MAX));
            // the zero page is never mapped, so its protection can't be queried and it is never
            // written to
            set.push(PatchHandle::with_original::<u8>(0x10, 0, 1));
            set.push(PatchHandle::with_original::<u64>(scratch.at(8), 0x5555, 0x6666));
        }

        let err = set.apply_all_writable().unwrap_err();
        assert!(matches!(err, PatchError::Protection(_)));
        assert!(!set.is_applied());
        assert!(scratch.bytes().iter().all(|b| *b == 0));

        // nothing left to revert, so the supplied original at offset 8 is never written
        drop(set);
        assert!(scratch.bytes().iter().all(|b| *b == 0));
    }
}
