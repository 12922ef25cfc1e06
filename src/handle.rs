//! # Handle
//!
//! Width-erased ownership of one [`ValuePatch`], so that patches of different widths can be stored
//! and walked together

use log::error;

use crate::error::PatchError;
use crate::patch::Patch;
use crate::value::ValuePatch;
use crate::width::{Width, Word};

/// One [`ValuePatch`] of any supported width
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyPatch {
    /// 8-bit patch
    U8(ValuePatch<u8>),
    /// 16-bit patch
    U16(ValuePatch<u16>),
    /// 32-bit patch
    U32(ValuePatch<u32>),
    /// 64-bit patch
    U64(ValuePatch<u64>),
    /// 128-bit patch
    #[cfg(feature = "wide")]
    U128(ValuePatch<u128>),
}

/// Forwards a method call to whichever record `$any` holds
macro_rules! dispatch {
    ($any:expr, $p:ident => $body:expr) => {
        match $any {
            AnyPatch::U8($p) => $body,
            AnyPatch::U16($p) => $body,
            AnyPatch::U32($p) => $body,
            AnyPatch::U64($p) => $body,
            #[cfg(feature = "wide")]
            AnyPatch::U128($p) => $body,
        }
    };
}

impl AnyPatch {
    /// Width of the active record
    pub fn width(&self) -> Width {
        dispatch!(self, p => p.width())
    }

    /// Location of the active record
    pub fn address(&self) -> usize {
        dispatch!(self, p => p.address())
    }
}

/// Owns exactly one patch record of some width.
///
/// The width is decided at construction and never changes. A raw width tag is kept in front of
/// the record and checked on every dispatch; if it ever stops matching the record, the handle has
/// been corrupted and any further write could land with the wrong width, so the handle panics
/// instead.
///
/// Dropping a handle (or calling [`PatchHandle::release`]) destroys the record without touching the
/// patched memory. Revert first if the patch is applied.
#[derive(Debug, PartialEq, Eq)]
pub struct PatchHandle {
    /// Raw [`Width`] tag of `patch`
    tag: u8,
    /// The record
    patch: AnyPatch,
}

impl PatchHandle {
    /// Creates a handle whose original value is read from `address` now.
    ///
    /// # Safety
    ///
    /// See [`ValuePatch::capture`].
    pub unsafe fn capture<T: Word>(address: usize, replaced: T) -> Self {
        Self::from(ValuePatch::capture(address, replaced))
    }

    /// Creates a handle with a caller-chosen original value.
    ///
    /// # Safety
    ///
    /// See [`ValuePatch::with_original`].
    pub unsafe fn with_original<T: Word>(address: usize, original: T, replaced: T) -> Self {
        Self::from(ValuePatch::with_original(address, original, replaced))
    }

    /// Creates a handle for a width only known at runtime.
    ///
    /// With `original` set to `None` the original value is read from `address`, as in
    /// [`PatchHandle::capture`]; otherwise it is taken as given.
    ///
    /// # Errors
    ///
    /// [`PatchError::ValueTooWide`] if `original` or `replaced` has bits set above `width`. Memory is
    /// not read in that case.
    ///
    /// # Safety
    ///
    /// See [`ValuePatch::capture`] and [`ValuePatch::with_original`].
    pub unsafe fn new(
        width: Width,
        address: usize,
        original: Option<u128>,
        replaced: u128,
    ) -> Result<Self, PatchError> {
        match width {
            Width::W8 => Self::build::<u8>(address, original, replaced),
            Width::W16 => Self::build::<u16>(address, original, replaced),
            Width::W32 => Self::build::<u32>(address, original, replaced),
            Width::W64 => Self::build::<u64>(address, original, replaced),
            #[cfg(feature = "wide")]
            Width::W128 => Self::build::<u128>(address, original, replaced),
        }
    }

    /// Narrows raw values to `T` and builds the handle
    unsafe fn build<T: Word>(
        address: usize,
        original: Option<u128>,
        replaced: u128,
    ) -> Result<Self, PatchError> {
        let narrow = |value: u128| {
            T::narrow(value).ok_or(PatchError::ValueTooWide {
                width: T::WIDTH,
                value,
            })
        };
        let replaced = narrow(replaced)?;
        match original {
            Some(original) => Ok(Self::with_original(address, narrow(original)?, replaced)),
            None => Ok(Self::capture(address, replaced)),
        }
    }

    /// Width of the record. Constant for the life of the handle
    pub fn width(&self) -> Width {
        self.checked("inspect").width()
    }

    /// Location of the record
    pub fn address(&self) -> usize {
        self.checked("inspect").address()
    }

    /// Writes the replacement value
    pub fn apply(&self) {
        dispatch!(self.checked("patch"), p => p.apply())
    }

    /// Writes the original value back
    pub fn revert(&self) {
        dispatch!(self.checked("restore"), p => p.revert())
    }

    /// The record, if it has width `T`
    pub fn downcast_ref<T: Word>(&self) -> Option<&ValuePatch<T>> {
        T::unwrap_ref(self.checked("inspect"))
    }

    /// The record, without the width check on the way out
    pub fn as_any(&self) -> &AnyPatch {
        &self.patch
    }

    /// Destroys the handle and its record. The patched memory is left as it is
    pub fn release(self) {
        // handled by dropping `self`
    }

    /// Gets the record after making sure the tag still describes it
    fn checked(&self, action: &str) -> &AnyPatch {
        match Width::try_from(self.tag) {
            Ok(width) if width == self.patch.width() => &self.patch,
            _ => unsupported(self.tag, action),
        }
    }
}

impl<T: Word> From<ValuePatch<T>> for PatchHandle {
    fn from(patch: ValuePatch<T>) -> Self {
        Self {
            tag: T::WIDTH.tag(),
            patch: T::wrap(patch),
        }
    }
}

unsafe impl Patch for PatchHandle {
    fn address(&self) -> usize {
        PatchHandle::address(self)
    }

    fn width(&self) -> Width {
        PatchHandle::width(self)
    }

    fn apply(&self) {
        PatchHandle::apply(self)
    }

    fn revert(&self) {
        PatchHandle::revert(self)
    }
}

/// Reports a width tag that doesn't describe the handle's record and aborts the operation
#[cold]
#[track_caller]
fn unsupported(tag: u8, action: &str) -> ! {
    error!("unsupported patch type {tag}, cannot {action}");
    panic!("unsupported patch type {tag}, cannot {action}");
}
