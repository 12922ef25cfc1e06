//! # Width
//!
//! The closed set of patch granularities, and the mapping from each one to the native integer that backs it

use std::fmt;
use std::mem;
use std::ptr;

use crate::error::PatchError;
use crate::handle::AnyPatch;
use crate::value::ValuePatch;

/// Bit-size granularity of a patch.
///
/// The discriminant doubles as the raw tag stored in front of every [`PatchHandle`](crate::PatchHandle).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    /// 8-bit, backed by `u8`
    W8 = 0,
    /// 16-bit, backed by `u16`
    W16 = 1,
    /// 32-bit, backed by `u32`
    W32 = 2,
    /// 64-bit, backed by `u64`
    W64 = 3,
    /// 128-bit, backed by `u128`
    #[cfg(feature = "wide")]
    W128 = 4,
}

impl Width {
    /// Every supported width, narrowest first
    pub const ALL: &'static [Width] = &[
        Width::W8,
        Width::W16,
        Width::W32,
        Width::W64,
        #[cfg(feature = "wide")]
        Width::W128,
    ];

    /// Raw tag of this width
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Number of bytes a patch of this width touches
    pub const fn bytes(self) -> usize {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
            #[cfg(feature = "wide")]
            Width::W128 => 16,
        }
    }

    /// Number of bits a patch of this width touches
    pub const fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Picks the width covering exactly `len` bytes
    pub fn from_bytes(len: usize) -> Result<Self, PatchError> {
        Self::ALL
            .iter()
            .copied()
            .find(|w| w.bytes() == len)
            .ok_or(PatchError::UnsupportedByteLength(len))
    }
}

impl TryFrom<u8> for Width {
    type Error = PatchError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(tag))
            .copied()
            .ok_or(PatchError::UnsupportedWidth(tag))
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.bits())
    }
}

/// Keeps [`Word`] closed to the integers listed in [`Width`]
mod sealed {
    /// Sealing marker
    pub trait Sealed {}
}

/// Native integer backing one [`Width`].
///
/// Implemented for `u8`, `u16`, `u32`, `u64` and (with the `wide` feature) `u128`, and nothing else.
pub trait Word: sealed::Sealed + Copy + Eq + fmt::Debug + fmt::LowerHex + 'static {
    /// Width this integer stands for
    const WIDTH: Width;

    /// Reads a value of this width from `address`.
    ///
    /// # Safety
    ///
    /// `address` must be valid for reads of `WIDTH.bytes()` bytes
    unsafe fn read(address: usize) -> Self {
        let ptr = address as *const Self;
        if address % mem::align_of::<Self>() == 0 {
            ptr::read_volatile(ptr)
        } else {
            ptr::read_unaligned(ptr)
        }
    }

    /// Writes a value of this width to `address`.
    ///
    /// Aligned targets get a single native-width store. Unaligned ones, and 128-bit ones on every
    /// architecture, may be observed half-written by a concurrent reader.
    ///
    /// # Safety
    ///
    /// `address` must be valid for writes of `WIDTH.bytes()` bytes
    unsafe fn write(address: usize, value: Self) {
        let ptr = address as *mut Self;
        if address % mem::align_of::<Self>() == 0 {
            ptr::write_volatile(ptr, value)
        } else {
            ptr::write_unaligned(ptr, value)
        }
    }

    /// Narrows a raw value into this width, or `None` if it has bits set above `WIDTH.bits()`
    fn narrow(value: u128) -> Option<Self>;

    /// Widens this value back to a raw value
    fn widen(self) -> u128;

    /// Puts a record of this width into its handle variant
    fn wrap(patch: ValuePatch<Self>) -> AnyPatch;

    /// Gets the record back out of a handle variant, if the variant has this width
    fn unwrap_ref(patch: &AnyPatch) -> Option<&ValuePatch<Self>>;
}

/// Implements [`Word`] for a primitive and ties it to its [`AnyPatch`] variant
macro_rules! word {
    ($ty:ty, $width:ident, $variant:ident) => {
        impl sealed::Sealed for $ty {}

        impl Word for $ty {
            const WIDTH: Width = Width::$width;

            fn narrow(value: u128) -> Option<Self> {
                <$ty>::try_from(value).ok()
            }

            fn widen(self) -> u128 {
                u128::from(self)
            }

            fn wrap(patch: ValuePatch<Self>) -> AnyPatch {
                AnyPatch::$variant(patch)
            }

            fn unwrap_ref(patch: &AnyPatch) -> Option<&ValuePatch<Self>> {
                match patch {
                    AnyPatch::$variant(p) => Some(p),
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }
    };
}

word!(u8, W8, U8);
word!(u16, W16, U16);
word!(u32, W32, U32);
word!(u64, W64, U64);
#[cfg(feature = "wide")]
word!(u128, W128, U128);
