//! Errors a caller can reasonably handle.
//!
//! A corrupted handle is not one of them: that panics, see [`PatchHandle`](crate::PatchHandle).

use thiserror::Error;

use crate::width::Width;

/// Errors from building or writing patches
#[derive(Debug, Error)]
pub enum PatchError {
    /// Raw tag that doesn't name any [`Width`]
    #[error("unsupported patch width tag {0:#x}")]
    UnsupportedWidth(u8),
    /// Byte span that doesn't match any [`Width`]
    #[error("no patch width covers {0} bytes")]
    UnsupportedByteLength(usize),
    /// Value has bits set above the width it was meant for
    #[error("value {value:#x} does not fit in {width}")]
    ValueTooWide {
        /// Width the value was meant for
        width: Width,
        /// Offending value
        value: u128,
    },
    /// Error when setting memory protections
    #[error("error setting memory protections")]
    Protection(#[from] region::Error),
}
