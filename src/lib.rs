#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

pub mod error;
pub mod handle;
pub mod patch;
pub mod set;
pub mod value;
pub mod width;

pub use error::PatchError;
pub use handle::{AnyPatch, PatchHandle};
pub use patch::{Applied, Patch};
pub use set::PatchSet;
pub use value::{Origin, ValuePatch};
pub use width::{Width, Word};
