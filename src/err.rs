//! Error interfaces for this crate.

use std::borrow::Cow;

pub use crate::sim::debug::CommandErr;
pub use crate::sim::snapshot::SnapshotErr;
pub use crate::sim::state::LoadErr;
pub use crate::sim::{SimErr, SimFault};

/// Unified error interface for all errors in this crate.
/// 
/// Note that the [`Display`] implementation is used for a brief message,
/// where as [`Error::help`] is used for any clarifying messages.
/// 
/// [`Display`]: std::fmt::Display
pub trait Error: std::error::Error {
    /// A clarifying message to help aid someone in how to fix the error.
    /// 
    /// If there is none to add, this can be set to `None`.
    fn help(&self) -> Option<Cow<str>>;
}
