//! Internal utilities.

pub(crate) mod interrupt;
