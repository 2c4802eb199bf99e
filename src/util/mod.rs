//! Internal helpers.

pub(crate) mod align;
pub(crate) mod size;
