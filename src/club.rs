//! The club-facing half of the crate: the data model mirrored from the
//! host, and the wheel engine operating on it.

pub mod crafting;
pub mod extended;
pub mod model;
pub mod outfits;
pub mod wheel;
