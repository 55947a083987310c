//! The mod's own bookkeeping: version grammar and the persisted settings
//! tree. Nothing in here touches club state.

pub mod settings;
pub mod version;
