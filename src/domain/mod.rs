//! Domain types shared across layers.

pub mod asset;
pub mod paths;
pub mod push;
