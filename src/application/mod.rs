//! Application services: resolution, template execution and deploys.

pub mod deploy;
pub mod error;
pub mod render;
pub mod resolve;
