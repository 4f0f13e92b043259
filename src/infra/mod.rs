//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod github;
pub mod http;
pub mod supervisor;
pub mod telemetry;
