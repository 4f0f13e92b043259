//! Template and static asset server with push-driven incremental deploys.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
