//! Template execution.
//!
//! The engine knows nothing about template syntax: a [`TemplateCompiler`] turns source
//! into a [`CompiledTemplate`], and the engine caches, runs and memoizes those. Each run
//! completes when the template calls [`TemplateContext::exit`].

mod context;
mod dialect;
mod engine;
mod types;

pub use context::{ExitError, TemplateContext};
pub use dialect::{TeraDialect, split_front_matter};
pub use engine::TemplateEngine;
pub use types::{
    CompiledTemplate, LoadContext, RenderError, Rendered, TemplateCompiler, TemplateError,
};
