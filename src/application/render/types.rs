use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::application::resolve::ResolveError;
use crate::cache::CachedRender;
use crate::domain::paths::{PhysicalPath, RequestInfo};

use super::context::{ExitError, TemplateContext};

/// A parsed template, ready to run against fresh contexts.
///
/// Implementations must call [`TemplateContext::exit`] exactly once per execution, either
/// before returning or later from a task that owns the context.
#[async_trait]
pub trait CompiledTemplate: Send + Sync {
    async fn execute(&self, context: TemplateContext) -> Result<(), TemplateError>;
}

/// Turns template source into a [`CompiledTemplate`]. One implementation per dialect.
pub trait TemplateCompiler: Send + Sync {
    fn compile(
        &self,
        path: &PhysicalPath,
        source: &str,
    ) -> Result<Arc<dyn CompiledTemplate>, TemplateError>;
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid front matter in `{path}`: {message}")]
    FrontMatter { path: PhysicalPath, message: String },
    #[error("failed to parse template `{path}`")]
    Parse {
        path: PhysicalPath,
        #[source]
        source: tera::Error,
    },
    #[error("failed to render template `{path}`")]
    Render {
        path: PhysicalPath,
        #[source]
        source: tera::Error,
    },
    #[error(transparent)]
    Exit(#[from] ExitError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PhysicalPath,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("template `{path}` finished without signalling exit")]
    ExitNotSignalled { path: PhysicalPath },
}

impl RenderError {
    /// True when the template file itself is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RenderError::Read { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }
}

/// Input to [`TemplateEngine::load`](super::TemplateEngine::load).
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    pub request: RequestInfo,
    /// Caller-defined fields. `cache`, `value` and `exit` are reserved and dropped.
    pub fields: Map<String, Value>,
}

impl LoadContext {
    pub fn new(request: RequestInfo) -> Self {
        Self {
            request,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Result of a load: the response fields set by the template, plus the caller's fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub physical: PhysicalPath,
    pub value: String,
    pub status: Option<u16>,
    pub headers: BTreeMap<String, Option<String>>,
    pub redirect: Option<String>,
    pub fields: Map<String, Value>,
    pub from_cache: bool,
}

impl Rendered {
    pub(crate) fn from_snapshot(
        physical: PhysicalPath,
        caller_fields: Map<String, Value>,
        snapshot: &CachedRender,
        from_cache: bool,
    ) -> Self {
        let mut fields = caller_fields;
        fields.extend(
            snapshot
                .fields
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        Self {
            physical,
            value: snapshot.value.clone(),
            status: snapshot.status,
            headers: snapshot.headers.clone(),
            redirect: snapshot.redirect.clone(),
            fields,
            from_cache,
        }
    }

    /// Headers with a non-empty value, in name order.
    pub fn present_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().filter_map(|(name, value)| match value {
            Some(value) if !value.is_empty() => Some((name.as_str(), value.as_str())),
            _ => None,
        })
    }
}
