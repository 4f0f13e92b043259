use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::cache::{CacheMode, CachedRender};
use crate::domain::paths::RequestInfo;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExitError {
    #[error("exit was already signalled for this execution")]
    AlreadySignalled,
    #[error("the engine stopped waiting for this execution")]
    Detached,
}

/// What the engine receives when a template exits.
#[derive(Debug)]
pub(crate) struct ExitSnapshot {
    pub cache: CacheMode,
    pub render: CachedRender,
}

/// Per-execution state handed to a [`CompiledTemplate`](super::CompiledTemplate).
///
/// The template fills in the response fields and calls [`exit`](Self::exit) once. Whatever
/// the fields hold at that moment is what the engine returns and, depending on `cache`,
/// memoizes.
#[derive(Debug)]
pub struct TemplateContext {
    request: RequestInfo,
    /// Response body.
    pub value: String,
    pub cache: CacheMode,
    pub status: Option<u16>,
    /// Header name → value. `None` and empty values are not written.
    pub headers: BTreeMap<String, Option<String>>,
    pub redirect: Option<String>,
    /// Caller fields on entry; anything added here is captured on exit.
    pub fields: Map<String, Value>,
    exit: Option<oneshot::Sender<ExitSnapshot>>,
}

impl TemplateContext {
    pub(crate) fn new(
        request: RequestInfo,
        fields: Map<String, Value>,
        exit: oneshot::Sender<ExitSnapshot>,
    ) -> Self {
        Self {
            request,
            value: String::new(),
            cache: CacheMode::Off,
            status: None,
            headers: BTreeMap::new(),
            redirect: None,
            fields,
            exit: Some(exit),
        }
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    pub fn query(&self) -> &str {
        &self.request.query
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), Some(value.into()));
    }

    pub fn has_exited(&self) -> bool {
        self.exit.is_none()
    }

    /// Signal completion. Only the first call is accepted.
    pub fn exit(&mut self) -> Result<(), ExitError> {
        let sender = self.exit.take().ok_or(ExitError::AlreadySignalled)?;
        let snapshot = ExitSnapshot {
            cache: self.cache,
            render: CachedRender {
                value: self.value.clone(),
                status: self.status,
                headers: self.headers.clone(),
                redirect: self.redirect.clone(),
                fields: self.fields.clone(),
            },
        };
        sender.send(snapshot).map_err(|_| ExitError::Detached)
    }
}
