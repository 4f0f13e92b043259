//! Tera templates with optional TOML front matter.
//!
//! ```text
//! +++
//! cache = "request"     # false | true | "request" (or 0 | 1 | 2)
//! status = 200
//! redirect = "/elsewhere"
//! [headers]
//! X-Robots-Tag = "noindex"
//! [fields]
//! title = "Search"
//! +++
//! <h1>{{ title }}</h1><p>{{ request.query }}</p>
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::cache::CacheMode;
use crate::domain::paths::PhysicalPath;

use super::context::TemplateContext;
use super::types::{CompiledTemplate, TemplateCompiler, TemplateError};

const FRONT_MATTER_FENCE: &str = "+++";
// The `.html` suffix turns on Tera's autoescaping for substitutions.
const TEMPLATE_NAME: &str = "page.html";

/// Split `source` into its front matter block (without fences) and body.
///
/// Front matter must start on the first line and end with a line that is exactly `+++`.
/// Anything else is treated as all body.
pub fn split_front_matter(source: &str) -> (Option<&str>, &str) {
    let Some(rest) = source.strip_prefix(FRONT_MATTER_FENCE) else {
        return (None, source);
    };
    let Some(rest) = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
    else {
        return (None, source);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == FRONT_MATTER_FENCE {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(front), body);
        }
        offset += line.len();
    }
    (None, source)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCacheDirective {
    Flag(bool),
    Level(i64),
    Mode(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawFrontMatter {
    cache: Option<RawCacheDirective>,
    status: Option<u16>,
    redirect: Option<String>,
    headers: BTreeMap<String, String>,
    fields: toml::Table,
}

#[derive(Debug, Clone, Default)]
struct Directives {
    cache: CacheMode,
    status: Option<u16>,
    redirect: Option<String>,
    headers: BTreeMap<String, Option<String>>,
    fields: Map<String, Value>,
}

fn parse_directives(path: &PhysicalPath, front: &str) -> Result<Directives, TemplateError> {
    let invalid = |message: String| TemplateError::FrontMatter {
        path: path.clone(),
        message,
    };

    let raw: RawFrontMatter = toml::from_str(front).map_err(|err| invalid(err.to_string()))?;

    let cache = match raw.cache {
        None | Some(RawCacheDirective::Flag(false)) | Some(RawCacheDirective::Level(0)) => {
            CacheMode::Off
        }
        Some(RawCacheDirective::Flag(true)) | Some(RawCacheDirective::Level(1)) => {
            CacheMode::Persistent
        }
        Some(RawCacheDirective::Level(2)) => CacheMode::PerRequest,
        Some(RawCacheDirective::Mode(mode)) => match mode.as_str() {
            "request" => CacheMode::PerRequest,
            "path" => CacheMode::Persistent,
            "off" => CacheMode::Off,
            other => return Err(invalid(format!("unknown cache mode `{other}`"))),
        },
        Some(RawCacheDirective::Level(other)) => {
            return Err(invalid(format!("unknown cache level `{other}`")));
        }
    };

    if let Some(status) = raw.status
        && !(100..=599).contains(&status)
    {
        return Err(invalid(format!("status `{status}` is out of range")));
    }

    let fields = match serde_json::to_value(&raw.fields).map_err(|err| invalid(err.to_string()))? {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    Ok(Directives {
        cache,
        status: raw.status,
        redirect: raw.redirect.filter(|target| !target.is_empty()),
        headers: raw
            .headers
            .into_iter()
            .map(|(name, value)| (name, Some(value)))
            .collect(),
        fields,
    })
}

/// Compiler for the bundled Tera dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct TeraDialect;

impl TeraDialect {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateCompiler for TeraDialect {
    fn compile(
        &self,
        path: &PhysicalPath,
        source: &str,
    ) -> Result<Arc<dyn CompiledTemplate>, TemplateError> {
        let (front, body) = split_front_matter(source);
        let directives = match front {
            Some(front) => parse_directives(path, front)?,
            None => Directives::default(),
        };

        let mut tera = tera::Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, body)
            .map_err(|source| TemplateError::Parse {
                path: path.clone(),
                source,
            })?;

        Ok(Arc::new(TeraTemplate {
            path: path.clone(),
            tera,
            directives,
        }))
    }
}

struct TeraTemplate {
    path: PhysicalPath,
    tera: tera::Tera,
    directives: Directives,
}

#[async_trait]
impl CompiledTemplate for TeraTemplate {
    async fn execute(&self, mut context: TemplateContext) -> Result<(), TemplateError> {
        context
            .fields
            .extend(self.directives.fields.clone().into_iter());

        let mut scope = tera::Context::new();
        for (key, value) in &context.fields {
            scope.insert(key.as_str(), value);
        }
        scope.insert(
            "request",
            &json!({
                "method": context.method(),
                "path": context.path(),
                "query": context.query(),
            }),
        );

        context.value = self
            .tera
            .render(TEMPLATE_NAME, &scope)
            .map_err(|source| TemplateError::Render {
                path: self.path.clone(),
                source,
            })?;
        context.cache = self.directives.cache;
        context.status = self.directives.status;
        context.redirect = self.directives.redirect.clone();
        context
            .headers
            .extend(self.directives.headers.clone().into_iter());

        context.exit()?;
        Ok(())
    }
}
