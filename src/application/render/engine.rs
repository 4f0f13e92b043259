use std::sync::Arc;

use metrics::counter;
use tokio::{fs, sync::oneshot};
use tracing::{debug, info};

use crate::application::resolve::PathResolver;
use crate::cache::SiteCache;
use crate::domain::paths::PhysicalPath;

use super::context::TemplateContext;
use super::types::{CompiledTemplate, LoadContext, RenderError, Rendered, TemplateCompiler};

const RESERVED_FIELDS: [&str; 3] = ["cache", "value", "exit"];

/// Resolves, compiles, executes and memoizes templates.
#[derive(Clone)]
pub struct TemplateEngine {
    cache: Arc<SiteCache>,
    resolver: PathResolver,
    compiler: Arc<dyn TemplateCompiler>,
}

impl TemplateEngine {
    pub fn new(
        cache: Arc<SiteCache>,
        resolver: PathResolver,
        compiler: Arc<dyn TemplateCompiler>,
    ) -> Self {
        Self {
            cache,
            resolver,
            compiler,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Render the template behind `request_path`.
    ///
    /// A render cache hit returns without touching the filesystem or running the template.
    /// Otherwise the template is executed and the call completes when it signals exit.
    /// A template that keeps its context alive without exiting never completes.
    pub async fn load(
        &self,
        request_path: &str,
        load: LoadContext,
    ) -> Result<Rendered, RenderError> {
        let physical = self.resolver.resolve(request_path).await?;

        if self.cache.config().uncache_modified {
            self.refresh_modified(&physical).await?;
        }

        let LoadContext {
            request,
            mut fields,
        } = load;
        for reserved in RESERVED_FIELDS {
            fields.remove(reserved);
        }

        let renders = self.cache.renders();
        let key = renders.key_for(&physical, &request);
        if let Some(hit) = renders.get(&key) {
            debug!(
                target = "pressbox::application::render",
                key = %key,
                "Render cache hit"
            );
            return Ok(Rendered::from_snapshot(physical, fields, &hit, true));
        }

        let template = self.template_for(&physical).await?;

        let (exit_tx, exit_rx) = oneshot::channel();
        let context = TemplateContext::new(request.clone(), fields.clone(), exit_tx);
        template.execute(context).await?;
        let exit = exit_rx
            .await
            .map_err(|_| RenderError::ExitNotSignalled {
                path: physical.clone(),
            })?;

        let rendered = Rendered::from_snapshot(physical, fields, &exit.render, false);
        if let Some(stored) = renders.store(&key, &request, exit.cache, exit.render) {
            debug!(
                target = "pressbox::application::render",
                key = %stored,
                mode = ?exit.cache,
                "Stored render output"
            );
        }
        Ok(rendered)
    }

    async fn template_for(
        &self,
        physical: &PhysicalPath,
    ) -> Result<Arc<dyn CompiledTemplate>, RenderError> {
        if let Some(template) = self.cache.templates().get(physical) {
            return Ok(template);
        }

        let source = fs::read_to_string(physical)
            .await
            .map_err(|source| RenderError::Read {
                path: physical.clone(),
                source,
            })?;
        let template = self.compiler.compile(physical, &source)?;
        counter!("pressbox_template_compile_total").increment(1);
        self.cache
            .templates()
            .insert(physical.clone(), Arc::clone(&template));
        info!(
            target = "pressbox::application::render",
            path = %physical,
            "Compiled template"
        );
        Ok(template)
    }

    async fn refresh_modified(&self, physical: &PhysicalPath) -> Result<(), RenderError> {
        let read_error = |source| RenderError::Read {
            path: physical.clone(),
            source,
        };
        let modified = fs::metadata(physical)
            .await
            .and_then(|meta| meta.modified())
            .map_err(read_error)?;
        self.cache.refresh_if_modified(physical, modified);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::application::render::{ExitError, TemplateError};
    use crate::cache::{CacheConfig, CacheMode};
    use crate::config::SiteSettings;
    use crate::domain::paths::RequestInfo;

    /// Echoes the query into the body and counts executions.
    struct Echo {
        mode: CacheMode,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CompiledTemplate for Echo {
        async fn execute(&self, mut context: TemplateContext) -> Result<(), TemplateError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            context.value = format!("{}#{run}", context.query());
            context.cache = self.mode;
            context.fields.insert("run".into(), json!(run));
            context.exit()?;
            Ok(())
        }
    }

    struct Silent;

    #[async_trait]
    impl CompiledTemplate for Silent {
        async fn execute(&self, _context: TemplateContext) -> Result<(), TemplateError> {
            Ok(())
        }
    }

    struct Twice;

    #[async_trait]
    impl CompiledTemplate for Twice {
        async fn execute(&self, mut context: TemplateContext) -> Result<(), TemplateError> {
            context.exit()?;
            context.exit()?;
            Ok(())
        }
    }

    /// Exits from a spawned task after `execute` has returned.
    struct Deferred;

    #[async_trait]
    impl CompiledTemplate for Deferred {
        async fn execute(&self, mut context: TemplateContext) -> Result<(), TemplateError> {
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                context.value = "later".into();
                let _ = context.exit();
            });
            Ok(())
        }
    }

    enum Fixture {
        Echo(CacheMode),
        Silent,
        Twice,
        Deferred,
    }

    struct FixtureCompiler {
        fixture: Fixture,
        runs: Arc<AtomicUsize>,
        compiles: Arc<AtomicUsize>,
    }

    impl TemplateCompiler for FixtureCompiler {
        fn compile(
            &self,
            _path: &PhysicalPath,
            _source: &str,
        ) -> Result<Arc<dyn CompiledTemplate>, TemplateError> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            Ok(match self.fixture {
                Fixture::Echo(mode) => Arc::new(Echo {
                    mode,
                    runs: Arc::clone(&self.runs),
                }),
                Fixture::Silent => Arc::new(Silent),
                Fixture::Twice => Arc::new(Twice),
                Fixture::Deferred => Arc::new(Deferred),
            })
        }
    }

    struct Harness {
        _dir: TempDir,
        engine: TemplateEngine,
        cache: Arc<SiteCache>,
        runs: Arc<AtomicUsize>,
        compiles: Arc<AtomicUsize>,
    }

    fn harness(fixture: Fixture) -> Harness {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("www")).expect("mkdir");
        std::fs::write(dir.path().join("www/page.tera"), "body").expect("write template");

        let cache = Arc::new(SiteCache::new(CacheConfig::default()));
        let resolver = PathResolver::new(
            Arc::clone(&cache),
            Arc::new(SiteSettings::rooted_at(dir.path())),
        );
        let runs = Arc::new(AtomicUsize::new(0));
        let compiles = Arc::new(AtomicUsize::new(0));
        let compiler = Arc::new(FixtureCompiler {
            fixture,
            runs: Arc::clone(&runs),
            compiles: Arc::clone(&compiles),
        });
        Harness {
            engine: TemplateEngine::new(Arc::clone(&cache), resolver, compiler),
            cache,
            runs,
            compiles,
            _dir: dir,
        }
    }

    fn request(query: &str) -> LoadContext {
        LoadContext::new(RequestInfo::new("GET", "/page", Some(query)))
    }

    #[tokio::test]
    async fn persistent_output_is_reused() {
        let h = harness(Fixture::Echo(CacheMode::Persistent));

        let first = h.engine.load("www/page", request("a=1")).await.expect("first");
        let second = h.engine.load("www/page", request("a=2")).await.expect("second");

        assert_eq!(first.value, "a=1#1");
        assert_eq!(second.value, first.value);
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(h.runs.load(Ordering::SeqCst), 1);
        assert_eq!(h.compiles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn uncached_templates_run_every_time_but_compile_once() {
        let h = harness(Fixture::Echo(CacheMode::Off));

        h.engine.load("www/page", request("")).await.expect("first");
        h.engine.load("www/page", request("")).await.expect("second");

        assert_eq!(h.runs.load(Ordering::SeqCst), 2);
        assert_eq!(h.compiles.load(Ordering::SeqCst), 1);
        assert!(h.cache.renders().is_empty());
    }

    #[tokio::test]
    async fn per_request_output_is_keyed_by_query() {
        let h = harness(Fixture::Echo(CacheMode::PerRequest));

        let a = h.engine.load("www/page", request("q=a")).await.expect("a");
        let b = h.engine.load("www/page", request("q=b")).await.expect("b");
        let a_again = h.engine.load("www/page", request("q=a")).await.expect("a again");

        assert_eq!(a.value, "q=a#1");
        assert_eq!(b.value, "q=b#2");
        assert_eq!(a_again.value, "q=a#1");
        assert_eq!(h.runs.load(Ordering::SeqCst), 2);

        let report = h.cache.invalidate(&a.physical);
        assert_eq!(report.render_entries, 3);
        assert!(report.template);

        let fresh = h.engine.load("www/page", request("q=a")).await.expect("fresh");
        assert_eq!(fresh.value, "q=a#3");
        assert_eq!(h.compiles.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reserved_caller_fields_are_dropped_and_others_merged() {
        let h = harness(Fixture::Echo(CacheMode::Persistent));
        let load = request("")
            .with_field("cache", true)
            .with_field("value", "spoofed")
            .with_field("title", "Hello");

        let rendered = h.engine.load("www/page", load).await.expect("render");

        assert_eq!(rendered.value, "#1");
        assert!(!rendered.fields.contains_key("cache"));
        assert_eq!(rendered.fields.get("title"), Some(&json!("Hello")));
        assert_eq!(rendered.fields.get("run"), Some(&json!(1)));

        let hit = h
            .engine
            .load("www/page", request("").with_field("visitor", "x"))
            .await
            .expect("hit");
        assert!(hit.from_cache);
        assert_eq!(hit.fields.get("visitor"), Some(&json!("x")));
        assert_eq!(hit.fields.get("run"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn missing_exit_is_an_error() {
        let h = harness(Fixture::Silent);

        let err = h.engine.load("www/page", request("")).await.expect_err("no exit");

        assert!(matches!(err, RenderError::ExitNotSignalled { .. }));
    }

    #[tokio::test]
    async fn second_exit_is_rejected() {
        let h = harness(Fixture::Twice);

        let err = h.engine.load("www/page", request("")).await.expect_err("double exit");

        assert!(matches!(
            err,
            RenderError::Template(TemplateError::Exit(ExitError::AlreadySignalled))
        ));
    }

    #[tokio::test]
    async fn exit_from_spawned_task_completes_the_load() {
        let h = harness(Fixture::Deferred);

        let rendered = h.engine.load("www/page", request("")).await.expect("render");

        assert_eq!(rendered.value, "later");
    }

    #[tokio::test]
    async fn missing_file_reports_not_found() {
        let h = harness(Fixture::Echo(CacheMode::Off));

        let err = h.engine.load("www/absent.tera", request("")).await.expect_err("missing");

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn modified_templates_are_recompiled_when_enabled() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("www")).expect("mkdir");
        let file = dir.path().join("www/page.tera");
        std::fs::write(&file, "v1").expect("write");

        let cache = Arc::new(SiteCache::new(CacheConfig {
            uncache_modified: true,
            ..CacheConfig::default()
        }));
        let resolver = PathResolver::new(
            Arc::clone(&cache),
            Arc::new(SiteSettings::rooted_at(dir.path())),
        );
        let runs = Arc::new(AtomicUsize::new(0));
        let compiles = Arc::new(AtomicUsize::new(0));
        let engine = TemplateEngine::new(
            Arc::clone(&cache),
            resolver,
            Arc::new(FixtureCompiler {
                fixture: Fixture::Echo(CacheMode::Persistent),
                runs: Arc::clone(&runs),
                compiles: Arc::clone(&compiles),
            }),
        );

        engine.load("www/page", request("")).await.expect("first");
        engine.load("www/page", request("")).await.expect("cached");
        assert_eq!(compiles.load(Ordering::SeqCst), 1);

        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&file)
            .and_then(|f| f.set_modified(later))
            .expect("bump mtime");

        let fresh = engine.load("www/page", request("")).await.expect("fresh");
        assert!(!fresh.from_cache);
        assert_eq!(compiles.load(Ordering::SeqCst), 2);
    }
}
