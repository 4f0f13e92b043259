mod middleware;
mod public;
mod webhook;

use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, middleware as axum_middleware, routing::post};

use crate::{
    application::{
        deploy::{ContentSource, DeployPipeline},
        render::{TemplateEngine, TeraDialect},
        resolve::PathResolver,
    },
    cache::{CacheConfig, SiteCache},
    config::{DeploySettings, Settings, SiteSettings},
    infra::supervisor::RestartSignal,
};

use middleware::{frame_options, log_responses, set_request_context};

pub use middleware::RequestContext;

/// Push payloads from large commits run well past axum's default body limit.
const WEBHOOK_BODY_LIMIT: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub cache: Arc<SiteCache>,
    pub engine: Arc<TemplateEngine>,
    pub pipeline: Arc<DeployPipeline>,
    pub restart: RestartSignal,
}

impl HttpState {
    /// Wire the shared cache, resolver, template engine and deploy pipeline.
    pub fn new(
        site: SiteSettings,
        cache: CacheConfig,
        deploy: DeploySettings,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        let cache = Arc::new(SiteCache::new(cache));
        let site = Arc::new(site);
        let resolver = PathResolver::new(Arc::clone(&cache), Arc::clone(&site));
        let engine = Arc::new(TemplateEngine::new(
            Arc::clone(&cache),
            resolver,
            Arc::new(TeraDialect::new()),
        ));
        let pipeline = Arc::new(DeployPipeline::new(
            Arc::clone(&cache),
            site,
            Arc::new(deploy),
            source,
        ));
        Self {
            cache,
            engine,
            pipeline,
            restart: RestartSignal::new(),
        }
    }

    pub fn from_settings(settings: &Settings, source: Arc<dyn ContentSource>) -> Self {
        Self::new(
            settings.site.clone(),
            CacheConfig::from(&settings.cache),
            settings.deploy.clone(),
            source,
        )
    }
}

pub fn build_router(state: HttpState) -> Router {
    let webhook_path = state.pipeline.settings().webhook_path.clone();

    Router::new()
        .route(
            &webhook_path,
            post(webhook::receive).layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT)),
        )
        .fallback(public::serve)
        .with_state(state)
        .layer(axum_middleware::from_fn(frame_options))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
