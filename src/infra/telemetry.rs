use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "pressbox_path_cache_hit_total",
            Unit::Count,
            "Total number of path cache hits."
        );
        describe_counter!(
            "pressbox_path_cache_miss_total",
            Unit::Count,
            "Total number of path cache misses."
        );
        describe_counter!(
            "pressbox_path_cache_evict_total",
            Unit::Count,
            "Total number of path cache evictions due to capacity."
        );
        describe_counter!(
            "pressbox_render_cache_hit_total",
            Unit::Count,
            "Total number of render cache hits."
        );
        describe_counter!(
            "pressbox_render_cache_miss_total",
            Unit::Count,
            "Total number of render cache misses."
        );
        describe_counter!(
            "pressbox_template_compile_total",
            Unit::Count,
            "Total number of template compilations."
        );
        describe_counter!(
            "pressbox_cache_invalidate_total",
            Unit::Count,
            "Total number of physical path invalidations."
        );
        describe_counter!(
            "pressbox_deploy_files_total",
            Unit::Count,
            "Total number of files applied by deploys, labelled by change kind."
        );
    });
}
