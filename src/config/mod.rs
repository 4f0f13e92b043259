//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use oxc_compat::EngineTargets;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, ResolveArgs, ServeArgs, ServeOverrides, SiteOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pressbox";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_PUBLIC_DIR: &str = "www";
const DEFAULT_ERROR_DIR: &str = "error";
const DEFAULT_TEMPLATE_EXT: &str = "tera";
const DEFAULT_INDEX_NAME: &str = "index";
const DEFAULT_PATH_CACHE_LIMIT: usize = 100;
const DEFAULT_WEBHOOK_PATH: &str = "/_deploy";
const DEFAULT_BRANCH: &str = "master";
const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_MANIFEST_PATH: &str = "Cargo.toml";
const DEFAULT_ENTRY_PATH: &str = "src/main.rs";
const DEFAULT_SCRIPT_TARGET: &str = "es2015";
const DEFAULT_UPDATE_COMMAND: [&str; 2] = ["cargo", "update"];

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub site: SiteSettings,
    pub cache: CacheSettings,
    pub deploy: DeploySettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Layout of the served tree.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    /// Served root with forward slashes and a trailing `/`.
    pub root: String,
    /// Directory below the root that public requests map into.
    pub public_dir: String,
    /// Directory below the root holding `<status>` error pages.
    pub error_dir: String,
    /// Extension of server-executed templates, without the dot.
    pub template_ext: String,
    pub index_name: String,
}

impl SiteSettings {
    /// Default layout rooted at `base`.
    pub fn rooted_at(base: impl AsRef<Path>) -> Self {
        Self {
            root: normalize_root(base.as_ref()),
            public_dir: DEFAULT_PUBLIC_DIR.to_string(),
            error_dir: DEFAULT_ERROR_DIR.to_string(),
            template_ext: DEFAULT_TEMPLATE_EXT.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub path_cache_limit: NonZeroUsize,
    pub uncache_modified: bool,
}

#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Webhook shared secret; deploys are refused while unset.
    pub secret: Option<String>,
    pub token: Option<String>,
    pub webhook_path: String,
    pub branch: String,
    /// Content API base URL without a trailing `/`.
    pub api_base: String,
    /// Repository path whose change requests a dependency update and restart.
    pub manifest_path: String,
    /// Repository path whose change requests a restart.
    pub entry_path: String,
    pub update_command: Vec<String>,
    /// Syntax level deployed scripts are lowered to, such as `es2015` or `chrome80`.
    pub script_target: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            secret: None,
            token: None,
            webhook_path: DEFAULT_WEBHOOK_PATH.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
            entry_path: DEFAULT_ENTRY_PATH.to_string(),
            update_command: default_update_command(),
            script_target: DEFAULT_SCRIPT_TARGET.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PRESSBOX").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Resolve(args)) => raw.apply_site_overrides(&args.site),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    site: RawSiteSettings,
    cache: RawCacheSettings,
    deploy: RawDeploySettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(limit) = overrides.cache_path_limit {
            self.cache.path_cache_limit = Some(limit);
        }
        if let Some(enabled) = overrides.cache_uncache_modified {
            self.cache.uncache_modified = Some(enabled);
        }
        if let Some(secret) = overrides.deploy_secret.as_ref() {
            self.deploy.secret = Some(secret.clone());
        }
        if let Some(token) = overrides.deploy_token.as_ref() {
            self.deploy.token = Some(token.clone());
        }
        if let Some(branch) = overrides.deploy_branch.as_ref() {
            self.deploy.branch = Some(branch.clone());
        }

        self.apply_site_overrides(&overrides.site);
    }

    fn apply_site_overrides(&mut self, overrides: &SiteOverrides) {
        if let Some(path) = overrides.base_path.as_ref() {
            self.site.base_path = Some(path.clone());
        }
        if let Some(dir) = overrides.public_dir.as_ref() {
            self.site.public_dir = Some(dir.clone());
        }
        if let Some(ext) = overrides.template_ext.as_ref() {
            self.site.template_ext = Some(ext.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            site,
            cache,
            deploy,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            site: build_site_settings(site)?,
            cache: build_cache_settings(cache)?,
            deploy: build_deploy_settings(deploy)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let base_path = match site.base_path {
        Some(path) if path.as_os_str().is_empty() => {
            return Err(LoadError::invalid("site.base_path", "path must not be empty"));
        }
        Some(path) => path,
        None => std::env::current_dir().map_err(|err| {
            LoadError::invalid(
                "site.base_path",
                format!("current directory unavailable: {err}"),
            )
        })?,
    };

    let public_dir = directory_name(site.public_dir, DEFAULT_PUBLIC_DIR, "site.public_dir")?;
    let error_dir = directory_name(site.error_dir, DEFAULT_ERROR_DIR, "site.error_dir")?;

    let template_ext = site
        .template_ext
        .map(|ext| ext.trim_start_matches('.').to_string())
        .unwrap_or_else(|| DEFAULT_TEMPLATE_EXT.to_string());
    if template_ext.is_empty() || template_ext.contains('/') {
        return Err(LoadError::invalid(
            "site.template_ext",
            "extension must be a non-empty file suffix",
        ));
    }

    let index_name = site
        .index_name
        .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string());
    if index_name.is_empty() || index_name.contains('/') {
        return Err(LoadError::invalid(
            "site.index_name",
            "index name must be a non-empty file name",
        ));
    }

    Ok(SiteSettings {
        root: normalize_root(&base_path),
        public_dir,
        error_dir,
        template_ext,
        index_name,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let limit = cache.path_cache_limit.unwrap_or(DEFAULT_PATH_CACHE_LIMIT);
    let path_cache_limit = NonZeroUsize::new(limit)
        .ok_or_else(|| LoadError::invalid("cache.path_cache_limit", "must be greater than zero"))?;

    Ok(CacheSettings {
        path_cache_limit,
        uncache_modified: cache.uncache_modified.unwrap_or(false),
    })
}

fn build_deploy_settings(deploy: RawDeploySettings) -> Result<DeploySettings, LoadError> {
    let secret = non_blank(deploy.secret);
    let token = non_blank(deploy.token);

    let webhook_path = deploy
        .webhook_path
        .unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string());
    if !webhook_path.starts_with('/') || webhook_path.len() < 2 {
        return Err(LoadError::invalid(
            "deploy.webhook_path",
            "must be an absolute path below `/`",
        ));
    }

    let branch = non_blank(deploy.branch).unwrap_or_else(|| DEFAULT_BRANCH.to_string());

    let api_base = deploy
        .api_base
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let api_base = api_base.trim_end_matches('/').to_string();
    Url::parse(&api_base)
        .map_err(|err| LoadError::invalid("deploy.api_base", format!("invalid URL: {err}")))?;

    let update_command = deploy
        .update_command
        .unwrap_or_else(default_update_command);
    if update_command.first().is_none_or(|program| program.is_empty()) {
        return Err(LoadError::invalid(
            "deploy.update_command",
            "command must name a program",
        ));
    }

    let script_target =
        non_blank(deploy.script_target).unwrap_or_else(|| DEFAULT_SCRIPT_TARGET.to_string());
    EngineTargets::from_target(&script_target)
        .map_err(|reason| LoadError::invalid("deploy.script_target", reason))?;

    Ok(DeploySettings {
        secret,
        token,
        webhook_path,
        branch,
        api_base,
        manifest_path: deploy
            .manifest_path
            .unwrap_or_else(|| DEFAULT_MANIFEST_PATH.to_string()),
        entry_path: deploy
            .entry_path
            .unwrap_or_else(|| DEFAULT_ENTRY_PATH.to_string()),
        update_command,
        script_target,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    base_path: Option<PathBuf>,
    public_dir: Option<String>,
    error_dir: Option<String>,
    template_ext: Option<String>,
    index_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    path_cache_limit: Option<usize>,
    uncache_modified: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDeploySettings {
    secret: Option<String>,
    token: Option<String>,
    webhook_path: Option<String>,
    branch: Option<String>,
    api_base: Option<String>,
    manifest_path: Option<String>,
    entry_path: Option<String>,
    update_command: Option<Vec<String>>,
    script_target: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn normalize_root(base: &Path) -> String {
    let mut root = base.to_string_lossy().replace('\\', "/");
    if !root.ends_with('/') {
        root.push('/');
    }
    root
}

fn directory_name(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim_matches('/');
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "directory must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn default_update_command() -> Vec<String> {
    DEFAULT_UPDATE_COMMAND
        .iter()
        .map(|part| part.to_string())
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests;
