use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the pressbox binary.
#[derive(Debug, Parser)]
#[command(name = "pressbox", version, about = "Template-aware static site server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRESSBOX_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the site and accept deploy webhooks.
    Serve(Box<ServeArgs>),
    /// Print the file a request path resolves to, then exit.
    Resolve(ResolveArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub site: SiteOverrides,

    /// Request path, e.g. `/blog/` or `/about`.
    #[arg(value_name = "PATH")]
    pub path: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SiteOverrides {
    /// Override the directory the site is served from.
    #[arg(long = "site-base-path", value_name = "PATH")]
    pub base_path: Option<PathBuf>,

    /// Override the public directory below the base path.
    #[arg(long = "site-public-dir", value_name = "DIR")]
    pub public_dir: Option<String>,

    /// Override the template file extension.
    #[arg(long = "site-template-ext", value_name = "EXT")]
    pub template_ext: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub site: SiteOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the path cache capacity.
    #[arg(long = "cache-path-limit", value_name = "COUNT")]
    pub cache_path_limit: Option<usize>,

    /// Invalidate templates whose file modification time advanced.
    #[arg(
        long = "cache-uncache-modified",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_uncache_modified: Option<bool>,

    /// Override the webhook shared secret.
    #[arg(long = "deploy-secret", env = "PRESSBOX_DEPLOY_SECRET", value_name = "SECRET")]
    pub deploy_secret: Option<String>,

    /// Override the content API token.
    #[arg(long = "deploy-token", env = "PRESSBOX_DEPLOY_TOKEN", value_name = "TOKEN")]
    pub deploy_token: Option<String>,

    /// Override the branch that triggers deploys.
    #[arg(long = "deploy-branch", value_name = "BRANCH")]
    pub deploy_branch: Option<String>,
}
