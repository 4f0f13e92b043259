use std::io;
use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

use crate::cache::SiteCache;
use crate::config::{DeploySettings, SiteSettings};
use crate::domain::asset::AssetKind;
use crate::domain::paths::PhysicalPath;
use crate::domain::push::{ChangeKind, ChangeSet, PushEvent};

use super::compact::{collapse_whitespace, compact_template};
use super::minify::{MinifyError, minify_script, minify_stylesheet};
use super::signature;
use super::source::{ContentSource, FetchError};

const PUSH_EVENT: &str = "push";

/// An inbound webhook call, before any validation.
#[derive(Debug, Clone, Copy)]
pub struct PushDelivery<'a> {
    pub body: &'a [u8],
    /// `X-Hub-Signature` header.
    pub signature: Option<&'a str>,
    /// `X-GitHub-Event` header.
    pub event: Option<&'a str>,
}

/// Why the process should restart after a deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// The dependency manifest changed: update dependencies, then restart.
    DependencyUpdate,
    /// The server entry file changed.
    Restart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Push to a branch other than the deploy branch; nothing was touched.
    Skipped { branch: String },
    Applied {
        files: usize,
        restart: Option<RestartReason>,
    },
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("refusing to write outside the site root: `{path}`")]
    UnsafePath { path: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to {op} `{path}`: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("`{path}` is not valid UTF-8")]
    NotUtf8 { path: String },
    #[error(transparent)]
    Minify(#[from] MinifyError),
}

impl ApplyError {
    fn io<'a>(op: &'static str, path: &'a PhysicalPath) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| ApplyError::Io {
            op,
            path: path.to_string(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("deploys are disabled: no webhook secret configured")]
    Disabled,
    #[error("webhook signature mismatch")]
    BadSignature,
    #[error("unexpected webhook event `{0}`")]
    UnexpectedEvent(String),
    #[error("malformed push payload")]
    Payload(#[source] serde_json::Error),
    #[error("deploy aborted at `{path}`")]
    Apply {
        path: String,
        #[source]
        source: ApplyError,
    },
}

/// Applies verified pushes to the served tree and invalidates what they touched.
pub struct DeployPipeline {
    cache: Arc<SiteCache>,
    site: Arc<SiteSettings>,
    settings: Arc<DeploySettings>,
    source: Arc<dyn ContentSource>,
    serial: Mutex<()>,
}

impl DeployPipeline {
    pub fn new(
        cache: Arc<SiteCache>,
        site: Arc<SiteSettings>,
        settings: Arc<DeploySettings>,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            cache,
            site,
            settings,
            source,
            serial: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    /// Verify a delivery and apply its change set.
    ///
    /// Nothing is fetched, written or invalidated unless the signature and event check
    /// out and the push targets the deploy branch. Paths are applied in sorted order and
    /// the first failure aborts the rest; earlier paths stay applied.
    pub async fn handle_push(
        &self,
        delivery: PushDelivery<'_>,
    ) -> Result<DeployOutcome, DeployError> {
        let secret = self.settings.secret.as_deref().ok_or(DeployError::Disabled)?;
        if !signature::verify(secret, delivery.body, delivery.signature) {
            return Err(DeployError::BadSignature);
        }
        match delivery.event {
            Some(PUSH_EVENT) => {}
            other => {
                return Err(DeployError::UnexpectedEvent(
                    other.unwrap_or_default().to_string(),
                ));
            }
        }

        let event: PushEvent =
            serde_json::from_slice(delivery.body).map_err(DeployError::Payload)?;
        let branch = event.branch();
        if branch != self.settings.branch {
            debug!(
                target = "pressbox::application::deploy",
                branch,
                "Ignoring push to non-deploy branch"
            );
            return Ok(DeployOutcome::Skipped {
                branch: branch.to_string(),
            });
        }

        let changes = event.change_set();
        let _serial = self.serial.lock().await;
        info!(
            target = "pressbox::application::deploy",
            repository = %event.repository.full_name,
            branch,
            files = changes.len(),
            "Applying push"
        );

        for (path, kind) in changes.iter() {
            self.apply(&event.repository.full_name, branch, path, kind)
                .await
                .map_err(|source| {
                    warn!(
                        target = "pressbox::application::deploy",
                        path,
                        change = kind.as_str(),
                        error = %source,
                        "Deploy aborted"
                    );
                    DeployError::Apply {
                        path: path.to_string(),
                        source,
                    }
                })?;
        }

        Ok(DeployOutcome::Applied {
            files: changes.len(),
            restart: self.restart_reason(&changes),
        })
    }

    fn restart_reason(&self, changes: &ChangeSet) -> Option<RestartReason> {
        if changes.contains(&self.settings.manifest_path) {
            Some(RestartReason::DependencyUpdate)
        } else if changes.contains(&self.settings.entry_path) {
            Some(RestartReason::Restart)
        } else {
            None
        }
    }

    async fn apply(
        &self,
        repository: &str,
        branch: &str,
        path: &str,
        kind: ChangeKind,
    ) -> Result<(), ApplyError> {
        if !is_safe_relative(path) {
            return Err(ApplyError::UnsafePath {
                path: path.to_string(),
            });
        }
        let physical = PhysicalPath::under_root(&self.site.root, path);

        match kind {
            ChangeKind::Removed => self.remove(path, &physical).await?,
            ChangeKind::Modified | ChangeKind::Added => {
                let content = self.source.fetch(repository, path, branch).await?;
                self.write(path, &physical, content).await?;
            }
        }

        let report = self.cache.invalidate(&physical);
        counter!("pressbox_deploy_files_total", "change" => kind.as_str()).increment(1);
        info!(
            target = "pressbox::application::deploy",
            path,
            change = kind.as_str(),
            invalidated = !report.is_empty(),
            "Applied change"
        );
        Ok(())
    }

    async fn remove(&self, path: &str, physical: &PhysicalPath) -> Result<(), ApplyError> {
        if remove_if_present(physical).await? {
            let kind = AssetKind::classify(path, &self.site.template_ext);
            if kind.has_source_map() {
                remove_if_present(&source_map_path(physical)).await?;
            }
        }

        // Prune now-empty ancestors, deepest first, stopping at the first that will not go.
        let mut ancestor = path;
        while let Some(index) = ancestor.rfind('/') {
            ancestor = &ancestor[..index];
            if ancestor.is_empty() {
                break;
            }
            let dir = PhysicalPath::under_root(&self.site.root, ancestor);
            match fs::remove_dir(&dir).await {
                Ok(()) => debug!(
                    target = "pressbox::application::deploy",
                    dir = %dir,
                    "Removed empty directory"
                ),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(_) => break,
            }
        }
        Ok(())
    }

    async fn write(
        &self,
        path: &str,
        physical: &PhysicalPath,
        content: Vec<u8>,
    ) -> Result<(), ApplyError> {
        if let Some(parent) = physical.as_path().parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(ApplyError::io("create directories for", physical))?;
        }

        let kind = AssetKind::classify(path, &self.site.template_ext);
        let in_public = path
            .strip_prefix(self.site.public_dir.as_str())
            .is_some_and(|rest| rest.starts_with('/'));
        let file_name = path.rsplit('/').next().unwrap_or(path);

        let output = match kind {
            AssetKind::Template => compact_template(&utf8(path, content)?).into_bytes(),
            AssetKind::Html => collapse_whitespace(&utf8(path, content)?).into_bytes(),
            AssetKind::Script | AssetKind::Stylesheet if in_public => {
                let text = utf8(path, content)?;
                let minified = if kind == AssetKind::Script {
                    minify_script(file_name, &text, &self.settings.script_target)?
                } else {
                    minify_stylesheet(file_name, &text)?
                };
                let map_path = source_map_path(physical);
                fs::write(&map_path, minified.map)
                    .await
                    .map_err(ApplyError::io("write", &map_path))?;
                minified.code.into_bytes()
            }
            _ => content,
        };

        fs::write(physical, output)
            .await
            .map_err(ApplyError::io("write", physical))
    }
}

fn utf8(path: &str, content: Vec<u8>) -> Result<String, ApplyError> {
    String::from_utf8(content).map_err(|_| ApplyError::NotUtf8 {
        path: path.to_string(),
    })
}

fn source_map_path(physical: &PhysicalPath) -> PhysicalPath {
    PhysicalPath::new(format!("{physical}.map"))
}

async fn remove_if_present(physical: &PhysicalPath) -> Result<bool, ApplyError> {
    match fs::remove_file(physical).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ApplyError::Io {
            op: "remove",
            path: physical.to_string(),
            source,
        }),
    }
}

/// Repository paths must be relative and must not climb out of the root.
fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}
