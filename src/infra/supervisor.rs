//! Self-restart contract with the external process supervisor.
//!
//! A deploy that touches the manifest or the entry file requests a restart. The server
//! shuts down gracefully, runs the update command when dependencies changed, and the
//! process exits with [`RESTART_EXIT_CODE`] so the supervisor starts it again.

use std::process::Stdio;
use std::sync::Arc;

use tokio::{process::Command, sync::watch};
use tracing::{info, warn};

use crate::application::deploy::RestartReason;

use super::error::InfraError;

/// `EX_TEMPFAIL`: the supervisor should start the process again.
pub const RESTART_EXIT_CODE: i32 = 75;

/// Shared handle through which deploys request a restart and the server waits for one.
#[derive(Clone)]
pub struct RestartSignal {
    tx: Arc<watch::Sender<Option<RestartReason>>>,
}

impl Default for RestartSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RestartSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record a restart request. A dependency update is never downgraded to a plain
    /// restart by a later request.
    pub fn request(&self, reason: RestartReason) {
        self.tx.send_if_modified(|current| match (*current, reason) {
            (Some(RestartReason::DependencyUpdate), _) => false,
            (Some(RestartReason::Restart), RestartReason::Restart) => false,
            _ => {
                *current = Some(reason);
                true
            }
        });
        info!(
            target = "pressbox::infra::supervisor",
            reason = ?reason,
            "Restart requested"
        );
    }

    pub fn requested(&self) -> Option<RestartReason> {
        *self.tx.borrow()
    }

    /// Resolves once a restart has been requested.
    pub async fn wait(&self) -> RestartReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // The sender lives in `self`, so this only happens during teardown.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Run the configured dependency update command, inheriting stdio.
pub async fn run_update_command(command: &[String]) -> Result<(), InfraError> {
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };
    let shown = command.join(" ");
    info!(
        target = "pressbox::infra::supervisor",
        command = %shown,
        "Running dependency update"
    );

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|err| InfraError::UpdateCommand {
            command: shown.clone(),
            message: err.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        warn!(
            target = "pressbox::infra::supervisor",
            command = %shown,
            status = %status,
            "Dependency update exited unsuccessfully"
        );
        Err(InfraError::UpdateCommand {
            command: shown,
            message: format!("exited with {status}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn wait_resolves_after_request() {
        let signal = RestartSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        signal.request(RestartReason::Restart);

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("restart observed")
            .expect("join waiter");
        assert_eq!(reason, RestartReason::Restart);
    }

    #[test]
    fn dependency_update_is_not_downgraded() {
        let signal = RestartSignal::new();
        assert_eq!(signal.requested(), None);

        signal.request(RestartReason::DependencyUpdate);
        signal.request(RestartReason::Restart);

        assert_eq!(signal.requested(), Some(RestartReason::DependencyUpdate));
    }

    #[tokio::test]
    async fn empty_update_command_is_a_no_op() {
        run_update_command(&[]).await.expect("nothing to run");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_update_command_is_reported() {
        let err = run_update_command(&["false".to_string()])
            .await
            .expect_err("false exits non-zero");
        assert!(matches!(err, InfraError::UpdateCommand { .. }));
    }
}
