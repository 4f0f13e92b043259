use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use pressbox::{
    application::{deploy::RestartReason, error::AppError, resolve::PathResolver},
    cache::{CacheConfig, SiteCache},
    config,
    infra::{
        error::InfraError,
        github::GitHubContents,
        http::{self, HttpState},
        supervisor::{self, RESTART_EXIT_CODE, RestartSignal},
        telemetry,
    },
};
use tokio::{signal, sync::oneshot};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(None) => {}
        Ok(Some(_)) => process::exit(RESTART_EXIT_CODE),
        Err(error) => {
            report_application_error(&error);
            process::exit(1);
        }
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<Option<RestartReason>, AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Resolve(args) => {
            run_resolve(settings, &args.path).await?;
            Ok(None)
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<Option<RestartReason>, AppError> {
    let source = GitHubContents::new(&settings.deploy)?;
    let state = HttpState::from_settings(&settings, Arc::new(source));
    let restart = state.restart.clone();

    if settings.deploy.secret.is_none() {
        warn!(
            webhook = %settings.deploy.webhook_path,
            "No deploy secret configured; webhook deliveries will be refused"
        );
    }

    serve_http(&settings, state).await?;

    let reason = restart.requested();
    if reason == Some(RestartReason::DependencyUpdate)
        && let Err(err) = supervisor::run_update_command(&settings.deploy.update_command).await
    {
        error!(error = %err, "dependency update failed; restarting anyway");
    }
    if let Some(reason) = reason {
        info!(reason = ?reason, exit_code = RESTART_EXIT_CODE, "Exiting for restart");
    }
    Ok(reason)
}

async fn run_resolve(settings: config::Settings, path: &str) -> Result<(), AppError> {
    let cache = Arc::new(SiteCache::new(CacheConfig::from(&settings.cache)));
    let resolver = PathResolver::new(cache, Arc::new(settings.site));
    let physical = resolver.resolve(path).await?;
    println!("{physical}");
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let restart = state.restart.clone();
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "Listening");

    let (started_tx, started_rx) = oneshot::channel();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal(&restart).await;
            let _ = started_tx.send(());
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::from(InfraError::server(err.to_string())))?;
        }
        () = shutdown_deadline(started_rx, grace) => {
            warn!(
                timeout_secs = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
        }
    }
    Ok(())
}

async fn shutdown_signal(restart: &RestartSignal) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => info!("Shutdown requested"),
        reason = restart.wait() => info!(reason = ?reason, "Restart requested; shutting down"),
    }
}

/// Completes `grace` after shutdown starts; never completes if it does not.
async fn shutdown_deadline(started: oneshot::Receiver<()>, grace: Duration) {
    if started.await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}
