use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::{
    application::{
        deploy::{DeployOutcome, PushDelivery},
        error::HttpError,
    },
    domain::paths::RequestInfo,
};

use super::{HttpState, public::error_response};

const SIGNATURE_HEADER: &str = "x-hub-signature";
const EVENT_HEADER: &str = "x-github-event";

/// Apply a push delivery, then request a restart when the deploy asks for one.
///
/// The restart only begins graceful shutdown; this response is still written.
pub(super) async fn receive(
    State(state): State<HttpState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = PushDelivery {
        body: &body,
        signature: header_str(&headers, SIGNATURE_HEADER),
        event: header_str(&headers, EVENT_HEADER),
    };

    match state.pipeline.handle_push(delivery).await {
        Ok(DeployOutcome::Skipped { branch }) => {
            info!(
                target = "pressbox::http::webhook",
                branch = %branch,
                "Push ignored"
            );
            StatusCode::OK.into_response()
        }
        Ok(DeployOutcome::Applied { files, restart }) => {
            info!(
                target = "pressbox::http::webhook",
                files,
                restart = ?restart,
                "Push applied"
            );
            if let Some(reason) = restart {
                state.restart.request(reason);
            }
            StatusCode::OK.into_response()
        }
        Err(err) => {
            let (status, report) = HttpError::from(err).into_parts();
            let request = RequestInfo::new(Method::POST.as_str(), uri.path(), uri.query());
            error_response(&state, status, request, report).await
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
