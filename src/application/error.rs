use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{deploy::DeployError, render::RenderError, resolve::ResolveError},
    config::LoadError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status and diagnostic report, for surfaces that render their own error body.
    pub fn into_parts(self) -> (StatusCode, ErrorReport) {
        (self.status, self.report)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<RenderError> for HttpError {
    fn from(error: RenderError) -> Self {
        if error.is_not_found() {
            return HttpError::from_error(
                "infra::http::render_error_to_http_error",
                StatusCode::NOT_FOUND,
                "404",
                &error,
            );
        }
        HttpError::from_error(
            "infra::http::render_error_to_http_error",
            StatusCode::INTERNAL_SERVER_ERROR,
            "500",
            &error,
        )
    }
}

impl From<ResolveError> for HttpError {
    fn from(error: ResolveError) -> Self {
        HttpError::from_error(
            "infra::http::resolve_error_to_http_error",
            StatusCode::INTERNAL_SERVER_ERROR,
            "500",
            &error,
        )
    }
}

impl From<DeployError> for HttpError {
    fn from(error: DeployError) -> Self {
        let status = match &error {
            DeployError::Disabled
            | DeployError::BadSignature
            | DeployError::UnexpectedEvent(_) => StatusCode::SERVICE_UNAVAILABLE,
            DeployError::Payload(_) => StatusCode::BAD_REQUEST,
            DeployError::Apply { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let public_message = match status {
            StatusCode::SERVICE_UNAVAILABLE => "503",
            StatusCode::BAD_REQUEST => "400",
            _ => "500",
        };
        HttpError::from_error(
            "infra::http::deploy_error_to_http_error",
            status,
            public_message,
            &error,
        )
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = ResolveError::Io {
            path: "/srv/www/a".into(),
            source: io,
        };

        let report = ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &error);

        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1], "denied");
    }

    #[test]
    fn deploy_errors_map_to_statuses() {
        assert_eq!(
            HttpError::from(DeployError::BadSignature).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            HttpError::from(DeployError::Disabled).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let payload = serde_json::from_str::<serde_json::Value>("{").expect_err("bad json");
        assert_eq!(
            HttpError::from(DeployError::Payload(payload)).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn http_error_attaches_report() {
        let response =
            HttpError::new("test", StatusCode::BAD_REQUEST, "400", "bad path").into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages, vec!["bad path".to_string()]);
    }
}
