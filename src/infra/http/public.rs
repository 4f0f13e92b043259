use std::io::ErrorKind;

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderName, HeaderValue, Method, StatusCode, Uri,
        header::{ALLOW, CACHE_CONTROL, CONTENT_TYPE, LOCATION},
    },
    response::{IntoResponse, Response},
};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tokio::fs;
use tracing::{debug, warn};

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        render::{LoadContext, Rendered},
    },
    config::SiteSettings,
    domain::{
        asset::AssetKind,
        paths::{PhysicalPath, RequestInfo},
    },
};

use super::HttpState;

const SOURCE: &str = "infra::http::public::serve";
const GET_CACHE_CONTROL: &str = "max-age=86400";
const SOURCE_MAP_HEADER: &str = "sourcemap";

/// Characters re-encoded when a decoded path is echoed back in a `Location` header.
const LOCATION_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Serve everything that is not the webhook: canonical redirects, templates and files.
pub(super) async fn serve(State(state): State<HttpState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::POST {
        let mut response = HttpError::new(
            SOURCE,
            StatusCode::METHOD_NOT_ALLOWED,
            "405",
            format!("method {method} is not served"),
        )
        .into_response();
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET, POST"));
        return response;
    }

    let mut response = serve_path(&state, &method, &uri).await;
    if method == Method::GET && !is_failure(response.status()) {
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static(GET_CACHE_CONTROL));
    }
    response
}

async fn serve_path(state: &HttpState, method: &Method, uri: &Uri) -> Response {
    let decoded = match percent_decode_str(uri.path()).decode_utf8() {
        Ok(decoded) if decoded.contains('\0') => Err("request path contains a NUL byte"),
        Ok(decoded) => Ok(decoded),
        Err(_) => Err("request path is not valid percent-encoded UTF-8"),
    };
    let decoded = match decoded {
        Ok(decoded) => decoded,
        Err(message) => {
            let request = RequestInfo::new(method.as_str(), uri.path(), uri.query());
            let report = ErrorReport::from_message(SOURCE, StatusCode::BAD_REQUEST, message);
            return error_response(state, StatusCode::BAD_REQUEST, request, report).await;
        }
    };
    let decoded = decoded.into_owned();
    let request = RequestInfo::new(method.as_str(), decoded.clone(), uri.query());

    let resolver = state.engine.resolver();
    let site = resolver.site();
    let request_path = format!("{}{decoded}", site.public_dir);
    let physical = match resolver.resolve(&request_path).await {
        Ok(physical) => physical,
        Err(err) => {
            let (status, report) = HttpError::from(err).into_parts();
            return error_response(state, status, request, report).await;
        }
    };

    let Some(public) = public_path(site, &physical) else {
        let report = ErrorReport::from_message(
            SOURCE,
            StatusCode::NOT_FOUND,
            format!("`{physical}` is outside the public directory"),
        );
        return error_response(state, StatusCode::NOT_FOUND, request, report).await;
    };
    if public != decoded {
        let mut location = utf8_percent_encode(&public, LOCATION_ESCAPES).to_string();
        if let Some(query) = uri.query() {
            location.push('?');
            location.push_str(query);
        }
        debug!(
            target = "pressbox::http::public",
            from = %decoded,
            to = %location,
            "Redirecting to canonical path"
        );
        return redirect(StatusCode::FOUND, &location);
    }

    if !is_file(&physical).await {
        let report = ErrorReport::from_message(
            SOURCE,
            StatusCode::NOT_FOUND,
            format!("`{physical}` does not exist"),
        );
        return error_response(state, StatusCode::NOT_FOUND, request, report).await;
    }

    if physical.has_extension(&site.template_ext) {
        return match state
            .engine
            .load(&request_path, LoadContext::new(request.clone()))
            .await
        {
            Ok(rendered) => render_response(&rendered, StatusCode::OK),
            Err(err) => {
                let (status, report) = HttpError::from(err).into_parts();
                error_response(state, status, request, report).await
            }
        };
    }

    serve_file(state, &physical, &public, request).await
}

async fn serve_file(
    state: &HttpState,
    physical: &PhysicalPath,
    public: &str,
    request: RequestInfo,
) -> Response {
    let bytes = match fs::read(physical).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let status = if err.kind() == ErrorKind::NotFound {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            let report = ErrorReport::from_error(SOURCE, status, &err);
            return error_response(state, status, request, report).await;
        }
    };

    let mut response = Body::from(bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type(public)));

    let template_ext = &state.engine.resolver().site().template_ext;
    if AssetKind::classify(public, template_ext).has_source_map() {
        let name = public.rsplit('/').next().unwrap_or(public);
        if let Ok(value) = HeaderValue::from_str(&format!("{name}.map")) {
            headers.insert(HeaderName::from_static(SOURCE_MAP_HEADER), value);
        }
    }
    response
}

/// Answer with `<error_dir>/<status>` when such a page exists, otherwise plain text.
pub(super) async fn error_response(
    state: &HttpState,
    status: StatusCode,
    request: RequestInfo,
    report: ErrorReport,
) -> Response {
    let mut response = match error_page(state, status, request).await {
        Some(response) => response,
        None => (status, status.as_u16().to_string()).into_response(),
    };
    report.attach(&mut response);
    response
}

async fn error_page(
    state: &HttpState,
    status: StatusCode,
    request: RequestInfo,
) -> Option<Response> {
    let resolver = state.engine.resolver();
    let site = resolver.site();
    let page = format!("{}/{}", site.error_dir, status.as_u16());

    let physical = resolver.resolve(&page).await.ok()?;
    if !is_file(&physical).await {
        return None;
    }

    if physical.has_extension(&site.template_ext) {
        return match state.engine.load(&page, LoadContext::new(request)).await {
            Ok(rendered) => Some(render_response(&rendered, status)),
            Err(err) => {
                warn!(
                    target = "pressbox::http::public",
                    page = %physical,
                    error = %err,
                    "Error page failed to render"
                );
                None
            }
        };
    }

    let body = fs::read(&physical).await.ok()?;
    let mut response = (status, body).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    Some(response)
}

/// Turn a template result into a response: either a redirect, or the body with the
/// template's status and non-empty headers.
fn render_response(rendered: &Rendered, default_status: StatusCode) -> Response {
    let status = rendered
        .status
        .and_then(|code| StatusCode::from_u16(code).ok());

    if let Some(location) = &rendered.redirect {
        return redirect(status.unwrap_or(StatusCode::FOUND), location);
    }

    let mut response = (
        status.unwrap_or(default_status),
        rendered.value.clone(),
    )
        .into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    for (name, value) in rendered.present_headers() {
        match (
            HeaderName::try_from(name),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(
                target = "pressbox::http::public",
                template = %rendered.physical,
                header = name,
                "Skipping invalid template header"
            ),
        }
    }
    response
}

fn redirect(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = status.into_response();
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(err) => HttpError::new(
            "infra::http::public::redirect",
            StatusCode::INTERNAL_SERVER_ERROR,
            "500",
            format!("invalid redirect location `{location}`: {err}"),
        )
        .into_response(),
    }
}

/// The request path that canonically names `physical`: the public directory, template and
/// page extensions, and a trailing `index` are dropped.
fn public_path(site: &SiteSettings, physical: &PhysicalPath) -> Option<String> {
    let served_root = format!("{}{}", site.root, site.public_dir);
    let mut public = physical.as_str().strip_prefix(&served_root)?;
    if !public.is_empty() && !public.starts_with('/') {
        return None;
    }

    let template_suffix = format!(".{}", site.template_ext);
    for suffix in [template_suffix.as_str(), ".html", ".htm"] {
        if let Some(stem) = public.strip_suffix(suffix) {
            public = stem;
            break;
        }
    }
    let index_suffix = format!("/{}", site.index_name);
    if let Some(stem) = public.strip_suffix(&index_suffix) {
        public = &public[..stem.len() + 1];
    }
    if public.is_empty() {
        return Some("/".to_string());
    }
    Some(public.to_string())
}

/// Extensionless files are served as plain text.
fn content_type(public: &str) -> &'static str {
    let name = public.rsplit('/').next().unwrap_or(public);
    if !name.contains('.') {
        return "text/plain";
    }
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or("application/octet-stream")
}

async fn is_file(physical: &PhysicalPath) -> bool {
    fs::metadata(physical)
        .await
        .is_ok_and(|meta| meta.is_file())
}

fn is_failure(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}
