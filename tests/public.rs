//! Public serving through the full router: canonical redirects, templates, static files
//! and error pages.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use pressbox::application::deploy::{ContentSource, FetchError};
use pressbox::cache::CacheConfig;
use pressbox::config::{DeploySettings, SiteSettings};
use pressbox::infra::http::{HttpState, build_router};
use tempfile::TempDir;
use tower::ServiceExt;

struct NoSource;

#[async_trait]
impl ContentSource for NoSource {
    async fn fetch(&self, _: &str, path: &str, _: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Transport {
            path: path.to_string(),
            message: "offline".into(),
        })
    }
}

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    fs::write(path, contents).expect("write file");
}

fn site() -> (TempDir, Router) {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    write(
        root,
        "www/index.tera",
        "+++\n[fields]\ntitle = \"Home\"\n+++\n<h1>{{ title }}</h1>{{ request.query }}",
    );
    write(
        root,
        "www/created.tera",
        "+++\nstatus = 201\n[headers]\nX-Robots-Tag = \"noindex\"\n+++\ncreated",
    );
    write(
        root,
        "www/moved.tera",
        "+++\nredirect = \"/elsewhere\"\nstatus = 301\n+++\n",
    );
    write(root, "www/docs/index.html", "<p>docs</p>");
    write(root, "www/style.css", "a{color:red}");
    write(root, "www/LICENSE", "BSD");
    write(
        root,
        "error/404.tera",
        "+++\nstatus = 404\n+++\nnothing at {{ request.path | safe }}",
    );

    let state = HttpState::new(
        SiteSettings::rooted_at(root),
        CacheConfig::default(),
        DeploySettings::default(),
        Arc::new(NoSource),
    );
    (dir, build_router(state))
}

async fn send(router: &Router, method: Method, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn index_template_renders_with_request_scope() {
    let (_dir, router) = site();

    let response = send(&router, Method::GET, "/?q=rust").await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "text/html");
    assert_eq!(headers[header::CACHE_CONTROL], "max-age=86400");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "SAMEORIGIN");
    assert_eq!(body_text(response).await, "<h1>Home</h1>q=rust");
}

#[tokio::test]
async fn post_requests_skip_cache_control() {
    let (_dir, router) = site();

    let response = send(&router, Method::POST, "/").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key(header::CACHE_CONTROL));
}

#[tokio::test]
async fn non_canonical_paths_redirect_and_keep_query() {
    let (_dir, router) = site();

    for (from, to) in [
        ("/index.tera", "/"),
        ("/index?page=2", "/?page=2"),
        ("/docs", "/docs/"),
        ("/docs/index.html", "/docs/"),
    ] {
        let response = send(&router, Method::GET, from).await;
        assert_eq!(response.status(), StatusCode::FOUND, "{from}");
        assert_eq!(response.headers()[header::LOCATION], to, "{from}");
    }
}

#[tokio::test]
async fn template_status_and_headers_are_applied() {
    let (_dir, router) = site();

    let response = send(&router, Method::GET, "/created").await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-robots-tag"], "noindex");
    assert_eq!(body_text(response).await, "created");
}

#[tokio::test]
async fn template_redirect_uses_its_status() {
    let (_dir, router) = site();

    let response = send(&router, Method::GET, "/moved").await;

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()[header::LOCATION], "/elsewhere");
}

#[tokio::test]
async fn html_pages_are_served_as_files() {
    let (_dir, router) = site();

    let response = send(&router, Method::GET, "/docs/").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "<p>docs</p>");
}

#[tokio::test]
async fn stylesheets_point_at_their_source_map() {
    let (_dir, router) = site();

    let response = send(&router, Method::GET, "/style.css").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
    assert_eq!(response.headers()["sourcemap"], "style.css.map");
    assert_eq!(body_text(response).await, "a{color:red}");
}

#[tokio::test]
async fn extensionless_files_are_plain_text() {
    let (_dir, router) = site();

    let response = send(&router, Method::GET, "/LICENSE").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
}

#[tokio::test]
async fn missing_files_render_the_error_page() {
    let (_dir, router) = site();

    let response = send(&router, Method::GET, "/nope").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "SAMEORIGIN");
    assert!(!response.headers().contains_key(header::CACHE_CONTROL));
    assert_eq!(body_text(response).await, "nothing at /nope");
}

#[tokio::test]
async fn undecodable_paths_fall_back_to_plain_status() {
    let (_dir, router) = site();

    let response = send(&router, Method::GET, "/%ff").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "400");
}

#[tokio::test]
async fn nul_bytes_in_paths_are_bad_requests() {
    let (_dir, router) = site();

    let response = send(&router, Method::GET, "/a%00b").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "400");
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    let (_dir, router) = site();

    let response = send(&router, Method::DELETE, "/").await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET, POST");
}
