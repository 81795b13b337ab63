//! HTTP routes for the web server.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tower::util::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use crate::precheck::ServeTarget;

/// Build the router serving `target` under its one route.
///
/// Matching is done on the percent-decoded request path rather than through
/// the router's path syntax, so file names containing `:` or `*` work and any
/// client encoding of the name reaches the file.
pub fn build_router(target: Arc<ServeTarget>) -> Router {
    Router::new()
        .fallback(file_handler)
        .with_state(target)
        .layer(TraceLayer::new_for_http())
}

/// Handler for every request; only the target's route is served.
async fn file_handler(State(target): State<Arc<ServeTarget>>, request: Request) -> Response {
    let is_route = match percent_decode_str(request.uri().path()).decode_utf8() {
        Ok(path) => path == target.route(),
        Err(_) => false,
    };

    if !is_route {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    // Conditional and range requests are handled by ServeFile; a file
    // removed after startup comes back as 404.
    match ServeFile::new(target.absolute_path()).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_target(dir: &Path, name: &str, contents: &[u8]) -> Arc<ServeTarget> {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        Arc::new(ServeTarget::resolve(&path).unwrap())
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_route_returns_file_bytes() {
        let dir = TempDir::new().unwrap();
        let target = create_test_target(dir.path(), "notes.txt", b"hello world");
        let app = build_router(target);

        let response = app.oneshot(get("/notes.txt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello world");
    }

    #[tokio::test]
    async fn test_zero_byte_file() {
        let dir = TempDir::new().unwrap();
        let target = create_test_target(dir.path(), "empty.bin", b"");
        let app = build_router(target);

        let response = app.oneshot(get("/empty.bin")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_binary_round_trip() {
        let dir = TempDir::new().unwrap();
        let contents: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let target = create_test_target(dir.path(), "blob.dat", &contents);
        let app = build_router(target);

        let response = app.oneshot(get("/blob.dat")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), contents.as_slice());
    }

    #[tokio::test]
    async fn test_other_path_not_found() {
        let dir = TempDir::new().unwrap();
        let target = create_test_target(dir.path(), "report.pdf", b"%PDF-1.4");
        let app = build_router(target);

        for uri in ["/", "/other.pdf", "/report.pdf/extra", "/REPORT.pdf"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri {}", uri);
        }

        // The real route still works afterwards
        let response = app.oneshot(get("/report.pdf")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_file_removed_after_startup() {
        let dir = TempDir::new().unwrap();
        let target = create_test_target(dir.path(), "gone.txt", b"soon gone");
        fs::remove_file(target.absolute_path()).unwrap();
        let app = build_router(target);

        let response = app.oneshot(get("/gone.txt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_range_request() {
        let dir = TempDir::new().unwrap();
        let target = create_test_target(dir.path(), "digits.txt", b"0123456789");
        let app = build_router(target);

        let request = Request::builder()
            .uri("/digits.txt")
            .header(header::RANGE, "bytes=2-5")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"2345");
    }

    #[tokio::test]
    async fn test_head_request_has_no_body() {
        let dir = TempDir::new().unwrap();
        let target = create_test_target(dir.path(), "page.html", b"<p>hi</p>");
        let app = build_router(target);

        let request = Request::builder()
            .method(Method::HEAD)
            .uri("/page.html")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().contains("text/html"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_percent_encoded_name() {
        let dir = TempDir::new().unwrap();
        let target = create_test_target(dir.path(), "my file.txt", b"spaced");
        let app = build_router(target);

        let response = app.oneshot(get("/my%20file.txt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_name_with_router_syntax() {
        let dir = TempDir::new().unwrap();
        let target = create_test_target(dir.path(), ":weird*.txt", b"still served");
        let app = build_router(target);

        let response = app.oneshot(get("/:weird*.txt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_name_matched_under_any_encoding() {
        let dir = TempDir::new().unwrap();
        let target = create_test_target(dir.path(), "it's (1).txt", b"quoted");
        let app = build_router(target);

        for uri in ["/it%27s%20%281%29.txt", "/it's%20(1).txt", "/it%27s%20(1).txt"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "uri {}", uri);
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_escape_not_found() {
        let dir = TempDir::new().unwrap();
        let target = create_test_target(dir.path(), "notes.txt", b"hello");
        let app = build_router(target);

        let response = app.oneshot(get("/notes%FF.txt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
