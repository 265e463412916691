//! Router construction.
//!
//! The reload endpoint is the only route; every other request is a file
//! lookup in the mirror.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::http::header::CACHE_CONTROL;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::live_reload;
use crate::state::AppState;

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
/// * `mirror_root` - Directory served as the site
/// * `reload_path` - Path of the WebSocket reload endpoint
pub(crate) fn create_router(state: Arc<AppState>, mirror_root: &Path, reload_path: &str) -> Router {
    Router::new()
        .route(reload_path, get(live_reload::ws_handler))
        .fallback_service(ServeDir::new(mirror_root))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                // Reloads must never be answered from the browser cache
                .layer(SetResponseHeaderLayer::overriding(
                    CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                )),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;
    use std::sync::Mutex;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use tracing_subscriber::EnvFilter;
    use wd_mirror::RELOAD_MARKER;

    use super::*;
    use crate::live_reload::ReloadDispatcher;

    fn router(root: &Path) -> Router {
        let (_tx, rx) = mpsc::channel(1);
        let state = Arc::new(AppState {
            dispatcher: ReloadDispatcher::new(rx),
            outbox_capacity: 4,
        });
        create_router(state, root, "/_reload")
    }

    async fn get_path(router: Router, path: &str) -> (StatusCode, String, Option<HeaderValue>) {
        let response = router
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let cache = response.headers().get(CACHE_CONTROL).cloned();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).into_owned(), cache)
    }

    /// Log sink shared with the test.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_serves_mirror_files() {
        let root = tempfile::tempdir().unwrap();
        let page = format!("<html><head>{RELOAD_MARKER}</head></html>");
        fs::write(root.path().join("index.html"), &page).unwrap();

        let (status, body, cache) = get_path(router(root.path()), "/index.html").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, page);
        assert_eq!(cache, Some(HeaderValue::from_static("no-store")));
    }

    #[tokio::test]
    async fn test_directory_serves_index() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("blog")).unwrap();
        fs::write(root.path().join("blog/index.html"), "<p>blog</p>").unwrap();

        let (status, body, _) = get_path(router(root.path()), "/blog/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<p>blog</p>");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let root = tempfile::tempdir().unwrap();

        let (status, _, _) = get_path(router(root.path()), "/nope.css").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reload_path_requires_upgrade() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("_reload"), "file").unwrap();

        let (status, body, _) = get_path(router(root.path()), "/_reload").await;

        // Routed to the WebSocket handler, not the file
        assert_ne!(status, StatusCode::OK);
        assert_ne!(body, "file");
    }

    #[tokio::test]
    async fn test_requests_are_logged_at_info() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("index.html"), "<p>hi</p>").unwrap();
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("info"))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (status, _, _) = get_path(router(root.path()), "/index.html").await;

        assert_eq!(status, StatusCode::OK);
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("/index.html"), "{output}");
        assert!(output.contains("status=200"), "{output}");
    }
}
