//! HTTP routing.
//!
//! | Route               | Handler                                   |
//! |---------------------|-------------------------------------------|
//! | `/icons/*`          | static files from the icons directory     |
//! | `/thumbnail/<path>` | cached thumbnail of an image under root   |
//! | everything else     | directory listing or the raw file         |
//!
//! Resolution, listing and thumbnail generation touch the filesystem
//! synchronously, so they run on the blocking pool.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use files::{EntryKind, PathResolver, ResolveError, Resolved, ThumbnailCache, ThumbnailError};
use thiserror::Error;
use tokio::task::JoinError;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info};

use crate::auth::{require_basic_auth, Credentials};
use crate::config::ServerConfig;
use crate::listing::DirectoryListing;
use crate::render::{render_error_page, render_listing};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<PathResolver>,
    pub thumbnails: Arc<ThumbnailCache>,
}

impl AppState {
    pub fn new(resolver: PathResolver, thumbnails: ThumbnailCache) -> Self {
        Self {
            resolver: Arc::new(resolver),
            thumbnails: Arc::new(thumbnails),
        }
    }
}

/// Errors surfaced by request handlers.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),

    #[error("thumbnail requested for a directory: {0}")]
    NotAFile(String),

    #[error("failed to list directory {path}: {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("method not allowed: {0}")]
    MethodNotAllowed(Method),

    #[error("background task failed: {0}")]
    Task(#[from] JoinError),
}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Resolve(err) => match err {
                ResolveError::MalformedPath(_) => StatusCode::BAD_REQUEST,
                ResolveError::TraversalAttempt(_) | ResolveError::OutsideRoot(_) => {
                    StatusCode::FORBIDDEN
                }
                ResolveError::HiddenPathRejected(_) | ResolveError::NotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                ResolveError::StatFailed { .. } | ResolveError::InvalidRoot { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::NotAFile(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Thumbnail(_) | Self::Listing { .. } | Self::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn public_message(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "The request path is malformed.",
        StatusCode::FORBIDDEN => "You do not have access to this path.",
        StatusCode::NOT_FOUND => "The requested file or folder does not exist.",
        StatusCode::METHOD_NOT_ALLOWED => "Only GET and HEAD requests are supported.",
        _ => "Something went wrong on the server.",
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let page = render_error_page(status, public_message(status));
        (status, Html(page)).into_response()
    }
}

/// Build the application router.
///
/// Authentication wraps every route when `credentials` is set; request
/// logging sits outside it so rejected requests are logged too.
pub fn router(state: AppState, server: &ServerConfig, credentials: Option<Credentials>) -> Router {
    let mut router = Router::new()
        .route("/thumbnail/{*path}", get(thumbnail))
        .nest_service("/icons", ServeDir::new(&server.icons_dir))
        .fallback(browse)
        .with_state(state);

    if let Some(credentials) = credentials {
        router = router.layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            require_basic_auth,
        ));
    }

    if server.log_requests {
        router = router.layer(middleware::from_fn(log_request));
    }

    router
}

/// Directory listing or raw file for any path under the root.
async fn browse(State(state): State<AppState>, request: Request) -> Result<Response, RequestError> {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return Err(RequestError::MethodNotAllowed(request.method().clone()));
    }

    let raw = request.uri().path().to_string();
    let resolved = resolve(&state, raw).await?;

    match resolved.kind {
        EntryKind::File => Ok(serve_file(resolved.path.as_path(), request).await),
        EntryKind::Directory => {
            let dir = resolved.path;
            let resolver = Arc::clone(&state.resolver);
            let listing = tokio::task::spawn_blocking(move || {
                DirectoryListing::build(&resolver, &dir).map_err(|source| RequestError::Listing {
                    path: dir.as_path().to_path_buf(),
                    source,
                })
            })
            .await??;

            Ok(Html(render_listing(&listing)).into_response())
        }
    }
}

/// Thumbnail of the image at the path following `/thumbnail`.
async fn thumbnail(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, RequestError> {
    let raw = request
        .uri()
        .path()
        .strip_prefix("/thumbnail")
        .unwrap_or_default()
        .to_string();
    let resolved = resolve(&state, raw).await?;

    if resolved.kind != EntryKind::File {
        return Err(RequestError::NotAFile(resolved.path.url_path()));
    }

    let cache = Arc::clone(&state.thumbnails);
    let source = resolved.path;
    let thumbnail = tokio::task::spawn_blocking(move || cache.get_thumbnail(&source)).await??;

    Ok(serve_file(&thumbnail, request).await)
}

async fn resolve(state: &AppState, raw: String) -> Result<Resolved, RequestError> {
    let resolver = Arc::clone(&state.resolver);
    let resolved = tokio::task::spawn_blocking(move || resolver.resolve(&raw)).await??;
    Ok(resolved)
}

/// Serve a file with content type, range and conditional request support.
async fn serve_file(path: &Path, request: Request) -> Response {
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Log method, path, status, client and elapsed time of each request.
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        %path,
        status = response.status().as_u16(),
        %client,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Handled request"
    );
    response
}
