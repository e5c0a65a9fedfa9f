//! Server lifecycle: build state from config, serve until a shutdown
//! signal, then remove the thumbnail cache.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use files::{PathResolver, ThumbnailCache};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::auth::Credentials;
use crate::config::Config;
use crate::network::{advertised_ipv4, server_url};
use crate::qr::render_terminal_qr;
use crate::routes::{self, AppState};
use crate::shutdown::shutdown_signal;

/// A configured, not yet listening, server.
pub struct App {
    config: Config,
    state: AppState,
}

impl App {
    /// Open the server root and create the thumbnail cache directory.
    pub fn new(config: Config) -> Result<Self> {
        let resolver = PathResolver::new(&config.server.root_dir).with_context(|| {
            format!(
                "Failed to open root directory {}",
                config.server.root_dir.display()
            )
        })?;

        let cache_dir = config.thumbnails.cache_dir_or_default();
        let thumbnails = ThumbnailCache::new(&cache_dir).with_context(|| {
            format!("Failed to create thumbnail cache {}", cache_dir.display())
        })?;

        info!(
            root = %resolver.root().display(),
            cache = %thumbnails.cache_root().display(),
            "Serving directory"
        );

        Ok(Self {
            config,
            state: AppState::new(resolver, thumbnails),
        })
    }

    /// The full router, with authentication and request logging applied
    /// as configured.
    pub fn router(&self) -> Router {
        let credentials = self
            .config
            .auth
            .credentials()
            .map(|(user, pass)| Credentials::new(user, pass));
        if credentials.is_some() {
            info!("Basic authentication enabled");
        }

        routes::router(self.state.clone(), &self.config.server, credentials)
    }

    /// Bind, announce the URL and serve until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(self.config.server.bind_address, self.config.server.port);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        let port = listener.local_addr().map(|a| a.port()).unwrap_or(addr.port());

        let url = server_url(advertised_ipv4(), port);
        info!("Server is running at {}", url);
        match render_terminal_qr(&url) {
            Ok(qr) => println!("{qr}"),
            Err(e) => warn!("Failed to render QR code: {}", e),
        }

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

        info!("Server stopped, removing thumbnail cache");
        if let Err(e) = self.state.thumbnails.cleanup() {
            warn!(
                cache = %self.state.thumbnails.cache_root().display(),
                "Failed to remove thumbnail cache: {}",
                e
            );
        }

        result
    }
}
