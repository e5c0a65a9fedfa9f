//! # lanbrowse server
//!
//! Serves a directory tree over HTTP on the local network: HTML listings
//! with breadcrumbs, raw file downloads and cached image thumbnails,
//! optionally behind Basic authentication.
//!
//! Path safety and thumbnail generation live in the `files` crate; this
//! crate wires them into an axum router.

pub mod app;
pub mod auth;
pub mod config;
pub mod listing;
pub mod network;
pub mod qr;
pub mod render;
pub mod routes;
pub mod shutdown;

pub use app::App;
pub use config::{Config, ConfigError};
pub use routes::{router, AppState, RequestError};
