//! # lanbrowse core
//!
//! The two pieces of lanbrowse that carry real invariants:
//!
//! - [`resolver`]: maps untrusted request paths onto the server root,
//!   refusing traversal, hidden entries and anything that escapes the root.
//! - [`thumbnail`]: an on-disk thumbnail cache that generates each
//!   thumbnail at most once at a time and never exposes partial files.
//!
//! ## Example
//!
//! ```rust,no_run
//! use files::{EntryKind, PathResolver, ThumbnailCache};
//!
//! let resolver = PathResolver::new("./public")?;
//! let cache = ThumbnailCache::new(std::env::temp_dir().join("thumbs"))?;
//!
//! let resolved = resolver.resolve("/photos/a.jpg")?;
//! if resolved.kind == EntryKind::File {
//!     let thumbnail = cache.get_thumbnail(&resolved.path)?;
//!     println!("thumbnail at {}", thumbnail.display());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod resolver;
pub mod thumbnail;

pub use error::{ResolveError, ThumbnailError};
pub use resolver::{EntryKind, PathResolver, Resolved, ResolvedPath};
pub use thumbnail::{
    ImageThumbnailer, Rotation, ThumbnailCache, ThumbnailGenerator, THUMBNAIL_SIZE,
};
