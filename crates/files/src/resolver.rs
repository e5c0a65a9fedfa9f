//! Sandboxed resolution of request paths.
//!
//! Every path a client sends goes through [`PathResolver::resolve`] before
//! the filesystem is touched. Two independent checks guard the root:
//!
//! 1. The decoded request is scanned segment by segment for `.`/`..` and for
//!    hidden names, before any normalization can absorb them.
//! 2. The joined path is canonicalized and must sit under the canonical root
//!    on a component boundary, which also catches symlinks leading out.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use tracing::{debug, warn};

use crate::error::ResolveError;

/// What a resolved path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// An absolute path proven to lie within the server root.
///
/// Only [`PathResolver`] can construct one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    absolute: PathBuf,
    relative: PathBuf,
}

impl ResolvedPath {
    /// The canonical absolute path.
    pub fn as_path(&self) -> &Path {
        &self.absolute
    }

    /// The path relative to the server root; empty for the root itself.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Whether this is the server root.
    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }

    /// The relative path as a `/`-separated URL path with a leading slash.
    pub fn url_path(&self) -> String {
        let mut url = String::from("/");
        let segments: Vec<String> = self
            .relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        url.push_str(&segments.join("/"));
        url
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.absolute
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub kind: EntryKind,
    pub path: ResolvedPath,
}

/// Maps untrusted request paths onto a fixed root directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    /// Canonical root; never changes after construction.
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for `root`, which must be an existing directory.
    ///
    /// Relative roots are resolved against the current directory once, here.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, ResolveError> {
        let root = root.as_ref();
        let canonical = fs::canonicalize(root).map_err(|e| ResolveError::InvalidRoot {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !canonical.is_dir() {
            return Err(ResolveError::InvalidRoot {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        debug!(root = %canonical.display(), "Path resolver ready");
        Ok(Self { root: canonical })
    }

    /// The canonical server root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a raw (still percent-encoded) request path.
    pub fn resolve(&self, request_path: &str) -> Result<Resolved, ResolveError> {
        let result = self.resolve_inner(request_path);
        if let Err(err) = &result {
            if err.is_client_error() {
                warn!(path = %request_path, error = %err, "Rejected request path");
            }
        }
        result
    }

    /// Whether the existing entry at `path` would be served if requested by
    /// its name: the name is visible and splits into a single segment, and
    /// the canonical target sits under the root without landing on a
    /// hidden entry.
    pub fn is_servable(&self, path: &Path) -> bool {
        let name_ok = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| segments(name).count() == 1 && !name.starts_with('.'));
        if !name_ok {
            return false;
        }

        let Ok(canonical) = fs::canonicalize(path) else {
            return false;
        };
        match canonical.strip_prefix(&self.root) {
            Ok(relative) => !relative.components().any(|c| is_hidden(c.as_os_str())),
            Err(_) => false,
        }
    }

    fn resolve_inner(&self, request_path: &str) -> Result<Resolved, ResolveError> {
        let decoded = decode_request_path(request_path)?;
        check_segments(&decoded)?;

        let relative = normalize(&decoded)?;
        let joined = self.root.join(&relative);

        let canonical = fs::canonicalize(&joined).map_err(|e| stat_error(&joined, e))?;
        if !is_within(&self.root, &canonical) {
            return Err(ResolveError::OutsideRoot(canonical));
        }

        let relative = canonical
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| ResolveError::OutsideRoot(canonical.clone()))?;

        // A symlink inside the root may still land on a hidden entry.
        if relative.components().any(|c| is_hidden(c.as_os_str())) {
            return Err(ResolveError::HiddenPathRejected(decoded));
        }

        let metadata = fs::metadata(&canonical).map_err(|e| stat_error(&canonical, e))?;
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            return Err(ResolveError::StatFailed {
                path: canonical,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "not a regular file or directory",
                ),
            });
        };

        Ok(Resolved {
            kind,
            path: ResolvedPath {
                absolute: canonical,
                relative,
            },
        })
    }
}

/// Percent-decode strictly: every `%` must start a two digit hex escape and
/// the result must be UTF-8 without NUL bytes.
fn decode_request_path(raw: &str) -> Result<String, ResolveError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape_ok = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !escape_ok {
                return Err(ResolveError::MalformedPath(raw.to_string()));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ResolveError::MalformedPath(raw.to_string()))?;

    if decoded.contains('\0') {
        return Err(ResolveError::MalformedPath(raw.to_string()));
    }

    Ok(decoded.into_owned())
}

fn segments(decoded: &str) -> impl Iterator<Item = &str> {
    decoded.split(['/', '\\'])
}

/// Policy check on the un-normalized segments.
fn check_segments(decoded: &str) -> Result<(), ResolveError> {
    for segment in segments(decoded) {
        if segment == "." || segment == ".." {
            return Err(ResolveError::TraversalAttempt(decoded.to_string()));
        }
        if segment.starts_with('.') {
            return Err(ResolveError::HiddenPathRejected(decoded.to_string()));
        }
    }
    Ok(())
}

/// Lexical normalization into a path relative to the root.
fn normalize(decoded: &str) -> Result<PathBuf, ResolveError> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in segments(decoded) {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(ResolveError::OutsideRoot(PathBuf::from(decoded)));
                }
            }
            name => parts.push(name),
        }
    }
    Ok(parts.iter().collect())
}

/// Component-wise containment: `/srv/pub` contains `/srv/pub/x` but not
/// `/srv/public`.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn stat_error(path: &Path, err: io::Error) -> ResolveError {
    if err.kind() == io::ErrorKind::NotFound {
        ResolveError::NotFound(path.to_path_buf())
    } else {
        ResolveError::StatFailed {
            path: path.to_path_buf(),
            source: err,
        }
    }
}
