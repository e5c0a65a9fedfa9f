//! Directory listings.
//!
//! Builds the view model rendered by [`crate::render`]: one [`FileInfo`]
//! per visible entry plus breadcrumbs for the current path.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use files::{PathResolver, ResolvedPath};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped inside a single URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

pub const FOLDER_ICON: &str = "/icons/folder.png";
pub const FILE_ICON: &str = "/icons/file.png";

/// A single entry in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Entry name as shown to the user.
    pub name: String,
    /// Absolute URL path with each segment percent-encoded.
    pub link: String,
    /// `/thumbnail` + `link` for images.
    pub thumbnail_link: Option<String>,
    pub is_image: bool,
    pub is_dir: bool,
    /// Local modification time, `02 Jan 2006 15:04`.
    pub modified: String,
    /// Human-readable size; `None` for directories.
    pub size: Option<String>,
    pub icon: &'static str,
}

/// One link in the path trail above a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub name: String,
    pub link: String,
}

/// Everything needed to render one directory page.
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    /// URL path of the directory, decoded.
    pub path: String,
    pub files: Vec<FileInfo>,
    pub breadcrumbs: Vec<Breadcrumb>,
}

impl DirectoryListing {
    /// Read `dir` and build its listing.
    ///
    /// Only entries `resolver` would serve are listed: dot entries, names
    /// containing a backslash, symlinks leading outside the root or onto a
    /// hidden entry, and dangling symlinks are all skipped, as are entries
    /// whose metadata cannot be read.
    pub fn build(resolver: &PathResolver, dir: &ResolvedPath) -> io::Result<Self> {
        let url_path = dir.url_path();
        let base = encode_path(&url_path);

        let mut files = Vec::new();
        for entry in fs::read_dir(dir.as_path())? {
            let entry = entry?;
            if !resolver.is_servable(&entry.path()) {
                tracing::debug!(entry = %entry.path().display(), "Skipping unservable entry");
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();

            // Follows symlinks so linked directories list as directories.
            let metadata = match fs::metadata(entry.path()) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::debug!(entry = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            let link = join_link(&base, &name);
            let is_dir = metadata.is_dir();
            let is_image = !is_dir && is_image(&name);

            files.push(FileInfo {
                thumbnail_link: is_image.then(|| format!("/thumbnail{link}")),
                link,
                is_image,
                is_dir,
                modified: format_timestamp(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
                size: (!is_dir).then(|| format_file_size(metadata.len())),
                icon: if is_dir { FOLDER_ICON } else { icon_for(&name) },
                name,
            });
        }

        sort_entries(&mut files);

        Ok(Self {
            breadcrumbs: breadcrumbs(&url_path),
            path: url_path,
            files,
        })
    }
}

/// Directories first, then files, each group by case-insensitive name.
pub fn sort_entries(files: &mut [FileInfo]) {
    files.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    });
}

/// `Home` followed by one crumb per segment of `url_path`.
pub fn breadcrumbs(url_path: &str) -> Vec<Breadcrumb> {
    let mut crumbs = vec![Breadcrumb {
        name: "Home".to_string(),
        link: "/".to_string(),
    }];

    let mut link = String::new();
    for segment in url_path.split('/').filter(|s| !s.is_empty()) {
        link = join_link(&link, segment);
        crumbs.push(Breadcrumb {
            name: segment.to_string(),
            link: link.clone(),
        });
    }
    crumbs
}

/// Percent-encode each segment of a decoded URL path. The root encodes to
/// an empty string so children can be appended with `/`.
fn encode_path(url_path: &str) -> String {
    url_path
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(String::new(), |acc, segment| join_link(&acc, segment))
}

fn join_link(base: &str, segment: &str) -> String {
    format!("{base}/{}", utf8_percent_encode(segment, SEGMENT))
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Whether the name has an image extension we thumbnail.
pub fn is_image(name: &str) -> bool {
    extension(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Icon URL for a file, chosen by extension.
pub fn icon_for(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("mp3") => "/icons/mp3.png",
        Some("txt" | "rtf") => "/icons/txt.png",
        Some("pdf") => "/icons/pdf.png",
        Some("xls") => "/icons/xls.png",
        Some("zip") => "/icons/zip.png",
        Some("mp4" | "avi" | "mov" | "mkv") => "/icons/video.png",
        Some("doc") => "/icons/doc.png",
        _ => FILE_ICON,
    }
}

/// Binary-unit size: `"512 B"`, `"1.5 KB"`, `"3.0 MB"`.
pub fn format_file_size(size: u64) -> String {
    const UNIT: u64 = 1024;
    if size < UNIT {
        return format!("{size} B");
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = size / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    let prefix = b"KMGTPE"[exp] as char;
    format!("{:.1} {prefix}B", size as f64 / div as f64)
}

/// Local time as `02 Jan 2006 15:04`.
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%d %b %Y %H:%M").to_string()
}
