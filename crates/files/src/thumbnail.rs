//! On-demand thumbnail cache.
//!
//! Thumbnails are generated the first time they are requested and written
//! under a process-scoped cache root that mirrors the server root's layout.
//! After that they are served straight from disk until the whole cache root
//! is torn down.
//!
//! # Concurrency
//!
//! Generation for a given source happens at most once at a time. The first
//! caller registers an [`InFlight`] handle and does the work outside of any
//! lock; callers arriving meanwhile block on that handle and share its
//! result. Requests for different sources never wait on each other.
//!
//! Files are encoded into a hidden temporary file next to the destination
//! and renamed into place, so a partially written thumbnail is never
//! observable as a cache hit.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use tracing::{debug, info, warn};

use crate::error::ThumbnailError;
use crate::resolver::ResolvedPath;

/// Edge length of the square bounding box thumbnails are fitted into.
pub const THUMBNAIL_SIZE: u32 = 100;

/// Produces the thumbnail image for a source file.
///
/// [`ImageThumbnailer`] is the real implementation; the trait exists so the
/// cache can be driven by other producers.
pub trait ThumbnailGenerator: Send + Sync {
    /// Decode `source` and return the image to store.
    fn generate(&self, source: &Path) -> Result<DynamicImage, ThumbnailError>;
}

/// Rotation implied by an EXIF orientation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// 180 degrees (orientation 3).
    Half,
    /// 90 degrees clockwise, i.e. 270 counter-clockwise (orientation 6).
    Clockwise,
    /// 90 degrees counter-clockwise, i.e. 270 clockwise (orientation 8).
    CounterClockwise,
}

impl Rotation {
    /// Map an EXIF orientation value to a rotation.
    ///
    /// Only 3, 6 and 8 are acted on; everything else, including the mirrored
    /// variants, leaves the image as decoded.
    pub fn from_exif_orientation(value: u32) -> Option<Self> {
        match value {
            3 => Some(Self::Half),
            6 => Some(Self::Clockwise),
            8 => Some(Self::CounterClockwise),
            _ => None,
        }
    }

    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Half => image.rotate180(),
            Self::Clockwise => image.rotate90(),
            Self::CounterClockwise => image.rotate270(),
        }
    }
}

/// Read the EXIF orientation of an image file.
///
/// Any failure to open or parse the metadata yields `None`.
pub fn read_orientation(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);

    let exif = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "No usable EXIF metadata");
            return None;
        }
    };

    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
}

/// Decodes with the `image` crate, applies EXIF orientation and fits the
/// result into a square box with Lanczos resampling.
#[derive(Debug, Clone, Copy)]
pub struct ImageThumbnailer {
    size: u32,
}

impl ImageThumbnailer {
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

impl Default for ImageThumbnailer {
    fn default() -> Self {
        Self::new(THUMBNAIL_SIZE)
    }
}

impl ThumbnailGenerator for ImageThumbnailer {
    fn generate(&self, source: &Path) -> Result<DynamicImage, ThumbnailError> {
        let decode_error = |reason: String| ThumbnailError::DecodeError {
            path: source.to_path_buf(),
            reason,
        };

        let image = ImageReader::open(source)
            .map_err(|e| decode_error(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| decode_error(e.to_string()))?
            .decode()
            .map_err(|e| decode_error(e.to_string()))?;

        let image = match read_orientation(source).and_then(Rotation::from_exif_orientation) {
            Some(rotation) => rotation.apply(image),
            None => image,
        };

        Ok(image.resize(self.size, self.size, FilterType::Lanczos3))
    }
}

/// Handle for a generation in progress.
struct InFlight {
    result: Mutex<Option<Result<PathBuf, ThumbnailError>>>,
    ready: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, result: Result<PathBuf, ThumbnailError>) {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> Result<PathBuf, ThumbnailError> {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Owner side of an [`InFlight`] registration.
///
/// Dropping it without calling [`FlightGuard::finish`] (a panicking
/// generator) still wakes the waiters and clears the registry entry.
struct FlightGuard<'a> {
    cache: &'a ThumbnailCache,
    key: PathBuf,
    flight: Arc<InFlight>,
    published: bool,
}

impl FlightGuard<'_> {
    fn finish(
        mut self,
        result: Result<PathBuf, ThumbnailError>,
    ) -> Result<PathBuf, ThumbnailError> {
        self.flight.publish(result.clone());
        self.published = true;
        result
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            self.flight
                .publish(Err(ThumbnailError::GenerationAborted(self.key.clone())));
        }
        self.cache
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Disk-backed thumbnail cache scoped to one server process.
pub struct ThumbnailCache {
    cache_root: PathBuf,
    generator: Arc<dyn ThumbnailGenerator>,
    /// Keyed by the source path relative to the server root.
    in_flight: Mutex<HashMap<PathBuf, Arc<InFlight>>>,
}

impl ThumbnailCache {
    /// Create a cache rooted at `cache_root` using [`ImageThumbnailer`].
    pub fn new<P: AsRef<Path>>(cache_root: P) -> Result<Self, ThumbnailError> {
        Self::with_generator(cache_root, Arc::new(ImageThumbnailer::default()))
    }

    /// Create a cache with a custom generator.
    pub fn with_generator<P: AsRef<Path>>(
        cache_root: P,
        generator: Arc<dyn ThumbnailGenerator>,
    ) -> Result<Self, ThumbnailError> {
        let cache_root = cache_root.as_ref();
        let root_error = |e: io::Error| ThumbnailError::CacheRoot {
            path: cache_root.to_path_buf(),
            reason: e.to_string(),
        };

        fs::create_dir_all(cache_root).map_err(root_error)?;
        let cache_root = fs::canonicalize(cache_root).map_err(root_error)?;

        info!(cache_root = %cache_root.display(), "Thumbnail cache ready");
        Ok(Self {
            cache_root,
            generator,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Where the thumbnail for `source` lives, whether or not it exists yet.
    pub fn destination_for(&self, source: &ResolvedPath) -> PathBuf {
        self.cache_root.join(source.relative())
    }

    /// Return the thumbnail for `source`, generating it on first use.
    pub fn get_thumbnail(&self, source: &ResolvedPath) -> Result<PathBuf, ThumbnailError> {
        let destination = self.destination_for(source);
        if destination.is_file() {
            debug!(path = %destination.display(), "Thumbnail cache hit");
            return Ok(destination);
        }

        let key = source.relative().to_path_buf();
        let (flight, is_owner) = self.join_in_flight(&key);
        if !is_owner {
            debug!(source = %key.display(), "Waiting for in-flight thumbnail");
            return flight.wait();
        }

        let guard = FlightGuard {
            cache: self,
            key,
            flight,
            published: false,
        };

        // Another owner may have finished between the fast path and joining.
        let result = if destination.is_file() {
            Ok(destination)
        } else {
            self.generate(source.as_path(), &destination)
        };

        guard.finish(result)
    }

    /// Remove the whole cache root. A missing root is not an error.
    pub fn cleanup(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.cache_root) {
            Ok(()) => {
                info!(cache_root = %self.cache_root.display(), "Removed thumbnail cache");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn join_in_flight(&self, key: &Path) -> (Arc<InFlight>, bool) {
        let mut map = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = map.get(key) {
            return (Arc::clone(existing), false);
        }

        let flight = Arc::new(InFlight::new());
        map.insert(key.to_path_buf(), Arc::clone(&flight));
        (flight, true)
    }

    fn generate(&self, source: &Path, destination: &Path) -> Result<PathBuf, ThumbnailError> {
        let started = Instant::now();

        let thumbnail = self.generator.generate(source)?;
        persist(&thumbnail, destination)?;

        debug!(
            source = %source.display(),
            thumbnail = %destination.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated thumbnail"
        );
        Ok(destination.to_path_buf())
    }
}

/// Output format for a destination: taken from its extension, PNG when the
/// extension names nothing we can encode.
fn output_format(destination: &Path) -> ImageFormat {
    ImageFormat::from_path(destination)
        .ok()
        .filter(|format| format.writing_enabled())
        .unwrap_or(ImageFormat::Png)
}

/// Encode `image` and atomically place it at `destination`.
fn persist(image: &DynamicImage, destination: &Path) -> Result<(), ThumbnailError> {
    let persist_error = |reason: String| ThumbnailError::PersistError {
        path: destination.to_path_buf(),
        reason,
    };

    let parent = destination
        .parent()
        .ok_or_else(|| persist_error("destination has no parent directory".to_string()))?;
    fs::create_dir_all(parent).map_err(|e| persist_error(e.to_string()))?;

    let format = output_format(destination);
    let encodable = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        ImageFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => image.clone(),
    };

    let mut bytes = Cursor::new(Vec::new());
    encodable
        .write_to(&mut bytes, format)
        .map_err(|e| persist_error(e.to_string()))?;

    // Dropping the temp file on any error below removes it.
    let mut temp = tempfile::Builder::new()
        .prefix(".thumb-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| persist_error(e.to_string()))?;
    temp.write_all(bytes.get_ref())
        .map_err(|e| persist_error(e.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| persist_error(e.to_string()))?;

    temp.persist(destination).map_err(|e| {
        warn!(path = %destination.display(), error = %e.error, "Failed to place thumbnail");
        persist_error(e.error.to_string())
    })?;

    Ok(())
}
