//! Concurrency tests for the thumbnail cache.
//!
//! These drive many threads at the same cache and count how often the
//! decode/resize step actually runs.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use files::{
    ImageThumbnailer, PathResolver, ResolvedPath, ThumbnailCache, ThumbnailError,
    ThumbnailGenerator,
};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tempfile::TempDir;

/// Wraps the real thumbnailer, counting calls and holding each generation
/// open for a while so concurrent callers overlap.
struct CountingGenerator {
    inner: ImageThumbnailer,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    panic_on_first_call: bool,
}

impl CountingGenerator {
    fn new(delay: Duration) -> Self {
        Self {
            inner: ImageThumbnailer::default(),
            delay,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            panic_on_first_call: false,
        }
    }

    fn panicking_once(delay: Duration) -> Self {
        Self {
            panic_on_first_call: true,
            ..Self::new(delay)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ThumbnailGenerator for CountingGenerator {
    fn generate(&self, source: &Path) -> Result<DynamicImage, ThumbnailError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on_first_call && call == 0 {
            panic!("generator blew up");
        }
        self.inner.generate(source)
    }
}

struct Fixture {
    _temp_dir: TempDir,
    resolver: PathResolver,
    cache: Arc<ThumbnailCache>,
    generator: Arc<CountingGenerator>,
}

fn fixture(generator: CountingGenerator) -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("pub");
    fs::create_dir_all(root.join("photos")).unwrap();

    let generator = Arc::new(generator);
    let cache = ThumbnailCache::with_generator(
        temp_dir.path().join("cache"),
        Arc::clone(&generator) as Arc<dyn ThumbnailGenerator>,
    )
    .unwrap();

    Fixture {
        resolver: PathResolver::new(&root).unwrap(),
        _temp_dir: temp_dir,
        cache: Arc::new(cache),
        generator,
    }
}

fn write_png(root: &Path, relative: &str) {
    let image = RgbImage::from_pixel(64, 32, Rgb([10, 200, 30]));
    image.save(root.join(relative)).unwrap();
}

fn resolve(fixture: &Fixture, request: &str) -> ResolvedPath {
    fixture.resolver.resolve(request).unwrap().path
}

/// Run `get_thumbnail` for each source on its own thread, all released at once.
fn run_concurrently(
    cache: &Arc<ThumbnailCache>,
    sources: Vec<ResolvedPath>,
) -> Vec<thread::Result<Result<std::path::PathBuf, ThumbnailError>>> {
    let barrier = Arc::new(Barrier::new(sources.len()));
    let handles: Vec<_> = sources
        .into_iter()
        .map(|source| {
            let cache = Arc::clone(cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_thumbnail(&source)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join()).collect()
}

#[test]
fn test_concurrent_requests_generate_once() {
    let fixture = fixture(CountingGenerator::new(Duration::from_millis(200)));
    write_png(fixture.resolver.root(), "photos/a.png");
    let source = resolve(&fixture, "/photos/a.png");

    let results = run_concurrently(&fixture.cache, vec![source.clone(); 16]);

    let expected = fixture.cache.cache_root().join("photos/a.png");
    for result in results {
        let path = result.expect("thread panicked").expect("thumbnail failed");
        assert_eq!(path, expected);
    }
    assert_eq!(fixture.generator.calls(), 1);

    let thumbnail = image::open(&expected).unwrap();
    assert_eq!(thumbnail.dimensions(), (100, 50));
}

#[test]
fn test_repeated_requests_reuse_cached_file() {
    let fixture = fixture(CountingGenerator::new(Duration::ZERO));
    write_png(fixture.resolver.root(), "photos/a.png");
    let source = resolve(&fixture, "/photos/a.png");

    let first = fixture.cache.get_thumbnail(&source).unwrap();
    let second = fixture.cache.get_thumbnail(&source).unwrap();

    assert_eq!(first, second);
    assert_eq!(fixture.generator.calls(), 1);
}

#[test]
fn test_different_sources_generate_in_parallel() {
    let fixture = fixture(CountingGenerator::new(Duration::from_millis(300)));
    write_png(fixture.resolver.root(), "photos/a.png");
    write_png(fixture.resolver.root(), "photos/b.png");
    let a = resolve(&fixture, "/photos/a.png");
    let b = resolve(&fixture, "/photos/b.png");

    let results = run_concurrently(&fixture.cache, vec![a, b]);

    for result in results {
        assert!(result.unwrap().is_ok());
    }
    assert_eq!(fixture.generator.calls(), 2);
    assert_eq!(fixture.generator.max_active.load(Ordering::SeqCst), 2);
}

#[test]
fn test_waiters_share_failure_and_later_call_retries() {
    let fixture = fixture(CountingGenerator::new(Duration::from_millis(200)));
    fs::write(fixture.resolver.root().join("photos/bad.png"), b"garbage").unwrap();
    let source = resolve(&fixture, "/photos/bad.png");

    let results = run_concurrently(&fixture.cache, vec![source.clone(); 8]);

    for result in results {
        let outcome = result.expect("thread panicked");
        assert!(matches!(outcome, Err(ThumbnailError::DecodeError { .. })));
    }
    assert_eq!(fixture.generator.calls(), 1);
    assert!(!fixture.cache.destination_for(&source).exists());

    // Failures are not remembered.
    let retry = fixture.cache.get_thumbnail(&source);
    assert!(matches!(retry, Err(ThumbnailError::DecodeError { .. })));
    assert_eq!(fixture.generator.calls(), 2);
}

#[test]
fn test_panicking_generation_releases_waiters() {
    let fixture = fixture(CountingGenerator::panicking_once(Duration::from_millis(200)));
    write_png(fixture.resolver.root(), "photos/a.png");
    let source = resolve(&fixture, "/photos/a.png");

    let results = run_concurrently(&fixture.cache, vec![source.clone(); 6]);

    let panicked = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(panicked, 1);
    for result in results.into_iter().flatten() {
        assert!(matches!(result, Err(ThumbnailError::GenerationAborted(_))));
    }

    // The registry entry is gone, so the next caller generates afresh.
    let path = fixture.cache.get_thumbnail(&source).unwrap();
    assert!(path.is_file());
    assert_eq!(fixture.generator.calls(), 2);
}
