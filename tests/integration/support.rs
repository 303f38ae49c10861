#![allow(dead_code)]

use cachepatch::asset::{compress, AssetStore, ImportWrapper};
use cachepatch::coordinator::ScanCoordinator;
use cachepatch::events::{EventSink, MemorySink};
use cachepatch::fetcher::{AssetSource, Download, FetchError, FetchSettings, ReferenceFetcher};
use cachepatch::host::{HostControl, HostError};
use cachepatch::patcher::{HostLayout, PatchApplier, ReloadSettings};
use cachepatch::scanner::{CacheScanner, ScannerConfig};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Serializes tests that read or write `CACHEPATCH_*` variables.
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

pub const CDN_URL: &str = "https://cdn.test/public/css/webui/friends.css";

/// A stylesheet large enough to compress to a few kilobytes.
pub fn stylesheet(rules: usize) -> Vec<u8> {
    (0..rules)
        .map(|i| format!(".friend_{i} {{ color: #{:06x}; margin: {}px; }}\n", i * 7919, i % 13))
        .collect::<String>()
        .into_bytes()
}

pub fn chat_page(token: &str) -> String {
    format!(
        r#"<html><head><link href="https://cdn.test/public/css/webui/friends.css?v={token}&amp;l=english" rel="stylesheet"></head></html>"#
    )
}

/// Scripted remote: a chat page and one stylesheet body.
pub struct FakeSource {
    pub page: Mutex<String>,
    pub body: Mutex<Vec<u8>>,
    pub etag: Mutex<Option<String>>,
    pub delay: Duration,
    pub documents: AtomicUsize,
    pub assets: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeSource {
    pub fn new(page: String, body: Vec<u8>) -> Self {
        Self {
            page: Mutex::new(page),
            body: Mutex::new(body),
            etag: Mutex::new(None),
            delay: Duration::ZERO,
            documents: AtomicUsize::new(0),
            assets: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn documents(&self) -> usize {
        self.documents.load(Ordering::SeqCst)
    }

    pub fn assets(&self) -> usize {
        self.assets.load(Ordering::SeqCst)
    }
}

impl AssetSource for FakeSource {
    fn fetch_document(&self) -> Result<String, FetchError> {
        self.documents.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable("offline".into()));
        }
        Ok(self.page.lock().unwrap().clone())
    }

    fn fetch_asset(&self, _url: &str) -> Result<Download, FetchError> {
        self.assets.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(Download {
            bytes: self.body.lock().unwrap().clone(),
            etag: self.etag.lock().unwrap().clone(),
        })
    }
}

/// Host that records reload commands.
#[derive(Default)]
pub struct FakeHost {
    pub running: AtomicBool,
    pub signals: Mutex<Vec<String>>,
}

impl HostControl for FakeHost {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn window_present(&self) -> bool {
        self.is_running()
    }

    fn send_signal(&self, uri: &str) -> Result<(), HostError> {
        self.signals.lock().unwrap().push(uri.to_string());
        Ok(())
    }
}

/// A host install with a cache directory and a fully wired coordinator.
pub struct Harness {
    pub root: TempDir,
    pub cache: PathBuf,
    pub ui: PathBuf,
    pub css: Vec<u8>,
    pub compressed: Vec<u8>,
    pub source: Arc<FakeSource>,
    pub host: Arc<FakeHost>,
    pub events: Arc<MemorySink>,
    pub coordinator: Arc<ScanCoordinator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_source(|page, body| FakeSource::new(page, body))
    }

    pub fn with_source(make: impl FnOnce(String, Vec<u8>) -> FakeSource) -> Self {
        let root = TempDir::new().unwrap();
        let cache = root.path().join("htmlcache").join("Cache");
        let ui = root.path().join("clientui");
        fs::create_dir_all(&cache).unwrap();

        let css = stylesheet(200);
        let compressed = compress(&css).unwrap();
        let source = Arc::new(make(chat_page("8761234"), compressed.clone()));
        let host = Arc::new(FakeHost::default());
        let events = Arc::new(MemorySink::new());
        let coordinator = Arc::new(build_coordinator(
            &cache,
            &ui,
            Arc::clone(&source),
            Arc::clone(&host),
            Arc::clone(&events),
        ));

        Self {
            root,
            cache,
            ui,
            css,
            compressed,
            source,
            host,
            events,
            coordinator,
        }
    }

    pub fn patched(&self) -> Vec<u8> {
        ImportWrapper::default().patch(&self.compressed).unwrap()
    }

    pub fn entry(&self, name: &str) -> PathBuf {
        self.cache.join(name)
    }
}

pub fn build_coordinator(
    cache: &Path,
    ui: &Path,
    source: Arc<FakeSource>,
    host: Arc<FakeHost>,
    events: Arc<MemorySink>,
) -> ScanCoordinator {
    let sink: Arc<dyn EventSink> = events;
    let host: Arc<dyn HostControl> = host;
    let fetcher = ReferenceFetcher::new(
        Arc::new(AssetStore::default()),
        source,
        FetchSettings {
            asset_name: "friends.css".into(),
            fallback_url: CDN_URL.into(),
            wrapper: ImportWrapper::default(),
        },
        Arc::clone(&sink),
    )
    .unwrap();
    let scanner = CacheScanner::new(ScannerConfig::default().with_io_threads(4), Arc::clone(&sink));
    let applier = PatchApplier::new(
        HostLayout::new(ui, "friends"),
        ReloadSettings {
            delay: Duration::from_millis(1),
            ..ReloadSettings::default()
        },
        Arc::clone(&host),
        Arc::clone(&sink),
    );
    ScanCoordinator::new(fetcher, scanner, applier, cache, host, sink)
}

/// Write a cache entry and backdate it by `age_secs`.
pub fn write_entry(path: &Path, bytes: &[u8], age_secs: u64) {
    fs::write(path, bytes).unwrap();
    let when = SystemTime::now() - Duration::from_secs(age_secs);
    set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
}

/// Gzip-looking bytes of exactly `len` bytes that match nothing.
pub fn decoy(len: usize, seed: u8) -> Vec<u8> {
    let mut bytes = vec![0x1f, 0x8b];
    bytes.extend((0..len.saturating_sub(2)).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)));
    bytes.truncate(len);
    bytes
}
