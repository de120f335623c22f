//! Shared fixtures for the registry integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use otaupdater::install::{BlockEngine, EngineCallback, EngineError};
use otaupdater::registry::{
    KeepAlive, RegistryConfig, RegistryServices, UpdateEvent, UpdateRegistry,
};
use otaupdater::store::{MemoryStore, UpdateStore};
use otaupdater::transfer::{HttpResponse, HttpTransport, TransferError};
use otaupdater::verify::{PackageVerifier, VerifyError};

// ============================================================================
// Transport
// ============================================================================

/// Body of a scripted reply.
pub enum Body {
    Bytes(Vec<u8>),
    /// `chunk` bytes every `delay`, forever.
    Trickle { chunk: usize, delay: Duration },
}

pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Body,
}

impl Reply {
    pub fn ok(body: &[u8]) -> Self {
        Self {
            status: 200,
            headers: vec![("content-length", body.len().to_string())],
            body: Body::Bytes(body.to_vec()),
        }
    }

    pub fn partial(body: &[u8]) -> Self {
        Self {
            status: 206,
            headers: vec![("content-length", body.len().to_string())],
            body: Body::Bytes(body.to_vec()),
        }
    }

    /// A response that never finishes on its own.
    pub fn endless(content_length: u64) -> Self {
        Self {
            status: 200,
            headers: vec![("content-length", content_length.to_string())],
            body: Body::Trickle {
                chunk: 16,
                delay: Duration::from_millis(5),
            },
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Body::Bytes(Vec::new()),
        }
    }
}

struct Trickle {
    chunk: usize,
    delay: Duration,
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        thread::sleep(self.delay);
        let n = self.chunk.min(buf.len());
        buf[..n].fill(b'x');
        Ok(n)
    }
}

/// Answers requests from a queue and records them.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<(String, Option<u64>)>>,
}

impl ScriptedTransport {
    pub fn with(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        })
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    pub fn requests(&self) -> Vec<(String, Option<u64>)> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &str, range_start: Option<u64>) -> Result<HttpResponse, TransferError> {
        self.requests.lock().push((url.to_string(), range_start));
        let reply = self.replies.lock().pop_front().ok_or_else(|| TransferError::Request {
            url: url.to_string(),
            reason: "no scripted reply".to_string(),
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in reply.headers {
            headers.append(name, HeaderValue::from_str(&value).unwrap());
        }
        let body: Box<dyn Read + Send> = match reply.body {
            Body::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            Body::Trickle { chunk, delay } => Box::new(Trickle { chunk, delay }),
        };
        Ok(HttpResponse {
            status: StatusCode::from_u16(reply.status).unwrap(),
            headers,
            body,
        })
    }
}

// ============================================================================
// Verifier
// ============================================================================

/// Accepts or rejects every package and counts calls.
pub struct StaticVerifier {
    accept: bool,
    calls: AtomicUsize,
}

impl StaticVerifier {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            accept: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            accept: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PackageVerifier for StaticVerifier {
    fn verify(&self, path: &Path) -> Result<(), VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.accept {
            Ok(())
        } else {
            Err(VerifyError::Rejected(format!("{} rejected", path.display())))
        }
    }
}

// ============================================================================
// Block engine
// ============================================================================

/// Records calls and keeps the callback so tests can drive status updates.
#[derive(Default)]
pub struct FakeEngine {
    pub callback: Mutex<Option<EngineCallback>>,
    pub applied: Mutex<Vec<(String, u64, Vec<String>)>>,
    pub performance_mode: Mutex<Option<bool>>,
    pub cancelled: AtomicUsize,
}

impl FakeEngine {
    pub fn callback(&self) -> EngineCallback {
        self.callback.lock().clone().expect("engine not bound")
    }
}

impl BlockEngine for FakeEngine {
    fn bind(&self, callback: EngineCallback) -> bool {
        *self.callback.lock() = Some(callback);
        true
    }

    fn apply_payload(&self, uri: &str, offset: u64, properties: &[String]) -> Result<(), EngineError> {
        self.applied
            .lock()
            .push((uri.to_string(), offset, properties.to_vec()));
        Ok(())
    }

    fn suspend(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn resume(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn cancel(&self) -> Result<(), EngineError> {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_performance_mode(&self, enabled: bool) -> Result<(), EngineError> {
        *self.performance_mode.lock() = Some(enabled);
        Ok(())
    }
}

// ============================================================================
// Keep-alive
// ============================================================================

/// Counts keep-alive calls and flags unbalanced ones.
#[derive(Default)]
pub struct CountingKeepAlive {
    held: Mutex<bool>,
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
    pub unbalanced: AtomicUsize,
}

impl CountingKeepAlive {
    pub fn is_held(&self) -> bool {
        *self.held.lock()
    }
}

impl KeepAlive for CountingKeepAlive {
    fn acquire(&self) {
        let mut held = self.held.lock();
        if *held {
            self.unbalanced.fetch_add(1, Ordering::SeqCst);
        }
        *held = true;
        self.acquires.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        let mut held = self.held.lock();
        if !*held {
            self.unbalanced.fetch_add(1, Ordering::SeqCst);
        }
        *held = false;
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Packages
// ============================================================================

/// Build a stored (uncompressed) zip archive.
pub fn package_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn block_package() -> Vec<u8> {
    package_zip(&[
        ("payload_properties.txt", b"FILE_HASH=abc\nFILE_SIZE=4\n"),
        ("payload.bin", b"data"),
    ])
}

pub fn legacy_package() -> Vec<u8> {
    package_zip(&[(
        "META-INF/com/android/metadata",
        b"post-timestamp=1700000000\n",
    )])
}

// ============================================================================
// Harness
// ============================================================================

/// A registry with its daemon running on the test runtime.
pub struct Harness {
    pub dir: TempDir,
    pub registry: Arc<UpdateRegistry>,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<ScriptedTransport>,
    shutdown: CancellationToken,
    daemon: Option<JoinHandle<()>>,
}

impl Harness {
    pub fn start(transport: Arc<ScriptedTransport>, verifier: Arc<dyn PackageVerifier>) -> Self {
        Self::start_with(transport, Arc::new(MemoryStore::new()), TempDir::new().unwrap(), |s| {
            s.with_verifier(verifier)
        })
    }

    pub fn start_with(
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStore>,
        dir: TempDir,
        customize: impl FnOnce(RegistryServices) -> RegistryServices,
    ) -> Self {
        Self::start_configured(transport, store, dir, |c| c, customize)
    }

    pub fn start_configured(
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryStore>,
        dir: TempDir,
        configure: impl FnOnce(RegistryConfig) -> RegistryConfig,
        customize: impl FnOnce(RegistryServices) -> RegistryServices,
    ) -> Self {
        let config = configure(
            RegistryConfig::new(dir.path().join("updates"))
                .with_state_dir(dir.path().join("state"))
                .with_progress_interval(Duration::from_millis(10)),
        );
        let services = customize(RegistryServices::new(
            Arc::clone(&store) as Arc<dyn UpdateStore>,
            Arc::clone(&transport) as Arc<dyn HttpTransport>,
        ));
        let (registry, daemon) = UpdateRegistry::new(config, services).unwrap();
        let shutdown = CancellationToken::new();
        let daemon = tokio::spawn(daemon.run(shutdown.clone()));
        Self {
            dir,
            registry,
            store,
            transport,
            shutdown,
            daemon: Some(daemon),
        }
    }

    pub fn download_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("updates")
    }

    /// Stop the daemon and hand back the directory for a restart.
    pub async fn stop(mut self) -> TempDir {
        self.shutdown.cancel();
        if let Some(daemon) = self.daemon.take() {
            daemon.await.unwrap();
        }
        self.dir
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Drain every event received so far.
pub fn drain(receiver: &mut tokio::sync::broadcast::Receiver<UpdateEvent>) -> Vec<UpdateEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
