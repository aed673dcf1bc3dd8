//! Downloader behavior against a mock HTTP server.

use async_trait::async_trait;
use httpmock::MockServer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use stowage_fetch::{DownloadConfig, DownloadError, DownloadObserver, Downloader};
use tempfile::tempdir;
use tokio::sync::Mutex;

/// Observer recording progress ticks, optionally cancelling after N of them.
struct TestObserver {
    ticks: Mutex<Vec<(u64, u64)>>,
    cancelled: AtomicBool,
    cancel_after_ticks: Option<u32>,
    seen: AtomicU32,
}

impl TestObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            ticks: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
            cancel_after_ticks: None,
            seen: AtomicU32::new(0),
        })
    }

    fn cancelling_after(ticks: u32) -> Arc<Self> {
        Arc::new(Self {
            ticks: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
            cancel_after_ticks: Some(ticks),
            seen: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl DownloadObserver for TestObserver {
    async fn progress(&self, total: u64, now: u64) {
        self.ticks.lock().await.push((total, now));
        let seen = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = self.cancel_after_ticks
            && seen >= limit
        {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    async fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn quick_config() -> DownloadConfig {
    DownloadConfig {
        retry_after: Duration::from_secs(1),
        retry_max_times: 4,
        timeout: Duration::from_secs(30),
    }
}

#[tokio::test]
async fn downloads_body_to_destination() {
    let server = MockServer::start();
    let body = vec![7u8; 64 * 1024];
    let mock = server.mock(|when, then| {
        when.method("GET").path("/bundle.tar.gz");
        then.status(200).body(body.clone());
    });

    let dir = tempdir().unwrap();
    let dest = dir.path().join("bundle.tar.gz");
    let observer = TestObserver::new();
    let mut downloader = Downloader::new(
        server.url("/bundle.tar.gz"),
        observer.clone(),
        quick_config(),
    )
    .unwrap();

    downloader.fetch(&dest).await.unwrap();

    mock.assert();
    assert_eq!(std::fs::read(&dest).unwrap(), body);

    let ticks = observer.ticks.lock().await;
    assert!(!ticks.is_empty());
    let (total, now) = *ticks.last().unwrap();
    assert_eq!(total, 64 * 1024);
    assert_eq!(now, 64 * 1024);
    // Byte counts never decrease.
    assert!(ticks.windows(2).all(|w| w[0].1 <= w[1].1));
}

#[tokio::test]
async fn content_length_comes_from_head() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("HEAD").path("/bundle.tar.gz");
        then.status(200).header("Content-Length", "12345");
    });

    let mut downloader = Downloader::new(
        server.url("/bundle.tar.gz"),
        TestObserver::new(),
        quick_config(),
    )
    .unwrap();

    assert_eq!(downloader.content_length().await.unwrap(), 12345);
}

#[tokio::test]
async fn missing_content_length_reports_zero() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("HEAD").path("/bundle.tar.gz");
        then.status(200);
    });

    let mut downloader = Downloader::new(
        server.url("/bundle.tar.gz"),
        TestObserver::new(),
        quick_config(),
    )
    .unwrap();

    assert_eq!(downloader.content_length().await.unwrap(), 0);
}

#[tokio::test]
async fn http_error_fails_immediately() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/bundle.tar.gz");
        then.status(404);
    });

    let dir = tempdir().unwrap();
    let mut downloader = Downloader::new(
        server.url("/bundle.tar.gz"),
        TestObserver::new(),
        quick_config(),
    )
    .unwrap();

    let err = downloader.fetch(dir.path().join("out")).await.unwrap_err();
    assert!(matches!(err, DownloadError::Http(404)));
}

#[tokio::test]
async fn accepted_retries_until_exhausted() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/bundle.tar.gz");
        then.status(202);
    });

    let dir = tempdir().unwrap();
    let mut downloader = Downloader::new(
        server.url("/bundle.tar.gz"),
        TestObserver::new(),
        DownloadConfig {
            retry_after: Duration::from_secs(1),
            retry_max_times: 1,
            timeout: Duration::from_secs(30),
        },
    )
    .unwrap();

    let started = Instant::now();
    let err = downloader.fetch(dir.path().join("out")).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, DownloadError::RetriesExhausted));
    // One retry means one full wait interval before the terminal failure.
    assert!(elapsed >= Duration::from_secs(1), "failed too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "failed too late: {elapsed:?}");
    assert_eq!(mock.hits(), 2);
}

#[tokio::test]
async fn retry_after_header_overrides_configured_interval() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/bundle.tar.gz");
        then.status(202).header("Retry-After", "0");
    });

    let dir = tempdir().unwrap();
    let mut downloader = Downloader::new(
        server.url("/bundle.tar.gz"),
        TestObserver::new(),
        DownloadConfig {
            retry_after: Duration::from_secs(60),
            retry_max_times: 2,
            timeout: Duration::from_secs(30),
        },
    )
    .unwrap();

    // With the configured 60s interval this would take minutes; the header
    // drops the wait to zero so both retries burn through immediately.
    let started = Instant::now();
    let err = downloader.fetch(dir.path().join("out")).await.unwrap_err();
    assert!(matches!(err, DownloadError::RetriesExhausted));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancellation_mid_transfer_surfaces_as_cancelled() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/bundle.tar.gz");
        then.status(200).body(vec![1u8; 1024 * 1024]);
    });

    let dir = tempdir().unwrap();
    let observer = TestObserver::cancelling_after(1);
    let mut downloader = Downloader::new(
        server.url("/bundle.tar.gz"),
        observer,
        quick_config(),
    )
    .unwrap();

    let err = downloader.fetch(dir.path().join("out")).await.unwrap_err();
    assert!(matches!(err, DownloadError::Cancelled));
}

#[tokio::test]
async fn pre_cancelled_observer_aborts_before_the_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/bundle.tar.gz");
        then.status(200).body("data");
    });

    let dir = tempdir().unwrap();
    let observer = TestObserver::new();
    observer.cancelled.store(true, Ordering::SeqCst);
    let mut downloader = Downloader::new(
        server.url("/bundle.tar.gz"),
        observer,
        quick_config(),
    )
    .unwrap();

    let err = downloader.fetch(dir.path().join("out")).await.unwrap_err();
    assert!(matches!(err, DownloadError::Cancelled));
    assert_eq!(mock.hits(), 0);
}
