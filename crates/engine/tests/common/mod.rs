//! Engine test harness.

use flate2::Compression;
use flate2::write::GzEncoder;
use httpmock::MockServer;
use std::path::PathBuf;
use std::time::Duration;
use stowage_core::{EngineConfig, OperationStatus, StatusEvent};
use stowage_engine::Executor;
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const TYPE: &str = "application/vnd.rdk-app.dac.native";

/// A configured executor on temporary roots plus a mock bundle server.
/// Note: #[allow(dead_code)] because each test file compiles common/
/// separately.
#[allow(dead_code)]
pub struct TestEngine {
    pub executor: Executor,
    pub server: MockServer,
    root: TempDir,
}

/// Everything observed for one task up to its terminal event.
#[allow(dead_code)]
pub struct Outcome {
    pub handle: String,
    pub status: OperationStatus,
    pub details: String,
    pub progress_events: usize,
}

#[allow(dead_code)]
impl TestEngine {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config<F>(modify: F) -> Self
    where
        F: FnOnce(&mut EngineConfig),
    {
        let root = tempfile::tempdir().expect("failed to create temp directory");
        let path = |name: &str| {
            let mut s = root.path().join(name).display().to_string();
            s.push('/');
            s
        };

        let mut config = EngineConfig {
            apps_path: path("apps"),
            db_path: path("db"),
            data_path: path("data"),
            download_retry_after_seconds: 1,
            download_retry_max_times: 1,
            download_timeout_seconds: 30,
            ..Default::default()
        };
        modify(&mut config);

        let executor = Executor::new();
        executor
            .configure(config)
            .await
            .expect("failed to configure executor");

        Self {
            executor,
            server: MockServer::start(),
            root,
        }
    }

    pub fn apps_root(&self) -> PathBuf {
        self.root.path().join("apps")
    }

    pub fn data_root(&self) -> PathBuf {
        self.root.path().join("data")
    }

    pub fn app_dir(&self, id: &str, version: &str) -> PathBuf {
        self.apps_root().join("0").join(id).join(version)
    }

    pub fn data_dir(&self, id: &str) -> PathBuf {
        self.data_root().join("0").join(id)
    }

    /// Re-run configure with the same roots, triggering a maintenance pass.
    pub async fn reconfigure(&self) {
        let path = |name: &str| {
            let mut s = self.root.path().join(name).display().to_string();
            s.push('/');
            s
        };
        self.executor
            .configure(EngineConfig {
                apps_path: path("apps"),
                db_path: path("db"),
                data_path: path("data"),
                download_retry_after_seconds: 1,
                download_retry_max_times: 1,
                download_timeout_seconds: 30,
                ..Default::default()
            })
            .await
            .expect("failed to reconfigure executor");
    }

    /// Build a gzipped tar bundle from (path, contents) pairs.
    pub fn bundle(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    /// Serve `body` at `path` for both the length probe and the download.
    pub fn serve_bundle(&self, path: &str, body: Vec<u8>) {
        let len = body.len();
        self.server.mock(|when, then| {
            when.method("HEAD").path(path.to_string());
            then.status(200).header("Content-Length", len.to_string());
        });
        self.server.mock(|when, then| {
            when.method("GET").path(path.to_string());
            then.status(200).body(body);
        });
    }

    /// Start an install of a default bundle and wait for its terminal event.
    pub async fn install_and_wait(&self, id: &str, version: &str) -> Outcome {
        let path = format!("/{id}-{version}.tar.gz");
        self.serve_bundle(&path, Self::bundle(&[("rootfs/bin/app", "payload")]));
        self.install_url_and_wait(id, version, &path).await
    }

    /// Start an install from `url_path` and wait for its terminal event.
    pub async fn install_url_and_wait(&self, id: &str, version: &str, url_path: &str) -> Outcome {
        let mut rx = self.executor.subscribe();
        let handle = self
            .executor
            .install(TYPE, id, version, &self.server.url(url_path), "appname", "cat")
            .await
            .expect("install was not admitted");
        wait_for_terminal(&mut rx, &handle).await
    }

    /// Start an uninstall and wait for its terminal event.
    pub async fn uninstall_and_wait(&self, id: &str, version: &str, uninstall_type: &str) -> Outcome {
        let mut rx = self.executor.subscribe();
        let handle = self
            .executor
            .uninstall(TYPE, id, version, uninstall_type)
            .await
            .expect("uninstall was not admitted");
        wait_for_terminal(&mut rx, &handle).await
    }

    /// Installed app count as visible through the listing API.
    pub async fn installed_count(&self) -> usize {
        self.executor
            .app_details_list(&Default::default())
            .await
            .unwrap()
            .iter()
            .filter(|d| d.version.is_some())
            .count()
    }
}

/// Collect events for `handle` until its terminal status arrives.
#[allow(dead_code)]
pub async fn wait_for_terminal(rx: &mut broadcast::Receiver<StatusEvent>, handle: &str) -> Outcome {
    let mut progress_events = 0;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for a status event")
            .expect("event stream closed");
        if event.handle != handle {
            continue;
        }
        if event.status == OperationStatus::Progress {
            assert!(event.details.is_empty(), "progress events carry no details");
            progress_events += 1;
        } else {
            return Outcome {
                handle: handle.to_string(),
                status: event.status,
                details: event.details,
                progress_events,
            };
        }
    }
}
