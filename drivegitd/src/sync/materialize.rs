use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future;
use graph_core::{GraphClient, GraphError};
use thiserror::Error;
use tokio::sync::Semaphore;

use super::backoff::Backoff;
use super::paths::{PathError, SyncPath};
use super::work::{SyncPlan, WorkItem};

/// Placeholder written inside remote-empty folders so git can track them.
pub const EMPTY_MARKER_FILE: &str = ".gitkeep";

const FETCH_ATTEMPTS: u32 = 3;
const DEFAULT_FETCH_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("failed to fetch item {item_id} for {path}: {source}")]
    Fetch {
        item_id: String,
        path: String,
        source: GraphError,
    },
    #[error("filesystem error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid sync path: {0}")]
    Path(#[from] PathError),
    #[error("fetch concurrency limiter is closed")]
    ConcurrencyClosed,
}

/// What to do when a single content fetch ultimately fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorPolicy {
    Fatal,
    Skip,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub fetched: usize,
    pub markers: usize,
    pub skipped: usize,
}

/// Executes a [`SyncPlan`] against the filesystem under the repository
/// root. Content fetches fan out under a semaphore; writes go through a
/// `.partial` sibling and are renamed into place.
pub struct Materializer {
    client: GraphClient,
    drive_id: String,
    repo_root: PathBuf,
    fetch_limit: Arc<Semaphore>,
    backoff: Backoff,
    fetch_errors: FetchErrorPolicy,
}

impl Materializer {
    pub fn new(client: GraphClient, drive_id: impl Into<String>, repo_root: PathBuf) -> Self {
        Self {
            client,
            drive_id: drive_id.into(),
            repo_root,
            fetch_limit: Arc::new(Semaphore::new(DEFAULT_FETCH_CONCURRENCY)),
            backoff: Backoff::default(),
            fetch_errors: FetchErrorPolicy::Fatal,
        }
    }

    pub fn with_fetch_concurrency(mut self, limit: usize) -> Self {
        self.fetch_limit = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    pub fn with_fetch_errors(mut self, policy: FetchErrorPolicy) -> Self {
        self.fetch_errors = policy;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Applies every item in the plan. Returns only after all fetches and
    /// markers have been written (or a fatal error surfaced), so the caller
    /// may read repository state immediately afterwards.
    pub async fn apply(&self, plan: &SyncPlan) -> Result<ApplyReport, MaterializeError> {
        let mut report = ApplyReport::default();

        let fetches: Vec<_> = plan
            .items()
            .iter()
            .filter_map(|item| match item {
                WorkItem::FetchFile { path, item_id } => Some(self.fetch_file(path, item_id)),
                WorkItem::CreateEmptyMarker { .. } => None,
            })
            .collect();
        for result in future::join_all(fetches).await {
            match result {
                Ok(()) => report.fetched += 1,
                Err(err @ MaterializeError::Fetch { .. })
                    if self.fetch_errors == FetchErrorPolicy::Skip =>
                {
                    eprintln!("[drivegitd] fetch failed, skipping: {err}");
                    report.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        for item in plan.items() {
            if let WorkItem::CreateEmptyMarker { path } = item {
                self.create_empty_marker(path).await?;
                report.markers += 1;
            }
        }

        Ok(report)
    }

    async fn fetch_file(&self, path: &SyncPath, item_id: &str) -> Result<(), MaterializeError> {
        let _permit = self
            .fetch_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MaterializeError::ConcurrencyClosed)?;

        let bytes = self.fetch_with_retry(path, item_id).await?;
        let target = path.to_local(&self.repo_root)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MaterializeError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let partial = partial_path(&target);
        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(|source| MaterializeError::Io {
                path: partial.clone(),
                source,
            })?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|source| MaterializeError::Io {
                path: target.clone(),
                source,
            })?;
        eprintln!("[drivegitd] wrote {path} ({} bytes)", bytes.len());
        Ok(())
    }

    async fn fetch_with_retry(
        &self,
        path: &SyncPath,
        item_id: &str,
    ) -> Result<Vec<u8>, MaterializeError> {
        let mut attempt = 0;
        loop {
            match self.client.fetch_content(&self.drive_id, item_id).await {
                Ok(bytes) => return Ok(bytes),
                Err(source) if source.is_retryable() && attempt + 1 < FETCH_ATTEMPTS => {
                    let delay = self.backoff.delay(attempt);
                    eprintln!(
                        "[drivegitd] retrying fetch of {item_id} in {}ms: {source}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(MaterializeError::Fetch {
                        item_id: item_id.to_string(),
                        path: path.to_string(),
                        source,
                    });
                }
            }
        }
    }

    async fn create_empty_marker(&self, path: &SyncPath) -> Result<(), MaterializeError> {
        let dir = path.to_local(&self.repo_root)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| MaterializeError::Io {
                path: dir.clone(),
                source,
            })?;
        let marker = dir.join(EMPTY_MARKER_FILE);
        tokio::fs::write(&marker, b"")
            .await
            .map_err(|source| MaterializeError::Io {
                path: marker,
                source,
            })?;
        eprintln!("[drivegitd] marked empty folder: {path}");
        Ok(())
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn content_path(item_id: &str) -> String {
        format!("/v1.0/drives/drive-1/items/{item_id}/content")
    }

    fn materializer(server: &MockServer, root: &Path) -> Materializer {
        let client = GraphClient::with_base_url(&server.uri(), "test-token").unwrap();
        Materializer::new(client, "drive-1", root.to_path_buf())
            .with_backoff(Backoff::new(Duration::ZERO, Duration::ZERO, false))
    }

    fn fetch_plan() -> SyncPlan {
        let mut plan = SyncPlan::default();
        plan.push(WorkItem::FetchFile {
            path: SyncPath::root("Projects").child("notes.txt"),
            item_id: "i-notes".into(),
        });
        plan
    }

    #[tokio::test]
    async fn writes_fetched_bytes_at_the_mapped_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path(content_path("i-notes")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"note body"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let report = materializer(&server, dir.path())
            .apply(&fetch_plan())
            .await
            .unwrap();

        assert_eq!(report.fetched, 1);
        let written = dir.path().join("Projects/notes.txt");
        assert_eq!(std::fs::read(written).unwrap(), b"note body");
    }

    #[tokio::test]
    async fn overwrites_existing_files() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path(content_path("i-notes")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Projects")).unwrap();
        std::fs::write(dir.path().join("Projects/notes.txt"), b"old").unwrap();

        materializer(&server, dir.path())
            .apply(&fetch_plan())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("Projects/notes.txt")).unwrap(),
            b"new"
        );
    }

    #[tokio::test]
    async fn creates_marker_file_in_empty_folder() {
        let server = MockServer::start().await;
        let dir = tempdir().unwrap();

        let mut plan = SyncPlan::default();
        plan.push(WorkItem::CreateEmptyMarker {
            path: SyncPath::root("Projects").child("Empty"),
        });
        let report = materializer(&server, dir.path()).apply(&plan).await.unwrap();

        assert_eq!(report.markers, 1);
        let marker = dir.path().join("Projects/Empty").join(EMPTY_MARKER_FILE);
        assert_eq!(std::fs::read(marker).unwrap(), b"");
    }

    #[tokio::test]
    async fn retries_transient_fetch_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path(content_path("i-notes")))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path(content_path("i-notes")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"eventually"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let report = materializer(&server, dir.path())
            .apply(&fetch_plan())
            .await
            .unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(
            std::fs::read(dir.path().join("Projects/notes.txt")).unwrap(),
            b"eventually"
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path(content_path("i-notes")))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let err = materializer(&server, dir.path())
            .apply(&fetch_plan())
            .await
            .expect_err("expected fetch error");

        match err {
            MaterializeError::Fetch { item_id, path, .. } => {
                assert_eq!(item_id, "i-notes");
                assert_eq!(path, "Projects/notes.txt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn skip_policy_counts_failures_without_aborting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path(content_path("i-notes")))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(url_path(content_path("i-ok")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fine"))
            .mount(&server)
            .await;

        let mut plan = fetch_plan();
        plan.push(WorkItem::FetchFile {
            path: SyncPath::root("Projects").child("ok.txt"),
            item_id: "i-ok".into(),
        });

        let dir = tempdir().unwrap();
        let report = materializer(&server, dir.path())
            .with_fetch_errors(FetchErrorPolicy::Skip)
            .apply(&plan)
            .await
            .unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(report.skipped, 1);
        assert!(dir.path().join("Projects/ok.txt").exists());
        assert!(!dir.path().join("Projects/notes.txt").exists());
    }
}
