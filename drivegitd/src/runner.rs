use std::path::PathBuf;

use anyhow::Context;
use graph_core::{AuthClient, GraphClient};
use time::OffsetDateTime;

use crate::git::{COMMIT_MESSAGE, FinalizeOutcome, MirrorRepo};
use crate::sync::freshness::FRESHNESS_WINDOW;
use crate::sync::materialize::{FetchErrorPolicy, Materializer};
use crate::sync::walker::Walker;
use crate::sync::work::SyncPlan;

const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Everything a run needs, resolved from the environment before any
/// network call is made.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub drive_id: String,
    pub root_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub repo_url: String,
    pub repo_path: PathBuf,
    pub ssh_key: Option<PathBuf>,
    pub fetch_concurrency: usize,
    pub fetch_errors: FetchErrorPolicy,
}

impl RunnerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let require = |name: &str| {
            lookup(name).with_context(|| format!("{name} is not set"))
        };

        let fetch_concurrency = match lookup("DRIVEGIT_FETCH_CONCURRENCY") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .with_context(|| format!("invalid DRIVEGIT_FETCH_CONCURRENCY: {raw}"))?,
            None => DEFAULT_FETCH_CONCURRENCY,
        };
        let fetch_errors = match lookup("DRIVEGIT_FETCH_ERRORS").as_deref() {
            None | Some("fatal") => FetchErrorPolicy::Fatal,
            Some("skip") => FetchErrorPolicy::Skip,
            Some(other) => anyhow::bail!("invalid DRIVEGIT_FETCH_ERRORS: {other}"),
        };

        Ok(Self {
            drive_id: require("DRIVEGIT_DRIVE_ID")?,
            root_id: require("DRIVEGIT_ROOT_ID")?,
            tenant_id: require("DRIVEGIT_TENANT_ID")?,
            client_id: require("DRIVEGIT_CLIENT_ID")?,
            client_secret: require("DRIVEGIT_CLIENT_SECRET")?,
            repo_url: require("DRIVEGIT_REPO_URL")?,
            repo_path: PathBuf::from(require("DRIVEGIT_REPO_PATH")?),
            ssh_key: lookup("DRIVEGIT_SSH_KEY").map(PathBuf::from),
            fetch_concurrency,
            fetch_errors,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    NoOp,
    Pushed { untracked: usize, modified: usize },
}

/// One synchronization pass: walk, materialize, change-gated commit/push.
pub struct SyncRunner {
    config: RunnerConfig,
    client: GraphClient,
}

impl SyncRunner {
    pub async fn bootstrap(config: RunnerConfig) -> anyhow::Result<Self> {
        let auth = AuthClient::new(
            &config.tenant_id,
            &config.client_id,
            &config.client_secret,
        )?;
        let token = auth
            .acquire_token()
            .await
            .context("failed to acquire graph access token")?;
        let client = GraphClient::new(token.access_token)?;
        Ok(Self { config, client })
    }

    /// Walks the remote tree with a freshness threshold fixed at call time.
    pub async fn plan(&self) -> anyhow::Result<SyncPlan> {
        let now = OffsetDateTime::now_utc();
        let walker = Walker::new(&self.client, &self.config.drive_id, now);
        walker
            .walk_root(&self.config.root_id)
            .await
            .context("remote traversal failed")
    }

    pub async fn run(&self) -> anyhow::Result<RunOutcome> {
        eprintln!("[drivegitd] starting synchronization run");
        let plan = self.plan().await?;
        if plan.is_empty() {
            eprintln!(
                "[drivegitd] no changes detected in the last {} minutes",
                FRESHNESS_WINDOW.whole_minutes()
            );
            return Ok(RunOutcome::NoOp);
        }
        eprintln!(
            "[drivegitd] plan: {} files to fetch, {} empty-folder markers",
            plan.fetch_count(),
            plan.marker_count()
        );

        let repo = self.acquire_repo()?;
        let materializer = Materializer::new(
            self.client.clone(),
            self.config.drive_id.clone(),
            self.config.repo_path.clone(),
        )
        .with_fetch_concurrency(self.config.fetch_concurrency)
        .with_fetch_errors(self.config.fetch_errors);
        let report = materializer.apply(&plan).await?;
        eprintln!(
            "[drivegitd] applied: {} fetched, {} markers, {} skipped",
            report.fetched, report.markers, report.skipped
        );

        // The plan is fully applied; the status snapshot below is the one
        // the gate decides on.
        match repo.finalize_if_changed(COMMIT_MESSAGE)? {
            FinalizeOutcome::NoOp => {
                eprintln!("[drivegitd] working tree clean, nothing to push");
                Ok(RunOutcome::NoOp)
            }
            FinalizeOutcome::Pushed {
                untracked,
                modified,
            } => {
                eprintln!("[drivegitd] pushed to {}", self.config.repo_url);
                Ok(RunOutcome::Pushed {
                    untracked,
                    modified,
                })
            }
        }
    }

    fn acquire_repo(&self) -> anyhow::Result<MirrorRepo> {
        let path = &self.config.repo_path;
        if path.exists() {
            eprintln!("[drivegitd] opening existing clone at {}", path.display());
            let repo = MirrorRepo::open(path, self.config.ssh_key.clone())?;
            eprintln!("[drivegitd] pulling latest changes");
            repo.pull()?;
            Ok(repo)
        } else {
            eprintln!(
                "[drivegitd] cloning {} into {}",
                self.config.repo_url,
                path.display()
            );
            Ok(MirrorRepo::clone_from(
                &self.config.repo_url,
                path,
                self.config.ssh_key.clone(),
            )?)
        }
    }
}
