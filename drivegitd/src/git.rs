use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    Cred, CredentialType, FetchOptions, IndexAddOption, PushOptions, RemoteCallbacks, Repository,
    Signature, StatusOptions,
};
use thiserror::Error;

pub const COMMIT_MESSAGE: &str = "Automated sync from remote drive";

const DEFAULT_REMOTE: &str = "origin";
const FALLBACK_SIGNATURE_NAME: &str = "drivegitd";
const FALLBACK_SIGNATURE_EMAIL: &str = "drivegitd@localhost";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to clone {url}: {source}")]
    Clone { url: String, source: git2::Error },
    #[error("failed to open repository at {path}: {source}")]
    Open { path: PathBuf, source: git2::Error },
    #[error("pull failed: {0}")]
    Pull(#[source] git2::Error),
    #[error("cannot fast-forward {branch}; manual intervention required")]
    NonFastForward { branch: String },
    #[error("failed to read working tree status: {0}")]
    Status(#[source] git2::Error),
    #[error("failed to stage changes: {0}")]
    Stage(#[source] git2::Error),
    #[error("commit failed: {0}")]
    Commit(#[source] git2::Error),
    #[error("push failed: {0}")]
    Push(#[source] git2::Error),
    #[error("repository has no usable HEAD: {0}")]
    Head(#[source] git2::Error),
}

/// Working tree diff against the last commit, taken once after all work
/// items have been applied.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkingTreeStatus {
    pub untracked: usize,
    pub modified: usize,
}

impl WorkingTreeStatus {
    pub fn is_clean(&self) -> bool {
        self.untracked == 0 && self.modified == 0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum FinalizeOutcome {
    NoOp,
    Pushed { untracked: usize, modified: usize },
}

/// The local clone the sync run mirrors into. SSH remotes authenticate
/// through a configured key file, falling back to the agent.
pub struct MirrorRepo {
    repo: Repository,
    ssh_key: Option<PathBuf>,
}

impl MirrorRepo {
    pub fn clone_from(
        url: &str,
        path: &Path,
        ssh_key: Option<PathBuf>,
    ) -> Result<Self, GitError> {
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(remote_callbacks(ssh_key.clone()));
        let repo = RepoBuilder::new()
            .fetch_options(opts)
            .clone(url, path)
            .map_err(|source| GitError::Clone {
                url: url.to_string(),
                source,
            })?;
        Ok(Self { repo, ssh_key })
    }

    pub fn open(path: &Path, ssh_key: Option<PathBuf>) -> Result<Self, GitError> {
        let repo = Repository::open(path).map_err(|source| GitError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { repo, ssh_key })
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.repo.workdir()
    }

    /// Fetches origin and fast-forwards the current branch. Run before any
    /// local write so remote-side changes never show up as this run's diff.
    pub fn pull(&self) -> Result<(), GitError> {
        let Some(branch) = self.current_branch()? else {
            // Unborn HEAD means a clone of an empty remote; nothing to pull.
            return Ok(());
        };

        let mut remote = self
            .repo
            .find_remote(DEFAULT_REMOTE)
            .map_err(GitError::Pull)?;
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(remote_callbacks(self.ssh_key.clone()));
        remote
            .fetch(&[branch.as_str()], Some(&mut opts), None)
            .map_err(GitError::Pull)?;

        let fetch_head = match self.repo.find_reference("FETCH_HEAD") {
            Ok(reference) => reference,
            Err(_) => return Ok(()),
        };
        let fetch_commit = fetch_head.peel_to_commit().map_err(GitError::Pull)?;
        let annotated = self
            .repo
            .find_annotated_commit(fetch_commit.id())
            .map_err(GitError::Pull)?;
        let (analysis, _) = self
            .repo
            .merge_analysis(&[&annotated])
            .map_err(GitError::Pull)?;

        if analysis.is_up_to_date() {
            return Ok(());
        }
        if analysis.is_fast_forward() {
            let refname = format!("refs/heads/{branch}");
            let mut reference = self.repo.find_reference(&refname).map_err(GitError::Pull)?;
            reference
                .set_target(
                    fetch_commit.id(),
                    &format!("pull: fast-forward to {}", fetch_commit.id()),
                )
                .map_err(GitError::Pull)?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::default().force()))
                .map_err(GitError::Pull)?;
            return Ok(());
        }
        Err(GitError::NonFastForward { branch })
    }

    pub fn status(&self) -> Result<WorkingTreeStatus, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .exclude_submodules(true);
        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(GitError::Status)?;

        let mut status = WorkingTreeStatus::default();
        for entry in statuses.iter() {
            let flags = entry.status();
            if flags.contains(git2::Status::WT_NEW) {
                status.untracked += 1;
            } else if flags.intersects(
                git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED
                    | git2::Status::WT_TYPECHANGE
                    | git2::Status::WT_RENAMED,
            ) {
                status.modified += 1;
            }
        }
        Ok(status)
    }

    /// The change gate: commits and pushes only when the working tree
    /// reports untracked or modified paths, otherwise does nothing.
    pub fn finalize_if_changed(&self, message: &str) -> Result<FinalizeOutcome, GitError> {
        let status = self.status()?;
        if status.is_clean() {
            return Ok(FinalizeOutcome::NoOp);
        }

        eprintln!(
            "[drivegitd] detected {} new and {} changed files",
            status.untracked, status.modified
        );
        self.stage_all()?;
        self.commit(message)?;
        self.push()?;
        Ok(FinalizeOutcome::Pushed {
            untracked: status.untracked,
            modified: status.modified,
        })
    }

    fn stage_all(&self) -> Result<(), GitError> {
        let mut index = self.repo.index().map_err(GitError::Stage)?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .map_err(GitError::Stage)?;
        index
            .update_all(["*"].iter(), None)
            .map_err(GitError::Stage)?;
        index.write().map_err(GitError::Stage)?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<(), GitError> {
        let mut index = self.repo.index().map_err(GitError::Commit)?;
        let tree_id = index.write_tree().map_err(GitError::Commit)?;
        let tree = self.repo.find_tree(tree_id).map_err(GitError::Commit)?;
        let signature = self
            .repo
            .signature()
            .or_else(|_| Signature::now(FALLBACK_SIGNATURE_NAME, FALLBACK_SIGNATURE_EMAIL))
            .map_err(GitError::Commit)?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit().map_err(GitError::Commit)?),
            Err(err)
                if matches!(
                    err.code(),
                    git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound
                ) =>
            {
                None
            }
            Err(err) => return Err(GitError::Head(err)),
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &parents,
            )
            .map_err(GitError::Commit)?;
        Ok(())
    }

    fn push(&self) -> Result<(), GitError> {
        let branch = self
            .current_branch()?
            .ok_or_else(|| GitError::Push(git2::Error::from_str("HEAD does not point to a branch")))?;
        let mut remote = self
            .repo
            .find_remote(DEFAULT_REMOTE)
            .map_err(GitError::Push)?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let mut opts = PushOptions::new();
        opts.remote_callbacks(remote_callbacks(self.ssh_key.clone()));
        remote
            .push(&[&refspec], Some(&mut opts))
            .map_err(GitError::Push)?;
        Ok(())
    }

    fn current_branch(&self) -> Result<Option<String>, GitError> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(err)
                if matches!(
                    err.code(),
                    git2::ErrorCode::UnbornBranch | git2::ErrorCode::NotFound
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(GitError::Head(err)),
        }
    }
}

fn remote_callbacks(ssh_key: Option<PathBuf>) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        let user = username_from_url.unwrap_or("git");
        if allowed.contains(CredentialType::SSH_KEY) {
            if let Some(key) = ssh_key.as_deref() {
                return Cred::ssh_key(user, None, key, None);
            }
            if let Ok(cred) = Cred::ssh_key_from_agent(user) {
                return Ok(cred);
            }
        }
        Cred::default()
    });
    callbacks
}
