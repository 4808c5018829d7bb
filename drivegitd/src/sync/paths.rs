use std::fmt;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("sync path is empty")]
    Empty,
    #[error("sync path contains unsupported component: {0}")]
    UnsupportedComponent(String),
}

/// Location of a remote entry relative to the repository root, joined with
/// `/` regardless of the platform separator. Mapping onto a native path
/// happens only at the filesystem boundary via [`SyncPath::to_local`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncPath(String);

impl SyncPath {
    pub fn root(name: &str) -> Self {
        SyncPath(name.to_string())
    }

    pub fn child(&self, name: &str) -> Self {
        SyncPath(format!("{}/{}", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Maps the sync path under `repo_root`. Remote entry names that would
    /// escape the repository root are rejected.
    pub fn to_local(&self, repo_root: &Path) -> Result<PathBuf, PathError> {
        if self.0.is_empty() {
            return Err(PathError::Empty);
        }
        let mut out = repo_root.to_path_buf();
        for component in Path::new(&self.0).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::RootDir | Component::CurDir => continue,
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(PathError::UnsupportedComponent(self.0.clone()));
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for SyncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
