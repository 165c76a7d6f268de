use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tokio::fs;
use tracing::instrument;

use super::file_name::StagedName;
use crate::error::{UploadError, UploadResult};

/// Suffix of a fragment that is fully written and safe to fold.
pub const COMMITTED_EXT: &str = "part";
/// Suffix of a fragment still being written.
pub const WRITING_EXT: &str = "parttmp";
/// Suffix of the per-upload reassembly claim marker.
pub const CLAIM_EXT: &str = "assembling";

/// The staging directory holding in-flight fragments.
///
/// Layout: `<dir>/<name>_<index>.part` once committed, `.parttmp` while being
/// written, plus one `<name>.assembling` marker while a set is being folded.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn committed_path(&self, name: &StagedName, index: u32) -> PathBuf {
        self.dir.join(committed_file_name(name, index))
    }

    pub fn writing_path(&self, name: &StagedName, index: u32) -> PathBuf {
        self.dir
            .join(name.with_suffix(&format!("_{index}.{WRITING_EXT}")))
    }

    pub fn claim_path(&self, name: &StagedName) -> PathBuf {
        self.dir.join(name.with_suffix(&format!(".{CLAIM_EXT}")))
    }

    /// Lazily create the staging directory.
    pub async fn ensure(&self) -> UploadResult<()> {
        create_dir(&self.dir).await
    }

    /// True once every committed fragment `0..total` exists.
    pub async fn is_complete(&self, name: &StagedName, total: u32) -> UploadResult<bool> {
        for index in 0..total {
            if !fs::try_exists(self.committed_path(name, index)).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete staged files older than `max_age`, leaving the paths in `keep` alone.
    ///
    /// Individual delete failures are logged and skipped; only failing to read
    /// the directory itself is an error. Returns the number of files removed.
    #[instrument(skip(self, keep), fields(dir = %self.dir.display()))]
    pub async fn sweep_stale(&self, max_age: Duration, keep: &[&Path]) -> UploadResult<usize> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|source| UploadError::StreamOpen {
                path: self.dir.clone(),
                source,
            })?;

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if keep.iter().any(|kept| *kept == path) || !is_staged_file(&path) {
                continue;
            }

            let modified = match entry.metadata().await.and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                // already gone, or unreadable; either way nothing to sweep
                Err(_) => continue,
            };

            let expired = now
                .duration_since(modified)
                .map(|age| age > max_age)
                .unwrap_or(false);
            if !expired {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Removed stale staging file");
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale staging file");
                }
            }
        }

        Ok(removed)
    }
}

/// On-disk file name of committed fragment `index`.
pub fn committed_file_name(name: &StagedName, index: u32) -> OsString {
    name.with_suffix(&format!("_{index}.{COMMITTED_EXT}"))
}

fn is_staged_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(OsStr::to_str),
        Some(COMMITTED_EXT) | Some(WRITING_EXT) | Some(CLAIM_EXT)
    )
}

pub(crate) async fn create_dir(path: &Path) -> UploadResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| UploadError::DirectoryCreation {
            path: path.to_path_buf(),
            source,
        })
}
