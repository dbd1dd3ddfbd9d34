use super::{BranchScope, PackageRepo};
use crate::error::{Result, StratusError};
use crate::git::{CommitId, VcsBackend};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Collects a batch of files and commits exactly those
///
/// The pending set is consumed by [Committer::commit]; start a new committer
/// for the next batch.
pub struct Committer<'r, B: VcsBackend> {
    repo: &'r PackageRepo<B>,
    files: BTreeSet<PathBuf>,
}

impl<'r, B: VcsBackend> Committer<'r, B> {
    /// Add `path` to the pending set, returning `false` if it was already there
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) -> bool {
        let path = path.as_ref().to_path_buf();
        let added = self.files.insert(path);
        if !added {
            debug!("file already pending");
        }
        added
    }

    pub fn pending_files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    /// Working tree paths that differ from the index, pending or not
    pub fn diffs(&self) -> Result<Vec<PathBuf>> {
        self.repo.backend.changed_paths()
    }

    /// Stage the pending files, keeping executable bits, and commit them
    pub fn commit(self, message: &str) -> Result<CommitId> {
        if self.files.is_empty() {
            return Err(StratusError::vcs("nothing to commit: no files were added"));
        }
        let files: Vec<PathBuf> = self.files.into_iter().collect();
        let sha = self.repo.backend.commit_paths(&files, message)?;
        info!(sha = %sha, files = files.len(), "committed pending files");
        Ok(sha)
    }
}

impl<B: VcsBackend> PackageRepo<B> {
    /// Start an empty change set on the current branch
    pub fn committer(&self) -> Committer<'_, B> {
        Committer {
            repo: self,
            files: BTreeSet::new(),
        }
    }

    /// Stage files on `branch` and commit them, pushing when `remote` is set
    ///
    /// `stage` fills the committer; the previous branch is restored afterwards.
    pub fn commit_on_branch<F>(
        &self,
        branch: &str,
        message: &str,
        remote: Option<&str>,
        stage: F,
    ) -> Result<CommitId>
    where
        F: FnOnce(&mut Committer<'_, B>) -> Result<()>,
    {
        let scope = match remote {
            Some(remote) => BranchScope::pushing(remote),
            None => BranchScope::local(),
        };
        self.on_branch(branch, scope, |repo| {
            let mut committer = repo.committer();
            stage(&mut committer)?;
            committer.commit(message)
        })
    }
}
