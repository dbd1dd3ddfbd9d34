//! Release orchestration engine
//!
//! [PackageRepo] layers branch, remote, tag and merge workflows on top of a
//! [VcsBackend]. Every query goes back to the backend, so the snapshots it
//! returns are never stale across calls.
//!
//! The operations are split by concern:
//!
//! - [branch]: active branch tracking and the scoped [PackageRepo::on_branch]
//! - [committer]: pending change sets and commits
//! - [remote]: fetch, push, pull and tracking setup
//! - [release]: tags, checkout-to-tag and release notes
//! - [init]: branch bootstrap
//! - [merge]: merging one branch into another

pub mod branch;
pub mod committer;
pub mod init;
pub mod merge;
pub mod release;
pub mod remote;

pub use branch::BranchScope;
pub use committer::Committer;
pub use init::BranchInit;
pub use release::{ReleaseNote, TagCheckout, LOG_FIELD_SEPARATOR};

use crate::config::{GitflowConfig, StratusConfig};
use crate::error::Result;
use crate::git::{CommitId, Git2Backend, VcsBackend};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// A branch as seen locally and on one remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub local: bool,
    pub remote: bool,
    /// Tracking reference as `remote/branch`
    pub upstream: Option<String>,
}

/// Repository handle owning one backend connection
pub struct PackageRepo<B: VcsBackend> {
    backend: B,
    config: GitflowConfig,
}

impl PackageRepo<Git2Backend> {
    /// Discover the repository containing `dir` (or the current directory)
    pub fn open(dir: Option<&Path>, config: &StratusConfig) -> Result<Self> {
        let dir = dir.unwrap_or_else(|| Path::new("."));
        let backend = Git2Backend::discover(dir, config.identity.clone())?;
        Ok(PackageRepo::new(backend, config.gitflow.clone()))
    }
}

impl<B: VcsBackend> PackageRepo<B> {
    pub fn new(backend: B, config: GitflowConfig) -> Self {
        PackageRepo { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &GitflowConfig {
        &self.config
    }

    /// Root directory of the working tree
    pub fn root(&self) -> &Path {
        self.backend.root()
    }

    /// Local branches merged with the remote-tracking branches of `remote`
    pub fn branches(&self, remote: Option<&str>) -> Result<Vec<BranchInfo>> {
        let mut merged: BTreeMap<String, BranchInfo> = BTreeMap::new();
        for name in self.backend.local_branches()? {
            let upstream = self.backend.upstream(&name)?;
            merged.insert(
                name.clone(),
                BranchInfo {
                    name,
                    local: true,
                    remote: false,
                    upstream,
                },
            );
        }
        if let Some(remote) = remote {
            let prefix = format!("{}/", remote);
            for qualified in self.backend.remote_branches(remote)? {
                let name = qualified.trim_start_matches(&prefix).to_string();
                merged
                    .entry(name.clone())
                    .or_insert_with(|| BranchInfo {
                        name,
                        local: false,
                        remote: false,
                        upstream: None,
                    })
                    .remote = true;
            }
        }
        Ok(merged.into_values().collect())
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.backend.local_branches()?.iter().any(|b| b == name))
    }

    /// Commit HEAD points at, `None` on an unborn branch
    pub fn head_commit(&self) -> Result<Option<CommitId>> {
        self.backend.resolve_commit("HEAD")
    }

    /// Whether tracked files have changes that are not committed
    pub fn has_uncommitted_changes(&self) -> Result<bool> {
        let dirty = self.backend.has_uncommitted_changes()?;
        debug!(dirty, "checked working tree");
        Ok(dirty)
    }
}
