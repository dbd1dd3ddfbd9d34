//! Version-control backend abstraction
//!
//! This module defines the primitive repository operations the release engine
//! is built on, as the [VcsBackend] trait, together with the plain value types
//! that cross it. No `git2` type appears in this interface.
//!
//! # Overview
//!
//! - [repository::Git2Backend]: the real implementation on top of the `git2` crate
//! - [mock::MockBackend]: an in-memory implementation for testing
//!
//! The orchestration layer ([crate::repo::PackageRepo]) is generic over the
//! backend, so every workflow can be exercised against the mock.

pub mod mock;
pub mod repository;

pub use mock::MockBackend;
pub use repository::Git2Backend;

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Full hex id of a commit
pub type CommitId = String;

/// What HEAD currently points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// HEAD is attached to a branch that has at least one commit
    Branch(String),
    /// HEAD is attached to a branch name with no commits yet
    Unborn(String),
    /// HEAD points directly at a commit
    Detached(CommitId),
}

impl HeadState {
    /// Branch name HEAD is attached to, if any
    pub fn branch_name(&self) -> Option<&str> {
        match self {
            HeadState::Branch(name) | HeadState::Unborn(name) => Some(name),
            HeadState::Detached(_) => None,
        }
    }
}

/// A configured remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub name: String,
    /// Ordered URLs, the first one is canonical
    pub urls: Vec<String>,
}

/// A tag and the commit it resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub commit: CommitId,
}

/// Outcome of one reference update during a push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefStatus {
    Updated,
    Rejected(String),
}

/// Per-reference push result reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub refname: String,
    pub status: RefStatus,
}

impl RefUpdate {
    pub fn updated(refname: impl Into<String>) -> Self {
        RefUpdate {
            refname: refname.into(),
            status: RefStatus::Updated,
        }
    }

    pub fn rejected(refname: impl Into<String>, reason: impl Into<String>) -> Self {
        RefUpdate {
            refname: refname.into(),
            status: RefStatus::Rejected(reason.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, RefStatus::Rejected(_))
    }

    /// Human readable one-line summary
    pub fn summary(&self) -> String {
        match &self.status {
            RefStatus::Updated => format!("{}: updated", self.refname),
            RefStatus::Rejected(reason) => format!("{}: rejected ({})", self.refname, reason),
        }
    }
}

/// How a merge should be carried out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    /// `None`, `recursive`, `ort` and `resolve` all use the default three-way
    /// merge; `ours` keeps the target tree unchanged.
    pub strategy: Option<String>,
    /// `ours`, `theirs`, `patience`, `ignore-space-change`, `ignore-all-space`
    /// or `ignore-space-at-eol`
    pub strategy_option: Option<String>,
    /// Allow fast-forwarding instead of creating a merge commit
    pub fastforward: bool,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy {
            strategy: None,
            strategy_option: None,
            fastforward: true,
        }
    }
}

/// Primitive operations of a version-controlled working tree
///
/// Every call is a blocking round trip to the underlying repository; nothing
/// is cached between calls. Branch names are short names (`develop`,
/// `feature/x`); remote-tracking branches are qualified (`origin/develop`).
///
/// ## Error Handling
///
/// All methods return [crate::error::Result]. Implementations map their
/// native failures to [crate::error::StratusError] variants, usually
/// `VcsOperation`.
pub trait VcsBackend {
    /// Root directory of the working tree
    fn root(&self) -> &Path;

    /// Configured remotes, in configuration order
    fn remotes(&self) -> Result<Vec<RemoteInfo>>;

    /// Names of local branches
    fn local_branches(&self) -> Result<Vec<String>>;

    /// Remote-tracking branches of `remote`, qualified as `remote/branch`
    fn remote_branches(&self, remote: &str) -> Result<Vec<String>>;

    /// All tags with the commit each resolves to
    fn tags(&self) -> Result<Vec<TagInfo>>;

    /// Current state of HEAD
    fn head(&self) -> Result<HeadState>;

    /// Resolve a revision expression to a commit, `None` if it does not exist
    fn resolve_commit(&self, rev: &str) -> Result<Option<CommitId>>;

    /// Check out an existing local branch
    fn checkout_branch(&self, name: &str) -> Result<()>;

    /// Create a branch at the current HEAD and check it out
    ///
    /// On an unborn HEAD this only re-points HEAD at the new name.
    fn checkout_new_branch(&self, name: &str) -> Result<()>;

    /// Re-point HEAD at a branch name that has no commits yet
    fn checkout_unborn(&self, name: &str) -> Result<()>;

    /// Check out a commit directly, leaving HEAD detached
    fn checkout_detached(&self, rev: &str) -> Result<()>;

    /// Create a local branch at `start` without checking it out
    fn create_branch(&self, name: &str, start: &str) -> Result<()>;

    /// Create a lightweight tag at HEAD
    fn create_tag(&self, name: &str, force: bool) -> Result<CommitId>;

    /// Point tag `name` at `commit`, or delete it when `commit` is `None`
    fn reset_tag(&self, name: &str, commit: Option<&str>) -> Result<()>;

    /// Stage exactly `paths` and commit them, keeping executable bits
    ///
    /// The commit holds HEAD's tree plus `paths`. Anything else already in
    /// the index is left staged and out of the commit.
    fn commit_paths(&self, paths: &[PathBuf], message: &str) -> Result<CommitId>;

    /// Commit with an unchanged tree
    fn commit_empty(&self, message: &str) -> Result<CommitId>;

    /// Fetch a remote, optionally downloading every tag
    fn fetch(&self, remote: &str, tags: bool) -> Result<()>;

    /// Push refspecs to a remote and report each reference update
    fn push(&self, remote: &str, refspecs: &[String]) -> Result<Vec<RefUpdate>>;

    /// Fetch `remote` and integrate `remote/branch` into HEAD
    fn pull(&self, remote: &str, branch: &str) -> Result<()>;

    /// Merge `source` into HEAD, returning the resulting tip
    fn merge(&self, source: &str, policy: &MergePolicy) -> Result<CommitId>;

    /// Upstream of a local branch, as `remote/branch`
    fn upstream(&self, branch: &str) -> Result<Option<String>>;

    /// Set the upstream of a local branch to `remote/branch`
    fn set_upstream(&self, branch: &str, upstream: &str) -> Result<()>;

    /// Paths whose working tree content differs from the index
    fn changed_paths(&self) -> Result<Vec<PathBuf>>;

    /// Whether tracked files have uncommitted modifications
    fn has_uncommitted_changes(&self) -> Result<bool>;

    /// Commits reachable from `to` but not from `from`, newest first, each
    /// formatted as `date SEP author SEP subject`
    fn log(&self, from: &str, to: &str, separator: &str) -> Result<Vec<String>>;
}
