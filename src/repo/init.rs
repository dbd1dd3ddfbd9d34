use super::remote::qualify;
use super::{BranchScope, PackageRepo};
use crate::error::Result;
use crate::git::{CommitId, VcsBackend};
use tracing::{debug, info};

/// What [PackageRepo::initialize_branch] had to do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchInit {
    /// The local branch did not exist before
    pub created_locally: bool,
    /// Empty commit made to give a brand new branch a tip
    pub initial_commit: Option<CommitId>,
    /// The branch was pushed to create it on the remote
    pub pushed: bool,
    pub tracking_set: bool,
}

impl BranchInit {
    /// Whether the branch was already fully initialized
    pub fn is_noop(&self) -> bool {
        *self == BranchInit::default()
    }
}

impl<B: VcsBackend> PackageRepo<B> {
    /// Make sure `branch` exists locally with a commit, exists on `remote`
    /// and tracks it
    ///
    /// A local branch missing but present on the remote is created from the
    /// remote one. A branch new on both sides gets an empty commit. Each step
    /// is skipped when already satisfied, so running this twice changes
    /// nothing the second time. A `remote` that is not configured only skips
    /// the remote steps.
    pub fn initialize_branch(&self, branch: &str, remote: &str) -> Result<BranchInit> {
        let has_remote = self.remote_exists(remote)?;
        if has_remote {
            self.backend.fetch(remote, false)?;
        }
        let mut outcome = BranchInit::default();
        let mut brand_new = false;

        if !self.branch_exists(branch)? {
            outcome.created_locally = true;
            if has_remote && self.remote_branch_exists(remote, branch)? {
                self.backend.create_branch(branch, &qualify(remote, branch))?;
                info!(branch, remote, "created branch from remote");
            } else {
                brand_new = true;
            }
        }

        let outcome = self.on_branch(branch, BranchScope::local(), |repo| {
            if brand_new || repo.head_commit()?.is_none() {
                let sha = repo
                    .backend
                    .commit_empty(&format!("initialize branch {}", branch))?;
                outcome.initial_commit = Some(sha);
            }
            if has_remote {
                if !repo.remote_branch_exists(remote, branch)? {
                    repo.push(remote)?;
                    outcome.pushed = true;
                }
                outcome.tracking_set = repo.ensure_tracking(branch, remote)?;
            }
            Ok(outcome)
        })?;

        if outcome.is_noop() {
            debug!(branch, "branch already initialized");
        } else {
            info!(branch, ?outcome, "initialized branch");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MockBackend;
    use crate::repo::test_support::*;

    #[test]
    fn test_initialize_new_branch() {
        let repo = repo_with_origin();
        let before = repo.head_commit().unwrap().unwrap();

        let outcome = repo.initialize_branch("release/1.0", "origin").unwrap();
        assert!(outcome.created_locally);
        assert!(outcome.pushed);
        assert!(outcome.tracking_set);
        let sha = outcome.initial_commit.unwrap();

        assert_eq!(repo.active_branch().unwrap().as_deref(), Some("master"));
        assert_eq!(repo.head_commit().unwrap(), Some(before));
        assert_eq!(
            repo.backend().resolve_commit("release/1.0").unwrap(),
            Some(sha)
        );
        assert_eq!(
            repo.backend().upstream("release/1.0").unwrap().as_deref(),
            Some("origin/release/1.0")
        );
    }

    #[test]
    fn test_initialize_twice_is_noop() {
        let repo = repo_with_origin();
        repo.initialize_branch("release/1.0", "origin").unwrap();
        let commits = repo.backend().state().commits.len();
        let pushes = repo.backend().state().pushes.len();

        let again = repo.initialize_branch("release/1.0", "origin").unwrap();
        assert!(again.is_noop());
        assert_eq!(repo.backend().state().commits.len(), commits);
        assert_eq!(repo.backend().state().pushes.len(), pushes);
    }

    #[test]
    fn test_initialize_from_remote_branch() {
        let repo = repo_with_origin();
        let remote_tip = repo.backend().commit("remote develop");
        repo.backend().add_remote_branch("origin", "develop", &remote_tip);

        let outcome = repo.initialize_branch("develop", "origin").unwrap();
        assert!(outcome.created_locally);
        assert_eq!(outcome.initial_commit, None);
        assert!(!outcome.pushed);
        assert!(outcome.tracking_set);
        assert_eq!(
            repo.backend().resolve_commit("develop").unwrap(),
            Some(remote_tip)
        );
    }

    #[test]
    fn test_initialize_without_remote_stays_local() {
        let repo = repo();
        let outcome = repo.initialize_branch("develop", "origin").unwrap();
        assert!(outcome.created_locally);
        assert!(outcome.initial_commit.is_some());
        assert!(!outcome.pushed);
        assert!(repo.backend().state().pushes.is_empty());
    }

    #[test]
    fn test_initialize_in_empty_repository() {
        let repo = PackageRepo::new(MockBackend::new(), Default::default());
        let outcome = repo.initialize_branch("master", "origin").unwrap();
        assert!(outcome.initial_commit.is_some());
        assert_eq!(repo.active_branch().unwrap().as_deref(), Some("master"));
        assert!(repo.branch_exists("master").unwrap());
    }
}
