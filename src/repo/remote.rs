use super::PackageRepo;
use crate::error::{Result, StratusError};
use crate::git::{RefUpdate, RemoteInfo, VcsBackend};
use tracing::{debug, info, warn};

/// `branch` in `remote/branch` form
pub fn qualify(remote: &str, branch: &str) -> String {
    let prefix = format!("{}/", remote);
    if branch.starts_with(&prefix) {
        branch.to_string()
    } else {
        format!("{}{}", prefix, branch)
    }
}

impl<B: VcsBackend> PackageRepo<B> {
    pub fn remotes(&self) -> Result<Vec<RemoteInfo>> {
        self.backend.remotes()
    }

    pub fn remote(&self, name: &str) -> Result<Option<RemoteInfo>> {
        Ok(self.remotes()?.into_iter().find(|remote| remote.name == name))
    }

    pub fn remote_exists(&self, name: &str) -> Result<bool> {
        Ok(self.remote(name)?.is_some())
    }

    /// Canonical (first) URL of a remote
    pub fn remote_url(&self, name: &str) -> Result<String> {
        self.remote(name)?
            .and_then(|remote| remote.urls.into_iter().next())
            .ok_or_else(|| StratusError::RemoteNotFound(name.to_string()))
    }

    /// Fetch one remote, or every configured remote when `remote` is `None`
    pub fn fetch(&self, remote: Option<&str>) -> Result<()> {
        match remote {
            Some(remote) => self.backend.fetch(remote, false),
            None => {
                for remote in self.remotes()? {
                    self.backend.fetch(&remote.name, false)?;
                }
                Ok(())
            }
        }
    }

    /// Push the active branch to the branch of the same name on `remote`
    ///
    /// Returns `Ok(None)` when `remote` is not configured. Fails with
    /// `RemotePush` if any reference update was rejected.
    pub fn push(&self, remote: &str) -> Result<Option<Vec<RefUpdate>>> {
        let branch = self.require_active_branch("push")?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        self.push_refspecs(remote, &[refspec])
    }

    pub(crate) fn push_refspecs(
        &self,
        remote: &str,
        refspecs: &[String],
    ) -> Result<Option<Vec<RefUpdate>>> {
        if !self.remote_exists(remote)? {
            debug!(remote, "remote not configured, skipping push");
            return Ok(None);
        }
        let updates = self.backend.push(remote, refspecs)?;
        if let Some(rejected) = updates.iter().find(|update| update.is_error()) {
            warn!(remote, refname = %rejected.refname, "push rejected");
            return Err(StratusError::RemotePush {
                remote: remote.to_string(),
                detail: rejected.summary(),
            });
        }
        info!(remote, refs = updates.len(), "pushed");
        Ok(Some(updates))
    }

    /// Pull the active branch from `remote`
    pub fn pull(&self, remote: &str) -> Result<()> {
        if !self.remote_exists(remote)? {
            return Err(StratusError::RemotePull {
                remote: remote.to_string(),
                detail: "remote does not exist".to_string(),
            });
        }
        let branch = self.require_active_branch("pull")?;
        self.backend.pull(remote, &branch).map_err(|e| match e {
            StratusError::MergeConflict { .. } => e,
            other => StratusError::RemotePull {
                remote: remote.to_string(),
                detail: other.to_string(),
            },
        })?;
        info!(remote, branch = %branch, "pulled");
        Ok(())
    }

    /// Remote-tracking branches of `remote`, qualified as `remote/branch`
    pub fn remote_branches(&self, remote: &str) -> Result<Vec<String>> {
        self.backend.remote_branches(remote)
    }

    /// Whether `remote` has `branch`, as of the last fetch
    pub fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool> {
        let qualified = qualify(remote, branch);
        Ok(self
            .remote_branches(remote)?
            .iter()
            .any(|name| *name == qualified))
    }

    /// Track `remote/branch` from `branch` unless a tracking reference is set
    ///
    /// Returns whether tracking was set by this call.
    pub fn ensure_tracking(&self, branch: &str, remote: &str) -> Result<bool> {
        if let Some(upstream) = self.backend.upstream(branch)? {
            debug!(branch, upstream = %upstream, "tracking already set");
            return Ok(false);
        }
        if !self.remote_branch_exists(remote, branch)? {
            self.backend.fetch(remote, false)?;
            if !self.remote_branch_exists(remote, branch)? {
                debug!(branch, remote, "no remote branch to track");
                return Ok(false);
            }
        }
        self.backend
            .set_upstream(branch, &qualify(remote, branch))?;
        Ok(true)
    }

    /// Create `branch` from its counterpart on `remote` and switch to it
    ///
    /// `remote_branch` names the remote side when it differs from `branch`.
    pub fn checkout_remote_branch(
        &self,
        branch: &str,
        remote: &str,
        track: bool,
        remote_branch: Option<&str>,
    ) -> Result<()> {
        self.backend.fetch(remote, false)?;
        let qualified = qualify(remote, remote_branch.unwrap_or(branch));
        if self.backend.resolve_commit(&qualified)?.is_none() {
            return Err(StratusError::vcs(format!(
                "remote branch '{}' does not exist",
                qualified
            )));
        }
        if !self.branch_exists(branch)? {
            self.backend.create_branch(branch, &qualified)?;
        }
        if track && self.backend.upstream(branch)?.is_none() {
            self.backend.set_upstream(branch, &qualified)?;
        }
        self.set_active_branch(branch)
    }
}
