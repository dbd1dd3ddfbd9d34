use super::PackageRepo;
use crate::error::{Result, StratusError};
use crate::git::{HeadState, VcsBackend};
use tracing::{debug, info, warn};

/// Remote synchronisation around a scoped branch operation
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchScope<'a> {
    pub remote: Option<&'a str>,
    /// Pull from `remote` after switching, before the work runs
    pub pull: bool,
    /// Push to `remote` after the work succeeds
    pub push: bool,
}

impl<'a> BranchScope<'a> {
    /// No remote interaction
    pub fn local() -> Self {
        BranchScope::default()
    }

    pub fn pulling(remote: &'a str) -> Self {
        BranchScope {
            remote: Some(remote),
            pull: true,
            push: false,
        }
    }

    pub fn pushing(remote: &'a str) -> Self {
        BranchScope {
            remote: Some(remote),
            pull: false,
            push: true,
        }
    }
}

fn head_label(head: &HeadState) -> &str {
    match head {
        HeadState::Branch(name) | HeadState::Unborn(name) => name,
        HeadState::Detached(id) => id,
    }
}

/// Switches back to the captured HEAD when dropped without [RestoreGuard::finish]
struct RestoreGuard<'r, B: VcsBackend> {
    repo: &'r PackageRepo<B>,
    previous: Option<HeadState>,
}

impl<'r, B: VcsBackend> RestoreGuard<'r, B> {
    fn finish(mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => self.repo.restore_head(&previous),
            None => Ok(()),
        }
    }
}

impl<'r, B: VcsBackend> Drop for RestoreGuard<'r, B> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = self.repo.restore_head(&previous) {
                warn!(branch = head_label(&previous), error = %e, "could not restore branch while unwinding");
            }
        }
    }
}

impl<B: VcsBackend> PackageRepo<B> {
    pub fn head_state(&self) -> Result<HeadState> {
        self.backend.head()
    }

    /// Currently checked-out branch, `None` when HEAD is detached
    pub fn active_branch(&self) -> Result<Option<String>> {
        Ok(self.head_state()?.branch_name().map(str::to_string))
    }

    pub fn is_detached_head(&self) -> Result<bool> {
        Ok(matches!(self.head_state()?, HeadState::Detached(_)))
    }

    /// Active branch name, or `DetachedHead` naming the operation that needed it
    pub fn require_active_branch(&self, operation: &str) -> Result<String> {
        self.active_branch()?
            .ok_or_else(|| StratusError::DetachedHead(operation.to_string()))
    }

    /// Switch to `name`, creating it at HEAD when it does not exist locally
    ///
    /// Does nothing if `name` is already active.
    pub fn set_active_branch(&self, name: &str) -> Result<()> {
        if self.active_branch()?.as_deref() == Some(name) {
            debug!(branch = name, "branch already active");
            return Ok(());
        }
        if self.branch_exists(name)? {
            self.backend.checkout_branch(name)
        } else {
            self.backend.checkout_new_branch(name)
        }
    }

    /// Put HEAD back where a previous [PackageRepo::head_state] found it
    pub fn restore_head(&self, previous: &HeadState) -> Result<()> {
        let current = self.head_state()?;
        if current == *previous {
            return Ok(());
        }
        match previous {
            HeadState::Branch(name) | HeadState::Unborn(name) => {
                if current.branch_name() == Some(name.as_str()) {
                    return Ok(());
                }
                if self.branch_exists(name)? {
                    self.backend.checkout_branch(name)?;
                } else {
                    self.backend.checkout_unborn(name)?;
                }
            }
            HeadState::Detached(id) => self.backend.checkout_detached(id)?,
        }
        info!(to = head_label(previous), "restored HEAD");
        Ok(())
    }

    /// Run `work` with `branch` checked out, then switch back
    ///
    /// The HEAD captured before the switch is restored on every exit path,
    /// including failures of the switch, the pull, `work` or the push. When
    /// the restore itself fails the result is `BranchRestore`, carrying the
    /// earlier failure as well if there was one.
    pub fn on_branch<T, F>(&self, branch: &str, scope: BranchScope<'_>, work: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let previous = self.head_state()?;
        let label = head_label(&previous).to_string();
        let guard = RestoreGuard {
            repo: self,
            previous: Some(previous),
        };
        debug!(branch, from = %label, "entering branch scope");

        let outcome = self.run_scoped(branch, &scope, work);
        let restored = guard.finish();

        match (outcome, restored) {
            (outcome, Ok(())) => outcome,
            (Ok(_), Err(e)) => Err(StratusError::BranchRestore {
                branch: label,
                source: Box::new(e),
                original: None,
            }),
            (Err(original), Err(e)) => Err(StratusError::BranchRestore {
                branch: label,
                source: Box::new(e),
                original: Some(Box::new(original)),
            }),
        }
    }

    fn run_scoped<T, F>(&self, branch: &str, scope: &BranchScope<'_>, work: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.set_active_branch(branch)?;
        if let (true, Some(remote)) = (scope.pull, scope.remote) {
            self.pull(remote)?;
        }
        let value = work(self)?;
        if let (true, Some(remote)) = (scope.push, scope.remote) {
            self.push(remote)?;
        }
        Ok(value)
    }
}
