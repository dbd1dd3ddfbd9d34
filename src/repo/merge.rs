use super::{BranchScope, PackageRepo};
use crate::error::{Result, StratusError};
use crate::git::{CommitId, MergePolicy, VcsBackend};
use tracing::info;

impl<B: VcsBackend> PackageRepo<B> {
    /// Merge `source` into `target` and return the new tip of `target`
    ///
    /// `target` is pulled from `remote` first when one is given. On conflict
    /// nothing is written to `target`, the error lists the conflicting paths
    /// and the previously active branch is restored as usual.
    pub fn merge(
        &self,
        source: &str,
        target: &str,
        remote: Option<&str>,
        policy: &MergePolicy,
    ) -> Result<CommitId> {
        if self.backend.resolve_commit(source)?.is_none() {
            return Err(StratusError::vcs(format!(
                "cannot merge '{}': no such branch or commit",
                source
            )));
        }
        let scope = match remote {
            Some(remote) => BranchScope::pulling(remote),
            None => BranchScope::local(),
        };

        self.on_branch(target, scope, |repo| {
            let tip = repo
                .backend
                .merge(source, policy)
                .map_err(|e| match e {
                    StratusError::MergeConflict {
                        source_branch,
                        paths,
                        ..
                    } => StratusError::MergeConflict {
                        source_branch,
                        target: target.to_string(),
                        paths,
                    },
                    other => other,
                })?;
            info!(source, target, tip = %tip, "merged");
            Ok(tip)
        })
    }
}
