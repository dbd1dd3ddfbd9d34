use super::{BranchScope, PackageRepo};
use crate::error::{Result, StratusError};
use crate::git::{HeadState, TagInfo, VcsBackend};
use tracing::{debug, info, warn};

/// Field separator of the log lines release notes are parsed from
///
/// ASCII unit separator, which does not occur in ordinary commit subjects.
pub const LOG_FIELD_SEPARATOR: &str = "\u{1f}";

/// One commit of a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseNote {
    pub date: String,
    pub author: String,
    pub message: String,
}

/// Where [PackageRepo::update_to_tag] leaves HEAD
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagCheckout {
    /// Check out onto a branch, by default the configured tag prefix + tag name
    OntoBranch(Option<String>),
    /// Check out the tagged commit directly
    Detached,
}

/// Split a `date SEP author SEP message` log line
pub fn parse_release_note(line: &str) -> Result<ReleaseNote> {
    let fields: Vec<&str> = line.split(LOG_FIELD_SEPARATOR).collect();
    match fields.as_slice() {
        [date, author, message] => Ok(ReleaseNote {
            date: date.trim().to_string(),
            author: author.trim().to_string(),
            message: message.trim().to_string(),
        }),
        _ => Err(StratusError::MalformedLog {
            line: line.to_string(),
            fields: fields.len(),
        }),
    }
}

impl<B: VcsBackend> PackageRepo<B> {
    pub fn tags(&self) -> Result<Vec<TagInfo>> {
        self.backend.tags()
    }

    pub fn tag_ref(&self, tag: &str) -> Result<Option<TagInfo>> {
        Ok(self.tags()?.into_iter().find(|t| t.name == tag))
    }

    pub fn tag_exists(&self, tag: &str) -> Result<bool> {
        Ok(self.tag_ref(tag)?.is_some())
    }

    /// Tag the tip of `master_branch` and push the tag to `remote`
    ///
    /// An existing tag is only moved when `force` is set; otherwise the call
    /// fails with `TagExists` before touching any branch. When the push
    /// fails the local tag is put back where it was, or removed if it is new.
    pub fn tag_release(
        &self,
        tag: &str,
        master_branch: &str,
        remote: Option<&str>,
        force: bool,
    ) -> Result<TagInfo> {
        let previous = self.tag_ref(tag)?;
        if !force && previous.is_some() {
            return Err(StratusError::TagExists {
                tag: tag.to_string(),
                branch: master_branch.to_string(),
            });
        }

        self.on_branch(master_branch, BranchScope::local(), |repo| {
            let commit = repo.backend.create_tag(tag, force)?;
            info!(tag, commit = %commit, "tagged release");
            if let Some(remote) = remote {
                let prefix = if force { "+" } else { "" };
                let refspec = format!("{}refs/tags/{1}:refs/tags/{1}", prefix, tag);
                if let Err(e) = repo.push_refspecs(remote, &[refspec]) {
                    let restore = previous.as_ref().map(|t| t.commit.as_str());
                    if let Err(reset) = repo.backend.reset_tag(tag, restore) {
                        warn!(tag, error = %reset, "could not roll back tag after failed push");
                    }
                    return Err(e);
                }
            }
            Ok(TagInfo {
                name: tag.to_string(),
                commit,
            })
        })
    }

    /// Fetch tags from `remote` and check out `tag`
    ///
    /// With [TagCheckout::OntoBranch] the branch is created at the tag the
    /// first time and reused afterwards, as it is. With [TagCheckout::Detached]
    /// HEAD is left detached at the tagged commit.
    pub fn update_to_tag(&self, tag: &str, remote: &str, checkout: TagCheckout) -> Result<HeadState> {
        if !self.remote_exists(remote)? {
            return Err(StratusError::RemoteNotFound(remote.to_string()));
        }
        self.backend.fetch(remote, true)?;
        let tagged = self
            .tag_ref(tag)?
            .ok_or_else(|| StratusError::TagNotFound(tag.to_string()))?;

        match checkout {
            TagCheckout::OntoBranch(name) => {
                let branch = name.unwrap_or_else(|| self.config.tag_branch(tag));
                if self.branch_exists(&branch)? {
                    debug!(branch = %branch, tag, "reusing tag branch");
                } else {
                    self.backend.create_branch(&branch, &tagged.commit)?;
                    info!(branch = %branch, tag, "created tag branch");
                }
                self.set_active_branch(&branch)?;
            }
            TagCheckout::Detached => {
                self.backend.checkout_detached(&tagged.commit)?;
            }
        }
        self.head_state()
    }

    /// Commits after `start_tag` up to and including `end_tag`, newest first
    pub fn release_notes(&self, start_tag: &str, end_tag: &str) -> Result<Vec<ReleaseNote>> {
        let start = self
            .tag_ref(start_tag)?
            .ok_or_else(|| StratusError::TagNotFound(start_tag.to_string()))?;
        let end = self
            .tag_ref(end_tag)?
            .ok_or_else(|| StratusError::TagNotFound(end_tag.to_string()))?;

        self.backend
            .log(&start.commit, &end.commit, LOG_FIELD_SEPARATOR)?
            .iter()
            .map(|line| parse_release_note(line))
            .collect()
    }
}
