use crate::config::IdentityConfig;
use crate::error::{Result, StratusError};
use crate::git::{CommitId, HeadState, MergePolicy, RefUpdate, RemoteInfo, TagInfo, VcsBackend};
use chrono::{DateTime, FixedOffset};
use git2::build::CheckoutBuilder;
use git2::{
    AutotagOption, BranchType, Commit, Cred, CredentialType, ErrorCode, FetchOptions, FileFavor,
    Index, Oid, PushOptions, RemoteCallbacks, Repository, Signature, Sort, StatusOptions,
};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Index mode of an executable blob
const EXECUTABLE_MODE: u32 = 0o100755;

/// [VcsBackend] implementation on top of a `git2::Repository`
pub struct Git2Backend {
    repo: Repository,
    root: PathBuf,
    identity: IdentityConfig,
}

impl Git2Backend {
    /// Open the repository containing `path`, searching parent directories
    ///
    /// Bare repositories are rejected since every operation needs a working tree.
    pub fn discover<P: AsRef<Path>>(path: P, identity: IdentityConfig) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::discover(path).map_err(|e| {
            StratusError::RepoNotFound(format!("{}: {}", path.display(), e.message()))
        })?;
        Self::from_git2(repo, identity)
    }

    /// Create from existing git2::Repository
    pub fn from_git2(repo: Repository, identity: IdentityConfig) -> Result<Self> {
        let root = repo.workdir().map(Path::to_path_buf).ok_or_else(|| {
            StratusError::RepoNotFound(format!("{} has no working tree", repo.path().display()))
        })?;
        debug!(root = %root.display(), "opened repository");
        Ok(Git2Backend {
            repo,
            root,
            identity,
        })
    }

    fn head_commit(&self) -> Result<Option<Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn head_label(&self) -> String {
        self.head()
            .ok()
            .and_then(|head| head.branch_name().map(str::to_string))
            .unwrap_or_else(|| "HEAD".to_string())
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(signature) => Ok(signature),
            Err(_) => Ok(Signature::now(&self.identity.name, &self.identity.email)?),
        }
    }

    fn find_remote(&self, name: &str) -> Result<git2::Remote<'_>> {
        self.repo
            .find_remote(name)
            .map_err(|_| StratusError::RemoteNotFound(name.to_string()))
    }

    /// Path relative to the working tree root
    fn relative_path(&self, path: &Path) -> Result<PathBuf> {
        if path.is_relative() {
            return Ok(path.to_path_buf());
        }
        if let Ok(relative) = path.strip_prefix(&self.root) {
            return Ok(relative.to_path_buf());
        }
        // tempdirs and symlinked homes: compare canonical forms
        let root = self.root.canonicalize()?;
        let parent = path
            .parent()
            .ok_or_else(|| StratusError::vcs(format!("invalid path {}", path.display())))?
            .canonicalize()?;
        let candidate = match path.file_name() {
            Some(name) => parent.join(name),
            None => parent,
        };
        candidate
            .strip_prefix(&root)
            .map(Path::to_path_buf)
            .map_err(|_| {
                StratusError::vcs(format!("{} is outside the repository", path.display()))
            })
    }

    /// Check out `oid` and move the current HEAD reference to it
    fn advance_head(&self, oid: Oid, reflog: &str) -> Result<()> {
        let commit = self.repo.find_commit(oid)?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
        let refname = self
            .repo
            .head()?
            .name()
            .map(str::to_string)
            .ok_or_else(|| StratusError::vcs("HEAD reference name is not valid UTF-8"))?;
        self.repo.reference(&refname, oid, true, reflog)?;
        Ok(())
    }

    /// Bring `their` into HEAD according to `policy`
    fn integrate(
        &self,
        their: &Commit<'_>,
        policy: &MergePolicy,
        message: &str,
        source_label: &str,
    ) -> Result<CommitId> {
        let keep_ours = keeps_our_tree(policy)?;
        let annotated = self.repo.find_annotated_commit(their.id())?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            debug!(source = source_label, "already up to date");
            return self
                .head_commit()?
                .map(|commit| commit.id().to_string())
                .ok_or_else(|| StratusError::vcs("HEAD has no commit"));
        }

        if analysis.is_unborn() {
            let head = self.repo.find_reference("HEAD")?;
            let refname = head
                .symbolic_target()
                .map(str::to_string)
                .ok_or_else(|| StratusError::vcs("HEAD is not a symbolic reference"))?;
            self.repo.reference(&refname, their.id(), true, message)?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::new().safe()))?;
            return Ok(their.id().to_string());
        }

        if analysis.is_fast_forward() && policy.fastforward && !keep_ours {
            self.advance_head(their.id(), &format!("{}: Fast-forward", message))?;
            info!(source = source_label, tip = %their.id(), "fast-forwarded");
            return Ok(their.id().to_string());
        }

        let ours = self
            .head_commit()?
            .ok_or_else(|| StratusError::vcs("cannot merge into a branch without commits"))?;
        let tree = if keep_ours {
            ours.tree()?
        } else {
            let options = merge_options(policy)?;
            let mut index = self.repo.merge_commits(&ours, their, Some(&options))?;
            if index.has_conflicts() {
                let paths = conflict_paths(&index)?;
                warn!(source = source_label, conflicts = paths.len(), "merge has conflicts");
                return Err(StratusError::MergeConflict {
                    source_branch: source_label.to_string(),
                    target: self.head_label(),
                    paths,
                });
            }
            let tree_id = index.write_tree_to(&self.repo)?;
            self.repo.find_tree(tree_id)?
        };

        let signature = self.signature()?;
        let oid = self
            .repo
            .commit(None, &signature, &signature, message, &tree, &[&ours, their])?;
        self.advance_head(oid, message)?;
        info!(source = source_label, tip = %oid, "created merge commit");
        Ok(oid.to_string())
    }
}

fn keeps_our_tree(policy: &MergePolicy) -> Result<bool> {
    match policy.strategy.as_deref() {
        None | Some("recursive") | Some("ort") | Some("resolve") => Ok(false),
        Some("ours") => Ok(true),
        Some(other) => Err(StratusError::vcs(format!(
            "unsupported merge strategy '{}'",
            other
        ))),
    }
}

fn merge_options(policy: &MergePolicy) -> Result<git2::MergeOptions> {
    let mut options = git2::MergeOptions::new();
    match policy.strategy_option.as_deref() {
        None => {}
        Some("ours") => {
            options.file_favor(FileFavor::Ours);
        }
        Some("theirs") => {
            options.file_favor(FileFavor::Theirs);
        }
        Some("patience") => {
            options.patience(true);
        }
        Some("ignore-space-change") => {
            options.ignore_whitespace_change(true);
        }
        Some("ignore-all-space") => {
            options.ignore_whitespace(true);
        }
        Some("ignore-space-at-eol") => {
            options.ignore_whitespace_eol(true);
        }
        Some(other) => {
            return Err(StratusError::vcs(format!(
                "unsupported merge strategy option '{}'",
                other
            )))
        }
    }
    Ok(options)
}

fn conflict_paths(index: &Index) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
            paths.push(String::from_utf8_lossy(&entry.path).into_owned());
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Committer date in `git log --format=%ci` form
fn format_commit_time(time: git2::Time) -> String {
    DateTime::from_timestamp(time.seconds(), 0)
        .zip(FixedOffset::east_opt(time.offset_minutes() * 60))
        .map(|(utc, offset)| {
            utc.with_timezone(&offset)
                .format("%Y-%m-%d %H:%M:%S %z")
                .to_string()
        })
        .unwrap_or_else(|| time.seconds().to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

/// Credential callbacks for network remotes
///
/// Tries SSH keys from ~/.ssh/, then the SSH agent, then default credentials.
fn remote_callbacks<'a>() -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, allowed_types| {
        let username = username_from_url.unwrap_or("git");
        if allowed_types.contains(CredentialType::SSH_KEY) {
            if let Some(home) = dirs::home_dir() {
                for key in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                    let path = home.join(".ssh").join(key);
                    if path.exists() {
                        if let Ok(cred) = Cred::ssh_key(username, None, &path, None) {
                            return Ok(cred);
                        }
                    }
                }
            }
            if let Ok(cred) = Cred::ssh_key_from_agent(username) {
                return Ok(cred);
            }
        }
        Cred::default()
    });
    callbacks
}

impl VcsBackend for Git2Backend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn remotes(&self) -> Result<Vec<RemoteInfo>> {
        let names = self.repo.remotes()?;
        let mut remotes = Vec::new();
        for name in names.iter().flatten() {
            let remote = self.repo.find_remote(name)?;
            let mut urls = Vec::new();
            if let Some(url) = remote.url() {
                urls.push(url.to_string());
            }
            if let Some(push_url) = remote.pushurl() {
                if !urls.iter().any(|url| url == push_url) {
                    urls.push(push_url.to_string());
                }
            }
            remotes.push(RemoteInfo {
                name: name.to_string(),
                urls,
            });
        }
        Ok(remotes)
    }

    fn local_branches(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn remote_branches(&self, remote: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", remote);
        let mut names = Vec::new();
        for entry in self.repo.branches(Some(BranchType::Remote))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                if name.starts_with(&prefix) && !name.ends_with("/HEAD") {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn tags(&self) -> Result<Vec<TagInfo>> {
        let names = self.repo.tag_names(None)?;
        let mut tags = Vec::new();
        for name in names.iter().flatten() {
            let reference = self.repo.find_reference(&format!("refs/tags/{}", name))?;
            match reference.peel_to_commit() {
                Ok(commit) => tags.push(TagInfo {
                    name: name.to_string(),
                    commit: commit.id().to_string(),
                }),
                Err(_) => debug!(tag = name, "skipping tag that does not point at a commit"),
            }
        }
        Ok(tags)
    }

    fn head(&self) -> Result<HeadState> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(HeadState::Branch(
                head.shorthand().unwrap_or("HEAD").to_string(),
            )),
            Ok(head) => Ok(HeadState::Detached(head.peel_to_commit()?.id().to_string())),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                let head = self.repo.find_reference("HEAD")?;
                let target = head.symbolic_target().unwrap_or("refs/heads/master");
                Ok(HeadState::Unborn(
                    target.trim_start_matches("refs/heads/").to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_commit(&self, rev: &str) -> Result<Option<CommitId>> {
        match self.repo.revparse_single(rev) {
            Ok(object) => Ok(Some(object.peel_to_commit()?.id().to_string())),
            Err(e)
                if matches!(
                    e.code(),
                    ErrorCode::NotFound | ErrorCode::UnbornBranch | ErrorCode::InvalidSpec
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        let refname = format!("refs/heads/{}", name);
        let target = self.repo.find_reference(&refname)?.peel_to_commit()?;
        self.repo
            .checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))?;
        self.repo.set_head(&refname)?;
        info!(branch = name, "checked out branch");
        Ok(())
    }

    fn checkout_new_branch(&self, name: &str) -> Result<()> {
        if let Some(commit) = self.head_commit()? {
            self.repo.branch(name, &commit, false)?;
        }
        self.repo.set_head(&format!("refs/heads/{}", name))?;
        info!(branch = name, "created and checked out branch");
        Ok(())
    }

    fn checkout_unborn(&self, name: &str) -> Result<()> {
        self.repo.set_head(&format!("refs/heads/{}", name))?;
        debug!(branch = name, "pointed HEAD at unborn branch");
        Ok(())
    }

    fn checkout_detached(&self, rev: &str) -> Result<()> {
        let commit = self.repo.revparse_single(rev)?.peel_to_commit()?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))?;
        self.repo.set_head_detached(commit.id())?;
        info!(commit = %commit.id(), "checked out detached HEAD");
        Ok(())
    }

    fn create_branch(&self, name: &str, start: &str) -> Result<()> {
        let commit = self.repo.revparse_single(start)?.peel_to_commit()?;
        self.repo.branch(name, &commit, false)?;
        info!(branch = name, start, "created branch");
        Ok(())
    }

    fn create_tag(&self, name: &str, force: bool) -> Result<CommitId> {
        let commit = self
            .head_commit()?
            .ok_or_else(|| StratusError::vcs("cannot tag a branch without commits"))?;
        match self.repo.tag_lightweight(name, commit.as_object(), force) {
            Ok(_) => {}
            Err(e) if e.code() == ErrorCode::Exists => {
                return Err(StratusError::TagExists {
                    tag: name.to_string(),
                    branch: self.head_label(),
                })
            }
            Err(e) => return Err(e.into()),
        }
        info!(tag = name, commit = %commit.id(), force, "created tag");
        Ok(commit.id().to_string())
    }

    fn reset_tag(&self, name: &str, commit: Option<&str>) -> Result<()> {
        match commit {
            Some(rev) => {
                let target = self.repo.revparse_single(rev)?.peel_to_commit()?;
                self.repo.tag_lightweight(name, target.as_object(), true)?;
                info!(tag = name, commit = %target.id(), "reset tag");
            }
            None => {
                self.repo.tag_delete(name)?;
                info!(tag = name, "deleted tag");
            }
        }
        Ok(())
    }

    fn commit_paths(&self, paths: &[PathBuf], message: &str) -> Result<CommitId> {
        let parent = self.head_commit()?;
        // The commit tree is HEAD plus the given paths; other staged entries stay staged.
        let mut tree_index = Index::new()?;
        if let Some(commit) = &parent {
            tree_index.read_tree(&commit.tree()?)?;
        }

        let mut index = self.repo.index()?;
        for path in paths {
            let relative = self.relative_path(path)?;
            let on_disk = self.root.join(&relative);
            if !on_disk.exists() {
                index.remove_path(&relative)?;
                if tree_index.get_path(&relative, 0).is_some() {
                    tree_index.remove(&relative, 0)?;
                }
                continue;
            }
            index.add_path(&relative)?;
            if let Some(mut entry) = index.get_path(&relative, 0) {
                if is_executable(&on_disk) && entry.mode != EXECUTABLE_MODE {
                    entry.mode = EXECUTABLE_MODE;
                    index.add(&entry)?;
                }
                tree_index.add(&entry)?;
            }
        }
        index.write()?;

        let tree_id = tree_index.write_tree_to(&self.repo)?;
        if parent.as_ref().map(|commit| commit.tree_id()) == Some(tree_id) {
            return Err(StratusError::vcs("nothing to commit: staged files are unchanged"));
        }
        let tree = self.repo.find_tree(tree_id)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let signature = self.signature()?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!(sha = %oid, files = paths.len(), "created commit");
        Ok(oid.to_string())
    }

    fn commit_empty(&self, message: &str) -> Result<CommitId> {
        let parent = self.head_commit()?;
        let tree = match &parent {
            Some(commit) => commit.tree()?,
            None => {
                let empty = self.repo.treebuilder(None)?.write()?;
                self.repo.find_tree(empty)?
            }
        };
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let signature = self.signature()?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!(sha = %oid, "created empty commit");
        Ok(oid.to_string())
    }

    #[instrument(skip(self))]
    fn fetch(&self, remote: &str, tags: bool) -> Result<()> {
        let mut handle = self.find_remote(remote)?;
        let mut options = FetchOptions::new();
        options.remote_callbacks(remote_callbacks());
        if tags {
            options.download_tags(AutotagOption::All);
        }
        handle.fetch(&[] as &[&str], Some(&mut options), None)?;
        debug!("fetch completed");
        Ok(())
    }

    #[instrument(skip(self))]
    fn push(&self, remote: &str, refspecs: &[String]) -> Result<Vec<RefUpdate>> {
        let mut handle = self.find_remote(remote)?;
        let updates = RefCell::new(Vec::new());
        {
            let mut callbacks = remote_callbacks();
            callbacks.push_update_reference(|refname, status| {
                let update = match status {
                    Some(reason) => {
                        warn!(refname, reason, "push rejected");
                        RefUpdate::rejected(refname, reason)
                    }
                    None => RefUpdate::updated(refname),
                };
                updates.borrow_mut().push(update);
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            handle
                .push(refspecs, Some(&mut options))
                .map_err(|e| StratusError::RemotePush {
                    remote: remote.to_string(),
                    detail: e.message().to_string(),
                })?;
        }
        debug!("push completed");
        Ok(updates.into_inner())
    }

    #[instrument(skip(self))]
    fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        self.fetch(remote, false)?;
        let tracking = format!("refs/remotes/{}/{}", remote, branch);
        let their = match self.repo.find_reference(&tracking) {
            Ok(reference) => reference.peel_to_commit()?,
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!(tracking, "remote has no such branch, nothing to pull");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let message = format!("Merge branch '{}' of {} into {}", branch, remote, branch);
        self.integrate(
            &their,
            &MergePolicy::default(),
            &message,
            &format!("{}/{}", remote, branch),
        )?;
        info!("pull completed");
        Ok(())
    }

    #[instrument(skip(self, policy))]
    fn merge(&self, source: &str, policy: &MergePolicy) -> Result<CommitId> {
        let their = self
            .repo
            .revparse_single(source)
            .map_err(|e| {
                StratusError::vcs(format!("cannot resolve '{}': {}", source, e.message()))
            })?
            .peel_to_commit()?;
        let message = format!("Merge branch '{}' into {}", source, self.head_label());
        self.integrate(&their, policy, &message, source)
    }

    fn upstream(&self, branch: &str) -> Result<Option<String>> {
        let local = self.repo.find_branch(branch, BranchType::Local)?;
        match local.upstream() {
            Ok(upstream) => Ok(upstream.name()?.map(str::to_string)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_upstream(&self, branch: &str, upstream: &str) -> Result<()> {
        let mut local = self.repo.find_branch(branch, BranchType::Local)?;
        local.set_upstream(Some(upstream))?;
        info!(branch, upstream, "set upstream");
        Ok(())
    }

    fn changed_paths(&self) -> Result<Vec<PathBuf>> {
        let diff = self.repo.diff_index_to_workdir(None, None)?;
        Ok(diff
            .deltas()
            .filter_map(|delta| delta.old_file().path().map(Path::to_path_buf))
            .collect())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options.include_untracked(false).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut options))?;
        Ok(!statuses.is_empty())
    }

    fn log(&self, from: &str, to: &str, separator: &str) -> Result<Vec<String>> {
        let from = self.repo.revparse_single(from)?.peel_to_commit()?.id();
        let to = self.repo.revparse_single(to)?.peel_to_commit()?.id();

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push(to)?;
        revwalk.hide(from)?;

        let mut lines = Vec::new();
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            let author = commit.author();
            lines.push(format!(
                "{date}{sep}{name}{sep}{subject}",
                date = format_commit_time(commit.time()),
                name = author.name().unwrap_or("unknown"),
                subject = commit.summary().unwrap_or(""),
                sep = separator,
            ));
        }
        Ok(lines)
    }
}
