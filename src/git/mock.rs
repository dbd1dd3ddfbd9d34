use crate::error::{Result, StratusError};
use crate::git::{CommitId, HeadState, MergePolicy, RefUpdate, RemoteInfo, TagInfo, VcsBackend};
use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A commit recorded by the mock
#[derive(Debug, Clone)]
pub struct MockCommit {
    pub id: CommitId,
    pub parents: Vec<CommitId>,
    pub author: String,
    pub date: String,
    pub message: String,
    pub files: Vec<PathBuf>,
}

/// Server side of a mock remote
#[derive(Debug, Clone, Default)]
pub struct MockRemote {
    pub urls: Vec<String>,
    pub branches: BTreeMap<String, CommitId>,
    pub tags: BTreeMap<String, CommitId>,
    /// When set, every pushed reference is rejected with this reason
    pub reject: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum MockHead {
    Attached(String),
    Detached(CommitId),
}

/// Observable state of a [MockBackend]
#[derive(Debug)]
pub struct MockState {
    pub commits: Vec<MockCommit>,
    pub branches: BTreeMap<String, CommitId>,
    head: MockHead,
    pub tags: BTreeMap<String, CommitId>,
    pub remotes: BTreeMap<String, MockRemote>,
    /// Remote-tracking refs, keyed `remote/branch`
    pub remote_refs: BTreeMap<String, CommitId>,
    pub upstreams: BTreeMap<String, String>,
    pub changed: Vec<PathBuf>,
    pub conflicts: Vec<String>,
    pub fail_checkout_of: Option<String>,
    pub log_lines: Option<Vec<String>>,
    /// Branch or commit names passed to every checkout, in order
    pub checkouts: Vec<String>,
    pub pushes: Vec<(String, Vec<String>)>,
    pub pulls: Vec<(String, String)>,
    pub fetches: Vec<String>,
    /// `(source, target)` of every merge
    pub merges: Vec<(String, String)>,
}

impl MockState {
    fn head_tip(&self) -> Option<CommitId> {
        match &self.head {
            MockHead::Attached(name) => self.branches.get(name).cloned(),
            MockHead::Detached(id) => Some(id.clone()),
        }
    }

    fn head_label(&self) -> String {
        match &self.head {
            MockHead::Attached(name) => name.clone(),
            MockHead::Detached(_) => "HEAD".to_string(),
        }
    }

    fn resolve(&self, rev: &str) -> Option<CommitId> {
        if rev == "HEAD" {
            return self.head_tip();
        }
        if let Some(name) = rev.strip_prefix("refs/heads/") {
            return self.branches.get(name).cloned();
        }
        if let Some(name) = rev.strip_prefix("refs/tags/") {
            return self.tags.get(name).cloned();
        }
        if let Some(name) = rev.strip_prefix("refs/remotes/") {
            return self.remote_refs.get(name).cloned();
        }
        self.branches
            .get(rev)
            .or_else(|| self.tags.get(rev))
            .or_else(|| self.remote_refs.get(rev))
            .cloned()
            .or_else(|| {
                self.commits
                    .iter()
                    .find(|commit| commit.id == rev)
                    .map(|commit| commit.id.clone())
            })
    }

    fn find(&self, id: &str) -> Option<&MockCommit> {
        self.commits.iter().find(|commit| commit.id == id)
    }

    fn ancestors(&self, id: &str) -> BTreeSet<CommitId> {
        let mut seen = BTreeSet::new();
        let mut pending = vec![id.to_string()];
        while let Some(next) = pending.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(commit) = self.find(&next) {
                pending.extend(commit.parents.iter().cloned());
            }
        }
        seen
    }

    fn add_commit(&mut self, message: &str, parents: Vec<CommitId>, files: Vec<PathBuf>) -> CommitId {
        let n = self.commits.len() + 1;
        let id = format!("{:040x}", n);
        self.commits.push(MockCommit {
            id: id.clone(),
            parents,
            author: "Mock Author".to_string(),
            date: format!("2024-01-{:02} 12:00:00 +0000", (n % 28) + 1),
            message: message.to_string(),
            files,
        });
        id
    }

    fn set_head_tip(&mut self, id: CommitId) {
        match &self.head {
            MockHead::Attached(name) => {
                let name = name.clone();
                self.branches.insert(name, id);
            }
            MockHead::Detached(_) => self.head = MockHead::Detached(id),
        }
    }

    fn commit_on_head(&mut self, message: &str, files: Vec<PathBuf>) -> CommitId {
        let parents = self.head_tip().into_iter().collect();
        let id = self.add_commit(message, parents, files);
        self.set_head_tip(id.clone());
        id
    }

    /// Fast-forward or merge `their` into HEAD
    fn integrate(&mut self, their: CommitId, fastforward: bool, message: &str) -> CommitId {
        let ours = match self.head_tip() {
            Some(ours) => ours,
            None => {
                self.set_head_tip(their.clone());
                return their;
            }
        };
        if self.ancestors(&ours).contains(&their) {
            return ours;
        }
        if fastforward && self.ancestors(&their).contains(&ours) {
            self.set_head_tip(their.clone());
            return their;
        }
        let id = self.add_commit(message, vec![ours, their], Vec::new());
        self.set_head_tip(id.clone());
        id
    }
}

/// In-memory [VcsBackend] for tests
///
/// Starts on an unborn `master` branch with no remotes. Builder helpers seed
/// commits, remotes and failure modes; [MockBackend::state] exposes what the
/// code under test did.
pub struct MockBackend {
    root: PathBuf,
    state: RefCell<MockState>,
}

impl MockBackend {
    /// Create a new empty mock repository
    pub fn new() -> Self {
        MockBackend {
            root: PathBuf::from("/mock/repo"),
            state: RefCell::new(MockState {
                commits: Vec::new(),
                branches: BTreeMap::new(),
                head: MockHead::Attached("master".to_string()),
                tags: BTreeMap::new(),
                remotes: BTreeMap::new(),
                remote_refs: BTreeMap::new(),
                upstreams: BTreeMap::new(),
                changed: Vec::new(),
                conflicts: Vec::new(),
                fail_checkout_of: None,
                log_lines: None,
                checkouts: Vec::new(),
                pushes: Vec::new(),
                pulls: Vec::new(),
                fetches: Vec::new(),
                merges: Vec::new(),
            }),
        }
    }

    /// Commit on the current HEAD
    pub fn commit(&self, message: &str) -> CommitId {
        self.state.borrow_mut().commit_on_head(message, Vec::new())
    }

    pub fn add_remote(&self, name: &str, url: &str) {
        self.state.borrow_mut().remotes.insert(
            name.to_string(),
            MockRemote {
                urls: vec![url.to_string()],
                ..MockRemote::default()
            },
        );
    }

    /// Put a branch on the server side of a remote; it shows up locally after a fetch
    pub fn add_remote_branch(&self, remote: &str, branch: &str, commit: &str) {
        if let Some(handle) = self.state.borrow_mut().remotes.get_mut(remote) {
            handle.branches.insert(branch.to_string(), commit.to_string());
        }
    }

    pub fn add_remote_tag(&self, remote: &str, tag: &str, commit: &str) {
        if let Some(handle) = self.state.borrow_mut().remotes.get_mut(remote) {
            handle.tags.insert(tag.to_string(), commit.to_string());
        }
    }

    pub fn add_tag(&self, name: &str, commit: &str) {
        self.state
            .borrow_mut()
            .tags
            .insert(name.to_string(), commit.to_string());
    }

    pub fn reject_pushes(&self, remote: &str, reason: &str) {
        if let Some(handle) = self.state.borrow_mut().remotes.get_mut(remote) {
            handle.reject = Some(reason.to_string());
        }
    }

    /// Make every following merge report conflicts in `paths`
    pub fn set_conflicts(&self, paths: &[&str]) {
        self.state.borrow_mut().conflicts = paths.iter().map(|p| p.to_string()).collect();
    }

    /// Make checking out `branch` fail
    pub fn fail_checkout_of(&self, branch: Option<&str>) {
        self.state.borrow_mut().fail_checkout_of = branch.map(str::to_string);
    }

    /// Return these lines from every `log` call
    pub fn set_log_lines(&self, lines: Vec<String>) {
        self.state.borrow_mut().log_lines = Some(lines);
    }

    pub fn set_changed(&self, paths: &[&str]) {
        self.state.borrow_mut().changed = paths.iter().map(PathBuf::from).collect();
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    fn fetch_into(state: &mut MockState, remote: &str, tags: bool) -> Result<()> {
        let handle = state
            .remotes
            .get(remote)
            .cloned()
            .ok_or_else(|| StratusError::RemoteNotFound(remote.to_string()))?;
        for (branch, id) in handle.branches {
            state.remote_refs.insert(format!("{}/{}", remote, branch), id);
        }
        if tags {
            for (tag, id) in handle.tags {
                state.tags.entry(tag).or_insert(id);
            }
        }
        state.fetches.push(remote.to_string());
        Ok(())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VcsBackend for MockBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn remotes(&self) -> Result<Vec<RemoteInfo>> {
        Ok(self
            .state
            .borrow()
            .remotes
            .iter()
            .map(|(name, remote)| RemoteInfo {
                name: name.clone(),
                urls: remote.urls.clone(),
            })
            .collect())
    }

    fn local_branches(&self) -> Result<Vec<String>> {
        Ok(self.state.borrow().branches.keys().cloned().collect())
    }

    fn remote_branches(&self, remote: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", remote);
        Ok(self
            .state
            .borrow()
            .remote_refs
            .keys()
            .filter(|name| name.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn tags(&self) -> Result<Vec<TagInfo>> {
        Ok(self
            .state
            .borrow()
            .tags
            .iter()
            .map(|(name, commit)| TagInfo {
                name: name.clone(),
                commit: commit.clone(),
            })
            .collect())
    }

    fn head(&self) -> Result<HeadState> {
        let state = self.state.borrow();
        Ok(match &state.head {
            MockHead::Attached(name) if state.branches.contains_key(name) => {
                HeadState::Branch(name.clone())
            }
            MockHead::Attached(name) => HeadState::Unborn(name.clone()),
            MockHead::Detached(id) => HeadState::Detached(id.clone()),
        })
    }

    fn resolve_commit(&self, rev: &str) -> Result<Option<CommitId>> {
        Ok(self.state.borrow().resolve(rev))
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_checkout_of.as_deref() == Some(name) {
            return Err(StratusError::vcs(format!("checkout of '{}' blocked", name)));
        }
        if !state.branches.contains_key(name) {
            return Err(StratusError::vcs(format!("no such branch '{}'", name)));
        }
        state.head = MockHead::Attached(name.to_string());
        state.checkouts.push(name.to_string());
        Ok(())
    }

    fn checkout_new_branch(&self, name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.branches.contains_key(name) {
            return Err(StratusError::vcs(format!("branch '{}' already exists", name)));
        }
        if let Some(tip) = state.head_tip() {
            state.branches.insert(name.to_string(), tip);
        }
        state.head = MockHead::Attached(name.to_string());
        state.checkouts.push(name.to_string());
        Ok(())
    }

    fn checkout_unborn(&self, name: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.head = MockHead::Attached(name.to_string());
        state.checkouts.push(name.to_string());
        Ok(())
    }

    fn checkout_detached(&self, rev: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let id = state
            .resolve(rev)
            .ok_or_else(|| StratusError::vcs(format!("cannot resolve '{}'", rev)))?;
        state.checkouts.push(id.clone());
        state.head = MockHead::Detached(id);
        Ok(())
    }

    fn create_branch(&self, name: &str, start: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.branches.contains_key(name) {
            return Err(StratusError::vcs(format!("branch '{}' already exists", name)));
        }
        let id = state
            .resolve(start)
            .ok_or_else(|| StratusError::vcs(format!("cannot resolve '{}'", start)))?;
        state.branches.insert(name.to_string(), id);
        Ok(())
    }

    fn create_tag(&self, name: &str, force: bool) -> Result<CommitId> {
        let mut state = self.state.borrow_mut();
        let tip = state
            .head_tip()
            .ok_or_else(|| StratusError::vcs("cannot tag a branch without commits"))?;
        if state.tags.contains_key(name) && !force {
            return Err(StratusError::TagExists {
                tag: name.to_string(),
                branch: state.head_label(),
            });
        }
        state.tags.insert(name.to_string(), tip.clone());
        Ok(tip)
    }

    fn reset_tag(&self, name: &str, commit: Option<&str>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match commit {
            Some(commit) => {
                state.tags.insert(name.to_string(), commit.to_string());
            }
            None => {
                state
                    .tags
                    .remove(name)
                    .ok_or_else(|| StratusError::TagNotFound(name.to_string()))?;
            }
        }
        Ok(())
    }

    fn commit_paths(&self, paths: &[PathBuf], message: &str) -> Result<CommitId> {
        if paths.is_empty() {
            return Err(StratusError::vcs("nothing to commit"));
        }
        let mut state = self.state.borrow_mut();
        state.changed.retain(|changed| !paths.contains(changed));
        Ok(state.commit_on_head(message, paths.to_vec()))
    }

    fn commit_empty(&self, message: &str) -> Result<CommitId> {
        Ok(self.state.borrow_mut().commit_on_head(message, Vec::new()))
    }

    fn fetch(&self, remote: &str, tags: bool) -> Result<()> {
        Self::fetch_into(&mut self.state.borrow_mut(), remote, tags)
    }

    fn push(&self, remote: &str, refspecs: &[String]) -> Result<Vec<RefUpdate>> {
        let mut state = self.state.borrow_mut();
        let mut handle = state
            .remotes
            .get(remote)
            .cloned()
            .ok_or_else(|| StratusError::RemoteNotFound(remote.to_string()))?;
        state.pushes.push((remote.to_string(), refspecs.to_vec()));

        let mut updates = Vec::new();
        for spec in refspecs {
            let force = spec.starts_with('+');
            let (src, dst) = spec
                .trim_start_matches('+')
                .split_once(':')
                .ok_or_else(|| StratusError::vcs(format!("invalid refspec '{}'", spec)))?;
            if let Some(reason) = &handle.reject {
                updates.push(RefUpdate::rejected(dst, reason.as_str()));
                continue;
            }
            let id = state
                .resolve(src)
                .ok_or_else(|| StratusError::vcs(format!("src refspec {} does not match any", src)))?;
            if let Some(branch) = dst.strip_prefix("refs/heads/") {
                handle.branches.insert(branch.to_string(), id.clone());
                state.remote_refs.insert(format!("{}/{}", remote, branch), id);
                updates.push(RefUpdate::updated(dst));
            } else if let Some(tag) = dst.strip_prefix("refs/tags/") {
                match handle.tags.get(tag) {
                    Some(existing) if *existing != id && !force => {
                        updates.push(RefUpdate::rejected(dst, "already exists"));
                    }
                    _ => {
                        handle.tags.insert(tag.to_string(), id);
                        updates.push(RefUpdate::updated(dst));
                    }
                }
            } else {
                return Err(StratusError::vcs(format!("unsupported refspec '{}'", spec)));
            }
        }
        state.remotes.insert(remote.to_string(), handle);
        Ok(updates)
    }

    fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        Self::fetch_into(&mut state, remote, false)?;
        state.pulls.push((remote.to_string(), branch.to_string()));
        if let Some(their) = state.remote_refs.get(&format!("{}/{}", remote, branch)).cloned() {
            let message = format!("Merge branch '{}' of {} into {}", branch, remote, branch);
            state.integrate(their, true, &message);
        }
        Ok(())
    }

    fn merge(&self, source: &str, policy: &MergePolicy) -> Result<CommitId> {
        let mut state = self.state.borrow_mut();
        let their = state
            .resolve(source)
            .ok_or_else(|| StratusError::vcs(format!("cannot resolve '{}'", source)))?;
        let target = state.head_label();
        state.merges.push((source.to_string(), target.clone()));
        if !state.conflicts.is_empty() {
            return Err(StratusError::MergeConflict {
                source_branch: source.to_string(),
                target,
                paths: state.conflicts.clone(),
            });
        }
        let message = format!("Merge branch '{}' into {}", source, target);
        Ok(state.integrate(their, policy.fastforward, &message))
    }

    fn upstream(&self, branch: &str) -> Result<Option<String>> {
        Ok(self.state.borrow().upstreams.get(branch).cloned())
    }

    fn set_upstream(&self, branch: &str, upstream: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.branches.contains_key(branch) {
            return Err(StratusError::vcs(format!("no such branch '{}'", branch)));
        }
        if !state.remote_refs.contains_key(upstream) {
            return Err(StratusError::vcs(format!("no such upstream '{}'", upstream)));
        }
        state
            .upstreams
            .insert(branch.to_string(), upstream.to_string());
        Ok(())
    }

    fn changed_paths(&self) -> Result<Vec<PathBuf>> {
        Ok(self.state.borrow().changed.clone())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(!self.state.borrow().changed.is_empty())
    }

    fn log(&self, from: &str, to: &str, separator: &str) -> Result<Vec<String>> {
        let state = self.state.borrow();
        if let Some(lines) = &state.log_lines {
            return Ok(lines.clone());
        }
        let from = state
            .resolve(from)
            .ok_or_else(|| StratusError::vcs(format!("cannot resolve '{}'", from)))?;
        let to = state
            .resolve(to)
            .ok_or_else(|| StratusError::vcs(format!("cannot resolve '{}'", to)))?;
        let hidden = state.ancestors(&from);
        let shown = state.ancestors(&to);
        Ok(state
            .commits
            .iter()
            .rev()
            .filter(|commit| shown.contains(&commit.id) && !hidden.contains(&commit.id))
            .map(|commit| {
                format!(
                    "{}{sep}{}{sep}{}",
                    commit.date,
                    commit.author,
                    commit.message.lines().next().unwrap_or(""),
                    sep = separator
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_mock_is_unborn_master() {
        let mock = MockBackend::new();
        assert_eq!(mock.head().unwrap(), HeadState::Unborn("master".to_string()));
        assert!(mock.local_branches().unwrap().is_empty());
    }

    #[test]
    fn test_commit_advances_branch() {
        let mock = MockBackend::new();
        let first = mock.commit("one");
        let second = mock.commit("two");
        assert_eq!(mock.resolve_commit("master").unwrap(), Some(second.clone()));
        assert_eq!(mock.state().find(&second).unwrap().parents, vec![first]);
    }

    #[test]
    fn test_fetch_populates_tracking_refs() {
        let mock = MockBackend::new();
        let id = mock.commit("one");
        mock.add_remote("origin", "https://example.com/repo.git");
        mock.add_remote_branch("origin", "develop", &id);
        assert!(mock.remote_branches("origin").unwrap().is_empty());

        mock.fetch("origin", false).unwrap();
        assert_eq!(
            mock.remote_branches("origin").unwrap(),
            vec!["origin/develop".to_string()]
        );
    }

    #[test]
    fn test_rejected_push_reports_reason() {
        let mock = MockBackend::new();
        mock.commit("one");
        mock.add_remote("origin", "u");
        mock.reject_pushes("origin", "non-fast-forward");
        let updates = mock
            .push("origin", &["refs/heads/master:refs/heads/master".to_string()])
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].is_error());
    }

    #[test]
    fn test_merge_fast_forwards_when_allowed() {
        let mock = MockBackend::new();
        mock.commit("base");
        mock.checkout_new_branch("feature").unwrap();
        let tip = mock.commit("work");
        mock.checkout_branch("master").unwrap();

        let merged = mock.merge("feature", &MergePolicy::default()).unwrap();
        assert_eq!(merged, tip);
    }

    #[test]
    fn test_merge_without_fastforward_creates_merge_commit() {
        let mock = MockBackend::new();
        let base = mock.commit("base");
        mock.checkout_new_branch("feature").unwrap();
        let tip = mock.commit("work");
        mock.checkout_branch("master").unwrap();

        let policy = MergePolicy {
            fastforward: false,
            ..MergePolicy::default()
        };
        let merged = mock.merge("feature", &policy).unwrap();
        assert_eq!(mock.state().find(&merged).unwrap().parents, vec![base, tip]);
    }

    #[test]
    fn test_log_excludes_commits_reachable_from_start() {
        let mock = MockBackend::new();
        let start = mock.commit("one");
        mock.commit("two");
        mock.commit("three");
        let lines = mock.log(&start, "HEAD", "|").unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("|three"));
        assert!(lines[1].ends_with("|two"));
    }
}
