#![allow(dead_code)]

use git2::{Repository, RepositoryInitOptions};
use std::fs;
use std::path::Path;
use stratus::config::{GitflowConfig, IdentityConfig};
use stratus::git::Git2Backend;
use stratus::repo::PackageRepo;
use tempfile::TempDir;

/// A working repository on `master` with a bare `origin` next to it
pub struct Fixture {
    pub work: TempDir,
    pub origin: TempDir,
    pub repo: PackageRepo<Git2Backend>,
}

fn configure_identity(repo: &Repository) {
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();
}

fn open(path: &Path) -> PackageRepo<Git2Backend> {
    let backend = Git2Backend::discover(path, IdentityConfig::default()).unwrap();
    PackageRepo::new(backend, GitflowConfig::default())
}

/// Repository with no commits and no remote
pub fn empty_repo() -> (TempDir, PackageRepo<Git2Backend>) {
    let work = TempDir::new().unwrap();
    let mut options = RepositoryInitOptions::new();
    options.initial_head("master");
    let repo = Repository::init_opts(work.path(), &options).unwrap();
    configure_identity(&repo);
    let package = open(work.path());
    (work, package)
}

/// Repository with one commit on `master`, pushed to a bare `origin`
pub fn fixture() -> Fixture {
    let (work, repo) = empty_repo();
    let origin = TempDir::new().unwrap();
    Repository::init_bare(origin.path()).unwrap();
    {
        let raw = Repository::open(work.path()).unwrap();
        raw.remote("origin", origin.path().to_str().unwrap())
            .unwrap();
    }
    write(&work, "README.md", "# package\n");
    let mut committer = repo.committer();
    committer.add_file("README.md");
    committer.commit("initial commit").unwrap();
    repo.push("origin").unwrap();
    Fixture { work, origin, repo }
}

pub fn write(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Commit `name` with `contents` on the active branch
pub fn commit_file(fixture: &Fixture, name: &str, contents: &str, message: &str) -> String {
    write(&fixture.work, name, contents);
    let mut committer = fixture.repo.committer();
    committer.add_file(name);
    committer.commit(message).unwrap()
}

pub fn read(dir: &TempDir, name: &str) -> String {
    fs::read_to_string(dir.path().join(name)).unwrap()
}

/// Branch names present in the bare origin
pub fn origin_branches(fixture: &Fixture) -> Vec<String> {
    let bare = Repository::open_bare(fixture.origin.path()).unwrap();
    let mut names = Vec::new();
    for entry in bare.branches(Some(git2::BranchType::Local)).unwrap() {
        let (branch, _) = entry.unwrap();
        names.push(branch.name().unwrap().unwrap().to_string());
    }
    names.sort();
    names
}
