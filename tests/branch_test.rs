mod common;

use common::*;
use stratus::git::{HeadState, VcsBackend};
use stratus::repo::BranchScope;
use stratus::StratusError;

#[test]
fn test_failed_scoped_work_restores_branch() {
    let fixture = fixture();
    let repo = &fixture.repo;

    let result: stratus::Result<()> = repo.on_branch("develop", BranchScope::local(), |r| {
        assert_eq!(r.active_branch()?.as_deref(), Some("develop"));
        commit_file(&fixture, "wip.txt", "half done\n", "wip");
        Err(StratusError::vcs("build failed"))
    });

    assert!(matches!(result, Err(StratusError::VcsOperation(_))));
    assert_eq!(repo.active_branch().unwrap().as_deref(), Some("master"));
    assert!(!fixture.work.path().join("wip.txt").exists());
}

#[test]
fn test_scoped_work_result_is_returned() {
    let fixture = fixture();
    let sha = fixture
        .repo
        .on_branch("develop", BranchScope::pushing("origin"), |_| {
            Ok(commit_file(&fixture, "CHANGES", "1.0\n", "changelog"))
        })
        .unwrap();

    assert_eq!(
        fixture.repo.backend().resolve_commit("develop").unwrap(),
        Some(sha)
    );
    assert_eq!(origin_branches(&fixture), vec!["develop", "master"]);
    assert_eq!(
        fixture.repo.active_branch().unwrap().as_deref(),
        Some("master")
    );
}

#[test]
fn test_set_active_branch_twice() {
    let fixture = fixture();
    fixture.repo.set_active_branch("develop").unwrap();
    fixture.repo.set_active_branch("develop").unwrap();
    assert_eq!(
        fixture.repo.head_state().unwrap(),
        HeadState::Branch("develop".to_string())
    );
    assert_eq!(fixture.repo.branches(None).unwrap().len(), 2);
}

#[test]
fn test_push_on_detached_head_is_rejected() {
    let fixture = fixture();
    let tip = fixture.repo.head_commit().unwrap().unwrap();
    fixture.repo.backend().checkout_detached(&tip).unwrap();

    assert!(fixture.repo.is_detached_head().unwrap());
    assert_eq!(fixture.repo.active_branch().unwrap(), None);
    assert!(matches!(
        fixture.repo.push("origin"),
        Err(StratusError::DetachedHead(_))
    ));
}

#[test]
fn test_push_to_missing_remote_is_none() {
    let fixture = fixture();
    assert_eq!(fixture.repo.push("upstream").unwrap(), None);
    assert!(matches!(
        fixture.repo.pull("upstream"),
        Err(StratusError::RemotePull { .. })
    ));
}

#[test]
fn test_checkout_remote_branch_with_tracking() {
    let fixture = fixture();
    fixture.repo.set_active_branch("develop").unwrap();
    let tip = commit_file(&fixture, "dev.txt", "dev\n", "develop work");
    fixture.repo.push("origin").unwrap();
    fixture.repo.set_active_branch("master").unwrap();
    fixture.repo.backend().create_branch("scratch", "master").unwrap();
    fixture.repo.set_active_branch("scratch").unwrap();

    // a fresh clone-like state: the local branch is gone, only origin has it
    let raw = git2::Repository::open(fixture.work.path()).unwrap();
    raw.find_branch("develop", git2::BranchType::Local)
        .unwrap()
        .delete()
        .unwrap();

    fixture
        .repo
        .checkout_remote_branch("develop", "origin", true, None)
        .unwrap();
    assert_eq!(fixture.repo.head_commit().unwrap(), Some(tip));
    assert_eq!(
        fixture.repo.backend().upstream("develop").unwrap().as_deref(),
        Some("origin/develop")
    );
    assert_eq!(read(&fixture.work, "dev.txt"), "dev\n");
}

#[test]
fn test_uncommitted_changes_ignore_untracked_files() {
    let fixture = fixture();
    write(&fixture.work, "untracked.txt", "new\n");
    assert!(!fixture.repo.has_uncommitted_changes().unwrap());

    write(&fixture.work, "README.md", "# changed\n");
    assert!(fixture.repo.has_uncommitted_changes().unwrap());
    assert_eq!(
        fixture.repo.committer().diffs().unwrap(),
        vec![std::path::PathBuf::from("README.md")]
    );
}

#[test]
fn test_remote_url() {
    let fixture = fixture();
    assert_eq!(
        fixture.repo.remote_url("origin").unwrap(),
        fixture.origin.path().to_str().unwrap()
    );
}
