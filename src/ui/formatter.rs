//! Pure formatting functions for UI output.
//!
//! Functions here only print; they never query the repository themselves.

use crate::git::HeadState;
use crate::repo::{BranchInfo, BranchInit, ReleaseNote};
use console::style;

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Describe where HEAD points
pub fn format_head(head: &HeadState) -> String {
    match head {
        HeadState::Branch(name) => format!("on branch {}", name),
        HeadState::Unborn(name) => format!("on branch {} (no commits yet)", name),
        HeadState::Detached(id) => format!("HEAD detached at {}", short_id(id)),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// One line per branch: name, where it exists, and what it tracks
pub fn format_branch(branch: &BranchInfo) -> String {
    let location = match (branch.local, branch.remote) {
        (true, true) => "local+remote",
        (true, false) => "local",
        (false, true) => "remote",
        (false, false) => "-",
    };
    match &branch.upstream {
        Some(upstream) => format!("{:<30} {:<13} -> {}", branch.name, location, upstream),
        None => format!("{:<30} {}", branch.name, location),
    }
}

/// Display repository status: HEAD, working tree and branches.
pub fn display_repo_status(head: &HeadState, dirty: bool, branches: &[BranchInfo]) {
    println!("\n{}", style(format_head(head)).bold());
    if dirty {
        println!("  {}", style("uncommitted changes in tracked files").yellow());
    }
    println!("{}", style("Branches:").underlined());
    for branch in branches {
        let line = format_branch(branch);
        if head.branch_name() == Some(branch.name.as_str()) {
            println!("* {}", style(line).green());
        } else {
            println!("  {}", line);
        }
    }
}

/// Summarize what branch initialization did
pub fn format_branch_init(branch: &str, outcome: &BranchInit) -> String {
    if outcome.is_noop() {
        return format!("Branch '{}' is already initialized", branch);
    }
    let mut steps = Vec::new();
    if outcome.created_locally {
        steps.push("created".to_string());
    }
    if let Some(sha) = &outcome.initial_commit {
        steps.push(format!("initial commit {}", short_id(sha)));
    }
    if outcome.pushed {
        steps.push("pushed".to_string());
    }
    if outcome.tracking_set {
        steps.push("tracking set".to_string());
    }
    format!("Branch '{}': {}", branch, steps.join(", "))
}

/// Print release notes, one commit per line.
pub fn display_release_notes(start: &str, end: &str, notes: &[ReleaseNote]) {
    println!(
        "\n{}",
        style(format!("Changes from {} to {}", start, end)).bold()
    );
    if notes.is_empty() {
        println!("  (no commits)");
        return;
    }
    for note in notes {
        println!("{}", format_release_note(note));
    }
}

pub fn format_release_note(note: &ReleaseNote) -> String {
    format!("  {}  {:<20} {}", note.date, note.author, note.message)
}

/// Display the version before and after a bump.
pub fn display_version_change(old: &str, new: &str) {
    println!(
        "{} {} {} {}",
        style("Version:").bold(),
        old,
        style("->").dim(),
        style(new).green()
    );
}
