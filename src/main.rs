use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use stratus::config::{self, GitflowConfig, StratusConfig};
use stratus::git::{Git2Backend, MergePolicy};
use stratus::logging;
use stratus::repo::{PackageRepo, TagCheckout};
use stratus::ui;
use stratus::version::PackageVersion;

#[derive(Parser)]
#[command(
    name = "stratus",
    version,
    about = "Branch, merge and release orchestration for git repositories"
)]
struct Args {
    #[arg(short, long, global = true, help = "Custom configuration file path")]
    config: Option<String>,

    #[arg(long, global = true, help = "Repository directory (default: current directory)")]
    repo: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the next version from a version string
    Version {
        current: String,
        #[arg(value_enum)]
        bump: Bump,
        #[arg(long, help = "Namespace token for prerelease/build bumps")]
        token: Option<String>,
        #[arg(long, help = "Date identifier for dated releases (default: today)")]
        date: Option<String>,
    },

    #[command(flatten)]
    Repo(RepoCommand),
}

/// Commands that work on the repository
#[derive(Subcommand)]
enum RepoCommand {
    /// Show HEAD, working tree state and branches
    Status,

    /// Make sure a branch exists locally and remotely, with tracking
    InitBranch {
        #[arg(help = "Branch name (default: configured develop branch)")]
        branch: Option<String>,
        #[arg(long, conflicts_with_all = ["branch", "release"], help = "Name of a feature branch")]
        feature: Option<String>,
        #[arg(long, conflicts_with = "branch", help = "Version of a release branch")]
        release: Option<String>,
        #[arg(long)]
        remote: Option<String>,
    },

    /// Merge one branch into another
    Merge {
        source: String,
        #[arg(help = "Target branch (default: configured develop branch)")]
        target: Option<String>,
        #[arg(long, help = "Pull the target branch from this remote first")]
        remote: Option<String>,
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long)]
        strategy_option: Option<String>,
        #[arg(long, help = "Always create a merge commit")]
        no_ff: bool,
    },

    /// Tag the tip of the master branch
    Tag {
        tag: String,
        #[arg(long, help = "Branch to tag (default: configured master branch)")]
        branch: Option<String>,
        #[arg(long, help = "Push the tag to this remote")]
        remote: Option<String>,
        #[arg(long, help = "Move the tag if it already exists")]
        force: bool,
        #[arg(short, long, help = "Skip confirmation prompts")]
        yes: bool,
    },

    /// Fetch tags and check out a tag
    CheckoutTag {
        tag: String,
        #[arg(long)]
        remote: Option<String>,
        #[arg(long, conflicts_with = "detach", help = "Branch to check the tag out onto")]
        branch: Option<String>,
        #[arg(long, help = "Leave HEAD detached at the tag")]
        detach: bool,
    },

    /// List the commits between two tags
    Notes { start: String, end: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Bump {
    Major,
    Minor,
    Patch,
    Prerelease,
    Build,
    Dev,
    Dated,
    Finalize,
}

fn main() {
    let args = Args::parse();
    logging::init(args.verbose);

    if let Err(e) = run(args) {
        ui::display_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = config::load_config(args.config.as_deref()).context("loading configuration")?;

    match args.command {
        Command::Version {
            current,
            bump,
            token,
            date,
        } => bump_version(&config, &current, bump, token.as_deref(), date.as_deref()),
        Command::Repo(command) => {
            let repo = PackageRepo::open(args.repo.as_deref(), &config)?;
            run_on_repo(&repo, &config, command)
        }
    }
}

fn bump_version(
    config: &StratusConfig,
    current: &str,
    bump: Bump,
    token: Option<&str>,
    date: Option<&str>,
) -> Result<()> {
    let mut version = PackageVersion::parse_with(current, &config.versioning)?;
    let next = match bump {
        Bump::Major => version.bump_major()?,
        Bump::Minor => version.bump_minor()?,
        Bump::Patch => version.bump_patch()?,
        Bump::Prerelease => version.bump_prerelease(token)?,
        Bump::Build => version.bump_build(token)?,
        Bump::Dev => version.new_dev_release()?,
        Bump::Dated => version.new_dated_release(date)?,
        Bump::Finalize => version.finalize()?,
    };
    ui::display_version_change(current, &next);
    Ok(())
}

/// Branch named on the command line, or the gitflow branch the flags point at
fn init_target(
    gitflow: &GitflowConfig,
    branch: Option<String>,
    feature: Option<&str>,
    release: Option<&str>,
) -> String {
    match (branch, feature, release) {
        (Some(branch), _, _) => branch,
        (None, Some(feature), _) => gitflow.feature_branch(feature),
        (None, None, Some(version)) => gitflow.release_branch(version),
        (None, None, None) => gitflow.develop_branch.clone(),
    }
}

fn run_on_repo(
    repo: &PackageRepo<Git2Backend>,
    config: &StratusConfig,
    command: RepoCommand,
) -> Result<()> {
    let gitflow = &config.gitflow;
    match command {
        RepoCommand::Status => {
            let head = repo.head_state()?;
            let dirty = repo.has_uncommitted_changes()?;
            let remote = repo
                .remote_exists(&gitflow.remote)?
                .then_some(gitflow.remote.as_str());
            let branches = repo.branches(remote)?;
            ui::display_repo_status(&head, dirty, &branches);
        }
        RepoCommand::InitBranch {
            branch,
            feature,
            release,
            remote,
        } => {
            let branch = init_target(gitflow, branch, feature.as_deref(), release.as_deref());
            let remote = remote.as_deref().unwrap_or(&gitflow.remote);
            ui::display_status(&format!("Initializing branch '{}'...", branch));
            let outcome = repo.initialize_branch(&branch, remote)?;
            ui::display_success(&ui::format_branch_init(&branch, &outcome));
        }
        RepoCommand::Merge {
            source,
            target,
            remote,
            strategy,
            strategy_option,
            no_ff,
        } => {
            let target = target.unwrap_or_else(|| gitflow.develop_branch.clone());
            let policy = MergePolicy {
                strategy,
                strategy_option,
                fastforward: !no_ff,
            };
            let tip = repo.merge(&source, &target, remote.as_deref(), &policy)?;
            ui::display_success(&format!(
                "Merged '{}' into '{}' (now at {})",
                source, target, tip
            ));
        }
        RepoCommand::Tag {
            tag,
            branch,
            remote,
            force,
            yes,
        } => {
            let branch = branch.as_deref().unwrap_or(&gitflow.master_branch);
            if force
                && !yes
                && repo.tag_exists(&tag)?
                && !ui::confirm_action(&format!("Tag '{}' exists. Move it to '{}'?", tag, branch))?
            {
                println!("Operation cancelled by user.");
                return Ok(());
            }
            let created = repo.tag_release(&tag, branch, remote.as_deref(), force)?;
            ui::display_success(&format!("Tagged {} as '{}'", created.commit, created.name));
        }
        RepoCommand::CheckoutTag {
            tag,
            remote,
            branch,
            detach,
        } => {
            let remote = remote.as_deref().unwrap_or(&gitflow.remote);
            let checkout = if detach {
                TagCheckout::Detached
            } else {
                TagCheckout::OntoBranch(branch)
            };
            let head = repo.update_to_tag(&tag, remote, checkout)?;
            ui::display_success(&format!(
                "Checked out '{}': {}",
                tag,
                ui::formatter::format_head(&head)
            ));
        }
        RepoCommand::Notes { start, end } => {
            let notes = repo.release_notes(&start, &end)?;
            ui::display_release_notes(&start, &end, &notes);
        }
    }
    Ok(())
}
