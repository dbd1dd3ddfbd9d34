use thiserror::Error;

/// Unified error type for stratus repository operations
#[derive(Error, Debug)]
pub enum StratusError {
    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("HEAD is detached: cannot {0} without a checked-out branch")]
    DetachedHead(String),

    #[error("Tag '{tag}' already exists (requested on branch '{branch}')")]
    TagExists { tag: String, branch: String },

    #[error("Tag not found: {0}")]
    TagNotFound(String),

    #[error("Remote not found: {0}")]
    RemoteNotFound(String),

    #[error("Push to '{remote}' failed: {detail}")]
    RemotePush { remote: String, detail: String },

    #[error("Pull from '{remote}' failed: {detail}")]
    RemotePull { remote: String, detail: String },

    #[error("Merge of '{source_branch}' into '{target}' has conflicts in: {}", .paths.join(", "))]
    MergeConflict {
        source_branch: String,
        target: String,
        paths: Vec<String>,
    },

    #[error("Malformed log line (expected 3 fields, found {fields}): {line:?}")]
    MalformedLog { line: String, fields: usize },

    #[error("Git operation failed: {0}")]
    VcsOperation(String),

    /// The switch back to the previously active branch failed. `original`
    /// holds the failure of the scoped work itself, if there was one.
    #[error("Failed to restore branch '{branch}': {source}{}", .original.as_ref().map(|e| format!(" (after: {})", e)).unwrap_or_default())]
    BranchRestore {
        branch: String,
        source: Box<StratusError>,
        original: Option<Box<StratusError>>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Version error: {0}")]
    Version(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in stratus
pub type Result<T> = std::result::Result<T, StratusError>;

impl StratusError {
    /// Create a VCS operation error with context
    pub fn vcs(msg: impl Into<String>) -> Self {
        StratusError::VcsOperation(msg.into())
    }

    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        StratusError::Config(msg.into())
    }

    /// Create a version error with context
    pub fn version(msg: impl Into<String>) -> Self {
        StratusError::Version(msg.into())
    }
}

impl From<git2::Error> for StratusError {
    fn from(err: git2::Error) -> Self {
        StratusError::VcsOperation(err.message().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StratusError::config("bad section");
        assert_eq!(err.to_string(), "Configuration error: bad section");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StratusError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_error_from_git2() {
        let git_err = git2::Error::from_str("reference not found");
        let err: StratusError = git_err.into();
        assert!(matches!(err, StratusError::VcsOperation(_)));
        assert!(err.to_string().contains("reference not found"));
    }

    #[test]
    fn test_tag_exists_message() {
        let err = StratusError::TagExists {
            tag: "v1.0.0".to_string(),
            branch: "master".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("v1.0.0"));
        assert!(msg.contains("master"));
    }

    #[test]
    fn test_merge_conflict_lists_paths() {
        let err = StratusError::MergeConflict {
            source_branch: "feature/x".to_string(),
            target: "develop".to_string(),
            paths: vec!["a.txt".to_string(), "b.txt".to_string()],
        };
        assert!(err.to_string().ends_with("a.txt, b.txt"));
    }

    #[test]
    fn test_branch_restore_keeps_both_causes() {
        let err = StratusError::BranchRestore {
            branch: "develop".to_string(),
            source: Box::new(StratusError::vcs("checkout blocked")),
            original: Some(Box::new(StratusError::vcs("work failed"))),
        };
        let msg = err.to_string();
        assert!(msg.contains("checkout blocked"));
        assert!(msg.contains("work failed"));

        let without_original = StratusError::BranchRestore {
            branch: "develop".to_string(),
            source: Box::new(StratusError::vcs("checkout blocked")),
            original: None,
        };
        assert!(!without_original.to_string().contains("after:"));
    }

    #[test]
    fn test_malformed_log_message() {
        let err = StratusError::MalformedLog {
            line: "only one field".to_string(),
            fields: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("found 1"));
        assert!(msg.contains("only one field"));
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let error_pairs = vec![
            (StratusError::config("x"), "Configuration error"),
            (StratusError::version("x"), "Version error"),
            (StratusError::vcs("x"), "Git operation failed"),
            (StratusError::RepoNotFound("x".into()), "Repository not found"),
        ];

        for (err, expected_prefix) in error_pairs {
            let msg = err.to_string();
            assert!(
                msg.starts_with(expected_prefix),
                "Error message should start with '{}', but got '{}'",
                expected_prefix,
                msg
            );
        }
    }
}
