use crate::error::{Result, StratusError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory and the user config directory
pub const CONFIG_FILE_NAME: &str = "stratus.toml";

/// Represents the complete configuration for stratus.
///
/// Contains the gitflow branch layout, version token settings and the fallback
/// commit identity.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct StratusConfig {
    #[serde(default)]
    pub gitflow: GitflowConfig,

    #[serde(default)]
    pub versioning: VersioningConfig,

    #[serde(default)]
    pub identity: IdentityConfig,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_master_branch() -> String {
    "master".to_string()
}

fn default_develop_branch() -> String {
    "develop".to_string()
}

fn default_feature_prefix() -> String {
    "feature/".to_string()
}

fn default_release_prefix() -> String {
    "release/".to_string()
}

fn default_tag_branch_prefix() -> String {
    "tag/".to_string()
}

/// Branch layout of the repository.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GitflowConfig {
    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_master_branch")]
    pub master_branch: String,

    #[serde(default = "default_develop_branch")]
    pub develop_branch: String,

    #[serde(default = "default_feature_prefix")]
    pub feature_branch_prefix: String,

    #[serde(default = "default_release_prefix")]
    pub release_branch_prefix: String,

    /// Prefix of the branch created when checking out a tag onto a branch
    #[serde(default = "default_tag_branch_prefix")]
    pub tag_branch_prefix: String,
}

impl Default for GitflowConfig {
    fn default() -> Self {
        GitflowConfig {
            remote: default_remote(),
            master_branch: default_master_branch(),
            develop_branch: default_develop_branch(),
            feature_branch_prefix: default_feature_prefix(),
            release_branch_prefix: default_release_prefix(),
            tag_branch_prefix: default_tag_branch_prefix(),
        }
    }
}

impl GitflowConfig {
    pub fn feature_branch(&self, name: &str) -> String {
        format!("{}{}", self.feature_branch_prefix, name)
    }

    pub fn release_branch(&self, version: &str) -> String {
        format!("{}{}", self.release_branch_prefix, version)
    }

    pub fn tag_branch(&self, tag: &str) -> String {
        format!("{}{}", self.tag_branch_prefix, tag)
    }
}

fn default_pre_token() -> String {
    "pre".to_string()
}

fn default_build_token() -> String {
    "build".to_string()
}

fn default_dev_token() -> String {
    "dev".to_string()
}

fn default_date_token() -> String {
    "date".to_string()
}

/// Namespace tokens used when bumping prerelease and build metadata.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VersioningConfig {
    #[serde(default = "default_pre_token")]
    pub pre_token: String,

    #[serde(default = "default_build_token")]
    pub build_token: String,

    #[serde(default = "default_dev_token")]
    pub dev_token: String,

    #[serde(default = "default_date_token")]
    pub date_token: String,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        VersioningConfig {
            pre_token: default_pre_token(),
            build_token: default_build_token(),
            dev_token: default_dev_token(),
            date_token: default_date_token(),
        }
    }
}

fn default_identity_name() -> String {
    "stratus".to_string()
}

fn default_identity_email() -> String {
    "stratus@localhost".to_string()
}

/// Commit identity used when the repository has no `user.name`/`user.email`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_name")]
    pub name: String,

    #[serde(default = "default_identity_email")]
    pub email: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            name: default_identity_name(),
            email: default_identity_email(),
        }
    }
}

/// Returns the user-level config file location, if a config dir is known.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stratus").join(CONFIG_FILE_NAME))
}

/// Parses configuration from TOML text.
pub fn parse_config(text: &str) -> Result<StratusConfig> {
    toml::from_str(text).map_err(|e| StratusError::config(e.to_string()))
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `stratus.toml` in current directory
/// 3. `<config dir>/stratus/stratus.toml` in user config directory
/// 4. Default configuration if no file found
///
/// # Returns
/// * `Ok(StratusConfig)` - Loaded or default configuration
/// * `Err` - If an explicit path is missing, or a file cannot be read or parsed
pub fn load_config(config_path: Option<&str>) -> Result<StratusConfig> {
    let path = match config_path {
        Some(path) => PathBuf::from(path),
        None => match discover_config_file() {
            Some(path) => path,
            None => return Ok(StratusConfig::default()),
        },
    };

    let text = fs::read_to_string(&path).map_err(|e| {
        StratusError::config(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_config(&text)
}

fn discover_config_file() -> Option<PathBuf> {
    let local = Path::new(".").join(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    user_config_path().filter(|path| path.exists())
}
