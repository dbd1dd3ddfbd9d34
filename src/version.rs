use crate::config::VersioningConfig;
use crate::error::{Result, StratusError};
use chrono::Local;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Today's date as a compact `YYYYMMDD` identifier
pub fn today() -> String {
    Local::now().format("%Y%m%d").to_string()
}

fn next_number(n: u64, what: &str) -> Result<u64> {
    n.checked_add(1)
        .ok_or_else(|| StratusError::version(format!("{} {} cannot be incremented", what, n)))
}

/// Increment the last number in `identifier`, appending `.1` if it has none
fn increment_identifier(identifier: &str) -> Result<String> {
    let last_number =
        Regex::new(r"(\d+)(\D*)$").map_err(|e| StratusError::version(e.to_string()))?;
    match last_number.captures(identifier) {
        Some(caps) => {
            let digits = &caps[1];
            let current = digits
                .parse::<u64>()
                .map_err(|e| StratusError::version(format!("{}: {}", identifier, e)))?;
            let next = next_number(current, identifier)?;
            let start = caps.get(1).map_or(0, |m| m.start());
            Ok(format!("{}{}{}", &identifier[..start], next, &caps[2]))
        }
        None => Ok(format!("{}.1", identifier)),
    }
}

/// Namespace of a dotted identifier (`pre` in `pre.2`), if it has one
fn namespace(identifier: &str) -> Option<&str> {
    match identifier.split_once('.') {
        Some((head, _)) if !head.chars().all(|c| c.is_ascii_digit()) => Some(head),
        _ => None,
    }
}

/// Identifier without its namespace (`2` in `pre.2`)
fn value(identifier: &str) -> &str {
    match namespace(identifier) {
        Some(head) => &identifier[head.len() + 1..],
        None => identifier,
    }
}

/// A package's semantic version with bump transitions
///
/// Prerelease and build metadata are kept as full dotted identifiers such as
/// `pre.2` or `build.5`. The leading part is the namespace token used by
/// [PackageVersion::bump_prerelease] and [PackageVersion::bump_build].
///
/// Every transition mutates the version and returns its new string form.
/// A transition that would produce an invalid version leaves the value
/// untouched and returns an error.
///
/// # Example
/// ```
/// use stratus::version::PackageVersion;
///
/// let mut version: PackageVersion = "1.2.3".parse().unwrap();
/// assert_eq!(version.bump_minor().unwrap(), "1.3.0");
/// assert_eq!(version.patch(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct PackageVersion {
    major: u64,
    minor: u64,
    patch: u64,
    prerelease: Option<String>,
    build: Option<String>,
    pre_token: String,
    build_token: String,
    dev_token: String,
    date_token: String,
}

impl PackageVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        let tokens = VersioningConfig::default();
        PackageVersion {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
            pre_token: tokens.pre_token,
            build_token: tokens.build_token,
            dev_token: tokens.dev_token,
            date_token: tokens.date_token,
        }
    }

    /// Parse `version` using the namespace tokens from configuration
    pub fn parse_with(version: &str, tokens: &VersioningConfig) -> Result<Self> {
        Ok(version.parse::<PackageVersion>()?.with_tokens(tokens))
    }

    pub fn with_tokens(mut self, tokens: &VersioningConfig) -> Self {
        self.pre_token = tokens.pre_token.clone();
        self.build_token = tokens.build_token.clone();
        self.dev_token = tokens.dev_token.clone();
        self.date_token = tokens.date_token.clone();
        self
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    /// Prerelease value without its namespace: `2` for `3.4.5-pre.2`
    pub fn prerelease(&self) -> Option<&str> {
        self.prerelease.as_deref().map(value)
    }

    /// Full prerelease identifier: `pre.2` for `3.4.5-pre.2`
    pub fn prerelease_identifier(&self) -> Option<&str> {
        self.prerelease.as_deref()
    }

    pub fn prerelease_namespace(&self) -> Option<&str> {
        self.prerelease.as_deref().and_then(namespace)
    }

    /// Build value without its namespace: `5` for `1.0.0+build.5`
    pub fn build(&self) -> Option<&str> {
        self.build.as_deref().map(value)
    }

    pub fn build_identifier(&self) -> Option<&str> {
        self.build.as_deref()
    }

    pub fn build_namespace(&self) -> Option<&str> {
        self.build.as_deref().and_then(namespace)
    }

    pub fn prerelease_token(&self) -> &str {
        &self.pre_token
    }

    /// Namespace used by [PackageVersion::bump_build] when no token is given
    pub fn build_token(&self) -> &str {
        &self.build_token
    }

    pub fn is_release(&self) -> bool {
        self.prerelease.is_none() && self.build.is_none()
    }

    pub fn to_semver(&self) -> Result<semver::Version> {
        semver::Version::parse(&self.to_string())
            .map_err(|e| StratusError::version(format!("{}: {}", self, e)))
    }

    /// Validate `next` and make it the current state
    fn transition(&mut self, next: PackageVersion) -> Result<String> {
        let canonical = next.to_semver()?;
        self.major = canonical.major;
        self.minor = canonical.minor;
        self.patch = canonical.patch;
        self.prerelease = non_empty(canonical.pre.as_str());
        self.build = non_empty(canonical.build.as_str());
        self.pre_token = next.pre_token;
        self.build_token = next.build_token;
        Ok(self.to_string())
    }

    fn release_of(&self, major: u64, minor: u64, patch: u64) -> PackageVersion {
        PackageVersion {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
            ..self.clone()
        }
    }

    pub fn bump_major(&mut self) -> Result<String> {
        let next = self.release_of(next_number(self.major, "major version")?, 0, 0);
        self.transition(next)
    }

    pub fn bump_minor(&mut self) -> Result<String> {
        let next = self.release_of(self.major, next_number(self.minor, "minor version")?, 0);
        self.transition(next)
    }

    pub fn bump_patch(&mut self) -> Result<String> {
        let patch = next_number(self.patch, "patch version")?;
        let next = self.release_of(self.major, self.minor, patch);
        self.transition(next)
    }

    /// Increment the prerelease in the `token` namespace (default: the
    /// prerelease token), starting at `token.1` when there is none
    ///
    /// A prerelease in a different namespace is replaced. Build metadata is
    /// dropped.
    pub fn bump_prerelease(&mut self, token: Option<&str>) -> Result<String> {
        let token = token.unwrap_or(&self.pre_token).to_string();
        let prerelease = match self.prerelease.as_deref() {
            Some(current) if self.prerelease_namespace().map_or(true, |ns| ns == token) => {
                increment_identifier(current)?
            }
            _ => format!("{}.1", token),
        };
        let next = PackageVersion {
            prerelease: Some(prerelease),
            build: None,
            ..self.clone()
        };
        self.transition(next)
    }

    /// Increment the build metadata in the `token` namespace, starting at
    /// `token.1` when there is none
    ///
    /// A given `token` becomes the default for later build bumps.
    pub fn bump_build(&mut self, token: Option<&str>) -> Result<String> {
        let token = token.unwrap_or(&self.build_token).to_string();
        let build = match self.build.as_deref() {
            Some(current) if self.build_namespace().map_or(true, |ns| ns == token) => {
                increment_identifier(current)?
            }
            _ => format!("{}.1", token),
        };
        let next = PackageVersion {
            build: Some(build),
            build_token: token,
            ..self.clone()
        };
        self.transition(next)
    }

    /// Drop prerelease and build metadata
    pub fn finalize(&mut self) -> Result<String> {
        let next = self.release_of(self.major, self.minor, self.patch);
        self.transition(next)
    }

    /// Bump the build metadata in the development namespace
    pub fn new_dev_release(&mut self) -> Result<String> {
        let token = self.dev_token.clone();
        self.bump_build(Some(&token))
    }

    /// Set build metadata to `<date token>.<date_id>`, `date_id` defaulting
    /// to today as `YYYYMMDD`
    pub fn new_dated_release(&mut self, date_id: Option<&str>) -> Result<String> {
        let date_id = date_id.map(str::to_string).unwrap_or_else(today);
        let next = PackageVersion {
            build: Some(format!("{}.{}", self.date_token, date_id)),
            ..self.clone()
        };
        self.transition(next)
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl From<semver::Version> for PackageVersion {
    fn from(version: semver::Version) -> Self {
        let mut package = PackageVersion::new(version.major, version.minor, version.patch);
        package.prerelease = non_empty(version.pre.as_str());
        package.build = non_empty(version.build.as_str());
        package
    }
}

impl FromStr for PackageVersion {
    type Err = StratusError;

    /// Parse a semantic version, allowing a leading `v`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        semver::Version::parse(trimmed)
            .map(PackageVersion::from)
            .map_err(|e| StratusError::version(format!("invalid version '{}': {}", s, e)))
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major
            && self.minor == other.minor
            && self.patch == other.patch
            && self.prerelease == other.prerelease
            && self.build == other.build
    }
}

impl Eq for PackageVersion {}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_bump_minor_resets_patch() {
        let mut version = v("1.2.3");
        assert_eq!(version.bump_minor().unwrap(), "1.3.0");
        assert_eq!(version.patch(), 0);
    }

    #[test]
    fn test_prerelease_fields() {
        let mut version = v("3.4.5-pre.2+build.1");
        assert_eq!(
            (version.major(), version.minor(), version.patch()),
            (3, 4, 5)
        );
        assert_eq!(version.prerelease(), Some("2"));
        assert_eq!(version.prerelease_namespace(), Some("pre"));
        assert_eq!(version.prerelease_identifier(), Some("pre.2"));
        assert_eq!(version.build(), Some("1"));
        assert_eq!(version.build_identifier(), Some("build.1"));
        assert_eq!(version.build_namespace(), Some("build"));
        assert_eq!(version.finalize().unwrap(), "3.4.5");
        assert_eq!(version.prerelease(), None);
    }

    #[test]
    fn test_bump_major_and_patch() {
        let mut version = v("3.4.5-pre.2+build.1");
        assert_eq!(version.bump_major().unwrap(), "4.0.0");
        assert_eq!(version.bump_patch().unwrap(), "4.0.1");
        assert!(version.is_release());
    }

    #[test]
    fn test_bump_prerelease() {
        let mut version = v("1.0.0");
        assert_eq!(version.bump_prerelease(None).unwrap(), "1.0.0-pre.1");
        assert_eq!(version.bump_prerelease(None).unwrap(), "1.0.0-pre.2");
        assert_eq!(version.bump_prerelease(Some("rc")).unwrap(), "1.0.0-rc.1");
        assert_eq!(version.bump_prerelease(Some("rc")).unwrap(), "1.0.0-rc.2");
    }

    #[test]
    fn test_bump_build_remembers_token() {
        let mut version = v("1.0.0");
        assert_eq!(version.bump_build(None).unwrap(), "1.0.0+build.1");
        assert_eq!(version.bump_build(Some("ci")).unwrap(), "1.0.0+ci.1");
        assert_eq!(version.build_token(), "ci");
        assert_eq!(version.bump_build(None).unwrap(), "1.0.0+ci.2");
    }

    #[test]
    fn test_dev_release() {
        let mut version = v("2.3.1");
        assert_eq!(version.new_dev_release().unwrap(), "2.3.1+dev.1");
        assert_eq!(version.new_dev_release().unwrap(), "2.3.1+dev.2");
    }

    #[test]
    fn test_dated_release_overwrites_build() {
        let mut version = v("2.3.1+dev.4");
        assert_eq!(
            version.new_dated_release(Some("20240102")).unwrap(),
            "2.3.1+date.20240102"
        );
        assert_eq!(
            version.new_dated_release(Some("20240103")).unwrap(),
            "2.3.1+date.20240103"
        );
    }

    #[test]
    fn test_dated_release_defaults_to_today() {
        let mut version = v("1.0.0");
        let s = version.new_dated_release(None).unwrap();
        assert_eq!(s, format!("1.0.0+date.{}", today()));
        assert_eq!(today().len(), 8);
    }

    #[test]
    fn test_tokens_from_config() {
        let tokens = VersioningConfig {
            pre_token: "alpha".to_string(),
            dev_token: "snapshot".to_string(),
            ..VersioningConfig::default()
        };
        let mut version = PackageVersion::parse_with("1.0.0", &tokens).unwrap();
        assert_eq!(version.bump_prerelease(None).unwrap(), "1.0.0-alpha.1");
        assert_eq!(version.new_dev_release().unwrap(), "1.0.0-alpha.1+snapshot.1");
    }

    #[test]
    fn test_round_trip() {
        for s in [
            "0.0.0",
            "1.2.3",
            "3.4.5-pre.2",
            "1.0.0-rc.1+build.7",
            "10.20.30+date.20240102",
            "1.0.0-alpha-1.x.7",
        ] {
            let parsed = v(s);
            assert_eq!(parsed.to_string(), s);
            assert_eq!(v(&parsed.to_string()), parsed);
        }
    }

    #[test]
    fn test_invalid_versions() {
        assert!("1.2".parse::<PackageVersion>().is_err());
        assert!("one.two.three".parse::<PackageVersion>().is_err());
        assert!("-1.0.0".parse::<PackageVersion>().is_err());
    }

    #[test]
    fn test_leading_v_is_accepted() {
        assert_eq!(v("v1.2.3"), PackageVersion::new(1, 2, 3));
    }

    #[test]
    fn test_increment_identifier() {
        assert_eq!(increment_identifier("pre.9").unwrap(), "pre.10");
        assert_eq!(increment_identifier("rc1").unwrap(), "rc2");
        assert_eq!(increment_identifier("beta").unwrap(), "beta.1");
    }

    #[test]
    fn test_bump_at_u64_max_is_an_error() {
        let mut version = v("18446744073709551615.0.0");
        assert!(matches!(version.bump_major(), Err(StratusError::Version(_))));
        assert_eq!(version.to_string(), "18446744073709551615.0.0");

        let mut version = v("1.18446744073709551615.18446744073709551615");
        assert!(version.bump_minor().is_err());
        assert!(version.bump_patch().is_err());
        assert_eq!(version.bump_major().unwrap(), "2.0.0");
    }

    #[test]
    fn test_prerelease_at_u64_max_is_an_error() {
        let mut version = v("1.0.0-pre.18446744073709551615");
        assert!(version.bump_prerelease(None).is_err());
        assert_eq!(version.to_string(), "1.0.0-pre.18446744073709551615");
        assert!(increment_identifier("build.18446744073709551615").is_err());
    }
}
