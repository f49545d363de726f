//! Inclusion/exclusion policy and per-subtree compression.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Compression level hint carried in attribute records (0 = store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Compression(u8);

impl Compression {
    pub const NONE: Self = Self(0);
    pub const MAX: Self = Self(9);

    /// Create a level, clamping to 0..=9.
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    pub fn level(self) -> u8 {
        self.0
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self::MAX
    }
}

impl TryFrom<u8> for Compression {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        if level > 9 {
            return Err(format!("compression level {level} out of range 0-9"));
        }
        Ok(Self(level))
    }
}

impl From<Compression> for u8 {
    fn from(c: Compression) -> Self {
        c.0
    }
}

/// A directory include or exclude rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirRule {
    pub path: String,
    pub include: bool,
}

impl DirRule {
    pub fn include(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            include: true,
        }
    }

    pub fn exclude(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            include: false,
        }
    }
}

/// Compression level override for a directory subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionRule {
    pub path: String,
    pub level: Compression,
}

/// Immutable per-run inclusion policy.
#[derive(Debug, Clone, Default)]
pub struct InclusionPolicy {
    dirs: Vec<DirRule>,
    include_ext: Vec<String>,
    exclude_ext: Vec<String>,
    include_regex: Vec<Regex>,
    exclude_regex: Vec<Regex>,
    compression_rules: Vec<CompressionRule>,
    exclude_comp: Vec<String>,
}

/// Length of `dir` when `path` is `dir` itself or lies below it.
pub(crate) fn subdir_match(dir: &str, path: &str) -> Option<usize> {
    let trimmed = if dir.len() > 1 {
        dir.trim_end_matches('/')
    } else {
        dir
    };
    let rest = path.strip_prefix(trimmed)?;
    if rest.is_empty() || rest.starts_with('/') || trimmed.ends_with('/') {
        Some(trimmed.len())
    } else {
        None
    }
}

fn extension_of(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|e| e.to_str())
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, ScanError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| ScanError::InvalidPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

impl InclusionPolicy {
    /// Create a policy that includes everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a policy from its configured parts.
    pub fn from_parts(
        dirs: Vec<DirRule>,
        include_ext: Vec<String>,
        exclude_ext: Vec<String>,
        include_regex: &[String],
        exclude_regex: &[String],
    ) -> Result<Self, ScanError> {
        Ok(Self {
            dirs,
            include_ext,
            exclude_ext,
            include_regex: compile(include_regex)?,
            exclude_regex: compile(exclude_regex)?,
            ..Self::default()
        })
    }

    /// Set the compression override table and the uncompressed extensions.
    pub fn with_compression(
        mut self,
        rules: Vec<CompressionRule>,
        exclude_comp: Vec<String>,
    ) -> Self {
        self.compression_rules = rules;
        self.exclude_comp = exclude_comp;
        self
    }

    /// Directory rules in declaration order.
    pub fn dir_rules(&self) -> &[DirRule] {
        &self.dirs
    }

    fn ext_matches(list: &[String], path: &str) -> bool {
        extension_of(path).is_some_and(|ext| list.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Decide whether an entry takes part in the backup.
    pub fn is_included(&self, path: &str, top_level: bool) -> bool {
        if !top_level {
            if Self::ext_matches(&self.exclude_ext, path)
                || self.exclude_regex.iter().any(|r| r.is_match(path))
            {
                return false;
            }
            if (!self.include_ext.is_empty() || !self.include_regex.is_empty())
                && !Self::ext_matches(&self.include_ext, path)
                && !self.include_regex.iter().any(|r| r.is_match(path))
            {
                return false;
            }
        }

        if self.dirs.is_empty() {
            return true;
        }

        let mut best: Option<(usize, bool)> = None;
        for rule in &self.dirs {
            if let Some(len) = subdir_match(&rule.path, path) {
                if best.is_none_or(|(longest, _)| len >= longest) {
                    best = Some((len, rule.include));
                }
            }
        }
        best.is_some_and(|(_, include)| include)
    }

    /// Compression level for a file, honouring subtree overrides.
    pub fn compression_for(&self, path: &str, default: Compression) -> Compression {
        let mut best: Option<(usize, Compression)> = None;
        for rule in &self.compression_rules {
            if let Some(len) = subdir_match(&rule.path, path) {
                if best.is_none_or(|(longest, _)| len >= longest) {
                    best = Some((len, rule.level));
                }
            }
        }
        if let Some((_, level)) = best {
            return level;
        }
        if Self::ext_matches(&self.exclude_comp, path) {
            return Compression::NONE;
        }
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> InclusionPolicy {
        InclusionPolicy::from_parts(
            vec![
                DirRule::include("/home"),
                DirRule::exclude("/home/cache"),
                DirRule::include("/home/cache/keep"),
            ],
            vec![],
            vec!["LOG".into()],
            &[],
            &["\\.tmp$".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_longest_dir_rule_wins() {
        let p = policy();
        assert!(p.is_included("/home/a.txt", false));
        assert!(!p.is_included("/home/cache/x", false));
        assert!(p.is_included("/home/cache/keep/x", false));
        assert!(!p.is_included("/etc/passwd", false));
    }

    #[test]
    fn test_prefix_must_be_whole_component() {
        let p = policy();
        assert!(!p.is_included("/homework/a", false));
        assert!(p.is_included("/home", true));
    }

    #[test]
    fn test_exclusions_by_ext_and_regex() {
        let p = policy();
        assert!(!p.is_included("/home/b.log", false));
        assert!(!p.is_included("/home/c.tmp", false));
        assert!(p.is_included("/home/d.logs", false));
    }

    #[test]
    fn test_include_ext_restricts() {
        let p = InclusionPolicy::from_parts(vec![], vec!["jpg".into()], vec![], &[], &[]).unwrap();
        assert!(p.is_included("/x/a.JPG", false));
        assert!(!p.is_included("/x/a.png", false));
        assert!(p.is_included("/x", true));
    }

    #[test]
    fn test_equal_length_later_rule_wins() {
        let p = InclusionPolicy::from_parts(
            vec![DirRule::include("/a"), DirRule::exclude("/a")],
            vec![],
            vec![],
            &[],
            &[],
        )
        .unwrap();
        assert!(!p.is_included("/a/b", false));
    }

    #[test]
    fn test_invalid_regex() {
        let err = InclusionPolicy::from_parts(vec![], vec![], vec![], &["(".into()], &[]);
        assert!(matches!(err, Err(ScanError::InvalidPattern { .. })));
    }

    #[test]
    fn test_compression_for() {
        let p = InclusionPolicy::new().with_compression(
            vec![
                CompressionRule { path: "/var".into(), level: Compression::new(6) },
                CompressionRule { path: "/var/log".into(), level: Compression::NONE },
            ],
            vec!["gz".into()],
        );
        let default = Compression::MAX;
        assert_eq!(p.compression_for("/var/log/syslog", default), Compression::NONE);
        assert_eq!(p.compression_for("/var/lib/x", default), Compression::new(6));
        assert_eq!(p.compression_for("/home/a.gz", default), Compression::NONE);
        assert_eq!(p.compression_for("/home/a.txt", default), default);
    }

    #[test]
    fn test_compression_range() {
        assert_eq!(Compression::new(12), Compression::MAX);
        assert!(Compression::try_from(10).is_err());
    }
}
