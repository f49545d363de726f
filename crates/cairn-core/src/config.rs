//! Scan and client configuration.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::policy::{Compression, CompressionRule, DirRule, InclusionPolicy, subdir_match};

/// Default port of the server status socket.
pub const DEFAULT_STATUS_PORT: u16 = 4972;

/// A directory the scan starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartDir {
    pub path: String,
    /// Disabled start directories are already covered by another one.
    pub enabled: bool,
}

/// Derive start directories from include paths.
///
/// An include is an enabled start directory unless an earlier include of
/// the same directory or an enclosing include already covers it. Trailing
/// slashes do not make two includes different.
pub fn start_dirs_from(includes: &[String]) -> Vec<StartDir> {
    includes
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let dir = without_trailing_slash(path);
            let covered = includes.iter().enumerate().any(|(j, other)| {
                let other = without_trailing_slash(other);
                if other == dir {
                    j < i
                } else {
                    subdir_match(other, dir).is_some()
                }
            });
            StartDir {
                path: path.clone(),
                enabled: !covered,
            }
        })
        .collect()
}

fn without_trailing_slash(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" if path.starts_with('/') => "/",
        trimmed => trimmed,
    }
}

/// Runtime configuration for a phase 1 scan.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Directories to walk.
    pub start_dirs: Vec<StartDir>,

    /// Inclusion policy applied to every entry.
    #[builder(default)]
    pub policy: InclusionPolicy,

    /// Default compression level.
    #[builder(default)]
    pub compression: Compression,

    /// Run-level encryption is configured.
    #[builder(default = "false")]
    pub encrypted: bool,

    /// Descend into directories on other file systems.
    #[builder(default = "false")]
    pub cross_filesystems: bool,

    /// Read fifos as file content.
    #[builder(default = "false")]
    pub read_fifos: bool,

    /// Read block devices as file content.
    #[builder(default = "false")]
    pub read_blockdevs: bool,

    /// Send directories as files (volume shadow copy mode).
    #[builder(default = "false")]
    pub directory_as_file: bool,

    /// Pass entries flagged as file-system encrypted through raw.
    #[builder(default = "false")]
    pub efs_passthrough: bool,
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.start_dirs {
            Some(ref dirs) if dirs.iter().any(|d| d.path.is_empty()) => {
                Err("Start directory cannot be empty".to_string())
            }
            Some(ref dirs) if !dirs.is_empty() => Ok(()),
            _ => Err("At least one start directory is required".to_string()),
        }
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for backing up one directory.
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            policy: InclusionPolicy::from_parts(
                vec![DirRule::include(root.clone())],
                Vec::new(),
                Vec::new(),
                &[],
                &[],
            )
            .unwrap_or_default(),
            start_dirs: vec![StartDir {
                path: root,
                enabled: true,
            }],
            compression: Compression::default(),
            encrypted: false,
            cross_filesystems: false,
            read_fifos: false,
            read_blockdevs: false,
            directory_as_file: false,
            efs_passthrough: false,
        }
    }

    /// Enabled start directories in order.
    pub fn enabled_start_dirs(&self) -> impl Iterator<Item = &StartDir> {
        self.start_dirs.iter().filter(|d| d.enabled)
    }
}

/// Client configuration file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Client name reported to the server.
    pub client: String,
    /// Server address for the backup channel.
    pub server: Option<String>,
    /// Port of the server status socket.
    pub status_port: u16,
    /// Default compression level.
    pub compression: Compression,
    /// Presence switches the run to encrypted file and metadata tags.
    #[serde(skip_serializing)]
    pub encryption_password: Option<String>,
    pub cross_filesystems: bool,
    pub read_fifos: bool,
    pub read_blockdevs: bool,
    pub directory_as_file: bool,
    pub efs_passthrough: bool,
    /// Directories to back up.
    pub include: Vec<String>,
    /// Directories to leave out.
    pub exclude: Vec<String>,
    pub include_ext: Vec<String>,
    pub exclude_ext: Vec<String>,
    pub include_regex: Vec<String>,
    pub exclude_regex: Vec<String>,
    /// Extensions stored without compression.
    pub exclude_comp: Vec<String>,
    /// Compression levels for directory subtrees.
    pub compression_override: Vec<CompressionRule>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            client: String::new(),
            server: None,
            status_port: DEFAULT_STATUS_PORT,
            compression: Compression::default(),
            encryption_password: None,
            cross_filesystems: false,
            read_fifos: false,
            read_blockdevs: false,
            directory_as_file: false,
            efs_passthrough: false,
            include: Vec::new(),
            exclude: Vec::new(),
            include_ext: Vec::new(),
            exclude_ext: Vec::new(),
            include_regex: Vec::new(),
            exclude_regex: Vec::new(),
            exclude_comp: Vec::new(),
            compression_override: Vec::new(),
        }
    }
}

impl BackupConfig {
    /// Default configuration file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cairn")
            .join("cairn.toml")
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ScanError> {
        toml::from_str(text).map_err(|source| ScanError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        Self::from_toml_str(&text, path)
    }

    /// Directory rules: includes first, then excludes, in declaration order.
    pub fn dir_rules(&self) -> Vec<DirRule> {
        self.include
            .iter()
            .cloned()
            .map(DirRule::include)
            .chain(self.exclude.iter().cloned().map(DirRule::exclude))
            .collect()
    }

    /// Build the validated scan configuration.
    pub fn scan_config(&self) -> Result<ScanConfig, ScanError> {
        let policy = InclusionPolicy::from_parts(
            self.dir_rules(),
            self.include_ext.clone(),
            self.exclude_ext.clone(),
            &self.include_regex,
            &self.exclude_regex,
        )?
        .with_compression(self.compression_override.clone(), self.exclude_comp.clone());

        ScanConfig::builder()
            .start_dirs(start_dirs_from(&self.include))
            .policy(policy)
            .compression(self.compression)
            .encrypted(self.encryption_password.is_some())
            .cross_filesystems(self.cross_filesystems)
            .read_fifos(self.read_fifos)
            .read_blockdevs(self.read_blockdevs)
            .directory_as_file(self.directory_as_file)
            .efs_passthrough(self.efs_passthrough)
            .build()
            .map_err(|e| ScanError::InvalidConfig {
                message: e.to_string(),
            })
    }
}
