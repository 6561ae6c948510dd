use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use graft_util::errors::GraftError;

/// User configuration loaded from `~/.graft/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraftConfig {
    #[serde(default)]
    pub resolve: ResolveConfig,
}

/// Resolution settings from `[resolve]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Maximum number of concurrent metadata provider calls.
    #[serde(default = "default_jobs")]
    pub jobs: u32,
    /// Default value of the legacy-behavior flag for new requests.
    #[serde(default, rename = "legacy-fallback")]
    pub legacy_fallback: bool,
    #[serde(default = "default_fail_on_unresolved", rename = "fail-on-unresolved")]
    pub fail_on_unresolved: bool,
    #[serde(default, rename = "downgrades-as-errors")]
    pub downgrades_as_errors: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            legacy_fallback: false,
            fail_on_unresolved: default_fail_on_unresolved(),
            downgrades_as_errors: false,
        }
    }
}

impl ResolveConfig {
    /// `jobs` clamped to at least one permit.
    pub fn concurrency(&self) -> usize {
        self.jobs.max(1) as usize
    }
}

fn default_jobs() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4)
}

fn default_fail_on_unresolved() -> bool {
    true
}

impl GraftConfig {
    /// Load `~/.graft/config.toml`, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load a config file, or return defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> miette::Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| GraftError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse_toml(&content)
    }

    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            GraftError::Config {
                message: format!("Failed to parse config: {e}"),
            }
            .into()
        })
    }

    /// Returns the default path to the config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the path to the graft data directory (`~/.graft/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".graft")
}
