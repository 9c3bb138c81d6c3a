//! Configuration file support for mooring.
//!
//! mooring supports two configuration file locations:
//! - Global: `~/.mooring/config.toml` - User-wide defaults
//! - Project: `.mooring/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. Command-line flags
//! take precedence over both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::BackendId;

/// mooring configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resolution settings
    pub resolve: ResolveConfig,

    /// Conan backend settings
    pub conan: ConanConfig,

    /// vcpkg backend settings
    pub vcpkg: VcpkgConfig,
}

/// Resolution-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolveConfig {
    /// Preferred backend (conan, vcpkg, fetch)
    pub prefer: Option<String>,

    /// Per-backend resolve timeout in seconds
    pub timeout: Option<u64>,

    /// Same-backend retries after a network failure
    pub network_retries: Option<u32>,

    /// Treat cross-backend lock divergence as a failure exit
    pub strict_locks: bool,
}

/// Conan backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConanConfig {
    /// Explicit path to the conan executable
    pub path: Option<PathBuf>,

    /// Host profile passed as `--profile:host`
    pub profile: Option<String>,
}

/// vcpkg backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VcpkgConfig {
    /// vcpkg root directory
    pub root: Option<PathBuf>,

    /// Target triplet (e.g. x64-linux)
    pub triplet: Option<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.resolve.prefer.is_some() {
            self.resolve.prefer = other.resolve.prefer;
        }
        if other.resolve.timeout.is_some() {
            self.resolve.timeout = other.resolve.timeout;
        }
        if other.resolve.network_retries.is_some() {
            self.resolve.network_retries = other.resolve.network_retries;
        }
        if other.resolve.strict_locks {
            self.resolve.strict_locks = true;
        }

        if other.conan.path.is_some() {
            self.conan.path = other.conan.path;
        }
        if other.conan.profile.is_some() {
            self.conan.profile = other.conan.profile;
        }

        if other.vcpkg.root.is_some() {
            self.vcpkg.root = other.vcpkg.root;
        }
        if other.vcpkg.triplet.is_some() {
            self.vcpkg.triplet = other.vcpkg.triplet;
        }
    }

    /// Parse the preferred backend from config string.
    pub fn preferred_backend(&self) -> Option<BackendId> {
        let raw = self.resolve.prefer.as_ref()?;
        match raw.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("ignoring config `resolve.prefer`: {}", e);
                None
            }
        }
    }

    /// Per-backend resolve timeout.
    pub fn resolve_timeout(&self) -> Option<Duration> {
        self.resolve.timeout.map(Duration::from_secs)
    }

    pub fn network_retries(&self) -> u32 {
        self.resolve.network_retries.unwrap_or(0)
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.mooring/config.toml)
/// 2. Global config (~/.mooring/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    config.merge(Config::load_or_default(project_path));

    config
}

/// Get the global mooring config directory (~/.mooring).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".mooring"))
}
