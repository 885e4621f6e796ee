//! Runtime configuration
//!
//! Values are layered: compiled defaults, then an optional TOML file, then
//! `VIRT_LINT_*` environment variables. The CLI applies its flags last.

use crate::errors::{VirtLintError, VirtLintResult};
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable names for configuration
pub mod env_vars {
    pub const LUA_PATH: &str = "VIRT_LINT_LUA_PATH";
    pub const STRICT: &str = "VIRT_LINT_STRICT";
    pub const LOG_LEVEL: &str = "VIRT_LINT_LOG_LEVEL";
    pub const STRUCTURED_LOGGING: &str = "VIRT_LINT_STRUCTURED_LOGGING";
}

/// System-wide location of shipped validator scripts
pub const DEFAULT_VALIDATORS_DIR: &str = "/usr/share/virt-lint/validators_lua";

// ============================================================================
// SEARCH PATH
// ============================================================================

/// Ordered, duplicate-free list of validator locations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchPath {
    locations: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a platform path list such as `VIRT_LINT_LUA_PATH`
    pub fn from_path_list(value: &str) -> Self {
        let mut path = Self::new();
        for location in env::split_paths(value) {
            if !location.as_os_str().is_empty() {
                path.push(location);
            }
        }
        path
    }

    /// Appends `location` unless it is already present
    pub fn push(&mut self, location: impl Into<PathBuf>) {
        let location = location.into();
        if !self.locations.contains(&location) {
            self.locations.push(location);
        }
    }

    /// Returns a copy with `locations` searched before the current entries
    pub fn prepend(&self, locations: &[PathBuf]) -> Self {
        let mut path = Self::new();
        for location in locations.iter().chain(self.locations.iter()) {
            path.push(location.clone());
        }
        path
    }

    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for SearchPath {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let mut path = Self::new();
        for location in iter {
            path.push(location);
        }
        path
    }
}

// ============================================================================
// LOGGING PREFERENCES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingPreferences {
    /// Minimum level that reaches a logger
    pub min_log_level: LogLevel,

    /// JSON lines instead of plain text
    pub use_structured_logging: bool,

    /// Hand events to the `log` facade instead of printing them
    pub forward_to_log_crate: bool,
}

impl Default for LoggingPreferences {
    fn default() -> Self {
        Self {
            min_log_level: LogLevel::Warning,
            use_structured_logging: false,
            forward_to_log_crate: false,
        }
    }
}

impl LoggingPreferences {
    /// Overlay environment variables on top of `self`
    pub fn with_env(self) -> Self {
        Self {
            min_log_level: env::var(env_vars::LOG_LEVEL)
                .ok()
                .and_then(|v| LogLevel::parse(&v))
                .unwrap_or(self.min_log_level),
            use_structured_logging: env::var(env_vars::STRUCTURED_LOGGING)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.use_structured_logging),
            forward_to_log_crate: self.forward_to_log_crate,
        }
    }
}

// ============================================================================
// LINT CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LintConfig {
    pub search_path: SearchPath,
    pub include_builtin: bool,
    pub strict: bool,
    pub logging: LoggingPreferences,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            search_path: [DEFAULT_VALIDATORS_DIR].into_iter().collect(),
            include_builtin: true,
            strict: false,
            logging: LoggingPreferences::default(),
        }
    }
}

impl LintConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> VirtLintResult<Self> {
        let config = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        Ok(config.with_env())
    }

    pub fn from_toml_file(path: &Path) -> VirtLintResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> VirtLintResult<Self> {
        toml::from_str(content).map_err(|e| VirtLintError::Configuration {
            reason: e.to_string(),
        })
    }

    pub fn to_toml_string(&self) -> VirtLintResult<String> {
        toml::to_string(self).map_err(|e| VirtLintError::Configuration {
            reason: e.to_string(),
        })
    }

    /// Overlay `VIRT_LINT_*` environment variables
    pub fn with_env(mut self) -> Self {
        if let Ok(value) = env::var(env_vars::LUA_PATH) {
            self.search_path = SearchPath::from_path_list(&value);
        }
        self.strict = env::var(env_vars::STRICT)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.strict);
        self.logging = self.logging.with_env();
        self
    }

    pub fn with_search_path(mut self, search_path: SearchPath) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn with_extra_locations(mut self, locations: &[PathBuf]) -> Self {
        self.search_path = self.search_path.prepend(locations);
        self
    }

    pub fn with_builtin(mut self, enabled: bool) -> Self {
        self.include_builtin = enabled;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_debug_logging(mut self) -> Self {
        self.logging.min_log_level = LogLevel::Debug;
        self
    }

    pub fn with_structured_logging(mut self) -> Self {
        self.logging.use_structured_logging = true;
        self
    }
}
