//! # virt-lint
//!
//! Checks virtual machine domain XML against host and domain capabilities using
//! tagged validators, native or Lua scripted.

pub mod caps;
pub mod config;
pub mod connection;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod logging;
pub mod registry;
pub mod sandbox;
pub mod selector;
pub mod version;
pub mod warning;
pub mod xml;

// Convenience re-exports
pub use config::{LintConfig, SearchPath};
pub use engine::VirtLint;
pub use errors::{VirtLintError, VirtLintResult};
pub use warning::{Warning, WarningDomain, WarningLevel};

pub mod prelude {
    pub use crate::caps::{CapabilityProvider, CapabilityStore, DomCapsKey, LiveCapabilities};
    pub use crate::config::{LintConfig, LoggingPreferences, SearchPath};
    pub use crate::connection::{Connect, TestDriver, TEST_URI};
    pub use crate::engine::VirtLint;
    pub use crate::errors::{DiscoveryError, VirtLintError, VirtLintResult};
    pub use crate::registry::{RegistryBuilder, Validator, ValidatorKind, ValidatorRegistry};
    pub use crate::version::{version, version_string};
    pub use crate::warning::{Finding, Warning, WarningDomain, WarningLevel};
}
