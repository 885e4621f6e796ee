//! Validator registry
//!
//! Discovers validators once, then serves read-only lookups. Discovery order is
//! builtins first, then every search location in order, entries within a location
//! in file-name order. Execution and output order follow it.

pub mod builtin;
pub mod discovery;

use crate::config::{LintConfig, SearchPath};
use crate::errors::{DiscoveryError, VirtLintResult};
use crate::sandbox::ValidationContext;
use crate::warning::Finding;
use crate::{log_debug, log_success};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Native check signature
pub type NativeCheck = fn(&ValidationContext<'_>) -> VirtLintResult<Vec<Finding>>;

/// How a validator is executed
#[derive(Clone)]
pub enum ValidatorKind {
    Builtin(NativeCheck),
    Script(PathBuf),
}

impl std::fmt::Debug for ValidatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidatorKind::Builtin(_) => f.write_str("Builtin"),
            ValidatorKind::Script(path) => f.debug_tuple("Script").field(path).finish(),
        }
    }
}

/// Immutable validator descriptor
#[derive(Debug, Clone)]
pub struct Validator {
    id: String,
    tags: Vec<String>,
    requires_connection: bool,
    kind: ValidatorKind,
}

impl Validator {
    /// Tags are sorted and de-duplicated
    pub fn new(
        id: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
        requires_connection: bool,
        kind: ValidatorKind,
    ) -> Self {
        let mut tags: Vec<String> = tags.into_iter().collect();
        tags.sort();
        tags.dedup();

        Self {
            id: id.into(),
            tags,
            requires_connection,
            kind,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.binary_search_by(|t| t.as_str().cmp(tag)).is_ok()
    }

    pub fn requires_connection(&self) -> bool {
        self.requires_connection
    }

    pub fn kind(&self) -> &ValidatorKind {
        &self.kind
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.kind, ValidatorKind::Builtin(_))
    }

    pub fn script_path(&self) -> Option<&Path> {
        match &self.kind {
            ValidatorKind::Script(path) => Some(path),
            ValidatorKind::Builtin(_) => None,
        }
    }
}

/// Discovered validators plus the tag index
#[derive(Debug)]
pub struct ValidatorRegistry {
    validators: Vec<Validator>,
    tag_index: BTreeMap<String, Vec<usize>>,
    searched: Vec<PathBuf>,
    missing: Vec<PathBuf>,
}

impl ValidatorRegistry {
    /// Build from configuration: builtins when enabled, then the search path
    pub fn discover(config: &LintConfig) -> VirtLintResult<Self> {
        RegistryBuilder::new()
            .with_builtins(config.include_builtin)
            .with_search_path(config.search_path.clone())
            .build()
    }

    /// Sorted, de-duplicated list of every known tag
    pub fn list_tags(&self) -> Vec<String> {
        self.tag_index.keys().cloned().collect()
    }

    /// All validators in discovery order
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Discovery positions of validators carrying `tag`
    pub fn positions_for_tag(&self, tag: &str) -> &[usize] {
        self.tag_index.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: &str) -> Option<&Validator> {
        self.validators.iter().find(|v| v.id() == id)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn get_statistics(&self) -> RegistryStatistics {
        let builtin = self.validators.iter().filter(|v| v.is_builtin()).count();

        RegistryStatistics {
            total_validators: self.validators.len(),
            builtin_validators: builtin,
            script_validators: self.validators.len() - builtin,
            connection_required: self
                .validators
                .iter()
                .filter(|v| v.requires_connection())
                .count(),
            total_tags: self.tag_index.len(),
            locations_searched: self.searched.len(),
            missing_locations: self.missing.clone(),
            registry_health: self.assess_registry_health(),
        }
    }

    fn assess_registry_health(&self) -> RegistryHealth {
        if self.validators.is_empty() {
            RegistryHealth::Empty
        } else if !self.missing.is_empty() {
            RegistryHealth::Partial
        } else {
            RegistryHealth::Healthy
        }
    }
}

// ============================================================================
// Supporting Data Structures
// ============================================================================

#[derive(Debug, Clone)]
pub struct RegistryStatistics {
    pub total_validators: usize,
    pub builtin_validators: usize,
    pub script_validators: usize,
    pub connection_required: usize,
    pub total_tags: usize,
    pub locations_searched: usize,
    pub missing_locations: Vec<PathBuf>,
    pub registry_health: RegistryHealth,
}

impl fmt::Display for RegistryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validators={} builtin={} scripts={} requires_connection={} tags={} locations={} missing={} health={}",
            self.total_validators,
            self.builtin_validators,
            self.script_validators,
            self.connection_required,
            self.total_tags,
            self.locations_searched,
            self.missing_locations.len(),
            self.registry_health.as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryHealth {
    Healthy, // Every search location present
    Partial, // Some search locations missing
    Empty,   // No validators at all
}

impl RegistryHealth {
    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Partial => "partial",
            Self::Empty => "empty",
        }
    }
}

// ============================================================================
// Registry Builder
// ============================================================================

pub struct RegistryBuilder {
    include_builtin: bool,
    extra: Vec<Validator>,
    search_path: SearchPath,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            include_builtin: true,
            extra: Vec::new(),
            search_path: SearchPath::new(),
        }
    }

    pub fn with_builtins(mut self, enabled: bool) -> Self {
        self.include_builtin = enabled;
        self
    }

    pub fn with_search_path(mut self, search_path: SearchPath) -> Self {
        self.search_path = search_path;
        self
    }

    /// Register a validator ahead of discovered scripts
    pub fn add_validator(mut self, validator: Validator) -> Self {
        self.extra.push(validator);
        self
    }

    pub fn build(self) -> VirtLintResult<ValidatorRegistry> {
        let mut validators = Vec::new();
        if self.include_builtin {
            validators.extend(builtin::builtin_validators());
        }
        validators.extend(self.extra);

        let mut ids: HashSet<String> = HashSet::new();
        for validator in &validators {
            if !ids.insert(validator.id().to_string()) {
                return Err(DiscoveryError::DuplicateValidator {
                    id: validator.id().to_string(),
                }
                .into());
            }
        }

        let mut searched = Vec::new();
        let mut missing = Vec::new();
        for location in self.search_path.locations() {
            searched.push(location.clone());
            match discovery::discover_location(location)? {
                Some(found) => {
                    log_debug!("Searched validator location",
                        "location" => location.display(),
                        "validators" => found.len()
                    );
                    for validator in found {
                        // Earlier locations shadow later ones
                        if ids.insert(validator.id().to_string()) {
                            validators.push(validator);
                        } else {
                            log_debug!("Validator shadowed by an earlier location",
                                "validator" => validator.id(),
                                "location" => location.display()
                            );
                        }
                    }
                }
                None => {
                    log_debug!("Validator location missing", "location" => location.display());
                    missing.push(location.clone());
                }
            }
        }

        let mut tag_index: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (position, validator) in validators.iter().enumerate() {
            if validator.tags().is_empty() {
                return Err(DiscoveryError::MissingTags {
                    id: validator.id().to_string(),
                }
                .into());
            }
            for tag in validator.tags() {
                tag_index.entry(tag.clone()).or_default().push(position);
            }
        }

        log_success!(crate::logging::codes::success::REGISTRY_BUILT, "Validator registry built",
            "validators" => validators.len(),
            "tags" => tag_index.len()
        );

        Ok(ValidatorRegistry {
            validators,
            tag_index,
            searched,
            missing,
        })
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
