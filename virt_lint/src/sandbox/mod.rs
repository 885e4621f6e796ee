//! Execution sandbox
//!
//! Runs one validator against one domain. Native checks are plain functions;
//! scripts run in a fresh Lua state per validator with a restricted standard
//! library, so no state leaks between validators or validation calls. Either way
//! the validator only sees the [`ValidationContext`].

pub mod lua;
pub mod native;

use crate::caps::CapabilityProvider;
use crate::domain::DomainDescriptor;
use crate::errors::{VirtLintError, VirtLintResult};
use crate::registry::{Validator, ValidatorKind};
use crate::warning::Finding;
use crate::xml::XmlDocument;

/// Read-only view handed to a running validator
pub struct ValidationContext<'a> {
    pub domain: &'a DomainDescriptor,
    pub caps: &'a dyn CapabilityProvider,
}

impl<'a> ValidationContext<'a> {
    pub fn new(domain: &'a DomainDescriptor, caps: &'a dyn CapabilityProvider) -> Self {
        Self { domain, caps }
    }

    pub fn connection_available(&self) -> bool {
        self.caps.is_live()
    }

    /// Parsed host capabilities, `None` when unknown
    pub fn host_capabilities(&self) -> VirtLintResult<Option<XmlDocument>> {
        self.caps
            .host_capabilities()?
            .map(|xml| XmlDocument::parse(&xml, "capabilities", Some("capabilities")))
            .transpose()
    }

    /// Domain capabilities XML matching the domain under validation
    pub fn domain_capabilities(&self) -> VirtLintResult<Option<String>> {
        self.caps.domain_capabilities(&self.domain.domcaps_query())
    }
}

/// Run `validator`, attributing any failure to it
pub fn execute(validator: &Validator, ctx: &ValidationContext<'_>) -> VirtLintResult<Vec<Finding>> {
    let result = match validator.kind() {
        ValidatorKind::Builtin(check) => check(ctx),
        ValidatorKind::Script(path) => lua::run_script(validator.id(), path, ctx),
    };

    result.map_err(|e| match e {
        VirtLintError::ValidatorExecution { .. } => e,
        other => VirtLintError::execution(validator.id(), other),
    })
}
