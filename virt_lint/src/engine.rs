//! Engine facade
//!
//! A [`VirtLint`] session owns its capability records and the warnings of the last
//! successful [`VirtLint::validate`] call. The validator registry is shared
//! read-only between sessions.

use crate::caps::{CapabilityProvider, CapabilityStore, DomCapsKey, LiveCapabilities};
use crate::config::LintConfig;
use crate::connection::Connect;
use crate::domain::DomainDescriptor;
use crate::errors::{VirtLintError, VirtLintResult};
use crate::gate::{self, Admission};
use crate::logging::codes;
use crate::registry::ValidatorRegistry;
use crate::sandbox::{self, ValidationContext};
use crate::selector;
use crate::warning::{Warning, WarningAggregator};
use crate::{log_debug, log_error, log_info, log_success};
use std::sync::Arc;

/// One validation session
#[derive(Debug)]
pub struct VirtLint {
    registry: Arc<ValidatorRegistry>,
    store: CapabilityStore,
    live: Option<LiveCapabilities>,
    warnings: Vec<Warning>,
    closed: bool,
}

impl VirtLint {
    /// Session over an already built registry. Without a connection the session is
    /// offline until capabilities are supplied.
    pub fn new(registry: Arc<ValidatorRegistry>, conn: Option<Arc<dyn Connect>>) -> Self {
        if let Some(conn) = &conn {
            log_debug!("Session uses a live connection", "uri" => conn.uri());
        }

        Self {
            registry,
            store: CapabilityStore::new(),
            live: conn.map(LiveCapabilities::new),
            warnings: Vec::new(),
            closed: false,
        }
    }

    /// Discover validators per `config` and open a session over them
    pub fn with_config(config: &LintConfig, conn: Option<Arc<dyn Connect>>) -> VirtLintResult<Self> {
        let registry = ValidatorRegistry::discover(config)?;
        Ok(Self::new(Arc::new(registry), conn))
    }

    /// Sorted tags of every validator `config` discovers
    pub fn list_validator_tags(config: &LintConfig) -> VirtLintResult<Vec<String>> {
        Ok(ValidatorRegistry::discover(config)?.list_tags())
    }

    fn ensure_open(&self) -> VirtLintResult<()> {
        if self.closed {
            Err(VirtLintError::Closed)
        } else {
            Ok(())
        }
    }

    /// Replace host capabilities, `None` clears them
    pub fn capabilities_set(&mut self, xml: Option<&str>) -> VirtLintResult<()> {
        self.ensure_open()?;
        self.store.set_host(xml)?;
        if xml.is_some() {
            log_success!(codes::success::CAPABILITIES_LOADED, "Host capabilities set");
        }
        Ok(())
    }

    /// Append a domain capabilities record
    pub fn domain_capabilities_add(&mut self, xml: &str) -> VirtLintResult<()> {
        self.ensure_open()?;
        let key: DomCapsKey = self.store.add_domain(xml)?.clone();
        log_success!(codes::success::CAPABILITIES_LOADED, "Domain capabilities added",
            "emulator" => key.emulator.as_deref().unwrap_or("-"),
            "arch" => key.arch.as_deref().unwrap_or("-"),
            "machine" => key.machine.as_deref().unwrap_or("-"),
            "virttype" => key.virttype.as_deref().unwrap_or("-")
        );
        Ok(())
    }

    pub fn domain_capabilities_clear(&mut self) -> VirtLintResult<()> {
        self.ensure_open()?;
        self.store.clear_domain();
        Ok(())
    }

    /// Validate `domxml` with the validators selected by `tags` (all when empty).
    ///
    /// On success the session's warnings are replaced. On failure they are left as
    /// they were.
    pub fn validate(&mut self, domxml: &str, tags: &[String], strict: bool) -> VirtLintResult<()> {
        self.ensure_open()?;
        self.warnings = self.run(domxml, tags, strict)?;
        Ok(())
    }

    fn provider(&self) -> &dyn CapabilityProvider {
        match &self.live {
            Some(live) => live,
            None => &self.store,
        }
    }

    fn run(&self, domxml: &str, tags: &[String], strict: bool) -> VirtLintResult<Vec<Warning>> {
        let domain = DomainDescriptor::parse(domxml)?;
        let ctx = ValidationContext::new(&domain, self.provider());
        let connection_available = ctx.connection_available();

        let selection = selector::select(&self.registry, tags);
        let mut aggregator = WarningAggregator::new();
        let mut executed = 0usize;
        let mut skipped = 0usize;

        for validator in &selection.candidates {
            let admission = gate::admit(validator, connection_available, strict);
            match admission {
                Admission::Run => {
                    let findings = sandbox::execute(validator, &ctx).map_err(|e| {
                        log_error!(e.code(), "Validator failed",
                            "validator" => validator.id(),
                            "error" => &e
                        );
                        e
                    })?;
                    log_debug!("Validator finished",
                        "validator" => validator.id(),
                        "findings" => findings.len()
                    );
                    aggregator.extend(validator.tags(), findings);
                    executed += 1;
                }
                Admission::Skip => {
                    log_info!("Skipping validator, no connection",
                        "validator" => validator.id(),
                        "admission" => admission.as_str()
                    );
                    skipped += 1;
                }
                Admission::Abort => {
                    let err = gate::abort_error(validator);
                    log_error!(err.code(), "Validation aborted, no connection",
                        "validator" => validator.id(),
                        "admission" => admission.as_str()
                    );
                    return Err(err);
                }
            }
        }

        log_success!(codes::success::VALIDATION_COMPLETE, "Validation complete",
            "candidates" => selection.len(),
            "executed" => executed,
            "skipped" => skipped,
            "warnings" => aggregator.len()
        );

        Ok(aggregator.finish())
    }

    /// Warnings of the most recent successful validation, empty before the first
    pub fn warnings(&self) -> VirtLintResult<&[Warning]> {
        self.ensure_open()?;
        Ok(&self.warnings)
    }

    /// Drop capability data, the connection and warnings. Every later call fails
    /// with [`VirtLintError::Closed`].
    pub fn release(&mut self) -> VirtLintResult<()> {
        self.ensure_open()?;
        self.closed = true;
        self.live = None;
        self.store = CapabilityStore::new();
        self.warnings = Vec::new();
        Ok(())
    }

    pub fn is_online(&self) -> bool {
        self.live.is_some()
    }

    pub fn registry(&self) -> &Arc<ValidatorRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchPath;
    use crate::connection::{self, TEST_URI};
    use crate::warning::{WarningDomain, WarningLevel};
    use assert_matches::assert_matches;

    const VALIDATORS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../validators_lua");
    const DOMAIN_XML: &str = include_str!("../fixtures/test_domain.xml");
    const CAPS_XML: &str = include_str!("../fixtures/test_capabilities.xml");
    const DOMCAPS_XML: &str = include_str!("../fixtures/test_domcaps.xml");

    const NUMA_MSG: &str = "Domain would not fit into any host NUMA node";
    const NUMA_FREE_MSG: &str = "Not enough free memory on any NUMA node";

    fn config() -> LintConfig {
        LintConfig::new().with_search_path(SearchPath::from_iter([VALIDATORS_DIR]))
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn offline() -> VirtLint {
        let mut vl = VirtLint::with_config(&config(), None).unwrap();
        vl.capabilities_set(Some(CAPS_XML)).unwrap();
        vl.domain_capabilities_add(DOMCAPS_XML).unwrap();
        vl
    }

    fn summary(warnings: &[Warning]) -> Vec<(Vec<String>, WarningDomain, WarningLevel, String)> {
        warnings
            .iter()
            .map(|w| (w.tags.clone(), w.domain, w.level, w.msg.clone()))
            .collect()
    }

    #[test]
    fn test_list_validator_tags() {
        let tags = VirtLint::list_validator_tags(&config()).unwrap();
        assert_eq!(
            tags,
            strings(&[
                "TAG_1",
                "TAG_2",
                "TAG_3",
                "TAG_4",
                "common",
                "common/check_node_kvm",
                "common/check_numa",
                "common/check_numa_free",
                "common/check_pcie_root_ports",
            ])
        );
        assert_eq!(tags, VirtLint::list_validator_tags(&config()).unwrap());
    }

    #[test]
    fn test_list_validator_tags_without_validators() {
        let config = LintConfig::new()
            .with_builtin(false)
            .with_search_path(SearchPath::from_iter(["/nonexistent/virt-lint"]));
        assert!(VirtLint::list_validator_tags(&config).unwrap().is_empty());
    }

    #[test]
    fn test_warnings_empty_before_validate() {
        let vl = VirtLint::with_config(&config(), None).unwrap();
        assert!(vl.warnings().unwrap().is_empty());
        assert!(!vl.is_online());
    }

    #[test]
    fn test_validate_online() {
        let conn = connection::open(TEST_URI).unwrap();
        let mut vl = VirtLint::with_config(&config(), Some(conn)).unwrap();
        assert!(vl.is_online());

        vl.validate(DOMAIN_XML, &[], false).unwrap();

        assert_eq!(
            summary(vl.warnings().unwrap()),
            vec![
                (strings(&["TAG_1", "TAG_2"]), WarningDomain::Domain, WarningLevel::Error, NUMA_MSG.to_string()),
                (strings(&["TAG_2"]), WarningDomain::Domain, WarningLevel::Error, NUMA_FREE_MSG.to_string()),
                (
                    strings(&["common", "common/check_numa"]),
                    WarningDomain::Domain,
                    WarningLevel::Error,
                    NUMA_MSG.to_string()
                ),
                (
                    strings(&["common", "common/check_numa_free"]),
                    WarningDomain::Domain,
                    WarningLevel::Error,
                    NUMA_FREE_MSG.to_string()
                ),
            ]
        );

        // Online strict mode has nothing to abort on
        vl.validate(DOMAIN_XML, &[], true).unwrap();
        assert_eq!(vl.warnings().unwrap().len(), 4);
    }

    #[test]
    fn test_validate_offline_best_effort() {
        let mut vl = offline();
        vl.validate(DOMAIN_XML, &[], false).unwrap();

        assert_eq!(
            summary(vl.warnings().unwrap()),
            vec![
                (strings(&["TAG_1", "TAG_2"]), WarningDomain::Domain, WarningLevel::Error, NUMA_MSG.to_string()),
                (
                    strings(&["common", "common/check_numa"]),
                    WarningDomain::Domain,
                    WarningLevel::Error,
                    NUMA_MSG.to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_validate_offline_strict() {
        let mut vl = offline();
        assert_matches!(
            vl.validate(DOMAIN_XML, &[], true),
            Err(VirtLintError::ConnectionRequired { validator }) if validator == "builtin/check_numa_free"
        );

        let tags = strings(&[
            "TAG_1",
            "TAG_3",
            "TAG_4",
            "common/check_node_kvm",
            "common/check_numa",
            "common/check_pcie_root_ports",
        ]);
        vl.validate(DOMAIN_XML, &tags, true).unwrap();

        let warnings = vl.warnings().unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.msg == NUMA_MSG));
        assert_eq!(warnings[0].tags, strings(&["TAG_1", "TAG_2"]));
        assert_eq!(warnings[1].tags, strings(&["common", "common/check_numa"]));
    }

    #[test]
    fn test_offline_without_capabilities() {
        let mut vl = VirtLint::with_config(&config(), None).unwrap();
        vl.validate(DOMAIN_XML, &[], false).unwrap();

        // Only the emulator checks have something to say without capabilities
        let warnings = vl.warnings().unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(warnings
            .iter()
            .all(|w| w.domain == WarningDomain::Node && w.msg == "No suitable emulator found"));
    }

    #[test]
    fn test_empty_tags_match_all_tags() {
        let mut vl = offline();
        vl.validate(DOMAIN_XML, &[], false).unwrap();
        let by_empty = vl.warnings().unwrap().to_vec();

        let all = VirtLint::list_validator_tags(&config()).unwrap();
        vl.validate(DOMAIN_XML, &all, false).unwrap();
        assert_eq!(vl.warnings().unwrap(), by_empty.as_slice());
    }

    #[test]
    fn test_results_replace_previous() {
        let mut vl = offline();
        vl.validate(DOMAIN_XML, &[], false).unwrap();
        assert_eq!(vl.warnings().unwrap().len(), 2);

        let small = DOMAIN_XML.replace("8388608", "1048576");
        vl.validate(&small, &[], false).unwrap();
        assert!(vl.warnings().unwrap().is_empty());
    }

    #[test]
    fn test_failed_validate_keeps_previous_warnings() {
        let mut vl = offline();
        vl.validate(DOMAIN_XML, &[], false).unwrap();

        assert_matches!(
            vl.validate("<domain>", &[], false),
            Err(VirtLintError::Parse { what: "domain", .. })
        );
        assert_eq!(vl.warnings().unwrap().len(), 2);

        assert_matches!(
            vl.validate(DOMAIN_XML, &[], true),
            Err(VirtLintError::ConnectionRequired { .. })
        );
        assert_eq!(vl.warnings().unwrap().len(), 2);
    }

    #[test]
    fn test_numa_fit_needs_a_larger_cell() {
        let tags = strings(&["TAG_2", "common/check_numa"]);
        let equal_cell = "<capabilities><host><topology><cells num='1'>\
            <cell id='0'><memory unit='KiB'>8388608</memory></cell>\
            </cells></topology></host></capabilities>";

        for caps in [equal_cell, "<capabilities><host/></capabilities>"] {
            let mut vl = VirtLint::with_config(&config(), None).unwrap();
            vl.capabilities_set(Some(caps)).unwrap();
            vl.validate(DOMAIN_XML, &tags, false).unwrap();

            let warnings = vl.warnings().unwrap();
            assert_eq!(warnings.len(), 2, "{caps}");
            assert!(warnings.iter().all(|w| w.msg == NUMA_MSG));
        }
    }

    #[test]
    fn test_faulting_validator_stops_validation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_ok.lua"), "vl:add_warning(0, 2, 'first')").unwrap();
        std::fs::write(dir.path().join("b_fail.lua"), "error('boom')").unwrap();
        std::fs::write(dir.path().join("c_after.lua"), "vl:add_warning(0, 2, 'after')").unwrap();

        let config = LintConfig::new()
            .with_builtin(false)
            .with_search_path(SearchPath::from_iter([dir.path()]));
        let mut vl = VirtLint::with_config(&config, None).unwrap();

        vl.validate(DOMAIN_XML, &strings(&["a_ok"]), false).unwrap();
        let previous = vl.warnings().unwrap().to_vec();
        assert_eq!(previous.len(), 1);

        assert_matches!(
            vl.validate(DOMAIN_XML, &[], false),
            Err(VirtLintError::ValidatorExecution { validator, reason })
                if validator == "b_fail" && reason.contains("boom")
        );
        assert_eq!(vl.warnings().unwrap(), previous.as_slice());
        assert!(vl.warnings().unwrap().iter().all(|w| w.msg != "after"));
    }

    #[test]
    fn test_malformed_capabilities() {
        let mut vl = VirtLint::with_config(&config(), None).unwrap();
        assert_matches!(
            vl.capabilities_set(Some("<capabilities>")),
            Err(VirtLintError::Parse { .. })
        );
        assert_matches!(
            vl.domain_capabilities_add("<capabilities/>"),
            Err(VirtLintError::Parse { .. })
        );
    }

    #[test]
    fn test_domain_capabilities_clear() {
        let mut vl = offline();
        vl.domain_capabilities_clear().unwrap();
        vl.capabilities_set(None).unwrap();

        vl.validate(DOMAIN_XML, &strings(&["TAG_3"]), false).unwrap();
        assert_eq!(vl.warnings().unwrap()[0].msg, "No suitable emulator found");
    }

    #[test]
    fn test_release() {
        let mut vl = offline();
        vl.release().unwrap();

        assert_matches!(vl.validate(DOMAIN_XML, &[], false), Err(VirtLintError::Closed));
        assert_matches!(vl.warnings(), Err(VirtLintError::Closed));
        assert_matches!(vl.capabilities_set(None), Err(VirtLintError::Closed));
        assert_matches!(vl.domain_capabilities_add(DOMCAPS_XML), Err(VirtLintError::Closed));
        assert_matches!(vl.domain_capabilities_clear(), Err(VirtLintError::Closed));
        assert_matches!(vl.release(), Err(VirtLintError::Closed));
    }

    #[test]
    fn test_sessions_share_registry() {
        let registry = Arc::new(ValidatorRegistry::discover(&config()).unwrap());
        let mut first = VirtLint::new(Arc::clone(&registry), None);
        let mut second = VirtLint::new(Arc::clone(&registry), connection::open(TEST_URI).ok());

        first.validate(DOMAIN_XML, &[], false).unwrap();
        second.validate(DOMAIN_XML, &[], false).unwrap();
        assert_eq!(second.warnings().unwrap().len(), 4);
        assert!(Arc::ptr_eq(first.registry(), second.registry()));
    }
}
