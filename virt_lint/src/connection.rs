//! Connection seam to a virtualization host
//!
//! The engine never talks to a hypervisor directly. A [`Connect`] implementation
//! supplies live capability data and metrics; the built-in [`TestDriver`] serves a
//! fixed host for `test:///default`.

use crate::caps::DomCapsKey;
use crate::errors::{VirtLintError, VirtLintResult};
use std::fmt::Debug;
use std::sync::Arc;

pub const TEST_URI: &str = "test:///default";

/// Live host operations used by validators
pub trait Connect: Send + Sync + Debug {
    fn uri(&self) -> &str;

    /// Host capabilities XML
    fn capabilities(&self) -> VirtLintResult<String>;

    /// Domain capabilities XML for the given (possibly partial) key
    fn domain_capabilities(&self, query: &DomCapsKey) -> VirtLintResult<String>;

    /// Free memory in bytes for up to `max_cells` NUMA cells starting at `start_cell`
    fn cells_free_memory(&self, start_cell: i32, max_cells: i32) -> VirtLintResult<Vec<u64>>;

    /// XML description of a named domain
    fn domain_xml(&self, name: &str) -> VirtLintResult<String>;
}

/// Open a connection by URI
pub fn open(uri: &str) -> VirtLintResult<Arc<dyn Connect>> {
    match uri {
        TEST_URI => Ok(Arc::new(TestDriver::new())),
        _ => Err(VirtLintError::Connection {
            uri: uri.to_string(),
            reason: "no driver available for this URI".to_string(),
        }),
    }
}

// ============================================================================
// TEST DRIVER
// ============================================================================

const TEST_DOMAIN_XML: &str = include_str!("../fixtures/test_domain.xml");
const TEST_CAPABILITIES_XML: &str = include_str!("../fixtures/test_capabilities.xml");
const TEST_DOMCAPS_XML: &str = include_str!("../fixtures/test_domcaps.xml");

/// In-process host with two NUMA cells and a single domain named `test`
#[derive(Debug, Clone)]
pub struct TestDriver {
    capabilities: String,
    free_memory: Vec<u64>,
}

impl TestDriver {
    pub fn new() -> Self {
        Self {
            capabilities: TEST_CAPABILITIES_XML.to_string(),
            free_memory: vec![2 << 30, 2 << 30],
        }
    }

    /// Override the host capabilities XML
    pub fn with_capabilities(mut self, xml: impl Into<String>) -> Self {
        self.capabilities = xml.into();
        self
    }

    /// Override free bytes per cell
    pub fn with_free_memory(mut self, free_memory: Vec<u64>) -> Self {
        self.free_memory = free_memory;
        self
    }

    fn error(&self, reason: impl Into<String>) -> VirtLintError {
        VirtLintError::Connection {
            uri: TEST_URI.to_string(),
            reason: reason.into(),
        }
    }
}

impl Default for TestDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Connect for TestDriver {
    fn uri(&self) -> &str {
        TEST_URI
    }

    fn capabilities(&self) -> VirtLintResult<String> {
        Ok(self.capabilities.clone())
    }

    fn domain_capabilities(&self, query: &DomCapsKey) -> VirtLintResult<String> {
        let key = DomCapsKey {
            emulator: Some("/usr/bin/test-hv".to_string()),
            arch: Some("i686".to_string()),
            machine: None,
            virttype: Some("test".to_string()),
        };

        if key.satisfies(query) {
            Ok(TEST_DOMCAPS_XML.to_string())
        } else {
            Err(self.error(format!("unsupported domain capabilities query {query:?}")))
        }
    }

    fn cells_free_memory(&self, start_cell: i32, max_cells: i32) -> VirtLintResult<Vec<u64>> {
        let start = usize::try_from(start_cell)
            .ok()
            .filter(|s| *s < self.free_memory.len())
            .ok_or_else(|| self.error(format!("invalid NUMA cell {start_cell}")))?;
        let count = usize::try_from(max_cells).unwrap_or(0);

        Ok(self.free_memory.iter().skip(start).take(count).copied().collect())
    }

    fn domain_xml(&self, name: &str) -> VirtLintResult<String> {
        if name == "test" {
            Ok(TEST_DOMAIN_XML.to_string())
        } else {
            Err(self.error(format!("domain '{name}' not found")))
        }
    }
}
