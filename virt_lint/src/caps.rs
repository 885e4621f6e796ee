//! Capability store and the provider seam used by validators
//!
//! A session answers capability questions through one [`CapabilityProvider`]:
//! either the offline [`CapabilityStore`] filled by the caller, or
//! [`LiveCapabilities`] backed by a connection.

use crate::connection::Connect;
use crate::errors::VirtLintResult;
use crate::xml::XmlDocument;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// RECORDS
// ============================================================================

/// Identity of a domain capabilities document. As a query, `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomCapsKey {
    pub emulator: Option<String>,
    pub arch: Option<String>,
    pub machine: Option<String>,
    pub virttype: Option<String>,
}

impl DomCapsKey {
    fn from_document(doc: &XmlDocument) -> Self {
        Self {
            emulator: doc.eval_string("/domainCapabilities/path"),
            arch: doc.eval_string("/domainCapabilities/arch"),
            machine: doc.eval_string("/domainCapabilities/machine"),
            virttype: doc.eval_string("/domainCapabilities/domain"),
        }
    }

    /// Whether this key agrees with every field `query` specifies
    pub fn satisfies(&self, query: &DomCapsKey) -> bool {
        fn field(ours: &Option<String>, wanted: &Option<String>) -> bool {
            match wanted {
                Some(w) => ours.as_deref() == Some(w.as_str()),
                None => true,
            }
        }

        field(&self.emulator, &query.emulator)
            && field(&self.arch, &query.arch)
            && field(&self.machine, &query.machine)
            && field(&self.virttype, &query.virttype)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCapabilities {
    xml: String,
}

impl HostCapabilities {
    pub fn parse(xml: &str) -> VirtLintResult<Self> {
        XmlDocument::parse(xml, "capabilities", Some("capabilities"))?;
        Ok(Self {
            xml: xml.to_string(),
        })
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainCapabilities {
    key: DomCapsKey,
    xml: String,
}

impl DomainCapabilities {
    pub fn parse(xml: &str) -> VirtLintResult<Self> {
        let doc = XmlDocument::parse(xml, "domain capabilities", Some("domainCapabilities"))?;
        Ok(Self {
            key: DomCapsKey::from_document(&doc),
            xml: xml.to_string(),
        })
    }

    pub fn key(&self) -> &DomCapsKey {
        &self.key
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }
}

// ============================================================================
// PROVIDER SEAM
// ============================================================================

/// Read-only capability view handed to validators
pub trait CapabilityProvider {
    /// Host capabilities XML, if known
    fn host_capabilities(&self) -> VirtLintResult<Option<String>>;

    /// Domain capabilities XML best matching `query`, if known
    fn domain_capabilities(&self, query: &DomCapsKey) -> VirtLintResult<Option<String>>;

    /// Free memory in bytes per NUMA cell, only available with a live connection
    fn cells_free_memory(&self, start_cell: i32, max_cells: i32)
        -> VirtLintResult<Option<Vec<u64>>>;

    /// Whether answers come from a live connection
    fn is_live(&self) -> bool;
}

/// Capability records supplied explicitly by the caller
#[derive(Debug, Default)]
pub struct CapabilityStore {
    host: Option<HostCapabilities>,
    domain: Vec<DomainCapabilities>,
}

impl CapabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace host capabilities; `None` clears them
    pub fn set_host(&mut self, xml: Option<&str>) -> VirtLintResult<()> {
        self.host = xml.map(HostCapabilities::parse).transpose()?;
        Ok(())
    }

    /// Append a domain capabilities record, returning its derived key
    pub fn add_domain(&mut self, xml: &str) -> VirtLintResult<&DomCapsKey> {
        let record = DomainCapabilities::parse(xml)?;
        self.domain.push(record);
        Ok(self.domain[self.domain.len() - 1].key())
    }

    pub fn clear_domain(&mut self) {
        self.domain.clear();
    }

    pub fn host(&self) -> Option<&HostCapabilities> {
        self.host.as_ref()
    }

    /// Records in addition order
    pub fn domain_records(&self) -> &[DomainCapabilities] {
        &self.domain
    }

    /// First record, in addition order, whose key satisfies `query`
    pub fn find_domain(&self, query: &DomCapsKey) -> Option<&DomainCapabilities> {
        self.domain.iter().find(|r| r.key().satisfies(query))
    }
}

impl CapabilityProvider for CapabilityStore {
    fn host_capabilities(&self) -> VirtLintResult<Option<String>> {
        Ok(self.host.as_ref().map(|h| h.xml().to_string()))
    }

    fn domain_capabilities(&self, query: &DomCapsKey) -> VirtLintResult<Option<String>> {
        Ok(self.find_domain(query).map(|r| r.xml().to_string()))
    }

    fn cells_free_memory(&self, _: i32, _: i32) -> VirtLintResult<Option<Vec<u64>>> {
        Ok(None)
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// Capabilities fetched through a connection, cached for the session lifetime
#[derive(Debug)]
pub struct LiveCapabilities {
    conn: Arc<dyn Connect>,
    host: Mutex<Option<String>>,
    domain: Mutex<Vec<(DomCapsKey, String)>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LiveCapabilities {
    pub fn new(conn: Arc<dyn Connect>) -> Self {
        Self {
            conn,
            host: Mutex::new(None),
            domain: Mutex::new(Vec::new()),
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connect> {
        &self.conn
    }
}

impl CapabilityProvider for LiveCapabilities {
    fn host_capabilities(&self) -> VirtLintResult<Option<String>> {
        let mut host = locked(&self.host);
        if host.is_none() {
            let xml = self.conn.capabilities()?;
            HostCapabilities::parse(&xml)?;
            *host = Some(xml);
        }
        Ok(host.clone())
    }

    fn domain_capabilities(&self, query: &DomCapsKey) -> VirtLintResult<Option<String>> {
        let mut cache = locked(&self.domain);
        if let Some((_, xml)) = cache.iter().find(|(key, _)| key == query) {
            return Ok(Some(xml.clone()));
        }

        let xml = self.conn.domain_capabilities(query)?;
        DomainCapabilities::parse(&xml)?;
        cache.push((query.clone(), xml.clone()));
        Ok(Some(xml))
    }

    fn cells_free_memory(
        &self,
        start_cell: i32,
        max_cells: i32,
    ) -> VirtLintResult<Option<Vec<u64>>> {
        self.conn
            .cells_free_memory(start_cell, max_cells)
            .map(Some)
    }

    fn is_live(&self) -> bool {
        true
    }
}
