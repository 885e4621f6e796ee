//! Parsed domain descriptor for one validation call

use crate::caps::DomCapsKey;
use crate::errors::VirtLintResult;
use crate::xml::XmlDocument;

#[derive(Debug)]
pub struct DomainDescriptor {
    xml: String,
    doc: XmlDocument,
}

impl DomainDescriptor {
    pub fn parse(xml: &str) -> VirtLintResult<Self> {
        let doc = XmlDocument::parse(xml, "domain", Some("domain"))?;
        Ok(Self {
            xml: xml.to_string(),
            doc,
        })
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn document(&self) -> &XmlDocument {
        &self.doc
    }

    /// `<memory>` normalized to KiB
    pub fn memory_kib(&self) -> Option<u64> {
        let value = self.doc.eval_u64("/domain/memory")?;
        let unit = self.doc.eval_string("/domain/memory/@unit");
        memory_to_kib(value, unit.as_deref())
    }

    pub fn virt_type(&self) -> Option<String> {
        self.doc.eval_string("/domain/@type")
    }

    pub fn arch(&self) -> Option<String> {
        self.doc.eval_string("/domain/os/type/@arch")
    }

    pub fn machine(&self) -> Option<String> {
        self.doc.eval_string("/domain/os/type/@machine")
    }

    pub fn emulator(&self) -> Option<String> {
        self.doc.eval_string("/domain/devices/emulator")
    }

    /// Domain capabilities lookup key derived from this descriptor
    pub fn domcaps_query(&self) -> DomCapsKey {
        DomCapsKey {
            emulator: self.emulator(),
            arch: self.arch(),
            machine: self.machine(),
            virttype: self.virt_type(),
        }
    }
}

/// Scale a libvirt memory value to KiB. Unknown units yield `None`.
pub fn memory_to_kib(value: u64, unit: Option<&str>) -> Option<u64> {
    let bytes_per_unit: u64 = match unit.unwrap_or("KiB") {
        "b" | "bytes" => 1,
        "KB" => 1_000,
        "k" | "KiB" => 1 << 10,
        "MB" => 1_000_000,
        "M" | "MiB" => 1 << 20,
        "GB" => 1_000_000_000,
        "G" | "GiB" => 1 << 30,
        "TB" => 1_000_000_000_000,
        "T" | "TiB" => 1 << 40,
        _ => return None,
    };
    value.checked_mul(bytes_per_unit).map(|bytes| bytes / 1024)
}
