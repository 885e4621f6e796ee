//! Findings, warnings and their aggregation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where the reported problem lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WarningDomain {
    /// The problem lies inside of domain XML
    Domain = 0,

    /// The problem lies on the host
    Node = 1,
}

/// How bad the reported problem is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WarningLevel {
    /// Critical error, domain won't start
    Error = 0,

    /// Suboptimal domain configuration
    Warning = 1,

    /// Domain configuration is okay, but can use tweaking
    Notice = 2,
}

impl WarningDomain {
    pub const ALL: [WarningDomain; 2] = [WarningDomain::Domain, WarningDomain::Node];

    pub fn as_str(self) -> &'static str {
        match self {
            WarningDomain::Domain => "Domain",
            WarningDomain::Node => "Node",
        }
    }
}

impl WarningLevel {
    pub const ALL: [WarningLevel; 3] = [
        WarningLevel::Error,
        WarningLevel::Warning,
        WarningLevel::Notice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WarningLevel::Error => "Error",
            WarningLevel::Warning => "Warning",
            WarningLevel::Notice => "Notice",
        }
    }
}

impl fmt::Display for WarningDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i64> for WarningDomain {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, String> {
        WarningDomain::ALL
            .into_iter()
            .find(|d| *d as i64 == value)
            .ok_or_else(|| format!("Unknown warning domain {value}"))
    }
}

impl TryFrom<i64> for WarningLevel {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, String> {
        WarningLevel::ALL
            .into_iter()
            .find(|l| *l as i64 == value)
            .ok_or_else(|| format!("Unknown warning level {value}"))
    }
}

impl FromStr for WarningDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WarningDomain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown warning domain '{s}'"))
    }
}

impl FromStr for WarningLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WarningLevel::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown warning level '{s}'"))
    }
}

/// One validator output item, before tags are attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub domain: WarningDomain,
    pub level: WarningLevel,
    pub msg: String,
}

impl Finding {
    pub fn new(domain: WarningDomain, level: WarningLevel, msg: impl Into<String>) -> Self {
        Self {
            domain,
            level,
            msg: msg.into(),
        }
    }
}

/// A reported finding together with the tags of the validator that produced it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Warning {
    pub tags: Vec<String>,
    pub domain: WarningDomain,
    pub level: WarningLevel,
    pub msg: String,
}

impl Warning {
    pub fn new(tags: &[String], finding: Finding) -> Self {
        Self {
            tags: tags.to_vec(),
            domain: finding.domain,
            level: finding.level,
            msg: finding.msg,
        }
    }

    pub fn get(&self) -> (&[String], WarningDomain, WarningLevel, &str) {
        (&self.tags, self.domain, self.level, &self.msg)
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tags={:?}\tdomain={}\tlevel={}\tmsg={}",
            self.tags, self.domain, self.level, self.msg
        )
    }
}

/// Collects warnings for a single validation call in execution order
#[derive(Debug, Default)]
pub struct WarningAggregator {
    warnings: Vec<Warning>,
}

impl WarningAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `tags` to every finding, keeping finding order
    pub fn extend(&mut self, tags: &[String], findings: Vec<Finding>) {
        self.warnings
            .extend(findings.into_iter().map(|f| Warning::new(tags, f)));
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn finish(self) -> Vec<Warning> {
        self.warnings
    }
}
