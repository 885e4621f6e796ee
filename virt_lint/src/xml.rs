//! Thin wrapper over libxml parsing and XPath evaluation

use crate::errors::{VirtLintError, VirtLintResult};
use libxml::parser::{Parser, ParserOptions};
use libxml::tree::{Document, NodeType};
use libxml::xpath;
use std::num::ParseIntError;

/// A parsed, read-only XML document
pub struct XmlDocument {
    doc: Document,
}

impl std::fmt::Debug for XmlDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlDocument")
            .field("root", &self.root_name())
            .finish()
    }
}

impl XmlDocument {
    /// Parses `xml` without error recovery.
    ///
    /// `what` names the document in errors. When `expected_root` is given the root
    /// element must carry that name.
    pub fn parse(xml: &str, what: &'static str, expected_root: Option<&str>) -> VirtLintResult<Self> {
        let options = ParserOptions {
            recover: false,
            no_error: true,
            no_warning: true,
            no_net: true,
            ..ParserOptions::default()
        };

        let doc = Parser::default()
            .parse_string_with_options(xml, options)
            .map_err(|e| VirtLintError::parse(what, format!("{e:?}")))?;

        let root = doc
            .get_root_element()
            .ok_or_else(|| VirtLintError::parse(what, "document has no root element"))?;

        if let Some(expected) = expected_root {
            let name = root.get_name();
            if name != expected {
                return Err(VirtLintError::parse(
                    what,
                    format!("expected <{expected}> root element, found <{name}>"),
                ));
            }
        }

        Ok(Self { doc })
    }

    pub fn root_name(&self) -> Option<String> {
        self.doc.get_root_element().map(|n| n.get_name())
    }

    fn context(&self) -> Result<xpath::Context, String> {
        xpath::Context::new(&self.doc).map_err(|e| format!("XPath context: {e:?}"))
    }

    /// Every node matched by `expr`. Attributes yield their value, anything else its
    /// serialized markup.
    pub fn eval_nodes(&self, expr: &str) -> Result<Vec<String>, String> {
        let ctx = self.context()?;
        let nodes = ctx
            .evaluate(expr)
            .map_err(|e| format!("invalid XPath '{expr}': {e:?}"))?
            .get_nodes_as_vec();

        Ok(nodes
            .iter()
            .map(|node| match node.get_type() {
                Some(NodeType::AttributeNode) | Some(NodeType::TextNode) => node.get_content(),
                _ => self.doc.node_to_string(node),
            })
            .collect())
    }

    /// Text content of every node matched by `expr`
    pub fn eval_texts(&self, expr: &str) -> Vec<String> {
        let Ok(ctx) = self.context() else {
            return Vec::new();
        };
        ctx.evaluate(expr)
            .map(|obj| {
                obj.get_nodes_as_vec()
                    .iter()
                    .map(|node| node.get_content().trim().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Concatenated text of the nodes matched by `expr`, `None` when nothing matched
    pub fn eval_string(&self, expr: &str) -> Option<String> {
        let texts = self.eval_texts(expr);
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }

    /// First match parsed as an unsigned integer
    pub fn eval_u64(&self, expr: &str) -> Option<u64> {
        self.eval_texts(expr)
            .first()
            .and_then(|text| parse_int(text).ok())
    }

    pub fn matches(&self, expr: &str) -> bool {
        !self.eval_texts(expr).is_empty()
    }
}

/// Parses decimal, `0x`, `0o` and `0b` prefixed integers
pub fn parse_int(s: &str) -> Result<u64, ParseIntError> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if let Some(oct) = s.strip_prefix("0o") {
        u64::from_str_radix(oct, 8)
    } else if let Some(bin) = s.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else {
        s.parse::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const DOC: &str = r#"<domain type='kvm'>
  <memory unit='KiB'>1048576</memory>
  <devices>
    <controller type='pci' index='1'><target chassis='1'/></controller>
    <controller type='pci' index='2'><target chassis='2'/></controller>
  </devices>
</domain>"#;

    #[test]
    fn test_parse_and_eval() {
        let doc = XmlDocument::parse(DOC, "domain", Some("domain")).unwrap();

        assert_eq!(doc.root_name().as_deref(), Some("domain"));
        assert_eq!(doc.eval_string("//domain/@type").as_deref(), Some("kvm"));
        assert_eq!(doc.eval_u64("//domain/memory"), Some(1048576));
        assert_eq!(
            doc.eval_texts("//controller/target/@chassis"),
            vec!["1".to_string(), "2".to_string()]
        );
        assert!(doc.eval_string("//domain/vcpu").is_none());
    }

    #[test]
    fn test_eval_nodes_serializes_elements() {
        let doc = XmlDocument::parse(DOC, "domain", None).unwrap();
        let nodes = doc.eval_nodes("//controller[@index='1']/target").unwrap();

        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].contains("chassis=\"1\""));
        assert!(doc.eval_nodes("//[").is_err());
    }

    #[test]
    fn test_malformed_input() {
        assert_matches!(
            XmlDocument::parse("<domain><memory></domain>", "domain", None),
            Err(VirtLintError::Parse { what: "domain", .. })
        );
        assert_matches!(
            XmlDocument::parse("", "domain", None),
            Err(VirtLintError::Parse { .. })
        );
    }

    #[test]
    fn test_unexpected_root() {
        let result = XmlDocument::parse("<capabilities/>", "domain", Some("domain"));
        assert_matches!(result, Err(VirtLintError::Parse { reason, .. }) if reason.contains("capabilities"));
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("0x10"), Ok(16));
        assert_eq!(parse_int("0o17"), Ok(15));
        assert_eq!(parse_int("0b101"), Ok(5));
        assert_eq!(parse_int(" 42 "), Ok(42));
        assert!(parse_int("zz").is_err());
    }
}
