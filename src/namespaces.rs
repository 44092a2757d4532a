//! Qualified names and in-scope namespace bindings
//!
//! Element and attribute names are stored as [`QName`]s. A
//! [`NamespaceContext`] holds the prefix bindings in effect at one element;
//! the document builds it while parsing and serializing, and reference
//! resolution builds it at the referencing element to resolve
//! `prefix:local` identifiers.

use std::fmt;

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Namespace bound to the `xml` prefix in every scope
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace of `xmlns` declaration attributes
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// BPMN 2.0 model namespace
pub const BPMN20_NAMESPACE: &str = "http://www.omg.org/spec/BPMN/20100524/MODEL";

/// Namespace URI plus local name, printed in Clark notation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace URI, `None` for names in no namespace
    pub namespace: Option<String>,
    /// Local part
    pub local_name: String,
}

impl QName {
    /// Build a name from an optional namespace
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(Into::into),
            local_name: local_name.into(),
        }
    }

    /// Name in no namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self::new(None::<String>, local_name)
    }

    /// Name in `namespace`
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::new(Some(namespace), local_name)
    }

    /// Namespace URI as a string slice
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{{{}}}", ns)?;
        }
        f.write_str(&self.local_name)
    }
}

/// Prefix bindings in scope at one element
///
/// The key `None` stands for the default namespace. Later bindings of the
/// same prefix shadow earlier ones, which is how nested declarations are
/// layered when walking down from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceContext {
    bindings: IndexMap<Option<String>, String>,
}

impl NamespaceContext {
    /// Scope with only `xml` bound
    pub fn new() -> Self {
        let mut bindings = IndexMap::new();
        bindings.insert(Some("xml".to_string()), XML_NAMESPACE.to_string());
        Self { bindings }
    }

    /// Bind `prefix`, or the default namespace when `prefix` is `None`
    ///
    /// Binding the default namespace to the empty URI undeclares it.
    pub fn declare(&mut self, prefix: Option<&str>, namespace: &str) {
        match prefix {
            None if namespace.is_empty() => {
                self.bindings.shift_remove(&None);
            }
            _ => {
                self.bindings
                    .insert(prefix.map(str::to_string), namespace.to_string());
            }
        }
    }

    /// Layer one element's declarations over this scope
    pub fn extend(&mut self, declarations: &IndexMap<Option<String>, String>) {
        for (prefix, namespace) in declarations {
            self.declare(prefix.as_deref(), namespace);
        }
    }

    /// Namespace bound to `prefix`; `None` asks for the default namespace
    pub fn lookup(&self, prefix: Option<&str>) -> Option<&str> {
        self.bindings
            .get(&prefix.map(str::to_string))
            .map(String::as_str)
    }

    /// Default namespace in scope
    pub fn default_namespace(&self) -> Option<&str> {
        self.lookup(None)
    }

    /// A prefix bound to `namespace`, preferring the newest binding
    pub fn prefix_for(&self, namespace: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .filter(|(_, uri)| uri.as_str() == namespace)
            .find_map(|(prefix, _)| prefix.as_deref())
    }

    /// First `nsN` prefix that is not bound yet
    pub fn unused_prefix(&self) -> String {
        let mut i = 0;
        loop {
            let candidate = format!("ns{}", i);
            if self.lookup(Some(&candidate)).is_none() {
                return candidate;
            }
            i += 1;
        }
    }

    /// Resolve a lexical element or attribute name
    ///
    /// Unprefixed element names take the default namespace; unprefixed
    /// attribute names are in no namespace. Returns the prefix that was
    /// written along with the resolved name.
    pub fn qualify(&self, lexical: &str, attribute: bool) -> Result<(Option<String>, QName)> {
        match lexical.split_once(':') {
            Some((prefix, local)) => {
                let namespace = self.lookup(Some(prefix)).ok_or_else(|| {
                    Error::Namespace(format!("Unknown prefix '{}' in name '{}'", prefix, lexical))
                })?;
                Ok((Some(prefix.to_string()), QName::namespaced(namespace, local)))
            }
            None if attribute => Ok((None, QName::local(lexical))),
            None => Ok((None, QName::new(self.default_namespace(), lexical))),
        }
    }
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_display_uses_clark_notation() {
        assert_eq!(
            QName::namespaced(BPMN20_NAMESPACE, "task").to_string(),
            format!("{{{}}}task", BPMN20_NAMESPACE)
        );
        assert_eq!(QName::local("task").to_string(), "task");
        assert_eq!(QName::new(None::<String>, "x"), QName::local("x"));
    }

    #[test]
    fn test_declare_and_undeclare_default() {
        let mut ctx = NamespaceContext::new();
        ctx.declare(Some("bpmn"), BPMN20_NAMESPACE);
        ctx.declare(None, "http://example.com");

        assert_eq!(ctx.lookup(Some("bpmn")), Some(BPMN20_NAMESPACE));
        assert_eq!(ctx.lookup(Some("xml")), Some(XML_NAMESPACE));
        assert_eq!(ctx.default_namespace(), Some("http://example.com"));

        ctx.declare(None, "");
        assert_eq!(ctx.default_namespace(), None);
    }

    #[test]
    fn test_prefix_for_follows_rebinding() {
        let mut ctx = NamespaceContext::new();
        ctx.declare(Some("a"), "urn:one");
        ctx.declare(Some("b"), "urn:one");
        assert_eq!(ctx.prefix_for("urn:one"), Some("b"));

        ctx.declare(Some("b"), "urn:two");
        assert_eq!(ctx.prefix_for("urn:one"), Some("a"));
        assert_eq!(ctx.prefix_for("urn:three"), None);
    }

    #[test]
    fn test_unused_prefix() {
        let mut ctx = NamespaceContext::new();
        assert_eq!(ctx.unused_prefix(), "ns0");
        ctx.declare(Some("ns0"), "urn:x");
        assert_eq!(ctx.unused_prefix(), "ns1");
    }

    #[test]
    fn test_qualify_names() {
        let mut ctx = NamespaceContext::new();
        ctx.declare(Some("tns"), "http://example.com/model");
        ctx.declare(None, BPMN20_NAMESPACE);

        let (prefix, name) = ctx.qualify("tns:flow", false).unwrap();
        assert_eq!(prefix.as_deref(), Some("tns"));
        assert_eq!(name, QName::namespaced("http://example.com/model", "flow"));

        let (_, element) = ctx.qualify("task", false).unwrap();
        assert_eq!(element.namespace(), Some(BPMN20_NAMESPACE));
        let (_, attribute) = ctx.qualify("id", true).unwrap();
        assert_eq!(attribute, QName::local("id"));

        assert!(matches!(ctx.qualify("other:flow", false), Err(Error::Namespace(_))));
    }
}
