//! XML document tree
//!
//! Elements live in an arena owned by [`Document`] and are addressed by
//! [`NodeId`] handles. A handle carries the generation of its slot, so a
//! handle to a removed element is detected instead of silently reading
//! whatever element later reuses the slot.
//!
//! The tree knows nothing about element types. It provides ordered
//! children, ordered attributes, namespace declarations and in-scope
//! prefix lookup, plus parsing from and serializing to XML text.

use crate::error::{Error, Result, StructureError};
use crate::limits::Limits;
use crate::namespaces::{NamespaceContext, QName, XMLNS_NAMESPACE};
use indexmap::IndexMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fmt;
use std::io::Cursor;

/// Handle to an element stored in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Arena slot of this node
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// XML element in the document tree
#[derive(Debug, Clone)]
pub struct Element {
    /// Element qualified name
    pub qname: QName,
    /// Prefix the element was written with, if any
    pub prefix: Option<String>,
    /// Attributes in document order
    pub attributes: IndexMap<QName, String>,
    /// Namespace declarations made on this element (None = default namespace)
    pub namespaces: IndexMap<Option<String>, String>,
    /// Text content (if any)
    pub text: Option<String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Element {
    fn new(qname: QName) -> Self {
        Self {
            qname,
            prefix: None,
            attributes: IndexMap::new(),
            namespaces: IndexMap::new(),
            text: None,
            children: Vec::new(),
            parent: None,
        }
    }

    /// Get the local name of the element
    pub fn local_name(&self) -> &str {
        &self.qname.local_name
    }

    /// Get the namespace of the element
    pub fn namespace(&self) -> Option<&str> {
        self.qname.namespace()
    }

    /// Child elements in document order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent element
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    element: Option<Element>,
}

/// XML document: an arena of elements with an optional root
#[derive(Debug, Clone, Default)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<NodeId>,
    live: usize,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live elements (attached or not)
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if the document holds no elements
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Create a detached element
    pub fn create_element(&mut self, qname: QName) -> NodeId {
        self.live += 1;
        let element = Element::new(qname);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.element = Some(element);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                element: Some(element),
            });
            NodeId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    /// Check if the handle refers to a live element
    pub fn contains(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index())
            .map(|slot| slot.generation == id.generation && slot.element.is_some())
            .unwrap_or(false)
    }

    /// Get an element
    pub fn get(&self, id: NodeId) -> Result<&Element> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.element.as_ref())
            .ok_or_else(|| Error::StaleElement(format!("element {} has been removed", id)))
    }

    /// Get an element mutably
    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Element> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.element.as_mut())
            .ok_or_else(|| Error::StaleElement(format!("element {} has been removed", id)))
    }

    /// Get the root element
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Make `id` the root element, returning the previous root (now detached)
    pub fn set_root(&mut self, id: NodeId) -> Result<Option<NodeId>> {
        if self.root == Some(id) {
            return Ok(None);
        }
        self.detach(id)?;
        Ok(self.root.replace(id))
    }

    /// Parent of an element
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(id)?.parent)
    }

    /// Children of an element in document order
    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.get(id)?.children)
    }

    /// Position of an element among its parent's children
    pub fn index_in_parent(&self, id: NodeId) -> Result<Option<usize>> {
        match self.get(id)?.parent {
            Some(parent) => Ok(self
                .get(parent)?
                .children
                .iter()
                .position(|child| *child == id)),
            None => Ok(None),
        }
    }

    /// Check if the element is reachable from the root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            match self.get(current) {
                Ok(element) => match element.parent {
                    Some(parent) => current = parent,
                    None => return self.root == Some(current),
                },
                Err(_) => return false,
            }
        }
    }

    /// Check if `ancestor` is `id` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.get(node).ok().and_then(|e| e.parent);
        }
        false
    }

    /// Insert `child` at `index` among the children of `parent`
    ///
    /// The child is moved if it currently has another position in the tree.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        self.get(parent)?;
        self.get(child)?;
        if self.is_ancestor_or_self(child, parent) {
            return Err(StructureError::new(format!(
                "cannot insert element {} into itself or one of its descendants",
                child
            ))
            .into());
        }
        self.detach(child)?;
        let siblings = &mut self.get_mut(parent)?.children;
        let index = index.min(siblings.len());
        siblings.insert(index, child);
        self.get_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Append `child` as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let len = self.children(parent)?.len();
        self.insert_child(parent, len, child)
    }

    /// Detach an element from its parent (or from the root position)
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        match self.get(id)?.parent {
            Some(parent) => {
                self.get_mut(parent)?.children.retain(|child| *child != id);
                self.get_mut(id)?.parent = None;
            }
            None => {
                if self.root == Some(id) {
                    self.root = None;
                }
            }
        }
        Ok(())
    }

    /// Put `new` in the tree position of `old`; `old` becomes detached
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.is_ancestor_or_self(new, old) {
            return Err(StructureError::new(format!(
                "cannot replace element {} with its ancestor {}",
                old, new
            ))
            .into());
        }
        self.detach(new)?;
        match self.get(old)?.parent {
            Some(parent) => {
                let index = self
                    .index_in_parent(old)?
                    .unwrap_or_else(|| self.children(parent).map(|c| c.len()).unwrap_or(0));
                self.detach(old)?;
                self.insert_child(parent, index, new)
            }
            None if self.root == Some(old) => {
                self.root = Some(new);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Detach an element and free it together with all its descendants
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        let subtree = self.descendants(id)?;
        self.detach(id)?;
        for node in subtree {
            let slot = &mut self.slots[node.index()];
            slot.element = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node.index);
            self.live -= 1;
        }
        Ok(())
    }

    /// The element and all its descendants in depth-first document order
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            let element = self.get(node)?;
            result.push(node);
            stack.extend(element.children.iter().rev().copied());
        }
        Ok(result)
    }

    /// Get an attribute value
    pub fn attribute(&self, id: NodeId, name: &QName) -> Result<Option<&str>> {
        Ok(self.get(id)?.attributes.get(name).map(|s| s.as_str()))
    }

    /// Set an attribute value, returning the previous value
    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: QName,
        value: impl Into<String>,
    ) -> Result<Option<String>> {
        Ok(self.get_mut(id)?.attributes.insert(name, value.into()))
    }

    /// Remove an attribute, returning the previous value
    pub fn remove_attribute(&mut self, id: NodeId, name: &QName) -> Result<Option<String>> {
        Ok(self.get_mut(id)?.attributes.shift_remove(name))
    }

    /// Text content of an element
    pub fn text(&self, id: NodeId) -> Result<Option<&str>> {
        Ok(self.get(id)?.text.as_deref())
    }

    /// Replace the text content of an element
    pub fn set_text(&mut self, id: NodeId, text: Option<String>) -> Result<()> {
        self.get_mut(id)?.text = text;
        Ok(())
    }

    /// Declare a namespace on an element (`None` prefix = default namespace)
    pub fn declare_namespace(
        &mut self,
        id: NodeId,
        prefix: Option<&str>,
        namespace: impl Into<String>,
    ) -> Result<()> {
        self.get_mut(id)?
            .namespaces
            .insert(prefix.map(str::to_string), namespace.into());
        Ok(())
    }

    /// Namespace declarations in scope at an element
    pub fn namespace_context(&self, id: NodeId) -> Result<NamespaceContext> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            let element = self.get(node)?;
            chain.push(element);
            current = element.parent;
        }

        let mut ctx = NamespaceContext::new();
        for element in chain.into_iter().rev() {
            ctx.extend(&element.namespaces);
        }
        Ok(ctx)
    }

    /// Parse an XML document from a string
    pub fn from_string(xml: &str) -> Result<Self> {
        Self::parse(xml.as_bytes(), &Limits::default())
    }

    /// Parse an XML document from bytes
    pub fn parse(xml: &[u8], limits: &Limits) -> Result<Self> {
        limits.check_xml_size(xml.len())?;

        let mut reader = Reader::from_reader(xml);
        reader.trim_text(true);

        let mut doc = Document::new();
        // open elements with the namespace scope each one established
        let mut stack: Vec<(NodeId, NamespaceContext)> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let (node, ctx) = doc.parse_element(&e, &stack, limits)?;
                    stack.push((node, ctx));
                    limits.check_xml_depth(stack.len())?;
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Empty(e)) => {
                    doc.parse_element(&e, &stack, limits)?;
                    limits.check_xml_depth(stack.len() + 1)?;
                }
                Ok(Event::Text(e)) => {
                    if let Some((current, _)) = stack.last() {
                        let text = e
                            .unescape()
                            .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                        doc.append_text(*current, &text)?;
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some((current, _)) = stack.last() {
                        let text = String::from_utf8(e.into_inner().into_owned())
                            .map_err(|e| Error::Xml(format!("Invalid CDATA content: {}", e)))?;
                        doc.append_text(*current, &text)?;
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Xml(format!(
                        "Error parsing XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {} // comments, processing instructions, doctype
            }
            buf.clear();
        }

        if doc.root.is_none() {
            return Err(Error::Xml("document has no root element".to_string()));
        }
        Ok(doc)
    }

    fn append_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let element = self.get_mut(id)?;
        match element.text {
            Some(ref mut existing) => existing.push_str(text),
            None => element.text = Some(text.to_string()),
        }
        Ok(())
    }

    /// Create an element from a start tag and link it below the open parent
    fn parse_element(
        &mut self,
        start: &BytesStart,
        stack: &[(NodeId, NamespaceContext)],
        limits: &Limits,
    ) -> Result<(NodeId, NamespaceContext)> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
            .to_string();

        let mut ctx = stack
            .last()
            .map(|(_, ctx)| ctx.clone())
            .unwrap_or_default();
        let mut declarations = IndexMap::new();
        let mut raw_attributes = Vec::new();

        for attr_result in start.attributes() {
            let attr = attr_result
                .map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;
            let attr_name = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?
                .to_string();
            let attr_value = attr
                .unescape_value()
                .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
                .to_string();

            if attr_name == "xmlns" {
                declarations.insert(None, attr_value);
            } else if let Some(prefix) = attr_name.strip_prefix("xmlns:") {
                declarations.insert(Some(prefix.to_string()), attr_value);
            } else {
                raw_attributes.push((attr_name, attr_value));
            }
        }
        limits.check_attributes(raw_attributes.len())?;
        limits.check_namespaces(declarations.len())?;
        ctx.extend(&declarations);

        let (prefix, qname) = ctx.qualify(&name, false)?;
        let node = self.create_element(qname);
        limits.check_elements(self.live)?;
        {
            let element = self.get_mut(node)?;
            element.prefix = prefix;
            element.namespaces = declarations;
            for (attr_name, attr_value) in raw_attributes {
                let (_, attr_qname) = ctx.qualify(&attr_name, true)?;
                element.attributes.insert(attr_qname, attr_value);
            }
        }

        match stack.last() {
            Some((parent, _)) => self.append_child(*parent, node)?,
            None => {
                if self.root.is_some() {
                    return Err(Error::Xml("document has more than one root element".into()));
                }
                self.root = Some(node);
            }
        }

        Ok((node, ctx))
    }

    /// Serialize the document to an XML string
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_write_error)?;
        if let Some(root) = self.root {
            self.write_element(&mut writer, root, &NamespaceContext::new())?;
        }
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| Error::Xml(format!("Serialized document is not UTF-8: {}", e)))
    }

    /// Serialize a single element and its subtree
    pub fn element_to_xml(&self, id: NodeId) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        let scope = match self.parent(id)? {
            Some(parent) => self.namespace_context(parent)?,
            None => NamespaceContext::new(),
        };
        self.write_element(&mut writer, id, &scope)?;
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| Error::Xml(format!("Serialized element is not UTF-8: {}", e)))
    }

    fn write_element(
        &self,
        writer: &mut Writer<Cursor<Vec<u8>>>,
        id: NodeId,
        scope: &NamespaceContext,
    ) -> Result<()> {
        let element = self.get(id)?;
        let mut ctx = scope.clone();
        let mut declarations: Vec<(String, String)> = Vec::new();

        for (prefix, uri) in &element.namespaces {
            match prefix {
                Some(prefix) => declarations.push((format!("xmlns:{}", prefix), uri.clone())),
                None => declarations.push(("xmlns".to_string(), uri.clone())),
            }
        }
        ctx.extend(&element.namespaces);
        let declares_default = element.namespaces.contains_key(&None);

        let name = match element.qname.namespace() {
            None => {
                if ctx.default_namespace().is_some() {
                    if declares_default {
                        return Err(Error::Namespace(format!(
                            "element '{}' has no namespace but declares a default namespace",
                            element.local_name()
                        )));
                    }
                    ctx.declare(None, "");
                    declarations.push(("xmlns".to_string(), String::new()));
                }
                element.local_name().to_string()
            }
            Some(ns) => {
                let original = element
                    .prefix
                    .as_deref()
                    .filter(|prefix| ctx.lookup(Some(prefix)) == Some(ns));
                if let Some(prefix) = original {
                    format!("{}:{}", prefix, element.local_name())
                } else if ctx.default_namespace() == Some(ns) {
                    element.local_name().to_string()
                } else if let Some(prefix) = ctx.prefix_for(ns) {
                    format!("{}:{}", prefix, element.local_name())
                } else if !declares_default {
                    ctx.declare(None, ns);
                    declarations.push(("xmlns".to_string(), ns.to_string()));
                    element.local_name().to_string()
                } else {
                    let prefix = ctx.unused_prefix();
                    ctx.declare(Some(&prefix), ns);
                    declarations.push((format!("xmlns:{}", prefix), ns.to_string()));
                    format!("{}:{}", prefix, element.local_name())
                }
            }
        };

        let mut attributes: Vec<(String, String)> = Vec::new();
        for (qname, value) in &element.attributes {
            let attr_name = match qname.namespace() {
                None => qname.local_name.clone(),
                Some(XMLNS_NAMESPACE) => continue,
                Some(ns) => {
                    let prefix = match ctx.prefix_for(ns) {
                        Some(prefix) => prefix.to_string(),
                        None => {
                            let prefix = ctx.unused_prefix();
                            ctx.declare(Some(&prefix), ns);
                            declarations.push((format!("xmlns:{}", prefix), ns.to_string()));
                            prefix
                        }
                    };
                    format!("{}:{}", prefix, qname.local_name)
                }
            };
            attributes.push((attr_name, value.clone()));
        }

        let mut start = BytesStart::new(name.as_str());
        for (key, value) in declarations.iter().chain(attributes.iter()) {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        let text = element.text.as_deref().filter(|t| !t.is_empty());
        if element.children.is_empty() && text.is_none() {
            writer
                .write_event(Event::Empty(start))
                .map_err(xml_write_error)?;
            return Ok(());
        }

        writer
            .write_event(Event::Start(start))
            .map_err(xml_write_error)?;
        if let Some(text) = text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(xml_write_error)?;
        }
        for child in &element.children {
            self.write_element(writer, *child, &ctx)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(name.as_str())))
            .map_err(xml_write_error)?;
        Ok(())
    }
}

fn xml_write_error(e: quick_xml::Error) -> Error {
    Error::Xml(format!("Failed to write XML: {}", e))
}
