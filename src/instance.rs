//! Model instances
//!
//! A [`ModelInstance`] binds a [`Document`] to a [`Model`] and keeps an
//! [`IdentityIndex`] over it. Elements are addressed by [`ModelElement`]
//! handles; a handle is a plain node reference, so two handles to the
//! same node compare equal no matter how they were obtained.
//!
//! Every mutation goes through the instance so the index stays current:
//! attaching or detaching a subtree indexes or unindexes its ids, and
//! writing an id attribute reindexes the element and rewrites the
//! references that named it by its old id.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::documents::{Document, NodeId};
use crate::error::{Result, StructureError};
use crate::index::IdentityIndex;
use crate::limits::Limits;
use crate::model::children::{sequence_position, OccursViolation};
use crate::model::{AttributeDecl, AttributeId, ChildId, ElementType, Model, TypeId};
use crate::names::validate_ncname;
use crate::namespaces::QName;

/// Handle to an element of a [`ModelInstance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelElement {
    node: NodeId,
}

impl ModelElement {
    pub(crate) fn from_node(node: NodeId) -> Self {
        Self { node }
    }

    /// Underlying document node
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl From<NodeId> for ModelElement {
    fn from(node: NodeId) -> Self {
        Self::from_node(node)
    }
}

impl fmt::Display for ModelElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element {}", self.node)
    }
}

/// A typed view over elements of one registered type
pub trait TypedElement: Copy + Into<ModelElement> {
    /// Registered type name
    const TYPE_NAME: &'static str;

    /// Wrap an element already known to be of this type
    fn from_element_unchecked(element: ModelElement) -> Self;

    /// The wrapped element
    fn element(&self) -> ModelElement;

    /// Model whose declaration handles the façade uses, if it is bound to one
    ///
    /// Casting fails on instances of any other model.
    fn owning_model() -> Option<&'static Model> {
        None
    }
}

/// A document bound to a model
#[derive(Debug, Clone)]
pub struct ModelInstance {
    pub(crate) model: Arc<Model>,
    pub(crate) doc: Document,
    pub(crate) index: IdentityIndex,
}

impl ModelInstance {
    /// Create an instance over an empty document
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            doc: Document::new(),
            index: IdentityIndex::new(),
        }
    }

    /// Parse a document with default limits
    pub fn parse(model: Arc<Model>, xml: &str) -> Result<Self> {
        Self::parse_with_limits(model, xml.as_bytes(), &Limits::default())
    }

    /// Parse a document with explicit limits
    pub fn parse_with_limits(model: Arc<Model>, xml: &[u8], limits: &Limits) -> Result<Self> {
        let doc = Document::parse(xml, limits)?;
        Self::from_document(model, doc)
    }

    /// Bind an existing document tree
    pub fn from_document(model: Arc<Model>, doc: Document) -> Result<Self> {
        let mut instance = Self {
            model,
            doc,
            index: IdentityIndex::new(),
        };
        instance.rebuild_index()?;
        debug!(
            model = instance.model.name(),
            elements = instance.doc.len(),
            ids = instance.index.len();
            "Document bound"
        );
        let duplicates = instance.index.duplicates();
        if !duplicates.is_empty() {
            warn!(ids:? = duplicates; "Duplicate element ids");
        }
        Ok(instance)
    }

    /// The model
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub(crate) fn model_arc(&self) -> &Arc<Model> {
        &self.model
    }

    /// The underlying document tree
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The identity index
    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    /// Recompute the identity index from the tree
    pub fn rebuild_index(&mut self) -> Result<()> {
        self.index.clear();
        if let Some(root) = self.doc.root() {
            self.index_subtree(root)?;
        }
        Ok(())
    }

    /// Serialize the document
    pub fn to_xml(&self) -> Result<String> {
        self.doc.to_xml()
    }

    /// Serialize one element and its subtree
    pub fn element_to_xml(&self, element: impl Into<ModelElement>) -> Result<String> {
        self.doc.element_to_xml(element.into().node)
    }

    // ----------------------------------------------------------------
    // Element access
    // ----------------------------------------------------------------

    /// The document element
    pub fn document_element(&self) -> Option<ModelElement> {
        self.doc.root().map(ModelElement::from_node)
    }

    /// Make `element` the document element; the previous one is detached
    pub fn set_document_element(&mut self, element: impl Into<ModelElement>) -> Result<()> {
        let node = element.into().node;
        self.doc.get(node)?;
        if let Some(old) = self.doc.root() {
            if old == node {
                return Ok(());
            }
            self.unindex_subtree(old)?;
        } else if self.doc.is_attached(node) {
            self.unindex_subtree(node)?;
        }
        self.doc.set_root(node)?;
        self.index_subtree(node)
    }

    /// Check if the handle refers to a live element
    pub fn contains(&self, element: impl Into<ModelElement>) -> bool {
        self.doc.contains(element.into().node)
    }

    /// Check if the element is part of the document tree
    pub fn is_attached(&self, element: impl Into<ModelElement>) -> bool {
        self.doc.is_attached(element.into().node)
    }

    /// Element name
    pub fn element_name(&self, element: impl Into<ModelElement>) -> Result<&QName> {
        Ok(&self.doc.get(element.into().node)?.qname)
    }

    /// Most specific registered type of the element
    pub fn element_type(&self, element: impl Into<ModelElement>) -> Result<&ElementType> {
        let ty = self.type_id_of(element.into())?;
        Ok(self.model.element_type(ty))
    }

    pub(crate) fn type_id_of(&self, element: ModelElement) -> Result<TypeId> {
        self.node_type(element.node)
    }

    pub(crate) fn node_type(&self, node: NodeId) -> Result<TypeId> {
        Ok(self.model.type_for_name(&self.doc.get(node)?.qname))
    }

    /// Parent element
    pub fn parent_element(&self, element: impl Into<ModelElement>) -> Result<Option<ModelElement>> {
        Ok(self
            .doc
            .parent(element.into().node)?
            .map(ModelElement::from_node))
    }

    /// Child elements in document order
    pub fn child_elements(&self, element: impl Into<ModelElement>) -> Result<Vec<ModelElement>> {
        Ok(self
            .doc
            .children(element.into().node)?
            .iter()
            .map(|node| ModelElement::from_node(*node))
            .collect())
    }

    /// Child elements of `ty` or a type extending it
    pub fn child_elements_by_type(
        &self,
        element: impl Into<ModelElement>,
        ty: TypeId,
    ) -> Result<Vec<ModelElement>> {
        let mut result = Vec::new();
        for node in self.doc.children(element.into().node)? {
            if self.model.is_a(self.node_type(*node)?, ty) {
                result.push(ModelElement::from_node(*node));
            }
        }
        Ok(result)
    }

    /// Attached elements of `ty` or a type extending it, in document order
    pub fn model_elements_by_type(&self, ty: TypeId) -> Result<Vec<ModelElement>> {
        let mut result = Vec::new();
        for node in self.attached_nodes()? {
            if self.model.is_a(self.node_type(node)?, ty) {
                result.push(ModelElement::from_node(node));
            }
        }
        Ok(result)
    }

    /// Attached elements of a typed façade
    pub fn elements_of<T: TypedElement>(&self) -> Result<Vec<T>> {
        let ty = self.typed_id::<T>()?;
        Ok(self
            .model_elements_by_type(ty)?
            .into_iter()
            .map(T::from_element_unchecked)
            .collect())
    }

    /// First attached element carrying `id`
    pub fn get_model_element_by_id(&self, id: &str) -> Option<ModelElement> {
        self.index
            .lookup(id)
            .first()
            .map(|node| ModelElement::from_node(*node))
    }

    pub(crate) fn attached_nodes(&self) -> Result<Vec<NodeId>> {
        match self.doc.root() {
            Some(root) => self.doc.descendants(root),
            None => Ok(Vec::new()),
        }
    }

    // ----------------------------------------------------------------
    // Creation and typed views
    // ----------------------------------------------------------------

    /// Create a detached element of a concrete type and run its instance provider
    pub fn new_instance(&mut self, ty: TypeId) -> Result<ModelElement> {
        let model = Arc::clone(&self.model);
        let element_type = model.element_type(ty);
        if ty == model.unknown_type() {
            return Err(StructureError::new("cannot instantiate the unknown element type").into());
        }
        if element_type.is_abstract() {
            return Err(StructureError::new("cannot instantiate an abstract type")
                .with_attempted(element_type.type_name())
                .with_permitted(
                    model
                        .all_extending_types(ty)
                        .into_iter()
                        .map(|t| model.element_type(t))
                        .filter(|t| !t.is_abstract())
                        .map(|t| t.type_name().to_string()),
                )
                .into());
        }

        let element = ModelElement::from_node(self.doc.create_element(element_type.qname().clone()));
        if let Some(provider) = element_type.instance_provider() {
            provider(self, element)?;
        }
        debug!(type_name = element_type.type_name(), node = element.node.to_string(); "Element created");
        Ok(element)
    }

    /// Create a detached element of the type registered under `type_name`
    pub fn new_instance_named(&mut self, type_name: &str) -> Result<ModelElement> {
        let ty = self.model.type_id(type_name).ok_or_else(|| {
            StructureError::new(format!("unknown type '{}'", type_name))
        })?;
        self.new_instance(ty)
    }

    /// Create a detached element with an arbitrary name, e.g. an extension element
    pub fn new_element(&mut self, name: QName) -> ModelElement {
        ModelElement::from_node(self.doc.create_element(name))
    }

    /// Create a detached element wrapped in its typed façade
    pub fn new_typed<T: TypedElement>(&mut self) -> Result<T> {
        let ty = self.typed_id::<T>()?;
        self.new_instance(ty).map(T::from_element_unchecked)
    }

    /// View an element through a typed façade
    pub fn cast<T: TypedElement>(&self, element: impl Into<ModelElement>) -> Result<T> {
        let element = element.into();
        match self.try_cast::<T>(element)? {
            Some(typed) => Ok(typed),
            None => Err(StructureError::new("element is not of the requested type")
                .with_attempted(self.element_type(element)?.type_name())
                .with_permitted([T::TYPE_NAME])
                .into()),
        }
    }

    /// View an element through a typed façade if its type matches
    pub fn try_cast<T: TypedElement>(&self, element: impl Into<ModelElement>) -> Result<Option<T>> {
        let element = element.into();
        let ty = self.typed_id::<T>()?;
        if self.model.is_a(self.type_id_of(element)?, ty) {
            Ok(Some(T::from_element_unchecked(element)))
        } else {
            Ok(None)
        }
    }

    fn typed_id<T: TypedElement>(&self) -> Result<TypeId> {
        if let Some(owner) = T::owning_model() {
            if !std::ptr::eq(owner, Arc::as_ptr(&self.model)) {
                return Err(StructureError::new(format!(
                    "'{}' belongs to model '{}', not '{}'",
                    T::TYPE_NAME,
                    owner.name(),
                    self.model.name()
                ))
                .into());
            }
        }
        self.model.type_id(T::TYPE_NAME).ok_or_else(|| {
            StructureError::new(format!(
                "type '{}' is not registered in model '{}'",
                T::TYPE_NAME,
                self.model.name()
            ))
            .into()
        })
    }

    // ----------------------------------------------------------------
    // Attributes and text
    // ----------------------------------------------------------------

    /// Raw value of an unqualified attribute
    pub fn attribute_value(&self, element: impl Into<ModelElement>, name: &str) -> Result<Option<String>> {
        self.read_attribute(element.into().node, &QName::local(name))
    }

    /// Raw value of a namespaced attribute
    pub fn attribute_value_ns(
        &self,
        element: impl Into<ModelElement>,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>> {
        self.read_attribute(element.into().node, &QName::namespaced(namespace, name))
    }

    /// Write an unqualified attribute
    pub fn set_attribute_value(
        &mut self,
        element: impl Into<ModelElement>,
        name: &str,
        value: impl Into<String>,
    ) -> Result<()> {
        self.write_attribute(element.into().node, QName::local(name), value.into())
    }

    /// Write a namespaced attribute
    pub fn set_attribute_value_ns(
        &mut self,
        element: impl Into<ModelElement>,
        namespace: &str,
        name: &str,
        value: impl Into<String>,
    ) -> Result<()> {
        self.write_attribute(
            element.into().node,
            QName::namespaced(namespace, name),
            value.into(),
        )
    }

    /// Remove an unqualified attribute
    pub fn remove_attribute(&mut self, element: impl Into<ModelElement>, name: &str) -> Result<()> {
        self.delete_attribute(element.into().node, &QName::local(name))
    }

    /// Remove a namespaced attribute
    pub fn remove_attribute_ns(
        &mut self,
        element: impl Into<ModelElement>,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        self.delete_attribute(element.into().node, &QName::namespaced(namespace, name))
    }

    /// Trimmed text content, empty if there is none
    pub fn text_content(&self, element: impl Into<ModelElement>) -> Result<String> {
        Ok(self
            .doc
            .text(element.into().node)?
            .map(|text| text.trim().to_string())
            .unwrap_or_default())
    }

    /// Replace the text content
    pub fn set_text_content(&mut self, element: impl Into<ModelElement>, text: &str) -> Result<()> {
        let text = if text.is_empty() { None } else { Some(text.to_string()) };
        self.doc.set_text(element.into().node, text)
    }

    /// Bind `prefix` to `namespace` on the element (`None` binds the default namespace)
    pub fn declare_namespace(
        &mut self,
        element: impl Into<ModelElement>,
        prefix: Option<&str>,
        namespace: &str,
    ) -> Result<()> {
        if let Some(prefix) = prefix {
            validate_ncname(prefix)?;
        }
        self.doc.declare_namespace(element.into().node, prefix, namespace)
    }

    /// Identifier of the element, if it has one
    pub fn id_of(&self, element: impl Into<ModelElement>) -> Result<Option<String>> {
        self.id_value(element.into().node)
    }

    /// Target namespace declared on the document element
    pub fn target_namespace(&self) -> Result<Option<String>> {
        match self.doc.root() {
            Some(root) => Ok(self
                .doc
                .attribute(root, &QName::local("targetNamespace"))?
                .map(str::to_string)),
            None => Ok(None),
        }
    }

    /// Compare names, treating alternative namespaces as their actual namespace
    fn same_name(&self, a: &QName, b: &QName) -> bool {
        a.local_name == b.local_name
            && a.namespace().map(|ns| self.model.actual_namespace(ns))
                == b.namespace().map(|ns| self.model.actual_namespace(ns))
    }

    fn read_attribute(&self, node: NodeId, name: &QName) -> Result<Option<String>> {
        let element = self.doc.get(node)?;
        if let Some(value) = element.attributes.get(name) {
            return Ok(Some(value.clone()));
        }
        if name.namespace().is_some() {
            return Ok(element
                .attributes
                .iter()
                .find(|(key, _)| self.same_name(key, name))
                .map(|(_, value)| value.clone()));
        }
        Ok(None)
    }

    fn id_attribute_names(&self, node: NodeId) -> Result<Vec<&QName>> {
        let ty = self.node_type(node)?;
        Ok(self
            .model
            .resolve_effective(ty)
            .id_attributes
            .iter()
            .map(|id| self.model.attribute(*id).name())
            .collect())
    }

    fn is_id_attribute(&self, node: NodeId, name: &QName) -> Result<bool> {
        Ok(self
            .id_attribute_names(node)?
            .into_iter()
            .any(|id_name| self.same_name(id_name, name)))
    }

    /// First present id attribute value of a node
    pub(crate) fn id_value(&self, node: NodeId) -> Result<Option<String>> {
        Ok(self.id_values(node)?.into_iter().next())
    }

    fn id_values(&self, node: NodeId) -> Result<Vec<String>> {
        let mut values = Vec::new();
        for name in self.id_attribute_names(node)? {
            if let Some(value) = self.read_attribute(node, name)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Write an attribute, keeping the index and incoming references in step
    fn write_attribute(&mut self, node: NodeId, name: QName, value: String) -> Result<()> {
        let is_id = self.is_id_attribute(node, &name)?;
        let previous = match self.read_attribute(node, &name)? {
            Some(previous) if is_id => Some(previous),
            _ => None,
        };
        self.doc.set_attribute(node, name, value.clone())?;
        if !is_id || previous.as_deref() == Some(value.as_str()) {
            return Ok(());
        }

        // detached elements are not referenced
        if !self.doc.is_attached(node) {
            return Ok(());
        }
        if let Some(old) = previous.as_deref() {
            self.index.remove(old, node);
        }
        self.index.insert(&value, node);
        if let Some(old) = previous {
            let rewired = self.update_incoming_references(node, &old, &value)?;
            debug!(old_id = old.as_str(), new_id = value.as_str(), rewired = rewired; "Element id changed");
        }
        Ok(())
    }

    /// Remove an attribute; removing an id unlinks references to the element
    fn delete_attribute(&mut self, node: NodeId, name: &QName) -> Result<()> {
        if self.is_id_attribute(node, name)? {
            if let Some(old) = self.read_attribute(node, name)? {
                if self.doc.is_attached(node) {
                    let unlinked = self.unlink_incoming_references(node, &old)?;
                    self.index.remove(&old, node);
                    debug!(id = old.as_str(), unlinked = unlinked; "Element id removed");
                }
            }
        }
        self.doc.remove_attribute(node, name)?;
        Ok(())
    }

    // ----------------------------------------------------------------
    // Declared attributes and children
    // ----------------------------------------------------------------

    fn check_declared(&self, element: ModelElement, owner: TypeId, what: &str) -> Result<NodeId> {
        let ty = self.type_id_of(element)?;
        if self.model.is_a(ty, owner) {
            Ok(element.node)
        } else {
            Err(StructureError::new(format!("element does not declare {}", what))
                .with_attempted(self.model.element_type(ty).type_name())
                .with_permitted([self.model.element_type(owner).type_name()])
                .into())
        }
    }

    /// Raw value of a declared attribute, honouring alternative namespaces
    pub(crate) fn attribute_node(&self, node: NodeId, attribute: AttributeId) -> Result<Option<String>> {
        self.read_attribute(node, self.model.attribute(attribute).name())
    }

    pub(crate) fn declared_attribute(
        &self,
        element: ModelElement,
        attribute: AttributeId,
    ) -> Result<Option<String>> {
        let decl = self.model.attribute(attribute);
        let node = self.check_declared(element, decl.owner(), &format!("attribute '{}'", decl.name()))?;
        self.attribute_node(node, attribute)
    }

    pub(crate) fn set_declared_attribute(
        &mut self,
        element: ModelElement,
        attribute: AttributeId,
        value: String,
    ) -> Result<()> {
        let model = Arc::clone(&self.model);
        let decl = model.attribute(attribute);
        let node = self.check_declared(element, decl.owner(), &format!("attribute '{}'", decl.name()))?;
        // keep an existing alternative-namespace spelling of the name
        let name = self
            .doc
            .get(node)?
            .attributes
            .keys()
            .find(|key| self.same_name(key, decl.name()))
            .cloned()
            .unwrap_or_else(|| decl.name().clone());
        self.write_attribute(node, name, value)
    }

    pub(crate) fn remove_declared_attribute(&mut self, element: ModelElement, attribute: AttributeId) -> Result<()> {
        let model = Arc::clone(&self.model);
        let decl = model.attribute(attribute);
        let node = self.check_declared(element, decl.owner(), &format!("attribute '{}'", decl.name()))?;
        let present: Vec<QName> = self
            .doc
            .get(node)?
            .attributes
            .keys()
            .filter(|key| self.same_name(key, decl.name()))
            .cloned()
            .collect();
        for name in present {
            self.delete_attribute(node, &name)?;
        }
        Ok(())
    }

    pub(crate) fn declared_children(&self, parent: ModelElement, child: ChildId) -> Result<Vec<ModelElement>> {
        let decl = self.model.child(child);
        let node = self.check_declared(parent, decl.owner(), &format!("child '{}'", decl.target_name()))?;
        self.child_elements_by_type(ModelElement::from_node(node), decl.target_type())
    }

    /// Required attributes that are absent from the element
    pub fn missing_required_attributes(&self, element: impl Into<ModelElement>) -> Result<Vec<&AttributeDecl>> {
        let node = element.into().node;
        let ty = self.node_type(node)?;
        let mut missing = Vec::new();
        for id in &self.model.resolve_effective(ty).attributes {
            let decl = self.model.attribute(*id);
            if decl.is_required() && self.read_attribute(node, decl.name())?.is_none() {
                missing.push(decl);
            }
        }
        Ok(missing)
    }

    /// Child declarations whose occurrence bounds the element violates
    pub fn occurrence_violations(&self, element: impl Into<ModelElement>) -> Result<Vec<OccursViolation>> {
        let element = element.into();
        let ty = self.type_id_of(element)?;
        let mut violations = Vec::new();
        for id in &self.model.resolve_effective(ty).children {
            let decl = self.model.child(*id);
            let count = self.child_elements_by_type(element, decl.target_type())?.len() as u32;
            let occurs = decl.occurs();
            if occurs.is_missing(count) || occurs.is_exceeded(count) {
                violations.push(OccursViolation {
                    child: *id,
                    type_name: decl.target_name().to_string(),
                    count,
                    occurs,
                });
            }
        }
        Ok(violations)
    }

    /// Log the parent's occurrence violations of one kind after a mutation
    fn warn_violations(&self, parent: NodeId, missing: bool) -> Result<()> {
        for violation in self.occurrence_violations(ModelElement::from_node(parent))? {
            if violation.is_missing() != missing {
                continue;
            }
            let type_name = self.model.element_type(self.node_type(parent)?).type_name();
            if missing {
                warn!(parent = type_name, violation = violation.to_string(); "Occurrence minimum not met");
            } else {
                warn!(parent = type_name, violation = violation.to_string(); "Occurrence bound exceeded");
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Tree mutation
    // ----------------------------------------------------------------

    fn index_subtree(&mut self, node: NodeId) -> Result<()> {
        for n in self.doc.descendants(node)? {
            for id in self.id_values(n)? {
                self.index.insert(&id, n);
            }
        }
        Ok(())
    }

    fn unindex_subtree(&mut self, node: NodeId) -> Result<()> {
        for n in self.doc.descendants(node)? {
            for id in self.id_values(n)? {
                self.index.remove(&id, n);
            }
        }
        Ok(())
    }

    fn attach(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        if self.doc.is_attached(child) {
            self.unindex_subtree(child)?;
        }
        self.doc.insert_child(parent, index, child)?;
        if self.doc.is_attached(child) {
            self.index_subtree(child)?;
        }
        Ok(())
    }

    /// Put `new` in the tree position of `old`, keeping the index in step
    pub(crate) fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        if self.doc.is_attached(old) {
            self.unindex_subtree(old)?;
        }
        if self.doc.is_attached(new) {
            self.unindex_subtree(new)?;
        }
        self.doc.replace(old, new)?;
        if self.doc.is_attached(new) {
            self.index_subtree(new)?;
        }
        Ok(())
    }

    fn check_child_permitted(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_type = self.node_type(parent)?;
        let child_type = self.node_type(child)?;
        let unknown = self.model.unknown_type();
        if parent_type == unknown
            || child_type == unknown
            || sequence_position(&self.model, parent_type, child_type).is_some()
        {
            return Ok(());
        }
        let permitted = self
            .model
            .resolve_effective(parent_type)
            .children
            .iter()
            .map(|id| self.model.child(*id).target_name().to_string());
        Err(StructureError::new(format!(
            "'{}' does not permit this child element",
            self.model.element_type(parent_type).type_name()
        ))
        .with_attempted(self.model.element_type(child_type).type_name())
        .with_permitted(permitted)
        .into())
    }

    /// Insert `child` into `parent` at the position its type has in the sequence
    ///
    /// The child goes after the last sibling whose declaration does not come
    /// later than its own. A child that is already in the tree is moved.
    pub fn add_child_element(
        &mut self,
        parent: impl Into<ModelElement>,
        child: impl Into<ModelElement>,
    ) -> Result<()> {
        let parent = parent.into().node;
        let child = child.into().node;
        self.check_child_permitted(parent, child)?;

        let parent_type = self.node_type(parent)?;
        let rank = |ty: TypeId| -> isize {
            sequence_position(&self.model, parent_type, ty)
                .map(|p| p as isize)
                .unwrap_or(-1)
        };
        let own_rank = rank(self.node_type(child)?);
        let mut position = 0;
        for sibling in self.doc.children(parent)?.iter().filter(|s| **s != child) {
            if own_rank >= rank(self.node_type(*sibling)?) {
                position += 1;
            } else {
                break;
            }
        }

        self.attach(parent, position, child)?;
        self.warn_violations(parent, false)
    }

    /// Insert `child` into `parent` directly after `after`, or first if `None`
    pub fn insert_element_after(
        &mut self,
        parent: impl Into<ModelElement>,
        child: impl Into<ModelElement>,
        after: Option<ModelElement>,
    ) -> Result<()> {
        let parent = parent.into().node;
        let child = child.into().node;
        self.check_child_permitted(parent, child)?;

        let position = match after {
            None => 0,
            Some(after) => {
                if self.doc.parent(after.node)? != Some(parent) {
                    return Err(StructureError::new(
                        "insertion point is not a child of the parent element",
                    )
                    .into());
                }
                let siblings: Vec<NodeId> = self
                    .doc
                    .children(parent)?
                    .iter()
                    .copied()
                    .filter(|s| *s != child)
                    .collect();
                siblings
                    .iter()
                    .position(|s| *s == after.node)
                    .map(|p| p + 1)
                    .unwrap_or(siblings.len())
            }
        };

        self.attach(parent, position, child)?;
        self.warn_violations(parent, false)
    }

    /// Remove `child` from `parent` and free it
    ///
    /// References to the child and to its descendants are unlinked first.
    /// Returns false if `child` is not a child of `parent`.
    pub fn remove_child_element(
        &mut self,
        parent: impl Into<ModelElement>,
        child: impl Into<ModelElement>,
    ) -> Result<bool> {
        let parent = parent.into().node;
        let child = child.into().node;
        if !self.doc.contains(child) || self.doc.parent(child)? != Some(parent) {
            return Ok(false);
        }

        let mut unlinked = 0;
        for node in self.doc.descendants(child)? {
            if !self.doc.contains(node) {
                continue;
            }
            for id in self.id_values(node)? {
                unlinked += self.unlink_incoming_references(node, &id)?;
            }
        }
        if !self.doc.contains(child) {
            return Ok(true);
        }
        if self.doc.is_attached(child) {
            self.unindex_subtree(child)?;
        }
        self.doc.remove(child)?;
        debug!(node = child.to_string(), unlinked = unlinked; "Element removed");
        self.warn_violations(parent, true)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelBuilder, Reference};

    const NS: &str = "http://example.com/model";

    struct Fixture {
        model: Arc<Model>,
        owner_ref: Reference,
    }

    fn fixture() -> Fixture {
        let mut builder = ModelBuilder::new("test");
        let mut root = builder.define_type("Root", QName::namespaced(NS, "root"));
        root.element_collection("Item").required().build().unwrap();
        root.element_collection("Note").build().unwrap();
        root.build().unwrap();

        let mut item = builder.define_type("Item", QName::namespaced(NS, "item"));
        item.string_attribute("id").id_attribute().build().unwrap();
        let owner_ref = item.string_attribute("owner").id_attribute_reference("Item").build().unwrap();
        item.build().unwrap();

        builder.define_type("Note", QName::namespaced(NS, "note")).build().unwrap();
        Fixture {
            model: Arc::new(builder.build().unwrap()),
            owner_ref,
        }
    }

    fn parse(model: &Arc<Model>) -> ModelInstance {
        let xml = r#"<root xmlns="http://example.com/model">
            <item id="a"/>
            <item id="b" owner="a"/>
            <note/>
        </root>"#;
        ModelInstance::parse(Arc::clone(model), xml).unwrap()
    }

    #[test]
    fn test_parse_builds_index() {
        let f = fixture();
        let instance = parse(&f.model);
        let a = instance.get_model_element_by_id("a").unwrap();
        assert_eq!(instance.element_type(a).unwrap().type_name(), "Item");
        assert_eq!(instance.index().len(), 2);
        assert!(instance.get_model_element_by_id("missing").is_none());
    }

    #[test]
    fn test_id_change_reindexes_and_rewrites() {
        let f = fixture();
        let mut instance = parse(&f.model);
        let a = instance.get_model_element_by_id("a").unwrap();
        let b = instance.get_model_element_by_id("b").unwrap();

        instance.set_attribute_value(a, "id", "renamed").unwrap();
        assert!(instance.get_model_element_by_id("a").is_none());
        assert_eq!(instance.get_model_element_by_id("renamed"), Some(a));
        assert_eq!(
            instance.attribute_value(b, "owner").unwrap().as_deref(),
            Some("renamed")
        );
        assert_eq!(f.owner_ref.get(&instance, b).unwrap(), Some(a));
    }

    #[test]
    fn test_id_removal_unlinks() {
        let f = fixture();
        let mut instance = parse(&f.model);
        let a = instance.get_model_element_by_id("a").unwrap();
        let b = instance.get_model_element_by_id("b").unwrap();

        instance.remove_attribute(a, "id").unwrap();
        assert!(instance.attribute_value(b, "owner").unwrap().is_none());
        assert!(instance.get_model_element_by_id("a").is_none());
        assert_eq!(instance.get_model_element_by_id("b"), Some(b));
    }

    #[test]
    fn test_add_child_follows_sequence() {
        let f = fixture();
        let mut instance = parse(&f.model);
        let root = instance.document_element().unwrap();
        let item = instance.new_instance_named("Item").unwrap();
        instance.set_attribute_value(item, "id", "c").unwrap();
        instance.add_child_element(root, item).unwrap();

        let children = instance.child_elements(root).unwrap();
        assert_eq!(children.len(), 4);
        // after the existing items, before the note
        assert_eq!(children[2], item);
        assert_eq!(instance.get_model_element_by_id("c"), Some(item));
    }

    #[test]
    fn test_add_child_rejects_undeclared_type() {
        let f = fixture();
        let mut instance = parse(&f.model);
        let a = instance.get_model_element_by_id("a").unwrap();
        let note = instance.new_instance_named("Note").unwrap();
        let err = instance.add_child_element(a, note).unwrap_err();
        assert!(err.is_structure());
        assert!(err.to_string().contains("attempted 'Note'"));
    }

    #[test]
    fn test_extension_elements_are_opaque() {
        let f = fixture();
        let mut instance = parse(&f.model);
        let root = instance.document_element().unwrap();
        let ext = instance.new_element(QName::namespaced("urn:vendor", "extension"));
        instance.add_child_element(root, ext).unwrap();
        assert_eq!(instance.child_elements(root).unwrap()[0], ext);
        assert_eq!(
            instance.element_type(ext).unwrap().type_name(),
            crate::model::UNKNOWN_TYPE_NAME
        );
    }

    #[test]
    fn test_remove_child_unlinks_and_frees() {
        let f = fixture();
        let mut instance = parse(&f.model);
        let root = instance.document_element().unwrap();
        let a = instance.get_model_element_by_id("a").unwrap();
        let b = instance.get_model_element_by_id("b").unwrap();

        assert!(instance.remove_child_element(root, a).unwrap());
        assert!(!instance.contains(a));
        assert!(instance.attribute_value(b, "owner").unwrap().is_none());
        assert!(matches!(
            instance.attribute_value(a, "id"),
            Err(crate::Error::StaleElement(_))
        ));
        assert!(!instance.remove_child_element(root, a).unwrap());
    }

    #[test]
    fn test_removal_below_minimum_is_reported() {
        let f = fixture();
        let mut instance = parse(&f.model);
        let root = instance.document_element().unwrap();
        let a = instance.get_model_element_by_id("a").unwrap();
        let b = instance.get_model_element_by_id("b").unwrap();

        assert!(instance.remove_child_element(root, a).unwrap());
        assert!(instance.occurrence_violations(root).unwrap().is_empty());

        assert!(instance.remove_child_element(root, b).unwrap());
        let violations = instance.occurrence_violations(root).unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].is_missing());
        assert_eq!(violations[0].type_name, "Item");
        assert_eq!(violations[0].count, 0);
    }

    #[test]
    fn test_abstract_and_unknown_not_instantiable() {
        let mut builder = ModelBuilder::new("test");
        let mut base = builder.define_type("Base", QName::namespaced(NS, "base"));
        base.abstract_type();
        let base_id = base.build().unwrap();
        let mut concrete = builder.define_type("Concrete", QName::namespaced(NS, "concrete"));
        concrete.extends_type("Base");
        concrete.build().unwrap();
        let model = Arc::new(builder.build().unwrap());
        let mut instance = ModelInstance::new(Arc::clone(&model));

        let err = instance.new_instance(base_id).unwrap_err();
        assert!(err.to_string().contains("permitted: Concrete"));
        assert!(instance.new_instance(model.unknown_type()).is_err());
    }
}
