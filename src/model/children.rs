//! Child element declarations
//!
//! The order in which a type declares its children is its sequence:
//! elements added through the model API are inserted after the last
//! existing sibling whose declaration does not come later, so documents
//! written through the API keep the schema's child order.

use std::fmt;

use crate::error::{Result, StructureError};
use crate::instance::{ModelElement, ModelInstance};
use crate::namespaces::QName;

use super::references::{
    MatchStrategy, Multiplicity, Reference, ReferenceCollection, ReferenceDecl, ReferenceStorage,
};
use super::types::{ChildId, Model, ReferenceId, TypeBuilder, TypeId};

/// Occurrence bounds of a child declaration
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    /// Minimum number of occurrences
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Exactly one (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// One or more (1, unbounded)
    pub fn one_or_more() -> Self {
        Self { min: 1, max: None }
    }

    /// Check if the child may be absent (min == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if at most one occurrence is allowed
    pub fn is_single(&self) -> bool {
        self.max == Some(1)
    }

    /// Check if occurrence count is under the minimum
    pub fn is_missing(&self, count: u32) -> bool {
        count < self.min
    }

    /// Check if occurrence count exceeds the maximum
    pub fn is_exceeded(&self, count: u32) -> bool {
        match self.max {
            Some(max) => count > max,
            None => false,
        }
    }
}

impl fmt::Display for Occurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}..{}", self.min, max),
            None => write!(f, "{}..unbounded", self.min),
        }
    }
}

/// Declared child element of an element type
#[derive(Debug, Clone)]
pub struct ChildDecl {
    id: ChildId,
    owner: TypeId,
    target: TypeId,
    target_name: String,
    occurs: Occurs,
    collection: bool,
    reference: Option<ReferenceId>,
}

impl ChildDecl {
    fn new(target_name: String, occurs: Occurs, collection: bool) -> Self {
        Self {
            id: ChildId(0),
            owner: TypeId::UNRESOLVED,
            target: TypeId::UNRESOLVED,
            target_name,
            occurs,
            collection,
            reference: None,
        }
    }

    /// Handle of this declaration
    pub fn id(&self) -> ChildId {
        self.id
    }

    /// Declaring type
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    /// Type of the permitted children, extending types included
    pub fn target_type(&self) -> TypeId {
        self.target
    }

    /// Registered name of the target type
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Occurrence bounds
    pub fn occurs(&self) -> Occurs {
        self.occurs
    }

    /// Whether the declaration was made as a collection
    pub fn is_collection(&self) -> bool {
        self.collection
    }

    /// Reference stored in these children, if any
    pub fn reference(&self) -> Option<ReferenceId> {
        self.reference
    }

    pub(crate) fn assign(&mut self, id: ChildId, owner: TypeId) {
        self.id = id;
        self.owner = owner;
    }

    pub(crate) fn set_target(&mut self, target: TypeId) {
        self.target = target;
    }

    pub(crate) fn set_reference(&mut self, reference: ReferenceId) {
        self.reference = Some(reference);
    }
}

/// A child declaration whose occurrence count is out of bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccursViolation {
    /// Violated declaration
    pub child: ChildId,
    /// Target type name of the declaration
    pub type_name: String,
    /// Actual number of matching children
    pub count: u32,
    /// Declared bounds
    pub occurs: Occurs,
}

impl OccursViolation {
    /// Check if the violation is a missing child (rather than too many)
    pub fn is_missing(&self) -> bool {
        self.occurs.is_missing(self.count)
    }
}

impl fmt::Display for OccursViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' occurs {} times, expected {}",
            self.type_name, self.count, self.occurs
        )
    }
}

/// Position of `child_type` in the sequence of `parent_type`
///
/// The first declaration whose target is an ancestor-or-self of the child
/// type wins; `None` for types the sequence does not name.
pub(crate) fn sequence_position(model: &Model, parent_type: TypeId, child_type: TypeId) -> Option<usize> {
    model
        .resolve_effective(parent_type)
        .children
        .iter()
        .position(|id| model.is_a(child_type, model.child(*id).target_type()))
}

/// Handle to a declared single child element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildElement {
    id: ChildId,
}

impl ChildElement {
    /// Declaration handle
    pub fn id(&self) -> ChildId {
        self.id
    }

    /// The child, if present
    pub fn get(
        &self,
        instance: &ModelInstance,
        parent: impl Into<ModelElement>,
    ) -> Result<Option<ModelElement>> {
        Ok(instance
            .declared_children(parent.into(), self.id)?
            .into_iter()
            .next())
    }

    /// Put `child` in the slot
    ///
    /// An existing child is replaced, which rewires references to it.
    pub fn set(
        &self,
        instance: &mut ModelInstance,
        parent: impl Into<ModelElement>,
        child: impl Into<ModelElement>,
    ) -> Result<()> {
        let parent = parent.into();
        let child = child.into();
        instance.check_child_type(self.id, child)?;
        match self.get(instance, parent)? {
            Some(existing) if existing == child => Ok(()),
            Some(existing) => instance.replace_element(existing, child),
            None => instance.add_child_element(parent, child),
        }
    }

    /// Remove the child; returns whether one was present
    pub fn remove(&self, instance: &mut ModelInstance, parent: impl Into<ModelElement>) -> Result<bool> {
        let parent = parent.into();
        match self.get(instance, parent)? {
            Some(existing) => instance.remove_child_element(parent, existing),
            None => Ok(false),
        }
    }
}

/// Handle to a declared repeated child element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildElementCollection {
    id: ChildId,
}

impl ChildElementCollection {
    /// Declaration handle
    pub fn id(&self) -> ChildId {
        self.id
    }

    /// Matching children in document order
    pub fn elements(
        &self,
        instance: &ModelInstance,
        parent: impl Into<ModelElement>,
    ) -> Result<Vec<ModelElement>> {
        instance.declared_children(parent.into(), self.id)
    }

    /// Number of matching children
    pub fn len(&self, instance: &ModelInstance, parent: impl Into<ModelElement>) -> Result<usize> {
        Ok(self.elements(instance, parent)?.len())
    }

    /// Check if there are no matching children
    pub fn is_empty(&self, instance: &ModelInstance, parent: impl Into<ModelElement>) -> Result<bool> {
        Ok(self.elements(instance, parent)?.is_empty())
    }

    /// Check if `child` is one of the matching children
    pub fn contains(
        &self,
        instance: &ModelInstance,
        parent: impl Into<ModelElement>,
        child: impl Into<ModelElement>,
    ) -> Result<bool> {
        let child = child.into();
        Ok(self.elements(instance, parent)?.contains(&child))
    }

    /// Add `child` at its sequence position
    pub fn add(
        &self,
        instance: &mut ModelInstance,
        parent: impl Into<ModelElement>,
        child: impl Into<ModelElement>,
    ) -> Result<()> {
        let child = child.into();
        instance.check_child_type(self.id, child)?;
        instance.add_child_element(parent.into(), child)
    }

    /// Remove `child`; returns whether it was a member
    pub fn remove(
        &self,
        instance: &mut ModelInstance,
        parent: impl Into<ModelElement>,
        child: impl Into<ModelElement>,
    ) -> Result<bool> {
        let parent = parent.into();
        let child = child.into();
        if self.elements(instance, parent)?.contains(&child) {
            instance.remove_child_element(parent, child)
        } else {
            Ok(false)
        }
    }

    /// Remove every matching child
    pub fn clear(&self, instance: &mut ModelInstance, parent: impl Into<ModelElement>) -> Result<()> {
        let parent = parent.into();
        for child in self.elements(instance, parent)? {
            instance.remove_child_element(parent, child)?;
        }
        Ok(())
    }
}

impl ModelInstance {
    /// Reject a child whose type does not match the declaration target
    pub(crate) fn check_child_type(&self, child_id: ChildId, child: ModelElement) -> Result<()> {
        let model = self.model();
        let decl = model.child(child_id);
        let child_type = self.type_id_of(child)?;
        if model.is_a(child_type, decl.target_type()) {
            Ok(())
        } else {
            Err(StructureError::new("child element type not permitted in this slot")
                .with_attempted(model.element_type(child_type).type_name())
                .with_permitted([decl.target_name()])
                .into())
        }
    }
}

/// Declares a single child element on the type under construction
pub struct ChildElementBuilder<'t, 'm> {
    owner: &'t mut TypeBuilder<'m>,
    target: String,
    occurs: Occurs,
}

impl<'t, 'm> ChildElementBuilder<'t, 'm> {
    pub(crate) fn new(owner: &'t mut TypeBuilder<'m>, target: &str) -> Self {
        Self {
            owner,
            target: target.to_string(),
            occurs: Occurs::optional(),
        }
    }

    /// Require the child to be present
    pub fn required(mut self) -> Self {
        self.occurs = Occurs::once();
        self
    }

    /// Add the child to the type's sequence
    pub fn build(self) -> Result<ChildElement> {
        let id = push_child_decl(self.owner, &self.target, self.occurs, false)?;
        Ok(ChildElement { id })
    }

    /// The child stores a reference to a `target` element by plain id
    pub fn id_element_reference(self, target: &str) -> ElementReferenceBuilder<'t, 'm> {
        ElementReferenceBuilder::new(self, target, MatchStrategy::Id)
    }

    /// The child stores a reference to a `target` element by possibly prefixed id
    pub fn qname_element_reference(self, target: &str) -> ElementReferenceBuilder<'t, 'm> {
        ElementReferenceBuilder::new(self, target, MatchStrategy::QName)
    }
}

/// Declares a repeated child element on the type under construction
pub struct ChildCollectionBuilder<'t, 'm> {
    owner: &'t mut TypeBuilder<'m>,
    target: String,
    occurs: Occurs,
}

impl<'t, 'm> ChildCollectionBuilder<'t, 'm> {
    pub(crate) fn new(owner: &'t mut TypeBuilder<'m>, target: &str) -> Self {
        Self {
            owner,
            target: target.to_string(),
            occurs: Occurs::zero_or_more(),
        }
    }

    /// Minimum number of occurrences
    pub fn min_occurs(mut self, min: u32) -> Self {
        self.occurs.min = min;
        self
    }

    /// Maximum number of occurrences
    pub fn max_occurs(mut self, max: u32) -> Self {
        self.occurs.max = Some(max);
        self
    }

    /// Require at least one child
    pub fn required(self) -> Self {
        self.min_occurs(1)
    }

    /// Add the children to the type's sequence
    pub fn build(self) -> Result<ChildElementCollection> {
        let id = push_child_decl(self.owner, &self.target, self.occurs, true)?;
        Ok(ChildElementCollection { id })
    }

    /// Each child stores a reference to a `target` element by plain id
    pub fn id_element_reference_collection(
        self,
        target: &str,
    ) -> ElementReferenceCollectionBuilder<'t, 'm> {
        ElementReferenceCollectionBuilder::new(self, target, MatchStrategy::Id)
    }

    /// Each child stores a reference to a `target` element by possibly prefixed id
    pub fn qname_element_reference_collection(
        self,
        target: &str,
    ) -> ElementReferenceCollectionBuilder<'t, 'm> {
        ElementReferenceCollectionBuilder::new(self, target, MatchStrategy::QName)
    }
}

fn push_child_decl(
    owner: &mut TypeBuilder<'_>,
    target: &str,
    occurs: Occurs,
    collection: bool,
) -> Result<ChildId> {
    if occurs.max == Some(0) || occurs.max.map_or(false, |max| occurs.min > max) {
        return Err(owner
            .schema_error(format!("invalid occurrence bounds {}", occurs))
            .with_declaration(target)
            .into());
    }
    Ok(owner.push_child(ChildDecl::new(target.to_string(), occurs, collection)))
}

fn push_element_reference(
    owner: &mut TypeBuilder<'_>,
    child: ChildId,
    child_target: &str,
    target: String,
    matching: MatchStrategy,
    identifier_attribute: Option<QName>,
    multiplicity: Multiplicity,
) -> ReferenceId {
    let storage = match identifier_attribute {
        Some(attribute) => ReferenceStorage::ChildAttribute { child, attribute },
        None => ReferenceStorage::ChildText { child },
    };
    let reference = owner.push_reference(ReferenceDecl::new(
        child_target.to_string(),
        target,
        matching,
        storage,
        multiplicity,
    ));
    owner.builder.children[child.0 as usize].set_reference(reference);
    reference
}

/// Declares a single reference stored in a child element
pub struct ElementReferenceBuilder<'t, 'm> {
    child: ChildElementBuilder<'t, 'm>,
    target: String,
    matching: MatchStrategy,
    identifier_attribute: Option<QName>,
}

impl<'t, 'm> ElementReferenceBuilder<'t, 'm> {
    fn new(child: ChildElementBuilder<'t, 'm>, target: &str, matching: MatchStrategy) -> Self {
        Self {
            child,
            target: target.to_string(),
            matching,
            identifier_attribute: None,
        }
    }

    /// Store the identifier in this attribute of the child instead of its text
    pub fn identifier_attribute(mut self, name: &str) -> Self {
        self.identifier_attribute = Some(QName::local(name));
        self
    }

    /// Add the child and its reference to the type
    pub fn build(self) -> Result<Reference> {
        let child = self.child;
        let id = push_child_decl(child.owner, &child.target, child.occurs, false)?;
        let reference = push_element_reference(
            child.owner,
            id,
            &child.target,
            self.target,
            self.matching,
            self.identifier_attribute,
            Multiplicity::Single,
        );
        Ok(Reference::new(reference))
    }
}

/// Declares a reference collection stored in repeated child elements
pub struct ElementReferenceCollectionBuilder<'t, 'm> {
    children: ChildCollectionBuilder<'t, 'm>,
    target: String,
    matching: MatchStrategy,
    identifier_attribute: Option<QName>,
}

impl<'t, 'm> ElementReferenceCollectionBuilder<'t, 'm> {
    fn new(children: ChildCollectionBuilder<'t, 'm>, target: &str, matching: MatchStrategy) -> Self {
        Self {
            children,
            target: target.to_string(),
            matching,
            identifier_attribute: None,
        }
    }

    /// Store each identifier in this attribute of the child instead of its text
    pub fn identifier_attribute(mut self, name: &str) -> Self {
        self.identifier_attribute = Some(QName::local(name));
        self
    }

    /// Add the children and their reference collection to the type
    pub fn build(self) -> Result<ReferenceCollection> {
        let children = self.children;
        let id = push_child_decl(children.owner, &children.target, children.occurs, true)?;
        let reference = push_element_reference(
            children.owner,
            id,
            &children.target,
            self.target,
            self.matching,
            self.identifier_attribute,
            Multiplicity::Collection,
        );
        Ok(ReferenceCollection::new(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;

    const NS: &str = "http://example.com/model";

    #[test]
    fn test_occurs_bounds() {
        let occurs = Occurs::new(1, Some(2));
        assert!(occurs.is_missing(0));
        assert!(!occurs.is_missing(1));
        assert!(!occurs.is_exceeded(2));
        assert!(occurs.is_exceeded(3));
        assert!(Occurs::zero_or_more().is_emptiable());
        assert!(!Occurs::zero_or_more().is_exceeded(u32::MAX));
        assert!(Occurs::optional().is_single());
    }

    #[test]
    fn test_occurs_display() {
        assert_eq!(Occurs::once().to_string(), "1..1");
        assert_eq!(Occurs::one_or_more().to_string(), "1..unbounded");
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let mut builder = ModelBuilder::new("test");
        builder
            .define_type("Item", QName::namespaced(NS, "item"))
            .build()
            .unwrap();
        let mut list = builder.define_type("List", QName::namespaced(NS, "list"));
        let result = list.element_collection("Item").min_occurs(3).max_occurs(2).build();
        assert!(result.unwrap_err().is_schema());
    }

    #[test]
    fn test_sequence_position_uses_declaration_order() {
        let mut builder = ModelBuilder::new("test");
        builder.define_type("A", QName::namespaced(NS, "a")).build().unwrap();
        let mut b = builder.define_type("B", QName::namespaced(NS, "b"));
        b.extends_type("A");
        b.build().unwrap();
        builder.define_type("C", QName::namespaced(NS, "c")).build().unwrap();
        let mut parent = builder.define_type("Parent", QName::namespaced(NS, "parent"));
        parent.element("C").build().unwrap();
        parent.element_collection("A").build().unwrap();
        let parent_id = parent.build().unwrap();
        let model = builder.build().unwrap();

        let pos = |name: &str| sequence_position(&model, parent_id, model.type_id(name).unwrap());
        assert_eq!(pos("C"), Some(0));
        assert_eq!(pos("A"), Some(1));
        assert_eq!(pos("B"), Some(1));
        assert_eq!(pos("Parent"), None);
    }
}
