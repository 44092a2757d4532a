//! Element type registry
//!
//! A [`Model`] is the immutable table of element types for one schema.
//! It is assembled once through a [`ModelBuilder`]: each type is declared
//! with [`ModelBuilder::define_type`], given a base type, attributes,
//! children and references through the returned [`TypeBuilder`], and
//! registered with [`TypeBuilder::build`]. [`ModelBuilder::build`] then
//! resolves every type name used by child and reference declarations,
//! computes the effective (inherited) declaration set of each type and
//! rejects name collisions.

use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::error::{Result, SchemaError};
use crate::instance::{ModelElement, ModelInstance};
use crate::names::validate_ncname;
use crate::namespaces::QName;

use super::attributes::{AttributeBuilder, AttributeDecl, AttributeValue};
use super::children::{ChildCollectionBuilder, ChildDecl, ChildElementBuilder};
use super::references::{Multiplicity, ReferenceCollection, ReferenceDecl, ReferenceMirror, Reference};

/// Name of the built-in type given to elements no registered type matches
pub const UNKNOWN_TYPE_NAME: &str = "UnknownElement";

/// Handle to a registered element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// Placeholder for a target type that is resolved by [`ModelBuilder::build`]
    pub(crate) const UNRESOLVED: TypeId = TypeId(u32::MAX);

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an attribute declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId(pub(crate) u32);

/// Handle to a child element declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildId(pub(crate) u32);

/// Handle to a reference declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceId(pub(crate) u32);

/// Hook run by [`ModelInstance::new_instance`] on every new element of a concrete type
pub type InstanceProvider = fn(&mut ModelInstance, ModelElement) -> Result<()>;

fn default_provider(_: &mut ModelInstance, _: ModelElement) -> Result<()> {
    Ok(())
}

/// Declarations of a type merged with those of all its ancestors
#[derive(Debug, Clone, Default)]
pub struct EffectiveType {
    /// Attributes, ancestors first
    pub attributes: Vec<AttributeId>,
    /// Child declarations in sequence order, ancestors first
    pub children: Vec<ChildId>,
    /// References declared on the type or an ancestor
    pub references: Vec<ReferenceId>,
    /// Attributes flagged as element identifiers
    pub id_attributes: Vec<AttributeId>,
}

/// A registered element type
#[derive(Clone)]
pub struct ElementType {
    id: TypeId,
    type_name: String,
    qname: QName,
    base: Option<TypeId>,
    is_abstract: bool,
    provider: Option<InstanceProvider>,
    attributes: Vec<AttributeId>,
    children: Vec<ChildId>,
    references: Vec<ReferenceId>,
    effective: EffectiveType,
    extending: Vec<TypeId>,
}

impl ElementType {
    /// Handle of this type
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Registered type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Element name matched by this type
    pub fn qname(&self) -> &QName {
        &self.qname
    }

    /// Namespace of the element name
    pub fn type_namespace(&self) -> Option<&str> {
        self.qname.namespace()
    }

    /// Direct base type
    pub fn base_type(&self) -> Option<TypeId> {
        self.base
    }

    /// Abstract types cannot be instantiated
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Instance provider of a concrete type
    pub fn instance_provider(&self) -> Option<InstanceProvider> {
        self.provider
    }

    /// Attributes declared by this type itself
    pub fn own_attributes(&self) -> &[AttributeId] {
        &self.attributes
    }

    /// Child declarations made by this type itself
    pub fn own_children(&self) -> &[ChildId] {
        &self.children
    }

    /// References declared by this type itself
    pub fn own_references(&self) -> &[ReferenceId] {
        &self.references
    }

    /// Declarations including inherited ones
    pub fn effective(&self) -> &EffectiveType {
        &self.effective
    }

    /// Types that directly extend this type
    pub fn extending_types(&self) -> &[TypeId] {
        &self.extending
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementType")
            .field("type_name", &self.type_name)
            .field("qname", &self.qname)
            .field("base", &self.base)
            .field("is_abstract", &self.is_abstract)
            .finish()
    }
}

/// Immutable registry of element types and their declarations
#[derive(Debug)]
pub struct Model {
    name: String,
    types: Vec<ElementType>,
    type_names: HashMap<String, TypeId>,
    qnames: HashMap<QName, Vec<TypeId>>,
    attributes: Vec<AttributeDecl>,
    children: Vec<ChildDecl>,
    references: Vec<ReferenceDecl>,
    mirrors: Vec<ReferenceMirror>,
    alternative_namespaces: HashMap<String, String>,
    unknown: TypeId,
}

impl Model {
    /// Model name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All registered types in registration order
    pub fn types(&self) -> impl Iterator<Item = &ElementType> {
        self.types.iter().filter(move |t| t.id != self.unknown)
    }

    /// Get a type by handle
    pub fn element_type(&self, id: TypeId) -> &ElementType {
        &self.types[id.index()]
    }

    /// Look up a type handle by registered type name
    pub fn type_id(&self, type_name: &str) -> Option<TypeId> {
        self.type_names.get(type_name).copied()
    }

    /// Look up a type by registered type name
    pub fn type_by_name(&self, type_name: &str) -> Option<&ElementType> {
        self.type_id(type_name).map(|id| self.element_type(id))
    }

    /// The type given to elements that match no registered type
    pub fn unknown_type(&self) -> TypeId {
        self.unknown
    }

    /// Get an attribute declaration
    pub fn attribute(&self, id: AttributeId) -> &AttributeDecl {
        &self.attributes[id.0 as usize]
    }

    /// Get a child declaration
    pub fn child(&self, id: ChildId) -> &ChildDecl {
        &self.children[id.0 as usize]
    }

    /// Get a reference declaration
    pub fn reference(&self, id: ReferenceId) -> &ReferenceDecl {
        &self.references[id.0 as usize]
    }

    /// All reference declarations
    pub fn references(&self) -> &[ReferenceDecl] {
        &self.references
    }

    /// Declared derived collections
    pub fn mirrors(&self) -> &[ReferenceMirror] {
        &self.mirrors
    }

    /// Effective declarations of a type, inherited ones included
    pub fn resolve_effective(&self, id: TypeId) -> &EffectiveType {
        &self.element_type(id).effective
    }

    /// Most specific type registered for an element name
    ///
    /// Names in an alternative namespace are looked up under the actual
    /// namespace. Unregistered names yield [`Model::unknown_type`].
    pub fn type_for_name(&self, name: &QName) -> TypeId {
        let normalized;
        let key = match name.namespace().and_then(|ns| self.alternative_namespaces.get(ns)) {
            Some(actual) => {
                normalized = QName::namespaced(actual.as_str(), name.local_name.as_str());
                &normalized
            }
            None => name,
        };

        self.qnames
            .get(key)
            .and_then(|candidates| {
                candidates
                    .iter()
                    .copied()
                    .max_by_key(|candidate| self.depth(*candidate))
            })
            .unwrap_or(self.unknown)
    }

    /// Check if `ty` is `base` or extends it
    pub fn is_a(&self, ty: TypeId, base: TypeId) -> bool {
        let mut current = Some(ty);
        while let Some(t) = current {
            if t == base {
                return true;
            }
            current = self.element_type(t).base;
        }
        false
    }

    /// Base type chain, nearest ancestor first
    pub fn ancestors(&self, ty: TypeId) -> Vec<TypeId> {
        let mut result = Vec::new();
        let mut current = self.element_type(ty).base;
        while let Some(t) = current {
            result.push(t);
            current = self.element_type(t).base;
        }
        result
    }

    /// All types extending `ty`, transitively
    pub fn all_extending_types(&self, ty: TypeId) -> Vec<TypeId> {
        let mut result = Vec::new();
        let mut stack: Vec<TypeId> = self.element_type(ty).extending.clone();
        while let Some(t) = stack.pop() {
            result.push(t);
            stack.extend(self.element_type(t).extending.iter().copied());
        }
        result
    }

    /// References whose target type is `ty` or one of its ancestors
    pub fn incoming_references(&self, ty: TypeId) -> Vec<ReferenceId> {
        self.references
            .iter()
            .filter(|r| self.is_a(ty, r.target_type()))
            .map(|r| r.id())
            .collect()
    }

    /// Derived collections owned by `ty` or one of its ancestors
    pub fn mirrors_for(&self, ty: TypeId) -> Vec<&ReferenceMirror> {
        self.mirrors
            .iter()
            .filter(|m| self.is_a(ty, self.reference(m.collection().id()).owner()))
            .collect()
    }

    /// Actual namespace for a possibly alternative namespace
    pub fn actual_namespace<'a>(&'a self, namespace: &'a str) -> &'a str {
        self.alternative_namespaces
            .get(namespace)
            .map(|s| s.as_str())
            .unwrap_or(namespace)
    }

    /// Alternative namespaces registered for an actual namespace
    pub fn alternative_namespaces(&self, actual: &str) -> Vec<&str> {
        let mut found: Vec<&str> = self
            .alternative_namespaces
            .iter()
            .filter(|(_, a)| a.as_str() == actual)
            .map(|(alt, _)| alt.as_str())
            .collect();
        found.sort_unstable();
        found
    }

    fn depth(&self, ty: TypeId) -> usize {
        self.ancestors(ty).len()
    }
}

/// Collects type declarations and produces a [`Model`]
#[derive(Debug)]
pub struct ModelBuilder {
    name: String,
    pub(crate) types: Vec<ElementType>,
    type_names: HashMap<String, TypeId>,
    pub(crate) attributes: Vec<AttributeDecl>,
    pub(crate) children: Vec<ChildDecl>,
    pub(crate) references: Vec<ReferenceDecl>,
    mirrors: Vec<ReferenceMirror>,
    alternative_namespaces: HashMap<String, String>,
}

impl ModelBuilder {
    /// Create a builder for a named model
    pub fn new(name: impl Into<String>) -> Self {
        let unknown = ElementType {
            id: TypeId(0),
            type_name: UNKNOWN_TYPE_NAME.to_string(),
            qname: QName::local(""),
            base: None,
            is_abstract: false,
            provider: None,
            attributes: Vec::new(),
            children: Vec::new(),
            references: Vec::new(),
            effective: EffectiveType::default(),
            extending: Vec::new(),
        };
        let mut type_names = HashMap::new();
        type_names.insert(UNKNOWN_TYPE_NAME.to_string(), TypeId(0));

        Self {
            name: name.into(),
            types: vec![unknown],
            type_names,
            attributes: Vec::new(),
            children: Vec::new(),
            references: Vec::new(),
            mirrors: Vec::new(),
            alternative_namespaces: HashMap::new(),
        }
    }

    /// Treat names in `alternative` as if they were in `actual`
    pub fn alternative_namespace(
        &mut self,
        alternative: impl Into<String>,
        actual: impl Into<String>,
    ) -> Result<&mut Self> {
        let alternative = alternative.into();
        let actual = actual.into();
        if alternative == actual || self.alternative_namespaces.contains_key(&actual) {
            return Err(SchemaError::new(format!(
                "namespace '{}' cannot be an alternative for '{}'",
                alternative, actual
            ))
            .into());
        }
        if let Some(existing) = self.alternative_namespaces.get(&alternative) {
            if existing != &actual {
                return Err(SchemaError::new(format!(
                    "namespace '{}' is already an alternative for '{}'",
                    alternative, existing
                ))
                .into());
            }
        }
        self.alternative_namespaces.insert(alternative, actual);
        Ok(self)
    }

    /// Start declaring a type registered under `type_name` for elements named `qname`
    pub fn define_type(&mut self, type_name: impl Into<String>, qname: QName) -> TypeBuilder<'_> {
        let id = TypeId(self.types.len() as u32);
        let marks = [
            self.attributes.len(),
            self.children.len(),
            self.references.len(),
        ];
        TypeBuilder {
            builder: self,
            id,
            type_name: type_name.into(),
            qname,
            base: None,
            is_abstract: false,
            provider: None,
            attributes: Vec::new(),
            children: Vec::new(),
            references: Vec::new(),
            marks,
            built: false,
        }
    }

    /// Check if a type name has been registered
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.type_names.contains_key(type_name)
    }

    /// Declare `collection` as the stored mirror of the forward reference `source`
    ///
    /// After an element is replaced, its mirror collection is repopulated
    /// with every element whose `source` reference resolves to it.
    pub fn mirror(&mut self, collection: ReferenceCollection, source: Reference) -> Result<&mut Self> {
        let collection_decl = self.reference_decl(collection.id())?;
        let source_decl = self.reference_decl(source.id())?;
        if collection_decl.multiplicity() != Multiplicity::Collection
            || source_decl.multiplicity() != Multiplicity::Single
        {
            return Err(SchemaError::new(
                "a mirror pairs a reference collection with a single forward reference",
            )
            .with_declaration(collection_decl.name())
            .into());
        }
        self.mirrors.push(ReferenceMirror::new(collection, source));
        Ok(self)
    }

    fn reference_decl(&self, id: ReferenceId) -> Result<&ReferenceDecl> {
        self.references.get(id.0 as usize).ok_or_else(|| {
            SchemaError::new(format!("unknown reference handle {}", id.0)).into()
        })
    }

    fn resolve_type_name(&self, name: &str, owner: TypeId, declaration: &str) -> Result<TypeId> {
        self.type_names.get(name).copied().ok_or_else(|| {
            SchemaError::new(format!("unknown target type '{}'", name))
                .with_type(self.types[owner.index()].type_name.clone())
                .with_declaration(declaration)
                .into()
        })
    }

    /// Resolve names, compute effective declarations and freeze the model
    pub fn build(mut self) -> Result<Model> {
        for i in 0..self.children.len() {
            let decl = &self.children[i];
            let target = self.resolve_type_name(decl.target_name(), decl.owner(), decl.target_name())?;
            self.children[i].set_target(target);
        }
        for i in 0..self.references.len() {
            let decl = &self.references[i];
            let target = self.resolve_type_name(decl.target_name(), decl.owner(), decl.name())?;
            self.references[i].set_target(target);
        }

        // parents are registered before their subtypes, so one pass suffices
        for i in 0..self.types.len() {
            let effective = self.compute_effective(i)?;
            self.types[i].effective = effective;
            if let Some(base) = self.types[i].base {
                let id = self.types[i].id;
                self.types[base.index()].extending.push(id);
            }
        }

        for mirror in &self.mirrors {
            let collection = &self.references[mirror.collection().id().0 as usize];
            let source = &self.references[mirror.source().id().0 as usize];
            let related = |a: TypeId, b: TypeId| self.is_a(a, b) || self.is_a(b, a);
            if !related(source.target_type(), collection.owner())
                || !related(collection.target_type(), source.owner())
            {
                return Err(SchemaError::new(format!(
                    "mirror '{}' does not match forward reference '{}'",
                    collection.name(),
                    source.name()
                ))
                .into());
            }
        }

        let mut qnames: HashMap<QName, Vec<TypeId>> = HashMap::new();
        for ty in self.types.iter().skip(1) {
            qnames.entry(ty.qname.clone()).or_default().push(ty.id);
        }

        debug!(
            model = self.name.as_str(),
            types = self.types.len() - 1,
            references = self.references.len();
            "Model built"
        );

        Ok(Model {
            name: self.name,
            types: self.types,
            type_names: self.type_names,
            qnames,
            attributes: self.attributes,
            children: self.children,
            references: self.references,
            mirrors: self.mirrors,
            alternative_namespaces: self.alternative_namespaces,
            unknown: TypeId(0),
        })
    }

    fn is_a(&self, ty: TypeId, base: TypeId) -> bool {
        let mut current = Some(ty);
        while let Some(t) = current {
            if t == base {
                return true;
            }
            current = self.types[t.index()].base;
        }
        false
    }

    fn compute_effective(&self, index: usize) -> Result<EffectiveType> {
        let ty = &self.types[index];
        let mut effective = match ty.base {
            Some(base) => self.types[base.index()].effective.clone(),
            None => EffectiveType::default(),
        };

        for attr_id in &ty.attributes {
            let decl = &self.attributes[attr_id.0 as usize];
            let clash = effective
                .attributes
                .iter()
                .position(|existing| self.attributes[existing.0 as usize].name() == decl.name());
            match clash {
                Some(pos) if decl.is_override() => {
                    let replaced = effective.attributes[pos];
                    effective.attributes[pos] = *attr_id;
                    effective.id_attributes.retain(|id| *id != replaced);
                }
                Some(_) => {
                    return Err(SchemaError::new("attribute declared twice in effective type")
                        .with_type(ty.type_name.clone())
                        .with_declaration(decl.name().to_string())
                        .into())
                }
                None => effective.attributes.push(*attr_id),
            }
            if decl.is_id_attribute() {
                effective.id_attributes.push(*attr_id);
            }
        }

        for child_id in &ty.children {
            let decl = &self.children[child_id.0 as usize];
            let duplicate = effective
                .children
                .iter()
                .any(|existing| self.children[existing.0 as usize].target_type() == decl.target_type());
            if duplicate {
                return Err(SchemaError::new("child element declared twice in sequence")
                    .with_type(ty.type_name.clone())
                    .with_declaration(decl.target_name())
                    .into());
            }
            effective.children.push(*child_id);
        }

        effective.references.extend(ty.references.iter().copied());
        Ok(effective)
    }
}

/// Declares one element type; registered by [`TypeBuilder::build`]
///
/// Dropping the builder without building discards its declarations.
pub struct TypeBuilder<'m> {
    pub(crate) builder: &'m mut ModelBuilder,
    pub(crate) id: TypeId,
    type_name: String,
    qname: QName,
    base: Option<String>,
    is_abstract: bool,
    provider: Option<InstanceProvider>,
    attributes: Vec<AttributeId>,
    children: Vec<ChildId>,
    references: Vec<ReferenceId>,
    marks: [usize; 3],
    built: bool,
}

impl<'m> TypeBuilder<'m> {
    /// Registered name of the type under construction
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Extend a previously registered type
    pub fn extends_type(&mut self, parent: impl Into<String>) -> &mut Self {
        self.base = Some(parent.into());
        self
    }

    /// Mark the type abstract
    pub fn abstract_type(&mut self) -> &mut Self {
        self.is_abstract = true;
        self
    }

    /// Hook run on every element created for this type
    pub fn instance_provider(&mut self, provider: InstanceProvider) -> &mut Self {
        self.provider = Some(provider);
        self
    }

    /// Declare an attribute of any value type
    pub fn attribute<T: AttributeValue>(&mut self, name: &str) -> AttributeBuilder<'_, 'm, T> {
        AttributeBuilder::new(self, name)
    }

    /// Declare a string attribute
    pub fn string_attribute(&mut self, name: &str) -> AttributeBuilder<'_, 'm, String> {
        AttributeBuilder::new(self, name)
    }

    /// Declare a boolean attribute
    pub fn boolean_attribute(&mut self, name: &str) -> AttributeBuilder<'_, 'm, bool> {
        AttributeBuilder::new(self, name)
    }

    /// Declare an integer attribute
    pub fn integer_attribute(&mut self, name: &str) -> AttributeBuilder<'_, 'm, i64> {
        AttributeBuilder::new(self, name)
    }

    /// Declare an enumeration attribute
    pub fn enum_attribute<E: AttributeValue>(&mut self, name: &str) -> AttributeBuilder<'_, 'm, E> {
        AttributeBuilder::new(self, name)
    }

    /// Declare a single child element, next in the type's sequence
    pub fn element(&mut self, target: &str) -> ChildElementBuilder<'_, 'm> {
        ChildElementBuilder::new(self, target)
    }

    /// Declare a repeated child element, next in the type's sequence
    pub fn element_collection(&mut self, target: &str) -> ChildCollectionBuilder<'_, 'm> {
        ChildCollectionBuilder::new(self, target)
    }

    pub(crate) fn push_attribute(&mut self, mut decl: AttributeDecl) -> AttributeId {
        let id = AttributeId(self.builder.attributes.len() as u32);
        decl.assign(id, self.id);
        self.builder.attributes.push(decl);
        self.attributes.push(id);
        id
    }

    pub(crate) fn push_child(&mut self, mut decl: ChildDecl) -> ChildId {
        let id = ChildId(self.builder.children.len() as u32);
        decl.assign(id, self.id);
        self.builder.children.push(decl);
        self.children.push(id);
        id
    }

    pub(crate) fn push_reference(&mut self, mut decl: ReferenceDecl) -> ReferenceId {
        let id = ReferenceId(self.builder.references.len() as u32);
        decl.assign(id, self.id);
        self.builder.references.push(decl);
        self.references.push(id);
        id
    }

    pub(crate) fn schema_error(&self, message: impl Into<String>) -> SchemaError {
        SchemaError::new(message).with_type(self.type_name.clone())
    }

    /// Register the type
    ///
    /// Fails if the type name is taken, the base type is unknown, or an
    /// abstract type was given an instance provider.
    pub fn build(mut self) -> Result<TypeId> {
        if self.builder.type_names.contains_key(&self.type_name) {
            return Err(self.schema_error("duplicate type").into());
        }
        if !self.qname.local_name.is_empty() {
            validate_ncname(&self.qname.local_name)
                .map_err(|e| self.schema_error(e.to_string()))?;
        }
        let base = match self.base.as_deref() {
            Some(parent) => Some(self.builder.type_names.get(parent).copied().ok_or_else(|| {
                self.schema_error(format!("unknown parent type '{}'", parent))
            })?),
            None => None,
        };
        if self.is_abstract && self.provider.is_some() {
            return Err(self
                .schema_error("abstract type cannot have an instance provider")
                .into());
        }
        let provider = if self.is_abstract {
            None
        } else {
            Some(self.provider.unwrap_or(default_provider as InstanceProvider))
        };

        let element_type = ElementType {
            id: self.id,
            type_name: std::mem::take(&mut self.type_name),
            qname: self.qname.clone(),
            base,
            is_abstract: self.is_abstract,
            provider,
            attributes: std::mem::take(&mut self.attributes),
            children: std::mem::take(&mut self.children),
            references: std::mem::take(&mut self.references),
            effective: EffectiveType::default(),
            extending: Vec::new(),
        };

        debug!(
            type_name = element_type.type_name.as_str(),
            qname = element_type.qname.to_string(),
            is_abstract = element_type.is_abstract;
            "Type registered"
        );

        self.builder
            .type_names
            .insert(element_type.type_name.clone(), self.id);
        self.builder.types.push(element_type);
        self.built = true;
        Ok(self.id)
    }
}

impl Drop for TypeBuilder<'_> {
    fn drop(&mut self) {
        if !self.built {
            self.builder.attributes.truncate(self.marks[0]);
            self.builder.children.truncate(self.marks[1]);
            self.builder.references.truncate(self.marks[2]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "http://example.com/model";

    fn builder_with_base() -> ModelBuilder {
        let mut builder = ModelBuilder::new("test");
        let mut base = builder.define_type("BaseElement", QName::namespaced(NS, "baseElement"));
        base.abstract_type();
        base.string_attribute("id").id_attribute().build().unwrap();
        base.build().unwrap();
        builder
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut builder = builder_with_base();
        let result = builder
            .define_type("BaseElement", QName::namespaced(NS, "other"))
            .build();
        let err = result.unwrap_err();
        assert!(err.is_schema());
        assert!(err.to_string().contains("duplicate type"));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut builder = ModelBuilder::new("test");
        let mut task = builder.define_type("Task", QName::namespaced(NS, "task"));
        task.extends_type("Activity");
        let err = task.build().unwrap_err();
        assert!(err.to_string().contains("unknown parent type 'Activity'"));
    }

    #[test]
    fn test_abstract_type_without_provider() {
        let mut builder = builder_with_base();
        let mut bad = builder.define_type("Bad", QName::namespaced(NS, "bad"));
        bad.abstract_type()
            .instance_provider(|_, _| Ok(()));
        assert!(bad.build().is_err());

        let model = builder.build().unwrap();
        let base = model.type_by_name("BaseElement").unwrap();
        assert!(base.is_abstract());
        assert!(base.instance_provider().is_none());
    }

    #[test]
    fn test_failed_build_discards_declarations() {
        let mut builder = builder_with_base();
        {
            let mut dup = builder.define_type("BaseElement", QName::namespaced(NS, "dup"));
            dup.string_attribute("name").build().unwrap();
            assert!(dup.build().is_err());
        }
        assert_eq!(builder.attributes.len(), 1);
    }

    #[test]
    fn test_inheritance_and_type_lookup() {
        let mut builder = builder_with_base();
        let mut task = builder.define_type("Task", QName::namespaced(NS, "task"));
        task.extends_type("BaseElement");
        task.string_attribute("name").build().unwrap();
        let task_id = task.build().unwrap();
        let mut service = builder.define_type("ServiceTask", QName::namespaced(NS, "serviceTask"));
        service.extends_type("Task");
        let service_id = service.build().unwrap();

        let model = builder.build().unwrap();
        let base_id = model.type_id("BaseElement").unwrap();

        assert!(model.is_a(service_id, task_id));
        assert!(model.is_a(service_id, base_id));
        assert!(!model.is_a(task_id, service_id));
        assert_eq!(model.ancestors(service_id), vec![task_id, base_id]);
        assert_eq!(model.all_extending_types(base_id).len(), 2);

        let effective = model.resolve_effective(service_id);
        assert_eq!(effective.attributes.len(), 2);
        assert_eq!(effective.id_attributes.len(), 1);

        assert_eq!(model.type_for_name(&QName::namespaced(NS, "serviceTask")), service_id);
        assert_eq!(
            model.type_for_name(&QName::namespaced("urn:other", "task")),
            model.unknown_type()
        );
    }

    #[test]
    fn test_attribute_collision_rejected_unless_override() {
        let mut builder = builder_with_base();
        let mut task = builder.define_type("Task", QName::namespaced(NS, "task"));
        task.extends_type("BaseElement");
        task.string_attribute("id").build().unwrap();
        task.build().unwrap();
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("attribute declared twice"));

        let mut builder = builder_with_base();
        let mut task = builder.define_type("Task", QName::namespaced(NS, "task"));
        task.extends_type("BaseElement");
        let id = task.string_attribute("id").overrides().build().unwrap();
        let task_id = task.build().unwrap();
        let model = builder.build().unwrap();
        assert_eq!(model.resolve_effective(task_id).attributes, vec![id.id()]);
        assert!(model.resolve_effective(task_id).id_attributes.is_empty());
    }

    #[test]
    fn test_unknown_child_target_rejected() {
        let mut builder = builder_with_base();
        let mut process = builder.define_type("Process", QName::namespaced(NS, "process"));
        process.element_collection("FlowElement").build().unwrap();
        process.build().unwrap();
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("unknown target type 'FlowElement'"));
    }

    #[test]
    fn test_alternative_namespace_lookup() {
        let mut builder = builder_with_base();
        builder
            .alternative_namespace("http://example.com/legacy", NS)
            .unwrap();
        let mut task = builder.define_type("Task", QName::namespaced(NS, "task"));
        task.extends_type("BaseElement");
        let task_id = task.build().unwrap();
        let model = builder.build().unwrap();

        assert_eq!(
            model.type_for_name(&QName::namespaced("http://example.com/legacy", "task")),
            task_id
        );
        assert_eq!(model.actual_namespace("http://example.com/legacy"), NS);
        assert_eq!(model.alternative_namespaces(NS), vec!["http://example.com/legacy"]);
    }
}
