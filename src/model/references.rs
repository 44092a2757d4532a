//! Reference declarations and resolution
//!
//! A reference is a value on a source element that denotes a target
//! element elsewhere in the same document. The identifier is stored in
//! an attribute (one id, or a whitespace/comma separated list) or in the
//! text or an attribute of dedicated child elements. It is matched
//! either as a plain id or as a possibly prefixed qualified name.
//!
//! Resolution runs on every read against the instance's identity index;
//! nothing is cached on the source element. A missing target is not an
//! error: single references read as `None` and collections skip it.

use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::documents::NodeId;
use crate::error::{Result, StructureError};
use crate::instance::{ModelElement, ModelInstance};
use crate::names::{join_identifier_list, split_identifier_list, split_qname, with_local_part};
use crate::namespaces::QName;

use super::types::{AttributeId, ChildId, ReferenceId, TypeId};

/// How an identifier is compared with element ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStrategy {
    /// The identifier is the target's id
    Id,
    /// The identifier is `[prefix:]id`; the prefix must denote the target's namespace
    QName,
}

/// Whether a reference denotes one element or many
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplicity {
    /// At most one target
    Single,
    /// Ordered targets
    Collection,
}

/// Where the identifiers of a reference are stored on the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceStorage {
    /// Value of a single attribute
    Attribute {
        /// Backing attribute
        attribute: AttributeId,
    },
    /// Whitespace or comma separated list in a single attribute
    AttributeList {
        /// Backing attribute
        attribute: AttributeId,
    },
    /// Text content of dedicated child elements
    ChildText {
        /// Backing child declaration
        child: ChildId,
    },
    /// Named attribute of dedicated child elements
    ChildAttribute {
        /// Backing child declaration
        child: ChildId,
        /// Attribute of the child holding the identifier
        attribute: QName,
    },
}

/// Declared reference of an element type
#[derive(Debug, Clone)]
pub struct ReferenceDecl {
    id: ReferenceId,
    owner: TypeId,
    name: String,
    target: TypeId,
    target_name: String,
    matching: MatchStrategy,
    storage: ReferenceStorage,
    multiplicity: Multiplicity,
}

impl ReferenceDecl {
    pub(crate) fn new(
        name: String,
        target_name: String,
        matching: MatchStrategy,
        storage: ReferenceStorage,
        multiplicity: Multiplicity,
    ) -> Self {
        Self {
            id: ReferenceId(0),
            owner: TypeId::UNRESOLVED,
            name,
            target: TypeId::UNRESOLVED,
            target_name,
            matching,
            storage,
            multiplicity,
        }
    }

    /// Handle of this declaration
    pub fn id(&self) -> ReferenceId {
        self.id
    }

    /// Declaring (source) type
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    /// Attribute name or child type name the reference is stored under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Permitted target type, extending types included
    pub fn target_type(&self) -> TypeId {
        self.target
    }

    /// Registered name of the target type
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Identifier matching strategy
    pub fn matching(&self) -> MatchStrategy {
        self.matching
    }

    /// Storage of the identifiers
    pub fn storage(&self) -> &ReferenceStorage {
        &self.storage
    }

    /// Single reference or collection
    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    /// Short description of the flavor, e.g. `qname element reference collection`
    pub fn flavor(&self) -> String {
        let matching = match self.matching {
            MatchStrategy::Id => "id",
            MatchStrategy::QName => "qname",
        };
        let storage = match self.storage {
            ReferenceStorage::Attribute { .. } | ReferenceStorage::AttributeList { .. } => "attribute",
            _ => "element",
        };
        match self.multiplicity {
            Multiplicity::Single => format!("{} {} reference", matching, storage),
            Multiplicity::Collection => format!("{} {} reference collection", matching, storage),
        }
    }

    pub(crate) fn assign(&mut self, id: ReferenceId, owner: TypeId) {
        self.id = id;
        self.owner = owner;
    }

    pub(crate) fn set_target(&mut self, target: TypeId) {
        self.target = target;
    }
}

/// Outcome of resolving one stored identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceState {
    /// Nothing is stored
    Unresolved,
    /// The identifier denotes this element
    Resolved(ModelElement),
    /// An identifier is stored but no matching element exists
    Dangling(String),
}

impl ReferenceState {
    /// Resolved target, if any
    pub fn target(&self) -> Option<ModelElement> {
        match self {
            ReferenceState::Resolved(element) => Some(*element),
            _ => None,
        }
    }

    /// Check if the reference resolved
    pub fn is_resolved(&self) -> bool {
        matches!(self, ReferenceState::Resolved(_))
    }

    /// Check if a stored identifier matched nothing
    pub fn is_dangling(&self) -> bool {
        matches!(self, ReferenceState::Dangling(_))
    }
}

/// Handle to a declared single reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference {
    id: ReferenceId,
}

impl Reference {
    pub(crate) fn new(id: ReferenceId) -> Self {
        Self { id }
    }

    /// Declaration handle
    pub fn id(&self) -> ReferenceId {
        self.id
    }

    /// Resolve the reference
    pub fn get(
        &self,
        instance: &ModelInstance,
        source: impl Into<ModelElement>,
    ) -> Result<Option<ModelElement>> {
        Ok(self.state(instance, source)?.target())
    }

    /// Resolve the reference, distinguishing unset from dangling
    pub fn state(&self, instance: &ModelInstance, source: impl Into<ModelElement>) -> Result<ReferenceState> {
        let decl = instance.model().reference(self.id);
        let source = instance.check_reference_source(decl, source.into())?;
        match instance.reference_slots(decl, source)?.into_iter().next() {
            Some(slot) => instance.resolve_slot(decl, &slot),
            None => Ok(ReferenceState::Unresolved),
        }
    }

    /// Stored identifier, as written in the document
    pub fn identifier(
        &self,
        instance: &ModelInstance,
        source: impl Into<ModelElement>,
    ) -> Result<Option<String>> {
        let decl = instance.model().reference(self.id);
        let source = instance.check_reference_source(decl, source.into())?;
        Ok(instance
            .reference_slots(decl, source)?
            .into_iter()
            .next()
            .map(|slot| slot.identifier))
    }

    /// Point the reference at `target`
    ///
    /// The target must be of the declared target type and carry an id.
    pub fn set(
        &self,
        instance: &mut ModelInstance,
        source: impl Into<ModelElement>,
        target: impl Into<ModelElement>,
    ) -> Result<()> {
        let model = Arc::clone(instance.model_arc());
        let decl = model.reference(self.id);
        let source = instance.check_reference_source(decl, source.into())?;
        let identifier = instance.identifier_for(decl, target.into())?;
        instance.write_single_identifier(decl, source, identifier)
    }

    /// Remove the stored identifier
    pub fn clear(&self, instance: &mut ModelInstance, source: impl Into<ModelElement>) -> Result<()> {
        let model = Arc::clone(instance.model_arc());
        let decl = model.reference(self.id);
        let source = instance.check_reference_source(decl, source.into())?;
        let slots = instance.reference_slots(decl, source)?;
        instance.delete_slots(decl, source, &slots)
    }

    /// Every attached element whose reference resolves to `target`
    pub fn find_sources(
        &self,
        instance: &ModelInstance,
        target: impl Into<ModelElement>,
    ) -> Result<Vec<ModelElement>> {
        instance.find_reference_sources(self.id, target.into())
    }
}

/// Handle to a declared reference collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceCollection {
    id: ReferenceId,
}

impl ReferenceCollection {
    pub(crate) fn new(id: ReferenceId) -> Self {
        Self { id }
    }

    /// Declaration handle
    pub fn id(&self) -> ReferenceId {
        self.id
    }

    /// Resolved targets in storage order; unmatched identifiers are skipped
    pub fn targets(
        &self,
        instance: &ModelInstance,
        source: impl Into<ModelElement>,
    ) -> Result<Vec<ModelElement>> {
        Ok(self
            .states(instance, source)?
            .into_iter()
            .filter_map(|state| state.target())
            .collect())
    }

    /// Resolution outcome of every stored identifier
    pub fn states(
        &self,
        instance: &ModelInstance,
        source: impl Into<ModelElement>,
    ) -> Result<Vec<ReferenceState>> {
        let decl = instance.model().reference(self.id);
        let source = instance.check_reference_source(decl, source.into())?;
        instance
            .reference_slots(decl, source)?
            .iter()
            .map(|slot| instance.resolve_slot(decl, slot))
            .collect()
    }

    /// Stored identifiers, as written in the document
    pub fn identifiers(
        &self,
        instance: &ModelInstance,
        source: impl Into<ModelElement>,
    ) -> Result<Vec<String>> {
        let decl = instance.model().reference(self.id);
        let source = instance.check_reference_source(decl, source.into())?;
        Ok(instance
            .reference_slots(decl, source)?
            .into_iter()
            .map(|slot| slot.identifier)
            .collect())
    }

    /// Number of resolved targets
    pub fn len(&self, instance: &ModelInstance, source: impl Into<ModelElement>) -> Result<usize> {
        Ok(self.targets(instance, source)?.len())
    }

    /// Check if no target resolves
    pub fn is_empty(&self, instance: &ModelInstance, source: impl Into<ModelElement>) -> Result<bool> {
        Ok(self.targets(instance, source)?.is_empty())
    }

    /// Check if `target` is among the resolved targets
    pub fn contains(
        &self,
        instance: &ModelInstance,
        source: impl Into<ModelElement>,
        target: impl Into<ModelElement>,
    ) -> Result<bool> {
        let target = target.into();
        Ok(self.targets(instance, source)?.contains(&target))
    }

    /// Append `target`; returns false if it is already listed
    pub fn add(
        &self,
        instance: &mut ModelInstance,
        source: impl Into<ModelElement>,
        target: impl Into<ModelElement>,
    ) -> Result<bool> {
        let model = Arc::clone(instance.model_arc());
        let decl = model.reference(self.id);
        let source = instance.check_reference_source(decl, source.into())?;
        let target = target.into();
        let identifier = instance.identifier_for(decl, target)?;
        if self.contains(instance, source, target)? {
            return Ok(false);
        }
        instance.push_identifier(decl, source, identifier)?;
        Ok(true)
    }

    /// Remove every identifier that resolves to `target`; returns whether one did
    pub fn remove(
        &self,
        instance: &mut ModelInstance,
        source: impl Into<ModelElement>,
        target: impl Into<ModelElement>,
    ) -> Result<bool> {
        let model = Arc::clone(instance.model_arc());
        let decl = model.reference(self.id);
        let source = instance.check_reference_source(decl, source.into())?;
        let target = target.into();
        let mut doomed = Vec::new();
        for slot in instance.reference_slots(decl, source)? {
            if instance.resolve_slot(decl, &slot)?.target() == Some(target) {
                doomed.push(slot);
            }
        }
        if doomed.is_empty() {
            return Ok(false);
        }
        instance.delete_slots(decl, source, &doomed)?;
        Ok(true)
    }

    /// Remove every stored identifier
    pub fn clear(&self, instance: &mut ModelInstance, source: impl Into<ModelElement>) -> Result<()> {
        let model = Arc::clone(instance.model_arc());
        let decl = model.reference(self.id);
        let source = instance.check_reference_source(decl, source.into())?;
        let slots = instance.reference_slots(decl, source)?;
        instance.delete_slots(decl, source, &slots)
    }

    /// Every attached element whose collection resolves to `target`
    pub fn find_sources(
        &self,
        instance: &ModelInstance,
        target: impl Into<ModelElement>,
    ) -> Result<Vec<ModelElement>> {
        instance.find_reference_sources(self.id, target.into())
    }
}

/// A stored reference collection kept in step with a forward reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceMirror {
    collection: ReferenceCollection,
    source: Reference,
}

impl ReferenceMirror {
    pub(crate) fn new(collection: ReferenceCollection, source: Reference) -> Self {
        Self { collection, source }
    }

    /// The stored collection on the target side
    pub fn collection(&self) -> ReferenceCollection {
        self.collection
    }

    /// The forward reference on the source side
    pub fn source(&self) -> Reference {
        self.source
    }
}

/// One stored identifier and the node it is stored on
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Slot {
    /// Source node for attribute storage, backing child for element storage
    pub holder: NodeId,
    pub identifier: String,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' on {}", self.identifier, self.holder)
    }
}

impl ModelInstance {
    /// Check that `source` may carry the reference and return its node
    pub(crate) fn check_reference_source(&self, decl: &ReferenceDecl, source: ModelElement) -> Result<NodeId> {
        let source_type = self.type_id_of(source)?;
        if self.model().is_a(source_type, decl.owner()) {
            Ok(source.node())
        } else {
            Err(StructureError::new(format!(
                "element does not carry the reference '{}'",
                decl.name()
            ))
            .with_attempted(self.model().element_type(source_type).type_name())
            .with_permitted([self.model().element_type(decl.owner()).type_name()])
            .into())
        }
    }

    /// Identifier to store for `target`, checking its type
    pub(crate) fn identifier_for(&self, decl: &ReferenceDecl, target: ModelElement) -> Result<String> {
        let target_type = self.type_id_of(target)?;
        if !self.model().is_a(target_type, decl.target_type()) {
            return Err(StructureError::new(format!(
                "reference '{}' cannot point at this element type",
                decl.name()
            ))
            .with_attempted(self.model().element_type(target_type).type_name())
            .with_permitted([decl.target_name()])
            .into());
        }
        self.id_value(target.node())?.ok_or_else(|| {
            StructureError::new(format!(
                "reference '{}' target has no identifier",
                decl.name()
            ))
            .into()
        })
    }

    /// Backing child nodes of an element reference, in document order
    fn backing_children(&self, child: ChildId, source: NodeId) -> Result<Vec<NodeId>> {
        let target = self.model().child(child).target_type();
        let mut result = Vec::new();
        for node in self.doc.children(source)? {
            if self.model().is_a(self.node_type(*node)?, target) {
                result.push(*node);
            }
        }
        Ok(result)
    }

    /// Stored identifiers of a reference on `source`
    pub(crate) fn reference_slots(&self, decl: &ReferenceDecl, source: NodeId) -> Result<Vec<Slot>> {
        let mut slots = Vec::new();
        match decl.storage() {
            ReferenceStorage::Attribute { attribute } => {
                if let Some(value) = self.attribute_node(source, *attribute)? {
                    let value = value.trim();
                    if !value.is_empty() {
                        slots.push(Slot {
                            holder: source,
                            identifier: value.to_string(),
                        });
                    }
                }
            }
            ReferenceStorage::AttributeList { attribute } => {
                if let Some(value) = self.attribute_node(source, *attribute)? {
                    slots.extend(split_identifier_list(&value).map(|token| Slot {
                        holder: source,
                        identifier: token.to_string(),
                    }));
                }
            }
            ReferenceStorage::ChildText { child } => {
                for holder in self.backing_children(*child, source)? {
                    if let Some(text) = self.doc.text(holder)?.map(str::trim) {
                        if !text.is_empty() {
                            slots.push(Slot {
                                holder,
                                identifier: text.to_string(),
                            });
                        }
                    }
                }
            }
            ReferenceStorage::ChildAttribute { child, attribute } => {
                for holder in self.backing_children(*child, source)? {
                    if let Some(value) = self.doc.attribute(holder, attribute)?.map(str::trim) {
                        if !value.is_empty() {
                            slots.push(Slot {
                                holder,
                                identifier: value.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(slots)
    }

    /// Resolve one stored identifier against the identity index
    pub(crate) fn resolve_slot(&self, decl: &ReferenceDecl, slot: &Slot) -> Result<ReferenceState> {
        let model = self.model();
        let (namespace, id) = match decl.matching() {
            MatchStrategy::Id => (None, slot.identifier.as_str()),
            MatchStrategy::QName => match split_qname(&slot.identifier) {
                (Some(prefix), local) => {
                    let ctx = self.doc.namespace_context(slot.holder)?;
                    match ctx.lookup(Some(prefix)) {
                        Some(ns) => (Some(ns.to_string()), local),
                        None => return Ok(ReferenceState::Dangling(slot.identifier.clone())),
                    }
                }
                (None, local) => (None, local),
            },
        };

        for candidate in self.index.lookup(id) {
            if !model.is_a(self.node_type(*candidate)?, decl.target_type()) {
                continue;
            }
            if let Some(ns) = namespace.as_deref() {
                if !self.namespace_denotes(ns, *candidate)? {
                    continue;
                }
            }
            return Ok(ReferenceState::Resolved(ModelElement::from_node(*candidate)));
        }
        Ok(ReferenceState::Dangling(slot.identifier.clone()))
    }

    /// Check if a reference prefix namespace may denote `target`
    ///
    /// The document's target namespace and the target element's own
    /// namespace both qualify.
    fn namespace_denotes(&self, namespace: &str, target: NodeId) -> Result<bool> {
        let model = self.model();
        let actual = model.actual_namespace(namespace);
        if self.target_namespace()?.as_deref() == Some(namespace) {
            return Ok(true);
        }
        let element_ns = self.doc.get(target)?.namespace();
        Ok(element_ns.map(|ns| model.actual_namespace(ns)) == Some(actual))
    }

    /// Check if a stored identifier names `target` under its id `target_id`
    ///
    /// Works from the identifier text alone so it stays usable while the
    /// index is being updated.
    fn slot_names(&self, decl: &ReferenceDecl, slot: &Slot, target: NodeId, target_id: &str) -> Result<bool> {
        if !self.model().is_a(self.node_type(target)?, decl.target_type()) {
            return Ok(false);
        }
        match decl.matching() {
            MatchStrategy::Id => Ok(slot.identifier == target_id),
            MatchStrategy::QName => match split_qname(&slot.identifier) {
                (None, local) => Ok(local == target_id),
                (Some(prefix), local) => {
                    if local != target_id {
                        return Ok(false);
                    }
                    let ctx = self.doc.namespace_context(slot.holder)?;
                    match ctx.lookup(Some(prefix)) {
                        Some(ns) => self.namespace_denotes(ns, target),
                        None => Ok(false),
                    }
                }
            },
        }
    }

    /// Store a single identifier, creating the backing child if needed
    pub(crate) fn write_single_identifier(
        &mut self,
        decl: &ReferenceDecl,
        source: NodeId,
        identifier: String,
    ) -> Result<()> {
        match decl.storage() {
            ReferenceStorage::Attribute { attribute } | ReferenceStorage::AttributeList { attribute } => {
                let name = self.model().attribute(*attribute).name().clone();
                self.doc.set_attribute(source, name, identifier)?;
            }
            ReferenceStorage::ChildText { child } | ReferenceStorage::ChildAttribute { child, .. } => {
                let holder = match self.backing_children(*child, source)?.into_iter().next() {
                    Some(holder) => holder,
                    None => self.create_backing_child(*child, source)?,
                };
                self.write_holder(decl.storage(), holder, identifier)?;
            }
        }
        Ok(())
    }

    /// Append an identifier to a reference collection
    pub(crate) fn push_identifier(&mut self, decl: &ReferenceDecl, source: NodeId, identifier: String) -> Result<()> {
        match decl.storage() {
            ReferenceStorage::Attribute { attribute } | ReferenceStorage::AttributeList { attribute } => {
                let name = self.model().attribute(*attribute).name().clone();
                let current = self.doc.attribute(source, &name)?.unwrap_or_default();
                let value = join_identifier_list(
                    split_identifier_list(current).chain(std::iter::once(identifier.as_str())),
                );
                self.doc.set_attribute(source, name, value)?;
            }
            ReferenceStorage::ChildText { child } | ReferenceStorage::ChildAttribute { child, .. } => {
                let holder = self.create_backing_child(*child, source)?;
                self.write_holder(decl.storage(), holder, identifier)?;
            }
        }
        Ok(())
    }

    fn create_backing_child(&mut self, child: ChildId, source: NodeId) -> Result<NodeId> {
        let target = self.model().child(child).target_type();
        let holder = self.new_instance(target)?;
        self.add_child_element(ModelElement::from_node(source), holder)?;
        Ok(holder.node())
    }

    fn write_holder(&mut self, storage: &ReferenceStorage, holder: NodeId, identifier: String) -> Result<()> {
        match storage {
            ReferenceStorage::ChildAttribute { attribute, .. } => {
                self.doc.set_attribute(holder, attribute.clone(), identifier)?;
            }
            _ => self.doc.set_text(holder, Some(identifier))?,
        }
        Ok(())
    }

    /// Remove stored identifiers
    ///
    /// Attribute values and list tokens are dropped. Backing children of a
    /// collection are deleted; the backing child of a single reference is
    /// deleted only if it carries nothing else.
    pub(crate) fn delete_slots(&mut self, decl: &ReferenceDecl, source: NodeId, doomed: &[Slot]) -> Result<()> {
        if doomed.is_empty() {
            return Ok(());
        }
        match decl.storage() {
            ReferenceStorage::Attribute { attribute } => {
                let name = self.model().attribute(*attribute).name().clone();
                self.doc.remove_attribute(source, &name)?;
            }
            ReferenceStorage::AttributeList { attribute } => {
                let name = self.model().attribute(*attribute).name().clone();
                let current = self.doc.attribute(source, &name)?.unwrap_or_default().to_string();
                let mut remaining: Vec<&str> = split_identifier_list(&current).collect();
                for slot in doomed {
                    if let Some(pos) = remaining.iter().position(|t| *t == slot.identifier) {
                        remaining.remove(pos);
                    }
                }
                if remaining.is_empty() {
                    self.doc.remove_attribute(source, &name)?;
                } else {
                    self.doc
                        .set_attribute(source, name, join_identifier_list(remaining))?;
                }
            }
            storage => {
                for slot in doomed {
                    if !self.doc.contains(slot.holder) {
                        continue;
                    }
                    let keep = decl.multiplicity() == Multiplicity::Single
                        && self.holder_has_other_data(storage, slot.holder)?;
                    if keep {
                        match storage {
                            ReferenceStorage::ChildAttribute { attribute, .. } => {
                                self.doc.remove_attribute(slot.holder, attribute)?;
                            }
                            _ => self.doc.set_text(slot.holder, None)?,
                        }
                    } else {
                        self.remove_child_element(
                            ModelElement::from_node(source),
                            ModelElement::from_node(slot.holder),
                        )?;
                    }
                }
            }
        }
        trace!(reference = decl.name(), count = doomed.len(); "Reference slots removed");
        Ok(())
    }

    fn holder_has_other_data(&self, storage: &ReferenceStorage, holder: NodeId) -> Result<bool> {
        let element = self.doc.get(holder)?;
        if !element.children().is_empty() {
            return Ok(true);
        }
        Ok(match storage {
            ReferenceStorage::ChildAttribute { attribute, .. } => {
                element.text.as_deref().map_or(false, |t| !t.trim().is_empty())
                    || element.attributes.keys().any(|name| name != attribute)
            }
            _ => !element.attributes.is_empty(),
        })
    }

    /// Rewrite stored identifiers to name `new_id`, keeping prefixes
    pub(crate) fn rewrite_slots(
        &mut self,
        decl: &ReferenceDecl,
        source: NodeId,
        slots: &[Slot],
        new_id: &str,
    ) -> Result<()> {
        match decl.storage() {
            ReferenceStorage::Attribute { attribute } => {
                if let Some(slot) = slots.first() {
                    let name = self.model().attribute(*attribute).name().clone();
                    self.doc
                        .set_attribute(source, name, with_local_part(&slot.identifier, new_id))?;
                }
            }
            ReferenceStorage::AttributeList { attribute } => {
                let name = self.model().attribute(*attribute).name().clone();
                let current = self.doc.attribute(source, &name)?.unwrap_or_default().to_string();
                let value = join_identifier_list(split_identifier_list(&current).map(|token| {
                    if slots.iter().any(|slot| slot.identifier == token) {
                        with_local_part(token, new_id)
                    } else {
                        token.to_string()
                    }
                }));
                self.doc.set_attribute(source, name, value)?;
            }
            storage => {
                for slot in slots {
                    self.write_holder(storage, slot.holder, with_local_part(&slot.identifier, new_id))?;
                }
            }
        }
        for slot in slots {
            trace!(reference = decl.name(), slot = slot.to_string(), new_id = new_id; "Reference slot rewritten");
        }
        Ok(())
    }

    /// Slots anywhere in the document that name `target` under `target_id`
    pub(crate) fn collect_incoming_slots(
        &self,
        target: NodeId,
        target_id: &str,
    ) -> Result<Vec<(ReferenceId, NodeId, Vec<Slot>)>> {
        let model = self.model();
        let incoming = model.incoming_references(self.node_type(target)?);
        if incoming.is_empty() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for source in self.attached_nodes()? {
            let source_type = self.node_type(source)?;
            for reference in &incoming {
                let decl = model.reference(*reference);
                if !model.is_a(source_type, decl.owner()) {
                    continue;
                }
                let mut matching = Vec::new();
                for slot in self.reference_slots(decl, source)? {
                    if self.slot_names(decl, &slot, target, target_id)? {
                        matching.push(slot);
                    }
                }
                if !matching.is_empty() {
                    found.push((*reference, source, matching));
                }
            }
        }
        Ok(found)
    }

    /// Rewrite references to `target` after its id changed from `old_id`
    pub(crate) fn update_incoming_references(
        &mut self,
        target: NodeId,
        old_id: &str,
        new_id: &str,
    ) -> Result<usize> {
        let model = Arc::clone(self.model_arc());
        let incoming = self.collect_incoming_slots(target, old_id)?;
        let mut count = 0;
        for (reference, source, slots) in &incoming {
            self.rewrite_slots(model.reference(*reference), *source, slots, new_id)?;
            count += slots.len();
        }
        Ok(count)
    }

    /// Remove references to `target`, known under `target_id`
    pub(crate) fn unlink_incoming_references(&mut self, target: NodeId, target_id: &str) -> Result<usize> {
        let model = Arc::clone(self.model_arc());
        let incoming = self.collect_incoming_slots(target, target_id)?;
        let mut count = 0;
        for (reference, source, slots) in &incoming {
            if !self.doc.contains(*source) {
                continue;
            }
            self.delete_slots(model.reference(*reference), *source, slots)?;
            count += slots.len();
        }
        Ok(count)
    }

    /// Attached elements holding `reference` that resolves to `target`
    pub(crate) fn find_reference_sources(
        &self,
        reference: ReferenceId,
        target: ModelElement,
    ) -> Result<Vec<ModelElement>> {
        let model = self.model();
        let decl = model.reference(reference);
        let mut sources = Vec::new();
        for source in self.attached_nodes()? {
            if !model.is_a(self.node_type(source)?, decl.owner()) {
                continue;
            }
            for slot in self.reference_slots(decl, source)? {
                if self.resolve_slot(decl, &slot)?.target() == Some(target) {
                    sources.push(ModelElement::from_node(source));
                    break;
                }
            }
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_state_accessors() {
        assert!(ReferenceState::Unresolved.target().is_none());
        let dangling = ReferenceState::Dangling("Flow_9".to_string());
        assert!(dangling.is_dangling());
        assert!(!dangling.is_resolved());
    }
}
