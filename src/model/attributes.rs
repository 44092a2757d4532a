//! Attribute declarations and typed attribute access
//!
//! Attribute values are stored as text in the document. An
//! [`Attribute<T>`] handle decodes them on every read through the
//! [`AttributeValue`] implementation of `T` and encodes them on write,
//! so there is no cached typed state that could drift from the tree.

use std::fmt;
use std::marker::PhantomData;

use crate::error::{DecodeError, Result};
use crate::instance::{ModelElement, ModelInstance};
use crate::names::validate_ncname;
use crate::namespaces::QName;

use super::references::{
    MatchStrategy, Multiplicity, Reference, ReferenceCollection, ReferenceDecl, ReferenceStorage,
};
use super::types::{AttributeId, ReferenceId, TypeBuilder, TypeId};

/// Declared value type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Free text
    String,
    /// `true` or `false`
    Boolean,
    /// Signed integer
    Integer,
    /// One of a closed set of literals
    Enum,
    /// Identifier of another element
    IdReference,
    /// Possibly prefixed identifier of another element
    QNameReference,
}

impl ValueType {
    /// Name used in error messages and dumps
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Enum => "enumeration",
            ValueType::IdReference => "id reference",
            ValueType::QNameReference => "qname reference",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion between an attribute's text form and a Rust value
pub trait AttributeValue: Sized {
    /// Value type recorded in the attribute declaration
    const VALUE_TYPE: ValueType;

    /// Decode from the text form, `None` if malformed
    fn from_xml(value: &str) -> Option<Self>;

    /// Encode to the text form
    fn to_xml(&self) -> String;
}

impl AttributeValue for String {
    const VALUE_TYPE: ValueType = ValueType::String;

    fn from_xml(value: &str) -> Option<Self> {
        Some(value.to_string())
    }

    fn to_xml(&self) -> String {
        self.clone()
    }
}

impl AttributeValue for bool {
    const VALUE_TYPE: ValueType = ValueType::Boolean;

    fn from_xml(value: &str) -> Option<Self> {
        match value.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    fn to_xml(&self) -> String {
        self.to_string()
    }
}

impl AttributeValue for i64 {
    const VALUE_TYPE: ValueType = ValueType::Integer;

    fn from_xml(value: &str) -> Option<Self> {
        value.trim().parse().ok()
    }

    fn to_xml(&self) -> String {
        self.to_string()
    }
}

impl AttributeValue for i32 {
    const VALUE_TYPE: ValueType = ValueType::Integer;

    fn from_xml(value: &str) -> Option<Self> {
        value.trim().parse().ok()
    }

    fn to_xml(&self) -> String {
        self.to_string()
    }
}

/// Declare an enumeration usable as an attribute value
///
/// ```
/// xmlmodel::xml_enum! {
///     /// Direction of a gateway
///     pub enum Direction {
///         Converging => "Converging",
///         Diverging => "Diverging",
///     }
/// }
/// ```
#[macro_export]
macro_rules! xml_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $literal:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $crate::model::AttributeValue for $name {
            const VALUE_TYPE: $crate::model::ValueType = $crate::model::ValueType::Enum;

            fn from_xml(value: &str) -> Option<Self> {
                match value.trim() {
                    $($literal => Some($name::$variant),)+
                    _ => None,
                }
            }

            fn to_xml(&self) -> String {
                match self {
                    $($name::$variant => $literal.to_string()),+
                }
            }
        }
    };
}

/// Declared attribute of an element type
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    id: AttributeId,
    owner: TypeId,
    name: QName,
    value_type: ValueType,
    required: bool,
    default: Option<String>,
    is_id: bool,
    overrides: bool,
    reference: Option<ReferenceId>,
}

impl AttributeDecl {
    /// Handle of this declaration
    pub fn id(&self) -> AttributeId {
        self.id
    }

    /// Declaring type
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    /// Attribute name; unqualified unless a namespace was declared
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Value type
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Required attributes have no default
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Default returned when the attribute is absent
    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Whether this attribute identifies its element
    pub fn is_id_attribute(&self) -> bool {
        self.is_id
    }

    /// Whether this declaration deliberately replaces an inherited one
    pub fn is_override(&self) -> bool {
        self.overrides
    }

    /// Reference stored in this attribute, if any
    pub fn reference(&self) -> Option<ReferenceId> {
        self.reference
    }

    pub(crate) fn assign(&mut self, id: AttributeId, owner: TypeId) {
        self.id = id;
        self.owner = owner;
    }

    pub(crate) fn set_reference(&mut self, reference: ReferenceId) {
        self.reference = Some(reference);
    }
}

/// Typed handle to a declared attribute
pub struct Attribute<T> {
    id: AttributeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Attribute<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Attribute<T> {}

impl<T> fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Attribute").field(&self.id).finish()
    }
}

impl<T: AttributeValue> Attribute<T> {
    pub(crate) fn new(id: AttributeId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Declaration handle
    pub fn id(&self) -> AttributeId {
        self.id
    }

    /// Read and decode the value
    ///
    /// An absent attribute yields its default, or `None` without one.
    pub fn get(
        &self,
        instance: &ModelInstance,
        element: impl Into<ModelElement>,
    ) -> Result<Option<T>> {
        let element = element.into();
        let decl = instance.model().attribute(self.id);
        let raw = instance.declared_attribute(element, self.id)?;
        let text = match raw.as_deref().or(decl.default_value()) {
            Some(text) => text,
            None => return Ok(None),
        };
        T::from_xml(text).map(Some).ok_or_else(|| {
            DecodeError::new(
                decl.name().local_name.as_str(),
                text,
                T::VALUE_TYPE.as_str(),
            )
            .into()
        })
    }

    /// Raw text of the attribute, without applying the default
    pub fn raw(
        &self,
        instance: &ModelInstance,
        element: impl Into<ModelElement>,
    ) -> Result<Option<String>> {
        instance.declared_attribute(element.into(), self.id)
    }

    /// Check if the attribute is present in the document
    pub fn is_set(&self, instance: &ModelInstance, element: impl Into<ModelElement>) -> Result<bool> {
        Ok(self.raw(instance, element)?.is_some())
    }

    /// Encode and write the value
    pub fn set(
        &self,
        instance: &mut ModelInstance,
        element: impl Into<ModelElement>,
        value: T,
    ) -> Result<()> {
        instance.set_declared_attribute(element.into(), self.id, value.to_xml())
    }

    /// Remove the attribute from the element
    pub fn remove(&self, instance: &mut ModelInstance, element: impl Into<ModelElement>) -> Result<()> {
        instance.remove_declared_attribute(element.into(), self.id)
    }
}

/// Declares an attribute on the type under construction
pub struct AttributeBuilder<'t, 'm, T> {
    owner: &'t mut TypeBuilder<'m>,
    name: QName,
    required: bool,
    default: Option<String>,
    is_id: bool,
    overrides: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<'t, 'm, T: AttributeValue> AttributeBuilder<'t, 'm, T> {
    pub(crate) fn new(owner: &'t mut TypeBuilder<'m>, name: &str) -> Self {
        Self {
            owner,
            name: QName::local(name),
            required: false,
            default: None,
            is_id: false,
            overrides: false,
            _marker: PhantomData,
        }
    }

    /// Put the attribute in a namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.name.namespace = Some(namespace.into());
        self
    }

    /// Value returned when the attribute is absent
    pub fn default_value(mut self, value: T) -> Self {
        self.default = Some(value.to_xml());
        self
    }

    /// Mark the attribute required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the attribute as the element identifier
    pub fn id_attribute(mut self) -> Self {
        self.is_id = true;
        self
    }

    /// Replace an inherited attribute of the same name
    pub fn overrides(mut self) -> Self {
        self.overrides = true;
        self
    }

    /// Add the attribute to the type
    pub fn build(mut self) -> Result<Attribute<T>> {
        let id = self.push_decl(T::VALUE_TYPE)?;
        Ok(Attribute::new(id))
    }

    fn push_decl(&mut self, value_type: ValueType) -> Result<AttributeId> {
        validate_ncname(&self.name.local_name)
            .map_err(|e| self.owner.schema_error(e.to_string()))?;
        if self.required && self.default.is_some() {
            return Err(self
                .owner
                .schema_error("a required attribute cannot have a default value")
                .with_declaration(self.name.local_name.clone())
                .into());
        }

        let decl = AttributeDecl {
            id: AttributeId(0),
            owner: TypeId::UNRESOLVED,
            name: self.name.clone(),
            value_type,
            required: self.required,
            default: self.default.take(),
            is_id: self.is_id,
            overrides: self.overrides,
            reference: None,
        };
        Ok(self.owner.push_attribute(decl))
    }
}

impl<'t, 'm> AttributeBuilder<'t, 'm, String> {
    /// Store a reference to an element of `target` type by its plain id
    pub fn id_attribute_reference(self, target: &str) -> AttributeReferenceBuilder<'t, 'm> {
        AttributeReferenceBuilder::new(self, target, MatchStrategy::Id)
    }

    /// Store a reference to an element of `target` type by a possibly prefixed id
    pub fn qname_attribute_reference(self, target: &str) -> AttributeReferenceBuilder<'t, 'm> {
        AttributeReferenceBuilder::new(self, target, MatchStrategy::QName)
    }

    /// Store references to elements of `target` type as a list of ids
    pub fn id_attribute_reference_collection(
        self,
        target: &str,
    ) -> AttributeReferenceCollectionBuilder<'t, 'm> {
        AttributeReferenceCollectionBuilder {
            inner: AttributeReferenceBuilder::new(self, target, MatchStrategy::Id),
        }
    }

    /// Store references to elements of `target` type as a list of possibly prefixed ids
    pub fn qname_attribute_reference_collection(
        self,
        target: &str,
    ) -> AttributeReferenceCollectionBuilder<'t, 'm> {
        AttributeReferenceCollectionBuilder {
            inner: AttributeReferenceBuilder::new(self, target, MatchStrategy::QName),
        }
    }
}

/// Declares a single reference stored in an attribute
pub struct AttributeReferenceBuilder<'t, 'm> {
    attribute: AttributeBuilder<'t, 'm, String>,
    target: String,
    matching: MatchStrategy,
}

impl<'t, 'm> AttributeReferenceBuilder<'t, 'm> {
    fn new(attribute: AttributeBuilder<'t, 'm, String>, target: &str, matching: MatchStrategy) -> Self {
        Self {
            attribute,
            target: target.to_string(),
            matching,
        }
    }

    fn push(mut self, multiplicity: Multiplicity) -> Result<ReferenceId> {
        let value_type = match self.matching {
            MatchStrategy::Id => ValueType::IdReference,
            MatchStrategy::QName => ValueType::QNameReference,
        };
        let attribute = self.attribute.push_decl(value_type)?;
        let storage = match multiplicity {
            Multiplicity::Single => ReferenceStorage::Attribute { attribute },
            Multiplicity::Collection => ReferenceStorage::AttributeList { attribute },
        };
        let owner = &mut self.attribute.owner;
        let reference = owner.push_reference(ReferenceDecl::new(
            self.attribute.name.local_name.clone(),
            self.target,
            self.matching,
            storage,
            multiplicity,
        ));
        owner.builder.attributes[attribute.0 as usize].set_reference(reference);
        Ok(reference)
    }

    /// Add the attribute and its reference to the type
    pub fn build(self) -> Result<Reference> {
        self.push(Multiplicity::Single).map(Reference::new)
    }
}

/// Declares a reference collection stored in a list-valued attribute
pub struct AttributeReferenceCollectionBuilder<'t, 'm> {
    inner: AttributeReferenceBuilder<'t, 'm>,
}

impl AttributeReferenceCollectionBuilder<'_, '_> {
    /// Add the attribute and its reference collection to the type
    pub fn build(self) -> Result<ReferenceCollection> {
        self.inner
            .push(Multiplicity::Collection)
            .map(ReferenceCollection::new)
    }
}
