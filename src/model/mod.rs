//! Declarative element model
//!
//! Types are declared once through [`ModelBuilder`] and frozen into a
//! [`Model`]. Declarations hand back typed handles ([`Attribute`],
//! [`ChildElement`], [`ChildElementCollection`], [`Reference`],
//! [`ReferenceCollection`]) that read and write a [`ModelInstance`]
//! through the declared bindings.
//!
//! [`ModelInstance`]: crate::ModelInstance

pub mod attributes;
pub mod children;
pub mod references;
pub mod replacement;
pub mod types;

pub use attributes::{
    Attribute, AttributeBuilder, AttributeDecl, AttributeReferenceBuilder,
    AttributeReferenceCollectionBuilder, AttributeValue, ValueType,
};
pub use children::{
    ChildCollectionBuilder, ChildDecl, ChildElement, ChildElementBuilder, ChildElementCollection,
    ElementReferenceBuilder, ElementReferenceCollectionBuilder, Occurs, OccursViolation,
};
pub use references::{
    MatchStrategy, Multiplicity, Reference, ReferenceCollection, ReferenceDecl, ReferenceMirror,
    ReferenceState, ReferenceStorage,
};
pub use types::{
    AttributeId, ChildId, EffectiveType, ElementType, InstanceProvider, Model, ModelBuilder,
    ReferenceId, TypeBuilder, TypeId, UNKNOWN_TYPE_NAME,
};
