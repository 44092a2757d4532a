//! # xmlmodel
//!
//! A declarative object model for typed, namespace-aware XML documents.
//!
//! Element types are declared once: their attributes (typed, namespaced,
//! defaulted, required), their permitted children in sequence order, and
//! their references to other elements of the same document by id or by
//! qualified name. The resulting [`Model`](model::Model) gives a live,
//! typed view over a parsed or created document that resolves references
//! on every read and keeps them consistent as the document changes.
//!
//! ## Features
//!
//! - Single-inheritance type registry with abstract types
//! - Typed attribute handles (string, boolean, integer, enumeration)
//! - Sequence-ordered child insertion with occurrence bounds
//! - Id and qualified-name references, single or collection, stored in
//!   attributes or child elements
//! - Id renames, element removal and replacement rewire references
//! - A compact BPMN 2.0 schema built on the engine ([`bpmn`])
//!
//! ## Example
//!
//! ```rust
//! use xmlmodel::bpmn::{self, SequenceFlow};
//! use xmlmodel::ModelInstance;
//!
//! let xml = r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL" id="defs">
//!   <process id="p">
//!     <startEvent id="start"/>
//!     <endEvent id="end"/>
//!     <sequenceFlow id="flow" sourceRef="start" targetRef="end"/>
//!   </process>
//! </definitions>"#;
//!
//! let instance = ModelInstance::parse(bpmn::model(), xml)?;
//! let flow: SequenceFlow = instance.cast(instance.get_model_element_by_id("flow").unwrap())?;
//! let target = flow.target(&instance)?.unwrap();
//! assert_eq!(instance.id_of(target)?.as_deref(), Some("end"));
//! # Ok::<(), xmlmodel::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and namespaces
pub mod namespaces;
pub mod names;

// Document tree
pub mod documents;

// Declarative model
pub mod model;
pub mod index;
pub mod instance;

// Inspection
pub mod dump;

// Schemas built on the engine
pub mod bpmn;

// Re-exports for convenience
pub use error::{Error, Result};
pub use instance::{ModelElement, ModelInstance, TypedElement};
pub use model::{Model, ModelBuilder};
pub use namespaces::QName;

/// Version of the xmlmodel library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
