//! Serializable dumps of a model and of a model instance
//!
//! These structures are plain data for JSON output: the CLI prints them
//! and tests compare them. Names use Clark notation (`{namespace}local`).

use serde::{Deserialize, Serialize};

use crate::documents::NodeId;
use crate::error::Result;
use crate::instance::{ModelElement, ModelInstance};
use crate::model::{Model, ReferenceState, TypeId};

/// Complete model dump
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDump {
    /// Model name
    pub name: String,

    /// Registered types in registration order
    pub types: Vec<TypeInfo>,
}

/// Type information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeInfo {
    /// Registered type name
    pub name: String,

    /// Element name (qualified format)
    pub qualified_name: String,

    /// Base type name
    pub base_type: Option<String>,

    /// Whether the type is abstract
    #[serde(rename = "abstract")]
    pub is_abstract: bool,

    /// Effective attributes, inherited first
    pub attributes: Vec<AttributeInfo>,

    /// Effective children in sequence order
    pub children: Vec<ChildInfo>,

    /// Effective references
    pub references: Vec<ReferenceInfo>,
}

/// Attribute information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeInfo {
    /// Attribute name (qualified format when namespaced)
    pub name: String,

    /// Value type
    #[serde(rename = "type")]
    pub value_type: String,

    /// Whether the attribute is required
    pub required: bool,

    /// Default value
    pub default: Option<String>,

    /// Whether the attribute identifies the element
    pub id: bool,
}

/// Child declaration information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChildInfo {
    /// Target type name
    #[serde(rename = "type")]
    pub element_type: String,

    /// Minimum occurrences
    pub min_occurs: u32,

    /// Maximum occurrences (None means unbounded)
    pub max_occurs: Option<u32>,
}

/// Reference declaration information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceInfo {
    /// Attribute or child type the reference is stored under
    pub name: String,

    /// Flavor, e.g. `qname attribute reference`
    pub kind: String,

    /// Target type name
    pub target: String,
}

/// Complete instance dump
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceDump {
    /// Model name
    pub model: String,

    /// Attached elements in document order
    pub elements: Vec<ElementInfo>,
}

/// Element information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementInfo {
    /// Element name (qualified format)
    pub name: String,

    /// Registered type name
    #[serde(rename = "type")]
    pub element_type: String,

    /// Identifier
    pub id: Option<String>,

    /// Nesting depth, 0 for the document element
    pub depth: usize,

    /// Stored references and how they resolve
    pub references: Vec<ReferenceValue>,
}

/// One stored reference identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceValue {
    /// Reference name
    pub name: String,

    /// Identifier as stored
    pub identifier: String,

    /// Id of the resolved target, None if dangling
    pub target: Option<String>,
}

impl Model {
    /// Dump the type registry
    pub fn dump(&self) -> ModelDump {
        ModelDump {
            name: self.name().to_string(),
            types: self.types().map(|t| self.type_info(t.id())).collect(),
        }
    }

    fn type_info(&self, id: TypeId) -> TypeInfo {
        let ty = self.element_type(id);
        let effective = self.resolve_effective(id);
        TypeInfo {
            name: ty.type_name().to_string(),
            qualified_name: ty.qname().to_string(),
            base_type: ty
                .base_type()
                .map(|base| self.element_type(base).type_name().to_string()),
            is_abstract: ty.is_abstract(),
            attributes: effective
                .attributes
                .iter()
                .map(|a| {
                    let decl = self.attribute(*a);
                    AttributeInfo {
                        name: decl.name().to_string(),
                        value_type: decl.value_type().to_string(),
                        required: decl.is_required(),
                        default: decl.default_value().map(str::to_string),
                        id: decl.is_id_attribute(),
                    }
                })
                .collect(),
            children: effective
                .children
                .iter()
                .map(|c| {
                    let decl = self.child(*c);
                    ChildInfo {
                        element_type: decl.target_name().to_string(),
                        min_occurs: decl.occurs().min,
                        max_occurs: decl.occurs().max,
                    }
                })
                .collect(),
            references: effective
                .references
                .iter()
                .map(|r| {
                    let decl = self.reference(*r);
                    ReferenceInfo {
                        name: decl.name().to_string(),
                        kind: decl.flavor(),
                        target: decl.target_name().to_string(),
                    }
                })
                .collect(),
        }
    }
}

impl ModelInstance {
    /// Dump the attached elements with their resolved references
    pub fn dump(&self) -> Result<InstanceDump> {
        let mut elements = Vec::new();
        if let Some(root) = self.document().root() {
            self.dump_element(root, 0, &mut elements)?;
        }
        Ok(InstanceDump {
            model: self.model().name().to_string(),
            elements,
        })
    }

    fn dump_element(&self, node: NodeId, depth: usize, out: &mut Vec<ElementInfo>) -> Result<()> {
        let element = ModelElement::from_node(node);
        let ty = self.element_type(element)?;
        let mut references = Vec::new();
        for reference in &self.model().resolve_effective(ty.id()).references {
            let decl = self.model().reference(*reference);
            for slot in self.reference_slots(decl, node)? {
                let target = match self.resolve_slot(decl, &slot)? {
                    ReferenceState::Resolved(target) => self.id_of(target)?,
                    _ => None,
                };
                references.push(ReferenceValue {
                    name: decl.name().to_string(),
                    identifier: slot.identifier,
                    target,
                });
            }
        }

        out.push(ElementInfo {
            name: self.element_name(element)?.to_string(),
            element_type: ty.type_name().to_string(),
            id: self.id_of(element)?,
            depth,
            references,
        });
        for child in self.document().children(node)? {
            self.dump_element(*child, depth + 1, out)?;
        }
        Ok(())
    }
}
