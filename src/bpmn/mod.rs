//! BPMN 2.0 process models
//!
//! A compact subset of the BPMN 2.0 model namespace declared through the
//! public [`ModelBuilder`] API: definitions, processes, the flow node
//! hierarchy (activities, events, gateways) and sequence flows. The model
//! is built once per process and shared; [`model`] hands out the `Arc`.
//!
//! Flow nodes store their `incoming` and `outgoing` sequence flows as
//! child elements holding qualified names. Those collections mirror the
//! `targetRef` and `sourceRef` attributes of the flows, so replacing a
//! flow node refills them from the flows that point at it.

mod elements;

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::Result;
use crate::model::{
    Attribute, ChildElementCollection, Model, ModelBuilder, Reference, ReferenceCollection,
};
use crate::namespaces::{QName, BPMN20_NAMESPACE};

pub use elements::{
    Activity, ActivityExt, BaseElement, BaseElementExt, Definitions, EndEvent, Event,
    ExclusiveGateway, FlowElement, FlowElementExt, FlowNode, FlowNodeExt, Gateway, GatewayExt,
    Incoming, Outgoing, Process, SequenceFlow, ServiceTask, StartEvent, Task, UserTask,
};

crate::xml_enum! {
    /// Direction constraint of a gateway
    pub enum GatewayDirection {
        /// No constraint
        Unspecified => "Unspecified",
        /// Many incoming, one outgoing
        Converging => "Converging",
        /// One incoming, many outgoing
        Diverging => "Diverging",
        /// Many incoming and many outgoing
        Mixed => "Mixed",
    }
}

/// Default `implementation` of a service task
pub const WEB_SERVICE_IMPLEMENTATION: &str = "##WebService";

/// The BPMN model and the handles of its declarations
#[derive(Debug)]
pub struct BpmnSchema {
    /// Frozen type registry
    pub model: Arc<Model>,
    /// `id` of every base element
    pub base_element_id: Attribute<String>,
    /// `id` of definitions
    pub definitions_id: Attribute<String>,
    /// `name` of definitions
    pub definitions_name: Attribute<String>,
    /// `targetNamespace` of definitions
    pub definitions_target_namespace: Attribute<String>,
    /// Processes of definitions
    pub definitions_processes: ChildElementCollection,
    /// `name` of a process
    pub process_name: Attribute<String>,
    /// `isExecutable` of a process
    pub process_is_executable: Attribute<bool>,
    /// Flow elements of a process
    pub process_flow_elements: ChildElementCollection,
    /// `name` of a flow element
    pub flow_element_name: Attribute<String>,
    /// Incoming sequence flows of a flow node
    pub flow_node_incoming: ReferenceCollection,
    /// Outgoing sequence flows of a flow node
    pub flow_node_outgoing: ReferenceCollection,
    /// `isForCompensation` of an activity
    pub activity_is_for_compensation: Attribute<bool>,
    /// `startQuantity` of an activity
    pub activity_start_quantity: Attribute<i64>,
    /// `implementation` of a service task
    pub service_task_implementation: Attribute<String>,
    /// `isInterrupting` of a start event
    pub start_event_is_interrupting: Attribute<bool>,
    /// `gatewayDirection` of a gateway
    pub gateway_direction: Attribute<GatewayDirection>,
    /// `default` flow of an exclusive gateway
    pub exclusive_gateway_default: Reference,
    /// `sourceRef` of a sequence flow
    pub sequence_flow_source: Reference,
    /// `targetRef` of a sequence flow
    pub sequence_flow_target: Reference,
}

static SCHEMA: Lazy<BpmnSchema> =
    Lazy::new(|| BpmnSchema::build().expect("BPMN declarations are consistent"));

/// The shared BPMN schema
pub fn schema() -> &'static BpmnSchema {
    &SCHEMA
}

/// The shared BPMN model
pub fn model() -> Arc<Model> {
    Arc::clone(&SCHEMA.model)
}

fn bpmn(local_name: &str) -> QName {
    QName::namespaced(BPMN20_NAMESPACE, local_name)
}

impl BpmnSchema {
    /// Declare every BPMN type and freeze the model
    pub fn build() -> Result<Self> {
        let mut builder = ModelBuilder::new("bpmn");

        let mut base = builder.define_type("BaseElement", bpmn("baseElement"));
        base.abstract_type();
        let base_element_id = base.string_attribute("id").id_attribute().build()?;
        base.build()?;

        let mut definitions = builder.define_type("Definitions", bpmn("definitions"));
        let definitions_id = definitions.string_attribute("id").id_attribute().build()?;
        let definitions_name = definitions.string_attribute("name").build()?;
        let definitions_target_namespace = definitions
            .string_attribute("targetNamespace")
            .required()
            .build()?;
        let definitions_processes = definitions.element_collection("Process").build()?;
        definitions.build()?;

        let mut process = builder.define_type("Process", bpmn("process"));
        process.extends_type("BaseElement");
        let process_name = process.string_attribute("name").build()?;
        let process_is_executable = process
            .boolean_attribute("isExecutable")
            .default_value(false)
            .build()?;
        let process_flow_elements = process.element_collection("FlowElement").build()?;
        process.build()?;

        let mut flow_element = builder.define_type("FlowElement", bpmn("flowElement"));
        flow_element.extends_type("BaseElement").abstract_type();
        let flow_element_name = flow_element.string_attribute("name").build()?;
        flow_element.build()?;

        let mut flow_node = builder.define_type("FlowNode", bpmn("flowNode"));
        flow_node.extends_type("FlowElement").abstract_type();
        let flow_node_incoming = flow_node
            .element_collection("Incoming")
            .qname_element_reference_collection("SequenceFlow")
            .build()?;
        let flow_node_outgoing = flow_node
            .element_collection("Outgoing")
            .qname_element_reference_collection("SequenceFlow")
            .build()?;
        flow_node.build()?;

        let mut activity = builder.define_type("Activity", bpmn("activity"));
        activity.extends_type("FlowNode").abstract_type();
        let activity_is_for_compensation = activity
            .boolean_attribute("isForCompensation")
            .default_value(false)
            .build()?;
        let activity_start_quantity = activity
            .integer_attribute("startQuantity")
            .default_value(1)
            .build()?;
        activity.build()?;

        let mut task = builder.define_type("Task", bpmn("task"));
        task.extends_type("Activity");
        task.build()?;

        let mut service_task = builder.define_type("ServiceTask", bpmn("serviceTask"));
        service_task.extends_type("Task");
        let service_task_implementation = service_task
            .string_attribute("implementation")
            .default_value(WEB_SERVICE_IMPLEMENTATION.to_string())
            .build()?;
        service_task.build()?;

        let mut user_task = builder.define_type("UserTask", bpmn("userTask"));
        user_task.extends_type("Task");
        user_task.build()?;

        let mut event = builder.define_type("Event", bpmn("event"));
        event.extends_type("FlowNode").abstract_type();
        event.build()?;

        let mut start_event = builder.define_type("StartEvent", bpmn("startEvent"));
        start_event.extends_type("Event");
        let start_event_is_interrupting = start_event
            .boolean_attribute("isInterrupting")
            .default_value(true)
            .build()?;
        start_event.build()?;

        let mut end_event = builder.define_type("EndEvent", bpmn("endEvent"));
        end_event.extends_type("Event");
        end_event.build()?;

        let mut gateway = builder.define_type("Gateway", bpmn("gateway"));
        gateway.extends_type("FlowNode").abstract_type();
        let gateway_direction = gateway
            .enum_attribute::<GatewayDirection>("gatewayDirection")
            .default_value(GatewayDirection::Unspecified)
            .build()?;
        gateway.build()?;

        let mut exclusive_gateway = builder.define_type("ExclusiveGateway", bpmn("exclusiveGateway"));
        exclusive_gateway.extends_type("Gateway");
        let exclusive_gateway_default = exclusive_gateway
            .string_attribute("default")
            .id_attribute_reference("SequenceFlow")
            .build()?;
        exclusive_gateway.build()?;

        let mut sequence_flow = builder.define_type("SequenceFlow", bpmn("sequenceFlow"));
        sequence_flow.extends_type("FlowElement");
        let sequence_flow_source = sequence_flow
            .string_attribute("sourceRef")
            .required()
            .qname_attribute_reference("FlowNode")
            .build()?;
        let sequence_flow_target = sequence_flow
            .string_attribute("targetRef")
            .required()
            .qname_attribute_reference("FlowNode")
            .build()?;
        sequence_flow.build()?;

        builder.define_type("Incoming", bpmn("incoming")).build()?;
        builder.define_type("Outgoing", bpmn("outgoing")).build()?;

        builder.mirror(flow_node_incoming, sequence_flow_target)?;
        builder.mirror(flow_node_outgoing, sequence_flow_source)?;

        Ok(Self {
            model: Arc::new(builder.build()?),
            base_element_id,
            definitions_id,
            definitions_name,
            definitions_target_namespace,
            definitions_processes,
            process_name,
            process_is_executable,
            process_flow_elements,
            flow_element_name,
            flow_node_incoming,
            flow_node_outgoing,
            activity_is_for_compensation,
            activity_start_quantity,
            service_task_implementation,
            start_event_is_interrupting,
            gateway_direction,
            exclusive_gateway_default,
            sequence_flow_source,
            sequence_flow_target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builds() {
        let model = model();
        assert_eq!(model.name(), "bpmn");
        let task = model.type_by_name("Task").unwrap();
        assert!(!task.is_abstract());
        let flow_node = model.type_id("FlowNode").unwrap();
        assert!(model.is_a(task.id(), flow_node));
        assert_eq!(model.mirrors().len(), 2);
    }

    #[test]
    fn test_type_lookup_by_element_name() {
        let model = model();
        let ty = model.type_for_name(&bpmn("exclusiveGateway"));
        assert_eq!(model.element_type(ty).type_name(), "ExclusiveGateway");
    }

    #[test]
    fn test_gateway_direction_literals() {
        use crate::model::AttributeValue;
        assert_eq!(
            GatewayDirection::from_xml("Diverging"),
            Some(GatewayDirection::Diverging)
        );
        assert_eq!(GatewayDirection::Mixed.to_xml(), "Mixed");
    }
}
