//! Typed façades over BPMN elements
//!
//! Every registered BPMN type gets a `Copy` wrapper around a
//! [`ModelElement`]. Behavior shared along the type hierarchy lives in
//! extension traits (`BaseElementExt`, `FlowNodeExt`, ...) so a
//! `ServiceTask` answers both `implementation` and `incoming`.

use crate::error::Result;
use crate::instance::{ModelElement, ModelInstance, TypedElement};
use crate::model::Model;

use super::{schema, GatewayDirection};

macro_rules! bpmn_element {
    ($(#[$meta:meta])* $name:ident => $type_name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(ModelElement);

        impl TypedElement for $name {
            const TYPE_NAME: &'static str = $type_name;

            fn from_element_unchecked(element: ModelElement) -> Self {
                Self(element)
            }

            fn element(&self) -> ModelElement {
                self.0
            }

            fn owning_model() -> Option<&'static Model> {
                Some(&*schema().model)
            }
        }

        impl From<$name> for ModelElement {
            fn from(element: $name) -> Self {
                element.0
            }
        }
    };
}

macro_rules! impl_ext {
    ($trait:ident for $($name:ident),+) => {
        $(impl $trait for $name {})+
    };
}

fn wrap<T: TypedElement>(elements: Vec<ModelElement>) -> Vec<T> {
    elements.into_iter().map(T::from_element_unchecked).collect()
}

bpmn_element!(
    /// Any element carrying a BPMN `id`
    BaseElement => "BaseElement"
);
bpmn_element!(
    /// The `definitions` document element
    Definitions => "Definitions"
);
bpmn_element!(
    /// A `process`
    Process => "Process"
);
bpmn_element!(
    /// Any element that may appear in a process
    FlowElement => "FlowElement"
);
bpmn_element!(
    /// A node sequence flows connect
    FlowNode => "FlowNode"
);
bpmn_element!(
    /// Any activity
    Activity => "Activity"
);
bpmn_element!(
    /// A plain `task`
    Task => "Task"
);
bpmn_element!(
    /// A `serviceTask`
    ServiceTask => "ServiceTask"
);
bpmn_element!(
    /// A `userTask`
    UserTask => "UserTask"
);
bpmn_element!(
    /// Any event
    Event => "Event"
);
bpmn_element!(
    /// A `startEvent`
    StartEvent => "StartEvent"
);
bpmn_element!(
    /// An `endEvent`
    EndEvent => "EndEvent"
);
bpmn_element!(
    /// Any gateway
    Gateway => "Gateway"
);
bpmn_element!(
    /// An `exclusiveGateway`
    ExclusiveGateway => "ExclusiveGateway"
);
bpmn_element!(
    /// A `sequenceFlow` between two flow nodes
    SequenceFlow => "SequenceFlow"
);
bpmn_element!(
    /// An `incoming` child naming a sequence flow
    Incoming => "Incoming"
);
bpmn_element!(
    /// An `outgoing` child naming a sequence flow
    Outgoing => "Outgoing"
);

/// Operations of every base element
pub trait BaseElementExt: TypedElement {
    /// The `id` attribute
    fn id(&self, instance: &ModelInstance) -> Result<Option<String>> {
        instance.id_of(self.element())
    }

    /// Change the `id`, rewriting references to this element
    fn set_id(&self, instance: &mut ModelInstance, id: &str) -> Result<()> {
        schema().base_element_id.set(instance, self.element(), id.to_string())
    }

    /// Replace this element in the document with `other`
    fn replace_with_element(&self, instance: &mut ModelInstance, other: impl Into<ModelElement>) -> Result<()> {
        instance.replace_element(self.element(), other)
    }
}

/// Operations of every flow element
pub trait FlowElementExt: BaseElementExt {
    /// The `name` attribute
    fn name(&self, instance: &ModelInstance) -> Result<Option<String>> {
        schema().flow_element_name.get(instance, self.element())
    }

    /// Set the `name` attribute
    fn set_name(&self, instance: &mut ModelInstance, name: &str) -> Result<()> {
        schema().flow_element_name.set(instance, self.element(), name.to_string())
    }

    /// View as a generic flow element
    fn as_flow_element(&self) -> FlowElement {
        FlowElement(self.element())
    }
}

/// Operations of every flow node
pub trait FlowNodeExt: FlowElementExt {
    /// Sequence flows listed under `incoming`
    fn incoming(&self, instance: &ModelInstance) -> Result<Vec<SequenceFlow>> {
        Ok(wrap(schema().flow_node_incoming.targets(instance, self.element())?))
    }

    /// Sequence flows listed under `outgoing`
    fn outgoing(&self, instance: &ModelInstance) -> Result<Vec<SequenceFlow>> {
        Ok(wrap(schema().flow_node_outgoing.targets(instance, self.element())?))
    }

    /// List `flow` under `incoming`; returns false if it already is
    fn add_incoming(&self, instance: &mut ModelInstance, flow: SequenceFlow) -> Result<bool> {
        schema().flow_node_incoming.add(instance, self.element(), flow)
    }

    /// List `flow` under `outgoing`; returns false if it already is
    fn add_outgoing(&self, instance: &mut ModelInstance, flow: SequenceFlow) -> Result<bool> {
        schema().flow_node_outgoing.add(instance, self.element(), flow)
    }

    /// Drop `flow` from `incoming`
    fn remove_incoming(&self, instance: &mut ModelInstance, flow: SequenceFlow) -> Result<bool> {
        schema().flow_node_incoming.remove(instance, self.element(), flow)
    }

    /// Drop `flow` from `outgoing`
    fn remove_outgoing(&self, instance: &mut ModelInstance, flow: SequenceFlow) -> Result<bool> {
        schema().flow_node_outgoing.remove(instance, self.element(), flow)
    }

    /// Nodes whose outgoing flows end here, following `sourceRef`
    fn previous_nodes(&self, instance: &ModelInstance) -> Result<Vec<FlowNode>> {
        let mut nodes = Vec::new();
        for flow in schema().sequence_flow_target.find_sources(instance, self.element())? {
            if let Some(node) = schema().sequence_flow_source.get(instance, flow)? {
                nodes.push(FlowNode(node));
            }
        }
        Ok(nodes)
    }

    /// Nodes reached by flows starting here, following `targetRef`
    fn succeeding_nodes(&self, instance: &ModelInstance) -> Result<Vec<FlowNode>> {
        let mut nodes = Vec::new();
        for flow in schema().sequence_flow_source.find_sources(instance, self.element())? {
            if let Some(node) = schema().sequence_flow_target.get(instance, flow)? {
                nodes.push(FlowNode(node));
            }
        }
        Ok(nodes)
    }

    /// View as a generic flow node
    fn as_flow_node(&self) -> FlowNode {
        FlowNode(self.element())
    }
}

/// Operations of every activity
pub trait ActivityExt: FlowNodeExt {
    /// `isForCompensation`, false by default
    fn is_for_compensation(&self, instance: &ModelInstance) -> Result<bool> {
        Ok(schema()
            .activity_is_for_compensation
            .get(instance, self.element())?
            .unwrap_or(false))
    }

    /// Set `isForCompensation`
    fn set_for_compensation(&self, instance: &mut ModelInstance, value: bool) -> Result<()> {
        schema()
            .activity_is_for_compensation
            .set(instance, self.element(), value)
    }

    /// `startQuantity`, 1 by default
    fn start_quantity(&self, instance: &ModelInstance) -> Result<i64> {
        Ok(schema()
            .activity_start_quantity
            .get(instance, self.element())?
            .unwrap_or(1))
    }

    /// Set `startQuantity`
    fn set_start_quantity(&self, instance: &mut ModelInstance, value: i64) -> Result<()> {
        schema().activity_start_quantity.set(instance, self.element(), value)
    }
}

/// Operations of every gateway
pub trait GatewayExt: FlowNodeExt {
    /// `gatewayDirection`, `Unspecified` by default
    fn gateway_direction(&self, instance: &ModelInstance) -> Result<GatewayDirection> {
        Ok(schema()
            .gateway_direction
            .get(instance, self.element())?
            .unwrap_or(GatewayDirection::Unspecified))
    }

    /// Set `gatewayDirection`
    fn set_gateway_direction(&self, instance: &mut ModelInstance, direction: GatewayDirection) -> Result<()> {
        schema().gateway_direction.set(instance, self.element(), direction)
    }
}

impl_ext!(BaseElementExt for
    BaseElement, Process, FlowElement, FlowNode, Activity, Task, ServiceTask, UserTask,
    Event, StartEvent, EndEvent, Gateway, ExclusiveGateway, SequenceFlow);
impl_ext!(FlowElementExt for
    FlowElement, FlowNode, Activity, Task, ServiceTask, UserTask,
    Event, StartEvent, EndEvent, Gateway, ExclusiveGateway, SequenceFlow);
impl_ext!(FlowNodeExt for
    FlowNode, Activity, Task, ServiceTask, UserTask,
    Event, StartEvent, EndEvent, Gateway, ExclusiveGateway);
impl_ext!(ActivityExt for Activity, Task, ServiceTask, UserTask);
impl_ext!(GatewayExt for Gateway, ExclusiveGateway);

impl Definitions {
    /// The `id` attribute
    pub fn id(&self, instance: &ModelInstance) -> Result<Option<String>> {
        schema().definitions_id.get(instance, self.0)
    }

    /// Set the `id` attribute
    pub fn set_id(&self, instance: &mut ModelInstance, id: &str) -> Result<()> {
        schema().definitions_id.set(instance, self.0, id.to_string())
    }

    /// The `name` attribute
    pub fn name(&self, instance: &ModelInstance) -> Result<Option<String>> {
        schema().definitions_name.get(instance, self.0)
    }

    /// The `targetNamespace` attribute
    pub fn target_namespace(&self, instance: &ModelInstance) -> Result<Option<String>> {
        schema().definitions_target_namespace.get(instance, self.0)
    }

    /// Set the `targetNamespace` attribute
    pub fn set_target_namespace(&self, instance: &mut ModelInstance, namespace: &str) -> Result<()> {
        schema()
            .definitions_target_namespace
            .set(instance, self.0, namespace.to_string())
    }

    /// Contained processes
    pub fn processes(&self, instance: &ModelInstance) -> Result<Vec<Process>> {
        Ok(wrap(schema().definitions_processes.elements(instance, self.0)?))
    }

    /// Append a process
    pub fn add_process(&self, instance: &mut ModelInstance, process: Process) -> Result<()> {
        schema().definitions_processes.add(instance, self.0, process)
    }
}

impl Process {
    /// The `name` attribute
    pub fn name(&self, instance: &ModelInstance) -> Result<Option<String>> {
        schema().process_name.get(instance, self.0)
    }

    /// Set the `name` attribute
    pub fn set_name(&self, instance: &mut ModelInstance, name: &str) -> Result<()> {
        schema().process_name.set(instance, self.0, name.to_string())
    }

    /// `isExecutable`, false by default
    pub fn is_executable(&self, instance: &ModelInstance) -> Result<bool> {
        Ok(schema()
            .process_is_executable
            .get(instance, self.0)?
            .unwrap_or(false))
    }

    /// Set `isExecutable`
    pub fn set_executable(&self, instance: &mut ModelInstance, executable: bool) -> Result<()> {
        schema().process_is_executable.set(instance, self.0, executable)
    }

    /// Flow elements in document order
    pub fn flow_elements(&self, instance: &ModelInstance) -> Result<Vec<FlowElement>> {
        Ok(wrap(schema().process_flow_elements.elements(instance, self.0)?))
    }

    /// Flow elements of type `T`
    pub fn flow_elements_of<T: TypedElement>(&self, instance: &ModelInstance) -> Result<Vec<T>> {
        let mut elements = Vec::new();
        for element in schema().process_flow_elements.elements(instance, self.0)? {
            if let Some(typed) = instance.try_cast::<T>(element)? {
                elements.push(typed);
            }
        }
        Ok(elements)
    }

    /// Append a flow element
    pub fn add_flow_element(&self, instance: &mut ModelInstance, element: impl FlowElementExt) -> Result<()> {
        schema()
            .process_flow_elements
            .add(instance, self.0, element.element())
    }

    /// Remove a flow element; references to it are unlinked
    pub fn remove_flow_element(
        &self,
        instance: &mut ModelInstance,
        element: impl FlowElementExt,
    ) -> Result<bool> {
        schema()
            .process_flow_elements
            .remove(instance, self.0, element.element())
    }
}

impl ServiceTask {
    /// `implementation`, `##WebService` by default
    pub fn implementation(&self, instance: &ModelInstance) -> Result<String> {
        Ok(schema()
            .service_task_implementation
            .get(instance, self.0)?
            .unwrap_or_else(|| super::WEB_SERVICE_IMPLEMENTATION.to_string()))
    }

    /// Set `implementation`
    pub fn set_implementation(&self, instance: &mut ModelInstance, implementation: &str) -> Result<()> {
        schema()
            .service_task_implementation
            .set(instance, self.0, implementation.to_string())
    }
}

impl StartEvent {
    /// `isInterrupting`, true by default
    pub fn is_interrupting(&self, instance: &ModelInstance) -> Result<bool> {
        Ok(schema()
            .start_event_is_interrupting
            .get(instance, self.0)?
            .unwrap_or(true))
    }

    /// Set `isInterrupting`
    pub fn set_interrupting(&self, instance: &mut ModelInstance, interrupting: bool) -> Result<()> {
        schema()
            .start_event_is_interrupting
            .set(instance, self.0, interrupting)
    }
}

impl ExclusiveGateway {
    /// The `default` sequence flow
    pub fn default_flow(&self, instance: &ModelInstance) -> Result<Option<SequenceFlow>> {
        Ok(schema()
            .exclusive_gateway_default
            .get(instance, self.0)?
            .map(SequenceFlow))
    }

    /// Point `default` at `flow`
    pub fn set_default_flow(&self, instance: &mut ModelInstance, flow: SequenceFlow) -> Result<()> {
        schema().exclusive_gateway_default.set(instance, self.0, flow)
    }

    /// Remove `default`
    pub fn clear_default_flow(&self, instance: &mut ModelInstance) -> Result<()> {
        schema().exclusive_gateway_default.clear(instance, self.0)
    }
}

impl SequenceFlow {
    /// Node named by `sourceRef`
    pub fn source(&self, instance: &ModelInstance) -> Result<Option<FlowNode>> {
        Ok(schema().sequence_flow_source.get(instance, self.0)?.map(FlowNode))
    }

    /// Node named by `targetRef`
    pub fn target(&self, instance: &ModelInstance) -> Result<Option<FlowNode>> {
        Ok(schema().sequence_flow_target.get(instance, self.0)?.map(FlowNode))
    }

    /// Point `sourceRef` at `node`
    pub fn set_source(&self, instance: &mut ModelInstance, node: impl FlowNodeExt) -> Result<()> {
        schema()
            .sequence_flow_source
            .set(instance, self.0, node.element())
    }

    /// Point `targetRef` at `node`
    pub fn set_target(&self, instance: &mut ModelInstance, node: impl FlowNodeExt) -> Result<()> {
        schema()
            .sequence_flow_target
            .set(instance, self.0, node.element())
    }

    /// Connect `source` to `target`, listing the flow on both nodes
    pub fn connect(
        &self,
        instance: &mut ModelInstance,
        source: impl FlowNodeExt,
        target: impl FlowNodeExt,
    ) -> Result<()> {
        self.set_source(instance, source)?;
        self.set_target(instance, target)?;
        source.add_outgoing(instance, *self)?;
        target.add_incoming(instance, *self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpmn::model;

    const XML: &str = r###"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL" id="defs" targetNamespace="http://example.com/orders">
  <process id="p" isExecutable="true">
    <startEvent id="start"><outgoing>f1</outgoing></startEvent>
    <serviceTask id="charge" implementation="##unspecified"><incoming>f1</incoming><outgoing>f2</outgoing></serviceTask>
    <exclusiveGateway id="g" default="f3" gatewayDirection="Diverging"><incoming>f2</incoming><outgoing>f3</outgoing></exclusiveGateway>
    <endEvent id="end"><incoming>f3</incoming></endEvent>
    <sequenceFlow id="f1" sourceRef="start" targetRef="charge"/>
    <sequenceFlow id="f2" sourceRef="charge" targetRef="g"/>
    <sequenceFlow id="f3" sourceRef="g" targetRef="end"/>
  </process>
</definitions>"###;

    fn by_id<T: TypedElement>(instance: &ModelInstance, id: &str) -> T {
        instance
            .cast(instance.get_model_element_by_id(id).unwrap())
            .unwrap()
    }

    #[test]
    fn test_typed_attributes() {
        let instance = ModelInstance::parse(model(), XML).unwrap();
        let process: Process = by_id(&instance, "p");
        assert!(process.is_executable(&instance).unwrap());

        let task: ServiceTask = by_id(&instance, "charge");
        assert_eq!(task.implementation(&instance).unwrap(), "##unspecified");
        assert_eq!(task.start_quantity(&instance).unwrap(), 1);
        assert!(!task.is_for_compensation(&instance).unwrap());

        let gateway: ExclusiveGateway = by_id(&instance, "g");
        assert_eq!(
            gateway.gateway_direction(&instance).unwrap(),
            GatewayDirection::Diverging
        );
        let default = gateway.default_flow(&instance).unwrap().unwrap();
        assert_eq!(default.id(&instance).unwrap().as_deref(), Some("f3"));
    }

    #[test]
    fn test_flow_navigation() {
        let instance = ModelInstance::parse(model(), XML).unwrap();
        let task: ServiceTask = by_id(&instance, "charge");

        let incoming = task.incoming(&instance).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].id(&instance).unwrap().as_deref(), Some("f1"));

        let previous = task.previous_nodes(&instance).unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].id(&instance).unwrap().as_deref(), Some("start"));

        let next = task.succeeding_nodes(&instance).unwrap();
        assert_eq!(next[0].id(&instance).unwrap().as_deref(), Some("g"));
    }

    #[test]
    fn test_process_filters_flow_elements() {
        let instance = ModelInstance::parse(model(), XML).unwrap();
        let process: Process = by_id(&instance, "p");
        assert_eq!(process.flow_elements(&instance).unwrap().len(), 7);
        assert_eq!(process.flow_elements_of::<SequenceFlow>(&instance).unwrap().len(), 3);
        assert_eq!(process.flow_elements_of::<FlowNode>(&instance).unwrap().len(), 4);
    }

    #[test]
    fn test_cast_rejects_other_models() {
        let mut builder = crate::model::ModelBuilder::new("lookalike");
        builder
            .define_type("Task", crate::QName::local("task"))
            .build()
            .unwrap();
        let other = std::sync::Arc::new(builder.build().unwrap());
        let mut instance = ModelInstance::parse(other, "<task/>").unwrap();
        let root = instance.document_element().unwrap();

        let err = instance.cast::<Task>(root).unwrap_err();
        assert!(err.is_structure());
        assert!(err.to_string().contains("model 'bpmn'"));
        assert!(instance.new_typed::<Task>().is_err());
    }

    #[test]
    fn test_cast_rejects_wrong_type() {
        let instance = ModelInstance::parse(model(), XML).unwrap();
        let start = instance.get_model_element_by_id("start").unwrap();
        assert!(instance.cast::<Task>(start).is_err());
        assert!(instance.try_cast::<Event>(start).unwrap().is_some());
    }
}
