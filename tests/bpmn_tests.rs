//! BPMN model integration tests
//!
//! Parse, navigate and edit process documents through the typed façades.

use std::path::PathBuf;

use pretty_assertions::assert_eq;

use xmlmodel::bpmn::{
    self, ActivityExt, BaseElementExt, Definitions, EndEvent, ExclusiveGateway, FlowElementExt,
    FlowNode, FlowNodeExt, GatewayDirection, GatewayExt, Process, SequenceFlow, ServiceTask, StartEvent, Task,
    UserTask,
};
use xmlmodel::limits::Limits;
use xmlmodel::{ModelInstance, TypedElement};

fn fixtures_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path
}

fn order_process() -> ModelInstance {
    let xml = std::fs::read_to_string(fixtures_dir().join("order.bpmn")).unwrap();
    ModelInstance::parse(bpmn::model(), &xml).unwrap()
}

fn get<T: TypedElement>(instance: &ModelInstance, id: &str) -> T {
    let element = instance
        .get_model_element_by_id(id)
        .unwrap_or_else(|| panic!("no element with id '{}'", id));
    instance.cast(element).unwrap()
}

fn flow_ids(instance: &ModelInstance, flows: &[SequenceFlow]) -> Vec<String> {
    flows
        .iter()
        .map(|f| f.id(instance).unwrap().unwrap_or_default())
        .collect()
}

fn node_ids(instance: &ModelInstance, nodes: &[FlowNode]) -> Vec<String> {
    nodes
        .iter()
        .map(|n| n.id(instance).unwrap().unwrap_or_default())
        .collect()
}

// ============================================================================
// Reading
// ============================================================================

#[test]
fn test_definitions_and_process() {
    let instance = order_process();
    let definitions: Definitions = instance.cast(instance.document_element().unwrap()).unwrap();
    assert_eq!(definitions.id(&instance).unwrap().as_deref(), Some("orders"));
    assert_eq!(definitions.name(&instance).unwrap().as_deref(), Some("Order handling"));
    assert_eq!(
        definitions.target_namespace(&instance).unwrap().as_deref(),
        Some("http://example.com/orders")
    );

    let processes = definitions.processes(&instance).unwrap();
    assert_eq!(processes.len(), 1);
    let process = processes[0];
    assert_eq!(process.name(&instance).unwrap().as_deref(), Some("Handle order"));
    assert!(process.is_executable(&instance).unwrap());
    assert_eq!(process.flow_elements(&instance).unwrap().len(), 13);
    assert_eq!(process.flow_elements_of::<SequenceFlow>(&instance).unwrap().len(), 6);
    assert_eq!(process.flow_elements_of::<EndEvent>(&instance).unwrap().len(), 2);
}

#[test]
fn test_typed_attribute_defaults() {
    let instance = order_process();
    let start: StartEvent = get(&instance, "order_received");
    assert!(start.is_interrupting(&instance).unwrap());

    let check: UserTask = get(&instance, "check_order");
    assert_eq!(check.start_quantity(&instance).unwrap(), 1);
    assert!(!check.is_for_compensation(&instance).unwrap());

    let charge: ServiceTask = get(&instance, "charge");
    assert_eq!(charge.implementation(&instance).unwrap(), bpmn::WEB_SERVICE_IMPLEMENTATION);

    let decision: ExclusiveGateway = get(&instance, "decision");
    assert_eq!(
        decision.gateway_direction(&instance).unwrap(),
        GatewayDirection::Diverging
    );
}

#[test]
fn test_sequence_flow_navigation() {
    let instance = order_process();
    let decision: ExclusiveGateway = get(&instance, "decision");

    assert_eq!(flow_ids(&instance, &decision.incoming(&instance).unwrap()), vec!["to_decision"]);
    assert_eq!(
        flow_ids(&instance, &decision.outgoing(&instance).unwrap()),
        vec!["to_charge", "to_reject"]
    );
    assert_eq!(
        node_ids(&instance, &decision.succeeding_nodes(&instance).unwrap()),
        vec!["charge", "reject"]
    );
    assert_eq!(
        node_ids(&instance, &decision.previous_nodes(&instance).unwrap()),
        vec!["check_order"]
    );

    let default = decision.default_flow(&instance).unwrap().unwrap();
    assert_eq!(default.id(&instance).unwrap().as_deref(), Some("to_reject"));
}

#[test]
fn test_prefixed_references_resolve_in_target_namespace() {
    let instance = order_process();
    let to_reject: SequenceFlow = get(&instance, "to_reject");
    let source = to_reject.source(&instance).unwrap().unwrap();
    assert_eq!(source.id(&instance).unwrap().as_deref(), Some("decision"));

    let reject: Task = get(&instance, "reject");
    assert_eq!(flow_ids(&instance, &reject.incoming(&instance).unwrap()), vec!["to_reject"]);
}

#[test]
fn test_dangling_target_reads_as_none() {
    let instance = order_process();
    let to_rejected: SequenceFlow = get(&instance, "to_rejected");
    assert!(to_rejected.target(&instance).unwrap().is_none());
    let state = bpmn::schema()
        .sequence_flow_target
        .state(&instance, to_rejected)
        .unwrap();
    assert!(state.is_dangling());
}

#[test]
fn test_extension_elements_are_kept() {
    let instance = order_process();
    let process: Process = get(&instance, "order_process");
    let children = instance.child_elements(process).unwrap();
    let audit = children[0];
    assert_eq!(
        instance.element_type(audit).unwrap().type_name(),
        xmlmodel::model::UNKNOWN_TYPE_NAME
    );
    assert_eq!(instance.attribute_value(audit, "level").unwrap().as_deref(), Some("full"));

    let xml = instance.to_xml().unwrap();
    assert!(xml.contains("audit"));
    assert!(xml.contains("http://example.com/extensions"));
}

// ============================================================================
// Editing
// ============================================================================

#[test]
fn test_build_process_from_scratch() {
    let mut instance = ModelInstance::new(bpmn::model());
    let definitions: Definitions = instance.new_typed().unwrap();
    instance.set_document_element(definitions).unwrap();
    definitions.set_id(&mut instance, "defs").unwrap();
    assert_eq!(instance.missing_required_attributes(definitions).unwrap().len(), 1);
    definitions
        .set_target_namespace(&mut instance, "http://example.com/invoices")
        .unwrap();
    assert!(instance.missing_required_attributes(definitions).unwrap().is_empty());

    let process: Process = instance.new_typed().unwrap();
    process.set_id(&mut instance, "invoice").unwrap();
    definitions.add_process(&mut instance, process).unwrap();

    let start: StartEvent = instance.new_typed().unwrap();
    start.set_id(&mut instance, "start").unwrap();
    let task: ServiceTask = instance.new_typed().unwrap();
    task.set_id(&mut instance, "send").unwrap();
    task.set_implementation(&mut instance, "##unspecified").unwrap();
    let end: EndEvent = instance.new_typed().unwrap();
    end.set_id(&mut instance, "end").unwrap();
    let first: SequenceFlow = instance.new_typed().unwrap();
    first.set_id(&mut instance, "first").unwrap();
    let second: SequenceFlow = instance.new_typed().unwrap();
    second.set_id(&mut instance, "second").unwrap();

    process.add_flow_element(&mut instance, first).unwrap();
    process.add_flow_element(&mut instance, second).unwrap();
    process.add_flow_element(&mut instance, start).unwrap();
    process.add_flow_element(&mut instance, task).unwrap();
    process.add_flow_element(&mut instance, end).unwrap();

    first.connect(&mut instance, start, task).unwrap();
    second.connect(&mut instance, task, end).unwrap();

    assert_eq!(node_ids(&instance, &task.previous_nodes(&instance).unwrap()), vec!["start"]);
    assert_eq!(node_ids(&instance, &task.succeeding_nodes(&instance).unwrap()), vec!["end"]);
    assert_eq!(flow_ids(&instance, &task.incoming(&instance).unwrap()), vec!["first"]);

    let xml = instance.to_xml().unwrap();
    let reparsed = ModelInstance::parse(bpmn::model(), &xml).unwrap();
    assert_eq!(reparsed.dump().unwrap(), instance.dump().unwrap());
    assert!(xml.contains(r#"<outgoing>first</outgoing>"#), "{}", xml);
}

#[test]
fn test_connect_twice_does_not_duplicate() {
    let mut instance = order_process();
    let to_charge: SequenceFlow = get(&instance, "to_charge");
    let decision: ExclusiveGateway = get(&instance, "decision");
    let charge: ServiceTask = get(&instance, "charge");

    to_charge.connect(&mut instance, decision, charge).unwrap();
    assert_eq!(decision.outgoing(&instance).unwrap().len(), 2);
    assert_eq!(charge.incoming(&instance).unwrap().len(), 1);
}

#[test]
fn test_rename_flow_updates_all_holders() {
    let mut instance = order_process();
    let to_reject: SequenceFlow = get(&instance, "to_reject");
    to_reject.set_id(&mut instance, "rejection").unwrap();

    let decision: ExclusiveGateway = get(&instance, "decision");
    let reject: Task = get(&instance, "reject");
    assert_eq!(
        flow_ids(&instance, &decision.outgoing(&instance).unwrap()),
        vec!["to_charge", "rejection"]
    );
    assert_eq!(decision.default_flow(&instance).unwrap(), Some(to_reject));
    assert_eq!(
        bpmn::schema()
            .flow_node_incoming
            .identifiers(&instance, reject)
            .unwrap(),
        vec!["tns:rejection".to_string()]
    );
}

#[test]
fn test_rename_node_updates_flows() {
    let mut instance = order_process();
    let decision: ExclusiveGateway = get(&instance, "decision");
    decision.set_id(&mut instance, "approval").unwrap();

    let schema = bpmn::schema();
    let to_decision: SequenceFlow = get(&instance, "to_decision");
    let to_reject: SequenceFlow = get(&instance, "to_reject");
    assert_eq!(
        schema.sequence_flow_target.identifier(&instance, to_decision).unwrap().as_deref(),
        Some("approval")
    );
    assert_eq!(
        schema.sequence_flow_source.identifier(&instance, to_reject).unwrap().as_deref(),
        Some("tns:approval")
    );
    assert_eq!(to_reject.source(&instance).unwrap(), Some(decision.as_flow_node()));
}

#[test]
fn test_remove_flow_unlinks_references() {
    let mut instance = order_process();
    let process: Process = get(&instance, "order_process");
    let to_reject: SequenceFlow = get(&instance, "to_reject");
    let decision: ExclusiveGateway = get(&instance, "decision");
    let reject: Task = get(&instance, "reject");

    assert!(process.remove_flow_element(&mut instance, to_reject).unwrap());
    assert_eq!(decision.default_flow(&instance).unwrap(), None);
    assert_eq!(instance.attribute_value(decision, "default").unwrap(), None);
    assert_eq!(flow_ids(&instance, &decision.outgoing(&instance).unwrap()), vec!["to_charge"]);
    assert!(reject.incoming(&instance).unwrap().is_empty());
    assert!(!instance.element_to_xml(reject).unwrap().contains("incoming"));
}

#[test]
fn test_remove_node_unlinks_flow_ends() {
    let mut instance = order_process();
    let process: Process = get(&instance, "order_process");
    let charge: ServiceTask = get(&instance, "charge");
    let to_charge: SequenceFlow = get(&instance, "to_charge");

    process.remove_flow_element(&mut instance, charge).unwrap();
    assert_eq!(to_charge.target(&instance).unwrap(), None);
    assert_eq!(instance.attribute_value(to_charge, "targetRef").unwrap(), None);
    let missing = instance.missing_required_attributes(to_charge).unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].name().local_name, "targetRef");
}

#[test]
fn test_replace_node_refills_mirrors() {
    let mut instance = order_process();
    let charge: ServiceTask = get(&instance, "charge");
    let to_charge: SequenceFlow = get(&instance, "to_charge");
    let to_done: SequenceFlow = get(&instance, "to_done");

    let manual: Task = instance.new_typed().unwrap();
    manual.set_id(&mut instance, "charge_manually").unwrap();
    manual.set_name(&mut instance, "Charge by hand").unwrap();
    charge.replace_with_element(&mut instance, manual).unwrap();

    assert_eq!(to_charge.target(&instance).unwrap(), Some(manual.as_flow_node()));
    assert_eq!(to_done.source(&instance).unwrap(), Some(manual.as_flow_node()));
    assert_eq!(flow_ids(&instance, &manual.incoming(&instance).unwrap()), vec!["to_charge"]);
    assert_eq!(flow_ids(&instance, &manual.outgoing(&instance).unwrap()), vec!["to_done"]);

    // the displaced task is detached but still readable
    assert!(!instance.is_attached(charge));
    assert_eq!(charge.name(&instance).unwrap().as_deref(), Some("Charge card"));
    assert!(instance.get_model_element_by_id("charge").is_none());
}

#[test]
fn test_replace_node_keeping_its_id() {
    let mut instance = order_process();
    let charge: ServiceTask = get(&instance, "charge");
    let to_charge: SequenceFlow = get(&instance, "to_charge");
    let to_done: SequenceFlow = get(&instance, "to_done");

    let task: Task = instance.new_typed().unwrap();
    task.set_id(&mut instance, "charge").unwrap();
    charge.replace_with_element(&mut instance, task).unwrap();

    assert_eq!(instance.get_model_element_by_id("charge"), Some(task.element()));
    assert_eq!(to_done.source(&instance).unwrap(), Some(task.as_flow_node()));
    assert_eq!(to_charge.target(&instance).unwrap(), Some(task.as_flow_node()));
    assert_eq!(
        bpmn::schema().sequence_flow_source.identifier(&instance, to_done).unwrap().as_deref(),
        Some("charge")
    );
    assert_eq!(flow_ids(&instance, &task.incoming(&instance).unwrap()), vec!["to_charge"]);
    assert_eq!(flow_ids(&instance, &task.outgoing(&instance).unwrap()), vec!["to_done"]);

    // the displaced task is detached, so a second replacement changes nothing
    let before = instance.to_xml().unwrap();
    instance.replace_element(charge, task).unwrap();
    assert_eq!(instance.to_xml().unwrap(), before);
    assert!(instance.is_attached(task));
    assert_eq!(task.incoming(&instance).unwrap().len(), 1);
    assert_eq!(task.outgoing(&instance).unwrap().len(), 1);
}

#[test]
fn test_replacement_must_fit_parent() {
    let mut instance = order_process();
    let process: Process = get(&instance, "order_process");
    let charge: ServiceTask = get(&instance, "charge");
    let other: Process = instance.new_typed().unwrap();
    let err = charge.replace_with_element(&mut instance, other).unwrap_err();
    assert!(err.is_structure());
    assert!(instance.is_attached(charge));

    let err = instance.replace_element(process, charge).unwrap_err();
    assert!(err.is_structure());
}

#[test]
fn test_default_flow_must_be_sequence_flow() {
    let mut instance = order_process();
    let decision: ExclusiveGateway = get(&instance, "decision");
    let to_charge: SequenceFlow = get(&instance, "to_charge");
    decision.set_default_flow(&mut instance, to_charge).unwrap();
    assert_eq!(decision.default_flow(&instance).unwrap(), Some(to_charge));

    let err = bpmn::schema()
        .exclusive_gateway_default
        .set(&mut instance, decision, decision)
        .unwrap_err();
    assert!(err.is_structure());

    decision.clear_default_flow(&mut instance).unwrap();
    assert_eq!(decision.default_flow(&instance).unwrap(), None);
}

#[test]
fn test_parse_limits_apply() {
    let xml = std::fs::read_to_string(fixtures_dir().join("order.bpmn")).unwrap();
    let limits = Limits {
        max_elements: 10,
        ..Limits::default()
    };
    let err = ModelInstance::parse_with_limits(bpmn::model(), xml.as_bytes(), &limits).unwrap_err();
    assert!(matches!(err, xmlmodel::Error::LimitExceeded(_)), "{}", err);
}
