//! Property tests for identifier handling and reference bookkeeping

use proptest::prelude::*;

use xmlmodel::bpmn::{self, BaseElementExt, ExclusiveGateway, FlowNodeExt, SequenceFlow, Task};
use xmlmodel::names::{is_valid_ncname, is_valid_qname, split_identifier_list};
use xmlmodel::ModelInstance;

const PROCESS: &str = r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL" xmlns:tns="http://example.com/p" id="defs" targetNamespace="http://example.com/p">
  <process id="p">
    <task id="a"><outgoing>a_to_g</outgoing></task>
    <exclusiveGateway id="g" default="g_to_b"><incoming>a_to_g</incoming><outgoing>tns:g_to_b</outgoing></exclusiveGateway>
    <task id="b"><incoming>g_to_b</incoming></task>
    <sequenceFlow id="a_to_g" sourceRef="a" targetRef="g"/>
    <sequenceFlow id="g_to_b" sourceRef="tns:g" targetRef="b"/>
  </process>
</definitions>"#;

// ===================
// Strategies
// ===================

/// Fresh ids that cannot collide with the ones in `PROCESS`
fn fresh_id_strategy() -> impl Strategy<Value = String> {
    "n_[a-zA-Z0-9_.-]{0,12}"
}

fn ncname_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_.-]{0,16}"
}

fn separator_strategy() -> impl Strategy<Value = String> {
    "[ \t\n,]{1,3}"
}

// ===================
// Property Test Functions
// ===================

fn parse() -> Result<ModelInstance, TestCaseError> {
    ModelInstance::parse(bpmn::model(), PROCESS).map_err(|e| TestCaseError::fail(e.to_string()))
}

/// Renaming a referenced element rewrites every holder and keeps prefixes.
fn check_rename_keeps_references(new_id: &str) -> Result<(), TestCaseError> {
    let mut instance = parse()?;
    let gateway: ExclusiveGateway = instance
        .cast(instance.get_model_element_by_id("g").unwrap())
        .unwrap();
    let flow: SequenceFlow = instance
        .cast(instance.get_model_element_by_id("g_to_b").unwrap())
        .unwrap();
    let schema = bpmn::schema();

    gateway.set_id(&mut instance, new_id).unwrap();
    prop_assert_eq!(flow.source(&instance).unwrap(), Some(gateway.as_flow_node()));
    prop_assert_eq!(
        schema.sequence_flow_source.identifier(&instance, flow).unwrap(),
        Some(format!("tns:{}", new_id))
    );

    flow.set_id(&mut instance, new_id.to_uppercase().as_str()).unwrap();
    prop_assert_eq!(gateway.default_flow(&instance).unwrap(), Some(flow));
    prop_assert_eq!(gateway.outgoing(&instance).unwrap(), vec![flow]);
    prop_assert_eq!(
        schema.flow_node_outgoing.identifiers(&instance, gateway).unwrap(),
        vec![format!("tns:{}", new_id.to_uppercase())]
    );
    Ok(())
}

/// Adding the same flow repeatedly lists it once.
fn check_add_is_idempotent(times: usize) -> Result<(), TestCaseError> {
    let mut instance = parse()?;
    let task: Task = instance
        .cast(instance.get_model_element_by_id("b").unwrap())
        .unwrap();
    let flow: SequenceFlow = instance
        .cast(instance.get_model_element_by_id("a_to_g").unwrap())
        .unwrap();

    let added: Vec<bool> = (0..times)
        .map(|_| task.add_incoming(&mut instance, flow).unwrap())
        .collect();
    prop_assert_eq!(added.iter().filter(|a| **a).count(), 1);
    prop_assert!(added[0]);
    prop_assert_eq!(task.incoming(&instance).unwrap().len(), 2);
    Ok(())
}

/// Any separator mix splits back into the same tokens.
fn check_identifier_list_split(tokens: &[String], separators: &[String]) -> Result<(), TestCaseError> {
    let mut value = String::new();
    for (token, separator) in tokens.iter().zip(separators.iter().cycle()) {
        value.push_str(token);
        value.push_str(separator);
    }
    let split: Vec<&str> = split_identifier_list(&value).collect();
    prop_assert_eq!(split, tokens.iter().map(String::as_str).collect::<Vec<_>>());
    Ok(())
}

fn check_prefixed_names(prefix: &str, local: &str) -> Result<(), TestCaseError> {
    let qname = format!("{}:{}", prefix, local);
    prop_assert!(is_valid_ncname(local));
    prop_assert!(is_valid_qname(&qname));
    prop_assert!(!is_valid_ncname(&qname));
    Ok(())
}

// ===================
// Proptest Wrappers
// ===================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rename_keeps_references(new_id in fresh_id_strategy()) {
        check_rename_keeps_references(&new_id)?;
    }

    #[test]
    fn add_is_idempotent(times in 1usize..6) {
        check_add_is_idempotent(times)?;
    }

    #[test]
    fn identifier_list_split(
        tokens in prop::collection::vec(ncname_strategy(), 0..8),
        separators in prop::collection::vec(separator_strategy(), 1..4),
    ) {
        check_identifier_list_split(&tokens, &separators)?;
    }

    #[test]
    fn prefixed_names(prefix in ncname_strategy(), local in ncname_strategy()) {
        check_prefixed_names(&prefix, &local)?;
    }
}
