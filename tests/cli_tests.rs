//! CLI integration tests
//!
//! These tests run the built binary against the BPMN fixtures.

#![cfg(feature = "cli")]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};

fn xmlmodel_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_xmlmodel"))
}

fn fixtures_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(xmlmodel_bin())
        .args(args)
        .output()
        .expect("Failed to execute command")
}

// ============================================================================
// Inspect Command Tests
// ============================================================================

#[test]
fn test_cli_inspect_basic() {
    let file = fixtures_dir().join("order.bpmn");
    let output = run(&["inspect", file.to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "inspect should succeed");
    assert!(stdout.contains("xmlmodel v"), "should show version");
    assert!(stdout.contains("(bpmn model)"));
    assert!(stdout.contains("ExclusiveGateway #decision"));
    assert!(stdout.contains("default -> to_reject"));
    assert!(stdout.contains("sourceRef -> decision"));
    assert!(stdout.contains("targetRef -> ghost (dangling)"));
    assert!(stdout.contains("Elements: 28"), "{}", stdout);
    assert!(stdout.contains("Dangling references: 1"), "{}", stdout);
}

#[test]
fn test_cli_inspect_json_output() {
    let file = fixtures_dir().join("order.bpmn");
    let output = run(&["inspect", "--json", file.to_str().unwrap()]);
    assert!(output.status.success());

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("output should be valid JSON");
    assert_eq!(json["model"], "bpmn");

    let elements = json["elements"].as_array().unwrap();
    assert_eq!(elements.len(), 28);
    assert_eq!(elements[0]["type"], "Definitions");
    assert_eq!(elements[0]["depth"], 0);

    let flow = elements
        .iter()
        .find(|e| e["id"] == "to_reject")
        .expect("to_reject should be listed");
    let references = flow["references"].as_array().unwrap();
    assert!(references
        .iter()
        .any(|r| r["name"] == "sourceRef" && r["identifier"] == "tns:decision" && r["target"] == "decision"));
}

#[test]
fn test_cli_inspect_missing_file() {
    let output = run(&["inspect", "no/such/file.bpmn"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Error:"));
}

#[test]
fn test_cli_inspect_malformed_document() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "<definitions><process></definitions>").unwrap();

    let output = run(&["inspect", file.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}

#[test]
fn test_cli_inspect_bad_attribute_value() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL" targetNamespace="urn:x">
  <process id="p" isExecutable="maybe"/>
</definitions>"#
    )
    .unwrap();

    // values decode lazily, so inspecting still works
    let output = run(&["inspect", file.path().to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Process #p"));
}

// ============================================================================
// Types Command Tests
// ============================================================================

#[test]
fn test_cli_types() {
    let output = run(&["types"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("=== bpmn types ==="));
    assert!(stdout.contains("BaseElement (abstract)"));
    assert!(stdout.contains("ServiceTask : Task"));
    assert!(stdout.contains("{http://www.omg.org/spec/BPMN/20100524/MODEL}exclusiveGateway"));
}

#[test]
fn test_cli_types_json() {
    let output = run(&["types", "--json"]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let types = json["types"].as_array().unwrap();
    let flow = types
        .iter()
        .find(|t| t["name"] == "SequenceFlow")
        .expect("SequenceFlow should be registered");
    assert_eq!(flow["base_type"], "FlowElement");
    assert!(flow["references"].as_array().unwrap().len() >= 2);
}

#[test]
fn test_cli_log_level_flag() {
    let file = fixtures_dir().join("order.bpmn");
    let output = run(&["--log-level", "debug", "inspect", file.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Document loaded"));
}
