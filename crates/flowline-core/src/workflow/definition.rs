//! Workflow definition parsing, validation, and file loading.
//!
//! Workflow files are YAML or JSON documents in the `NewDefinition` shape;
//! identity and timestamps are assigned when the definition is registered.
//! Validation covers structure only. Action types are checked at run time,
//! so an unknown type fails the run rather than the registration.

use std::collections::HashSet;
use std::path::Path;

use flowline_types::workflow::{NewDefinition, StepConfig, StepDefinition, WorkflowDefinition};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from parsing or validating definitions.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("unsupported workflow file extension: '{0}' (expected .yaml, .yml or .json)")]
    UnsupportedFormat(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate a YAML workflow document.
pub fn parse_definition_yaml(yaml: &str) -> Result<NewDefinition, WorkflowError> {
    let def: NewDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_new_definition(&def)?;
    Ok(def)
}

/// Parse and validate a JSON workflow document.
pub fn parse_definition_json(json: &str) -> Result<NewDefinition, WorkflowError> {
    let def: NewDefinition =
        serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_new_definition(&def)?;
    Ok(def)
}

/// Serialize a stored definition to YAML.
pub fn serialize_definition_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Load a workflow document from disk, choosing the format by extension.
pub fn load_definition_file(path: &Path) -> Result<NewDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "yaml" | "yml" => parse_definition_yaml(&content),
        "json" => parse_definition_json(&content),
        other => Err(WorkflowError::UnsupportedFormat(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a stored definition.
///
/// Checks:
/// - Name is non-empty
/// - Step IDs are non-empty and unique across the whole tree
/// - Each step's `kind` agrees with its `config`
/// - Loop and branch `output_var`s are non-empty when set
/// - Parallel steps have at least one branch
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    validate_parts(&def.name, &def.steps)
}

/// Validate an authored definition before registration.
pub fn validate_new_definition(def: &NewDefinition) -> Result<(), WorkflowError> {
    validate_parts(&def.name, &def.steps)
}

fn validate_parts(name: &str, steps: &[StepDefinition]) -> Result<(), WorkflowError> {
    if name.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    validate_steps(steps, &mut seen_ids)
}

fn validate_steps<'a>(
    steps: &'a [StepDefinition],
    seen_ids: &mut HashSet<&'a str>,
) -> Result<(), WorkflowError> {
    for step in steps {
        if step.id.trim().is_empty() {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}' has an empty ID",
                step.name
            )));
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
        if step.kind != step.config.kind() {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}' declares kind '{}' but has {} config",
                step.id,
                step.kind,
                step.config.kind()
            )));
        }

        match &step.config {
            StepConfig::Action { .. } => {}
            StepConfig::Condition {
                then_steps,
                else_steps,
                ..
            } => {
                validate_steps(then_steps, seen_ids)?;
                validate_steps(else_steps, seen_ids)?;
            }
            StepConfig::Loop {
                steps: body,
                output_var,
                ..
            } => {
                check_output_var(&step.id, output_var.as_deref())?;
                validate_steps(body, seen_ids)?;
            }
            StepConfig::Parallel { branches } => {
                if branches.is_empty() {
                    return Err(WorkflowError::ValidationError(format!(
                        "parallel step '{}' must have at least one branch",
                        step.id
                    )));
                }
                for branch in branches {
                    check_output_var(&step.id, branch.output_var.as_deref())?;
                    validate_steps(&branch.steps, seen_ids)?;
                }
            }
        }
    }
    Ok(())
}

fn check_output_var(step_id: &str, output_var: Option<&str>) -> Result<(), WorkflowError> {
    if output_var.is_some_and(|v| v.trim().is_empty()) {
        return Err(WorkflowError::ValidationError(format!(
            "step '{step_id}' has an empty output_var"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ORDER_FLOW: &str = r#"
name: enrich-orders
description: Fetch orders and notify ops
triggers: [manual, schedule]
steps:
  - id: fetch
    name: Fetch orders
    kind: action
    config:
      kind: action
      action_type: network
      params:
        method: GET
        url: https://shop.example.com/orders
    outputs:
      orders: data.orders
  - id: each
    name: Tag
    kind: loop
    config:
      kind: loop
      items: $orders
      output_var: tagged
      steps:
        - id: tag
          name: Tag
          kind: action
          config:
            kind: action
            action_type: transform
          inputs:
            order: $item.id
  - id: fan
    name: Fan out
    kind: parallel
    config:
      kind: parallel
      branches:
        - output_var: left
          steps:
            - id: notify
              name: Notify
              kind: action
              config:
                kind: action
                action_type: messaging
        - steps: []
"#;

    #[test]
    fn parses_valid_yaml() {
        let def = parse_definition_yaml(ORDER_FLOW).unwrap();
        assert_eq!(def.name, "enrich-orders");
        assert_eq!(def.steps.len(), 3);
        assert_eq!(def.triggers, vec!["manual", "schedule"]);
        assert!(def.enabled);
        assert!(def.owner_id.is_empty());
    }

    #[test]
    fn parses_json() {
        let json = r#"{
            "name": "copy",
            "owner_id": "user-9",
            "steps": [{
                "id": "c", "name": "c", "kind": "action",
                "config": { "kind": "action", "action_type": "transform" },
                "inputs": { "x": "$seed" },
                "outputs": { "result": "x" }
            }]
        }"#;
        let def = parse_definition_json(json).unwrap();
        assert_eq!(def.owner_id, "user-9");
        assert_eq!(def.steps[0].outputs["result"], "x");
    }

    #[test]
    fn empty_steps_and_unknown_action_types_are_allowed() {
        assert!(parse_definition_yaml("name: noop\n").unwrap().steps.is_empty());

        let yaml = r#"
name: odd
steps:
  - id: a
    name: a
    kind: action
    config: { kind: action, action_type: carrier-pigeon }
"#;
        assert!(parse_definition_yaml(yaml).is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        let err = parse_definition_yaml("name: '  '\n").unwrap_err();
        assert!(err.to_string().contains("name must not be empty"));
    }

    #[test]
    fn rejects_duplicate_ids_across_nesting() {
        let yaml = r#"
name: dup
steps:
  - id: a
    name: a
    kind: condition
    config:
      kind: condition
      expression: "true"
      then:
        - id: a
          name: inner
          kind: action
          config: { kind: action, action_type: transform }
"#;
        let err = parse_definition_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate step ID: 'a'"));
    }

    #[test]
    fn rejects_kind_mismatch() {
        let yaml = r#"
name: mismatch
steps:
  - id: a
    name: a
    kind: loop
    config: { kind: action, action_type: transform }
"#;
        let err = parse_definition_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("declares kind 'loop'"));
    }

    #[test]
    fn rejects_parallel_without_branches_and_empty_output_var() {
        let yaml = r#"
name: p
steps:
  - id: p
    name: p
    kind: parallel
    config: { kind: parallel, branches: [] }
"#;
        assert!(parse_definition_yaml(yaml).is_err());

        let yaml = r#"
name: l
steps:
  - id: l
    name: l
    kind: loop
    config: { kind: loop, items: $xs, output_var: "" }
"#;
        let err = parse_definition_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("empty output_var"));
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(matches!(
            parse_definition_yaml("steps: [unclosed"),
            Err(WorkflowError::ParseError(_))
        ));
        assert!(matches!(
            parse_definition_yaml("name: x\nsteps:\n  - id: a\n    name: a\n    kind: action\n    config: { kind: teleport }\n"),
            Err(WorkflowError::ParseError(_))
        ));
    }

    #[test]
    fn load_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("orders.yml");
        std::fs::File::create(&yaml_path)
            .unwrap()
            .write_all(ORDER_FLOW.as_bytes())
            .unwrap();
        assert_eq!(load_definition_file(&yaml_path).unwrap().name, "enrich-orders");

        let json_path = dir.path().join("noop.json");
        std::fs::write(&json_path, r#"{ "name": "noop" }"#).unwrap();
        assert_eq!(load_definition_file(&json_path).unwrap().name, "noop");

        let txt_path = dir.path().join("flow.txt");
        std::fs::write(&txt_path, "name: x").unwrap();
        assert!(matches!(
            load_definition_file(&txt_path),
            Err(WorkflowError::UnsupportedFormat(_))
        ));

        assert!(matches!(
            load_definition_file(&dir.path().join("missing.yaml")),
            Err(WorkflowError::IoError(_))
        ));
    }

    #[test]
    fn serialize_round_trips_stored_definition() {
        let new = parse_definition_yaml(ORDER_FLOW).unwrap();
        let stored = WorkflowDefinition {
            id: uuid::Uuid::now_v7(),
            owner_id: "user-1".to_string(),
            name: new.name,
            description: new.description,
            steps: new.steps,
            triggers: new.triggers,
            enabled: new.enabled,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let yaml = serialize_definition_yaml(&stored).unwrap();
        let back: WorkflowDefinition = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back.id, stored.id);
        assert_eq!(back.steps.len(), 3);
        validate_definition(&back).unwrap();
    }
}
