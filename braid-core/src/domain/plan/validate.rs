// braid-core/src/domain/plan/validate.rs

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::error::{DomainError, ValidationIssue};
use crate::domain::plan::Plan;

#[allow(clippy::unwrap_used)] // literal pattern, cannot fail
fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^1\.\d+\.\d+$").unwrap())
}

/// Parses strict JSON then validates. Invalid JSON is reported as a
/// distinct error; structural problems come back as a single
/// [`DomainError::SchemaValidation`] carrying *all* issues.
pub fn load_plan(text: &str) -> Result<Plan, DomainError> {
    let raw: Value =
        serde_json::from_str(text).map_err(|e| DomainError::InvalidJson(e.to_string()))?;
    validate_plan(&raw)
}

/// Validates a raw JSON document against the plan schema.
///
/// Every unknown field, wrong type, out-of-range value, duplicate name and
/// self-dependency is collected; the caller gets the complete list, not
/// just the first problem.
pub fn validate_plan(raw: &Value) -> Result<Plan, DomainError> {
    let mut issues = Vec::new();

    match raw.as_object() {
        None => push(&mut issues, "$", "plan must be a JSON object", "invalid-type"),
        Some(root) => {
            check_known_keys(root, "$", &["schemaVersion", "target", "items", "policy"], &mut issues);

            match root.get("schemaVersion") {
                None => push(&mut issues, "$.schemaVersion", "missing required field", "missing-field"),
                Some(Value::String(v)) => {
                    if !version_re().is_match(v) {
                        push(
                            &mut issues,
                            "$.schemaVersion",
                            &format!("unsupported schema version '{v}': expected the 1.x.y line"),
                            "unsupported-schema-version",
                        );
                    }
                }
                Some(_) => push(&mut issues, "$.schemaVersion", "must be a string", "invalid-type"),
            }

            match root.get("target") {
                None => push(&mut issues, "$.target", "missing required field", "missing-field"),
                Some(Value::String(t)) if t.is_empty() => {
                    push(&mut issues, "$.target", "must be a non-empty branch name", "invalid-value")
                }
                Some(Value::String(_)) => {}
                Some(_) => push(&mut issues, "$.target", "must be a string", "invalid-type"),
            }

            match root.get("items") {
                None | Some(Value::Array(_)) => {}
                Some(_) => push(&mut issues, "$.items", "must be an array", "invalid-type"),
            }
            if let Some(Value::Array(items)) = root.get("items") {
                validate_items(items, &mut issues);
            }

            if let Some(policy) = root.get("policy") {
                validate_policy(policy, &mut issues);
            }
        }
    }

    if !issues.is_empty() {
        return Err(DomainError::SchemaValidation { issues });
    }

    // Structure is clean: the typed deserialization cannot reasonably fail,
    // but any residual mismatch still surfaces as a schema issue.
    serde_json::from_value(raw.clone()).map_err(|e| DomainError::SchemaValidation {
        issues: vec![ValidationIssue {
            path: "$".into(),
            message: e.to_string(),
            code: "deserialize".into(),
        }],
    })
}

fn validate_items(items: &[Value], issues: &mut Vec<ValidationIssue>) {
    let mut seen_names: HashSet<&str> = HashSet::new();

    for (idx, item) in items.iter().enumerate() {
        let path = format!("$.items[{idx}]");
        let Some(obj) = item.as_object() else {
            push(issues, &path, "item must be an object", "invalid-type");
            continue;
        };
        check_known_keys(
            obj,
            &path,
            &["name", "deps", "gates", "branch", "sha", "strategy"],
            issues,
        );

        let name = match obj.get("name") {
            None => {
                push(issues, &format!("{path}.name"), "missing required field", "missing-field");
                None
            }
            Some(Value::String(n)) if n.is_empty() => {
                push(issues, &format!("{path}.name"), "must be a non-empty string", "invalid-value");
                None
            }
            Some(Value::String(n)) => {
                if !seen_names.insert(n) {
                    push(
                        issues,
                        &format!("{path}.name"),
                        &format!("duplicate item name '{n}'"),
                        "duplicate-name",
                    );
                }
                Some(n.as_str())
            }
            Some(_) => {
                push(issues, &format!("{path}.name"), "must be a string", "invalid-type");
                None
            }
        };

        if let Some(deps) = obj.get("deps") {
            match deps.as_array() {
                None => push(issues, &format!("{path}.deps"), "must be an array", "invalid-type"),
                Some(deps) => {
                    for (d, dep) in deps.iter().enumerate() {
                        match dep.as_str() {
                            None => push(
                                issues,
                                &format!("{path}.deps[{d}]"),
                                "must be a string",
                                "invalid-type",
                            ),
                            Some(dep) if Some(dep) == name => push(
                                issues,
                                &format!("{path}.deps[{d}]"),
                                &format!("item '{dep}' cannot depend on itself"),
                                "self-dependency",
                            ),
                            Some(_) => {}
                        }
                    }
                }
            }
        }

        for (field, label) in [("branch", "branch"), ("sha", "sha")] {
            if let Some(v) = obj.get(field) {
                if !v.is_string() {
                    push(issues, &format!("{path}.{label}"), "must be a string", "invalid-type");
                }
            }
        }

        if let Some(strategy) = obj.get("strategy") {
            match strategy.as_str() {
                Some("rebase-weave" | "merge-weave" | "squash-weave") => {}
                _ => push(
                    issues,
                    &format!("{path}.strategy"),
                    "must be one of rebase-weave, merge-weave, squash-weave",
                    "invalid-value",
                ),
            }
        }

        if let Some(gates) = obj.get("gates") {
            match gates.as_array() {
                None => push(issues, &format!("{path}.gates"), "must be an array", "invalid-type"),
                Some(gates) => validate_gates(gates, &path, issues),
            }
        }
    }
}

fn validate_gates(gates: &[Value], item_path: &str, issues: &mut Vec<ValidationIssue>) {
    let mut seen: HashSet<&str> = HashSet::new();

    for (idx, gate) in gates.iter().enumerate() {
        let path = format!("{item_path}.gates[{idx}]");
        let Some(obj) = gate.as_object() else {
            push(issues, &path, "gate must be an object", "invalid-type");
            continue;
        };
        check_known_keys(
            obj,
            &path,
            &["name", "run", "runtime", "env", "cwd", "artifacts", "timeoutSec", "retries"],
            issues,
        );

        match obj.get("name") {
            None => push(issues, &format!("{path}.name"), "missing required field", "missing-field"),
            Some(Value::String(n)) => {
                if !seen.insert(n) {
                    push(
                        issues,
                        &format!("{path}.name"),
                        &format!("duplicate gate name '{n}' within item"),
                        "duplicate-gate",
                    );
                }
            }
            Some(_) => push(issues, &format!("{path}.name"), "must be a string", "invalid-type"),
        }

        match obj.get("run") {
            None => push(issues, &format!("{path}.run"), "missing required field", "missing-field"),
            Some(Value::String(r)) if r.is_empty() => {
                push(issues, &format!("{path}.run"), "must be a non-empty command", "invalid-value")
            }
            Some(Value::String(_)) => {}
            Some(_) => push(issues, &format!("{path}.run"), "must be a string", "invalid-type"),
        }

        if let Some(runtime) = obj.get("runtime") {
            match runtime.as_str() {
                Some("local" | "container") => {}
                _ => push(
                    issues,
                    &format!("{path}.runtime"),
                    "must be one of local, container",
                    "invalid-value",
                ),
            }
        }

        if let Some(env) = obj.get("env") {
            match env.as_object() {
                None => push(issues, &format!("{path}.env"), "must be an object", "invalid-type"),
                Some(map) => {
                    for (k, v) in map {
                        if !v.is_string() {
                            push(
                                issues,
                                &format!("{path}.env.{k}"),
                                "must be a string",
                                "invalid-type",
                            );
                        }
                    }
                }
            }
        }

        if let Some(artifacts) = obj.get("artifacts") {
            match artifacts.as_array() {
                None => push(issues, &format!("{path}.artifacts"), "must be an array", "invalid-type"),
                Some(globs) => {
                    for (g, pattern) in globs.iter().enumerate() {
                        if !pattern.is_string() {
                            push(
                                issues,
                                &format!("{path}.artifacts[{g}]"),
                                "must be a glob string",
                                "invalid-type",
                            );
                        }
                    }
                }
            }
        }

        for field in ["timeoutSec", "retries"] {
            if let Some(v) = obj.get(field) {
                if !v.is_u64() {
                    push(
                        issues,
                        &format!("{path}.{field}"),
                        "must be a non-negative integer",
                        "invalid-type",
                    );
                }
            }
        }
    }
}

fn validate_policy(policy: &Value, issues: &mut Vec<ValidationIssue>) {
    let Some(obj) = policy.as_object() else {
        push(issues, "$.policy", "must be an object", "invalid-type");
        return;
    };
    check_known_keys(
        obj,
        "$.policy",
        &["requiredGates", "optionalGates", "maxWorkers", "retries", "overrides", "blockOn", "mergeRule"],
        issues,
    );

    for field in ["requiredGates", "optionalGates", "blockOn"] {
        if let Some(v) = obj.get(field) {
            let ok = v
                .as_array()
                .map(|a| a.iter().all(Value::is_string))
                .unwrap_or(false);
            if !ok {
                push(
                    issues,
                    &format!("$.policy.{field}"),
                    "must be an array of strings",
                    "invalid-type",
                );
            }
        }
    }

    if let Some(v) = obj.get("maxWorkers") {
        match v.as_u64() {
            Some(n) if n >= 1 => {}
            _ => push(
                issues,
                "$.policy.maxWorkers",
                "must be an integer >= 1",
                "invalid-value",
            ),
        }
    }

    if let Some(v) = obj.get("retries") {
        match v.as_object() {
            None => push(issues, "$.policy.retries", "must be an object", "invalid-type"),
            Some(map) => {
                for (k, n) in map {
                    if !n.is_u64() {
                        push(
                            issues,
                            &format!("$.policy.retries.{k}"),
                            "must be a non-negative integer",
                            "invalid-type",
                        );
                    }
                }
            }
        }
    }

    if let Some(v) = obj.get("overrides") {
        match v.as_object() {
            None => push(issues, "$.policy.overrides", "must be an object", "invalid-type"),
            Some(map) => check_known_keys(map, "$.policy.overrides", &["skip", "required"], issues),
        }
    }

    if let Some(v) = obj.get("mergeRule") {
        if v.as_str() != Some("strict-required") {
            push(
                issues,
                "$.policy.mergeRule",
                "must be strict-required",
                "invalid-value",
            );
        }
    }
}

fn check_known_keys(
    obj: &serde_json::Map<String, Value>,
    path: &str,
    known: &[&str],
    issues: &mut Vec<ValidationIssue>,
) {
    for key in obj.keys() {
        if !known.contains(&key.as_str()) {
            push(
                issues,
                &format!("{path}.{key}"),
                &format!("unknown field '{key}'"),
                "unknown-field",
            );
        }
    }
}

fn push(issues: &mut Vec<ValidationIssue>, path: &str, message: &str, code: &str) {
    issues.push(ValidationIssue {
        path: path.to_string(),
        message: message.to_string(),
        code: code.to_string(),
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issues_of(raw: serde_json::Value) -> Vec<ValidationIssue> {
        match validate_plan(&raw) {
            Err(DomainError::SchemaValidation { issues }) => issues,
            other => panic!("expected schema issues, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_plan_loads() {
        let plan = load_plan(
            r#"{"schemaVersion": "1.0.0", "target": "main", "items": [
                {"name": "PR-1", "gates": [{"name": "lint", "run": "make lint"}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(plan.target, "main");
        assert_eq!(plan.items[0].gates[0].timeout_sec, 300);
    }

    #[test]
    fn test_invalid_json_is_distinct() {
        let err = load_plan("{not json").unwrap_err();
        assert!(matches!(err, DomainError::InvalidJson(_)));
    }

    #[test]
    fn test_all_issues_reported_not_only_first() {
        let issues = issues_of(json!({
            "schemaVersion": "2.0.0",
            "target": "",
            "items": [
                {"name": "a", "deps": ["a"]},
                {"name": "a"},
                {"name": "b", "bogus": true}
            ]
        }));
        let codes: Vec<&str> = issues.iter().map(|i| i.code.as_str()).collect();
        assert!(codes.contains(&"unsupported-schema-version"));
        assert!(codes.contains(&"invalid-value")); // empty target
        assert!(codes.contains(&"self-dependency"));
        assert!(codes.contains(&"duplicate-name"));
        assert!(codes.contains(&"unknown-field"));
        assert!(issues.len() >= 5);
    }

    #[test]
    fn test_schema_version_message_is_precise() {
        let issues = issues_of(json!({"schemaVersion": "0.9.0", "target": "main"}));
        let issue = issues
            .iter()
            .find(|i| i.code == "unsupported-schema-version")
            .unwrap();
        assert!(issue.message.contains("0.9.0"));
        assert!(issue.message.contains("1.x.y"));
        assert_eq!(issue.path, "$.schemaVersion");
    }

    #[test]
    fn test_duplicate_gate_names_rejected() {
        let issues = issues_of(json!({
            "schemaVersion": "1.0.0",
            "target": "main",
            "items": [{"name": "PR-1", "gates": [
                {"name": "lint", "run": "true"},
                {"name": "lint", "run": "false"}
            ]}]
        }));
        assert!(issues.iter().any(|i| i.code == "duplicate-gate"));
    }

    #[test]
    fn test_unknown_policy_field_rejected() {
        let issues = issues_of(json!({
            "schemaVersion": "1.0.0",
            "target": "main",
            "policy": {"maxWorkers": 0, "surprise": 1}
        }));
        assert!(issues.iter().any(|i| i.path == "$.policy.surprise"));
        assert!(issues.iter().any(|i| i.path == "$.policy.maxWorkers"));
    }
}
