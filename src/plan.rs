//! Schema-driven planning.
//!
//! [`plan_resource`] computes the state a resource will have after apply and
//! the attribute-level changes needed to get there.

use serde_json::{Map, Value};

use crate::schema::{Attribute, Block, BlockNestingMode, NestedBlock, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Plan a create (`prior` is `None`), an update, or a destroy (`proposed` is null).
///
/// - Create: defaults are filled in and every configured value is listed as added.
/// - Update: computed attributes left unset carry over from `prior`, as do
///   nested blocks left unset. JSON documents that are semantically equal are
///   not a change, and the prior text is kept. A change to a `force_new`
///   attribute requires replacement.
/// - Destroy: every prior value is listed as removed.
pub fn plan_resource(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let proposed_obj = proposed.as_object();
    let prior_obj = prior.and_then(Value::as_object);

    match (prior_obj, proposed_obj) {
        (Some(prior), None) => {
            let changes = prior
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| AttributeChange::removed(k.clone(), v.clone()))
                .collect();
            PlanResult::with_changes(Value::Null, changes, false)
        },
        (None, None) => PlanResult::no_change(Value::Null),
        (None, Some(proposed)) => {
            let planned = with_defaults(&schema.block, proposed);
            let changes = planned
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| AttributeChange::added(k.clone(), v.clone()))
                .collect();
            PlanResult::with_changes(Value::Object(planned), changes, false)
        },
        (Some(prior), Some(proposed)) => {
            let mut changes = Vec::new();
            let mut requires_replace = false;
            let planned = plan_block(
                &schema.block,
                prior,
                proposed,
                "",
                &mut changes,
                &mut requires_replace,
            );
            PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
        },
    }
}

fn plan_block(
    block: &Block,
    prior: &Map<String, Value>,
    proposed: &Map<String, Value>,
    path: &str,
    changes: &mut Vec<AttributeChange>,
    requires_replace: &mut bool,
) -> Map<String, Value> {
    let mut planned = proposed.clone();

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        let before = present(prior.get(name));
        let mut after = present(proposed.get(name)).cloned();
        if after.is_none() {
            after = if attr.flags.computed {
                before.cloned()
            } else {
                attr.default.clone()
            };
        }

        match (before, after) {
            (None, None) => {
                planned.remove(name);
            },
            (Some(b), Some(a)) if attribute_equal(attr, b, &a) => {
                planned.insert(name.clone(), b.clone());
            },
            (before, after) => {
                if attr.force_new {
                    *requires_replace = true;
                }
                changes.push(AttributeChange::new(attr_path, before.cloned(), after.clone()));
                planned.insert(name.clone(), after.unwrap_or(Value::Null));
            },
        }
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        let before = present(prior.get(name));
        let after = present(proposed.get(name));

        match (before, after) {
            (None, None) => {
                planned.remove(name);
            },
            (Some(b), None) => {
                planned.insert(name.clone(), b.clone());
            },
            (Some(Value::Object(b)), Some(Value::Object(a)))
                if nested.nesting_mode == BlockNestingMode::Single =>
            {
                let merged = plan_block(&nested.block, b, a, &block_path, changes, requires_replace);
                planned.insert(name.clone(), Value::Object(merged));
            },
            (before, Some(a)) => {
                let after = nested_with_defaults(nested, a);
                match before {
                    Some(b) if nested_equal(nested, b, &after) => {
                        planned.insert(name.clone(), b.clone());
                    },
                    _ => {
                        if block_forces_new(&nested.block) {
                            *requires_replace = true;
                        }
                        changes.push(AttributeChange::new(block_path, before.cloned(), Some(after.clone())));
                        planned.insert(name.clone(), after);
                    },
                }
            },
        }
    }

    planned
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn block_forces_new(block: &Block) -> bool {
    block.attributes.values().any(|a| a.force_new)
        || block.blocks.values().any(|b| block_forces_new(&b.block))
}

/// Fill unset attributes that have defaults, recursively.
fn with_defaults(block: &Block, value: &Map<String, Value>) -> Map<String, Value> {
    let mut out = value.clone();
    for (name, attr) in &block.attributes {
        if present(out.get(name)).is_none() {
            match &attr.default {
                Some(default) => {
                    out.insert(name.clone(), default.clone());
                },
                None => {
                    out.remove(name);
                },
            }
        }
    }
    for (name, nested) in &block.blocks {
        match present(value.get(name)) {
            Some(v) => {
                out.insert(name.clone(), nested_with_defaults(nested, v));
            },
            None => {
                out.remove(name);
            },
        }
    }
    out
}

fn nested_with_defaults(nested: &NestedBlock, value: &Value) -> Value {
    match value {
        Value::Object(obj) if nested.nesting_mode == BlockNestingMode::Single => {
            Value::Object(with_defaults(&nested.block, obj))
        },
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), item_with_defaults(&nested.block, v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| item_with_defaults(&nested.block, v))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn item_with_defaults(block: &Block, value: &Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(with_defaults(block, obj)),
        other => other.clone(),
    }
}

fn attribute_equal(attr: &Attribute, a: &Value, b: &Value) -> bool {
    normalize_attribute(attr, a) == normalize_attribute(attr, b)
}

fn normalize_attribute(attr: &Attribute, value: &Value) -> Value {
    match value {
        Value::String(s) if attr.json_encoded => {
            serde_json::from_str(s).unwrap_or_else(|_| value.clone())
        },
        other => other.clone(),
    }
}

fn nested_equal(nested: &NestedBlock, a: &Value, b: &Value) -> bool {
    normalize_nested(nested, a) == normalize_nested(nested, b)
}

fn normalize_nested(nested: &NestedBlock, value: &Value) -> Value {
    match value {
        Value::Object(obj) if nested.nesting_mode == BlockNestingMode::Single => {
            normalize_block(&nested.block, obj)
        },
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), normalize_item(&nested.block, v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| normalize_item(&nested.block, v))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn normalize_item(block: &Block, value: &Value) -> Value {
    match value {
        Value::Object(obj) => normalize_block(block, obj),
        other => other.clone(),
    }
}

fn normalize_block(block: &Block, obj: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    for (key, value) in obj {
        if value.is_null() {
            continue;
        }
        let normalized = if let Some(attr) = block.attributes.get(key) {
            normalize_attribute(attr, value)
        } else if let Some(nested) = block.blocks.get(key) {
            normalize_nested(nested, value)
        } else {
            value.clone()
        };
        out.insert(key.clone(), normalized);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock, Schema};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("integration_type", Attribute::required_string().with_force_new())
            .with_attribute(
                "intended_state",
                Attribute::optional_string().with_default(json!("DISABLED")),
            )
            .with_attribute("name", Attribute::optional_computed_string())
            .with_attribute("contract_input", Attribute::required_json())
            .with_block(
                "config_request",
                NestedBlock::single(
                    Block::new()
                        .with_attribute("request_url_template", Attribute::required_string())
                        .with_attribute(
                            "request_template",
                            Attribute::optional_string().with_default(json!("${input.rawRequest}")),
                        ),
                ),
            )
    }

    fn prior() -> Value {
        json!({
            "id": "i-1",
            "integration_type": "purecloud-data-actions",
            "intended_state": "DISABLED",
            "name": "Generated",
            "contract_input": "{\"type\":\"object\"}",
            "config_request": {
                "request_url_template": "https://example.com",
                "request_template": "${input.rawRequest}"
            }
        })
    }

    #[test]
    fn test_plan_create_fills_defaults() {
        let plan = plan_resource(
            &schema(),
            None,
            &json!({
                "integration_type": "purecloud-data-actions",
                "contract_input": "{}",
                "config_request": {"request_url_template": "https://example.com"}
            }),
        );

        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["intended_state"], "DISABLED");
        assert_eq!(
            plan.planned_state["config_request"]["request_template"],
            "${input.rawRequest}"
        );
        assert!(plan.planned_state.get("id").is_none());
        let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert!(paths.contains(&"intended_state"));
        assert!(paths.contains(&"config_request"));
    }

    #[test]
    fn test_plan_update_no_changes_carries_computed() {
        let proposed = json!({
            "integration_type": "purecloud-data-actions",
            "contract_input": "{ \"type\": \"object\" }",
            "config_request": {"request_url_template": "https://example.com"}
        });
        let prior = prior();
        let plan = plan_resource(&schema(), Some(&prior), &proposed);

        assert!(plan.is_empty(), "{:?}", plan.changes);
        assert_eq!(plan.planned_state["id"], "i-1");
        assert_eq!(plan.planned_state["name"], "Generated");
        assert_eq!(plan.planned_state["contract_input"], "{\"type\":\"object\"}");
    }

    #[test]
    fn test_plan_update_in_place() {
        let prior = prior();
        let mut proposed = prior.clone();
        proposed["intended_state"] = json!("ENABLED");
        proposed["config_request"]["request_url_template"] = json!("https://example.org");

        let plan = plan_resource(&schema(), Some(&prior), &proposed);
        assert!(!plan.requires_replace);
        let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["intended_state", "config_request.request_url_template"]
        );
    }

    #[test]
    fn test_plan_force_new() {
        let prior = prior();
        let mut proposed = prior.clone();
        proposed["integration_type"] = json!("custom-rest-actions");

        let plan = plan_resource(&schema(), Some(&prior), &proposed);
        assert!(plan.requires_replace);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].before, Some(json!("purecloud-data-actions")));
    }

    #[test]
    fn test_plan_json_change_is_detected() {
        let prior = prior();
        let mut proposed = prior.clone();
        proposed["contract_input"] = json!("{\"type\":\"string\"}");

        let plan = plan_resource(&schema(), Some(&prior), &proposed);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "contract_input");
    }

    #[test]
    fn test_plan_destroy() {
        let prior = prior();
        let plan = plan_resource(&schema(), Some(&prior), &Value::Null);
        assert!(plan.planned_state.is_null());
        assert!(plan.changes.iter().all(|c| c.after.is_none()));
        assert!(plan.changes.iter().any(|c| c.path == "id"));
    }

    #[test]
    fn test_plan_unset_block_is_kept() {
        let prior = prior();
        let mut proposed = prior.clone();
        proposed.as_object_mut().unwrap().remove("config_request");

        let plan = plan_resource(&schema(), Some(&prior), &proposed);
        assert!(plan.is_empty());
        assert_eq!(plan.planned_state["config_request"], prior["config_request"]);
    }
}
