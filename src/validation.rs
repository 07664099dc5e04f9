//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` against a [`Schema`] and reports problems
//! as [`Diagnostic`]s, each carrying the dotted path of the offending value.
//!
//! # Example
//!
//! ```
//! use cxcloud_integrations::schema::{Attribute, Schema};
//! use cxcloud_integrations::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("timeout", Attribute::optional_int64().with_int_range(1, 60));
//!
//! assert!(validate(&schema, &json!({"name": "lookup", "timeout": 20})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "lookup", "timeout": 90}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("timeout".to_string()));
//! ```

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema,
};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes are skipped (provider sets these)
/// - Attribute types must match the schema
/// - Strings must be one of `allowed_values` when the list is non-empty
/// - Integers must fall inside `int_range` when set
/// - `json_encoded` strings must parse as JSON
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let mut diag =
                Diagnostic::error("Expected object").with_detail(format!("Got {}", value_type_name(value)));
            if !path.is_empty() {
                diag = diag.with_attribute(path);
            }
            diagnostics.push(diag);
            return;
        },
    };

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);
    }

    for (name, nested_block) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested_block, obj.get(name), &block_path, diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => {
            let before = diagnostics.len();
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
            if diagnostics.len() == before {
                validate_constraints(attr, v, path, diagnostics);
            }
        },
    }
}

fn validate_constraints(attr: &Attribute, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    if let Some(s) = value.as_str() {
        if !attr.allowed_values.is_empty() && !attr.allowed_values.iter().any(|v| v == s) {
            diagnostics.push(
                Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                    .with_detail(format!(
                        "Expected one of [{}], got \"{}\"",
                        attr.allowed_values.join(", "),
                        s
                    ))
                    .with_attribute(path),
            );
        }
        if attr.json_encoded {
            if let Err(err) = serde_json::from_str::<Value>(s) {
                diagnostics.push(
                    Diagnostic::error(format!("Invalid JSON in attribute '{}'", path))
                        .with_detail(err.to_string())
                        .with_attribute(path),
                );
            }
        }
    }

    if let (Some(range), Some(n)) = (attr.int_range, as_int64(value)) {
        if !range.contains(n) {
            diagnostics.push(
                Diagnostic::error(format!("Value out of range for attribute '{}'", path))
                    .with_detail(format!(
                        "Expected a value between {} and {}, got {}",
                        range.min, range.max, n
                    ))
                    .with_attribute(path),
            );
        }
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if as_int64(value).is_none() {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        },
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        },
        AttributeType::Dynamic => {},
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if nested.min_items > 0 {
                let summary = match nested.nesting_mode {
                    BlockNestingMode::Single => format!("Missing required block '{}'", path),
                    _ => format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ),
                };
                diagnostics.push(Diagnostic::error(summary).with_attribute(path));
            }
        },
        Some(v) => match (nested.nesting_mode, v) {
            (BlockNestingMode::Single, _) => validate_block(&nested.block, v, path, diagnostics),
            (BlockNestingMode::List, Value::Array(arr)) => {
                check_item_count(nested, arr.len(), path, diagnostics);
                for (i, item) in arr.iter().enumerate() {
                    let item_path = format!("{}.{}", path, i);
                    validate_block(&nested.block, item, &item_path, diagnostics);
                }
            },
            (BlockNestingMode::Map, Value::Object(obj)) => {
                check_item_count(nested, obj.len(), path, diagnostics);
                for (key, item) in obj {
                    let item_path = format!("{}.{}", path, key);
                    validate_block(&nested.block, item, &item_path, diagnostics);
                }
            },
            (mode, v) => {
                let expected = if mode == BlockNestingMode::List { "list" } else { "map" };
                diagnostics.push(
                    Diagnostic::error(format!("Expected {} for block '{}'", expected, path))
                        .with_detail(format!("Got {}", value_type_name(v)))
                        .with_attribute(path),
                );
            },
        },
    }
}

fn check_item_count(nested: &NestedBlock, len: usize, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let len = len as u32;
    if len < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ))
            .with_attribute(path),
        );
    }
    // max_items of 0 means unlimited
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Integer value of `value`, accepting floats with no fractional part.
pub(crate) fn as_int64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, Block, NestedBlock, Schema};
    use serde_json::json;

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "test"})).is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("name".to_string()));

        let diagnostics = validate(&schema, &json!({"name": null}));
        assert_eq!(diagnostics.len(), 1);

        let diagnostics = validate(&schema, &json!({"name": 123}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_computed_attribute_skipped() {
        let schema = Schema::v0().with_attribute("id", Attribute::computed_string());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"id": 123})).is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("count", Attribute::required_int64());

        assert!(validate(&schema, &json!({"count": 42})).is_empty());
        assert!(validate(&schema, &json!({"count": 42.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"count": 42.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"count": "42"})).len(), 1);
    }

    #[test]
    fn test_validate_allowed_values() {
        let schema = Schema::v0().with_attribute(
            "request_type",
            Attribute::required_string().with_allowed_values(&["GET", "POST"]),
        );

        assert!(validate(&schema, &json!({"request_type": "GET"})).is_empty());

        let diagnostics = validate(&schema, &json!({"request_type": "get"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid value"));
        assert!(diagnostics[0].detail.as_deref().unwrap_or("").contains("GET, POST"));
    }

    #[test]
    fn test_validate_int_range() {
        let schema = Schema::v0().with_attribute(
            "config_timeout_seconds",
            Attribute::optional_int64().with_int_range(1, 60),
        );

        assert!(validate(&schema, &json!({"config_timeout_seconds": 60})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());

        let diagnostics = validate(&schema, &json!({"config_timeout_seconds": 0}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("out of range"));
    }

    #[test]
    fn test_validate_json_encoded() {
        let schema = Schema::v0().with_attribute("contract_input", Attribute::required_json());

        assert!(validate(&schema, &json!({"contract_input": "{\"type\":\"object\"}"})).is_empty());

        let diagnostics = validate(&schema, &json!({"contract_input": "{not json"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid JSON"));
    }

    #[test]
    fn test_validate_type_error_skips_constraints() {
        let schema = Schema::v0().with_attribute(
            "state",
            Attribute::optional_string().with_allowed_values(&["ENABLED"]),
        );
        let diagnostics = validate(&schema, &json!({"state": 1}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_map() {
        let schema = Schema::v0().with_attribute(
            "headers",
            Attribute::new(
                AttributeType::map(AttributeType::String),
                AttributeFlags::required(),
            ),
        );

        assert!(validate(&schema, &json!({"headers": {"Accept": "application/json"}})).is_empty());

        let diagnostics = validate(&schema, &json!({"headers": {"Accept": "x", "Retry": 3}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("headers.Retry".to_string()));
    }

    #[test]
    fn test_validate_list() {
        let schema = Schema::v0().with_attribute(
            "tags",
            Attribute::new(
                AttributeType::list(AttributeType::String),
                AttributeFlags::required(),
            ),
        );

        assert!(validate(&schema, &json!({"tags": ["a", "b"]})).is_empty());
        let diagnostics = validate(&schema, &json!({"tags": ["a", 1]}));
        assert_eq!(diagnostics[0].attribute, Some("tags.1".to_string()));
        assert_eq!(validate(&schema, &json!({"tags": "a"})).len(), 1);
    }

    #[test]
    fn test_validate_nested_block_single() {
        let schema = Schema::v0().with_block(
            "config_request",
            NestedBlock::single(
                Block::new().with_attribute("request_url_template", Attribute::required_string()),
            )
            .with_min_items(1),
        );

        assert!(validate(
            &schema,
            &json!({"config_request": {"request_url_template": "https://x"}})
        )
        .is_empty());

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Missing required block"));

        let diagnostics = validate(&schema, &json!({"config_request": {"request_url_template": 1}}));
        assert_eq!(
            diagnostics[0].attribute,
            Some("config_request.request_url_template".to_string())
        );
    }

    #[test]
    fn test_validate_nested_block_list() {
        let schema = Schema::v0().with_block(
            "ingress",
            NestedBlock::list(Block::new().with_attribute("port", Attribute::required_int64()))
                .with_min_items(1)
                .with_max_items(3),
        );

        assert!(validate(&schema, &json!({"ingress": [{"port": 80}, {"port": 443}]})).is_empty());

        let diagnostics = validate(&schema, &json!({"ingress": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));

        let diagnostics = validate(
            &schema,
            &json!({"ingress": [{"port": 1}, {"port": 2}, {"port": 3}, {"port": 4}]}),
        );
        assert!(diagnostics[0].summary.contains("at most 3"));

        let diagnostics = validate(&schema, &json!({"ingress": {"port": 1}}));
        assert!(diagnostics[0].summary.contains("Expected list"));
    }

    #[test]
    fn test_validate_nested_block_map() {
        let schema = Schema::v0().with_block(
            "volumes",
            NestedBlock::map(Block::new().with_attribute("mount_path", Attribute::required_string())),
        );

        let diagnostics = validate(&schema, &json!({"volumes": {"data": {"mount_path": 123}}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute,
            Some("volumes.data.mount_path".to_string())
        );
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
        assert!(diagnostics[0].attribute.is_none());
    }

    #[test]
    fn test_helpers() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(is_valid(&schema, &json!({"name": "test"})));
        assert!(!is_valid(&schema, &json!({})));
        assert!(validate_result(&schema, &json!({"name": "test"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);
    }
}
