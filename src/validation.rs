//! Schema validation helpers.
//!
//! Validates a configuration `serde_json::Value` against a [`Schema`],
//! checking presence, types, nested block counts and the per-attribute
//! [`ValueValidator`]s.
//!
//! # Example
//!
//! ```
//! use dbtcloud_provider::schema::{Attribute, Schema, ValueValidator};
//! use dbtcloud_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute(
//!         "job_type",
//!         Attribute::optional_string().with_validator(ValueValidator::one_of(["ci", "other"])),
//!     );
//!
//! assert!(validate(&schema, &json!({"name": "nightly", "job_type": "other"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "nightly", "job_type": "hourly"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("job_type".to_string()));
//! ```

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema,
    ValueValidator,
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
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (provider sets these)
/// - Attribute types must match the schema
/// - Value validators run on present, well-typed values
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
            let diag =
                Diagnostic::error("Expected object").with_detail(format!("Got {}", value_type_name(value)));
            diagnostics.push(if path.is_empty() {
                diag
            } else {
                diag.with_attribute(path)
            });
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
                for validator in &attr.validators {
                    if let Some(diag) = check_validator(validator, v, path) {
                        diagnostics.push(diag);
                    }
                }
            }
        },
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
            if !is_int64(value) {
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
    }
}

fn check_validator(validator: &ValueValidator, value: &Value, path: &str) -> Option<Diagnostic> {
    match validator {
        ValueValidator::OneOf(allowed) => {
            let s = value.as_str()?;
            if allowed.iter().any(|a| a == s) {
                return None;
            }
            Some(
                Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                    .with_detail(format!(
                        "Expected one of [{}], got '{}'",
                        allowed.join(", "),
                        s
                    ))
                    .with_attribute(path),
            )
        },
        ValueValidator::NotEmpty => {
            let s = value.as_str()?;
            if !s.is_empty() {
                return None;
            }
            Some(
                Diagnostic::error(format!("Attribute '{}' must not be empty", path))
                    .with_attribute(path),
            )
        },
        ValueValidator::JsonObject => {
            let s = value.as_str()?;
            match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(_)) => None,
                Ok(other) => Some(
                    Diagnostic::error(format!("Attribute '{}' must be a JSON object", path))
                        .with_detail(format!("Got {}", value_type_name(&other)))
                        .with_attribute(path),
                ),
                Err(err) => Some(
                    Diagnostic::error(format!("Attribute '{}' is not valid JSON", path))
                        .with_detail(err.to_string())
                        .with_attribute(path),
                ),
            }
        },
        ValueValidator::AtLeast(min) => {
            let n = value.as_i64()?;
            if n >= *min {
                return None;
            }
            Some(
                Diagnostic::error(format!("Attribute '{}' must be at least {}", path, min))
                    .with_detail(format!("Got {}", n))
                    .with_attribute(path),
            )
        },
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match nested.nesting_mode {
        BlockNestingMode::Single => match value {
            None | Some(Value::Null) => {
                if nested.min_items > 0 {
                    diagnostics.push(
                        Diagnostic::error(format!("Missing required block '{}'", path))
                            .with_detail("At least one block is required")
                            .with_attribute(path),
                    );
                }
            },
            Some(v) => validate_block(&nested.block, v, path, diagnostics),
        },
        BlockNestingMode::List => validate_list_block(nested, value, path, diagnostics),
    }
}

fn validate_list_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let items: &[Value] = match value {
        None | Some(Value::Null) => &[],
        Some(Value::Array(arr)) => arr,
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
            return;
        },
    };

    let len = items.len() as u32;
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

    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}.{}", path, i);
        validate_block(&nested.block, item, &item_path, diagnostics);
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

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n
                    .as_f64()
                    .map(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
                    .unwrap_or(false)
        },
        _ => false,
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
    use crate::schema::{AttributeFlags, Block, NestedBlock, Schema};
    use serde_json::json;

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(validate(&schema, &json!({"name": "nightly"})).is_empty());

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
        let schema = Schema::v0().with_attribute("id", Attribute::computed_int64());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"id": "not a number"})).is_empty());
    }

    #[test]
    fn test_validate_int64() {
        let schema = Schema::v0().with_attribute("project_id", Attribute::required_int64());

        assert!(validate(&schema, &json!({"project_id": 42})).is_empty());
        assert!(validate(&schema, &json!({"project_id": 42.0})).is_empty());
        assert_eq!(validate(&schema, &json!({"project_id": 42.5})).len(), 1);
        assert_eq!(validate(&schema, &json!({"project_id": "42"})).len(), 1);
    }

    #[test]
    fn test_validate_list() {
        let schema = Schema::v0().with_attribute(
            "execute_steps",
            Attribute::new(
                AttributeType::list(AttributeType::String),
                AttributeFlags::required(),
            ),
        );

        assert!(validate(&schema, &json!({"execute_steps": ["dbt run", "dbt test"]})).is_empty());

        let diagnostics = validate(&schema, &json!({"execute_steps": ["dbt run", 7]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("execute_steps.1".to_string()));

        assert_eq!(validate(&schema, &json!({"execute_steps": "dbt run"})).len(), 1);
    }

    #[test]
    fn test_validate_one_of() {
        let schema = Schema::v0().with_attribute(
            "job_type",
            Attribute::optional_string().with_validator(ValueValidator::one_of([
                "ci",
                "merge",
                "scheduled",
                "other",
                "adaptive",
            ])),
        );

        assert!(validate(&schema, &json!({"job_type": "merge"})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());

        let diagnostics = validate(&schema, &json!({"job_type": "hourly"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0]
            .detail
            .as_deref()
            .unwrap_or_default()
            .contains("got 'hourly'"));
    }

    #[test]
    fn test_validators_skip_on_type_error() {
        let schema = Schema::v0().with_attribute(
            "job_type",
            Attribute::optional_string().with_validator(ValueValidator::one_of(["ci"])),
        );

        let diagnostics = validate(&schema, &json!({"job_type": 5}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid type"));
    }

    #[test]
    fn test_validate_json_object() {
        let schema = Schema::v0().with_attribute(
            "extended_attributes",
            Attribute::json_string(AttributeFlags::required()),
        );

        assert!(validate(&schema, &json!({"extended_attributes": "{\"type\": \"databricks\"}"})).is_empty());

        let diagnostics = validate(&schema, &json!({"extended_attributes": "{not json"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("not valid JSON"));

        let diagnostics = validate(&schema, &json!({"extended_attributes": "[1, 2]"}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("must be a JSON object"));
    }

    #[test]
    fn test_validate_not_empty_and_at_least() {
        let schema = Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string().with_validator(ValueValidator::NotEmpty),
            )
            .with_attribute(
                "account_id",
                Attribute::required_int64().with_validator(ValueValidator::AtLeast(1)),
            );

        assert!(validate(&schema, &json!({"name": "x", "account_id": 1})).is_empty());
        assert_eq!(validate(&schema, &json!({"name": "", "account_id": 0})).len(), 2);
    }

    #[test]
    fn test_validate_nested_block_single() {
        let schema = Schema::v0().with_block(
            "triggers",
            NestedBlock::single(Block::new().with_attribute("schedule", Attribute::optional_bool())),
        );

        assert!(validate(&schema, &json!({"triggers": {"schedule": true}})).is_empty());
        assert!(validate(&schema, &json!({})).is_empty());

        let diagnostics = validate(&schema, &json!({"triggers": {"schedule": "yes"}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("triggers.schedule".to_string()));
    }

    #[test]
    fn test_validate_required_single_block() {
        let schema = Schema::v0().with_block(
            "triggers",
            NestedBlock::single(Block::new()).with_min_items(1),
        );

        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Missing required block"));
    }

    #[test]
    fn test_validate_nested_block_list() {
        let schema = Schema::v0().with_block(
            "steps",
            NestedBlock::list(Block::new().with_attribute("command", Attribute::required_string()))
                .with_min_items(1)
                .with_max_items(2),
        );

        assert!(validate(&schema, &json!({"steps": [{"command": "dbt run"}]})).is_empty());

        let diagnostics = validate(&schema, &json!({"steps": []}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));

        let diagnostics = validate(
            &schema,
            &json!({"steps": [{"command": "a"}, {"command": "b"}, {"command": "c"}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 2"));

        let diagnostics = validate(&schema, &json!({"steps": [{"command": 1}]}));
        assert_eq!(diagnostics[0].attribute, Some("steps.0.command".to_string()));
    }

    #[test]
    fn test_helpers() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        assert!(is_valid(&schema, &json!({"name": "nightly"})));
        assert!(!is_valid(&schema, &json!({})));
        assert!(validate_result(&schema, &json!({"name": "nightly"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());

        let diagnostics = validate(&schema, &json!("not an object"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected object"));
        assert!(diagnostics[0].attribute.is_none());
    }
}
