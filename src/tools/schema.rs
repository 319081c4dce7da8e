//! Argument validation against a tool's input schema
//!
//! Covers the subset of JSON Schema tool definitions actually use:
//! `type`, `required`, `properties.*.type` and `additionalProperties: false`.

use serde_json::Value;

use crate::core::ToolFailure;

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        // Unknown type keywords are not ours to enforce
        _ => true,
    }
}

fn check_type(schema: &Value, value: &Value, path: &str) -> Result<(), ToolFailure> {
    let Some(expected) = schema.get("type") else {
        return Ok(());
    };

    let ok = match expected {
        Value::String(t) => type_matches(t, value),
        Value::Array(options) => options
            .iter()
            .filter_map(Value::as_str)
            .any(|t| type_matches(t, value)),
        _ => true,
    };

    if ok {
        Ok(())
    } else {
        Err(ToolFailure::invalid_args(format!(
            "'{}' should be of type {}",
            path, expected
        )))
    }
}

/// Validate tool arguments against an input schema
pub fn validate(schema: &Value, args: &Value) -> Result<(), ToolFailure> {
    if schema.is_null() {
        return Ok(());
    }

    check_type(schema, args, "args")?;

    let Some(object) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(ToolFailure::invalid_args(format!(
                    "missing required argument '{}'",
                    key
                )));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);

    for (key, value) in object {
        match properties.and_then(|p| p.get(key)) {
            Some(property) => check_type(property, value, key)?,
            None => {
                if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                    return Err(ToolFailure::invalid_args(format!(
                        "unexpected argument '{}'",
                        key
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolErrorKind;
    use serde_json::json;

    fn echo_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "repeat": { "type": "integer" }
            },
            "required": ["text"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_args() {
        assert!(validate(&echo_schema(), &json!({"text": "hi", "repeat": 2})).is_ok());
        assert!(validate(&echo_schema(), &json!({"text": "hi"})).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate(&echo_schema(), &json!({"repeat": 2})).unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidArgs);
        assert!(err.message.contains("text"));
    }

    #[test]
    fn test_wrong_property_type() {
        let err = validate(&echo_schema(), &json!({"text": "hi", "repeat": 1.5})).unwrap_err();
        assert!(err.message.contains("repeat"));
    }

    #[test]
    fn test_additional_properties() {
        let err = validate(&echo_schema(), &json!({"text": "hi", "loud": true})).unwrap_err();
        assert!(err.message.contains("loud"));

        let open = json!({"type": "object", "properties": {}});
        assert!(validate(&open, &json!({"anything": 1})).is_ok());
    }

    #[test]
    fn test_args_must_be_object() {
        let err = validate(&echo_schema(), &json!("hi")).unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::InvalidArgs);
    }

    #[test]
    fn test_union_types() {
        let schema = json!({
            "type": "object",
            "properties": { "limit": { "type": ["integer", "null"] } }
        });
        assert!(validate(&schema, &json!({"limit": null})).is_ok());
        assert!(validate(&schema, &json!({"limit": "ten"})).is_err());
    }
}
