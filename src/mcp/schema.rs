//! Validation of tool arguments against declared input schemas.
//!
//! Supports the subset of JSON Schema that tool definitions use: `type`
//! (single or list), `enum`, `required`, `properties`,
//! `additionalProperties`, `items`, `minimum` and `maximum`. Unknown keywords
//! are ignored.

use serde_json::{Map, Value};

/// Validates `value` against `schema`.
///
/// # Errors
///
/// Returns a message naming the offending location (rooted at `arguments`)
/// for the first violation found.
pub fn validate(schema: &Value, value: &Value) -> Result<(), String> {
    validate_at(schema, value, "arguments")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        // `true`, `{}` or anything non-object accepts everything
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        check_type(expected, value, path)?;
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Err(format!("{path} must be one of: {}", options.join(", ")));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if number < min {
                return Err(format!("{path} must be >= {min}"));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if number > max {
                return Err(format!("{path} must be <= {max}"));
            }
        }
    }

    match value {
        Value::Object(obj) => validate_object(schema, obj, path),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_at(item_schema, item, &format!("{path}[{i}]"))?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_object(
    schema: &Map<String, Value>,
    obj: &Map<String, Value>,
    path: &str,
) -> Result<(), String> {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                return Err(format!("missing required property {path}.{name}"));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let additional = schema.get("additionalProperties");

    for (key, child) in obj {
        let child_path = format!("{path}.{key}");
        match properties.and_then(|props| props.get(key)) {
            Some(child_schema) => validate_at(child_schema, child, &child_path)?,
            None => match additional {
                Some(Value::Bool(false)) => {
                    return Err(format!("unexpected property {child_path}"));
                }
                Some(extra @ Value::Object(_)) => validate_at(extra, child, &child_path)?,
                _ => {}
            },
        }
    }

    Ok(())
}

fn check_type(expected: &Value, value: &Value, path: &str) -> Result<(), String> {
    let matches = match expected {
        Value::String(name) => type_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| type_matches(name, value)),
        _ => true,
    };

    if matches {
        Ok(())
    } else {
        Err(format!(
            "{path} must be of type {}, got {}",
            describe_expected(expected),
            type_name(value)
        ))
    }
}

fn type_matches(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        // Unknown type names are not ours to reject
        _ => true,
    }
}

fn describe_expected(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
