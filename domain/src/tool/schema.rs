//! Argument validation against a tool's [`ParameterSchema`].
//!
//! The model backend is untrusted input: every tool call passes through
//! [`validate`] before anything executes. Failures are returned as a
//! [`SchemaError`] whose message is written for the model, naming the field
//! and the expected type so it can retry with corrected arguments.
//!
//! Also hosts the conversion between [`ParameterSchema`] and JSON Schema
//! objects, which is the shape both model backends and plugins speak.

use super::entities::{ParamType, ParameterSchema, ParameterSpec, ToolDescriptor};
use serde_json::{Map, Value, json};
use std::fmt;

/// What was wrong with a single field
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaProblem {
    /// The arguments payload itself was not a JSON object
    NotAnObject { found: &'static str },
    /// A required field is absent (or `null`)
    Missing,
    /// The field is present with a value of the wrong JSON type
    WrongType { found: &'static str },
    /// The value is not one of the declared enumeration values
    NotInEnum { allowed: Vec<Value> },
    /// The field is not declared and the schema forbids extra keys
    Unexpected,
}

/// Validation failure for one field of a tool call
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    /// Path of the offending field (`""` for the payload root)
    pub field: String,
    /// Expected type or shape, for the model's benefit
    pub expected: String,
    pub problem: SchemaProblem,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            SchemaProblem::NotAnObject { found } => {
                write!(f, "arguments must be a JSON object, got {}", found)
            }
            SchemaProblem::Missing => write!(
                f,
                "missing required field '{}' (expected {})",
                self.field, self.expected
            ),
            SchemaProblem::WrongType { found } => write!(
                f,
                "invalid type for field '{}': expected {}, got {}",
                self.field, self.expected, found
            ),
            SchemaProblem::NotInEnum { allowed } => {
                let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                write!(
                    f,
                    "invalid value for field '{}': expected one of [{}]",
                    self.field,
                    allowed.join(", ")
                )
            }
            SchemaProblem::Unexpected => {
                write!(f, "unexpected field '{}' (expected one of {})", self.field, self.expected)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Arguments that passed [`validate`].
///
/// `null` values for optional fields are stripped so implementations can
/// treat "absent" and "null" the same way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedArguments {
    values: Map<String, Value>,
}

impl ValidatedArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(|v| v.as_i64())
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.values.get(name).and_then(|v| v.as_u64())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(|v| v.as_bool())
    }

    /// Fetch a required string field.
    ///
    /// Only fails when the descriptor used for validation did not declare the
    /// field as a required string.
    pub fn require_str(&self, name: &str) -> Result<&str, String> {
        self.get_str(name)
            .ok_or_else(|| format!("missing required string field '{}'", name))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate call arguments against a descriptor's schema.
///
/// Checks, in order: the payload is an object (`null` counts as `{}`),
/// declared fields in declaration order (required, type, enumeration), then
/// undeclared fields. The first problem found is reported.
pub fn validate(
    descriptor: &ToolDescriptor,
    arguments: &Value,
) -> Result<ValidatedArguments, SchemaError> {
    validate_schema(&descriptor.parameter_schema, arguments)
}

/// Schema-only form of [`validate`].
pub fn validate_schema(
    schema: &ParameterSchema,
    arguments: &Value,
) -> Result<ValidatedArguments, SchemaError> {
    let empty = Map::new();
    let object = match arguments {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(SchemaError {
                field: String::new(),
                expected: "object".to_string(),
                problem: SchemaProblem::NotAnObject {
                    found: json_type_name(other),
                },
            });
        }
    };

    let values = check_object(schema, object, "")?;
    Ok(ValidatedArguments { values })
}

/// `prefix.name`, or `name` at the root
fn field_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Validate one object level; nested objects and array elements recurse
/// with dotted and indexed paths (`options.retries`, `files[1].path`).
fn check_object(
    schema: &ParameterSchema,
    object: &Map<String, Value>,
    prefix: &str,
) -> Result<Map<String, Value>, SchemaError> {
    let mut values = Map::new();
    for spec in &schema.parameters {
        let path = field_path(prefix, &spec.name);
        match object.get(&spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    return Err(SchemaError {
                        field: path,
                        expected: spec.param_type.to_string(),
                        problem: SchemaProblem::Missing,
                    });
                }
            }
            Some(value) => {
                let value = check_value(spec, value, &path)?;
                values.insert(spec.name.clone(), value);
            }
        }
    }

    for (key, value) in object {
        if schema.get(key).is_some() {
            continue;
        }
        if !schema.additional_properties {
            let declared: Vec<&str> = schema.parameters.iter().map(|p| p.name.as_str()).collect();
            return Err(SchemaError {
                field: field_path(prefix, key),
                expected: format!("[{}]", declared.join(", ")),
                problem: SchemaProblem::Unexpected,
            });
        }
        values.insert(key.clone(), value.clone());
    }

    Ok(values)
}

fn check_value(spec: &ParameterSpec, value: &Value, path: &str) -> Result<Value, SchemaError> {
    if !spec.param_type.accepts(value) {
        return Err(SchemaError {
            field: path.to_string(),
            expected: spec.param_type.to_string(),
            problem: SchemaProblem::WrongType {
                found: json_type_name(value),
            },
        });
    }
    if let Some(allowed) = &spec.enum_values
        && !allowed.contains(value)
    {
        return Err(SchemaError {
            field: path.to_string(),
            expected: spec.param_type.to_string(),
            problem: SchemaProblem::NotInEnum {
                allowed: allowed.clone(),
            },
        });
    }

    match (value, &spec.properties, &spec.items) {
        (Value::Object(map), Some(schema), _) => {
            check_object(schema, map, path).map(Value::Object)
        }
        (Value::Array(elements), _, Some(item)) => elements
            .iter()
            .enumerate()
            .map(|(index, element)| check_value(item, element, &format!("{}[{}]", path, index)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Ok(value.clone()),
    }
}

impl ParameterSchema {
    /// Render as a JSON Schema object (`{"type": "object", ...}`).
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(param.name.clone(), param.to_json_schema());
        }
        let required: Vec<&str> = self.required_names().collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": self.additional_properties,
        })
    }

    /// Build from a JSON Schema object as published by a plugin.
    ///
    /// Lenient: unknown or missing `type` becomes [`ParamType::Any`], a union
    /// type uses its first non-null member, and `additionalProperties`
    /// defaults to `true` as in JSON Schema. Nested `properties` and `items`
    /// are read recursively.
    pub fn from_json_schema(schema: &Value) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let mut parameters = Vec::new();
        if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
            for (name, prop) in props {
                parameters.push(ParameterSpec::from_json_schema(
                    name.clone(),
                    prop,
                    required.contains(&name.as_str()),
                ));
            }
        }

        let additional_properties = schema
            .get("additionalProperties")
            .map(|v| !matches!(v, Value::Bool(false)))
            .unwrap_or(true);

        Self {
            parameters,
            additional_properties,
        }
    }
}

impl ParameterSpec {
    fn to_json_schema(&self) -> Value {
        let mut prop = match &self.properties {
            Some(schema) => match schema.to_json_schema() {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            None => Map::new(),
        };
        if self.param_type != ParamType::Any {
            prop.insert("type".into(), json!(self.param_type.as_str()));
        }
        if !self.description.is_empty() {
            prop.insert("description".into(), json!(self.description));
        }
        if let Some(values) = &self.enum_values {
            prop.insert("enum".into(), Value::Array(values.clone()));
        }
        if let Some(item) = &self.items {
            prop.insert("items".into(), item.to_json_schema());
        }
        Value::Object(prop)
    }

    fn from_json_schema(name: String, prop: &Value, required: bool) -> Self {
        let param_type = match prop.get("type") {
            Some(Value::String(t)) => ParamType::parse(t),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(|t| t.as_str())
                .find(|t| *t != "null")
                .and_then(ParamType::parse),
            _ => None,
        }
        .unwrap_or(ParamType::Any);

        let description = prop
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or_default();

        let mut spec = ParameterSpec::new(name, description, param_type, required);
        if let Some(values) = prop.get("enum").and_then(|e| e.as_array()) {
            spec.enum_values = Some(values.clone());
        }
        if prop.get("properties").is_some_and(|p| p.is_object()) {
            spec.properties = Some(ParameterSchema::from_json_schema(prop));
        }
        if let Some(items) = prop.get("items").filter(|i| i.is_object()) {
            spec.items = Some(Box::new(ParameterSpec::from_json_schema(
                String::new(),
                items,
                false,
            )));
        }
        spec
    }
}
