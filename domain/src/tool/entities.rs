//! Tool domain entities

use crate::plugin::PluginId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON type a parameter must conform to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// No type constraint (plugin schemas that omit `type`)
    Any,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        }
    }

    /// Parse a JSON Schema `type` keyword. Unknown types yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ParamType::String),
            "integer" => Some(ParamType::Integer),
            "number" => Some(ParamType::Number),
            "boolean" => Some(ParamType::Boolean),
            "array" => Some(ParamType::Array),
            "object" => Some(ParamType::Object),
            _ => None,
        }
    }

    /// Whether a JSON value conforms to this type.
    ///
    /// Integers are accepted where a `number` is expected; floats with no
    /// fractional part are not accepted as `integer`.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (ParamType::String, Value::String(_)) => true,
            (ParamType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ParamType::Number, Value::Number(_)) => true,
            (ParamType::Boolean, Value::Bool(_)) => true,
            (ParamType::Array, Value::Array(_)) => true,
            (ParamType::Object, Value::Object(_)) => true,
            (ParamType::Any, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter specification for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub description: String,
    pub param_type: ParamType,
    pub required: bool,
    /// Allowed values, when the parameter is an enumeration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
    /// Declared fields of an object parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ParameterSchema>,
    /// Element shape of an array parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParameterSpec>>,
}

impl ParameterSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        param_type: ParamType,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type,
            required,
            enum_values: None,
            properties: None,
            items: None,
        }
    }

    pub fn required(
        name: impl Into<String>,
        description: impl Into<String>,
        param_type: ParamType,
    ) -> Self {
        Self::new(name, description, param_type, true)
    }

    pub fn optional(
        name: impl Into<String>,
        description: impl Into<String>,
        param_type: ParamType,
    ) -> Self {
        Self::new(name, description, param_type, false)
    }

    pub fn with_enum<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_properties(mut self, schema: ParameterSchema) -> Self {
        self.properties = Some(schema);
        self
    }

    pub fn with_items(mut self, item: ParameterSpec) -> Self {
        self.items = Some(Box::new(item));
        self
    }
}

/// Declared shape of a tool's arguments object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub parameters: Vec<ParameterSpec>,
    /// Accept keys that are not declared in `parameters`
    #[serde(default)]
    pub additional_properties: bool,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, param: ParameterSpec) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn allow_additional(mut self) -> Self {
        self.additional_properties = true;
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
    }
}

/// Where a tool implementation lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    BuiltIn,
    Plugin(PluginId),
}

impl ToolSource {
    pub fn is_builtin(&self) -> bool {
        matches!(self, ToolSource::BuiltIn)
    }

    pub fn plugin_id(&self) -> Option<&PluginId> {
        match self {
            ToolSource::Plugin(id) => Some(id),
            ToolSource::BuiltIn => None,
        }
    }
}

impl fmt::Display for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolSource::BuiltIn => f.write_str("built-in"),
            ToolSource::Plugin(id) => write!(f, "plugin:{}", id),
        }
    }
}

/// A callable tool as seen by the model and the orchestrator.
///
/// Immutable once registered: the registry hands out `Arc<ToolDescriptor>`
/// snapshots and never mutates them in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameter_schema: ParameterSchema,
    pub requires_confirmation: bool,
    pub source: ToolSource,
}

impl ToolDescriptor {
    pub fn builtin(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: ParameterSchema::default(),
            requires_confirmation: false,
            source: ToolSource::BuiltIn,
        }
    }

    pub fn plugin(
        plugin: PluginId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: ParameterSchema::default(),
            requires_confirmation: true,
            source: ToolSource::Plugin(plugin),
        }
    }

    pub fn with_parameter(mut self, param: ParameterSpec) -> Self {
        self.parameter_schema.parameters.push(param);
        self
    }

    pub fn with_schema(mut self, schema: ParameterSchema) -> Self {
        self.parameter_schema = schema;
        self
    }

    pub fn with_confirmation(mut self, requires_confirmation: bool) -> Self {
        self.requires_confirmation = requires_confirmation;
        self
    }

    /// Names that models can actually call: non-empty, no whitespace, and
    /// limited to `[A-Za-z0-9_.-]`.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= 128
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }
}
