//! Tool handler trait and call envelope types

use crate::driver::DriverConnector;
use crate::error::{DroverError, DroverResult};
use crate::registry::CapabilityRegistry;
use crate::report::ArtifactSink;
use crate::session::Session;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A named call delivered by the protocol layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke
    pub name: String,
    /// Arguments to pass to the tool
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: HashMap<String, serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Get a typed argument value
    pub fn get_argument<T>(&self, key: &str) -> Option<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.arguments
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get a string argument
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get_argument::<String>(key)
    }

    /// Get a boolean argument
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_argument::<bool>(key)
    }

    /// Get a required string argument, or a typed invalid-arguments error
    pub fn require_string(&self, key: &str) -> DroverResult<String> {
        self.get_string(key)
            .ok_or_else(|| DroverError::invalid_arguments(format!("missing '{key}' argument")))
    }
}

/// Successful output of a tool handler
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Human-readable result text for the call envelope
    pub text: String,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Parameter definition for a tool schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    /// "string", "boolean", "number", "object", "array"
    pub param_type: String,
    pub required: bool,
}

impl ToolParameter {
    /// Create a required string parameter
    pub fn string<S: Into<String>>(name: S, description: S) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type: "string".to_string(),
            required: true,
        }
    }

    /// Create a boolean parameter
    pub fn boolean<S: Into<String>>(name: S, description: S) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type: "boolean".to_string(),
            required: true,
        }
    }

    /// Create an array parameter
    pub fn array<S: Into<String>>(name: S, description: S) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type: "array".to_string(),
            required: true,
        }
    }

    /// Make this parameter optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Input-shape descriptor advertised for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON-schema object for the input parameters
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    pub fn new<S: Into<String>>(name: S, description: S, parameters: Vec<ToolParameter>) -> Self {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in parameters {
            if param.required {
                required.push(param.name.clone());
            }
            properties.insert(
                param.name,
                serde_json::json!({
                    "type": param.param_type,
                    "description": param.description,
                }),
            );
        }

        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// Collaborators injected at startup and shared by every handler
pub struct Services {
    /// Establishes driver connections for `session_connect`/`session_launch`
    pub connector: Box<dyn DriverConnector>,
    /// Writes reports and failure artifacts into the session output directory
    pub artifacts: Arc<dyn ArtifactSink>,
}

/// Everything a handler may touch while executing one call.
///
/// The session is borrowed mutably for the duration of the call; the
/// registry is the live one, so replay always reflects current handlers.
pub struct CallContext<'a> {
    pub session: &'a mut Session,
    pub registry: &'a Arc<CapabilityRegistry>,
    pub services: &'a Arc<Services>,
}

/// One invocable operation. Implementations live in the capability crate.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Globally unique tool name, lowercase with underscores
    fn name(&self) -> &str;

    /// Short human-readable description
    fn description(&self) -> &str;

    /// Input-shape descriptor
    fn schema(&self) -> ToolSchema;

    /// Execute against the calling session's state
    async fn execute(&self, cx: &mut CallContext<'_>, call: &ToolCall)
    -> DroverResult<ToolOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_argument_accessors() {
        let mut arguments = HashMap::new();
        arguments.insert("selector".to_string(), json!("#login"));
        arguments.insert("save".to_string(), json!(true));
        let call = ToolCall::new("page_query", arguments);

        assert_eq!(call.get_string("selector").unwrap(), "#login");
        assert!(call.get_bool("save").unwrap());
        assert!(call.get_string("missing").is_none());
        assert!(matches!(
            call.require_string("missing"),
            Err(DroverError::InvalidArguments(_))
        ));
    }

    #[test]
    fn schema_collects_required_parameters() {
        let schema = ToolSchema::new(
            "page_query",
            "Query the page",
            vec![
                ToolParameter::string("selector", "Element selector"),
                ToolParameter::boolean("save", "Cache the result").optional(),
            ],
        );

        assert_eq!(schema.parameters["required"], json!(["selector"]));
        assert_eq!(
            schema.parameters["properties"]["save"]["type"],
            json!("boolean")
        );
    }
}
