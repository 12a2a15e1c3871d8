//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! run shell commands, schedule itself, and so on. The registry is built once
//! when the agent is constructed and is read-only afterwards.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

type Arguments = serde_json::Map<String, serde_json::Value>;

/// A tool call requested by the model, plus its response once executed.
///
/// `response` is filled in exactly once, after execution and before the
/// record is folded back into the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque call ID (matches the provider's tool_call id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Named arguments, absent when the model sent none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Arguments>,

    /// Tool output, or the failure description if execution failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// Provider-specific data that must travel back with the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Arguments>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Option<Arguments>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            response: None,
            metadata: None,
        }
    }

    /// The arguments as a JSON object (empty when none were sent).
    pub fn arguments(&self) -> serde_json::Value {
        serde_json::Value::Object(self.args.clone().unwrap_or_default())
    }

    /// Attach the execution result. Later calls do not overwrite it.
    pub fn respond(&mut self, response: impl Into<String>) {
        if self.response.is_none() {
            self.response = Some(response.into());
        }
    }
}

/// The core Tool trait.
///
/// Each host capability implements this trait. Tools are registered in the
/// [`ToolRegistry`] and may be invoked concurrently with their siblings from
/// the same model response.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "run_bash_command").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Deserialize a tool's typed arguments, mapping failures to `InvalidArguments`.
pub fn parse_arguments<T: DeserializeOwned>(
    tool_name: &str,
    arguments: serde_json::Value,
) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool_name: tool_name.to_string(),
        reason: e.to_string(),
    })
}

/// Check arguments against the `required` list and primitive property types
/// of a JSON-Schema-style parameter object.
pub fn validate_arguments(
    tool_name: &str,
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> Result<(), ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments {
        tool_name: tool_name.to_string(),
        reason,
    };

    let Some(args) = arguments.as_object() else {
        return Err(invalid("arguments must be an object".into()));
    };

    if let Some(required) = schema["required"].as_array() {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !args.contains_key(key) {
                return Err(invalid(format!("missing required argument '{key}'")));
            }
        }
    }

    let Some(properties) = schema["properties"].as_object() else {
        return Ok(());
    };

    for (key, value) in args {
        let Some(expected) = properties.get(key).and_then(|p| p["type"].as_str()) else {
            continue;
        };
        let matches = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            _ => true,
        };
        if !matches {
            return Err(invalid(format!("argument '{key}' must be of type {expected}")));
        }
    }

    Ok(())
}

/// A registry of available tools, in registration order.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Resolve and execute tools when the LLM requests them
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => {
                warn!(tool = %name, "Replacing previously registered tool");
                self.tools[slot] = tool;
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.index
            .get(name)
            .map(|&slot| self.tools[slot].as_ref())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Validate and execute a tool call.
    pub async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = self.resolve(&call.name)?;
        let arguments = call.arguments();
        validate_arguments(tool.name(), &tool.parameters_schema(), &arguments)?;
        tool.execute(arguments).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
            #[derive(Deserialize)]
            struct Args {
                text: String,
            }
            let args: Args = parse_arguments(self.name(), arguments)?;
            Ok(args.text)
        }
    }

    fn echo_call(args: serde_json::Value) -> ToolCall {
        ToolCall::new("call_1", "echo", args.as_object().cloned())
    }

    #[test]
    fn registry_register_and_resolve() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.resolve("echo").is_ok());
        assert!(matches!(
            registry.resolve("nonexistent"),
            Err(ToolError::NotFound(_))
        ));
    }

    #[test]
    fn registry_definitions_keep_registration_order() {
        struct Named(&'static str);

        #[async_trait]
        impl Tool for Named {
            fn name(&self) -> &str { self.0 }
            fn description(&self) -> &str { "" }
            fn parameters_schema(&self) -> serde_json::Value { json!({"type": "object"}) }
            async fn execute(&self, _: serde_json::Value) -> Result<String, ToolError> {
                Ok(String::new())
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Named("zeta")));
        registry.register(Box::new(Named("alpha")));
        registry.register(Box::new(Named("zeta")));

        assert_eq!(registry.names(), vec!["zeta", "alpha"]);
        assert_eq!(registry.definitions()[1].name, "alpha");
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry
            .execute(&echo_call(json!({"text": "hello world"})))
            .await
            .unwrap();
        assert_eq!(result, "hello world");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall::new("call_1", "nonexistent", None);
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_required_argument_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let err = registry.execute(&echo_call(json!({}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert!(err.to_string().contains("text"));
    }

    #[tokio::test]
    async fn wrong_argument_type_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let err = registry.execute(&echo_call(json!({"text": 42}))).await.unwrap_err();
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn integer_type_rejects_fractions() {
        let schema = json!({"properties": {"n": {"type": "integer"}}});
        assert!(validate_arguments("t", &schema, &json!({"n": 3})).is_ok());
        assert!(validate_arguments("t", &schema, &json!({"n": 3.5})).is_err());
    }

    #[test]
    fn respond_only_sets_once() {
        let mut call = ToolCall::new("c", "echo", None);
        call.respond("first");
        call.respond("second");
        assert_eq!(call.response.as_deref(), Some("first"));
    }
}
