//! Tool trait: the abstraction over device capabilities.
//!
//! Tools are what give the agent the ability to act on the board:
//! toggle pins, read sensors, drive LEDs, call webhooks.
//!
//! Dispatch is a name lookup followed by a typed call: arguments are checked
//! against the tool's declared [`InputSchema`] before the handler runs, so
//! handlers only ever see well-typed [`ToolArgs`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{ErrorKind, ToolError};
use crate::message::{Message, TRUNCATION_MARKER};
use crate::transport::ToolDefinition;

/// Default cap on handler output kept in the history.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024;

/// A request from the model to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id (matches the model's tool_use id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Success text or error description
    pub output: String,

    /// Set when the call failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(call_id: impl Into<String>, error: &ToolError) -> Self {
        Self {
            call_id: call_id.into(),
            output: error.to_string(),
            error: Some(error.kind()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Convert into the `tool_result` message appended to the history.
    pub fn into_message(self) -> Message {
        let is_error = self.is_error();
        Message::tool_result(self.call_id, self.output, is_error)
    }
}

// ── Input schema ──────────────────────────────────────────────────────────

/// The JSON type of a declared argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Boolean,
    Integer,
    Number,
    String,
}

impl ParamKind {
    fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Boolean => "boolean",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::String => "string",
        }
    }

    fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Number => value.is_number(),
            ParamKind::String => value.is_string(),
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

/// Declared arguments of a tool, rendered to JSON Schema for the model and
/// used to validate calls before the handler runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    params: Vec<ParamSpec>,
}

impl InputSchema {
    /// A schema with no parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Declare a required argument.
    pub fn required(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
        });
        self
    }

    /// Declare an optional argument.
    pub fn optional(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Render as a JSON Schema object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for p in &self.params {
            properties.insert(
                p.name.clone(),
                serde_json::json!({ "type": p.kind.as_str(), "description": p.description }),
            );
        }

        let mut schema = serde_json::json!({
            "type": "object",
            "properties": properties,
        });

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        if !required.is_empty() {
            schema["required"] = serde_json::json!(required);
        }
        schema
    }

    /// Check `arguments` against the declared parameters.
    ///
    /// `null` is treated as an empty object. Undeclared extra keys are kept
    /// and ignored by handlers.
    pub fn validate(&self, arguments: &serde_json::Value) -> Result<ToolArgs, ToolError> {
        let map = match arguments {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "expected an object, got {other}"
                )));
            }
        };

        for p in &self.params {
            match map.get(&p.name) {
                None | Some(serde_json::Value::Null) if p.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required argument '{}'",
                        p.name
                    )));
                }
                None | Some(serde_json::Value::Null) => {}
                Some(value) if !p.kind.accepts(value) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "'{}' must be {}, got {value}",
                        p.name,
                        p.kind.as_str()
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(ToolArgs(map))
    }
}

/// Validated tool arguments with typed accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(serde_json::Map<String, serde_json::Value>);

impl ToolArgs {
    pub fn new(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }

    fn require<T>(&self, name: &str, value: Option<T>) -> Result<T, ToolError> {
        value.ok_or_else(|| ToolError::InvalidArguments(format!("missing or mistyped '{name}'")))
    }

    pub fn bool(&self, name: &str) -> Result<bool, ToolError> {
        self.require(name, self.opt_bool(name))
    }

    pub fn i64(&self, name: &str) -> Result<i64, ToolError> {
        self.require(name, self.opt_i64(name))
    }

    pub fn f64(&self, name: &str) -> Result<f64, ToolError> {
        self.require(name, self.opt_f64(name))
    }

    pub fn str(&self, name: &str) -> Result<&str, ToolError> {
        self.require(name, self.opt_str(name))
    }

    pub fn opt_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(|v| v.as_bool())
    }

    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(|v| v.as_i64())
    }

    pub fn opt_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(|v| v.as_f64())
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str())
    }
}

// ── Tool trait ────────────────────────────────────────────────────────────

/// The core Tool trait.
///
/// Each device operation implements this trait and is registered in the
/// [`ToolRegistry`] once at setup.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "digital_write").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Declared arguments.
    fn input_schema(&self) -> InputSchema;

    /// Run the tool. An empty string is reported to the model as `"OK"`.
    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema().to_json(),
        }
    }
}

type Handler = Box<dyn Fn(&ToolArgs) -> Result<String, ToolError> + Send + Sync>;

/// A tool built from a plain synchronous closure.
pub struct FnTool {
    name: String,
    description: String,
    schema: InputSchema,
    handler: Handler,
}

impl FnTool {
    pub fn new<F>(name: &str, description: &str, schema: InputSchema, handler: F) -> Self
    where
        F: Fn(&ToolArgs) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema,
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> InputSchema {
        self.schema.clone()
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        (self.handler)(&args)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Look up and execute tools when the model requests them
///
/// Registration order is preserved so the catalog sent to the model is stable.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
    max_output_bytes: usize,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Cap handler output kept in the history (never below the marker length).
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max.max(TRUNCATION_MARKER.len());
        self
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Register a closure-backed tool.
    pub fn register_fn<F>(
        &mut self,
        name: &str,
        description: &str,
        schema: InputSchema,
        handler: F,
    ) -> Result<(), ToolError>
    where
        F: Fn(&ToolArgs) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        self.register(Box::new(FnTool::new(name, description, schema, handler)))
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&i| self.tools[i].as_ref())
    }

    /// All tool definitions, in registration order (for sending to the model).
    pub fn schema_for_model(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
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

    /// Execute a tool call. Never fails: every error becomes an error result.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return ToolResult::failure(&call.id, &ToolError::UnknownTool(call.name.clone()));
        };

        let args = match tool.input_schema().validate(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Rejected tool arguments");
                return ToolResult::failure(&call.id, &e);
            }
        };

        let start = Instant::now();
        let outcome = tool.execute(args).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                debug!(tool = %call.name, duration_ms, "Tool executed");
                let output = if output.is_empty() {
                    "OK".to_string()
                } else {
                    bound_output(output, self.max_output_bytes)
                };
                ToolResult::success(&call.id, output)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, duration_ms, "Tool execution failed");
                let e = match e {
                    ToolError::ExecutionFailed { .. } | ToolError::InvalidArguments(_) => e,
                    other => ToolError::failed(&call.name, other.to_string()),
                };
                ToolResult::failure(&call.id, &e)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Cut `output` to at most `max` bytes, marking the cut.
fn bound_output(mut output: String, max: usize) -> String {
    if output.len() <= max {
        return output;
    }
    let mut cut = max.saturating_sub(TRUNCATION_MARKER.len());
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str(TRUNCATION_MARKER);
    output
}
