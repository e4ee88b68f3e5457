//! `ToolDescriptor` / `ToolRegistry`: name → descriptor mapping,
//! validated at load time and immutable thereafter. Invocation validates
//! arguments against the descriptor's parameter schema, checks the
//! per-tool rate budget, then executes with the stricter of the tool's
//! own timeout and the caller's per-action deadline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::control::rate_limit::RateLimiter;
use crate::error::ToolError;

/// Schema + policy for a single named tool. Built once at startup and
/// never mutated after `ToolRegistry::load` returns.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    /// JSON-schema-shaped parameter description: `{"required": [...],
    /// "properties": {name: {"type": "string"|"number"|"boolean"|"object"|"array"}}}`.
    pub parameter_schema: Value,
    pub allowed_caller_roles: HashSet<String>,
    pub rate_budget_per_minute: u32,
    pub timeout: Duration,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, parameter_schema: Value) -> Self {
        Self {
            name: name.into(),
            parameter_schema,
            allowed_caller_roles: HashSet::new(),
            rate_budget_per_minute: 60,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_caller_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rate_budget(mut self, per_minute: u32) -> Self {
        self.rate_budget_per_minute = per_minute;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Minimal structural validation: every `required` field is present
    /// and, where `properties` declares a type, the argument's JSON
    /// type matches. Not a full JSON-schema implementation — sufficient
    /// for the flat argument objects tools in this system accept.
    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let obj = args
            .as_object()
            .ok_or_else(|| ToolError::Contract(format!("{}: arguments must be a JSON object", self.name)))?;

        if let Some(required) = self.parameter_schema.get("required").and_then(Value::as_array) {
            for field in required {
                let Some(field_name) = field.as_str() else { continue };
                if !obj.contains_key(field_name) {
                    return Err(ToolError::Contract(format!(
                        "{}: missing required argument '{field_name}'",
                        self.name
                    )));
                }
            }
        }

        if let Some(properties) = self.parameter_schema.get("properties").and_then(Value::as_object) {
            for (field_name, field_schema) in properties {
                let Some(value) = obj.get(field_name) else { continue };
                let Some(expected_type) = field_schema.get("type").and_then(Value::as_str) else { continue };
                if !json_type_matches(value, expected_type) {
                    return Err(ToolError::Contract(format!(
                        "{}: argument '{field_name}' expected type '{expected_type}'",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn json_type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// A pending tool invocation produced by an agent's `AgentResponse`,
/// dispatched by the orchestrator rather than called directly by the
/// agent, preserving guardrail/metering discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalAction {
    pub tool_name: String,
    pub arguments: Value,
    pub deadline_ms: u64,
    pub idempotency_key: String,
}

impl ExternalAction {
    pub fn new(tool_name: impl Into<String>, arguments: Value, deadline_ms: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            deadline_ms,
            idempotency_key: Uuid::new_v4().to_string(),
        }
    }
}

/// Structured tool execution result: `{ok|error, data, elapsed_ms}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub ok: bool,
    pub data: Value,
    pub elapsed_ms: u64,
}

/// Implemented once per concrete tool; registered behind a name in
/// `ToolRegistry`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError>;
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// Name → (descriptor, handler) mapping. Populated once at startup via
/// `register`; treated as immutable thereafter — no runtime `insert`
/// after load. Backed by a lock-free concurrent map so lookups never
/// contend with each other.
pub struct ToolRegistry {
    tools: DashMap<String, RegisteredTool>,
    rate_limiters: DashMap<String, RateLimiter>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            rate_limiters: DashMap::new(),
        }
    }

    /// Registers a tool by name. Called only during startup
    /// composition; calling this after the registry is wired into the
    /// orchestrator is a programming error, not a runtime state this
    /// type prevents.
    pub fn register(&self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) {
        let name = descriptor.name.clone();
        self.tools.insert(name, RegisteredTool { descriptor, handler });
    }

    pub fn descriptor(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.get(name).map(|t| t.descriptor.clone())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate → rate-limit → execute with timeout: whichever is
    /// stricter between the tool's own fixed budget and the caller's
    /// per-action deadline.
    pub async fn invoke(&self, action: &ExternalAction) -> Result<ToolInvocationResult, ToolError> {
        let entry = self
            .tools
            .get(&action.tool_name)
            .ok_or_else(|| ToolError::Contract(format!("unknown tool '{}'", action.tool_name)))?;

        entry.descriptor.validate(&action.arguments)?;

        let per_minute = entry.descriptor.rate_budget_per_minute;
        let limiter = self
            .rate_limiters
            .entry(action.tool_name.clone())
            .or_insert_with(|| RateLimiter::new(per_minute, Duration::from_secs(60)));
        if limiter.check(&action.tool_name).is_err() {
            let retry_after_ms = 60_000 / per_minute.max(1) as u64;
            return Err(ToolError::RateLimited { retry_after_ms });
        }

        let timeout = entry.descriptor.timeout.min(Duration::from_millis(action.deadline_ms));
        let handler = entry.handler.clone();
        let arguments = action.arguments.clone();
        let started = std::time::Instant::now();

        let result = tokio::time::timeout(timeout, handler.execute(arguments)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(data)) => Ok(ToolInvocationResult { ok: true, data, elapsed_ms }),
            Ok(Err(e)) => Err(ToolError::Execution(e.to_string())),
            Err(_) => Err(ToolError::Execution(format!(
                "tool '{}' exceeded timeout of {:?}",
                action.tool_name, timeout
            ))),
        }
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

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
            Ok(arguments)
        }
    }

    fn registry_with_echo() -> ToolRegistry {
        let registry = ToolRegistry::new();
        let descriptor = ToolDescriptor::new(
            "echo",
            serde_json::json!({"required": ["text"], "properties": {"text": {"type": "string"}}}),
        );
        registry.register(descriptor, Arc::new(EchoTool));
        registry
    }

    #[tokio::test]
    async fn invokes_registered_tool_successfully() {
        let registry = registry_with_echo();
        let action = ExternalAction::new("echo", serde_json::json!({"text": "hi"}), 5_000);
        let result = registry.invoke(&action).await.unwrap();
        assert!(result.ok);
        assert_eq!(result.data["text"], "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_contract_error() {
        let registry = registry_with_echo();
        let action = ExternalAction::new("nonexistent", serde_json::json!({}), 5_000);
        let err = registry.invoke(&action).await.unwrap_err();
        assert!(matches!(err, ToolError::Contract(_)));
    }

    #[tokio::test]
    async fn missing_required_argument_is_contract_error() {
        let registry = registry_with_echo();
        let action = ExternalAction::new("echo", serde_json::json!({}), 5_000);
        let err = registry.invoke(&action).await.unwrap_err();
        assert!(matches!(err, ToolError::Contract(_)));
    }

    #[tokio::test]
    async fn wrong_argument_type_is_contract_error() {
        let registry = registry_with_echo();
        let action = ExternalAction::new("echo", serde_json::json!({"text": 5}), 5_000);
        let err = registry.invoke(&action).await.unwrap_err();
        assert!(matches!(err, ToolError::Contract(_)));
    }

    struct SlowTool;

    #[async_trait]
    impl ToolHandler for SlowTool {
        async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(arguments)
        }
    }

    #[tokio::test]
    async fn per_action_deadline_overrides_a_looser_descriptor_timeout() {
        let registry = ToolRegistry::new();
        let descriptor = ToolDescriptor::new("slow", serde_json::json!({}))
            .with_timeout(Duration::from_secs(10));
        registry.register(descriptor, Arc::new(SlowTool));

        let action = ExternalAction::new("slow", serde_json::json!({}), 20);
        let err = registry.invoke(&action).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }
}
