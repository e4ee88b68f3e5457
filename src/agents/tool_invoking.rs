//! Agent that offers the LLM a fixed set of tool schemas and turns any
//! tool calls it chooses into pending `ExternalAction`s. The agent
//! itself never invokes a tool — only the orchestrator dispatches
//! through `ToolRegistry::invoke`, preserving the guardrail/metering
//! guardrail/metering discipline tool execution requires.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Agent, AgentResponse};
use crate::clients::llm::{ChatConstraints, ChatMessage, LlmClient};
use crate::error::SwitchboardError;
use crate::session::ConversationContext;
use crate::tools::{ExternalAction, ToolDescriptor};

const DEFAULT_DEADLINE_MS: u64 = 10_000;

pub struct ToolInvokingAgent {
    llm: LlmClient,
    tool_specs: Vec<Value>,
}

impl ToolInvokingAgent {
    /// `descriptors` is a startup-time snapshot of the tool registry's
    /// contents — the registry is immutable after load, so there is no
    /// staleness risk in capturing it once here.
    pub fn new(llm: LlmClient, descriptors: &[ToolDescriptor]) -> Self {
        let tool_specs = descriptors
            .iter()
            .map(|d| {
                json!({
                    "type": "function",
                    "function": {
                        "name": d.name,
                        "parameters": d.parameter_schema,
                    }
                })
            })
            .collect();
        Self { llm, tool_specs }
    }

    fn parse_actions(&self, raw_calls: &[Value]) -> Vec<ExternalAction> {
        raw_calls
            .iter()
            .filter_map(|call| {
                let function = call.get("function")?;
                let name = function.get("name")?.as_str()?.to_string();
                let arguments = function
                    .get("arguments")
                    .and_then(|a| match a {
                        Value::String(s) => serde_json::from_str(s).ok(),
                        other => Some(other.clone()),
                    })
                    .unwrap_or(Value::Object(Default::default()));
                Some(ExternalAction::new(name, arguments, DEFAULT_DEADLINE_MS))
            })
            .collect()
    }
}

#[async_trait]
impl Agent for ToolInvokingAgent {
    fn name(&self) -> &str {
        "tool-invoking"
    }

    async fn can_handle(&self, _ctx: &ConversationContext, _transcript: &str) -> (bool, i32) {
        (!self.tool_specs.is_empty(), 25)
    }

    async fn handle(&self, ctx: &ConversationContext, transcript: &str) -> Result<AgentResponse, SwitchboardError> {
        let mut messages = Vec::new();
        for (user_turn, assistant_turn) in &ctx.history {
            messages.push(ChatMessage { role: "user".to_string(), content: user_turn.clone() });
            messages.push(ChatMessage { role: "assistant".to_string(), content: assistant_turn.clone() });
        }
        messages.push(ChatMessage { role: "user".to_string(), content: transcript.to_string() });

        let result = self
            .llm
            .chat(&messages, Some(&self.tool_specs), &ChatConstraints::default())
            .await
            .map_err(SwitchboardError::from)?;

        let actions = self.parse_actions(&result.tool_calls);
        let response = if actions.is_empty() {
            AgentResponse::text(result.text)
        } else {
            AgentResponse {
                text: if result.text.is_empty() { None } else { Some(result.text) },
                audio: None,
                actions,
                metadata: Default::default(),
            }
        };
        Ok(response)
    }
}
