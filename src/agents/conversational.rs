//! LLM-backed general-purpose agent. Lowest routing priority of the
//! built-ins so specialized agents (echo, intent router, tool-invoking)
//! get first refusal; this is the catch-all that always accepts.

use async_trait::async_trait;

use super::{Agent, AgentResponse};
use crate::clients::llm::{ChatConstraints, ChatMessage, LlmClient};
use crate::error::SwitchboardError;
use crate::session::ConversationContext;

const SYSTEM_PROMPT: &str = "You are a helpful, concise voice assistant. Keep responses short and conversational.";

pub struct ConversationalAgent {
    llm: LlmClient,
}

impl ConversationalAgent {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    fn build_messages(&self, ctx: &ConversationContext, transcript: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        }];
        for (user_turn, assistant_turn) in &ctx.history {
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: user_turn.clone(),
            });
            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: assistant_turn.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: transcript.to_string(),
        });
        messages
    }
}

#[async_trait]
impl Agent for ConversationalAgent {
    fn name(&self) -> &str {
        "conversational"
    }

    async fn can_handle(&self, _ctx: &ConversationContext, _transcript: &str) -> (bool, i32) {
        (true, 0)
    }

    async fn handle(&self, ctx: &ConversationContext, transcript: &str) -> Result<AgentResponse, SwitchboardError> {
        let messages = self.build_messages(ctx, transcript);
        let result = self
            .llm
            .chat(&messages, None, &ChatConstraints::default())
            .await
            .map_err(SwitchboardError::from)?;
        Ok(AgentResponse::text(result.text))
    }
}
