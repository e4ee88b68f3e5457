//! Optional keyword/intent classification meta-agent: participates in
//! routing like any other agent rather than being
//! hard-coded into `AgentRegistry::route`. Handles a small set of fixed
//! intents (greeting, help, time) with canned responses; everything
//! else is left for lower-priority agents to pick up.

use async_trait::async_trait;
use chrono::Utc;

use super::{Agent, AgentResponse};
use crate::error::SwitchboardError;
use crate::session::ConversationContext;

struct Intent {
    keywords: &'static [&'static str],
    respond: fn() -> String,
}

fn greeting_response() -> String {
    "Hello! How can I help you today?".to_string()
}

fn help_response() -> String {
    "You can ask me questions, or say \"echo\" followed by a phrase to have me repeat it.".to_string()
}

fn time_response() -> String {
    format!("It's currently {} UTC.", Utc::now().format("%H:%M"))
}

const INTENTS: &[Intent] = &[
    Intent { keywords: &["hello", "hi there", "good morning", "good evening"], respond: greeting_response },
    Intent { keywords: &["help", "what can you do"], respond: help_response },
    Intent { keywords: &["what time", "current time"], respond: time_response },
];

pub struct IntentRouterAgent;

impl IntentRouterAgent {
    fn matched_intent(transcript: &str) -> Option<&'static Intent> {
        let lower = transcript.to_lowercase();
        INTENTS.iter().find(|intent| intent.keywords.iter().any(|kw| lower.contains(kw)))
    }
}

#[async_trait]
impl Agent for IntentRouterAgent {
    fn name(&self) -> &str {
        "intent-router"
    }

    async fn can_handle(&self, _ctx: &ConversationContext, transcript: &str) -> (bool, i32) {
        (Self::matched_intent(transcript).is_some(), 50)
    }

    async fn handle(&self, _ctx: &ConversationContext, transcript: &str) -> Result<AgentResponse, SwitchboardError> {
        let intent = Self::matched_intent(transcript)
            .ok_or_else(|| SwitchboardError::Internal("intent-router selected without a matching intent".to_string()))?;
        Ok(AgentResponse::text((intent.respond)()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn recognizes_greeting_intent() {
        let agent = IntentRouterAgent;
        let ctx = ConversationContext::new(Uuid::new_v4());
        let (accepts, priority) = agent.can_handle(&ctx, "hello there").await;
        assert!(accepts);
        assert_eq!(priority, 50);
        let response = agent.handle(&ctx, "hello there").await.unwrap();
        assert!(response.text.unwrap().contains("Hello"));
    }

    #[tokio::test]
    async fn declines_unrecognized_transcript() {
        let agent = IntentRouterAgent;
        let ctx = ConversationContext::new(Uuid::new_v4());
        let (accepts, _) = agent.can_handle(&ctx, "please book a flight to paris").await;
        assert!(!accepts);
    }
}
