//! Trivial diagnostic agent: accepts transcripts that look like an
//! explicit echo command and repeats them back verbatim. Doubles as the
//! system's configured default agent (`agent_default=echo`).

use async_trait::async_trait;

use super::{Agent, AgentResponse};
use crate::error::SwitchboardError;
use crate::session::ConversationContext;

pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        "echo"
    }

    async fn can_handle(&self, _ctx: &ConversationContext, transcript: &str) -> (bool, i32) {
        let accepts = transcript.trim().to_lowercase().starts_with("echo");
        (accepts, 100)
    }

    async fn handle(&self, _ctx: &ConversationContext, transcript: &str) -> Result<AgentResponse, SwitchboardError> {
        Ok(AgentResponse::text(transcript.to_string()))
    }
}
