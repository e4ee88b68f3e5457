//! Summarization agent: condenses a history turn into a one-line
//! summary for `OverflowPolicy::SummarizeOldest`. Never routed to
//! directly — `can_handle` always declines, since it is consumed by
//! the session store's overflow policy rather than the ordinary
//! transcript→response path.
//!
//! `OverflowPolicy::SummarizeOldest` takes a synchronous closure (see
//! `session::mod`), so summarization here is a cheap extractive
//! heuristic rather than an LLM round-trip. Swapping in an LLM-backed
//! summary would require making `ConversationContext::save_context`
//! asynchronous over the summarizer, which is out of scope here (see
//! DESIGN.md).

use async_trait::async_trait;

use super::{Agent, AgentResponse};
use crate::error::SwitchboardError;
use crate::session::{ConversationContext, HistoryTurn};

const MAX_SUMMARY_CHARS: usize = 80;

pub struct SummarizerAgent;

impl SummarizerAgent {
    /// Produce a one-line summary of a single `(transcript, response)`
    /// turn, truncating to `MAX_SUMMARY_CHARS`.
    pub fn summarize(&self, turn: &HistoryTurn) -> String {
        let (transcript, _response) = turn;
        let trimmed = transcript.trim();
        if trimmed.chars().count() <= MAX_SUMMARY_CHARS {
            trimmed.to_string()
        } else {
            let truncated: String = trimmed.chars().take(MAX_SUMMARY_CHARS).collect();
            format!("{truncated}...")
        }
    }

    /// Boxed closure form consumed by `OverflowPolicy::SummarizeOldest`.
    pub fn as_overflow_fn(self: std::sync::Arc<Self>) -> Box<dyn Fn(&HistoryTurn) -> String + Send + Sync> {
        Box::new(move |turn| self.summarize(turn))
    }
}

#[async_trait]
impl Agent for SummarizerAgent {
    fn name(&self) -> &str {
        "summarizer"
    }

    async fn can_handle(&self, _ctx: &ConversationContext, _transcript: &str) -> (bool, i32) {
        (false, i32::MIN)
    }

    async fn handle(&self, _ctx: &ConversationContext, transcript: &str) -> Result<AgentResponse, SwitchboardError> {
        Ok(AgentResponse::text(self.summarize(&(transcript.to_string(), String::new()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_turn_is_unchanged() {
        let agent = SummarizerAgent;
        let summary = agent.summarize(&("hi there".to_string(), "hello".to_string()));
        assert_eq!(summary, "hi there");
    }

    #[test]
    fn long_turn_is_truncated_with_ellipsis() {
        let agent = SummarizerAgent;
        let long_text = "x".repeat(200);
        let summary = agent.summarize(&(long_text, String::new()));
        assert!(summary.ends_with("..."));
        assert!(summary.len() < 200);
    }
}
