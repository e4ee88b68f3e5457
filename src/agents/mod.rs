//! Agent registry & router: polymorphic response generation selected
//! per transcript+context, using the same name-keyed, lock-free
//! `dashmap` registry idiom as `adapters::AdapterRegistry` and
//! `tools::ToolRegistry`.

pub mod conversational;
pub mod echo;
pub mod intent_router;
pub mod summarizer;
pub mod tool_invoking;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::adapters::FrameStream;
use crate::error::SwitchboardError;
use crate::session::ConversationContext;
use crate::tools::ExternalAction;

const DEFAULT_BUDGET: Duration = Duration::from_secs(15);

/// Result of an agent handling a transcript.
/// At least one of `text`/`audio` is normally set; both may be absent
/// for a pure tool-dispatch turn.
pub struct AgentResponse {
    pub text: Option<String>,
    pub audio: Option<FrameStream>,
    pub actions: Vec<ExternalAction>,
    pub metadata: HashMap<String, String>,
}

impl fmt::Debug for AgentResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentResponse")
            .field("text", &self.text)
            .field("has_audio", &self.audio.is_some())
            .field("actions", &self.actions.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl AgentResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            audio: None,
            actions: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<ExternalAction>) -> Self {
        self.actions = actions;
        self
    }
}

/// Unit of response generation: a pure function from `(context,
/// transcript)` to `AgentResponse`. `can_handle` scores candidacy
/// without side effects; `handle` performs the actual work
/// and must honor the caller's timeout budget itself where it can
/// (e.g. bounding its own LLM call), though the registry also enforces
/// a hard budget around the call.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `(accepts, priority)`. Higher priority wins among
    /// accepting agents; ties are broken by registration order.
    async fn can_handle(&self, ctx: &ConversationContext, transcript: &str) -> (bool, i32);

    async fn handle(&self, ctx: &ConversationContext, transcript: &str) -> Result<AgentResponse, SwitchboardError>;
}

struct RegisteredAgent {
    order: usize,
    agent: Arc<dyn Agent>,
}

/// Name → agent instance, populated at startup. Selection: score every
/// registered agent via `can_handle`, pick the highest-priority
/// accepting agent (ties broken by registration order), else fall back
/// to the configured default agent.
pub struct AgentRegistry {
    agents: DashMap<String, RegisteredAgent>,
    order_counter: RwLock<usize>,
    default_agent: String,
    budget: Duration,
}

impl AgentRegistry {
    pub fn new(default_agent: impl Into<String>) -> Self {
        Self {
            agents: DashMap::new(),
            order_counter: RwLock::new(0),
            default_agent: default_agent.into(),
            budget: DEFAULT_BUDGET,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn register(&self, agent: Arc<dyn Agent>) {
        let mut counter = self.order_counter.write();
        let order = *counter;
        *counter += 1;
        self.agents.insert(agent.name().to_string(), RegisteredAgent { order, agent });
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Score every agent, select, and dispatch within the timeout
    /// budget. Exceeding the budget yields `SwitchboardError::AgentTimeout`.
    pub async fn route(&self, ctx: &ConversationContext, transcript: &str) -> Result<(String, AgentResponse), SwitchboardError> {
        let mut scored: Vec<(usize, i32, String)> = Vec::new();
        for entry in self.agents.iter() {
            let (accepts, priority) = entry.value().agent.can_handle(ctx, transcript).await;
            if accepts {
                scored.push((entry.value().order, priority, entry.key().clone()));
            }
        }

        let selected_name = scored
            .into_iter()
            .max_by_key(|(order, priority, _)| (*priority, std::cmp::Reverse(*order)))
            .map(|(_, _, name)| name)
            .unwrap_or_else(|| self.default_agent.clone());

        let agent = self
            .agents
            .get(&selected_name)
            .map(|e| e.agent.clone())
            .ok_or_else(|| SwitchboardError::Config(format!("no agent registered named '{selected_name}'")))?;

        let name = agent.name().to_string();
        let response = tokio::time::timeout(self.budget, agent.handle(ctx, transcript))
            .await
            .map_err(|_| SwitchboardError::AgentTimeout(crate::error::AgentTimeout))??;

        Ok((name, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConversationContext;
    use uuid::Uuid;

    struct AlwaysAccept {
        name: String,
        priority: i32,
        reply: String,
    }

    #[async_trait]
    impl Agent for AlwaysAccept {
        fn name(&self) -> &str {
            &self.name
        }

        async fn can_handle(&self, _ctx: &ConversationContext, _transcript: &str) -> (bool, i32) {
            (true, self.priority)
        }

        async fn handle(&self, _ctx: &ConversationContext, _transcript: &str) -> Result<AgentResponse, SwitchboardError> {
            Ok(AgentResponse::text(self.reply.clone()))
        }
    }

    struct NeverAccept;

    #[async_trait]
    impl Agent for NeverAccept {
        fn name(&self) -> &str {
            "never"
        }

        async fn can_handle(&self, _ctx: &ConversationContext, _transcript: &str) -> (bool, i32) {
            (false, 0)
        }

        async fn handle(&self, _ctx: &ConversationContext, _transcript: &str) -> Result<AgentResponse, SwitchboardError> {
            unreachable!("never accepts")
        }
    }

    fn ctx() -> ConversationContext {
        ConversationContext::new(Uuid::new_v4())
    }

    #[tokio::test]
    async fn highest_priority_accepting_agent_wins() {
        let registry = AgentRegistry::new("low");
        registry.register(Arc::new(AlwaysAccept { name: "low".into(), priority: 1, reply: "low".into() }));
        registry.register(Arc::new(AlwaysAccept { name: "high".into(), priority: 10, reply: "high".into() }));
        let (name, response) = registry.route(&ctx(), "hi").await.unwrap();
        assert_eq!(name, "high");
        assert_eq!(response.text.as_deref(), Some("high"));
    }

    #[tokio::test]
    async fn falls_back_to_default_when_nothing_accepts() {
        let registry = AgentRegistry::new("fallback");
        registry.register(Arc::new(NeverAccept));
        registry.register(Arc::new(AlwaysAccept { name: "fallback".into(), priority: 0, reply: "default".into() }));
        let (name, response) = registry.route(&ctx(), "hi").await.unwrap();
        assert_eq!(name, "fallback");
        assert_eq!(response.text.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn ties_broken_by_registration_order() {
        let registry = AgentRegistry::new("first");
        registry.register(Arc::new(AlwaysAccept { name: "first".into(), priority: 5, reply: "first".into() }));
        registry.register(Arc::new(AlwaysAccept { name: "second".into(), priority: 5, reply: "second".into() }));
        let (name, _) = registry.route(&ctx(), "hi").await.unwrap();
        assert_eq!(name, "first");
    }
}
