//! LLM client (C9): OpenAI-compatible chat completions with a single
//! retry on transient failure and one fallback-model attempt if the
//! primary rejects or times out.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::HTTP_CLIENT;
use crate::error::LlmError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatConstraints {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub text: String,
    pub served_by: String,
    pub tool_calls: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct LlmModelConfig {
    pub name: String,
    pub endpoint: String,
    pub api_key: Option<String>,
}

pub struct LlmClient {
    primary: LlmModelConfig,
    fallback: Option<LlmModelConfig>,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<Value>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl LlmClient {
    pub fn new(primary: LlmModelConfig, fallback: Option<LlmModelConfig>) -> Self {
        Self {
            primary,
            fallback,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
        constraints: &ChatConstraints,
    ) -> Result<CompletionResult, LlmError> {
        match self.call_model(&self.primary, messages, tools, constraints, true).await {
            Ok(result) => Ok(result),
            Err(primary_err) => {
                if let Some(fallback) = &self.fallback {
                    tracing::warn!(error = %primary_err, "LLM primary failed, invoking fallback");
                    self.call_model(fallback, messages, tools, constraints, false).await
                } else {
                    Err(primary_err)
                }
            }
        }
    }

    async fn call_model(
        &self,
        model: &LlmModelConfig,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
        constraints: &ChatConstraints,
        allow_retry: bool,
    ) -> Result<CompletionResult, LlmError> {
        let request = ChatRequest {
            model: &model.name,
            messages,
            tools,
            max_tokens: constraints.max_tokens,
            temperature: constraints.temperature,
        };

        let attempts = if allow_retry { 2 } else { 1 };
        let mut last_err = None;

        for attempt in 0..attempts {
            let mut builder = HTTP_CLIENT.post(&model.endpoint).timeout(self.timeout).json(&request);
            if let Some(key) = &model.api_key {
                builder = builder.bearer_auth(key);
            }

            match builder.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: ChatResponse = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::Fatal(format!("malformed LLM response: {e}")))?;
                    let choice = parsed
                        .choices
                        .into_iter()
                        .next()
                        .ok_or_else(|| LlmError::Fatal("LLM response had no choices".to_string()))?;
                    return Ok(CompletionResult {
                        text: choice.message.content.unwrap_or_default(),
                        served_by: model.name.clone(),
                        tool_calls: choice.message.tool_calls,
                    });
                }
                Ok(resp) if resp.status().is_server_error() && attempt + 1 < attempts => {
                    last_err = Some(LlmError::Transient(format!("upstream returned {}", resp.status())));
                    continue;
                }
                Ok(resp) => return Err(LlmError::Fatal(format!("upstream returned {}", resp.status()))),
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt + 1 < attempts => {
                    last_err = Some(LlmError::Transient(e.to_string()));
                    continue;
                }
                Err(e) => return Err(LlmError::Fatal(e.to_string())),
            }
        }

        Err(last_err.unwrap_or_else(|| LlmError::Fatal("no attempts made".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str) -> LlmModelConfig {
        LlmModelConfig {
            name: name.to_string(),
            endpoint: format!("http://localhost/{name}"),
            api_key: None,
        }
    }

    #[tokio::test]
    async fn primary_failure_without_fallback_propagates_error() {
        let client = LlmClient::new(model("primary"), None);
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: "hi".to_string(),
        }];
        let err = client.chat(&messages, None, &ChatConstraints::default()).await.unwrap_err();
        assert!(matches!(err, LlmError::Transient(_) | LlmError::Fatal(_)));
    }
}
