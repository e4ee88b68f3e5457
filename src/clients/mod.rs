//! External service boundary clients: STT, TTS, LLM, and guardrail.
//! Each client owns its own retry/timeout discipline and talks to
//! upstream services over one process-wide `reqwest::Client` reused
//! across call sites rather than constructing one per request.

pub mod guardrail;
pub mod llm;
pub mod stt;
pub mod tts;

use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::Client;

/// Process-wide HTTP client for upstream STT/TTS/LLM/guardrail calls.
pub static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client builds with default TLS backend")
});

pub use guardrail::GuardrailClient;
pub use llm::LlmClient;
pub use stt::SttClient;
pub use tts::TtsClient;
