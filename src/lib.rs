//! switchboard-core: orchestration fabric for a real-time, bidirectional
//! voice-agent pipeline — audio framing, jitter buffering, VAD
//! segmentation, STT/LLM/TTS client boundaries, agent routing with
//! guardrails and tool dispatch, session/context persistence, and a
//! control plane (health, metrics, auth, rate limiting) in front of it
//! all.

pub mod adapters;
pub mod agents;
pub mod audio;
pub mod clients;
pub mod config;
pub mod control;
pub mod error;
pub mod http;
pub mod jitter_buffer;
pub mod orchestrator;
pub mod session;
pub mod tools;
pub mod vad;

pub use config::AppConfig;
pub use error::{SwitchboardError, SwitchboardResult};
pub use orchestrator::Orchestrator;
