//! Application configuration: every tunable this crate exposes, loaded
//! from an optional YAML file and overridden by environment variables.
//! CLI flags in `main.rs` take final precedence over both.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub canonical_sample_rate: u32,
    pub canonical_frame_ms: u64,
    pub canonical_samples_per_frame: usize,
    pub jitter_target_frames: usize,
    pub jitter_max_frames: usize,
    pub vad_aggressiveness: u8,
    pub vad_padding_ms: u64,
    pub vad_min_segment_ms: u64,
    pub vad_max_segment_ms: u64,
    pub loudnorm_enabled: bool,
    pub loudnorm_i: f32,
    pub loudnorm_tp: f32,
    pub loudnorm_lra: f32,
    pub underrun_silence_frames: usize,
    pub overflow_drop_oldest: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            canonical_sample_rate: 48_000,
            canonical_frame_ms: 20,
            canonical_samples_per_frame: 960,
            jitter_target_frames: 3,
            jitter_max_frames: 8,
            vad_aggressiveness: 2,
            vad_padding_ms: 200,
            vad_min_segment_ms: 300,
            vad_max_segment_ms: 30_000,
            loudnorm_enabled: true,
            loudnorm_i: -16.0,
            loudnorm_tp: -1.5,
            loudnorm_lra: 11.0,
            underrun_silence_frames: 1,
            overflow_drop_oldest: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub audio_input_adapter: String,
    pub audio_output_adapter: String,
    /// Adapter-specific construction config, e.g. `{"url": "..."}` for
    /// voice-chat or `{"path": "..."}` for file. Passed verbatim to
    /// `AdapterRegistry::get_input`/`get_output`.
    pub input_config: serde_json::Value,
    pub output_config: serde_json::Value,
    /// Whether to start one audio session at boot against the
    /// configured input/output adapter pair. Off by default since the
    /// HTTP text pipeline is the primary ingress surface this crate
    /// exercises in tests; see DESIGN.md.
    pub audio_session_enabled: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            audio_input_adapter: "voice-chat".to_string(),
            audio_output_adapter: "voice-chat".to_string(),
            input_config: serde_json::Value::Null,
            output_config: serde_json::Value::Null,
            audio_session_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub agent_default: String,
    pub agent_routing_enabled: bool,
    pub agent_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_default: "echo".to_string(),
            agent_routing_enabled: true,
            agent_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub session_ttl_minutes: u64,
    pub session_max: usize,
    pub context_max_turns: usize,
    /// `"memory"` (default) or `"sqlite"`; see `session::memory` / `session::sql`.
    pub backend: String,
    /// Required when `backend = "sqlite"`.
    pub sqlite_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: 60,
            session_max: 1_000,
            context_max_turns: 20,
            backend: "memory".to_string(),
            sqlite_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub stt_endpoint: String,
    pub tts_endpoint: String,
    pub llm_endpoint: String,
    pub llm_fallback_endpoint: Option<String>,
    pub guardrail_input_endpoint: Option<String>,
    pub guardrail_output_endpoint: Option<String>,
    pub stt_timeout_ms: u64,
    pub llm_timeout_ms: u64,
    pub tts_timeout_ms: u64,
    pub tts_cache_size: usize,
    pub tts_cache_ttl_s: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stt_endpoint: "http://localhost:9001/transcribe".to_string(),
            tts_endpoint: "http://localhost:9002/synthesize".to_string(),
            llm_endpoint: "http://localhost:9003/v1/chat/completions".to_string(),
            llm_fallback_endpoint: None,
            guardrail_input_endpoint: None,
            guardrail_output_endpoint: None,
            stt_timeout_ms: 8_000,
            llm_timeout_ms: 20_000,
            tts_timeout_ms: 30_000,
            tts_cache_size: 256,
            tts_cache_ttl_s: 3_600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub bearer_tokens: HashSet<String>,
    pub rps_per_client: u32,
    pub window_s: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bearer_tokens: HashSet::new(),
            rps_per_client: 10,
            window_s: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    pub otlp_endpoint: Option<String>,
    pub sampler_ratio: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: None,
            sampler_ratio: 1.0,
        }
    }
}

/// Full application configuration. Loaded via `AppConfig::load`: YAML
/// file (if given) as the base, then environment variables applied on
/// top.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub audio: AudioConfig,
    pub adapters: AdapterConfig,
    pub agents: AgentConfig,
    pub sessions: SessionConfig,
    pub clients: ClientConfig,
    pub auth: AuthConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Loads configuration from an optional YAML file, then applies
    /// environment variable overrides: file first, env on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file: {}", path.display()))?;
                serde_yaml::from_str(&content)
                    .with_context(|| format!("failed to parse config file: {}", path.display()))?
            }
            None => Self::default(),
        };
        if config.bind_addr.is_empty() {
            config.bind_addr = "0.0.0.0:8080".to_string();
        }
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SWITCHBOARD_BIND_ADDR") {
            self.bind_addr = val;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_AUDIO_INPUT_ADAPTER") {
            self.adapters.audio_input_adapter = val;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_AUDIO_OUTPUT_ADAPTER") {
            self.adapters.audio_output_adapter = val;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_AGENT_DEFAULT") {
            self.agents.agent_default = val;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_AGENT_ROUTING_ENABLED") {
            if let Ok(b) = val.parse() {
                self.agents.agent_routing_enabled = b;
            }
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_SESSION_TTL_MINUTES") {
            if let Ok(n) = val.parse() {
                self.sessions.session_ttl_minutes = n;
            }
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_SESSION_MAX") {
            if let Ok(n) = val.parse() {
                self.sessions.session_max = n;
            }
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_CONTEXT_MAX_TURNS") {
            if let Ok(n) = val.parse() {
                self.sessions.context_max_turns = n;
            }
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_SESSION_BACKEND") {
            self.sessions.backend = val;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_SQLITE_PATH") {
            self.sessions.sqlite_path = Some(val);
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_STT_ENDPOINT") {
            self.clients.stt_endpoint = val;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_TTS_ENDPOINT") {
            self.clients.tts_endpoint = val;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_LLM_ENDPOINT") {
            self.clients.llm_endpoint = val;
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_LLM_FALLBACK_ENDPOINT") {
            self.clients.llm_fallback_endpoint = Some(val);
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_BEARER_TOKENS") {
            self.auth.bearer_tokens = val.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_RPS_PER_CLIENT") {
            if let Ok(n) = val.parse() {
                self.auth.rps_per_client = n;
            }
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_OBSERVABILITY_ENABLED") {
            if let Ok(b) = val.parse() {
                self.observability.enabled = b;
            }
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_OTLP_ENDPOINT") {
            self.observability.otlp_endpoint = Some(val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.audio.canonical_sample_rate, 48_000);
        assert_eq!(config.audio.canonical_samples_per_frame, 960);
        assert_eq!(config.sessions.session_ttl_minutes, 60);
        assert_eq!(config.sessions.context_max_turns, 20);
        assert_eq!(config.auth.rps_per_client, 10);
        assert_eq!(config.agents.agent_default, "echo");
    }

    #[test]
    fn env_override_takes_precedence_over_default() {
        std::env::set_var("SWITCHBOARD_AGENT_DEFAULT", "summarizer");
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.agents.agent_default, "summarizer");
        std::env::remove_var("SWITCHBOARD_AGENT_DEFAULT");
    }
}
