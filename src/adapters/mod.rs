//! I/O adapter framework: pluggable ingress/egress transports registered
//! by name, constructed from runtime configuration. Each concrete
//! adapter is wrapped behind a trait object and registered under a
//! boxed factory by name, the same registry-by-name idiom `VADFactory`
//! uses.

pub mod backoff;
pub mod file;
pub mod voice_chat;
pub mod webrtc;

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::audio::CanonicalFrame;
use crate::error::AdapterError;

pub type FrameStream = Pin<Box<dyn Stream<Item = CanonicalFrame> + Send>>;

/// A source of canonical frames. `stream()` is infinite and not
/// restartable — call `start()` again to get a new adapter instance
/// instead of re-invoking `stream()`.
#[async_trait]
pub trait InputAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    async fn start(&mut self) -> Result<(), AdapterError>;
    async fn stop(&mut self) -> Result<(), AdapterError>;
    fn stream(&mut self) -> FrameStream;
    fn is_active(&self) -> bool;
}

/// A sink for canonical frames.
#[async_trait]
pub trait OutputAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    async fn play(&mut self, frames: FrameStream) -> Result<(), AdapterError>;
    async fn stop(&mut self) -> Result<(), AdapterError>;
    fn is_playing(&self) -> bool;
}

type InputConstructor = Box<dyn Fn(&Value) -> Result<Box<dyn InputAdapter>, AdapterError> + Send + Sync>;
type OutputConstructor = Box<dyn Fn(&Value) -> Result<Box<dyn OutputAdapter>, AdapterError> + Send + Sync>;

/// Maps adapter name to constructor, populated at startup from the
/// `adapters` section of configuration (§6).
#[derive(Default)]
pub struct AdapterRegistry {
    inputs: HashMap<String, InputConstructor>,
    outputs: HashMap<String, OutputConstructor>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with this core's built-in adapters:
    /// voice-chat (WebSocket), file (WAV), webrtc-class (stub transport).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_input("voice-chat", |cfg| Ok(Box::new(voice_chat::VoiceChatInputAdapter::from_config(cfg)?)));
        registry.register_output("voice-chat", |cfg| Ok(Box::new(voice_chat::VoiceChatOutputAdapter::from_config(cfg)?)));
        registry.register_input("file", |cfg| Ok(Box::new(file::FileInputAdapter::from_config(cfg)?)));
        registry.register_output("file", |cfg| Ok(Box::new(file::FileOutputAdapter::from_config(cfg)?)));
        registry.register_input("webrtc-class", |cfg| Ok(Box::new(webrtc::WebRtcClassInputAdapter::from_config(cfg)?)));
        registry.register_output("webrtc-class", |cfg| Ok(Box::new(webrtc::WebRtcClassOutputAdapter::from_config(cfg)?)));
        registry
    }

    pub fn register_input<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(&Value) -> Result<Box<dyn InputAdapter>, AdapterError> + Send + Sync + 'static,
    {
        self.inputs.insert(name.to_string(), Box::new(ctor));
    }

    pub fn register_output<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(&Value) -> Result<Box<dyn OutputAdapter>, AdapterError> + Send + Sync + 'static,
    {
        self.outputs.insert(name.to_string(), Box::new(ctor));
    }

    pub fn get_input(&self, name: &str, config: &Value) -> Result<Box<dyn InputAdapter>, AdapterError> {
        let ctor = self.inputs.get(name).ok_or_else(|| AdapterError::Unknown(name.to_string()))?;
        ctor(config)
    }

    pub fn get_output(&self, name: &str, config: &Value) -> Result<Box<dyn OutputAdapter>, AdapterError> {
        let ctor = self.outputs.get(name).ok_or_else(|| AdapterError::Unknown(name.to_string()))?;
        ctor(config)
    }
}
