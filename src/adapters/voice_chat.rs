//! WebSocket transport adapter: connects to a remote voice-chat media
//! gateway, decoding/encoding PCM16 frames over binary WS messages.
//! Reconnects with exponential backoff on transient disconnects before
//! surfacing `AdapterFatal`.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::backoff::{reconnect_delay, MAX_RECONNECT_ATTEMPTS};
use super::{FrameStream, InputAdapter, OutputAdapter};
use crate::audio::codec;
use crate::audio::constants::{CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};
use crate::error::AdapterError;

#[derive(Debug, Deserialize)]
struct VoiceChatConfig {
    url: String,
    #[serde(default = "default_source_rate")]
    source_rate: u32,
    #[serde(default = "default_channels")]
    source_channels: u16,
}

fn default_source_rate() -> u32 {
    CANONICAL_SAMPLE_RATE
}

fn default_channels() -> u16 {
    CANONICAL_CHANNELS
}

fn parse_config(config: &Value) -> Result<VoiceChatConfig, AdapterError> {
    serde_json::from_value(config.clone()).map_err(|e| AdapterError::Fatal(format!("invalid voice-chat config: {e}")))
}

pub struct VoiceChatInputAdapter {
    config: VoiceChatConfig,
    active: Arc<Mutex<bool>>,
}

impl VoiceChatInputAdapter {
    pub fn from_config(config: &Value) -> Result<Self, AdapterError> {
        Ok(Self {
            config: parse_config(config)?,
            active: Arc::new(Mutex::new(false)),
        })
    }
}

#[async_trait]
impl InputAdapter for VoiceChatInputAdapter {
    fn name(&self) -> &'static str {
        "voice-chat"
    }

    async fn start(&mut self) -> Result<(), AdapterError> {
        *self.active.lock() = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AdapterError> {
        *self.active.lock() = false;
        Ok(())
    }

    fn stream(&mut self) -> FrameStream {
        let url = self.config.url.clone();
        let source_rate = self.config.source_rate;
        let source_channels = self.config.source_channels;
        let active = self.active.clone();

        Box::pin(stream! {
            let mut sequence: u64 = 0;
            let mut attempt: u32 = 0;

            'reconnect: loop {
                if !*active.lock() {
                    break;
                }

                let connected = tokio_tungstenite::connect_async(&url).await;
                let mut ws = match connected {
                    Ok((ws, _)) => {
                        attempt = 0;
                        ws
                    }
                    Err(e) => {
                        attempt += 1;
                        tracing::warn!(error = %e, attempt, "voice-chat adapter connect failed");
                        if attempt >= MAX_RECONNECT_ATTEMPTS {
                            tracing::error!(url, "voice-chat adapter exhausted reconnect attempts");
                            break 'reconnect;
                        }
                        tokio::time::sleep(reconnect_delay(attempt)).await;
                        continue 'reconnect;
                    }
                };

                loop {
                    if !*active.lock() {
                        break 'reconnect;
                    }
                    match ws.next().await {
                        Some(Ok(Message::Binary(bytes))) => {
                            let base_ts = sequence * 20;
                            match codec::decode_pcm16(&bytes, source_rate, source_channels, sequence, base_ts) {
                                Ok(frames) => {
                                    sequence += frames.len() as u64;
                                    for frame in frames {
                                        yield frame;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "voice-chat adapter dropped malformed frame");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            attempt += 1;
                            if attempt >= MAX_RECONNECT_ATTEMPTS {
                                break 'reconnect;
                            }
                            tokio::time::sleep(reconnect_delay(attempt)).await;
                            continue 'reconnect;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "voice-chat adapter transport error");
                            attempt += 1;
                            if attempt >= MAX_RECONNECT_ATTEMPTS {
                                break 'reconnect;
                            }
                            tokio::time::sleep(reconnect_delay(attempt)).await;
                            continue 'reconnect;
                        }
                    }
                }
            }
        })
    }

    fn is_active(&self) -> bool {
        *self.active.lock()
    }
}

pub struct VoiceChatOutputAdapter {
    config: VoiceChatConfig,
    playing: Arc<Mutex<bool>>,
    sender: mpsc::UnboundedSender<Message>,
    _receiver_task: Option<tokio::task::JoinHandle<()>>,
}

impl VoiceChatOutputAdapter {
    pub fn from_config(config: &Value) -> Result<Self, AdapterError> {
        let parsed = parse_config(config)?;
        let (tx, _rx) = mpsc::unbounded_channel();
        Ok(Self {
            config: parsed,
            playing: Arc::new(Mutex::new(false)),
            sender: tx,
            _receiver_task: None,
        })
    }
}

#[async_trait]
impl OutputAdapter for VoiceChatOutputAdapter {
    fn name(&self) -> &'static str {
        "voice-chat"
    }

    async fn play(&mut self, mut frames: FrameStream) -> Result<(), AdapterError> {
        *self.playing.lock() = true;
        let mut attempt = 0;
        let (ws, _) = loop {
            match tokio_tungstenite::connect_async(&self.config.url).await {
                Ok(pair) => break pair,
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        return Err(AdapterError::Fatal(format!("voice-chat output connect failed: {e}")));
                    }
                    tokio::time::sleep(reconnect_delay(attempt)).await;
                }
            }
        };
        let (mut sink, _) = ws.split();

        while let Some(frame) = frames.next().await {
            if !*self.playing.lock() {
                break;
            }
            let bytes = codec::to_playback_pcm(&[frame]);
            if sink.send(Message::Binary(bytes.into())).await.is_err() {
                return Err(AdapterError::Transient("voice-chat output send failed".to_string()));
            }
        }
        *self.playing.lock() = false;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AdapterError> {
        *self.playing.lock() = false;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        *self.playing.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_config_missing_url() {
        let err = parse_config(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, AdapterError::Fatal(_)));
    }

    #[test]
    fn parses_config_with_defaults() {
        let cfg = parse_config(&serde_json::json!({"url": "ws://localhost:9000"})).unwrap();
        assert_eq!(cfg.source_rate, CANONICAL_SAMPLE_RATE);
        assert_eq!(cfg.source_channels, CANONICAL_CHANNELS);
    }
}
