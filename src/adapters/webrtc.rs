//! WebRTC-class transport adapter.
//!
//! Full ICE/DTLS/SRTP negotiation is out of this core's scope — the
//! actual media transport is expected to hand off already-decoded
//! canonical frames through an in-process channel (e.g. from a
//! sidecar gateway). This adapter is the registrable placeholder for
//! that hookup: a real, usable no-op that higher layers can register
//! under the adapter name recognized by configuration.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{FrameStream, InputAdapter, OutputAdapter};
use crate::audio::CanonicalFrame;
use crate::error::AdapterError;

/// Feeds frames into a `WebRtcClassInputAdapter` from whatever process
/// actually terminates the WebRTC media session.
pub type WebRtcFrameSender = mpsc::UnboundedSender<CanonicalFrame>;

pub struct WebRtcClassInputAdapter {
    active: Arc<Mutex<bool>>,
    receiver: Option<mpsc::UnboundedReceiver<CanonicalFrame>>,
}

impl WebRtcClassInputAdapter {
    pub fn from_config(_config: &Value) -> Result<Self, AdapterError> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            active: Arc::new(Mutex::new(false)),
            receiver: Some(rx),
        })
    }

    /// Construct a linked sender/adapter pair for wiring an external
    /// media gateway into this adapter.
    pub fn with_channel() -> (WebRtcFrameSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                active: Arc::new(Mutex::new(false)),
                receiver: Some(rx),
            },
        )
    }
}

#[async_trait]
impl InputAdapter for WebRtcClassInputAdapter {
    fn name(&self) -> &'static str {
        "webrtc-class"
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
        match self.receiver.take() {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => Box::pin(futures::stream::empty()),
        }
    }

    fn is_active(&self) -> bool {
        *self.active.lock()
    }
}

pub struct WebRtcClassOutputAdapter {
    playing: Arc<Mutex<bool>>,
}

impl WebRtcClassOutputAdapter {
    pub fn from_config(_config: &Value) -> Result<Self, AdapterError> {
        Ok(Self {
            playing: Arc::new(Mutex::new(false)),
        })
    }
}

#[async_trait]
impl OutputAdapter for WebRtcClassOutputAdapter {
    fn name(&self) -> &'static str {
        "webrtc-class"
    }

    async fn play(&mut self, mut frames: FrameStream) -> Result<(), AdapterError> {
        *self.playing.lock() = true;
        // No downstream gateway wired in this core; drain the stream so
        // upstream producers don't block on a full channel.
        while frames.next().await.is_some() {
            if !*self.playing.lock() {
                break;
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
