//! Voice activity detection: a pluggable trait with a factory for
//! runtime selection, plus a hysteresis segmenter built on top. Two
//! algorithm families that don't require bundling model weights: a
//! primitive energy-threshold detector and a rule-based WebRTC-style
//! detector.

pub mod energy;
pub mod segmenter;
pub mod webrtc_style;

pub use energy::EnergyVAD;
pub use segmenter::VadSegmenter;
pub use webrtc_style::WebRtcStyleVAD;

use crate::error::VadError;

/// Outcome of running VAD over one canonical frame's worth of samples.
#[derive(Debug, Clone, Copy)]
pub struct VadResult {
    pub is_speech: bool,
    pub confidence: f32,
}

/// A pluggable, synchronous voice-activity detector. Detection is pure
/// computation over one frame at a time — no async needed.
pub trait VoiceActivityDetection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Detect speech activity in one canonical frame (f32, [-1.0, 1.0]).
    fn detect(&self, samples: &[f32]) -> Result<VadResult, VadError>;

    /// Consecutive non-speech frames required before declaring silence.
    fn silence_threshold_frames(&self) -> u32 {
        10
    }
}

/// Creates a `VoiceActivityDetection` implementation by name.
pub struct VADFactory;

impl VADFactory {
    /// Supported: `"energy"` (RMS threshold), `"webrtc-style"` (rule-based).
    pub fn create(name: &str) -> Result<Box<dyn VoiceActivityDetection>, VadError> {
        match name {
            "energy" => Ok(Box::new(EnergyVAD::new())),
            "webrtc-style" => Ok(Box::new(WebRtcStyleVAD::new())),
            other => Err(VadError::ModelNotLoaded(format!(
                "unknown VAD backend '{other}'. supported: energy, webrtc-style"
            ))),
        }
    }

    /// Best available backend without needing external model weights:
    /// prefers the rule-based detector over the plain energy one.
    pub fn best_available() -> Box<dyn VoiceActivityDetection> {
        Box::new(WebRtcStyleVAD::new())
    }

    /// Same as `best_available`, tuned to the configured aggressiveness
    /// level (0..=3, higher rejects more borderline speech).
    pub fn best_available_with_aggressiveness(aggressiveness: u8) -> Box<dyn VoiceActivityDetection> {
        Box::new(WebRtcStyleVAD::with_aggressiveness(aggressiveness))
    }
}
