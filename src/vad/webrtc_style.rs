//! Rule-based VAD combining energy and zero-crossing rate, tunable by
//! an aggressiveness level. Operates directly over 48kHz f32 canonical
//! samples rather than requiring a resample to 16kHz PCM16, since
//! canonical frames never leave f32/48kHz until the STT boundary.

use super::{VadResult, VoiceActivityDetection};
use crate::error::VadError;

pub struct WebRtcStyleVAD {
    aggressiveness: u8,
    energy_threshold: f32,
    max_zcr: f32,
}

impl WebRtcStyleVAD {
    pub fn new() -> Self {
        Self::with_aggressiveness(2)
    }

    /// `aggressiveness` in 0..=3; higher means stricter about rejecting
    /// noise (higher energy floor, tighter zero-crossing-rate band).
    pub fn with_aggressiveness(aggressiveness: u8) -> Self {
        let aggressiveness = aggressiveness.min(3);
        let energy_threshold = 0.01 + aggressiveness as f32 * 0.01;
        let max_zcr = 0.35 - aggressiveness as f32 * 0.05;
        Self {
            aggressiveness,
            energy_threshold,
            max_zcr,
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    /// Fraction of adjacent-sample sign changes; speech tends to sit in
    /// a mid-range ZCR band, unlike pure tones (low) or hiss (high).
    fn zero_crossing_rate(samples: &[f32]) -> f32 {
        if samples.len() < 2 {
            return 0.0;
        }
        let crossings = samples
            .windows(2)
            .filter(|w| w[0].signum() != w[1].signum() && w[0] != 0.0 && w[1] != 0.0)
            .count();
        crossings as f32 / (samples.len() - 1) as f32
    }
}

impl Default for WebRtcStyleVAD {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceActivityDetection for WebRtcStyleVAD {
    fn name(&self) -> &'static str {
        "webrtc-style"
    }

    fn detect(&self, samples: &[f32]) -> Result<VadResult, VadError> {
        if samples.is_empty() {
            return Err(VadError::InvalidAudio("empty frame".to_string()));
        }
        let rms = Self::rms(samples);
        let zcr = Self::zero_crossing_rate(samples);
        let is_speech = rms >= self.energy_threshold && zcr <= self.max_zcr;

        let confidence = if is_speech {
            // Confidence is inversely related to aggressiveness.
            0.9 - (self.aggressiveness as f32 * 0.1)
        } else {
            0.1
        };

        Ok(VadResult { is_speech, confidence })
    }

    fn silence_threshold_frames(&self) -> u32 {
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_not_speech() {
        let vad = WebRtcStyleVAD::new();
        let result = vad.detect(&vec![0.0; 960]).unwrap();
        assert!(!result.is_speech);
    }

    #[test]
    fn pure_tone_with_speech_like_energy_passes_zcr_band() {
        let vad = WebRtcStyleVAD::new();
        let samples: Vec<f32> = (0..960)
            .map(|i| (i as f32 / 48_000.0 * 180.0 * 2.0 * std::f32::consts::PI).sin() * 0.3)
            .collect();
        let result = vad.detect(&samples).unwrap();
        assert!(result.is_speech);
    }

    #[test]
    fn higher_aggressiveness_lowers_confidence() {
        let lenient = WebRtcStyleVAD::with_aggressiveness(0);
        let strict = WebRtcStyleVAD::with_aggressiveness(3);
        let samples: Vec<f32> = (0..960)
            .map(|i| (i as f32 / 48_000.0 * 180.0 * 2.0 * std::f32::consts::PI).sin() * 0.3)
            .collect();
        let lenient_conf = lenient.detect(&samples).unwrap().confidence;
        let strict_conf = strict.detect(&samples).unwrap().confidence;
        assert!(strict_conf < lenient_conf);
    }
}
