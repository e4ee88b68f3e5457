//! RMS energy threshold VAD: fast and primitive, cannot distinguish
//! speech from other sustained sound (music, TV).

use super::{VadResult, VoiceActivityDetection};
use crate::error::VadError;

pub struct EnergyVAD {
    threshold: f32,
}

impl EnergyVAD {
    pub fn new() -> Self {
        Self { threshold: 0.02 }
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self { threshold }
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyVAD {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceActivityDetection for EnergyVAD {
    fn name(&self) -> &'static str {
        "energy"
    }

    fn detect(&self, samples: &[f32]) -> Result<VadResult, VadError> {
        if samples.is_empty() {
            return Err(VadError::InvalidAudio("empty frame".to_string()));
        }
        let rms = Self::rms(samples);
        let is_speech = rms >= self.threshold;
        let confidence = if is_speech {
            ((rms / self.threshold) - 1.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Ok(VadResult { is_speech, confidence })
    }

    fn silence_threshold_frames(&self) -> u32 {
        // Energy detection is noisy; require more consecutive quiet frames.
        15
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_not_speech() {
        let vad = EnergyVAD::new();
        let result = vad.detect(&vec![0.0; 960]).unwrap();
        assert!(!result.is_speech);
    }

    #[test]
    fn loud_signal_is_speech() {
        let vad = EnergyVAD::new();
        let samples: Vec<f32> = vec![0.5; 960];
        let result = vad.detect(&samples).unwrap();
        assert!(result.is_speech);
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn rejects_empty_input() {
        let vad = EnergyVAD::new();
        assert!(vad.detect(&[]).is_err());
    }
}
