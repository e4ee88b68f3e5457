//! Canonical audio types (C1).
//!
//! `CanonicalFrame` is the sole internal audio unit. Every boundary
//! (adapters, STT, TTS) converts into or out of this shape; nothing in
//! between ever touches a different sample rate, channel count, or
//! frame length.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::constants::{CANONICAL_CHANNELS, CANONICAL_SAMPLES_PER_FRAME, CANONICAL_SAMPLE_RATE};
use crate::error::CodecError;

/// An immutable 20ms slab of canonical audio: 48kHz, mono, 960 float32 samples.
#[derive(Debug, Clone)]
pub struct CanonicalFrame {
    samples: Vec<f32>,
    sequence: u64,
    ingress_timestamp_ms: u64,
}

impl CanonicalFrame {
    /// Construct a frame, validating the fixed shape invariant.
    ///
    /// Rejects any buffer that isn't exactly `CANONICAL_SAMPLES_PER_FRAME`
    /// samples — callers that have a partial trailing chunk must pad or
    /// buffer it themselves before calling this.
    pub fn new(samples: Vec<f32>, sequence: u64, ingress_timestamp_ms: u64) -> Result<Self, CodecError> {
        if samples.len() != CANONICAL_SAMPLES_PER_FRAME {
            return Err(CodecError::InvalidFrameShape {
                expected: CANONICAL_SAMPLES_PER_FRAME,
                actual: samples.len(),
            });
        }
        Ok(Self {
            samples,
            sequence,
            ingress_timestamp_ms,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn ingress_timestamp_ms(&self) -> u64 {
        self.ingress_timestamp_ms
    }

    pub fn sample_rate(&self) -> u32 {
        CANONICAL_SAMPLE_RATE
    }

    pub fn channels(&self) -> u16 {
        CANONICAL_CHANNELS
    }

    /// A frame of digital silence at the given sequence/timestamp.
    pub fn silence(sequence: u64, ingress_timestamp_ms: u64) -> Self {
        Self {
            samples: vec![0.0; CANONICAL_SAMPLES_PER_FRAME],
            sequence,
            ingress_timestamp_ms,
        }
    }
}

/// A contiguous sequence of canonical frames belonging to one speech burst.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub session_id: Uuid,
    pub correlation_id: Uuid,
    pub start_ms: u64,
    pub end_ms: u64,
    pub speaker_id: Option<Uuid>,
    pub language_hint: Option<String>,
    frames: Vec<CanonicalFrame>,
}

impl AudioSegment {
    pub fn new(
        session_id: Uuid,
        correlation_id: Uuid,
        frames: Vec<CanonicalFrame>,
        start_ms: u64,
    ) -> Result<Self, CodecError> {
        if frames.is_empty() {
            return Err(CodecError::EmptySegment);
        }
        for w in frames.windows(2) {
            if w[1].sequence() != w[0].sequence() + 1 {
                return Err(CodecError::NonContiguousFrames {
                    prev: w[0].sequence(),
                    next: w[1].sequence(),
                });
            }
        }
        let end_ms = start_ms + frames.len() as u64 * crate::audio::constants::CANONICAL_FRAME_MS;
        Ok(Self {
            session_id,
            correlation_id,
            start_ms,
            end_ms,
            speaker_id: None,
            language_hint: None,
            frames,
        })
    }

    pub fn frames(&self) -> &[CanonicalFrame] {
        &self.frames
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Processing status of an STT result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Ok,
    Empty,
    Failed,
}

/// A word-level timing annotation returned by some STT backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Result of running STT over an `AudioSegment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedSegment {
    pub segment_id: Uuid,
    pub transcript: String,
    pub confidence: Option<f32>,
    pub language: Option<String>,
    pub word_timings: Option<Vec<WordTiming>>,
    pub status: ProcessingStatus,
}

/// Max transcript length enforced at construction time.
const MAX_TRANSCRIPT_CHARS: usize = 8_000;

impl ProcessedSegment {
    pub fn ok(segment_id: Uuid, transcript: String, confidence: Option<f32>, language: Option<String>) -> Self {
        let trimmed = transcript.trim();
        let status = if trimmed.is_empty() {
            ProcessingStatus::Empty
        } else {
            ProcessingStatus::Ok
        };
        let bounded: String = trimmed.chars().take(MAX_TRANSCRIPT_CHARS).collect();
        Self {
            segment_id,
            transcript: bounded,
            confidence,
            language,
            word_timings: None,
            status,
        }
    }

    pub fn failed(segment_id: Uuid) -> Self {
        Self {
            segment_id,
            transcript: String::new(),
            confidence: None,
            language: None,
            word_timings: None,
            status: ProcessingStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> CanonicalFrame {
        CanonicalFrame::new(vec![0.0; CANONICAL_SAMPLES_PER_FRAME], seq, seq * 20).unwrap()
    }

    #[test]
    fn rejects_wrong_shape() {
        let err = CanonicalFrame::new(vec![0.0; 100], 0, 0).unwrap_err();
        assert!(matches!(err, CodecError::InvalidFrameShape { .. }));
    }

    #[test]
    fn segment_duration_matches_frame_count() {
        let frames = vec![frame(0), frame(1), frame(2)];
        let seg = AudioSegment::new(Uuid::new_v4(), Uuid::new_v4(), frames, 0).unwrap();
        assert_eq!(seg.duration_ms(), 60);
        assert_eq!(seg.frame_count(), 3);
    }

    #[test]
    fn rejects_non_contiguous_frames() {
        let frames = vec![frame(0), frame(5)];
        let err = AudioSegment::new(Uuid::new_v4(), Uuid::new_v4(), frames, 0).unwrap_err();
        assert!(matches!(err, CodecError::NonContiguousFrames { .. }));
    }

    #[test]
    fn processed_segment_empty_status_for_blank_transcript() {
        let seg = ProcessedSegment::ok(Uuid::new_v4(), "   ".to_string(), Some(0.9), None);
        assert_eq!(seg.status, ProcessingStatus::Empty);
    }

    #[test]
    fn processed_segment_trims_and_bounds_length() {
        let long = "a".repeat(MAX_TRANSCRIPT_CHARS + 500);
        let seg = ProcessedSegment::ok(Uuid::new_v4(), format!("  {long}  "), None, None);
        assert_eq!(seg.transcript.len(), MAX_TRANSCRIPT_CHARS);
        assert_eq!(seg.status, ProcessingStatus::Ok);
    }
}
