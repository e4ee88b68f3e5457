//! Hysteresis speech segmenter: turns a continuous canonical frame
//! stream into discrete `AudioSegment`s, independent of which
//! `VoiceActivityDetection` backend is plugged in.
//!
//! A segment starts once a speech-hysteresis threshold of consecutive
//! speech frames is crossed; it ends after a
//! silence-hysteresis duration. 200ms of pre-roll and post-roll padding
//! is drawn from buffered history. Minimum segment 300ms; maximum is a
//! configurable hard cap (default 30s) to bound latency.

use uuid::Uuid;

use super::VoiceActivityDetection;
use crate::audio::constants::CANONICAL_FRAME_MS;
use crate::audio::{AudioSegment, CanonicalFrame};
use crate::error::VadError;

const PRE_ROLL_MS: u64 = 200;
const POST_ROLL_MS: u64 = 200;
const MIN_SEGMENT_MS: u64 = 300;
const DEFAULT_MAX_SEGMENT_MS: u64 = 30_000;

fn frames_for_ms(ms: u64) -> usize {
    (ms / CANONICAL_FRAME_MS) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Speech,
    TrailingSilence,
}

/// Segmenter output for one pushed frame: most frames simply buffer, a
/// completed segment is only produced at segment boundaries.
pub enum SegmenterEvent {
    Buffering,
    SegmentReady(AudioSegment),
    ShortBurstDiscarded,
}

/// Owns the hysteresis state machine and the pre-roll ring buffer.
pub struct VadSegmenter {
    vad: Box<dyn VoiceActivityDetection>,
    session_id: Uuid,
    correlation_id: Uuid,
    state: State,
    pre_roll: Vec<CanonicalFrame>,
    pre_roll_capacity: usize,
    active: Vec<CanonicalFrame>,
    consecutive_speech: u32,
    consecutive_silence: u32,
    speech_hysteresis_frames: u32,
    max_segment_frames: usize,
    segment_start_ms: u64,
    short_bursts_discarded: u64,
}

impl VadSegmenter {
    pub fn new(vad: Box<dyn VoiceActivityDetection>, session_id: Uuid, correlation_id: Uuid) -> Self {
        Self::with_max_segment_ms(vad, session_id, correlation_id, DEFAULT_MAX_SEGMENT_MS)
    }

    pub fn with_max_segment_ms(
        vad: Box<dyn VoiceActivityDetection>,
        session_id: Uuid,
        correlation_id: Uuid,
        max_segment_ms: u64,
    ) -> Self {
        let pre_roll_capacity = frames_for_ms(PRE_ROLL_MS);
        Self {
            speech_hysteresis_frames: 3,
            vad,
            session_id,
            correlation_id,
            state: State::Idle,
            pre_roll: Vec::with_capacity(pre_roll_capacity),
            pre_roll_capacity,
            active: Vec::new(),
            consecutive_speech: 0,
            consecutive_silence: 0,
            max_segment_frames: frames_for_ms(max_segment_ms),
            segment_start_ms: 0,
            short_bursts_discarded: 0,
        }
    }

    pub fn short_bursts_discarded(&self) -> u64 {
        self.short_bursts_discarded
    }

    /// Push one frame; returns what, if anything, became ready.
    pub fn push(&mut self, frame: CanonicalFrame) -> Result<SegmenterEvent, VadError> {
        let result = self.vad.detect(frame.samples())?;

        match self.state {
            State::Idle => self.handle_idle(frame, result.is_speech),
            State::Speech | State::TrailingSilence => self.handle_active(frame, result.is_speech),
        }
    }

    /// Flush any in-progress segment at stream end, applying post-roll
    /// from whatever trailing silence was already buffered.
    pub fn flush(&mut self) -> Result<Option<AudioSegment>, VadError> {
        if self.active.is_empty() {
            return Ok(None);
        }
        self.finalize_segment()
    }

    fn handle_idle(&mut self, frame: CanonicalFrame, is_speech: bool) -> Result<SegmenterEvent, VadError> {
        if is_speech {
            self.consecutive_speech += 1;
            self.pre_roll.push(frame);
            if self.pre_roll.len() > self.pre_roll_capacity {
                self.pre_roll.remove(0);
            }
            if self.consecutive_speech >= self.speech_hysteresis_frames {
                self.start_segment();
            }
            Ok(SegmenterEvent::Buffering)
        } else {
            self.consecutive_speech = 0;
            self.pre_roll.push(frame);
            if self.pre_roll.len() > self.pre_roll_capacity {
                self.pre_roll.remove(0);
            }
            Ok(SegmenterEvent::Buffering)
        }
    }

    fn start_segment(&mut self) {
        self.segment_start_ms = self
            .pre_roll
            .first()
            .map(|f| f.ingress_timestamp_ms())
            .unwrap_or(0);
        self.active = std::mem::take(&mut self.pre_roll);
        self.state = State::Speech;
        self.consecutive_silence = 0;
    }

    fn handle_active(&mut self, frame: CanonicalFrame, is_speech: bool) -> Result<SegmenterEvent, VadError> {
        if is_speech {
            self.consecutive_silence = 0;
            self.state = State::Speech;
            self.active.push(frame);
        } else {
            self.consecutive_silence += 1;
            self.state = State::TrailingSilence;
            self.active.push(frame);
        }

        let silence_threshold = self.vad.silence_threshold_frames();
        let post_roll_frames = frames_for_ms(POST_ROLL_MS) as u32;
        let hit_silence_hysteresis =
            self.state == State::TrailingSilence && self.consecutive_silence >= silence_threshold.max(post_roll_frames);
        let hit_max_duration = self.active.len() >= self.max_segment_frames;

        if hit_silence_hysteresis || hit_max_duration {
            match self.finalize_segment()? {
                Some(segment) => Ok(SegmenterEvent::SegmentReady(segment)),
                None => Ok(SegmenterEvent::ShortBurstDiscarded),
            }
        } else {
            Ok(SegmenterEvent::Buffering)
        }
    }

    fn finalize_segment(&mut self) -> Result<Option<AudioSegment>, VadError> {
        let frames = std::mem::take(&mut self.active);
        self.state = State::Idle;
        self.consecutive_speech = 0;
        self.consecutive_silence = 0;
        self.pre_roll.clear();

        let duration_ms = frames.len() as u64 * CANONICAL_FRAME_MS;
        if duration_ms < MIN_SEGMENT_MS {
            self.short_bursts_discarded += 1;
            return Ok(None);
        }

        let segment = AudioSegment::new(self.session_id, self.correlation_id, frames, self.segment_start_ms)
            .map_err(|e| VadError::InvalidAudio(e.to_string()))?;
        Ok(Some(segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::constants::CANONICAL_SAMPLES_PER_FRAME;
    use crate::vad::VadResult;

    struct ScriptedVad(std::cell::RefCell<std::vec::IntoIter<bool>>);

    impl VoiceActivityDetection for ScriptedVad {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn detect(&self, _samples: &[f32]) -> Result<VadResult, VadError> {
            let is_speech = self.0.borrow_mut().next().unwrap_or(false);
            Ok(VadResult {
                is_speech,
                confidence: if is_speech { 1.0 } else { 0.0 },
            })
        }
        fn silence_threshold_frames(&self) -> u32 {
            5
        }
    }

    fn frame(seq: u64) -> CanonicalFrame {
        CanonicalFrame::new(vec![0.1; CANONICAL_SAMPLES_PER_FRAME], seq, seq * 20).unwrap()
    }

    fn scripted(script: Vec<bool>) -> VadSegmenter {
        VadSegmenter::new(Box::new(ScriptedVad(std::cell::RefCell::new(script.into_iter()))), Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn short_burst_below_minimum_is_discarded() {
        // 3 speech frames to cross hysteresis, then silence immediately.
        let mut script = vec![true, true, true];
        script.extend(std::iter::repeat(false).take(10));
        let mut seg = scripted(script);

        let mut discarded = false;
        for i in 0..13 {
            if let SegmenterEvent::ShortBurstDiscarded = seg.push(frame(i)).unwrap() {
                discarded = true;
            }
        }
        assert!(discarded);
        assert_eq!(seg.short_bursts_discarded(), 1);
    }

    #[test]
    fn long_speech_burst_produces_segment() {
        let mut script = vec![true; 3];
        script.extend(std::iter::repeat(true).take(30));
        script.extend(std::iter::repeat(false).take(10));
        let mut seg = scripted(script);

        let mut produced = None;
        for i in 0..43 {
            if let SegmenterEvent::SegmentReady(s) = seg.push(frame(i)).unwrap() {
                produced = Some(s);
                break;
            }
        }
        let segment = produced.expect("segment should be produced");
        assert!(segment.duration_ms() >= 300);
    }

    #[test]
    fn max_duration_hard_caps_segment_length() {
        let mut script = vec![true; 3];
        script.extend(std::iter::repeat(true).take(2000));
        let mut seg = VadSegmenter::with_max_segment_ms(
            Box::new(ScriptedVad(std::cell::RefCell::new(script.into_iter()))),
            Uuid::new_v4(),
            Uuid::new_v4(),
            200,
        );

        let mut produced = None;
        for i in 0..2003 {
            if let SegmenterEvent::SegmentReady(s) = seg.push(frame(i)).unwrap() {
                produced = Some(s);
                break;
            }
        }
        let segment = produced.expect("segment should be forced closed at max duration");
        assert!(segment.duration_ms() <= 220);
    }
}
