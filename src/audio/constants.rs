//! Canonical Audio Constants — SINGLE SOURCE OF TRUTH
//!
//! All audio-related constants MUST be imported from here. Do not
//! hardcode sample rates, frame sizes, or channel counts anywhere else
//! in the pipeline.

/// Canonical sample rate for the internal audio representation (Hz).
pub const CANONICAL_SAMPLE_RATE: u32 = 48_000;

/// Canonical channel count. The pipeline is mono throughout; stereo
/// sources are downmixed at the decode boundary.
pub const CANONICAL_CHANNELS: u16 = 1;

/// Canonical frame duration in milliseconds.
pub const CANONICAL_FRAME_MS: u64 = 20;

/// Canonical samples per frame (48_000 Hz * 20ms / 1000).
pub const CANONICAL_SAMPLES_PER_FRAME: usize = 960;

/// Sample rate the STT boundary expects (16 kHz mono PCM16-LE).
pub const STT_SAMPLE_RATE: u32 = 16_000;

/// Default loudness normalization target, integrated loudness (LUFS).
pub const LOUDNORM_TARGET_I: f32 = -16.0;

/// Default loudness normalization true-peak ceiling (dBFS).
pub const LOUDNORM_TARGET_TP: f32 = -1.5;

/// Default loudness range target (LU).
pub const LOUDNORM_TARGET_LRA: f32 = 11.0;

/// Bytes per sample for egress PCM (16-bit little-endian).
pub const BYTES_PER_SAMPLE_PCM16: usize = 2;
