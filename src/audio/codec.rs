//! Audio codec facade (C2): decode, resample, loudness-normalize, and
//! re-encode for egress. Every adapter that does not already speak
//! canonical frames routes through here.

use rubato::{FftFixedInOut, Resampler};

use super::constants::{BYTES_PER_SAMPLE_PCM16, CANONICAL_CHANNELS, CANONICAL_SAMPLES_PER_FRAME, CANONICAL_SAMPLE_RATE};
use super::types::CanonicalFrame;
use crate::error::CodecError;

/// Decode little-endian PCM16 mono bytes at `source_rate` into canonical
/// frames, resampling and chunking/padding as needed so every output
/// frame is exactly `CANONICAL_SAMPLES_PER_FRAME` samples.
pub fn decode_pcm16(
    bytes: &[u8],
    source_rate: u32,
    source_channels: u16,
    starting_sequence: u64,
    base_timestamp_ms: u64,
) -> Result<Vec<CanonicalFrame>, CodecError> {
    if bytes.len() % BYTES_PER_SAMPLE_PCM16 != 0 {
        return Err(CodecError::Malformed(
            "PCM16 byte length is not a multiple of 2".to_string(),
        ));
    }
    if source_channels == 0 {
        return Err(CodecError::Malformed("zero channels".to_string()));
    }

    let raw: Vec<i16> = bytes
        .chunks_exact(BYTES_PER_SAMPLE_PCM16)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();

    let mono: Vec<f32> = if source_channels == CANONICAL_CHANNELS {
        raw.iter().map(|&s| s as f32 / 32768.0).collect()
    } else {
        downmix_i16(&raw, source_channels)
    };

    let resampled = resample_f32(&mono, source_rate, CANONICAL_SAMPLE_RATE)?;
    Ok(chunk_into_frames(&resampled, starting_sequence, base_timestamp_ms))
}

/// Downmix interleaved i16 PCM to mono f32 by channel averaging.
fn downmix_i16(raw: &[i16], channels: u16) -> Vec<f32> {
    let channels = channels as usize;
    raw.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum as f32 / frame.len().max(1) as f32) / 32768.0
        })
        .collect()
}

/// Split a flat f32 stream into fixed-size canonical frames, zero-padding
/// a short trailing chunk so every frame satisfies the shape invariant.
fn chunk_into_frames(samples: &[f32], starting_sequence: u64, base_timestamp_ms: u64) -> Vec<CanonicalFrame> {
    let frame_ms = super::constants::CANONICAL_FRAME_MS;
    samples
        .chunks(CANONICAL_SAMPLES_PER_FRAME)
        .enumerate()
        .map(|(i, chunk)| {
            let mut buf = chunk.to_vec();
            buf.resize(CANONICAL_SAMPLES_PER_FRAME, 0.0);
            let sequence = starting_sequence + i as u64;
            let ts = base_timestamp_ms + i as u64 * frame_ms;
            CanonicalFrame::new(buf, sequence, ts).expect("chunk is padded to exact shape")
        })
        .collect()
}

/// High-quality resample using rubato FFT (mono f32). A no-op when the
/// rates already match.
pub fn resample_f32(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, CodecError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let mut resampler = FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, chunk_size, 1)
        .map_err(|e| CodecError::Malformed(format!("resampler init: {e}")))?;

    let mut output =
        Vec::with_capacity((samples.len() as f64 * to_rate as f64 / from_rate as f64) as usize + chunk_size);

    let input_frames = resampler.input_frames_next();
    let mut pos = 0;

    while pos + input_frames <= samples.len() {
        let chunk = &samples[pos..pos + input_frames];
        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| CodecError::Malformed(format!("resample chunk: {e}")))?;
        output.extend_from_slice(&result[0]);
        pos += input_frames;
    }

    if pos < samples.len() {
        let remaining = &samples[pos..];
        let mut padded = vec![0.0f32; input_frames];
        padded[..remaining.len()].copy_from_slice(remaining);
        let result = resampler
            .process(&[&padded], None)
            .map_err(|e| CodecError::Malformed(format!("resample tail: {e}")))?;
        let take = (remaining.len() as f64 * to_rate as f64 / from_rate as f64) as usize;
        output.extend_from_slice(&result[0][..take.min(result[0].len())]);
    }

    Ok(output)
}

/// Approximate integrated-loudness normalization: scales samples by the
/// gain needed to move the RMS level to `target_lufs` dBFS, then limits
/// true peak to `true_peak_dbfs` and pulls per-block loudness back inside
/// `lra` loudness units of the target. Not a full ITU-R BS.1770
/// implementation — block-RMS approximates integrated/short-term loudness,
/// sufficient for leveling TTS/adapter output before mixing.
pub fn loudness_normalize(samples: &[f32], target_lufs: f32, true_peak_dbfs: f32, lra: f32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let rms = (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
    if rms <= f32::EPSILON {
        return samples.to_vec();
    }
    let target_linear = 10f32.powf(target_lufs / 20.0);
    let gain = target_linear / rms;
    let mut out: Vec<f32> = samples.iter().map(|&s| s * gain).collect();

    limit_loudness_range(&mut out, target_lufs, lra);
    limit_true_peak(&mut out, true_peak_dbfs);
    out.iter().map(|&s| s.clamp(-1.0, 1.0)).collect()
}

/// Scales the whole buffer down, if needed, so its peak sample does not
/// exceed `true_peak_dbfs`.
fn limit_true_peak(samples: &mut [f32], true_peak_dbfs: f32) {
    let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    if peak <= f32::EPSILON {
        return;
    }
    let ceiling = 10f32.powf(true_peak_dbfs / 20.0);
    if peak > ceiling {
        let attenuation = ceiling / peak;
        for s in samples.iter_mut() {
            *s *= attenuation;
        }
    }
}

/// Per-block (one canonical frame, 20ms) RMS normalization that pulls
/// loud or quiet blocks back toward `target_lufs` so the buffer's overall
/// loudness range stays within `lra` loudness units.
fn limit_loudness_range(samples: &mut [f32], target_lufs: f32, lra: f32) {
    if samples.len() <= CANONICAL_SAMPLES_PER_FRAME {
        return;
    }
    let half_range = lra.abs() / 2.0;
    let lower = target_lufs - half_range;
    let upper = target_lufs + half_range;
    for block in samples.chunks_mut(CANONICAL_SAMPLES_PER_FRAME) {
        let block_rms = (block.iter().map(|&s| s * s).sum::<f32>() / block.len() as f32).sqrt();
        if block_rms <= f32::EPSILON {
            continue;
        }
        let block_lufs = 20.0 * block_rms.log10();
        let clamped = block_lufs.clamp(lower, upper);
        if (clamped - block_lufs).abs() < f32::EPSILON {
            continue;
        }
        let gain = 10f32.powf((clamped - block_lufs) / 20.0);
        for s in block.iter_mut() {
            *s *= gain;
        }
    }
}

/// Encode canonical frames to little-endian PCM16 bytes, ready for a
/// playback-side adapter.
pub fn to_playback_pcm(frames: &[CanonicalFrame]) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames.len() * CANONICAL_SAMPLES_PER_FRAME * BYTES_PER_SAMPLE_PCM16);
    for frame in frames {
        for &s in frame.samples() {
            let clamped = s.clamp(-1.0, 1.0);
            let pcm = (clamped * i16::MAX as f32) as i16;
            out.extend_from_slice(&pcm.to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(n: usize, rate: u32, hz: f32) -> Vec<f32> {
        (0..n)
            .map(|i| (i as f32 / rate as f32 * hz * 2.0 * std::f32::consts::PI).sin())
            .collect()
    }

    #[test]
    fn decode_pcm16_produces_exact_frame_shapes() {
        let samples: Vec<i16> = vec![0; CANONICAL_SAMPLES_PER_FRAME * 2 + 10];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let frames = decode_pcm16(&bytes, CANONICAL_SAMPLE_RATE, 1, 0, 0).unwrap();
        assert!(frames.iter().all(|f| f.samples().len() == CANONICAL_SAMPLES_PER_FRAME));
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn decode_pcm16_rejects_odd_byte_length() {
        let err = decode_pcm16(&[0u8; 3], CANONICAL_SAMPLE_RATE, 1, 0, 0).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn resample_noop_when_rates_match() {
        let input = vec![0.1, 0.2, 0.3];
        let output = resample_f32(&input, 48_000, 48_000).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn resample_preserves_roughly_expected_length() {
        let input = tone(16_000, 16_000, 440.0);
        let output = resample_f32(&input, 16_000, 48_000).unwrap();
        let expected = 48_000;
        assert!((output.len() as i64 - expected as i64).unsigned_abs() < 200);
    }

    #[test]
    fn loudness_normalize_is_noop_on_silence() {
        let silence = vec![0.0f32; 960];
        let out = loudness_normalize(&silence, -16.0, -1.5, 11.0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn loudness_normalize_enforces_true_peak_ceiling() {
        let mut loud = vec![0.0f32; 960];
        loud[0] = 1.0;
        loud[1] = -1.0;
        let out = loudness_normalize(&loud, -16.0, -1.5, 11.0);
        let ceiling = 10f32.powf(-1.5 / 20.0);
        assert!(out.iter().all(|&s| s.abs() <= ceiling + 1e-4));
    }

    #[test]
    fn to_playback_pcm_round_trips_amplitude_sign() {
        let frame = CanonicalFrame::new(vec![0.5; CANONICAL_SAMPLES_PER_FRAME], 0, 0).unwrap();
        let bytes = to_playback_pcm(&[frame]);
        let first = i16::from_le_bytes([bytes[0], bytes[1]]);
        assert!(first > 0);
    }
}
