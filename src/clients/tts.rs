//! TTS client (C8): synthesizes text to canonical frames via an
//! external synthesizer, with a content-addressed cache fronting the
//! upstream call.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::HTTP_CLIENT;
use crate::audio::codec;
use crate::audio::constants::{CANONICAL_SAMPLE_RATE, LOUDNORM_TARGET_I, LOUDNORM_TARGET_LRA, LOUDNORM_TARGET_TP};
use crate::audio::CanonicalFrame;
use crate::error::TtsError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_TEXT_CHARS: usize = 2_000;
const CACHE_TTL: Duration = Duration::from_secs(3_600);
const CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct TtsClientConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub max_text_chars: usize,
    pub loudnorm_enabled: bool,
    pub target_lufs: f32,
    pub true_peak_dbfs: f32,
    pub lra: f32,
}

impl TtsClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            max_text_chars: MAX_TEXT_CHARS,
            loudnorm_enabled: true,
            target_lufs: LOUDNORM_TARGET_I,
            true_peak_dbfs: LOUDNORM_TARGET_TP,
            lra: LOUDNORM_TARGET_LRA,
        }
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
}

#[derive(Deserialize)]
struct SynthesizeResponse {
    sample_rate: u32,
    /// Raw PCM16-LE samples, base64-free — transported as a JSON array
    /// to keep the boundary simple; adapters that need binary framing
    /// transcode at C2.
    samples: Vec<i16>,
}

#[derive(Clone, Copy, Eq, PartialEq, Hash)]
struct CacheKey([u8; 32], u64);

fn cache_key(voice_id: &str, text: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    let mut voice_hasher = Sha256::new();
    voice_hasher.update(voice_id.as_bytes());
    let voice_digest: [u8; 32] = voice_hasher.finalize().into();
    let voice_tag = u64::from_le_bytes(voice_digest[0..8].try_into().unwrap());
    CacheKey(digest, voice_tag)
}

struct CacheEntry {
    frames: Vec<CanonicalFrame>,
    created_at: Instant,
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > CACHE_TTL
    }
}

/// LRU-with-TTL cache of synthesized audio, keyed on `(voice_id,
/// sha256(text))`. Cache hits bypass the external synthesizer entirely.
#[derive(Default)]
pub struct TtsCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl TtsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: CacheKey) -> Option<Vec<CanonicalFrame>> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&key)?;
        if entry.is_expired() {
            entries.remove(&key);
            return None;
        }
        entry.last_accessed = Instant::now();
        Some(entry.frames.clone())
    }

    fn put(&self, key: CacheKey, frames: Vec<CanonicalFrame>) {
        let mut entries = self.entries.write();
        entries.retain(|_, e| !e.is_expired());
        if entries.len() >= CACHE_CAPACITY {
            if let Some(oldest) = entries.iter().min_by_key(|(_, e)| e.last_accessed).map(|(k, _)| *k) {
                entries.remove(&oldest);
            }
        }
        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                frames,
                created_at: now,
                last_accessed: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct TtsClient {
    config: TtsClientConfig,
    cache: TtsCache,
}

impl TtsClient {
    pub fn new(config: TtsClientConfig) -> Self {
        Self {
            config,
            cache: TtsCache::new(),
        }
    }

    /// Synthesize text into canonical frames, loudness-normalized.
    /// Rejects text over the configured max length before calling out.
    pub async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<CanonicalFrame>, TtsError> {
        if text.chars().count() > self.config.max_text_chars {
            return Err(TtsError::TooLong(self.config.max_text_chars));
        }

        let key = cache_key(voice_id, text);
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached);
        }

        let request = SynthesizeRequest { text, voice_id };
        let response = HTTP_CLIENT
            .post(&self.config.endpoint)
            .timeout(self.config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    TtsError::Transient(e.to_string())
                } else {
                    TtsError::Fatal(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            if response.status().is_server_error() {
                return Err(TtsError::Transient(format!("upstream returned {}", response.status())));
            }
            return Err(TtsError::Fatal(format!("upstream returned {}", response.status())));
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| TtsError::Fatal(format!("malformed TTS response: {e}")))?;

        let f32_samples: Vec<f32> = parsed.samples.iter().map(|&s| s as f32 / 32768.0).collect();
        let resampled = codec::resample_f32(&f32_samples, parsed.sample_rate, CANONICAL_SAMPLE_RATE)
            .map_err(|e| TtsError::Fatal(e.to_string()))?;
        let normalized = if self.config.loudnorm_enabled {
            codec::loudness_normalize(&resampled, self.config.target_lufs, self.config.true_peak_dbfs, self.config.lra)
        } else {
            resampled
        };

        let frames: Vec<CanonicalFrame> = normalized
            .chunks(crate::audio::constants::CANONICAL_SAMPLES_PER_FRAME)
            .enumerate()
            .map(|(i, chunk)| {
                let mut buf = chunk.to_vec();
                buf.resize(crate::audio::constants::CANONICAL_SAMPLES_PER_FRAME, 0.0);
                CanonicalFrame::new(buf, i as u64, i as u64 * 20).expect("chunk padded to exact shape")
            })
            .collect();

        self.cache.put(key, frames.clone());
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_differs_by_voice_and_text() {
        let a = cache_key("voice-a", "hello");
        let b = cache_key("voice-b", "hello");
        let c = cache_key("voice-a", "goodbye");
        assert_ne!((a.0, a.1), (b.0, b.1));
        assert_ne!((a.0, a.1), (c.0, c.1));
    }

    #[test]
    fn cache_put_then_get_round_trips() {
        let cache = TtsCache::new();
        let key = cache_key("voice-a", "hi");
        let frame = CanonicalFrame::new(vec![0.0; 960], 0, 0).unwrap();
        cache.put(key, vec![frame]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(key).is_some());
    }

    #[tokio::test]
    async fn synthesize_rejects_text_over_max_length() {
        let client = TtsClient::new(TtsClientConfig::new("http://localhost/tts"));
        let long = "a".repeat(MAX_TEXT_CHARS + 1);
        let err = client.synthesize(&long, "voice-a").await.unwrap_err();
        assert!(matches!(err, TtsError::TooLong(_)));
    }
}
