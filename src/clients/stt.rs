//! STT client (C7): converts an `AudioSegment` to 16kHz mono PCM16 and
//! posts it to an external ASR endpoint, with bounded retry on 5xx.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::HTTP_CLIENT;
use crate::adapters::backoff::jittered_delay;
use crate::audio::constants::STT_SAMPLE_RATE;
use crate::audio::types::{ProcessedSegment, WordTiming};
use crate::audio::{codec, AudioSegment};
use crate::error::SttError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
const MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub struct SttClientConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub language_hint: Option<String>,
}

impl SttClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            language_hint: None,
        }
    }
}

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_hint: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    word_timings: Option<Vec<WordTiming>>,
}

pub struct SttClient {
    config: SttClientConfig,
}

impl SttClient {
    pub fn new(config: SttClientConfig) -> Self {
        Self { config }
    }

    /// Transcribe a segment, retrying transient (5xx) failures with
    /// jittered backoff. An empty transcript is `status=empty`, not a
    /// failure.
    pub async fn transcribe(&self, segment: &AudioSegment) -> Result<ProcessedSegment, SttError> {
        let resampled: Vec<f32> = segment
            .frames()
            .iter()
            .flat_map(|f| f.samples().to_vec())
            .collect();
        let resampled = codec::resample_f32(&resampled, segment.frames()[0].sample_rate(), STT_SAMPLE_RATE)
            .map_err(|e| SttError::Fatal(e.to_string()))?;
        let pcm16: Vec<u8> = resampled
            .iter()
            .flat_map(|&s| ((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes())
            .collect();

        let segment_id = Uuid::new_v4();
        let mut last_err = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(jittered_delay(100, 500)).await;
            }

            let request = TranscribeRequest {
                sample_rate: STT_SAMPLE_RATE,
                language_hint: self.config.language_hint.as_deref(),
            };

            let response = HTTP_CLIENT
                .post(&self.config.endpoint)
                .timeout(self.config.timeout)
                .query(&request)
                .body(pcm16.clone())
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: TranscribeResponse = resp
                        .json()
                        .await
                        .map_err(|e| SttError::Fatal(format!("malformed STT response: {e}")))?;
                    let mut processed = ProcessedSegment::ok(segment_id, parsed.transcript, parsed.confidence, parsed.language);
                    processed.word_timings = parsed.word_timings;
                    return Ok(processed);
                }
                Ok(resp) if resp.status().is_server_error() => {
                    last_err = Some(SttError::Transient(format!("upstream returned {}", resp.status())));
                    continue;
                }
                Ok(resp) => {
                    return Err(SttError::Fatal(format!("upstream returned {}", resp.status())));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = Some(SttError::Transient(e.to_string()));
                    continue;
                }
                Err(e) => return Err(SttError::Fatal(e.to_string())),
            }
        }

        Err(last_err.unwrap_or_else(|| SttError::Transient("retries exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_have_no_language_hint() {
        let cfg = SttClientConfig::new("http://localhost/stt");
        assert!(cfg.language_hint.is_none());
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
    }
}
