//! File-backed adapter: reads/writes WAV files via `hound`, useful for
//! offline testing and batch transcription.

use std::path::PathBuf;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use super::{FrameStream, InputAdapter, OutputAdapter};
use crate::audio::codec;
use crate::audio::constants::{BYTES_PER_SAMPLE_PCM16, CANONICAL_SAMPLE_RATE};
use crate::error::AdapterError;

#[derive(Debug, Deserialize)]
struct FileConfig {
    path: PathBuf,
}

fn parse_config(config: &Value) -> Result<FileConfig, AdapterError> {
    serde_json::from_value(config.clone()).map_err(|e| AdapterError::Fatal(format!("invalid file adapter config: {e}")))
}

pub struct FileInputAdapter {
    config: FileConfig,
    active: Arc<Mutex<bool>>,
}

impl FileInputAdapter {
    pub fn from_config(config: &Value) -> Result<Self, AdapterError> {
        Ok(Self {
            config: parse_config(config)?,
            active: Arc::new(Mutex::new(false)),
        })
    }
}

#[async_trait]
impl InputAdapter for FileInputAdapter {
    fn name(&self) -> &'static str {
        "file"
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
        let path = self.config.path.clone();
        let active = self.active.clone();

        Box::pin(stream! {
            let reader = match hound::WavReader::open(&path) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(error = %e, path = %path.display(), "file adapter failed to open WAV");
                    return;
                }
            };
            let spec = reader.spec();
            let source_rate = spec.sample_rate;
            let source_channels = spec.channels;

            let samples: Vec<i16> = reader.into_samples::<i16>().filter_map(Result::ok).collect();
            let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

            match codec::decode_pcm16(&bytes, source_rate, source_channels, 0, 0) {
                Ok(frames) => {
                    for frame in frames {
                        if !*active.lock() {
                            break;
                        }
                        yield frame;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "file adapter failed to decode WAV samples");
                }
            }
        })
    }

    fn is_active(&self) -> bool {
        *self.active.lock()
    }
}

pub struct FileOutputAdapter {
    config: FileConfig,
    playing: Arc<Mutex<bool>>,
}

impl FileOutputAdapter {
    pub fn from_config(config: &Value) -> Result<Self, AdapterError> {
        Ok(Self {
            config: parse_config(config)?,
            playing: Arc::new(Mutex::new(false)),
        })
    }
}

#[async_trait]
impl OutputAdapter for FileOutputAdapter {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn play(&mut self, mut frames: FrameStream) -> Result<(), AdapterError> {
        *self.playing.lock() = true;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: CANONICAL_SAMPLE_RATE,
            bits_per_sample: (BYTES_PER_SAMPLE_PCM16 * 8) as u16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&self.config.path, spec)
            .map_err(|e| AdapterError::Fatal(format!("cannot create WAV file: {e}")))?;

        while let Some(frame) = frames.next().await {
            if !*self.playing.lock() {
                break;
            }
            let pcm = codec::to_playback_pcm(std::slice::from_ref(&frame));
            for chunk in pcm.chunks_exact(BYTES_PER_SAMPLE_PCM16) {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                writer
                    .write_sample(sample)
                    .map_err(|e| AdapterError::Transient(format!("WAV write failed: {e}")))?;
            }
        }
        writer
            .finalize()
            .map_err(|e| AdapterError::Fatal(format!("WAV finalize failed: {e}")))?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_config_missing_path() {
        let err = parse_config(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, AdapterError::Fatal(_)));
    }
}
