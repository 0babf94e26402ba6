//! Front-end configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use candle_core::Device;
use serde::Deserialize;

use crate::audio::{AudioDecoder, FilterbankCache, LogMelExtractor};
use crate::SAMPLE_RATE;

/// Audio front-end configuration.
///
/// All fields default to the encoder contract (16 kHz, 80 mel bands,
/// `ffmpeg` from `PATH`); a YAML file can override them selectively.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// External decoder binary
    pub ffmpeg: PathBuf,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Mel bands per spectrogram (80 or 128)
    pub n_mels: usize,
    /// Abort decoding after this many seconds (unlimited when absent)
    pub decode_timeout_secs: Option<u64>,
    /// Override for the mel filterbank archive
    pub mel_filters: Option<PathBuf>,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            sample_rate: SAMPLE_RATE,
            n_mels: 80,
            decode_timeout_secs: None,
            mel_filters: None,
        }
    }
}

impl FrontendConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Build the decoder described by this config.
    pub fn decoder(&self) -> AudioDecoder {
        let mut decoder = AudioDecoder::new().with_ffmpeg(&self.ffmpeg);
        if let Some(secs) = self.decode_timeout_secs {
            decoder = decoder.with_timeout(Duration::from_secs(secs));
        }
        decoder
    }

    /// Build a spectrogram extractor computing on `device`.
    pub fn extractor(&self, device: Device) -> LogMelExtractor {
        match &self.mel_filters {
            Some(path) => {
                LogMelExtractor::with_cache(device, FilterbankCache::with_asset_path(path))
            }
            None => LogMelExtractor::new(device),
        }
    }
}
