//! Error types for the audio front-end

use thiserror::Error;

/// Errors produced while decoding audio or computing spectrograms
#[derive(Debug, Error)]
pub enum AudioError {
    /// External decoder failure: spawn error, nonzero exit status, empty
    /// output, or a container reporting no channels
    #[error("audio decode failed: {0}")]
    Decode(String),

    /// Unsupported mel band count; only 80 and 128 have filterbanks
    #[error("unsupported number of mel bands: {0} (expected 80 or 128)")]
    Config(usize),

    /// Container or waveform geometry that cannot be processed
    #[error("shape error: {0}")]
    Shape(String),

    /// I/O failure while reading configuration or assets
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Tensor backend failure
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}
