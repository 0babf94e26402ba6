//! # logmel - audio front-end for speech models
//!
//! Converts arbitrary-format audio into fixed-shape log-mel spectrogram
//! features at 16 kHz, the input representation expected by the downstream
//! speech encoder.
//!
//! ## Features
//!
//! - Decoding of any ffmpeg-readable format via an external decoder process
//! - Per-channel waveform extraction from interleaved 16-bit PCM
//! - Reference-compatible log-mel spectrograms (80 or 128 bands)
//! - GPU-accelerated mel projection via Candle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use candle_core::Device;
//! use logmel::{decode_audio, LogMelExtractor, SAMPLE_RATE};
//!
//! let waveforms = decode_audio("speech.mp3", SAMPLE_RATE)?;
//! let extractor = LogMelExtractor::new(Device::Cpu);
//! let mels = extractor.compute_all(&waveforms, 80, 0)?;
//! ```

#![warn(missing_docs)]
#![allow(rustdoc::missing_crate_level_docs)]

pub mod audio;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use audio::{
    decode_audio, demux_channels, pad_or_trim, pad_or_trim_samples, AudioDecoder,
    FilterbankCache, LogMelExtractor, WavHeader, SUPPORTED_MEL_BANDS,
};
pub use config::FrontendConfig;
pub use error::AudioError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sample rate of all produced waveforms (Hz)
pub const SAMPLE_RATE: u32 = 16_000;

/// STFT window / transform size in samples
pub const N_FFT: usize = 400;

/// Samples between consecutive analysis frames (10 ms)
pub const HOP_LENGTH: usize = 160;

/// Length of one audio chunk in seconds
pub const CHUNK_LENGTH: usize = 30;

/// Samples in one 30-second chunk
pub const N_SAMPLES: usize = CHUNK_LENGTH * SAMPLE_RATE as usize;

/// Spectrogram frames in one 30-second chunk
pub const N_FRAMES: usize = N_SAMPLES / HOP_LENGTH;

/// Frequency bins kept per STFT frame
pub const N_FREQS: usize = N_FFT / 2 + 1;

/// Raw samples per encoder token (the initial convolutions have stride 2)
pub const N_SAMPLES_PER_TOKEN: usize = HOP_LENGTH * 2;

/// Spectrogram frames per second of audio
pub const FRAMES_PER_SECOND: usize = SAMPLE_RATE as usize / HOP_LENGTH;

/// Encoder tokens per second of audio
pub const TOKENS_PER_SECOND: usize = SAMPLE_RATE as usize / N_SAMPLES_PER_TOKEN;
