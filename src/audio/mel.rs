//! Log-mel spectrogram computation
//!
//! Windowed STFT magnitudes projected through a fixed mel filterbank, with
//! the exact clamping and scaling sequence the downstream encoder weights
//! were trained on. The floor-at-max-minus-8 step and the (x + 4) / 4
//! rescale are part of the model contract, not free normalization choices.

use std::f32::consts::PI;
use std::path::Path;

use candle_core::{Device, Tensor};
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;

use crate::audio::decoder::decode_audio;
use crate::audio::filters::FilterbankCache;
use crate::error::AudioError;
use crate::{HOP_LENGTH, N_FFT, N_FREQS, SAMPLE_RATE};

/// Log-mel spectrogram extractor.
///
/// Owns the compute device and the filterbank cache so repeated calls reuse
/// the projection matrices. Construction is cheap; filterbanks load on
/// first use.
pub struct LogMelExtractor {
    device: Device,
    filters: FilterbankCache,
}

impl LogMelExtractor {
    /// Extractor computing on `device` with the bundled filterbank assets.
    pub fn new(device: Device) -> Self {
        Self {
            device,
            filters: FilterbankCache::new(),
        }
    }

    /// Extractor with a caller-provided filterbank cache.
    pub fn with_cache(device: Device, filters: FilterbankCache) -> Self {
        Self { device, filters }
    }

    /// Decode `path` at 16 kHz and compute one spectrogram per channel.
    pub fn compute_file<P: AsRef<Path>>(
        &self,
        path: P,
        n_mels: usize,
        padding: usize,
    ) -> Result<Vec<Tensor>, AudioError> {
        let waveforms = decode_audio(path, SAMPLE_RATE)?;
        self.compute_all(&waveforms, n_mels, padding)
    }

    /// Compute one spectrogram per waveform.
    ///
    /// Channels are independent; there is no cross-channel coupling. The
    /// filterbank is resolved up front so an unsupported band count aborts
    /// before any per-channel work.
    pub fn compute_all(
        &self,
        waveforms: &[Vec<f32>],
        n_mels: usize,
        padding: usize,
    ) -> Result<Vec<Tensor>, AudioError> {
        let filters = self.filters.get(&self.device, n_mels)?;
        debug!(
            channels = waveforms.len(),
            n_mels, padding, "computing log-mel spectrograms"
        );
        waveforms
            .iter()
            .map(|w| self.compute_with_filters(w, &filters, padding))
            .collect()
    }

    /// Compute the spectrogram of a single waveform.
    pub fn compute(
        &self,
        samples: &[f32],
        n_mels: usize,
        padding: usize,
    ) -> Result<Tensor, AudioError> {
        let filters = self.filters.get(&self.device, n_mels)?;
        self.compute_with_filters(samples, &filters, padding)
    }

    fn compute_with_filters(
        &self,
        samples: &[f32],
        filters: &Tensor,
        padding: usize,
    ) -> Result<Tensor, AudioError> {
        let (magnitudes, frames) = if padding > 0 {
            let mut padded = Vec::with_capacity(samples.len() + padding);
            padded.extend_from_slice(samples);
            padded.resize(samples.len() + padding, 0.0);
            stft_magnitudes(&padded)?
        } else {
            stft_magnitudes(samples)?
        };

        let magnitudes = Tensor::from_vec(magnitudes, (N_FREQS, frames), &self.device)?;
        let mel_spec = filters.matmul(&magnitudes)?;

        let log_spec = (mel_spec.maximum(1e-10)?.log()? / std::f64::consts::LN_10)?;
        let max = log_spec.flatten_all()?.max(0)?.to_scalar::<f32>()?;
        let log_spec = log_spec.maximum(f64::from(max) - 8.0)?;
        let log_spec = ((log_spec + 4.0)? / 4.0)?;
        Ok(log_spec)
    }
}

/// Centered STFT squared magnitudes.
///
/// Reflect-pads `n_fft / 2` samples on each side, applies a periodic Hann
/// window at hop intervals, and keeps all `n_fft / 2 + 1` frequency bins.
/// The trailing frame is then discarded to match the reference geometry:
/// a waveform of L samples yields exactly `floor(L / hop)` frames, so a
/// 30-second chunk maps to 3000 frames.
///
/// Returns a frequency-major `(N_FREQS, frames)` buffer and the frame count.
fn stft_magnitudes(samples: &[f32]) -> Result<(Vec<f32>, usize), AudioError> {
    let pad = N_FFT / 2;
    let mut padded = Vec::with_capacity(samples.len() + 2 * pad);
    for i in (1..=pad).rev() {
        padded.push(samples.get(i).copied().unwrap_or(0.0));
    }
    padded.extend_from_slice(samples);
    for i in 0..pad {
        let src = samples.len().checked_sub(i + 2);
        padded.push(src.and_then(|s| samples.get(s)).copied().unwrap_or(0.0));
    }

    let total_frames = (padded.len() - N_FFT) / HOP_LENGTH + 1;
    let frames = total_frames - 1;
    if frames == 0 {
        return Err(AudioError::Shape(format!(
            "waveform too short for analysis: {} samples",
            samples.len()
        )));
    }

    let window = hann_window(N_FFT);
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(N_FFT);

    let mut magnitudes = vec![0f32; N_FREQS * frames];
    let mut frame = vec![Complex::new(0f32, 0f32); N_FFT];
    for t in 0..frames {
        let start = t * HOP_LENGTH;
        for (j, slot) in frame.iter_mut().enumerate() {
            *slot = Complex::new(padded[start + j] * window[j], 0.0);
        }
        fft.process(&mut frame);
        for (k, c) in frame.iter().take(N_FREQS).enumerate() {
            magnitudes[k * frames + t] = c.norm_sqr();
        }
    }

    Ok((magnitudes, frames))
}

/// Periodic Hann window
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> LogMelExtractor {
        LogMelExtractor::new(Device::Cpu)
    }

    #[test]
    fn frame_count_follows_hop_size() {
        for (len, expected) in [(160, 1), (1600, 10), (16_000, 100), (16_001, 100)] {
            let samples = vec![0.0f32; len];
            let (_, frames) = stft_magnitudes(&samples).unwrap();
            assert_eq!(frames, expected, "len={len}");
        }
    }

    #[test]
    fn too_short_waveform_is_a_shape_error() {
        let err = stft_magnitudes(&[0.0f32; 100]).unwrap_err();
        assert!(matches!(err, AudioError::Shape(_)));
    }

    #[test]
    fn silence_maps_to_the_clamp_floor() {
        // All-zero power clamps to 1e-10, log10 = -10, then (-10 + 4) / 4.
        let mel = extractor().compute(&vec![0.0f32; 1600], 80, 0).unwrap();
        assert_eq!(mel.dims(), [80, 10]);
        for row in mel.to_vec2::<f32>().unwrap() {
            for v in row {
                assert!((v + 1.5).abs() < 1e-6, "got {v}");
            }
        }
    }

    #[test]
    fn right_padding_extends_the_frame_axis() {
        let samples = vec![0.0f32; 1600];
        let unpadded = extractor().compute(&samples, 80, 0).unwrap();
        let padded = extractor().compute(&samples, 80, 1600).unwrap();
        assert_eq!(unpadded.dims(), [80, 10]);
        assert_eq!(padded.dims(), [80, 20]);
    }

    #[test]
    fn dynamic_range_is_bounded_by_two() {
        // The floor sits 8 dB under the max and the affine step divides by
        // 4, so max - min can never exceed 2.
        let samples: Vec<f32> = (0..16_000)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin())
            .collect();
        let mel = extractor().compute(&samples, 80, 0).unwrap();

        let values = mel.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
        assert!(max - min <= 2.0 + 1e-5, "range {}", max - min);
    }

    #[test]
    fn unsupported_band_count_aborts_before_channel_work() {
        let err = extractor()
            .compute_all(&[vec![0.0f32; 1600]], 64, 0)
            .unwrap_err();
        assert!(matches!(err, AudioError::Config(64)));
    }

    #[test]
    fn channels_are_computed_independently() {
        let quiet = vec![0.0f32; 1600];
        let loud: Vec<f32> = (0..1600)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin())
            .collect();

        let together = extractor()
            .compute_all(&[quiet.clone(), loud], 80, 0)
            .unwrap();
        let alone = extractor().compute(&quiet, 80, 0).unwrap();

        // The loud channel must not shift the quiet channel's max-relative
        // floor.
        assert_eq!(
            together[0].to_vec2::<f32>().unwrap(),
            alone.to_vec2::<f32>().unwrap()
        );
    }
}
