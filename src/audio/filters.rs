//! Mel filterbank loading and caching
//!
//! The projection matrices ship as a compressed `mel_filters.npz` archive
//! with one entry per supported band count (`mel_80`, `mel_128`). When the
//! archive is absent, value-identical matrices are synthesized in code:
//! triangular filters on the Slaney mel scale with slaney area
//! normalization, the same construction the archive was generated with.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use candle_core::{npy::NpzTensors, DType, Device, Tensor};
use tracing::debug;

use crate::error::AudioError;
use crate::{N_FFT, N_FREQS, SAMPLE_RATE};

/// Mel band counts with a bundled filterbank
pub const SUPPORTED_MEL_BANDS: [usize; 2] = [80, 128];

/// Lazily loaded, process-lifetime cache of mel projection matrices.
///
/// Keyed by compute device and band count so each device keeps its own
/// copy of the matrix. First population of a key happens at most once; the
/// lock is held across the load so concurrent callers cannot race it.
/// Lookups hand out `Arc` clones of immutable tensors.
pub struct FilterbankCache {
    asset_path: PathBuf,
    entries: Mutex<HashMap<(String, usize), Arc<Tensor>>>,
}

impl FilterbankCache {
    /// Cache reading from the bundled asset path.
    pub fn new() -> Self {
        Self::with_asset_path(default_asset_path())
    }

    /// Cache reading from a caller-supplied `.npz` archive.
    pub fn with_asset_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            asset_path: path.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the `(n_mels, 201)` projection matrix for `device`.
    ///
    /// Band counts outside [`SUPPORTED_MEL_BANDS`] are a configuration
    /// error.
    pub fn get(&self, device: &Device, n_mels: usize) -> Result<Arc<Tensor>, AudioError> {
        if !SUPPORTED_MEL_BANDS.contains(&n_mels) {
            return Err(AudioError::Config(n_mels));
        }

        let key = (format!("{:?}", device.location()), n_mels);
        let mut entries = self.entries.lock().expect("filterbank cache poisoned");
        if let Some(filters) = entries.get(&key) {
            return Ok(Arc::clone(filters));
        }

        let filters = Arc::new(self.load(device, n_mels)?);
        entries.insert(key, Arc::clone(&filters));
        Ok(filters)
    }

    fn load(&self, device: &Device, n_mels: usize) -> Result<Tensor, AudioError> {
        if self.asset_path.is_file() {
            let name = format!("mel_{n_mels}");
            debug!(asset = %self.asset_path.display(), %name, "loading mel filterbank");
            let npz = NpzTensors::new(&self.asset_path)?;
            let filters = npz.get(&name)?.ok_or_else(|| {
                AudioError::Shape(format!(
                    "{} has no entry {name}",
                    self.asset_path.display()
                ))
            })?;
            return Ok(filters.to_dtype(DType::F32)?.to_device(device)?);
        }

        debug!(n_mels, "mel filterbank archive not found, synthesizing");
        mel_filterbank(n_mels, device)
    }
}

impl Default for FilterbankCache {
    fn default() -> Self {
        Self::new()
    }
}

fn default_asset_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("assets")
        .join("mel_filters.npz")
}

/// Hz to mel, Slaney scale: linear below 1 kHz, logarithmic above.
fn hz_to_mel(freq: f64) -> f64 {
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = 15.0;
    let logstep = 6.4f64.ln() / 27.0;

    if freq >= MIN_LOG_HZ {
        MIN_LOG_MEL + (freq / MIN_LOG_HZ).ln() / logstep
    } else {
        3.0 * freq / 200.0
    }
}

/// Mel to Hz, inverse of [`hz_to_mel`].
fn mel_to_hz(mel: f64) -> f64 {
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = 15.0;
    let logstep = 6.4f64.ln() / 27.0;

    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (logstep * (mel - MIN_LOG_MEL)).exp()
    } else {
        200.0 * mel / 3.0
    }
}

/// Build the `(n_mels, 201)` Slaney-normalized triangular filterbank.
fn mel_filterbank(n_mels: usize, device: &Device) -> Result<Tensor, AudioError> {
    let fft_freqs: Vec<f64> = (0..N_FREQS)
        .map(|k| k as f64 * f64::from(SAMPLE_RATE) / N_FFT as f64)
        .collect();

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(f64::from(SAMPLE_RATE) / 2.0);
    let hz_pts: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64)
        .map(mel_to_hz)
        .collect();

    let mut weights = vec![0f32; n_mels * N_FREQS];
    for m in 0..n_mels {
        let (left, center, right) = (hz_pts[m], hz_pts[m + 1], hz_pts[m + 2]);
        let enorm = 2.0 / (right - left);
        for (k, &freq) in fft_freqs.iter().enumerate() {
            let up = (freq - left) / (center - left);
            let down = (right - freq) / (right - center);
            let w = up.min(down).max(0.0);
            weights[m * N_FREQS + k] = (w * enorm) as f32;
        }
    }

    Ok(Tensor::from_vec(weights, (n_mels, N_FREQS), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_band_counts() {
        let cache = FilterbankCache::new();
        for n_mels in [0, 64, 81, 256] {
            let err = cache.get(&Device::Cpu, n_mels).unwrap_err();
            assert!(matches!(err, AudioError::Config(n) if n == n_mels));
        }
    }

    #[test]
    fn filterbank_shapes() {
        let cache = FilterbankCache::new();
        for n_mels in SUPPORTED_MEL_BANDS {
            let filters = cache.get(&Device::Cpu, n_mels).unwrap();
            assert_eq!(filters.dims(), [n_mels, N_FREQS]);
        }
    }

    #[test]
    fn repeated_gets_are_value_identical() {
        let cache = FilterbankCache::new();
        let a = cache.get(&Device::Cpu, 80).unwrap();
        let b = cache.get(&Device::Cpu, 80).unwrap();
        assert_eq!(
            a.to_vec2::<f32>().unwrap(),
            b.to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn filters_are_finite_nonnegative_and_nonempty() {
        let cache = FilterbankCache::new();
        let filters = cache.get(&Device::Cpu, 80).unwrap();
        let rows = filters.to_vec2::<f32>().unwrap();
        for row in &rows {
            assert!(row.iter().all(|v| v.is_finite() && *v >= 0.0));
        }
        // Every band except possibly the outermost has some support.
        let nonzero_rows = rows
            .iter()
            .filter(|row| row.iter().any(|v| *v > 0.0))
            .count();
        assert!(nonzero_rows >= 79);
    }

    #[test]
    fn mel_scale_round_trips() {
        for hz in [0.0, 200.0, 999.0, 1000.0, 4000.0, 8000.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 1e-6, "{hz} -> {back}");
        }
    }

    #[test]
    fn slaney_break_frequency_is_continuous() {
        let below = hz_to_mel(1000.0 - 1e-9);
        let at = hz_to_mel(1000.0);
        assert!((below - at).abs() < 1e-6);
        assert!((at - 15.0).abs() < 1e-9);
    }
}
