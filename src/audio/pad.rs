//! Waveform length normalization

use candle_core::{shape::Dim, Tensor};

use crate::error::AudioError;

/// Pad or truncate `samples` to exactly `length` elements along `dim`.
///
/// Longer inputs keep their first `length` elements; shorter inputs are
/// zero-padded at the end. Inputs that already match are returned as a
/// cheap clone. Works on tensors of any rank, so batched waveforms can be
/// normalized along an arbitrary axis (`usize` or `D::Minus1`).
pub fn pad_or_trim<D: Dim>(samples: &Tensor, length: usize, dim: D) -> Result<Tensor, AudioError> {
    let dim = dim.to_index(samples.shape(), "pad_or_trim")?;
    let current = samples.dim(dim)?;

    let out = if current > length {
        samples.narrow(dim, 0, length)?
    } else if current < length {
        samples.pad_with_zeros(dim, 0, length - current)?
    } else {
        samples.clone()
    };
    Ok(out)
}

/// [`pad_or_trim`] for a plain sample buffer.
///
/// The usual target is [`crate::N_SAMPLES`], one 30-second chunk.
pub fn pad_or_trim_samples(samples: &[f32], length: usize) -> Vec<f32> {
    let mut out = samples[..samples.len().min(length)].to_vec();
    out.resize(length, 0.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, D};

    fn vec1(t: &Tensor) -> Vec<f32> {
        t.to_vec1::<f32>().unwrap()
    }

    #[test]
    fn trims_longer_input() {
        let x = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], 4, &Device::Cpu).unwrap();
        let y = pad_or_trim(&x, 2, 0).unwrap();
        assert_eq!(vec1(&y), vec![1.0, 2.0]);
    }

    #[test]
    fn pads_shorter_input_with_zeros() {
        let x = Tensor::from_vec(vec![1.0f32, 2.0], 2, &Device::Cpu).unwrap();
        let y = pad_or_trim(&x, 4, D::Minus1).unwrap();
        assert_eq!(vec1(&y), vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn exact_length_is_identity() {
        let x = Tensor::from_vec(vec![1.0f32, 2.0, 3.0], 3, &Device::Cpu).unwrap();
        let y = pad_or_trim(&x, 3, 0).unwrap();
        assert_eq!(vec1(&y), vec![1.0, 2.0, 3.0]);

        // Idempotent: normalizing again changes nothing.
        let z = pad_or_trim(&y, 3, 0).unwrap();
        assert_eq!(vec1(&z), vec1(&y));
    }

    #[test]
    fn batched_input_normalizes_along_chosen_axis() {
        let x = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), &Device::Cpu)
            .unwrap();

        let trimmed = pad_or_trim(&x, 2, 1).unwrap();
        assert_eq!(trimmed.dims(), [2, 2]);
        assert_eq!(
            trimmed.to_vec2::<f32>().unwrap(),
            vec![vec![1.0, 2.0], vec![4.0, 5.0]]
        );

        let padded = pad_or_trim(&x, 3, 0).unwrap();
        assert_eq!(padded.dims(), [3, 3]);
        assert_eq!(
            padded.to_vec2::<f32>().unwrap()[2],
            vec![0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn slice_helper_matches_tensor_semantics() {
        assert_eq!(pad_or_trim_samples(&[1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
        assert_eq!(
            pad_or_trim_samples(&[1.0, 2.0], 4),
            vec![1.0, 2.0, 0.0, 0.0]
        );
        assert_eq!(pad_or_trim_samples(&[], 2), vec![0.0, 0.0]);
    }
}
