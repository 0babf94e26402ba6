//! PCM container parsing and channel de-interleaving
//!
//! The external decoder emits a RIFF/WAVE container on its standard output.
//! Only the fields needed to slice the sample payload are read; everything
//! else in the header is ignored, and malformed containers surface as shape
//! errors further down the pipeline.

use crate::error::AudioError;

/// Byte offset of the channel-count field
const CHANNELS_OFFSET: usize = 22;
/// Byte offset of the declared payload size
const DATA_LEN_OFFSET: usize = 40;
/// Marker that precedes the sample payload
const DATA_MARKER: &[u8; 4] = b"data";
/// Minimum header size, and the fallback payload offset
const HEADER_LEN: usize = 44;
/// End (exclusive) of the window scanned for the payload marker
const MARKER_SCAN_END: usize = 120;

/// Parsed PCM container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    /// Number of interleaved channels
    pub channels: u16,
    /// Payload size in bytes as declared by the header
    pub data_len: u32,
    /// Byte offset where the sample payload begins
    pub data_start: usize,
}

impl WavHeader {
    /// Parse the fixed header fields of a decoded PCM container.
    ///
    /// The decoder streams to a pipe and cannot seek, so metadata chunks may
    /// push the payload past the canonical 44-byte header. The payload start
    /// is located by scanning a bounded window for the `data` marker, falling
    /// back to offset 44 when it is not found.
    pub fn parse(bytes: &[u8]) -> Result<Self, AudioError> {
        if bytes.len() < HEADER_LEN {
            return Err(AudioError::Shape(format!(
                "container too small for a PCM header: {} bytes",
                bytes.len()
            )));
        }

        let channels = u16::from_le_bytes([bytes[CHANNELS_OFFSET], bytes[CHANNELS_OFFSET + 1]]);
        let data_len = u32::from_le_bytes([
            bytes[DATA_LEN_OFFSET],
            bytes[DATA_LEN_OFFSET + 1],
            bytes[DATA_LEN_OFFSET + 2],
            bytes[DATA_LEN_OFFSET + 3],
        ]);

        let mut data_start = HEADER_LEN;
        for i in HEADER_LEN..MARKER_SCAN_END {
            if i + DATA_MARKER.len() > bytes.len() {
                break;
            }
            if &bytes[i..i + DATA_MARKER.len()] == DATA_MARKER {
                data_start = i + DATA_MARKER.len();
                break;
            }
        }

        Ok(Self {
            channels,
            data_len,
            data_start,
        })
    }
}

/// Split an interleaved signed 16-bit payload into per-channel waveforms.
///
/// Channel order is REVERSED relative to interleave order: the last
/// interleaved channel becomes waveform 0. The downstream model was trained
/// against this ordering, so it must be preserved exactly.
///
/// Samples are converted to f32 and scaled by 1/32768 into [-1, 1].
pub fn demux_channels(payload: &[u8], channels: usize) -> Result<Vec<Vec<f32>>, AudioError> {
    if channels == 0 {
        return Err(AudioError::Decode(
            "container reports zero channels".to_string(),
        ));
    }

    let samples: Vec<i16> = payload
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    let mut waveforms = Vec::with_capacity(channels);
    for ch in (0..channels).rev() {
        let wave: Vec<f32> = samples
            .iter()
            .skip(ch)
            .step_by(channels)
            .map(|&s| f32::from(s) / 32768.0)
            .collect();
        waveforms.push(wave);
    }

    Ok(waveforms)
}
