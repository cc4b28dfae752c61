//! Sample format conversion.
//!
//! Turns caller chunks (little-endian `i16` mono at the caller's rate) into the engine's
//! native buffers (`f32` mono at [`OutputFormat::sample_rate`]).
//!
//! Resampling is linear interpolation evaluated independently per chunk: output frame `j`
//! reads source position `j * ratio` (`ratio = rate_in / rate_out`) and blends the two
//! neighbouring input samples. Positions past the last input sample hold the last sample.
//! Nothing is carried between chunks, so the same chunk always converts to the same buffer.

use std::fmt;

use cpal::Sample;

use crate::config::{OutputFormat, PlayerConfig};

/// A converted chunk waiting in (or being rendered from) the output queue.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertedBuffer {
    /// Enqueue order, assigned by the scheduler.
    pub sequence: u64,
    /// Mono `f32` samples at the output rate.
    pub samples: Vec<f32>,
}

impl ConvertedBuffer {
    pub fn new(sequence: u64, samples: Vec<f32>) -> Self {
        Self { sequence, samples }
    }

    pub fn frames(&self) -> usize {
        self.samples.len()
    }
}

/// Largest buffer a single chunk may convert to, in output frames.
pub const MAX_BUFFER_FRAMES: usize = 1 << 24;

/// Why a caller chunk could not be converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkError {
    /// Byte payload that cannot be read as whole `i16` samples.
    OddLength { len: usize },
    /// Conversion would produce more than [`MAX_BUFFER_FRAMES`] frames.
    TooLarge { frames: usize },
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::OddLength { len } => write!(
                f,
                "chunk length {len} is not a multiple of {} bytes",
                PlayerConfig::BYTES_PER_FRAME
            ),
            ChunkError::TooLarge { frames } => write!(
                f,
                "chunk converts to {frames} frames, more than the {MAX_BUFFER_FRAMES} allowed"
            ),
        }
    }
}

impl std::error::Error for ChunkError {}

/// Read consecutive little-endian `i16` samples. Odd lengths are rejected, never truncated.
pub fn decode_le_i16(bytes: &[u8]) -> Result<Vec<i16>, ChunkError> {
    if bytes.len() % PlayerConfig::BYTES_PER_FRAME != 0 {
        return Err(ChunkError::OddLength { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(PlayerConfig::BYTES_PER_FRAME)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Number of output frames produced for `input_frames` at `rate_in` → `rate_out`.
///
/// Equals `ceil(input_frames / ratio)`; computed as `input_frames * rate_out / rate_in` to
/// keep integral cases exact.
pub fn output_frame_count(input_frames: usize, rate_in: f64, rate_out: f64) -> usize {
    if input_frames == 0 {
        return 0;
    }
    (input_frames as f64 * rate_out / rate_in).ceil() as usize
}

/// Normalize and resample mono `i16` samples from `rate_in` to `rate_out`.
pub fn convert(samples: &[i16], rate_in: f64, rate_out: f64) -> Vec<f32> {
    let frames = output_frame_count(samples.len(), rate_in, rate_out);
    if frames == 0 {
        return Vec::new();
    }

    if rate_in == rate_out {
        return samples.iter().map(|s| f32::from_sample(*s)).collect();
    }

    let ratio = rate_in / rate_out;
    let last = samples.len() - 1;
    let mut out = Vec::with_capacity(frames);
    for j in 0..frames {
        let pos = j as f64 * ratio;
        let idx = (pos.floor() as usize).min(last);
        let frac = if idx == last {
            0.0
        } else {
            (pos - idx as f64) as f32
        };
        let a = f32::from_sample(samples[idx]);
        let b = f32::from_sample(samples[(idx + 1).min(last)]);
        out.push(a + (b - a) * frac);
    }
    out
}

/// Decode and convert one caller chunk into the output format.
///
/// The output size is checked before anything is allocated.
pub fn convert_chunk(
    bytes: &[u8],
    input: &PlayerConfig,
    output: &OutputFormat,
) -> Result<Vec<f32>, ChunkError> {
    let samples = decode_le_i16(bytes)?;
    let rate_out = f64::from(output.sample_rate);
    let frames = output_frame_count(samples.len(), input.sample_rate_hz, rate_out);
    if frames > MAX_BUFFER_FRAMES {
        return Err(ChunkError::TooLarge { frames });
    }
    Ok(convert(&samples, input.sample_rate_hz, rate_out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn decode_reads_little_endian_pairs() {
        let bytes = [0x01, 0x00, 0xff, 0x7f, 0x00, 0x80];
        assert_eq!(decode_le_i16(&bytes).unwrap(), vec![1, i16::MAX, i16::MIN]);
    }

    #[test]
    fn decode_rejects_odd_length() {
        let err = decode_le_i16(&[0x01, 0x00, 0x02]).unwrap_err();
        assert_eq!(err, ChunkError::OddLength { len: 3 });
    }

    #[test]
    fn unit_ratio_is_a_pure_cast() {
        let input: Vec<i16> = vec![0, 16_384, -16_384, i16::MAX, i16::MIN, 1];
        let out = convert(&input, 32_000.0, 32_000.0);
        assert_eq!(out.len(), input.len());
        for (s, f) in input.iter().zip(out.iter()) {
            let expected = *s as f32 / 32_768.0;
            assert!((f - expected).abs() < 1e-6, "{s} -> {f}, expected {expected}");
        }
        assert_eq!(out[1], 0.5);
        assert_eq!(out[4], -1.0);
    }

    #[test]
    fn double_rate_input_halves_frame_count() {
        let input = vec![1_000i16; 1_000];
        let out = convert(&input, 64_000.0, 32_000.0);
        assert!((out.len() as i64 - 500).abs() <= 1);
    }

    #[test]
    fn upsampling_interpolates_midpoints() {
        let input: Vec<i16> = vec![0, 8_192, 16_384];
        let out = convert(&input, 16_000.0, 32_000.0);
        assert_eq!(out.len(), 6);
        let expected = [0.0, 0.125, 0.25, 0.375, 0.5, 0.5];
        for (got, want) in out.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6, "{out:?}");
        }
    }

    #[test]
    fn non_integer_ratio_uses_ceil() {
        assert_eq!(output_frame_count(441, 44_100.0, 32_000.0), 320);
        assert_eq!(output_frame_count(100, 44_100.0, 32_000.0), 73);
        assert_eq!(output_frame_count(3, 48_000.0, 32_000.0), 2);
        let out = convert(&vec![100i16; 100], 44_100.0, 32_000.0);
        assert_eq!(out.len(), 73);
    }

    #[test]
    fn conversion_is_deterministic() {
        let input: Vec<i16> = (0..500).map(|i| ((i * 37) % 2_000 - 1_000) as i16).collect();
        let a = convert(&input, 22_050.0, 32_000.0);
        let b = convert(&input, 22_050.0, 32_000.0);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_chunk_converts_to_empty_buffer() {
        assert!(convert(&[], 16_000.0, 32_000.0).is_empty());
        let out = convert_chunk(&[], &PlayerConfig::default(), &OutputFormat::default()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn convert_chunk_uses_player_and_output_rates() {
        let bytes = le_bytes(&[0, 16_384]);
        let out = convert_chunk(&bytes, &PlayerConfig::default(), &OutputFormat::default()).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
        assert!((out[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn oversized_conversion_is_rejected_before_allocating() {
        let slow = PlayerConfig::new(1.0).unwrap();
        let bytes = le_bytes(&[0; 1_000]);
        let err = convert_chunk(&bytes, &slow, &OutputFormat::default()).unwrap_err();
        assert_eq!(err, ChunkError::TooLarge { frames: 32_000_000 });

        let small = convert_chunk(&le_bytes(&[0; 2]), &slow, &OutputFormat::default()).unwrap();
        assert_eq!(small.len(), 64_000);
    }
}
