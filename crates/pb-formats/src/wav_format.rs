//! WAV encoding and decoding.

use crate::FormatError;
use pb_ir::SampleBuffer;
use std::io::Write;

const FORMAT_PCM: u16 = 1;
const FORMAT_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

// --- Writing ---

/// Encode interleaved `[-1, 1]` float samples as 16-bit PCM WAV.
pub fn samples_to_wav(samples: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
    let channels = channels.max(1);
    let bits_per_sample: u16 = 16;
    let block_align = channels * (bits_per_sample / 8);
    let frames = samples.len() / channels as usize;
    let data_size = (frames * block_align as usize) as u32;

    let mut buf = Vec::with_capacity(44 + data_size as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &s in &samples[..frames * channels as usize] {
        let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
        buf.extend_from_slice(&((s * 32767.0).round() as i16).to_le_bytes());
    }
    buf
}

pub fn write_wav(
    w: &mut impl Write,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> std::io::Result<()> {
    w.write_all(&samples_to_wav(samples, channels, sample_rate))
}

// --- Reading ---

/// Decode a WAV file from raw bytes. Handles 8/16/24-bit integer PCM and
/// 32-bit float, plain or extensible.
pub fn load_wav(data: &[u8]) -> Result<SampleBuffer, FormatError> {
    let header = parse_header(data)?;
    let end = header.data_offset.saturating_add(header.data_size).min(data.len());
    let raw = &data[header.data_offset..end];
    let samples = decode(raw, &header)?;
    let buffer = SampleBuffer::new(samples, header.num_channels, header.sample_rate)?;
    log::debug!(
        "decoded WAV: {} frames, {} ch, {} Hz, {} bit",
        buffer.frames(),
        header.num_channels,
        header.sample_rate,
        header.bits_per_sample
    );
    Ok(buffer)
}

struct WavHeader {
    format: u16,
    num_channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    data_offset: usize,
    data_size: usize,
}

fn parse_header(data: &[u8]) -> Result<WavHeader, FormatError> {
    if data.len() < 12 {
        return Err(FormatError::UnexpectedEof);
    }
    if &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(FormatError::InvalidHeader);
    }

    let mut pos = 12;
    let mut fmt: Option<(u16, u16, u32, u16)> = None;
    let mut data_chunk: Option<(usize, usize)> = None;

    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let chunk_size = read_u32_le(data, pos + 4) as usize;

        if chunk_id == b"fmt " {
            if chunk_size < 16 || pos + 24 > data.len() {
                return Err(FormatError::UnexpectedEof);
            }
            let mut format = read_u16_le(data, pos + 8);
            let channels = read_u16_le(data, pos + 10);
            let rate = read_u32_le(data, pos + 12);
            let bits = read_u16_le(data, pos + 22);
            // extensible: the real tag is the first two bytes of the sub-format GUID
            if format == FORMAT_EXTENSIBLE && chunk_size >= 40 && pos + 34 <= data.len() {
                format = read_u16_le(data, pos + 32);
            }
            fmt = Some((format, channels, rate, bits));
        } else if chunk_id == b"data" {
            data_chunk = Some((pos + 8, chunk_size));
        }

        pos = pos.saturating_add(8).saturating_add(chunk_size);
        if pos % 2 != 0 {
            pos = pos.saturating_add(1);
        }
    }

    let (format, num_channels, sample_rate, bits_per_sample) = fmt.ok_or(FormatError::InvalidHeader)?;
    let (data_offset, data_size) = data_chunk.ok_or(FormatError::InvalidHeader)?;

    match (format, bits_per_sample) {
        (FORMAT_PCM, 8 | 16 | 24) | (FORMAT_FLOAT, 32) => {}
        (format, bits) => return Err(FormatError::Unsupported { format, bits }),
    }

    Ok(WavHeader { format, num_channels, sample_rate, bits_per_sample, data_offset, data_size })
}

fn decode(raw: &[u8], header: &WavHeader) -> Result<Vec<f32>, FormatError> {
    let samples = match (header.format, header.bits_per_sample) {
        // 8-bit WAV is unsigned, centered on 128
        (FORMAT_PCM, 8) => raw.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
        (FORMAT_PCM, 16) => raw
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
            .collect(),
        (FORMAT_PCM, 24) => raw
            .chunks_exact(3)
            .map(|c| (i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8) as f32 / 8_388_608.0)
            .collect(),
        (FORMAT_FLOAT, 32) => raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        (format, bits) => return Err(FormatError::Unsupported { format, bits }),
    };
    Ok(trim_partial_frame(samples, header.num_channels))
}

/// Drop a trailing partial frame left by a truncated data chunk.
fn trim_partial_frame(mut samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels > 0 {
        let whole = samples.len() - samples.len() % channels as usize;
        if whole != samples.len() {
            log::warn!("WAV data ends mid-frame; dropping {} samples", samples.len() - whole);
            samples.truncate(whole);
        }
    }
    samples
}

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pb_ir::SampleError;

    /// Build a minimal WAV file from raw parameters.
    fn make_wav(format: u16, channels: u16, sample_rate: u32, bits: u16, pcm_data: &[u8]) -> Vec<u8> {
        let block_align = channels * (bits / 8);
        let byte_rate = sample_rate * block_align as u32;
        let data_size = pcm_data.len() as u32;

        let mut buf = Vec::new();
        buf.extend(b"RIFF");
        buf.extend(&(36 + data_size).to_le_bytes());
        buf.extend(b"WAVE");
        buf.extend(b"fmt ");
        buf.extend(&16u32.to_le_bytes());
        buf.extend(&format.to_le_bytes());
        buf.extend(&channels.to_le_bytes());
        buf.extend(&sample_rate.to_le_bytes());
        buf.extend(&byte_rate.to_le_bytes());
        buf.extend(&block_align.to_le_bytes());
        buf.extend(&bits.to_le_bytes());
        buf.extend(b"data");
        buf.extend(&data_size.to_le_bytes());
        buf.extend(pcm_data);
        buf
    }

    #[test]
    fn load_8bit_mono() {
        let wav = make_wav(FORMAT_PCM, 1, 22050, 8, &[128, 192, 64, 0]);
        let buf = load_wav(&wav).unwrap();
        assert_eq!(buf.sample_rate(), 22050);
        assert_eq!(buf.data(), &[0.0, 0.5, -0.5, -1.0]);
    }

    #[test]
    fn load_16bit_stereo() {
        let pcm: Vec<u8> = [16384i16, -16384, 0, -32768].iter().flat_map(|v| v.to_le_bytes()).collect();
        let buf = load_wav(&make_wav(FORMAT_PCM, 2, 44100, 16, &pcm)).unwrap();
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.sample(0, 0), 0.5);
        assert_eq!(buf.sample(0, 1), -0.5);
        assert_eq!(buf.sample(1, 1), -1.0);
    }

    #[test]
    fn load_24bit_mono() {
        // 0x400000 = half scale, 0xC00000 = minus half scale
        let pcm = [0x00, 0x00, 0x40, 0x00, 0x00, 0xC0];
        let buf = load_wav(&make_wav(FORMAT_PCM, 1, 48000, 24, &pcm)).unwrap();
        assert_eq!(buf.data(), &[0.5, -0.5]);
    }

    #[test]
    fn load_float_mono() {
        let pcm: Vec<u8> = [0.25f32, -0.75].iter().flat_map(|v| v.to_le_bytes()).collect();
        let buf = load_wav(&make_wav(FORMAT_FLOAT, 1, 48000, 32, &pcm)).unwrap();
        assert_eq!(buf.data(), &[0.25, -0.75]);
    }

    #[test]
    fn skips_unknown_chunks() {
        let mut wav = make_wav(FORMAT_PCM, 1, 8000, 8, &[128, 128]);
        // insert an odd-sized LIST chunk (padded) before fmt
        let mut list = b"LIST".to_vec();
        list.extend(3u32.to_le_bytes());
        list.extend([1u8, 2, 3, 0]);
        wav.splice(12..12, list);
        let buf = load_wav(&wav).unwrap();
        assert_eq!(buf.frames(), 2);
    }

    #[test]
    fn truncated_data_chunk_drops_partial_frame() {
        let mut wav = make_wav(FORMAT_PCM, 2, 8000, 16, &[0; 8]);
        wav.truncate(wav.len() - 2);
        let buf = load_wav(&wav).unwrap();
        assert_eq!(buf.frames(), 1);
    }

    #[test]
    fn empty_data_is_a_valid_empty_buffer() {
        let buf = load_wav(&make_wav(FORMAT_PCM, 1, 8000, 16, &[])).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn unsupported_encodings_rejected() {
        let wav = make_wav(FORMAT_PCM, 1, 8000, 12, &[0; 4]);
        assert!(matches!(load_wav(&wav), Err(FormatError::Unsupported { format: 1, bits: 12 })));
        let wav = make_wav(FORMAT_FLOAT, 1, 8000, 64, &[0; 8]);
        assert!(matches!(load_wav(&wav), Err(FormatError::Unsupported { .. })));
    }

    #[test]
    fn too_many_channels_rejected() {
        let wav = make_wav(FORMAT_PCM, 12, 8000, 8, &[128; 12]);
        assert!(matches!(load_wav(&wav), Err(FormatError::Sample(SampleError::UnsupportedChannels(12)))));
    }

    #[test]
    fn invalid_header_rejected() {
        assert!(matches!(load_wav(b"not a wav file"), Err(FormatError::InvalidHeader)));
        assert!(matches!(load_wav(&[0; 10]), Err(FormatError::UnexpectedEof)));
    }

    #[test]
    fn encoded_header_fields() {
        let wav = samples_to_wav(&[0.0, 1.0, -1.0, 0.5], 2, 44100);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(read_u16_le(&wav, 22), 2);
        assert_eq!(read_u32_le(&wav, 24), 44100);
        assert_eq!(read_u32_le(&wav, 40), 8);
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), 32767);
    }

    #[test]
    fn encoder_clamps_and_zeroes_non_finite() {
        let wav = samples_to_wav(&[3.0, f32::NAN], 1, 8000);
        assert_eq!(i16::from_le_bytes([wav[44], wav[45]]), 32767);
        assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), 0);
    }

    #[test]
    fn write_wav_matches_buffer_encoder() {
        let samples = [0.1, -0.2, 0.3];
        let mut out = Vec::new();
        write_wav(&mut out, &samples, 1, 22050).unwrap();
        assert_eq!(out, samples_to_wav(&samples, 1, 22050));
    }
}
