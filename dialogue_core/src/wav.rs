//! WAV rendering of assembled audio.
//!
//! Quantization rule: if the peak absolute sample exceeds 1.0 the whole
//! buffer is divided by that peak before scaling to the 16-bit range;
//! otherwise samples are quantized literally. Rescaling only on overflow
//! prevents clipping without touching already-normalized audio.

use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;

use base64::Engine;

use crate::aggregate::AssembledAudio;

pub const WAV_MIME: &str = "audio/wav";

const I16_SCALE: f32 = 32767.0;

fn quantize(samples: &[f32]) -> Vec<i16> {
    let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    let scale = if peak > 1.0 { 1.0 / peak } else { 1.0 };
    samples
        .iter()
        .map(|&s| (s * scale * I16_SCALE) as i16)
        .collect()
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Render a mono 16-bit PCM WAV in memory.
pub fn encode_wav(audio: &AssembledAudio) -> anyhow::Result<Vec<u8>> {
    let pcm = quantize(audio.samples());

    // WAV header (44 bytes) + 2 bytes per sample.
    let estimated_size = 44 + pcm.len() * 2;
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(estimated_size));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(audio.sample_rate()))
            .map_err(|e| anyhow::anyhow!("wav write err: {e}"))?;
        for v in pcm {
            writer
                .write_sample(v)
                .map_err(|e| anyhow::anyhow!("wav sample err: {e}"))?;
        }
        // `writer` drops here, which finalizes the WAV header/footer
    }
    Ok(cursor.into_inner())
}

/// Inline delivery: WAV bytes as Base64 plus the MIME type.
pub fn encode_wav_base64(audio: &AssembledAudio) -> anyhow::Result<(String, &'static str)> {
    let bytes = encode_wav(audio)?;
    Ok((
        base64::engine::general_purpose::STANDARD.encode(bytes),
        WAV_MIME,
    ))
}

/// File delivery: same quantized representation, written to durable storage.
pub fn write_wav_file<P: AsRef<Path>>(audio: &AssembledAudio, path: P) -> anyhow::Result<()> {
    let pcm = quantize(audio.samples());
    let file = File::create(path.as_ref())
        .map_err(|e| anyhow::anyhow!("create {}: {e}", path.as_ref().display()))?;
    let mut writer = hound::WavWriter::new(BufWriter::new(file), wav_spec(audio.sample_rate()))
        .map_err(|e| anyhow::anyhow!("wav write err: {e}"))?;
    for v in pcm {
        writer
            .write_sample(v)
            .map_err(|e| anyhow::anyhow!("wav sample err: {e}"))?;
    }
    writer
        .finalize()
        .map_err(|e| anyhow::anyhow!("wav finalize err: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(samples: Vec<f32>) -> AssembledAudio {
        AssembledAudio::new(samples, 24_000)
    }

    fn read_pcm(bytes: &[u8]) -> Vec<i16> {
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        reader.into_samples::<i16>().map(|s| s.unwrap()).collect()
    }

    #[test]
    fn test_no_rescale_below_unity_peak() {
        let bytes = encode_wav(&audio(vec![0.5, -0.25, 0.0])).unwrap();
        let pcm = read_pcm(&bytes);
        assert_eq!(pcm, vec![(0.5 * 32767.0) as i16, (-0.25 * 32767.0) as i16, 0]);
    }

    #[test]
    fn test_rescale_by_peak_above_unity() {
        let loud = audio(vec![2.0, -1.0, 0.5]);
        let bytes = encode_wav(&loud).unwrap();
        let pcm = read_pcm(&bytes);

        // Peak 2.0: every sample is exactly half of its unscaled value,
        // within quantization rounding.
        let reference = [2.0f32, -1.0, 0.5];
        for (got, raw) in pcm.iter().zip(reference.iter()) {
            let expected = (raw / 2.0 * 32767.0) as i16;
            assert!((got - expected).abs() <= 1, "got {got}, expected {expected}");
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = audio(vec![0.1, 0.9, -0.4, 0.0, 0.33]);
        let first = encode_wav(&a).unwrap();
        let second = encode_wav(&a).unwrap();
        assert_eq!(first, second);
        let (b64_a, mime) = encode_wav_base64(&a).unwrap();
        let (b64_b, _) = encode_wav_base64(&a).unwrap();
        assert_eq!(b64_a, b64_b);
        assert_eq!(mime, "audio/wav");
    }

    #[test]
    fn test_header_carries_configured_rate() {
        let bytes = encode_wav(&AssembledAudio::new(vec![0.0; 10], 44_100)).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 44_100);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
    }

    #[test]
    fn test_file_matches_inline_representation() {
        let a = audio(vec![0.2, -0.7, 1.5]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        write_wav_file(&a, &path).unwrap();

        let from_file = {
            let reader = hound::WavReader::open(&path).unwrap();
            reader
                .into_samples::<i16>()
                .map(|s| s.unwrap())
                .collect::<Vec<_>>()
        };
        let inline = read_pcm(&encode_wav(&a).unwrap());
        assert_eq!(from_file, inline);
    }
}
