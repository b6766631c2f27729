//! Voice registry: speaker name -> reference waveform on disk.
//!
//! The registry is built once at startup by scanning a directory, then
//! shared read-only across requests. Reference decoding returns an empty
//! vector on I/O or format errors; the caller decides whether that is
//! fatal for the request.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use thiserror::Error;
use tracing::{error, info, warn};

/// Recognized reference audio files. Only WAV is decodable in-process; the
/// other extensions are registered so the registry lists them, and decoding
/// them reports an empty result like any other format error.
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a", "aac"];

/// Preferred voices when a request names no speakers.
const DEFAULT_SPEAKERS: &[&str] = &[
    "en-Alice_woman",
    "en-Carter_man",
    "en-Frank_man",
    "en-Maya_woman",
];

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Speaker '{0}' not found")]
    SpeakerNotFound(String),

    #[error("Requested {requested} speakers but only {available} available")]
    NotEnoughVoices { requested: usize, available: usize },
}

#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    // Sorted by name, matching the directory listing the API exposes.
    voices: BTreeMap<String, PathBuf>,
    sample_rate: u32,
}

impl VoiceRegistry {
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            voices: BTreeMap::new(),
            sample_rate,
        }
    }

    /// Scan a directory for reference audio. A missing directory yields an
    /// empty registry rather than an error so the server can come up and
    /// report itself unready for generation.
    pub fn scan_dir<P: AsRef<Path>>(dir: P, sample_rate: u32) -> Self {
        let dir = dir.as_ref();
        let mut voices = BTreeMap::new();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("voices directory {} not readable: {e}", dir.display());
                return Self::empty(sample_rate);
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let recognized = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !recognized {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                voices.insert(stem.to_string(), path);
            }
        }

        info!(
            "found {} voice presets in {}: {:?}",
            voices.len(),
            dir.display(),
            voices.keys().collect::<Vec<_>>()
        );
        if voices.is_empty() {
            warn!("no voice presets found in {}", dir.display());
        }

        Self {
            voices,
            sample_rate,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.voices.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.voices.contains_key(name)
    }

    /// Canonical rate every reference is resampled to.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Pick the concrete speaker list for a request. Explicit names are
    /// validated as-is; an empty list auto-selects from the defaults and
    /// fills the remainder with whatever the registry has.
    pub fn select_speakers(
        &self,
        requested: &[String],
        num_speakers: usize,
    ) -> Result<Vec<String>, VoiceError> {
        if !requested.is_empty() {
            for name in requested {
                if !self.contains(name) {
                    return Err(VoiceError::SpeakerNotFound(name.clone()));
                }
            }
            return Ok(requested.to_vec());
        }

        let mut selected: Vec<String> = DEFAULT_SPEAKERS
            .iter()
            .filter(|name| self.contains(name))
            .take(num_speakers)
            .map(|s| s.to_string())
            .collect();

        for name in self.voices.keys() {
            if selected.len() >= num_speakers {
                break;
            }
            if !selected.contains(name) {
                selected.push(name.clone());
            }
        }

        if selected.len() < num_speakers {
            return Err(VoiceError::NotEnoughVoices {
                requested: num_speakers,
                available: self.len(),
            });
        }
        Ok(selected)
    }

    /// Load a speaker's reference waveform, downmixed to mono and resampled
    /// to the canonical rate. Empty on lookup, I/O, or format failure.
    pub fn load_reference(&self, name: &str) -> Vec<f32> {
        let Some(path) = self.voices.get(name) else {
            error!("no reference file registered for speaker '{name}'");
            return Vec::new();
        };
        read_audio(path, self.sample_rate)
    }
}

/// Decode a reference waveform and resample it to `target_rate`. Returns an
/// empty vector on any I/O or format error.
pub fn read_audio<P: AsRef<Path>>(path: P, target_rate: u32) -> Vec<f32> {
    let path = path.as_ref();
    match decode_wav(path) {
        Ok((samples, source_rate)) => {
            if source_rate == target_rate {
                samples
            } else {
                match resample(&samples, source_rate, target_rate) {
                    Ok(resampled) => resampled,
                    Err(e) => {
                        error!("resampling {} failed: {e:#}", path.display());
                        Vec::new()
                    }
                }
            }
        }
        Err(e) => {
            error!("error reading audio {}: {e:#}", path.display());
            Vec::new()
        }
    }
}

fn decode_wav(path: &Path) -> anyhow::Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| anyhow::anyhow!("open wav: {e}"))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| anyhow::anyhow!("decode wav: {e}"))?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .map_err(|e| anyhow::anyhow!("decode wav: {e}"))?
        }
    };

    if channels <= 1 {
        return Ok((interleaved, spec.sample_rate));
    }

    // Downmix by averaging channels.
    let mono: Vec<f32> = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> anyhow::Result<Vec<f32>> {
    let ratio = target_rate as f64 / source_rate as f64;
    let chunk_size = 1024;
    let mut resampler =
        FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| anyhow::anyhow!("create resampler: {e}"))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize);
    let mut pos = 0;
    while pos < samples.len() {
        let end = (pos + chunk_size).min(samples.len());
        let chunk = &samples[pos..end];

        // Pad the last chunk to the fixed input size.
        let input: Vec<Vec<f32>> = if chunk.len() < chunk_size {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0.0);
            vec![padded]
        } else {
            vec![chunk.to_vec()]
        };

        let result = resampler
            .process(&input, None)
            .map_err(|e| anyhow::anyhow!("resampling failed: {e}"))?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
        pos += chunk_size;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * 32767.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn registry_with(names: &[&str]) -> (tempfile::TempDir, VoiceRegistry) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            write_wav(&dir.path().join(format!("{name}.wav")), &[0.1; 256], 24_000);
        }
        let registry = VoiceRegistry::scan_dir(dir.path(), 24_000);
        (dir, registry)
    }

    #[test]
    fn test_scan_lists_sorted_names() {
        let (_dir, registry) = registry_with(&["zoe", "abe"]);
        assert_eq!(registry.names(), vec!["abe".to_string(), "zoe".to_string()]);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let registry = VoiceRegistry::scan_dir("/nonexistent/voices", 24_000);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_explicit_speakers_validated() {
        let (_dir, registry) = registry_with(&["anna", "ben"]);
        let ok = registry
            .select_speakers(&["anna".to_string(), "ben".to_string()], 2)
            .unwrap();
        assert_eq!(ok, vec!["anna", "ben"]);

        let err = registry
            .select_speakers(&["anna".to_string(), "carol".to_string()], 2)
            .unwrap_err();
        assert!(matches!(err, VoiceError::SpeakerNotFound(name) if name == "carol"));
    }

    #[test]
    fn test_default_selection_prefers_known_names() {
        let (_dir, registry) = registry_with(&["en-Alice_woman", "en-Carter_man", "zeb"]);
        let picked = registry.select_speakers(&[], 2).unwrap();
        assert_eq!(picked, vec!["en-Alice_woman", "en-Carter_man"]);
    }

    #[test]
    fn test_default_selection_fills_from_registry() {
        let (_dir, registry) = registry_with(&["en-Alice_woman", "zeb"]);
        let picked = registry.select_speakers(&[], 2).unwrap();
        assert_eq!(picked, vec!["en-Alice_woman", "zeb"]);
    }

    #[test]
    fn test_not_enough_voices() {
        let (_dir, registry) = registry_with(&["solo"]);
        let err = registry.select_speakers(&[], 3).unwrap_err();
        assert!(matches!(
            err,
            VoiceError::NotEnoughVoices {
                requested: 3,
                available: 1
            }
        ));
    }

    #[test]
    fn test_read_audio_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.wav");
        write_wav(&path, &[0.25; 480], 24_000);
        let samples = read_audio(&path, 24_000);
        assert_eq!(samples.len(), 480);
        assert!((samples[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_read_audio_resamples_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref48k.wav");
        write_wav(&path, &[0.1; 4800], 48_000);
        let samples = read_audio(&path, 24_000);
        // Roughly half the input length after 48k -> 24k.
        assert!(samples.len() > 2000 && samples.len() < 3000);
    }

    #[test]
    fn test_read_audio_bad_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.wav");
        fs::write(&path, b"not a riff container").unwrap();
        assert!(read_audio(&path, 24_000).is_empty());
        assert!(read_audio(dir.path().join("absent.wav"), 24_000).is_empty());
    }
}
