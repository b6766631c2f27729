//! Capability seam between the streaming bridge and the actual speech model.
//!
//! The numerical generation algorithm lives behind [`SpeechModel`] so the
//! channel/worker/aggregator machinery can be exercised against any backend,
//! including the deterministic [`ToneModel`] used in development and tests.

use std::sync::{Arc, RwLock};

use crate::channel::ChunkSender;
use crate::chunk::AudioChunk;
use crate::error::ChannelClosed;

/// Pass-through model configuration. None of these values change bridge
/// behavior; they are handed to whichever backend gets installed.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_path: String,
    pub device: String,
    pub inference_steps: u32,
    pub sample_rate: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: "models/dialogue-1.5b".to_string(),
            device: "cpu".to_string(),
            inference_steps: 10,
            sample_rate: 24_000,
        }
    }
}

/// Everything a backend needs for one generation run.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Transcript with `Speaker N:` turn markers already applied.
    pub script: String,
    /// Reference waveforms at the canonical sample rate, one per speaker,
    /// in speaker order.
    pub voice_samples: Vec<Vec<f32>>,
    /// Classifier-free guidance scale.
    pub cfg_scale: f32,
}

/// Push-only view of the channel handed to the model. The worker, not the
/// model, owns the close/fail transition.
pub struct ChunkSink<'a> {
    sender: &'a ChunkSender,
}

impl<'a> ChunkSink<'a> {
    pub(crate) fn new(sender: &'a ChunkSender) -> Self {
        Self { sender }
    }

    pub fn push(&self, chunk: AudioChunk) -> Result<(), ChannelClosed> {
        self.sender.push(chunk)
    }
}

/// The generation routine. `generate` runs on a dedicated blocking thread
/// and may take arbitrarily long; it pushes audio incrementally through the
/// sink and returns once the utterance is finished.
///
/// Implementations must be safe for concurrent read-only use; one call per
/// in-flight request may be running at any time.
pub trait SpeechModel: Send + Sync {
    fn generate(&self, request: &ModelRequest, sink: &ChunkSink<'_>) -> anyhow::Result<()>;
}

/// Holds the installed model, if any. The server starts serving before a
/// backend is installed and answers 503 until then.
pub struct GenerationEngine {
    model: RwLock<Option<Arc<dyn SpeechModel>>>,
    sample_rate: u32,
}

impl GenerationEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            model: RwLock::new(None),
            sample_rate,
        }
    }

    pub fn install(&self, model: Arc<dyn SpeechModel>) {
        *self.model.write().expect("engine lock poisoned") = Some(model);
    }

    pub fn is_ready(&self) -> bool {
        self.model.read().expect("engine lock poisoned").is_some()
    }

    pub fn model(&self) -> Option<Arc<dyn SpeechModel>> {
        self.model.read().expect("engine lock poisoned").clone()
    }

    /// Canonical output rate. Configured, never inferred from audio.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Deterministic development backend: renders each script turn as a shaped
/// tone burst whose pitch depends on the speaker slot and whose length
/// scales with the turn's text. Keeps the server runnable and the bridge
/// testable without model weights.
pub struct ToneModel {
    sample_rate: u32,
    chunk_samples: usize,
}

impl ToneModel {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            // One chunk per ~50 ms of audio, mirroring incremental decode.
            chunk_samples: (config.sample_rate as usize / 20).max(1),
        }
    }

    fn render_turn(&self, speaker_slot: usize, chars: usize) -> Vec<f32> {
        let base_hz = 160.0 + 60.0 * speaker_slot as f32;
        // ~60 ms per character, at least 200 ms per turn.
        let len = ((chars * self.sample_rate as usize * 6) / 100)
            .max(self.sample_rate as usize / 5);
        let mut samples = Vec::with_capacity(len);
        for n in 0..len {
            let t = n as f32 / self.sample_rate as f32;
            let envelope = (std::f32::consts::PI * n as f32 / len as f32).sin();
            samples.push(0.3 * envelope * (2.0 * std::f32::consts::PI * base_hz * t).sin());
        }
        samples
    }
}

impl SpeechModel for ToneModel {
    fn generate(&self, request: &ModelRequest, sink: &ChunkSink<'_>) -> anyhow::Result<()> {
        for line in request.script.lines() {
            let (slot, text) = match line.split_once(':') {
                Some((label, rest)) => {
                    let id: usize = label
                        .trim()
                        .trim_start_matches("Speaker ")
                        .parse()
                        .unwrap_or(1);
                    (id.saturating_sub(1), rest.trim())
                }
                None => (0, line.trim()),
            };
            if text.is_empty() {
                continue;
            }
            let turn = self.render_turn(slot, text.chars().count());
            for window in turn.chunks(self.chunk_samples) {
                if sink.push(AudioChunk::from_f32(window.to_vec())).is_err() {
                    // Consumer gone; stop rendering.
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;

    #[test]
    fn test_engine_readiness() {
        let engine = GenerationEngine::new(24_000);
        assert!(!engine.is_ready());
        engine.install(Arc::new(ToneModel::new(&ModelConfig::default())));
        assert!(engine.is_ready());
        assert_eq!(engine.sample_rate(), 24_000);
    }

    #[tokio::test]
    async fn test_tone_model_streams_chunks() {
        let model = ToneModel::new(&ModelConfig::default());
        let (tx, mut rx) = channel::channel();
        let request = ModelRequest {
            script: "Speaker 1: Hello there\nSpeaker 2: Hi".to_string(),
            voice_samples: vec![vec![0.0; 100], vec![0.0; 100]],
            cfg_scale: 1.3,
        };
        model.generate(&request, &ChunkSink::new(&tx)).unwrap();
        tx.close();

        let mut total = 0usize;
        let mut chunks = 0usize;
        loop {
            match rx.pull(std::time::Duration::from_millis(50)).await {
                channel::Pull::Chunk(c) => {
                    total += c.len();
                    chunks += 1;
                }
                channel::Pull::Closed => break,
                other => panic!("unexpected pull outcome: {other:?}"),
            }
        }
        assert!(chunks > 1, "expected incremental output");
        // Two turns, each at least 200 ms.
        assert!(total >= 2 * 24_000 / 5);
    }
}
