//! Request lifecycle coordination: one mechanism behind all three
//! generation endpoints.
//!
//! A request moves through validation, speaker resolution, reference
//! loading, and script formatting before any expensive work starts; only
//! then is a worker slot taken, a fresh channel created, and the worker
//! spawned. Every request gets its own context, channel, and worker —
//! nothing mutable is shared across in-flight generations except the model
//! itself, which is read-only here.
//!
//! On deadline the worker is abandoned rather than interrupted: its
//! concurrency permit travels with a watchdog task that only releases the
//! slot once the worker thread actually finishes, so abandoned generations
//! cannot pile up past `max_concurrent_generations`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use dialogue_core::{
    channel, clean_script, format_script, wav, AssembledAudio, ChunkDrain, DrainStep,
    GenerationWorker, ModelRequest, SpeechModel,
};

use crate::error::ApiError;
use crate::routes::GenerateRequest;
use crate::state::AppState;
use crate::validation::validate_generate_request;

/// Per-request generation context: input, parameters, identity. Owned by
/// the coordinator for the lifetime of one request, never shared.
pub struct GenerationContext {
    pub generation_id: String,
    pub speakers: Vec<String>,
    pub turns: usize,
    pub script: String,
    model: Arc<dyn SpeechModel>,
    request: ModelRequest,
    created_at: Instant,
}

/// A context whose worker is running; drain to completion.
pub struct ActiveGeneration {
    pub generation_id: String,
    pub speakers: Vec<String>,
    pub turns: usize,
    pub drain: ChunkDrain,
    script: String,
    created_at: Instant,
}

pub struct GenerationOutcome {
    pub generation_id: String,
    pub audio: AssembledAudio,
    pub elapsed: Duration,
    pub speakers: Vec<String>,
    pub turns: usize,
    pub saved_path: Option<PathBuf>,
}

/// Validate the request and build an isolated generation context. No
/// generation work happens here; failures are cheap and immediate.
pub fn prepare(state: &AppState, req: &GenerateRequest) -> Result<GenerationContext, ApiError> {
    let Some(model) = state.engine.model() else {
        return Err(ApiError::NotReady);
    };

    validate_generate_request(req)?;

    let script = clean_script(&req.script);
    let speakers = state
        .voices
        .select_speakers(&req.speakers, req.num_speakers as usize)?;

    let mut voice_samples = Vec::with_capacity(speakers.len());
    for name in &speakers {
        let samples = state.voices.load_reference(name);
        if samples.is_empty() {
            return Err(ApiError::InternalError(format!(
                "Failed to load reference audio for speaker '{name}'"
            )));
        }
        voice_samples.push(samples);
    }

    let formatted = format_script(&script, req.num_speakers as usize);
    let generation_id = format!("gen_{}", uuid::Uuid::new_v4().simple());

    info!(
        "generation {generation_id}: {} speakers {:?}, {} turns, cfg_scale {}",
        speakers.len(),
        speakers,
        formatted.turns,
        req.cfg_scale
    );

    Ok(GenerationContext {
        generation_id,
        speakers,
        turns: formatted.turns,
        script,
        model,
        request: ModelRequest {
            script: formatted.text,
            voice_samples,
            cfg_scale: req.cfg_scale,
        },
        created_at: Instant::now(),
    })
}

/// Take a worker slot, spawn the worker, and hand back the drain half.
pub async fn start(state: &AppState, context: GenerationContext) -> Result<ActiveGeneration, ApiError> {
    let GenerationContext {
        generation_id,
        speakers,
        turns,
        script,
        model,
        request,
        created_at,
    } = context;

    let permit = state
        .generation_slots
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| ApiError::InternalError(format!("worker slots unavailable: {e}")))?;

    let (tx, rx) = channel();
    let worker = GenerationWorker::spawn(model, request, tx);

    // The permit is released when the worker finishes, not when the request
    // ends; a timed-out request abandons the worker but keeps its slot
    // occupied until the thread runs out.
    tokio::spawn(async move {
        worker.join().await;
        drop(permit);
    });

    Ok(ActiveGeneration {
        generation_id,
        speakers,
        turns,
        drain: ChunkDrain::new(rx, state.config.collect_options()),
        script,
        created_at,
    })
}

impl ActiveGeneration {
    /// Drain every chunk, then assemble and optionally persist the result.
    pub async fn run_to_completion(mut self, state: &AppState) -> Result<GenerationOutcome, ApiError> {
        loop {
            match self.drain.step().await {
                Ok(DrainStep::Chunk { .. }) => continue,
                Ok(DrainStep::Complete) => break,
                Err(e) => {
                    warn!(
                        "generation {} aborted after {} chunks: {e}",
                        self.generation_id,
                        self.drain.chunk_count()
                    );
                    return Err(e.into());
                }
            }
        }
        self.finalize(state)
    }

    /// Assemble the drained audio. Callers of the streaming path invoke
    /// this directly once the drain reports completion.
    pub fn finalize(self, state: &AppState) -> Result<GenerationOutcome, ApiError> {
        let audio = self.drain.finish(state.engine.sample_rate());
        let elapsed = self.created_at.elapsed();

        info!(
            "generation {} completed in {:.2}s: {:.2}s of audio",
            self.generation_id,
            elapsed.as_secs_f64(),
            audio.duration_secs()
        );

        let saved_path = save_audio_file(state, &audio, &self.script);

        Ok(GenerationOutcome {
            generation_id: self.generation_id,
            audio,
            elapsed,
            speakers: self.speakers,
            turns: self.turns,
            saved_path,
        })
    }
}

/// Full pipeline for the request/response endpoints.
pub async fn run_generation(
    state: &AppState,
    req: &GenerateRequest,
) -> Result<GenerationOutcome, ApiError> {
    let context = prepare(state, req)?;
    let active = start(state, context).await?;
    active.run_to_completion(state).await
}

/// Persist the assembled audio when enabled. Failure to persist is logged
/// and never fails the request.
fn save_audio_file(state: &AppState, audio: &AssembledAudio, script: &str) -> Option<PathBuf> {
    if !state.config.save_generated_audio {
        return None;
    }

    let output_dir = PathBuf::from(&state.config.output_directory);
    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        error!("failed to create output directory {}: {e}", output_dir.display());
        return None;
    }

    // first10chars_yymmddhhmmss.wav
    let mut prefix: String = script
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(10)
        .collect();
    if prefix.is_empty() {
        prefix = "audio".to_string();
    }
    let timestamp = chrono::Local::now().format("%y%m%d%H%M%S");
    let path = output_dir.join(format!("{prefix}_{timestamp}.wav"));

    match wav::write_wav_file(audio, &path) {
        Ok(()) => {
            info!("audio saved to {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("failed to save audio file: {e:#}");
            None
        }
    }
}
