//! HTTP handlers.

use std::sync::atomic::Ordering;
use std::sync::OnceLock;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use dialogue_core::{wav, DrainStep};

use crate::error::ApiError;
use crate::generation::{self, GenerationOutcome};
use crate::state::AppState;

fn default_num_speakers() -> u32 {
    2
}

fn default_cfg_scale() -> f32 {
    1.3
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub script: String,
    #[serde(default = "default_num_speakers")]
    pub num_speakers: u32,
    #[serde(default)]
    pub speakers: Vec<String>,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f32,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    pub status: String,
    pub message: String,
    pub generation_id: String,
    pub audio_base64: String,
    pub duration: f64,
    pub sample_rate: u32,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
    pub available_voices: Vec<String>,
    pub model_loaded: bool,
}

#[derive(Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<String>,
    pub count: usize,
}

pub static START_TIME: OnceLock<std::time::Instant> = OnceLock::new();

/// Bearer-token check for the generation endpoints. Disabled when no key is
/// configured (development mode).
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(ref expected) = state.config.api_key else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(key) if key == expected => Ok(next.run(request).await),
        _ => {
            warn!("unauthorized access attempt");
            Err(ApiError::Unauthorized)
        }
    }
}

pub async fn root_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let ready = state.engine.is_ready();
    Json(StatusResponse {
        status: if ready { "online" } else { "initializing" }.to_string(),
        message: if ready {
            "Dialogue generation server is running".to_string()
        } else {
            "Server is initializing...".to_string()
        },
        available_voices: state.voices.names(),
        model_loaded: ready,
    })
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn list_voices(State(state): State<AppState>) -> Json<VoicesResponse> {
    let voices = state.voices.names();
    Json(VoicesResponse {
        count: voices.len(),
        voices,
    })
}

/// JSON delivery: inline Base64 WAV.
pub async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    let outcome = generation::run_generation(&state, &req).await?;
    let (audio_base64, _mime) = wav::encode_wav_base64(&outcome.audio)?;

    Ok(Json(GenerateResponse {
        status: "success".to_string(),
        message: format!(
            "Generated {} turns in {:.2}s",
            outcome.turns,
            outcome.elapsed.as_secs_f64()
        ),
        generation_id: outcome.generation_id,
        audio_base64,
        duration: outcome.audio.duration_secs(),
        sample_rate: outcome.audio.sample_rate(),
    }))
}

/// Binary delivery: the WAV container itself, metadata in headers.
pub async fn generate_wav(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    let outcome = generation::run_generation(&state, &req).await?;
    let bytes = wav::encode_wav(&outcome.audio)?;

    let GenerationOutcome {
        generation_id,
        audio,
        elapsed,
        ..
    } = outcome;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, wav::WAV_MIME)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"generated_audio_{generation_id}.wav\""),
        )
        .header("X-Generation-ID", generation_id)
        .header("X-Duration", format!("{}", audio.duration_secs()))
        .header("X-Generation-Time", format!("{:.2}s", elapsed.as_secs_f64()))
        .body(Body::from(bytes))
        .map_err(|e| ApiError::InternalError(format!("response build error: {e}")))
}

/// Streaming delivery: newline-delimited JSON frames. A start frame is
/// emitted as soon as the worker is running, one progress frame per chunk,
/// and a terminal frame carrying either the finished audio or the error.
pub async fn generate_stream(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);

    // Validation and speaker resolution fail as plain HTTP errors before
    // any frame goes out; after this point errors arrive in-stream.
    let context = generation::prepare(&state, &req)?;
    let mut active = generation::start(&state, context).await?;

    let sample_rate = state.engine.sample_rate();
    let stream = async_stream::stream! {
        let generation_id = active.generation_id.clone();
        yield Ok::<String, std::convert::Infallible>(frame(&serde_json::json!({
            "type": "status",
            "message": "Generation starting...",
            "generation_id": generation_id,
        })));

        loop {
            match active.drain.step().await {
                Ok(DrainStep::Chunk { seq, samples }) => {
                    let total = active.drain.samples_so_far();
                    yield Ok(frame(&serde_json::json!({
                        "type": "chunk",
                        "generation_id": generation_id,
                        "chunk": seq + 1,
                        "samples": samples,
                        "total_samples": total,
                        "duration": total as f64 / sample_rate as f64,
                    })));
                }
                Ok(DrainStep::Complete) => break,
                Err(e) => {
                    let e = ApiError::from(e);
                    yield Ok(frame(&serde_json::json!({
                        "type": "error",
                        "generation_id": generation_id,
                        "message": e.to_string(),
                        "category": e.category(),
                    })));
                    return;
                }
            }
        }

        match active.finalize(&state).and_then(|outcome| {
            let (audio_base64, _mime) = wav::encode_wav_base64(&outcome.audio)?;
            Ok((outcome, audio_base64))
        }) {
            Ok((outcome, audio_base64)) => {
                yield Ok(frame(&serde_json::json!({
                    "type": "complete",
                    "message": format!(
                        "Generated {} turns in {:.2}s",
                        outcome.turns,
                        outcome.elapsed.as_secs_f64()
                    ),
                    "generation_id": outcome.generation_id,
                    "audio_base64": audio_base64,
                    "duration": outcome.audio.duration_secs(),
                    "sample_rate": outcome.audio.sample_rate(),
                })));
            }
            Err(e) => {
                yield Ok(frame(&serde_json::json!({
                    "type": "error",
                    "generation_id": generation_id,
                    "message": e.to_string(),
                    "category": e.category(),
                })));
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::InternalError(format!("response build error: {e}")))
}

fn frame(value: &serde_json::Value) -> String {
    let mut line = value.to_string();
    line.push('\n');
    line
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub available_generation_slots: usize,
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_usage = system.global_cpu_info().cpu_usage();
    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    Json(MetricsResponse {
        cpu_usage_percent: cpu_usage,
        memory_used_mb: memory_used / 1024 / 1024,
        memory_total_mb: memory_total / 1024 / 1024,
        memory_usage_percent,
        request_count: state.request_count.load(Ordering::Relaxed),
        uptime_seconds: uptime,
        available_generation_slots: state.generation_slots.available_permits(),
    })
}
