//! Common utilities for integration tests

use std::path::Path;
use std::sync::Arc;

use axum::Router;

use dialogue_core::{
    ChunkSink, GenerationEngine, ModelConfig, ModelRequest, SpeechModel, ToneModel, VoiceRegistry,
};
use server::{build_router, config::ServerConfig, state::AppState};

pub const SAMPLE_RATE: u32 = 24_000;

/// Router plus the temp voices directory backing its registry.
pub struct TestApp {
    pub router: Router,
    _voices_dir: tempfile::TempDir,
}

pub fn write_test_voice(dir: &Path, name: &str) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(dir.join(format!("{name}.wav")), spec).unwrap();
    for n in 0..2400 {
        let t = n as f32 / SAMPLE_RATE as f32;
        writer
            .write_sample((0.2 * (2.0 * std::f32::consts::PI * 220.0 * t).sin() * 32767.0) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        sample_rate: SAMPLE_RATE,
        generation_timeout_ms: 5_000,
        first_chunk_wait_ms: 1_000,
        chunk_poll_timeout_ms: 200,
        ..ServerConfig::default()
    }
}

fn build_app(
    model: Option<Arc<dyn SpeechModel>>,
    config: ServerConfig,
    voice_names: &[&str],
) -> TestApp {
    let voices_dir = tempfile::tempdir().unwrap();
    for name in voice_names {
        write_test_voice(voices_dir.path(), name);
    }

    let voices = Arc::new(VoiceRegistry::scan_dir(voices_dir.path(), config.sample_rate));
    let engine = Arc::new(GenerationEngine::new(config.sample_rate));
    if let Some(model) = model {
        engine.install(model);
    }

    TestApp {
        router: build_router(AppState::new(engine, voices, config)),
        _voices_dir: voices_dir,
    }
}

/// Ready app with the tone backend and two default-named voices.
pub fn create_test_app() -> TestApp {
    let config = test_config();
    let model: Arc<dyn SpeechModel> = Arc::new(ToneModel::new(&ModelConfig {
        sample_rate: config.sample_rate,
        ..ModelConfig::default()
    }));
    build_app(
        Some(model),
        config,
        &["en-Alice_woman", "en-Carter_man"],
    )
}

/// App whose engine has no model installed.
pub fn create_unready_app() -> TestApp {
    build_app(None, test_config(), &["en-Alice_woman", "en-Carter_man"])
}

/// App requiring a bearer token on the generation endpoints.
pub fn create_auth_app(api_key: &str) -> TestApp {
    let config = ServerConfig {
        api_key: Some(api_key.to_string()),
        ..test_config()
    };
    let model: Arc<dyn SpeechModel> = Arc::new(ToneModel::new(&ModelConfig {
        sample_rate: config.sample_rate,
        ..ModelConfig::default()
    }));
    build_app(
        Some(model),
        config,
        &["en-Alice_woman", "en-Carter_man"],
    )
}

/// Backend that produces nothing and outlives the generation deadline.
pub struct StallModel;

impl SpeechModel for StallModel {
    fn generate(&self, _request: &ModelRequest, _sink: &ChunkSink<'_>) -> anyhow::Result<()> {
        std::thread::sleep(std::time::Duration::from_millis(1_500));
        Ok(())
    }
}

/// App whose worker never delivers a chunk before the (short) deadline.
pub fn create_stalling_app() -> TestApp {
    let config = ServerConfig {
        generation_timeout_ms: 300,
        first_chunk_wait_ms: 100,
        chunk_poll_timeout_ms: 50,
        ..test_config()
    };
    let model: Arc<dyn SpeechModel> = Arc::new(StallModel);
    build_app(
        Some(model),
        config,
        &["en-Alice_woman", "en-Carter_man"],
    )
}
