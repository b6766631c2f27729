// Configuration constants for the server

use std::time::Duration;

use dialogue_core::{CollectOptions, ModelConfig};

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required on the generation endpoints. `None` disables
    /// the check (development mode).
    pub api_key: Option<String>,
    pub model_backend: String,
    pub model_path: String,
    pub device: String,
    pub inference_steps: u32,
    pub sample_rate: u32,
    pub voices_dir: String,
    pub save_generated_audio: bool,
    pub output_directory: String,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub generation_timeout_ms: u64,
    pub first_chunk_wait_ms: u64,
    pub chunk_poll_timeout_ms: u64,
    pub max_concurrent_generations: usize,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_key: None,
            model_backend: "tone".to_string(),
            model_path: "models/dialogue-1.5b".to_string(),
            device: "cpu".to_string(),
            inference_steps: 10,
            sample_rate: 24_000,
            voices_dir: "voices".to_string(),
            save_generated_audio: false,
            output_directory: "outputs".to_string(),
            rate_limit_per_minute: 60,
            request_timeout_secs: 300,
            generation_timeout_ms: 240_000,
            first_chunk_wait_ms: 10_000,
            chunk_poll_timeout_ms: 5_000,
            max_concurrent_generations: 2,
            cors_allowed_origins: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect()
            });

        let save_generated_audio = std::env::var("SAVE_GENERATED_AUDIO")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Self {
            host: std::env::var("SERVER_HOST").unwrap_or(defaults.host),
            port: env_parse("SERVER_PORT", defaults.port),
            api_key,
            model_backend: std::env::var("MODEL_BACKEND").unwrap_or(defaults.model_backend),
            model_path: std::env::var("MODEL_PATH").unwrap_or(defaults.model_path),
            device: std::env::var("DEVICE").unwrap_or(defaults.device),
            inference_steps: env_parse("INFERENCE_STEPS", defaults.inference_steps),
            sample_rate: env_parse("SAMPLE_RATE", defaults.sample_rate),
            voices_dir: std::env::var("VOICES_DIR").unwrap_or(defaults.voices_dir),
            save_generated_audio,
            output_directory: std::env::var("OUTPUT_DIRECTORY").unwrap_or(defaults.output_directory),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            generation_timeout_ms: env_parse::<u64>(
                "GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout_ms / 1000,
            ) * 1000,
            first_chunk_wait_ms: env_parse("FIRST_CHUNK_WAIT_MS", defaults.first_chunk_wait_ms),
            chunk_poll_timeout_ms: env_parse("CHUNK_POLL_TIMEOUT_MS", defaults.chunk_poll_timeout_ms),
            max_concurrent_generations: env_parse(
                "MAX_CONCURRENT_GENERATIONS",
                defaults.max_concurrent_generations,
            ),
            cors_allowed_origins,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    /// Drain timing handed to the chunk aggregator.
    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            first_chunk_wait: Duration::from_millis(self.first_chunk_wait_ms),
            poll_timeout: Duration::from_millis(self.chunk_poll_timeout_ms),
            deadline: self.generation_timeout(),
        }
    }

    /// Pass-through knobs for whichever model backend gets installed.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model_path: self.model_path.clone(),
            device: self.device.clone(),
            inference_steps: self.inference_steps,
            sample_rate: self.sample_rate,
        }
    }
}
