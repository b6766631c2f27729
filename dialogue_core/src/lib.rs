//! Core building blocks for the dialogue generation service: the
//! producer/consumer audio bridge (channel, worker, aggregator), WAV
//! encoding, the voice registry, script formatting, and the capability
//! trait the actual speech model hides behind.

pub mod aggregate;
pub mod channel;
pub mod chunk;
pub mod error;
pub mod model;
pub mod script;
pub mod voices;
pub mod wav;
pub mod worker;

pub use aggregate::{collect, AssembledAudio, ChunkDrain, CollectOptions, DrainStep};
pub use channel::{channel, ChannelState, ChunkReceiver, ChunkSender, Pull};
pub use chunk::{AudioChunk, SamplePrecision};
pub use error::{ChannelClosed, GenerateError};
pub use model::{ChunkSink, GenerationEngine, ModelConfig, ModelRequest, SpeechModel, ToneModel};
pub use script::{clean_script, format_script, FormattedScript};
pub use voices::{read_audio, VoiceError, VoiceRegistry};
pub use worker::GenerationWorker;
