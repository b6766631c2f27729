use std::time::Duration;

use thiserror::Error;

/// Push attempted after the channel reached a terminal state.
#[derive(Debug, Clone, Copy, Error)]
#[error("audio channel is closed")]
pub struct ChannelClosed;

/// How a generation run can fail. Categories are kept distinct so the
/// serving layer can tell "bad model output" from "model did not respond in
/// time" from "model raised an error".
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The worker completed without producing a single chunk. An empty
    /// result is a hard failure, never a zero-duration success.
    #[error("generation produced no audio")]
    Empty,

    /// The overall deadline elapsed while the channel was still open. The
    /// worker is abandoned, not interrupted.
    #[error("generation timed out after {waited:?}")]
    TimedOut { waited: Duration },

    /// The generation routine raised; the reason is reported exactly once
    /// and never retried.
    #[error("generation failed: {0}")]
    Failed(String),
}
