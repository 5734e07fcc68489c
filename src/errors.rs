// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the overlay pipeline
//!
//! Each failure domain has its own enum so the engine can decide locally
//! whether an error terminates the stream or only degrades it:
//!
//! | Error          | Policy                                           |
//! |----------------|--------------------------------------------------|
//! | `CaptureError` | fatal; `Transient` gets one retry first           |
//! | `PublishError` | frame dropped, stream continues                  |
//! | `ChainError`   | reconfiguration rejected, previous chain stays   |
//! | `PluginError`  | stage skipped, stream continues                  |
//! | `PoolError`    | fatal, a buffer-ownership bug                    |
//! | `ConfigError`  | reload rejected, previous chain stays            |

use thiserror::Error;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Top-level error for the binary and the orchestrator lifecycle
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

/// Frame buffer pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// A lease was returned that the pool does not consider outstanding
    #[error("frame buffer {lease} released twice")]
    DoubleRelease { lease: u64 },
    /// Backpressure wait timed out with every pooled buffer leased
    #[error("frame pool exhausted: {capacity} buffers leased")]
    Exhausted { capacity: usize },
}

/// Per-stage plugin failures; the stage is skipped and the stream continues
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("invalid option '{field}': {reason}")]
    InvalidOption { field: String, reason: String },
    #[error("render failure: {0}")]
    RenderFailure(String),
    #[error("plugin exceeded its time allowance")]
    Timeout,
}

impl PluginError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        PluginError::InvalidOption {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        PluginError::RenderFailure(msg.into())
    }
}

/// Chain build failures; the active chain is left untouched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),
    #[error("plugin '{0}': invalid option '{1}'")]
    InvalidOption(String, String),
    #[error("position {position} used by both '{first}' and '{second}'")]
    DuplicatePosition {
        position: u32,
        first: String,
        second: String,
    },
    #[error("plugin name '{0}' declared more than once")]
    DuplicateName(String),
    #[error("no plugin named '{0}' in the active chain")]
    NotInChain(String),
    #[error("reorder must list every plugin exactly once: {0}")]
    InvalidOrder(String),
}

/// Capture collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Recoverable hiccup (e.g. a dropped USB packet); retried once
    #[error("transient capture failure: {0}")]
    Transient(String),
    /// Camera vanished
    #[error("capture device disconnected")]
    Disconnected,
    /// Source has no more frames
    #[error("end of stream")]
    EndOfStream,
    #[error("capture failed: {0}")]
    Fatal(String),
}

impl CaptureError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Transient(_))
    }
}

/// Publish collaborator errors; the frame is dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("sink rejected frame: {0}")]
    Rejected(String),
    #[error("frame {got} does not match sink format {expected}")]
    FormatMismatch { expected: String, got: String },
    #[error("sink not started")]
    NotStarted,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The orchestrator stopped consuming control events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("control bus closed")]
pub struct BusClosed;

/// Why a non-blocking publish was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrySendError {
    #[error("control bus full")]
    Full,
    #[error(transparent)]
    Closed(#[from] BusClosed),
}

/// Errors the engine records in `EngineState::last_error`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("plugin '{plugin}': {error}")]
    Plugin { plugin: String, error: PluginError },
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("configuration rejected: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_error_display() {
        let err = ChainError::InvalidOption("text".into(), "text".into());
        assert_eq!(err.to_string(), "plugin 'text': invalid option 'text'");
    }
}
