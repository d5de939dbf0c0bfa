//! Error types for engine setup and rendering.

use thiserror::Error;

use crate::types::SoundChip;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, FamitoneError>;

/// Errors raised while wiring the engine or servicing a render request.
///
/// Per-tick playback never fails; these errors only surface from setup
/// (chip registry, configuration) and from offline render requests.
#[derive(Error, Debug)]
pub enum FamitoneError {
    /// A chip type with the same id is already registered.
    #[error("Sound chip {0:?} is already registered")]
    DuplicateChip(SoundChip),

    /// A chip type reported no chip id.
    #[error("Sound chip type has no chip id")]
    InvalidChip,

    /// No chip type with the requested id is registered.
    #[error("Sound chip {0:?} is not registered")]
    UnknownChip(SoundChip),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The render request cannot be serviced.
    #[error("Render rejected: {0}")]
    Render(String),

    /// Configuration (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WAV output error.
    #[cfg(feature = "export-wav")]
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
