//! Errors reported to callers of the player operations.

use std::fmt;

/// Errors returned by [`crate::controller::PlayerController`] and the method channel.
///
/// Every variant maps to a stable string code (see [`PlayerError::code`]) that the
/// method channel reports back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    /// `initializePlayer` received a malformed payload.
    Configuration(String),
    /// `writeChunk` received a malformed payload or could not be enqueued.
    BufferWrite(String),
    /// `setStereoVolume` received a malformed payload.
    Volume(String),
    /// The output engine could not be started.
    PlaybackStart(String),
    /// The method name is not part of the command surface.
    UnknownCommand(String),
}

impl PlayerError {
    /// Stable, caller-visible error code.
    pub fn code(&self) -> &'static str {
        match self {
            PlayerError::Configuration(_) => "ConfigurationError",
            PlayerError::BufferWrite(_) => "BufferWriteError",
            PlayerError::Volume(_) => "VolumeError",
            PlayerError::PlaybackStart(_) => "PlaybackStartError",
            PlayerError::UnknownCommand(_) => "UnknownCommandError",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PlayerError::Configuration(m)
            | PlayerError::BufferWrite(m)
            | PlayerError::Volume(m)
            | PlayerError::PlaybackStart(m)
            | PlayerError::UnknownCommand(m) => m,
        }
    }
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for PlayerError {}
