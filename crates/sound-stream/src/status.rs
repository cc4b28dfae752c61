//! Playback state and the events delivered to the caller.

use serde::Serialize;
use serde_json::Value;

/// Player lifecycle state; exactly one is active at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Unset,
    Initialized,
    Playing,
    Stopped,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Unset => "Unset",
            PlaybackState::Initialized => "Initialized",
            PlaybackState::Playing => "Playing",
            PlaybackState::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events produced by the controller and the render context.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    /// The controller entered a new state.
    Status(PlaybackState),
    /// The render context finished playing the buffer with this sequence number.
    BufferConsumed { sequence: u64 },
    /// The output stream reported an error after it was started.
    StreamError(String),
}

/// Wire name of the event method invoked on the caller.
pub const PLATFORM_EVENT_METHOD: &str = "platformEvent";

/// Payload of a `platformEvent` invocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlatformEvent {
    pub name: &'static str,
    pub data: Value,
}

impl From<&PlayerEvent> for PlatformEvent {
    fn from(event: &PlayerEvent) -> Self {
        match event {
            PlayerEvent::Status(state) => PlatformEvent {
                name: "playerStatus",
                data: Value::from(state.as_str()),
            },
            PlayerEvent::BufferConsumed { sequence } => PlatformEvent {
                name: "playerBufferConsumed",
                data: Value::from(*sequence),
            },
            PlayerEvent::StreamError(message) => PlatformEvent {
                name: "playerError",
                data: Value::from(message.as_str()),
            },
        }
    }
}

impl From<PlayerEvent> for PlatformEvent {
    fn from(event: PlayerEvent) -> Self {
        PlatformEvent::from(&event)
    }
}
