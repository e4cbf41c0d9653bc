use thiserror::Error;

/// Failures the player reports through its `Error` event.
///
/// Public player methods never return these; they are converted to events at
/// the boundary of each operation so the UI layer can decide what to surface.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlayerError {
    /// The host refused to start playback, usually because no user gesture
    /// has unlocked audio yet.
    #[error("playback blocked by host: {0}")]
    PlaybackBlocked(String),

    /// The suspended audio context could not be resumed.
    #[error("audio context resume failed: {0}")]
    ContextResume(String),

    /// A track's locator could not be resolved or decoded.
    #[error("failed to load '{locator}': {reason}")]
    MediaLoad { locator: String, reason: String },

    #[error("transition to track {0} superseded")]
    TransitionSuperseded(usize),

    #[error("no track at index {index} (playlist has {len})")]
    TrackOutOfRange { index: usize, len: usize },

    #[error("event subscriber failed: {0}")]
    Subscriber(String),
}

impl PlayerError {
    /// Whether the UI should show this to the user instead of only logging it.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, PlayerError::PlaybackBlocked(_) | PlayerError::MediaLoad { .. })
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
