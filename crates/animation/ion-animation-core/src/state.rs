use serde::{Deserialize, Serialize};

/// Lifecycle state of an animation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Never played, or reset by `stop()`
    #[default]
    Idle,
    /// Effects are running
    Playing,
    /// Effects exist but are held (explicit pause or progress scrubbing)
    Paused,
    /// Every effect and child completed
    Finished,
}

impl PlaybackState {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    /// `play()` starts a fresh run from these states.
    #[inline]
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Finished)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
