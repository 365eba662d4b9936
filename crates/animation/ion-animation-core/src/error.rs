//! Error types for the animation engine

use serde::{Deserialize, Serialize};

/// Every failure is local to the node whose `play()` produced it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AnimationError {
    /// Malformed keyframes or timing, or keyframes without targets
    #[error("Invalid animation configuration: {reason}")]
    Configuration { reason: String },

    /// Operation not allowed in the node's current state
    #[error("Invalid playback state: {current} -> {requested}")]
    PlaybackState { current: String, requested: String },

    /// The host failed to apply a mutation (detached element, missing container, ...)
    #[error("DOM operation failed: {reason}")]
    Dom { reason: String },

    /// Playback was stopped or the node destroyed before completion
    #[error("Animation cancelled")]
    Cancelled,
}

impl AnimationError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn dom(reason: impl Into<String>) -> Self {
        Self::Dom {
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, AnimationError>;
